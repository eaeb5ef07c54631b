//! Key translation and visibility filtering for change records.
//!
//! Raw dotted paths from the upstream order document are noisy. The
//! [`KeyTables`] hold the ignore-list and the label tables; [`filter`] applies
//! them according to a [`ViewMode`].

use std::collections::{HashMap, HashSet};

use serde_json::Value;

use crate::{
  change::{ChangeRecord, History, Operation},
  normalize::{date_from_timestamp, normalize_key},
};

// ─── View mode ───────────────────────────────────────────────────────────────

/// How much of the change history a consumer gets to see.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ViewMode {
  /// Only keys from the basic translation table.
  #[default]
  Basic,
  /// The extended table, including financing and payment fields.
  Detailed,
  /// Like `Basic`, with anonymous-sensitive values nulled.
  Share,
  /// No filtering at all; untranslated keys keep their raw path.
  AllKeys,
}

impl ViewMode {
  /// Whether bulky list/map values should be shown in full.
  pub fn shows_bulk_values(&self) -> bool {
    matches!(self, Self::Detailed | Self::AllKeys)
  }
}

// ─── Built-in tables ─────────────────────────────────────────────────────────

/// Path prefixes that are never interesting outside of `AllKeys` mode.
const IGNORED_PREFIXES: &[&str] = &[
  // The VIN is tracked at `details.tasks.deliveryDetails.regData...`.
  "order.vin",
  "details.tasks.registration.orderDetails.vin",
  "details.tasks.registration.regData.orderDetails.vin",
  "details.tasks.finalPayment.data.vin",
  "details.tasks.tradeIn.isMatched",
  "details.tasks.registration.isMatched",
  "details.tasks.registration.orderDetails.vehicleModelYear",
  "details.state.",
  "details.strings.",
  "details.scheduling.card.",
  "details.scheduling.strings.",
  "details.tasks.carbonCredit.card.",
  "details.tasks.carbonCredit.strings.",
  "details.tasks.finalPayment.card.",
  "details.tasks.finalPayment.strings.",
  "details.tasks.scheduling.card.",
  "details.tasks.scheduling.strings.",
  "details.tasks.scheduling.isDeliveryEstimatesEnabled",
  "details.tasks.registration.orderDetails.isAvailableForMatch",
  "details.tasks.finalPayment.data.isAvailableForMatch",
  "details.tasks.finalPayment.data.deliveryReadinessDetail.",
  "details.tasks.finalPayment.data.deliveryReadiness.",
  "details.tasks.finalPayment.data.agreementDetails",
  "details.tasks.finalPayment.data.vehicleId",
  "details.tasks.deliveryAcceptance.gates",
  "details.tasks.deliveryAcceptance.card.",
  "details.tasks.deliveryAcceptance.strings.",
  "details.tasks.deliveryDetails.regData.reggieRegistrationStatus",
  "details.tasks.deliveryDetails.strings.",
  "details.tasks.deliveryDetails.card.",
  "details.tasks.registration.card.",
  "details.tasks.registration.regData.reggieRegistrationStatus",
  "details.tasks.registration.strings.",
  "details.tasks.finalPayment.complete",
  "details.tasks.finalPayment.data.finalPaymentStatus",
  "details.tasks.scheduling.apptDateTimeAddressStr",
  "details.tasks.scheduling.isInventoryOrMatched",
  "details.tasks.finalPayment.data.hasFinalInvoice",
  "details.tasks.finalPayment.data.hasActiveInvoice",
  "details.tasks.finalPayment.data.selfSchedulingDetails.deliveryLocationId",
  "details.tasks.finalPayment.data.selfSchedulingDetails.",
  "details.tasks.financing.card.",
  "details.tasks.financing.strings.",
  "details.tasks.tradeIn.card.",
  "details.tasks.tradeIn.strings.",
];

const BASIC_TRANSLATIONS: &[(&str, &str)] = &[
  ("details.tasks.scheduling.deliveryWindowDisplay", labels::DELIVERY_WINDOW),
  ("details.tasks.scheduling.deliveryAppointmentDate", labels::DELIVERY_APPOINTMENT),
  ("details.tasks.scheduling.deliveryAddressTitle", "Delivery Center"),
  ("details.tasks.finalPayment.data.etaToDeliveryCenter", labels::ETA_DELIVERY_CENTER),
  ("details.tasks.registration.orderDetails.vehicleRoutingLocation", "Routing Location"),
  ("details.tasks.registration.expectedRegDate", labels::EXPECTED_REGISTRATION),
  ("details.orderStatus", labels::ORDER_STATUS),
  ("details.tasks.registration.orderDetails.reservationDate", labels::RESERVATION),
  ("details.tasks.registration.orderDetails.orderBookedDate", labels::ORDER_BOOKED),
  ("details.tasks.registration.orderDetails.vehicleOdometer", labels::VEHICLE_ODOMETER),
  ("order.modelCode", "Model"),
  ("order.mktOptions", "Configuration"),
];

/// Translated keys whose values are withheld in [`ViewMode::Share`].
const ANONYMOUS_TRANSLATIONS: &[(&str, &str)] = &[
  ("details.tasks.deliveryDetails.regData.orderDetails.vin", labels::VIN),
];

/// Extra labels only visible in [`ViewMode::Detailed`] and
/// [`ViewMode::AllKeys`].
const DETAIL_TRANSLATIONS: &[(&str, &str)] = &[
  ("details.tasks.finalPayment.data.paymentDetails.amountPaid", "Amount Paid"),
  ("details.tasks.finalPayment.data.paymentDetails.paymentType", "Payment Method"),
  ("details.tasks.finalPayment.data.accountBalance", "Account Balance"),
  ("details.tasks.finalPayment.data.amountDue", "Amount Due"),
  ("details.tasks.finalPayment.data.financingDetails.financialProductType", "Finance Product"),
  (
    "details.tasks.finalPayment.data.financingDetails.teslaFinanceDetails.financePartnerName",
    "Finance Partner",
  ),
  (
    "details.tasks.finalPayment.data.financingDetails.teslaFinanceDetails.monthlyPayment",
    "Monthly Payment",
  ),
  (
    "details.tasks.finalPayment.data.financingDetails.teslaFinanceDetails.termsInMonths",
    "Term (months)",
  ),
  (
    "details.tasks.finalPayment.data.financingDetails.teslaFinanceDetails.interestRate",
    "Interest Rate",
  ),
  (
    "details.tasks.finalPayment.data.financingDetails.teslaFinanceDetails.mileage",
    "Range per Year",
  ),
  ("details.tasks.finalPayment.data.amountDueFinancier", "Financed Amount"),
  (
    "details.tasks.finalPayment.data.financingDetails.teslaFinanceDetails.approvedLoanAmount",
    "Approved Amount",
  ),
  ("details.tasks.finalPayment.data.paymentDetails", "Payment Details"),
  ("details.tasks.finalPayment.amountDue", "Amount Due"),
  ("details.tasks.finalPayment.data.amountDueAfterRefund", "Amount Due After Refund"),
  ("details.tasks.finalPayment.status", "Payment Status"),
  ("details.tasks.registration.orderDetails.vehicleId", "VehicleID"),
  ("details.tasks.registration.orderDetails.registrationStatus", "Registration Status"),
  ("details.tasks.finalPayment.data.vehicleregistration", "Vehicle Registration"),
  ("details.tasks.finalPayment.data.vehicleParts", "Vehicle Parts"),
  ("details.tasks.scheduling.apptDateTimeAddressStr", "Delivery Details"),
];

/// Display labels the timeline builder keys its milestones on.
pub mod labels {
  pub const RESERVATION: &str = "Reservation";
  pub const ORDER_BOOKED: &str = "Order Booked";
  pub const DELIVERY_WINDOW: &str = "Delivery Window";
  pub const EXPECTED_REGISTRATION: &str = "Expected Registration Date";
  pub const ETA_DELIVERY_CENTER: &str = "ETA to Delivery Center";
  pub const DELIVERY_APPOINTMENT: &str = "Delivery Appointment Date";
  pub const VIN: &str = "VIN";
  pub const ORDER_STATUS: &str = "Order Status";
  pub const VEHICLE_BUILT: &str = "Vehicle Built";
  pub const VEHICLE_ODOMETER: &str = "Vehicle Odometer";
}

// ─── KeyTables ───────────────────────────────────────────────────────────────

/// Immutable lookup tables for the filter, built once and passed by
/// reference. All keys are stored normalised (see [`normalize_key`]).
#[derive(Debug, Clone)]
pub struct KeyTables {
  ignored:   Vec<String>,
  basic:     HashMap<String, String>,
  anonymous: HashSet<String>,
  /// Superset of `basic`, the anonymous keys, and the detail-only keys.
  extended:  HashMap<String, String>,
}

impl Default for KeyTables {
  fn default() -> Self {
    Self::new(
      IGNORED_PREFIXES.iter().copied(),
      BASIC_TRANSLATIONS.iter().copied(),
      ANONYMOUS_TRANSLATIONS.iter().copied(),
      DETAIL_TRANSLATIONS.iter().copied(),
    )
  }
}

impl KeyTables {
  /// Build tables from raw entries. Later entries win on duplicate keys.
  pub fn new<'a>(
    ignored: impl IntoIterator<Item = &'a str>,
    basic: impl IntoIterator<Item = (&'a str, &'a str)>,
    anonymous: impl IntoIterator<Item = (&'a str, &'a str)>,
    detailed: impl IntoIterator<Item = (&'a str, &'a str)>,
  ) -> Self {
    let ignored = ignored.into_iter().map(normalize_key).collect();

    let mut basic_map = HashMap::new();
    let mut anonymous_set = HashSet::new();
    let mut extended = HashMap::new();

    for (path, label) in basic {
      basic_map.insert(normalize_key(path), label.to_owned());
      extended.insert(normalize_key(path), label.to_owned());
    }
    for (path, label) in anonymous {
      anonymous_set.insert(normalize_key(path));
      extended.insert(normalize_key(path), label.to_owned());
    }
    for (path, label) in detailed {
      extended.insert(normalize_key(path), label.to_owned());
    }

    Self {
      ignored,
      basic: basic_map,
      anonymous: anonymous_set,
      extended,
    }
  }

  fn is_ignored(&self, key: &str) -> bool {
    self.ignored.iter().any(|prefix| key.starts_with(prefix.as_str()))
  }

  fn is_basic(&self, key: &str) -> bool {
    self.basic.contains_key(key) || self.anonymous.contains(key)
  }

  /// The display label for a raw path in the extended table, if any.
  pub fn label(&self, path: &str) -> Option<&str> {
    self.extended.get(&normalize_key(path)).map(String::as_str)
  }

  /// Whether a raw path is one of the anonymous-sensitive keys.
  pub fn is_anonymous(&self, path: &str) -> bool {
    self.anonymous.contains(&normalize_key(path))
  }
}

// ─── Filter ──────────────────────────────────────────────────────────────────

/// Apply the visibility policy of `mode` to `records`, pairing each surviving
/// record with its display key. Input order is preserved.
pub fn filter<'a>(
  records: impl IntoIterator<Item = &'a ChangeRecord>,
  tables: &KeyTables,
  mode: ViewMode,
) -> Vec<(String, ChangeRecord)> {
  records
    .into_iter()
    .filter_map(|record| filter_one(record, tables, mode))
    .collect()
}

fn filter_one(
  record: &ChangeRecord,
  tables: &KeyTables,
  mode: ViewMode,
) -> Option<(String, ChangeRecord)> {
  let key = normalize_key(&record.key);

  if mode == ViewMode::AllKeys {
    let label = tables
      .extended
      .get(&key)
      .cloned()
      .unwrap_or_else(|| record.key.clone());
    return Some((label, record.clone()));
  }

  if tables.is_ignored(&key) {
    return None;
  }
  if mode != ViewMode::Detailed && !tables.is_basic(&key) {
    return None;
  }
  let label = tables.extended.get(&key)?.clone();

  let mut record = record.clone();
  if mode == ViewMode::Share && tables.anonymous.contains(&key) {
    record.value = None;
    record.old_value = None;
  }
  Some((label, record))
}

// ─── Change history listing ──────────────────────────────────────────────────

/// One row of the change history listing for an order.
#[derive(Debug, Clone, PartialEq)]
pub struct HistoryEntry {
  pub timestamp: String,
  pub operation: Operation,
  /// Display label (or raw path in [`ViewMode::AllKeys`]).
  pub key:       String,
  pub value:     Option<Value>,
  pub old_value: Option<Value>,
}

/// Flatten the change sets of `order_ref` through [`filter`].
///
/// String values that parse as timestamps are truncated to their date.
pub fn history_entries(
  history: &History,
  order_ref: &str,
  tables: &KeyTables,
  mode: ViewMode,
) -> Vec<HistoryEntry> {
  history
    .change_sets(order_ref)
    .iter()
    .flat_map(|set| {
      filter(&set.changes, tables, mode)
        .into_iter()
        .map(move |(key, record)| HistoryEntry {
          timestamp: set.timestamp.clone(),
          operation: record.operation,
          key,
          value: record.value.map(truncate_date),
          old_value: record.old_value.map(truncate_date),
        })
    })
    .collect()
}

fn truncate_date(value: Value) -> Value {
  match value {
    Value::String(s) => Value::String(date_from_timestamp(&s)),
    other => other,
  }
}

// ─── Tests ────────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
  use serde_json::json;

  use super::*;
  use crate::change::ChangeSet;

  const VIN_PATH: &str = "details.tasks.deliveryDetails.regData.orderDetails.vin";

  fn records() -> Vec<ChangeRecord> {
    vec![
      ChangeRecord::changed("details.strings.title", json!("a"), json!("b")),
      ChangeRecord::changed("details.orderStatus", json!("BOOKED"), json!("IN_PRODUCTION")),
      ChangeRecord::added("details.tasks.finalPayment.data.amountDue", json!(1200)),
      ChangeRecord::added(VIN_PATH, json!("5YJ3E1EA1PF000001")),
      ChangeRecord::added("details.unknown.path", json!(true)),
    ]
  }

  fn keys(out: &[(String, ChangeRecord)]) -> Vec<&str> {
    out.iter().map(|(k, _)| k.as_str()).collect()
  }

  #[test]
  fn basic_keeps_only_basic_translations() {
    let out = filter(&records(), &KeyTables::default(), ViewMode::Basic);
    assert_eq!(keys(&out), ["Order Status", "VIN"]);
    assert_eq!(out[1].1.value, Some(json!("5YJ3E1EA1PF000001")));
  }

  #[test]
  fn detailed_adds_payment_fields() {
    let out = filter(&records(), &KeyTables::default(), ViewMode::Detailed);
    assert_eq!(keys(&out), ["Order Status", "Amount Due", "VIN"]);
  }

  #[test]
  fn share_nulls_anonymous_values_but_keeps_key() {
    let out = filter(&records(), &KeyTables::default(), ViewMode::Share);
    assert_eq!(keys(&out), ["Order Status", "VIN"]);
    assert_eq!(out[1].1.value, None);
    assert_eq!(out[1].1.old_value, None);
    // Non-sensitive values survive.
    assert_eq!(out[0].1.value, Some(json!("IN_PRODUCTION")));
  }

  #[test]
  fn all_keys_keeps_everything_with_raw_fallback() {
    let out = filter(&records(), &KeyTables::default(), ViewMode::AllKeys);
    assert_eq!(
      keys(&out),
      [
        "details.strings.title",
        "Order Status",
        "Amount Due",
        "VIN",
        "details.unknown.path",
      ]
    );
  }

  #[test]
  fn matching_is_case_and_whitespace_insensitive() {
    let r = vec![ChangeRecord::added("  Details.OrderStatus ", json!("X"))];
    let out = filter(&r, &KeyTables::default(), ViewMode::Basic);
    assert_eq!(keys(&out), ["Order Status"]);
  }

  #[test]
  fn ignore_prefix_beats_detail_translation() {
    // `apptDateTimeAddressStr` is both ignored and in the detail table.
    let r = vec![ChangeRecord::added(
      "details.tasks.scheduling.apptDateTimeAddressStr",
      json!("x"),
    )];
    assert!(filter(&r, &KeyTables::default(), ViewMode::Detailed).is_empty());
  }

  #[test]
  fn custom_tables_are_respected() {
    let tables = KeyTables::new(["a."], [("b", "Bee")], [("c", "Sea")], Vec::new());
    let r = vec![
      ChangeRecord::added("a.x", json!(1)),
      ChangeRecord::added("b", json!(2)),
      ChangeRecord::added("c", json!(3)),
    ];
    let out = filter(&r, &tables, ViewMode::Share);
    assert_eq!(keys(&out), ["Bee", "Sea"]);
    assert!(tables.is_anonymous("C"));
    assert_eq!(tables.label("b"), Some("Bee"));
  }

  #[test]
  fn history_entries_truncate_dates_and_carry_timestamp() {
    let mut history = History::new();
    history.append(
      "R1",
      ChangeSet {
        timestamp: "2024-03-01".into(),
        changes:   vec![ChangeRecord::changed(
          "details.tasks.finalPayment.data.etaToDeliveryCenter",
          json!("2024-03-20T10:00:00Z"),
          json!("2024-03-25T10:00:00Z"),
        )],
      },
    );
    let entries = history_entries(&history, "R1", &KeyTables::default(), ViewMode::Basic);
    assert_eq!(entries.len(), 1);
    assert_eq!(entries[0].timestamp, "2024-03-01");
    assert_eq!(entries[0].key, "ETA to Delivery Center");
    assert_eq!(entries[0].old_value, Some(json!("2024-03-20")));
    assert_eq!(entries[0].value, Some(json!("2024-03-25")));
  }
}
