//! Timeline reconstruction: history + current snapshot → milestone events.
//!
//! ```text
//! change history
//!   └─ history_entries() + provisional() → filtered, dated events
//!        └─ milestones_from_history()   → one-shot rewrites + whitelist
//! current snapshot
//!   └─ snapshot milestones, skipped when history already has the label
//! snapshot milestones ++ history milestones → timeline
//! ```
//!
//! The result is not re-sorted by date. Snapshot-derived milestones always
//! precede history-derived ones.

use std::{collections::HashSet, fmt};

use serde::Deserialize;
use serde_json::Value;

use crate::{
  change::{History, Operation},
  filter::{HistoryEntry, KeyTables, ViewMode, history_entries, labels},
  normalize::{date_from_timestamp, display_string, is_truthy, lookup_path, normalize_key},
};

/// Labels that may appear on a timeline. Everything else stays in the change
/// history listing only.
const WHITELIST: &[&str] = &[
  labels::RESERVATION,
  labels::ORDER_BOOKED,
  labels::DELIVERY_WINDOW,
  labels::EXPECTED_REGISTRATION,
  labels::ETA_DELIVERY_CENTER,
  labels::DELIVERY_APPOINTMENT,
  labels::VIN,
  labels::ORDER_STATUS,
  labels::VEHICLE_BUILT,
  labels::VEHICLE_ODOMETER,
];

/// Values that count as "no value" for the one-shot rewrites.
const BLANK_VALUES: &[&str] = &["", "None", "N/A"];

// ─── Types ───────────────────────────────────────────────────────────────────

/// A display-ready milestone. Never persisted.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TimelineEvent {
  /// Calendar date, or whatever the source held if it did not parse.
  pub timestamp: Option<String>,
  pub key:       String,
  pub value:     Option<String>,
}

impl TimelineEvent {
  fn new(timestamp: Option<String>, key: &str, value: Option<String>) -> Self {
    Self {
      timestamp,
      key: key.to_owned(),
      value,
    }
  }
}

/// Where the snapshot-derived milestones live in an order document, as
/// dotted paths.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(default)]
pub struct TimelineFields {
  pub reservation_date:           String,
  pub order_booked_date:          String,
  pub delivery_window:            String,
  pub expected_registration_date: String,
  pub eta_to_delivery_center:     String,
  pub delivery_appointment_date:  String,
}

impl Default for TimelineFields {
  fn default() -> Self {
    Self {
      reservation_date:           "details.tasks.registration.orderDetails.reservationDate".into(),
      order_booked_date:          "details.tasks.registration.orderDetails.orderBookedDate".into(),
      delivery_window:            "details.tasks.scheduling.deliveryWindowDisplay".into(),
      expected_registration_date: "details.tasks.registration.expectedRegDate".into(),
      eta_to_delivery_center:     "details.tasks.finalPayment.data.etaToDeliveryCenter".into(),
      delivery_appointment_date:  "details.tasks.scheduling.deliveryAppointmentDate".into(),
    }
  }
}

// ─── History-derived events ──────────────────────────────────────────────────

/// An event from history that still carries the previous value, needed to
/// reconstruct the originally assigned delivery window.
#[derive(Debug, Clone)]
struct Provisional {
  event:     TimelineEvent,
  /// The record's new value, as opposed to the displayed one.
  new_value: Option<String>,
  old_value: Option<String>,
}

fn provisional(entry: HistoryEntry) -> Provisional {
  let new_value = entry.value.as_ref().and_then(display_string);
  let old_value = entry.old_value.as_ref().and_then(display_string);
  let shown = match entry.operation {
    Operation::Removed => old_value.clone(),
    Operation::Added | Operation::Changed => new_value.clone(),
  };
  Provisional {
    event: TimelineEvent {
      timestamp: Some(date_from_timestamp(&entry.timestamp)),
      key:       entry.key,
      value:     shown,
    },
    new_value,
    old_value,
  }
}

fn is_blank(value: Option<&str>) -> bool {
  value.is_none_or(|v| BLANK_VALUES.contains(&v))
}

fn same_label(a: &str, b: &str) -> bool { normalize_key(a) == normalize_key(b) }

/// Accumulator for the single pass over history events.
#[derive(Default)]
struct Scan {
  seen_build:           bool,
  seen_delivery_window: bool,
  events:               Vec<TimelineEvent>,
}

/// Apply the one-shot rewrites and the whitelist to history events.
///
/// - The first odometer event with a real value becomes a "Vehicle Built"
///   milestone; every other odometer event is dropped.
/// - The first delivery-window event with a real previous value is preceded
///   by a synthetic event showing that previous value, dated with the
///   reservation date.
fn milestones_from_history(
  events: Vec<Provisional>,
  reservation_date: Option<&str>,
) -> Vec<TimelineEvent> {
  let whitelist: HashSet<String> = WHITELIST.iter().map(|l| normalize_key(l)).collect();

  let scan = events.into_iter().fold(Scan::default(), |mut scan, p| {
    if same_label(&p.event.key, labels::VEHICLE_ODOMETER) {
      if !scan.seen_build && !is_blank(p.new_value.as_deref()) {
        scan
          .events
          .push(TimelineEvent::new(p.event.timestamp, labels::VEHICLE_BUILT, None));
        scan.seen_build = true;
      }
      return scan;
    }

    if same_label(&p.event.key, labels::DELIVERY_WINDOW)
      && !scan.seen_delivery_window
      && !is_blank(p.old_value.as_deref())
    {
      scan.events.push(TimelineEvent::new(
        reservation_date.map(str::to_owned),
        labels::DELIVERY_WINDOW,
        p.old_value.clone(),
      ));
      scan.seen_delivery_window = true;
    }

    if whitelist.contains(&normalize_key(&p.event.key)) {
      scan.events.push(p.event);
    }
    scan
  });

  scan.events
}

/// Return `true` if `timeline` holds an event with `key` (normalised) and,
/// when `value` is given, that exact value.
pub fn contains_label(timeline: &[TimelineEvent], key: &str, value: Option<&str>) -> bool {
  timeline.iter().any(|event| {
    same_label(&event.key, key) && value.is_none_or(|v| event.value.as_deref() == Some(v))
  })
}

// ─── Builder ─────────────────────────────────────────────────────────────────

fn field<'a>(snapshot: &'a Value, path: &str) -> Option<&'a Value> {
  lookup_path(snapshot, path).filter(|v| is_truthy(v))
}

fn field_date(snapshot: &Value, path: &str) -> Option<String> {
  field(snapshot, path).and_then(display_string)
}

/// Build the timeline of `order_ref` from its change history and its current
/// snapshot.
pub fn build_timeline(
  history: &History,
  order_ref: &str,
  snapshot: &Value,
  tables: &KeyTables,
  fields: &TimelineFields,
  mode: ViewMode,
) -> Vec<TimelineEvent> {
  let reservation = field_date(snapshot, &fields.reservation_date);
  let booked = field_date(snapshot, &fields.order_booked_date);

  let provisional_events = history_entries(history, order_ref, tables, mode)
    .into_iter()
    .map(provisional)
    .collect();
  let from_history = milestones_from_history(provisional_events, reservation.as_deref());

  let missing = |label: &str| !contains_label(&from_history, label, None);
  let mut timeline = Vec::new();

  if let Some(ts) = &reservation
    && missing(labels::RESERVATION)
  {
    timeline.push(TimelineEvent::new(Some(ts.clone()), labels::RESERVATION, None));
  }
  if let Some(ts) = &booked
    && missing(labels::ORDER_BOOKED)
  {
    timeline.push(TimelineEvent::new(Some(ts.clone()), labels::ORDER_BOOKED, None));
  }
  if let Some(window) = field(snapshot, &fields.delivery_window)
    && missing(labels::DELIVERY_WINDOW)
  {
    timeline.push(TimelineEvent::new(
      booked.clone(),
      labels::DELIVERY_WINDOW,
      display_string(window),
    ));
  }

  let dated = [
    (&fields.expected_registration_date, labels::EXPECTED_REGISTRATION),
    (&fields.eta_to_delivery_center, labels::ETA_DELIVERY_CENTER),
    (&fields.delivery_appointment_date, labels::DELIVERY_APPOINTMENT),
  ];
  for (path, label) in dated {
    if let Some(ts) = field_date(snapshot, path)
      && missing(label)
    {
      timeline.push(TimelineEvent::new(Some(ts), label, None));
    }
  }

  timeline.extend(from_history);
  timeline
}

// ─── Presentation ────────────────────────────────────────────────────────────

/// A timeline event paired with whether its label was already shown.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PresentedEvent<'a> {
  pub event:    &'a TimelineEvent,
  pub repeated: bool,
}

/// Mark every event whose label already appeared earlier in `timeline`.
pub fn present(timeline: &[TimelineEvent]) -> Vec<PresentedEvent<'_>> {
  let mut seen = HashSet::new();
  timeline
    .iter()
    .map(|event| PresentedEvent {
      event,
      repeated: !seen.insert(normalize_key(&event.key)),
    })
    .collect()
}

impl fmt::Display for PresentedEvent<'_> {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    let timestamp = self.event.timestamp.as_deref().unwrap_or("N/A");
    write!(f, "{timestamp}: ")?;
    if self.repeated {
      f.write_str("new ")?;
    }
    f.write_str(&self.event.key)?;
    match self.event.value.as_deref() {
      Some(value) if !value.is_empty() => write!(f, ": {value}"),
      _ => Ok(()),
    }
  }
}

// ─── Tests ────────────────────────────────────────────────────────────────────
