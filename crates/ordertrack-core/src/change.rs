//! Change records — the unit of the append-only order history.
//!
//! A reconciliation run that observes at least one difference between two
//! snapshots of an order produces one [`ChangeSet`]. Change sets are appended
//! to the order's sequence in the [`History`] and are never rewritten
//! afterwards.

use std::collections::BTreeMap;

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use serde_json::Value;

// ─── Operation ───────────────────────────────────────────────────────────────

/// What happened at a dotted path between two snapshots.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Operation {
  Added,
  Removed,
  Changed,
}

impl Operation {
  /// The marker used when listing changes as text.
  pub fn symbol(&self) -> char {
    match self {
      Self::Added => '+',
      Self::Removed => '-',
      Self::Changed => '≠',
    }
  }
}

// ─── ChangeRecord ────────────────────────────────────────────────────────────

/// One atomic observation at a dotted path.
///
/// `Added` carries `value` only, `Removed` carries `old_value` only and
/// `Changed` carries both. The field names match the on-disk history format.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChangeRecord {
  pub operation: Operation,
  pub key:       String,
  #[serde(default, skip_serializing_if = "Option::is_none")]
  pub value:     Option<Value>,
  #[serde(default, skip_serializing_if = "Option::is_none")]
  pub old_value: Option<Value>,
}

impl ChangeRecord {
  pub fn added(key: impl Into<String>, value: Value) -> Self {
    Self {
      operation: Operation::Added,
      key:       key.into(),
      value:     Some(value),
      old_value: None,
    }
  }

  pub fn removed(key: impl Into<String>, old_value: Value) -> Self {
    Self {
      operation: Operation::Removed,
      key:       key.into(),
      value:     None,
      old_value: Some(old_value),
    }
  }

  pub fn changed(key: impl Into<String>, old_value: Value, value: Value) -> Self {
    Self {
      operation: Operation::Changed,
      key:       key.into(),
      value:     Some(value),
      old_value: Some(old_value),
    }
  }

  /// A whole order appeared. The record has an empty key and no values.
  pub fn order_added() -> Self { Self::order_level(Operation::Added) }

  /// A whole order disappeared. The record has an empty key and no values.
  pub fn order_removed() -> Self { Self::order_level(Operation::Removed) }

  fn order_level(operation: Operation) -> Self {
    Self {
      operation,
      key: String::new(),
      value: None,
      old_value: None,
    }
  }

  /// The value a display should show for this record: the new value for
  /// additions and changes, the previous one for removals.
  pub fn display_value(&self) -> Option<&Value> {
    match self.operation {
      Operation::Removed => self.old_value.as_ref(),
      Operation::Added | Operation::Changed => self.value.as_ref(),
    }
  }
}

// ─── ChangeSet ───────────────────────────────────────────────────────────────

/// All records observed in one reconciliation run, dated by calendar day.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChangeSet {
  /// Calendar date, `YYYY-MM-DD` for sets written by this crate. Older files
  /// may hold anything here; it is carried through untouched.
  pub timestamp: String,
  pub changes:   Vec<ChangeRecord>,
}

impl ChangeSet {
  pub fn new(date: NaiveDate, changes: Vec<ChangeRecord>) -> Self {
    Self {
      timestamp: date.format("%Y-%m-%d").to_string(),
      changes,
    }
  }
}

// ─── History ─────────────────────────────────────────────────────────────────

/// Order reference → chronological change sets.
///
/// Insertion order within an order's sequence is chronological order.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct History(BTreeMap<String, Vec<ChangeSet>>);

impl History {
  pub fn new() -> Self { Self::default() }

  /// The change sets recorded for `order_ref`, oldest first.
  pub fn change_sets(&self, order_ref: &str) -> &[ChangeSet] {
    self.0.get(order_ref).map(Vec::as_slice).unwrap_or_default()
  }

  /// Append `change_set` to the end of `order_ref`'s sequence.
  pub fn append(&mut self, order_ref: impl Into<String>, change_set: ChangeSet) {
    self.0.entry(order_ref.into()).or_default().push(change_set);
  }

  /// All order references that have at least one entry.
  pub fn references(&self) -> impl Iterator<Item = &str> {
    self.0.keys().map(String::as_str)
  }

  pub fn is_empty(&self) -> bool { self.0.is_empty() }

  /// Total number of change sets across all orders.
  pub fn change_set_count(&self) -> usize {
    self.0.values().map(Vec::len).sum()
  }
}

impl FromIterator<(String, Vec<ChangeSet>)> for History {
  fn from_iter<I: IntoIterator<Item = (String, Vec<ChangeSet>)>>(iter: I) -> Self {
    Self(iter.into_iter().collect())
  }
}

#[cfg(test)]
mod tests {
  use serde_json::json;

  use super::*;

  #[test]
  fn record_serialises_in_history_file_shape() {
    let record =
      ChangeRecord::changed("order.orderStatus", json!("BOOKED"), json!("IN_PRODUCTION"));
    let v = serde_json::to_value(&record).unwrap();
    assert_eq!(
      v,
      json!({
        "operation": "changed",
        "key": "order.orderStatus",
        "value": "IN_PRODUCTION",
        "old_value": "BOOKED",
      })
    );
  }

  #[test]
  fn added_record_omits_old_value() {
    let v = serde_json::to_value(ChangeRecord::added("a", json!(1))).unwrap();
    assert!(v.get("old_value").is_none());
  }

  #[test]
  fn record_without_values_deserialises() {
    // Early versions wrote whole-order additions with only a key.
    let r: ChangeRecord =
      serde_json::from_value(json!({ "operation": "added", "key": "0" })).unwrap();
    assert_eq!(r.operation, Operation::Added);
    assert!(r.value.is_none());
  }

  #[test]
  fn change_set_dates_to_calendar_day() {
    let date = NaiveDate::from_ymd_opt(2024, 1, 10).unwrap();
    assert_eq!(ChangeSet::new(date, vec![]).timestamp, "2024-01-10");
  }

  #[test]
  fn history_appends_in_order() {
    let mut h = History::new();
    h.append("R1", ChangeSet { timestamp: "a".into(), changes: vec![] });
    h.append("R1", ChangeSet { timestamp: "b".into(), changes: vec![] });
    let stamps: Vec<_> = h.change_sets("R1").iter().map(|c| c.timestamp.as_str()).collect();
    assert_eq!(stamps, ["a", "b"]);
    assert!(h.change_sets("R2").is_empty());
    assert_eq!(h.change_set_count(), 2);
  }
}
