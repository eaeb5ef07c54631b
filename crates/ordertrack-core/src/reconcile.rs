//! Reconciliation: previous snapshots + freshly fetched snapshots → appended
//! change sets.

use std::collections::HashMap;

use chrono::NaiveDate;
use serde_json::Value;
use tracing::{debug, info};

use crate::{
  Error, Result,
  change::{ChangeRecord, ChangeSet},
  diff::diff,
  normalize::lookup_path,
  store::HistoryBackend,
};

/// Default dotted path of the order reference inside a snapshot.
pub const DEFAULT_REFERENCE_PATH: &str = "order.referenceNumber";

// ─── Outcome ─────────────────────────────────────────────────────────────────

/// Overall result of one reconciliation pass.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Status {
  /// There were no previous snapshots to compare against.
  NoBaseline,
  Unchanged,
  Changed,
}

impl Status {
  /// The machine-readable code printed in status-only mode.
  pub fn code(&self) -> i8 {
    match self {
      Self::NoBaseline => -1,
      Self::Unchanged => 0,
      Self::Changed => 1,
    }
  }
}

/// Everything a reconciliation pass observed.
#[derive(Debug, Clone)]
pub struct Outcome {
  pub status:         Status,
  /// Change sets that were appended, keyed by order reference. Orders that
  /// appeared or disappeared get a set holding one order-level record.
  pub appended:       Vec<(String, ChangeSet)>,
  /// References present now but not in the previous snapshots.
  pub added_orders:   Vec<String>,
  /// References present before but missing now.
  pub removed_orders: Vec<String>,
}

// ─── Reconciler ──────────────────────────────────────────────────────────────

/// Diffs order snapshots and appends the results to a [`HistoryBackend`].
pub struct Reconciler<'a, B: HistoryBackend> {
  backend:        &'a B,
  reference_path: String,
}

impl<'a, B: HistoryBackend> Reconciler<'a, B> {
  pub fn new(backend: &'a B) -> Self {
    Self {
      backend,
      reference_path: DEFAULT_REFERENCE_PATH.to_owned(),
    }
  }

  /// Use a different dotted path to read each order's reference.
  pub fn with_reference_path(mut self, path: impl Into<String>) -> Self {
    self.reference_path = path.into();
    self
  }

  /// The reference of `snapshot`, or its list index when it has none.
  pub fn reference_of(&self, snapshot: &Value, index: usize) -> String {
    order_reference(snapshot, &self.reference_path, index)
  }

  /// Compare `current` against `previous` order by order and append one
  /// change set per order that changed, dated `today`. An empty `previous`
  /// list counts as no baseline.
  ///
  /// The backend is written at most once per call.
  pub fn reconcile(
    &self,
    previous: Option<&[Value]>,
    current: &[Value],
    today: NaiveDate,
  ) -> Result<Outcome> {
    let Some(previous) = previous.filter(|p| !p.is_empty()) else {
      debug!("no previous snapshots; nothing to compare");
      return Ok(Outcome {
        status:         Status::NoBaseline,
        appended:       vec![],
        added_orders:   vec![],
        removed_orders: vec![],
      });
    };

    let previous_by_ref: HashMap<String, &Value> = previous
      .iter()
      .enumerate()
      .map(|(i, s)| (self.reference_of(s, i), s))
      .collect();

    let mut appended = Vec::new();
    let mut added_orders = Vec::new();
    let mut seen = Vec::with_capacity(current.len());

    for (index, snapshot) in current.iter().enumerate() {
      let reference = self.reference_of(snapshot, index);
      seen.push(reference.clone());

      let Some(old) = previous_by_ref.get(&reference) else {
        info!(order = %reference, "order appeared");
        appended.push((
          reference.clone(),
          ChangeSet::new(today, vec![ChangeRecord::order_added()]),
        ));
        added_orders.push(reference);
        continue;
      };

      let changes = diff(old, snapshot);
      debug!(order = %reference, changes = changes.len(), "diffed order");
      if !changes.is_empty() {
        appended.push((reference, ChangeSet::new(today, changes)));
      }
    }

    let removed_orders: Vec<String> = previous
      .iter()
      .enumerate()
      .map(|(i, s)| self.reference_of(s, i))
      .filter(|r| !seen.contains(r))
      .collect();
    for reference in &removed_orders {
      info!(order = %reference, "order disappeared");
      appended.push((
        reference.clone(),
        ChangeSet::new(today, vec![ChangeRecord::order_removed()]),
      ));
    }

    if !appended.is_empty() {
      let mut history = self.backend.load().history;
      for (reference, change_set) in &appended {
        info!(
          order = %reference,
          changes = change_set.changes.len(),
          "appending change set"
        );
        history.append(reference.clone(), change_set.clone());
      }
      self
        .backend
        .save(&history)
        .map_err(|e| Error::Backend(Box::new(e)))?;
    }

    let status = if appended.is_empty() {
      Status::Unchanged
    } else {
      Status::Changed
    };

    Ok(Outcome {
      status,
      appended,
      added_orders,
      removed_orders,
    })
  }
}

/// Read the reference of `snapshot` at `path`, falling back to `index`.
///
/// Only strings and numbers count as references; they are used verbatim.
pub fn order_reference(snapshot: &Value, path: &str, index: usize) -> String {
  let reference = match lookup_path(snapshot, path) {
    Some(Value::String(s)) => s.trim().to_owned(),
    Some(Value::Number(n)) => n.to_string(),
    _ => String::new(),
  };
  if reference.is_empty() { index.to_string() } else { reference }
}

// ─── Tests ────────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
  use std::{cell::RefCell, convert::Infallible};

  use serde_json::json;

  use super::*;
  use crate::{
    change::{ChangeRecord, History},
    store::{LoadStatus, Loaded},
  };

  /// In-memory backend that counts saves.
  #[derive(Default)]
  struct MemoryBackend {
    history: RefCell<History>,
    saves:   RefCell<usize>,
  }

  impl HistoryBackend for MemoryBackend {
    type Error = Infallible;

    fn load(&self) -> Loaded {
      Loaded {
        history: self.history.borrow().clone(),
        status:  LoadStatus::Loaded,
      }
    }

    fn save(&self, history: &History) -> Result<(), Infallible> {
      *self.history.borrow_mut() = history.clone();
      *self.saves.borrow_mut() += 1;
      Ok(())
    }
  }

  fn order(reference: &str, status: &str) -> Value {
    json!({ "order": { "referenceNumber": reference, "orderStatus": status } })
  }

  fn today() -> NaiveDate { NaiveDate::from_ymd_opt(2024, 5, 1).unwrap() }

  #[test]
  fn no_previous_snapshots_is_no_baseline() {
    let backend = MemoryBackend::default();
    let outcome = Reconciler::new(&backend)
      .reconcile(None, &[order("RN1", "BOOKED")], today())
      .unwrap();
    assert_eq!(outcome.status, Status::NoBaseline);
    assert_eq!(outcome.status.code(), -1);
    assert_eq!(*backend.saves.borrow(), 0);
  }

  #[test]
  fn unchanged_orders_write_nothing() {
    let backend = MemoryBackend::default();
    let prev = [order("RN1", "BOOKED")];
    let outcome = Reconciler::new(&backend)
      .reconcile(Some(&prev[..]), &prev, today())
      .unwrap();
    assert_eq!(outcome.status, Status::Unchanged);
    assert_eq!(outcome.status.code(), 0);
    assert_eq!(*backend.saves.borrow(), 0);
  }

  #[test]
  fn status_change_is_appended_under_reference() {
    let backend = MemoryBackend::default();
    let prev = [order("RN1", "BOOKED")];
    let curr = [order("RN1", "IN_PRODUCTION")];
    let outcome = Reconciler::new(&backend)
      .reconcile(Some(&prev[..]), &curr, today())
      .unwrap();

    assert_eq!(outcome.status, Status::Changed);
    let history = backend.load().history;
    let sets = history.change_sets("RN1");
    assert_eq!(sets.len(), 1);
    assert_eq!(sets[0].timestamp, "2024-05-01");
    assert_eq!(
      sets[0].changes,
      vec![ChangeRecord::changed(
        "order.orderStatus",
        json!("BOOKED"),
        json!("IN_PRODUCTION"),
      )]
    );
  }

  #[test]
  fn orders_are_matched_by_reference_not_position() {
    let backend = MemoryBackend::default();
    let prev = [order("RN1", "BOOKED"), order("RN2", "BOOKED")];
    let curr = [order("RN2", "DELIVERED"), order("RN1", "BOOKED")];
    let outcome = Reconciler::new(&backend)
      .reconcile(Some(&prev[..]), &curr, today())
      .unwrap();

    assert_eq!(outcome.appended.len(), 1);
    assert_eq!(outcome.appended[0].0, "RN2");
    assert!(backend.load().history.change_sets("RN1").is_empty());
  }

  #[test]
  fn several_changed_orders_are_saved_once() {
    let backend = MemoryBackend::default();
    let prev = [order("RN1", "A"), order("RN2", "A")];
    let curr = [order("RN1", "B"), order("RN2", "B")];
    Reconciler::new(&backend)
      .reconcile(Some(&prev[..]), &curr, today())
      .unwrap();
    assert_eq!(*backend.saves.borrow(), 1);
    assert_eq!(backend.load().history.change_set_count(), 2);
  }

  #[test]
  fn appearing_and_disappearing_orders_are_recorded() {
    let backend = MemoryBackend::default();
    let prev = [order("RN1", "A")];
    let curr = [order("RN2", "A")];
    let outcome = Reconciler::new(&backend)
      .reconcile(Some(&prev[..]), &curr, today())
      .unwrap();
    assert_eq!(outcome.status, Status::Changed);
    assert_eq!(outcome.added_orders, ["RN2"]);
    assert_eq!(outcome.removed_orders, ["RN1"]);
    assert_eq!(*backend.saves.borrow(), 1);

    let history = backend.load().history;
    assert_eq!(history.change_sets("RN2")[0].changes, vec![ChangeRecord::order_added()]);
    assert_eq!(history.change_sets("RN1")[0].changes, vec![ChangeRecord::order_removed()]);
  }

  #[test]
  fn new_order_next_to_an_unchanged_one_is_recorded() {
    let backend = MemoryBackend::default();
    let prev = [order("RN1", "A")];
    let curr = [order("RN1", "A"), order("RN2", "A")];
    let outcome = Reconciler::new(&backend)
      .reconcile(Some(&prev[..]), &curr, today())
      .unwrap();
    assert_eq!(outcome.status, Status::Changed);
    assert_eq!(backend.load().history.change_set_count(), 1);
    assert!(backend.load().history.change_sets("RN1").is_empty());
  }

  #[test]
  fn empty_previous_list_is_no_baseline() {
    let backend = MemoryBackend::default();
    let prev: [Value; 0] = [];
    let outcome = Reconciler::new(&backend)
      .reconcile(Some(&prev[..]), &[order("RN1", "A"), order("RN2", "A")], today())
      .unwrap();
    assert_eq!(outcome.status, Status::NoBaseline);
    assert_eq!(outcome.status.code(), -1);
    assert!(outcome.added_orders.is_empty());
    assert_eq!(*backend.saves.borrow(), 0);
  }

  /// Backend whose writes always fail.
  struct ReadOnlyBackend;

  impl HistoryBackend for ReadOnlyBackend {
    type Error = std::io::Error;

    fn load(&self) -> Loaded {
      Loaded {
        history: History::new(),
        status:  LoadStatus::Missing,
      }
    }

    fn save(&self, _: &History) -> Result<(), std::io::Error> {
      Err(std::io::Error::new(std::io::ErrorKind::PermissionDenied, "read-only"))
    }
  }

  #[test]
  fn backend_write_failure_is_propagated() {
    let prev = [order("RN1", "A")];
    let curr = [order("RN1", "B")];
    let err = Reconciler::new(&ReadOnlyBackend)
      .reconcile(Some(&prev[..]), &curr, today())
      .unwrap_err();
    assert!(matches!(err, Error::Backend(_)));
    assert!(err.to_string().contains("read-only"));
  }

  #[test]
  fn missing_reference_falls_back_to_index() {
    let snapshot = json!({ "order": {} });
    assert_eq!(order_reference(&snapshot, DEFAULT_REFERENCE_PATH, 3), "3");
    let custom = json!({ "ref": "X9" });
    assert_eq!(order_reference(&custom, "ref", 0), "X9");
    let numeric = json!({ "ref": 42 });
    assert_eq!(order_reference(&numeric, "ref", 0), "42");
  }

  #[test]
  fn date_shaped_reference_is_kept_verbatim() {
    let snapshot = json!({ "order": { "referenceNumber": "2024-01-10T09:30:00Z" } });
    assert_eq!(
      order_reference(&snapshot, DEFAULT_REFERENCE_PATH, 0),
      "2024-01-10T09:30:00Z"
    );
  }
}
