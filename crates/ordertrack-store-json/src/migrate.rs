//! One-shot importer for the legacy history format.
//!
//! Early versions kept a flat JSON array of change sets shared by all orders.
//! Each change was either a decorated text line or a record whose path was
//! prefixed with the order's position in the order list:
//!
//! ```text
//! + Added key '0.details.tasks.scheduling.deliveryWindowDisplay': Apr 1 - Apr 10
//! - Removed key '1.order.vin': 5YJ3E1EA1PF000001
//! + Added order 2
//! - Removed order 2
//! - 0.details.orderStatus: BOOKED
//! + 0.details.orderStatus: IN_PRODUCTION
//! ```
//!
//! The last two lines form a pair that becomes a single `changed` record.
//! Lines that fit none of these shapes are dropped.

use serde_json::{Map, Value};
use tracing::debug;

use ordertrack_core::change::{ChangeRecord, ChangeSet, History, Operation};

/// Counts from a completed migration.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct MigrationReport {
  /// Change sets in the migrated history.
  pub change_sets:     usize,
  /// Legacy lines or entries that could not be understood.
  pub dropped_entries: usize,
}

// ─── Line grammar ────────────────────────────────────────────────────────────

#[derive(Debug, Clone, PartialEq)]
enum LegacyLine {
  AddedKey { path: String, value: Value },
  RemovedKey { path: String, value: Option<Value> },
  AddedOrder(usize),
  RemovedOrder(usize),
  OldValue { path: String, value: Value },
  NewValue { path: String, value: Value },
}

/// Interpret a legacy scalar as JSON where possible, else as plain text.
fn parse_value(raw: &str) -> Value {
  let raw = raw.trim();
  match raw {
    "None" => Value::Null,
    "True" => Value::Bool(true),
    "False" => Value::Bool(false),
    _ => serde_json::from_str(raw).unwrap_or_else(|_| Value::String(raw.to_owned())),
  }
}

/// Split `'<path>'[: <value>]` into the quoted path and the optional value.
fn quoted_path(rest: &str) -> Option<(String, Option<Value>)> {
  let rest = rest.strip_prefix('\'')?;
  let (path, tail) = rest.split_once('\'')?;
  if path.is_empty() {
    return None;
  }
  let value = tail.strip_prefix(':').map(parse_value);
  Some((path.to_owned(), value))
}

/// `<path>: <value>` with a path that cannot contain whitespace.
fn bare_path(rest: &str) -> Option<(String, Value)> {
  let (path, value) = rest.split_once(':')?;
  if path.is_empty() || path.contains(char::is_whitespace) {
    return None;
  }
  Some((path.to_owned(), parse_value(value)))
}

fn parse_line(line: &str) -> Option<LegacyLine> {
  let line = line.trim();

  if let Some(rest) = line.strip_prefix("+ Added key ") {
    let (path, value) = quoted_path(rest)?;
    return Some(LegacyLine::AddedKey {
      path,
      value: value.unwrap_or(Value::Null),
    });
  }
  if let Some(rest) = line.strip_prefix("- Removed key ") {
    let (path, value) = quoted_path(rest)?;
    return Some(LegacyLine::RemovedKey { path, value });
  }
  if let Some(rest) = line.strip_prefix("+ Added order ") {
    return rest.trim().parse().ok().map(LegacyLine::AddedOrder);
  }
  if let Some(rest) = line.strip_prefix("- Removed order ") {
    return rest.trim().parse().ok().map(LegacyLine::RemovedOrder);
  }
  if let Some(rest) = line.strip_prefix("- ") {
    let (path, value) = bare_path(rest)?;
    return Some(LegacyLine::OldValue { path, value });
  }
  if let Some(rest) = line.strip_prefix("+ ") {
    let (path, value) = bare_path(rest)?;
    return Some(LegacyLine::NewValue { path, value });
  }
  None
}

/// A record whose key still carries the order-index prefix (or is the bare
/// index, for whole-order additions and removals).
fn order_record(operation: Operation, index: usize) -> ChangeRecord {
  ChangeRecord {
    operation,
    key: index.to_string(),
    value: None,
    old_value: None,
  }
}

/// Turn the text lines of one change set into records, pairing each old-value
/// line with the new-value line that immediately follows it.
fn records_from_lines<'a>(
  lines: impl IntoIterator<Item = &'a str>,
  dropped: &mut usize,
) -> Vec<ChangeRecord> {
  let mut records = Vec::new();
  let mut pending_old: Option<(String, Value)> = None;

  for raw in lines {
    let parsed = parse_line(raw);

    // An old-value line only survives if the very next line completes it.
    if let Some((old_path, old_value)) = pending_old.take() {
      match &parsed {
        Some(LegacyLine::NewValue { path, value }) if *path == old_path => {
          records.push(ChangeRecord::changed(old_path, old_value, value.clone()));
          continue;
        }
        _ => {
          debug!(path = %old_path, "dropping unpaired legacy old-value line");
          *dropped += 1;
        }
      }
    }

    match parsed {
      Some(LegacyLine::AddedKey { path, value }) => {
        records.push(ChangeRecord::added(path, value));
      }
      Some(LegacyLine::RemovedKey { path, value }) => {
        records.push(ChangeRecord::removed(path, value.unwrap_or(Value::Null)));
      }
      Some(LegacyLine::AddedOrder(i)) => records.push(order_record(Operation::Added, i)),
      Some(LegacyLine::RemovedOrder(i)) => records.push(order_record(Operation::Removed, i)),
      Some(LegacyLine::OldValue { path, value }) => pending_old = Some((path, value)),
      Some(LegacyLine::NewValue { path, .. }) => {
        debug!(path = %path, "dropping unpaired legacy new-value line");
        *dropped += 1;
      }
      None => {
        debug!(line = %raw, "dropping unparseable legacy line");
        *dropped += 1;
      }
    }
  }

  if pending_old.is_some() {
    *dropped += 1;
  }
  records
}

fn flush_lines(lines: &mut Vec<&str>, records: &mut Vec<ChangeRecord>, dropped: &mut usize) {
  if !lines.is_empty() {
    records.extend(records_from_lines(lines.drain(..), dropped));
  }
}

/// Records of one legacy change set, in order. Strings are parsed as lines;
/// objects are taken as structured records.
fn records_from_changes(changes: &[Value], dropped: &mut usize) -> Vec<ChangeRecord> {
  let mut records = Vec::new();
  let mut lines: Vec<&str> = Vec::new();

  for change in changes {
    match change {
      Value::String(line) => lines.push(line),
      Value::Object(_) => {
        flush_lines(&mut lines, &mut records, dropped);
        match serde_json::from_value::<ChangeRecord>(change.clone()) {
          Ok(record) => records.push(record),
          Err(_) => *dropped += 1,
        }
      }
      _ => *dropped += 1,
    }
  }
  flush_lines(&mut lines, &mut records, dropped);
  records
}

/// Split `"<index>.<path>"` (or a bare `"<index>"`) into its parts.
fn split_index(key: &str) -> Option<(usize, &str)> {
  match key.split_once('.') {
    Some((index, rest)) => Some((index.parse().ok()?, rest)),
    None => Some((key.parse().ok()?, "")),
  }
}

fn reference_for(index: usize, references: &[String]) -> String {
  references
    .get(index)
    .cloned()
    .unwrap_or_else(|| index.to_string())
}

// ─── Shapes ──────────────────────────────────────────────────────────────────

/// Whether `document` needs migrating: a flat array, or a keyed store that
/// still holds text lines.
pub(crate) fn is_legacy(document: &Value) -> bool {
  match document {
    Value::Array(_) => true,
    Value::Object(map) => map.values().any(|entries| {
      entries.as_array().is_some_and(|entries| {
        entries.iter().any(|entry| {
          entry
            .get("changes")
            .and_then(Value::as_array)
            .is_some_and(|changes| changes.iter().any(Value::is_string))
        })
      })
    }),
    _ => false,
  }
}

pub(crate) fn timestamp_of(entry: &Map<String, Value>) -> String {
  match entry.get("timestamp") {
    Some(Value::String(s)) => s.clone(),
    Some(Value::Null) | None => String::new(),
    Some(other) => other.to_string(),
  }
}

/// Migrate the flat shared array, regrouping records by order reference.
fn migrate_flat(entries: &[Value], references: &[String], report: &mut MigrationReport) -> History {
  let mut history = History::new();

  for entry in entries {
    let Some(entry) = entry.as_object() else {
      report.dropped_entries += 1;
      continue;
    };
    let Some(changes) = entry.get("changes").and_then(Value::as_array) else {
      report.dropped_entries += 1;
      continue;
    };
    let timestamp = timestamp_of(entry);

    // Group by order, keeping the order in which references first appear.
    let mut groups: Vec<(String, Vec<ChangeRecord>)> = Vec::new();
    for mut record in records_from_changes(changes, &mut report.dropped_entries) {
      let Some((index, path)) = split_index(&record.key) else {
        debug!(key = %record.key, "dropping legacy record without order index");
        report.dropped_entries += 1;
        continue;
      };
      let reference = reference_for(index, references);
      record.key = path.to_owned();
      match groups.iter_mut().find(|(r, _)| *r == reference) {
        Some((_, records)) => records.push(record),
        None => groups.push((reference, vec![record])),
      }
    }

    for (reference, changes) in groups {
      history.append(
        reference,
        ChangeSet {
          timestamp: timestamp.clone(),
          changes,
        },
      );
    }
  }
  history
}

/// Migrate a store that is already keyed by reference but whose change sets
/// still contain text lines. Paths are not index-prefixed here.
fn migrate_keyed(map: &Map<String, Value>, report: &mut MigrationReport) -> History {
  let mut history = History::new();
  for (reference, entries) in map {
    let Some(entries) = entries.as_array() else {
      report.dropped_entries += 1;
      continue;
    };
    for entry in entries {
      let Some(entry) = entry.as_object() else {
        report.dropped_entries += 1;
        continue;
      };
      let Some(changes) = entry.get("changes").and_then(Value::as_array) else {
        report.dropped_entries += 1;
        continue;
      };
      history.append(
        reference.clone(),
        ChangeSet {
          timestamp: timestamp_of(entry),
          changes:   records_from_changes(changes, &mut report.dropped_entries),
        },
      );
    }
  }
  history
}

/// Convert a legacy document into a [`History`]. Returns `None` when the
/// document is already in the current shape.
///
/// `references` maps order-list positions to order references; positions
/// without an entry keep the position itself as their reference.
pub(crate) fn migrate(
  document: &Value,
  references: &[String],
) -> Option<(History, MigrationReport)> {
  if !is_legacy(document) {
    return None;
  }
  let mut report = MigrationReport::default();
  let history = match document {
    Value::Array(entries) => migrate_flat(entries, references, &mut report),
    Value::Object(map) => migrate_keyed(map, &mut report),
    _ => return None,
  };
  report.change_sets = history.change_set_count();
  Some((history, report))
}

// ─── Tests ────────────────────────────────────────────────────────────────────
