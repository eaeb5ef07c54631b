//! Structural diff: two order snapshots → a flat list of change records.
//!
//! Walks both trees in lockstep, recursing wherever both sides hold an
//! object under the same key. Leaves (including whole arrays) are compared by
//! value after trimming strings.

use serde_json::{Map, Value};

use crate::{change::ChangeRecord, normalize::clean_value};

/// Compute the change records that transition `old` into `new`.
///
/// Records for keys of `old` (removed or changed) come first, in `old`'s key
/// order; records for keys only present in `new` follow in `new`'s key order.
/// The history file and the timeline builder rely on this ordering.
pub fn diff(old: &Value, new: &Value) -> Vec<ChangeRecord> {
  let mut changes = Vec::new();
  diff_into(old, new, "", &mut changes);
  changes
}

/// Like [`diff`], with every emitted key prefixed by `prefix`.
///
/// `prefix` is used verbatim, so it should normally end with `.`.
pub fn diff_with_prefix(old: &Value, new: &Value, prefix: &str) -> Vec<ChangeRecord> {
  let mut changes = Vec::new();
  diff_into(old, new, prefix, &mut changes);
  changes
}

fn diff_into(old: &Value, new: &Value, prefix: &str, out: &mut Vec<ChangeRecord>) {
  match (old, new) {
    (Value::Object(old_map), Value::Object(new_map)) => {
      diff_maps(old_map, new_map, prefix, out);
    }
    // A root that is not an object on both sides cannot be walked; it is a
    // single change at the prefix itself.
    _ => {
      let old_value = clean_value(old);
      let new_value = clean_value(new);
      if old_value != new_value {
        out.push(ChangeRecord::changed(
          prefix.trim_end_matches('.'),
          old_value,
          new_value,
        ));
      }
    }
  }
}

fn diff_maps(
  old: &Map<String, Value>,
  new: &Map<String, Value>,
  prefix: &str,
  out: &mut Vec<ChangeRecord>,
) {
  for (key, old_value) in old {
    let path = format!("{prefix}{key}");
    match new.get(key) {
      None => out.push(ChangeRecord::removed(path, clean_value(old_value))),
      Some(new_value) => match (old_value, new_value) {
        (Value::Object(old_child), Value::Object(new_child)) => {
          diff_maps(old_child, new_child, &format!("{path}."), out);
        }
        _ => {
          let old_value = clean_value(old_value);
          let new_value = clean_value(new_value);
          if old_value != new_value {
            out.push(ChangeRecord::changed(path, old_value, new_value));
          }
        }
      },
    }
  }

  for (key, new_value) in new {
    if !old.contains_key(key) {
      out.push(ChangeRecord::added(format!("{prefix}{key}"), clean_value(new_value)));
    }
  }
}

// ─── Tests ────────────────────────────────────────────────────────────────────
