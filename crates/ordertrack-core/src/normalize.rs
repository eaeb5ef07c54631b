//! Small normalisation helpers shared by the differ, the filter, and the
//! timeline builder.

use chrono::{DateTime, NaiveDate, NaiveDateTime};
use serde_json::Value;

/// Normalise a key for comparison: trim, collapse internal whitespace runs to
/// a single space, and lowercase.
pub fn normalize_key(key: &str) -> String {
  key.split_whitespace().collect::<Vec<_>>().join(" ").to_lowercase()
}

/// Trim surrounding whitespace on strings; other values are returned as-is.
pub fn clean_value(value: &Value) -> Value {
  match value {
    Value::String(s) => Value::String(s.trim().to_owned()),
    other => other.clone(),
  }
}

/// Truncate an ISO-8601 timestamp to its `YYYY-MM-DD` date.
///
/// Accepts offsets (including `Z`), fractional seconds, a space instead of
/// `T`, and bare dates. Anything that does not parse is returned unchanged.
pub fn date_from_timestamp(timestamp: &str) -> String {
  if timestamp.is_empty() || timestamp == "N/A" {
    return timestamp.to_owned();
  }
  match parse_date(timestamp.trim()) {
    Some(date) => date.format("%Y-%m-%d").to_string(),
    None => timestamp.to_owned(),
  }
}

fn parse_date(ts: &str) -> Option<NaiveDate> {
  if let Ok(dt) = DateTime::parse_from_rfc3339(ts) {
    return Some(dt.date_naive());
  }
  for fmt in ["%Y-%m-%dT%H:%M:%S%.f%:z", "%Y-%m-%d %H:%M:%S%.f%:z"] {
    if let Ok(dt) = DateTime::parse_from_str(ts, fmt) {
      return Some(dt.date_naive());
    }
  }
  for fmt in [
    "%Y-%m-%dT%H:%M:%S%.f",
    "%Y-%m-%d %H:%M:%S%.f",
    "%Y-%m-%dT%H:%M",
    "%Y-%m-%d %H:%M",
  ] {
    if let Ok(dt) = NaiveDateTime::parse_from_str(ts, fmt) {
      return Some(dt.date());
    }
  }
  NaiveDate::parse_from_str(ts, "%Y-%m-%d").ok()
}

/// Render a JSON value as a display string. `null` has no display form;
/// strings are date-truncated when they look like timestamps.
pub fn display_string(value: &Value) -> Option<String> {
  match value {
    Value::Null => None,
    Value::String(s) => Some(date_from_timestamp(s)),
    Value::Bool(b) => Some(b.to_string()),
    Value::Number(n) => Some(n.to_string()),
    other => Some(other.to_string()),
  }
}

/// Loose truthiness: null, false, zero and empty values are false. Used when
/// deciding whether a snapshot field is present enough to become a timeline
/// event.
pub fn is_truthy(value: &Value) -> bool {
  match value {
    Value::Null => false,
    Value::Bool(b) => *b,
    Value::Number(n) => n.as_f64().is_some_and(|f| f != 0.0),
    Value::String(s) => !s.is_empty(),
    Value::Array(a) => !a.is_empty(),
    Value::Object(o) => !o.is_empty(),
  }
}

/// Look up a dotted path (`a.b.c`) inside nested objects.
pub fn lookup_path<'a>(root: &'a Value, path: &str) -> Option<&'a Value> {
  path
    .split('.')
    .filter(|segment| !segment.is_empty())
    .try_fold(root, |node, segment| match node {
      Value::Object(map) => map.get(segment),
      Value::Array(items) => segment.parse::<usize>().ok().and_then(|i| items.get(i)),
      _ => None,
    })
}

#[cfg(test)]
mod tests {
  use serde_json::json;

  use super::*;

  #[test]
  fn key_normalisation_collapses_and_lowercases() {
    assert_eq!(normalize_key("  ETA  to\tDelivery   Center "), "eta to delivery center");
    assert_eq!(normalize_key(""), "");
  }

  #[test]
  fn timestamps_truncate_to_date() {
    assert_eq!(date_from_timestamp("2024-07-25T12:34:56Z"), "2024-07-25");
    assert_eq!(date_from_timestamp("2024-07-25T12:34:56.123+02:00"), "2024-07-25");
    assert_eq!(date_from_timestamp("2024-07-25T12:34:56"), "2024-07-25");
    assert_eq!(date_from_timestamp("2024-07-25 08:00:00"), "2024-07-25");
    assert_eq!(date_from_timestamp("2024-07-25"), "2024-07-25");
  }

  #[test]
  fn unparseable_timestamps_pass_through() {
    assert_eq!(date_from_timestamp("N/A"), "N/A");
    assert_eq!(date_from_timestamp(""), "");
    assert_eq!(date_from_timestamp("Sep 12 - Sep 30"), "Sep 12 - Sep 30");
  }

  #[test]
  fn clean_value_trims_only_strings() {
    assert_eq!(clean_value(&json!("  x ")), json!("x"));
    assert_eq!(clean_value(&json!([" x "])), json!([" x "]));
  }

  #[test]
  fn truthiness() {
    assert!(!is_truthy(&json!(null)));
    assert!(!is_truthy(&json!("")));
    assert!(!is_truthy(&json!(0)));
    assert!(is_truthy(&json!("2024-01-10")));
    assert!(is_truthy(&json!(30)));
  }

  #[test]
  fn dotted_lookup() {
    let v = json!({ "a": { "b": [{ "c": 1 }] } });
    assert_eq!(lookup_path(&v, "a.b.0.c"), Some(&json!(1)));
    assert_eq!(lookup_path(&v, "a.x"), None);
  }
}
