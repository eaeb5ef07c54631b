//! Plain-text rendering of history listings.

use ordertrack_core::{change::Operation, filter::{HistoryEntry, ViewMode}};
use serde_json::Value;

/// Shown in place of list and map values outside the detailed views.
pub const TOO_MUCH_DATA: &str = "Too much data - only available in --details view";

/// Render one value of a history row.
pub fn format_value(value: Option<&Value>, mode: ViewMode) -> String {
  match value {
    None | Some(Value::Null) => "None".to_owned(),
    Some(Value::String(s)) => s.clone(),
    Some(bulk @ (Value::Array(_) | Value::Object(_))) => {
      if mode.shows_bulk_values() {
        let pretty = serde_json::to_string_pretty(bulk).unwrap_or_else(|_| bulk.to_string());
        format!("\n {pretty}")
      } else {
        TOO_MUCH_DATA.to_owned()
      }
    }
    Some(other) => other.to_string(),
  }
}

/// `- <date>: <op> <key>: <value>`, with `old -> new` for changes.
pub fn history_line(entry: &HistoryEntry, mode: ViewMode) -> String {
  let head = format!("- {}: {} {}", entry.timestamp, entry.operation.symbol(), entry.key);
  match entry.operation {
    Operation::Added => format!("{head}: {}", format_value(entry.value.as_ref(), mode)),
    Operation::Removed => format!("{head}: {}", format_value(entry.old_value.as_ref(), mode)),
    Operation::Changed => format!(
      "{head}: {} -> {}",
      format_value(entry.old_value.as_ref(), mode),
      format_value(entry.value.as_ref(), mode),
    ),
  }
}
