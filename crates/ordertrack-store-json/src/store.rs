//! [`JsonHistoryStore`] — the JSON-file implementation of [`HistoryBackend`].

use std::path::{Path, PathBuf};

use serde_json::{Map, Value};
use tracing::{debug, info, warn};

use ordertrack_core::{
  change::{ChangeRecord, ChangeSet, History},
  store::{HistoryBackend, LoadStatus, Loaded},
};

use crate::{
  Error, Result,
  fs::{Document, atomic_write, read_document},
  migrate::{MigrationReport, migrate, timestamp_of},
};

// ─── Store ───────────────────────────────────────────────────────────────────

/// A change history backed by a single JSON file.
///
/// A legacy-format file found on load is migrated and written back before the
/// history is returned. `legacy_references` maps order-list positions in the
/// legacy file to order references.
#[derive(Debug, Clone)]
pub struct JsonHistoryStore {
  path:              PathBuf,
  legacy_references: Vec<String>,
}

impl JsonHistoryStore {
  /// Use the history file at `path`. Nothing is read until [`load`].
  ///
  /// [`load`]: HistoryBackend::load
  pub fn open(path: impl Into<PathBuf>) -> Self {
    Self {
      path:              path.into(),
      legacy_references: Vec::new(),
    }
  }

  /// Set the position → reference mapping used when migrating a legacy file.
  pub fn with_legacy_references(mut self, references: Vec<String>) -> Self {
    self.legacy_references = references;
    self
  }

  pub fn path(&self) -> &Path { &self.path }

  /// Run the legacy migration if the file needs it.
  ///
  /// Returns `None` when the file is missing, unreadable, or already in the
  /// current shape. Running this twice is a no-op the second time.
  pub fn migrate(&self) -> Result<Option<MigrationReport>> {
    let Document::Parsed(document) = read_document(&self.path) else {
      return Ok(None);
    };
    let Some((history, report)) = migrate(&document, &self.legacy_references) else {
      return Ok(None);
    };
    self.save(&history)?;
    info!(
      path = %self.path.display(),
      change_sets = report.change_sets,
      dropped = report.dropped_entries,
      "migrated legacy history"
    );
    Ok(Some(report))
  }
}

/// Read a current-shape document, skipping anything that does not fit.
fn history_from_document(map: &Map<String, Value>) -> History {
  map
    .iter()
    .filter_map(|(reference, entries)| {
      let Some(entries) = entries.as_array() else {
        debug!(order = %reference, "skipping non-list history entry");
        return None;
      };
      let sets = entries.iter().filter_map(change_set_from_value).collect();
      Some((reference.clone(), sets))
    })
    .collect()
}

fn change_set_from_value(entry: &Value) -> Option<ChangeSet> {
  let entry = entry.as_object()?;
  let changes = entry.get("changes")?.as_array()?;
  let timestamp = timestamp_of(entry);
  let changes = changes
    .iter()
    .filter_map(|c| serde_json::from_value::<ChangeRecord>(c.clone()).ok())
    .collect();
  Some(ChangeSet { timestamp, changes })
}

fn reset(path: &Path, reason: String) -> Loaded {
  warn!(path = %path.display(), %reason, "history unreadable; starting empty");
  Loaded {
    history: History::new(),
    status:  LoadStatus::Reset { reason },
  }
}

// ─── HistoryBackend impl ─────────────────────────────────────────────────────

impl HistoryBackend for JsonHistoryStore {
  type Error = Error;

  fn load(&self) -> Loaded {
    let document = match read_document(&self.path) {
      Document::Missing => {
        return Loaded {
          history: History::new(),
          status:  LoadStatus::Missing,
        };
      }
      Document::Unreadable(reason) => return reset(&self.path, reason),
      Document::Parsed(document) => document,
    };

    if let Some((history, report)) = migrate(&document, &self.legacy_references) {
      // The migrated history is still usable if the write-back fails; the
      // migration simply runs again next time.
      if let Err(e) = self.save(&history) {
        warn!(path = %self.path.display(), error = %e, "could not write migrated history");
      } else {
        info!(
          path = %self.path.display(),
          change_sets = report.change_sets,
          dropped = report.dropped_entries,
          "migrated legacy history"
        );
      }
      return Loaded {
        history,
        status: LoadStatus::Migrated {
          change_sets:     report.change_sets,
          dropped_entries: report.dropped_entries,
        },
      };
    }

    match document {
      Value::Object(map) => Loaded {
        history: history_from_document(&map),
        status:  LoadStatus::Loaded,
      },
      other => reset(
        &self.path,
        format!("expected an object at the root, found {}", json_kind(&other)),
      ),
    }
  }

  fn save(&self, history: &History) -> Result<()> {
    let contents = serde_json::to_string(history)?;
    atomic_write(&self.path, &contents)
  }
}

fn json_kind(value: &Value) -> &'static str {
  match value {
    Value::Null => "null",
    Value::Bool(_) => "a boolean",
    Value::Number(_) => "a number",
    Value::String(_) => "a string",
    Value::Array(_) => "an array",
    Value::Object(_) => "an object",
  }
}
