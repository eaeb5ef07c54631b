//! [`SnapshotCache`] — the last known snapshot of every order.

use std::path::{Path, PathBuf};

use serde_json::Value;
use tracing::warn;

use ordertrack_core::reconcile::order_reference;

use crate::{
  Result,
  fs::{Document, atomic_write, read_document},
};

/// The previously fetched order snapshots, stored as one JSON array.
#[derive(Debug, Clone)]
pub struct SnapshotCache {
  path: PathBuf,
}

impl SnapshotCache {
  pub fn open(path: impl Into<PathBuf>) -> Self { Self { path: path.into() } }

  pub fn path(&self) -> &Path { &self.path }

  /// The cached snapshots, or `None` if there is no usable cache.
  pub fn load(&self) -> Option<Vec<Value>> {
    match read_document(&self.path) {
      Document::Missing => None,
      Document::Unreadable(reason) => {
        warn!(path = %self.path.display(), %reason, "snapshot cache unreadable");
        None
      }
      Document::Parsed(Value::Array(snapshots)) => Some(snapshots),
      Document::Parsed(_) => {
        warn!(path = %self.path.display(), "snapshot cache is not a list");
        None
      }
    }
  }

  /// Replace the cache with `snapshots`.
  pub fn save(&self, snapshots: &[Value]) -> Result<()> {
    let contents = serde_json::to_string(snapshots)?;
    atomic_write(&self.path, &contents)
  }

  /// Order references of the cached snapshots, by list position.
  pub fn references(&self, reference_path: &str) -> Vec<String> {
    self
      .load()
      .unwrap_or_default()
      .iter()
      .enumerate()
      .map(|(i, s)| order_reference(s, reference_path, i))
      .collect()
  }
}
