//! The `HistoryBackend` trait and its load report.
//!
//! The trait is implemented by storage backends (e.g.
//! `ordertrack-store-json`). The reconciler and the CLI depend on this
//! abstraction, not on any concrete backend.

use crate::change::{ChangeSet, History};

// ─── Load report ─────────────────────────────────────────────────────────────

/// What [`HistoryBackend::load`] found on disk.
///
/// Loading never fails: an unreadable store degrades to an empty history. The
/// status lets callers notice when that happened.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LoadStatus {
  /// No store exists yet.
  Missing,
  /// The store was read as-is.
  Loaded,
  /// A legacy store was converted and written back before loading.
  Migrated {
    change_sets:     usize,
    dropped_entries: usize,
  },
  /// The store could not be read and was treated as empty.
  Reset { reason: String },
}

/// A loaded history together with how it was obtained.
#[derive(Debug, Clone)]
pub struct Loaded {
  pub history: History,
  pub status:  LoadStatus,
}

// ─── Trait ───────────────────────────────────────────────────────────────────

/// Abstraction over a change history backend.
///
/// Change sets are append-only: a backend never reorders or rewrites a
/// sequence it has persisted, except for a one-time legacy migration on load.
pub trait HistoryBackend {
  type Error: std::error::Error + Send + Sync + 'static;

  /// Read the whole history. Never fails; see [`LoadStatus`].
  fn load(&self) -> Loaded;

  /// Replace the persisted history with `history`.
  fn save(&self, history: &History) -> Result<(), Self::Error>;

  /// Append `change_set` to the end of `order_ref`'s sequence and persist.
  fn append(&self, order_ref: &str, change_set: ChangeSet) -> Result<(), Self::Error> {
    let mut history = self.load().history;
    history.append(order_ref, change_set);
    self.save(&history)
  }
}
