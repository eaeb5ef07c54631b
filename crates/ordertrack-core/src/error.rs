//! Error types for `ordertrack-core`.

use thiserror::Error;

#[derive(Debug, Error)]
pub enum Error {
  /// A [`HistoryBackend`](crate::store::HistoryBackend) failed to persist.
  #[error("history backend error: {0}")]
  Backend(#[source] Box<dyn std::error::Error + Send + Sync>),
}

pub type Result<T, E = Error> = std::result::Result<T, E>;
