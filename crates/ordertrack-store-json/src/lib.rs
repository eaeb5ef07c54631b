//! JSON-file backend for the ordertrack change history.
//!
//! The whole history lives in one JSON document keyed by order reference.
//! Writes go through a temporary file and a rename so a crash never leaves a
//! half-written store behind.

mod fs;
mod migrate;
mod snapshot;
mod store;

pub mod error;

pub use error::{Error, Result};
pub use migrate::MigrationReport;
pub use snapshot::SnapshotCache;
pub use store::JsonHistoryStore;
