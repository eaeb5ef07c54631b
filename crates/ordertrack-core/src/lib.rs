//! Change tracking and timeline reconstruction for externally fetched order
//! snapshots.
//!
//! This crate is free of file and network I/O. Persistence is abstracted
//! behind [`store::HistoryBackend`]; the JSON-file implementation lives in
//! `ordertrack-store-json`.

pub mod change;
pub mod diff;
pub mod error;
pub mod filter;
pub mod normalize;
pub mod reconcile;
pub mod store;
pub mod timeline;

pub use error::{Error, Result};
