//! Layered configuration: built-in defaults, then an optional TOML file, then
//! `ORDERTRACK_*` environment variables.

use std::path::{Path, PathBuf};

use ordertrack_core::{reconcile::DEFAULT_REFERENCE_PATH, timeline::TimelineFields};
use serde::Deserialize;

/// Resolved settings for one invocation.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct Settings {
  /// Directory holding the history file and the snapshot cache.
  pub data_dir:       PathBuf,
  pub history_file:   String,
  pub orders_file:    String,
  /// Dotted path of the order reference inside a snapshot.
  pub reference_path: String,
  /// Snapshot paths for timeline milestones. Only settable from the file.
  pub timeline:       TimelineFields,
}

impl Default for Settings {
  fn default() -> Self {
    Self {
      data_dir:       PathBuf::from("data/private"),
      history_file:   "tesla_order_history.json".into(),
      orders_file:    "tesla_orders.json".into(),
      reference_path: DEFAULT_REFERENCE_PATH.into(),
      timeline:       TimelineFields::default(),
    }
  }
}

impl Settings {
  /// Read `path` (if it exists) and the environment on top of the defaults.
  pub fn load(path: &Path) -> Result<Self, config::ConfigError> {
    config::Config::builder()
      .add_source(config::File::from(path).required(false))
      .add_source(config::Environment::with_prefix("ORDERTRACK"))
      .build()?
      .try_deserialize()
  }

  pub fn history_path(&self) -> PathBuf { self.data_dir.join(&self.history_file) }

  pub fn orders_path(&self) -> PathBuf { self.data_dir.join(&self.orders_file) }
}
