//! `ordertrack` — change history and timelines for fetched order snapshots.
//!
//! # Usage
//!
//! ```
//! ordertrack reconcile --input fetched.json
//! ordertrack reconcile --input fetched.json --status
//! ordertrack timeline RN123456789 --share
//! ordertrack history --details
//! ordertrack migrate
//! ```

mod render;
mod settings;

use std::{fs, path::PathBuf};

use anyhow::{Context, Result};
use clap::{Args, Parser, Subcommand};
use ordertrack_core::{
  change::History,
  filter::{KeyTables, ViewMode, history_entries},
  reconcile::{Reconciler, Status, order_reference},
  store::HistoryBackend,
  timeline::{build_timeline, present},
};
use ordertrack_store_json::{JsonHistoryStore, SnapshotCache};
use serde_json::Value;
use settings::Settings;
use tracing::level_filters::LevelFilter;
use tracing_subscriber::EnvFilter;

// ─── CLI args ─────────────────────────────────────────────────────────────────

#[derive(Parser, Debug)]
#[command(author, version, about = "Track changes to order snapshots over time")]
struct Cli {
  /// Path to the TOML configuration file.
  #[arg(short, long, default_value = "ordertrack.toml", env = "ORDERTRACK_CONFIG")]
  config: PathBuf,

  #[command(subcommand)]
  command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
  /// Compare freshly fetched snapshots against the cache and record changes.
  Reconcile {
    /// JSON file holding the fetched list of order snapshots.
    #[arg(short, long, value_name = "FILE")]
    input:  PathBuf,
    /// Print only the status code: 1 changed, 0 unchanged, -1 no baseline.
    #[arg(long)]
    status: bool,
  },
  /// Print the milestone timeline of one or all cached orders.
  Timeline {
    /// Order reference; all cached orders when omitted.
    reference: Option<String>,
    #[command(flatten)]
    mode:      ModeArgs,
  },
  /// Print the change history of one or all orders.
  History {
    /// Order reference; all orders with history when omitted.
    reference: Option<String>,
    #[command(flatten)]
    mode:      ModeArgs,
  },
  /// Convert a legacy history file to the current format.
  Migrate,
}

/// View mode flags. At most one may be given.
#[derive(Args, Debug, Clone, Copy)]
#[group(multiple = false)]
struct ModeArgs {
  /// Include financing, payment and other detail fields.
  #[arg(long)]
  details:  bool,
  /// Hide values that identify the vehicle or the customer.
  #[arg(long)]
  share:    bool,
  /// Show every recorded key, translated or not.
  #[arg(long)]
  all_keys: bool,
}

impl ModeArgs {
  fn mode(self) -> ViewMode {
    if self.details {
      ViewMode::Detailed
    } else if self.share {
      ViewMode::Share
    } else if self.all_keys {
      ViewMode::AllKeys
    } else {
      ViewMode::Basic
    }
  }
}

// ─── Entry point ──────────────────────────────────────────────────────────────

fn main() -> Result<()> {
  // Logs go to stderr; stdout is reserved for command output.
  tracing_subscriber::fmt()
    .with_env_filter(
      EnvFilter::builder()
        .with_default_directive(LevelFilter::WARN.into())
        .from_env_lossy(),
    )
    .with_writer(std::io::stderr)
    .init();

  let cli = Cli::parse();
  let settings = Settings::load(&cli.config)
    .with_context(|| format!("failed to read config {}", cli.config.display()))?;

  let cache = SnapshotCache::open(settings.orders_path());
  let store = JsonHistoryStore::open(settings.history_path())
    .with_legacy_references(cache.references(&settings.reference_path));

  match cli.command {
    Command::Reconcile { input, status } => reconcile(&settings, &cache, &store, &input, status),
    Command::Timeline { reference, mode } => {
      timeline(&settings, &cache, &store, reference.as_deref(), mode.mode())
    }
    Command::History { reference, mode } => history(&store, reference.as_deref(), mode.mode()),
    Command::Migrate => migrate(&store),
  }
}

// ─── Commands ─────────────────────────────────────────────────────────────────

fn reconcile(
  settings: &Settings,
  cache: &SnapshotCache,
  store: &JsonHistoryStore,
  input: &std::path::Path,
  status_only: bool,
) -> Result<()> {
  let raw = fs::read_to_string(input)
    .with_context(|| format!("failed to read snapshots from {}", input.display()))?;
  let current: Vec<Value> = serde_json::from_str(&raw)
    .with_context(|| format!("{} is not a JSON list of orders", input.display()))?;

  let previous = cache.load();
  let today = chrono::Local::now().date_naive();
  let outcome = Reconciler::new(store)
    .with_reference_path(&settings.reference_path)
    .reconcile(previous.as_deref(), &current, today)
    .context("failed to record changes")?;

  if outcome.status != Status::Unchanged {
    cache
      .save(&current)
      .with_context(|| format!("failed to write {}", cache.path().display()))?;
  }

  if status_only {
    println!("{}", outcome.status.code());
    return Ok(());
  }

  match outcome.status {
    Status::NoBaseline => {
      println!("No previous order data; stored {} order(s) as baseline.", current.len());
    }
    Status::Unchanged => println!("No changes."),
    Status::Changed => {
      for reference in &outcome.added_orders {
        println!("New order: {reference}");
      }
      for reference in &outcome.removed_orders {
        println!("Order no longer present: {reference}");
      }
      let appended: History = outcome
        .appended
        .iter()
        .map(|(reference, set)| (reference.clone(), vec![set.clone()]))
        .collect();
      let tables = KeyTables::default();
      for (reference, _) in &outcome.appended {
        let entries = history_entries(&appended, reference, &tables, ViewMode::Basic);
        if entries.is_empty() {
          continue;
        }
        println!("Changes for {reference}:");
        for entry in &entries {
          println!("{}", render::history_line(entry, ViewMode::Basic));
        }
      }
    }
  }
  Ok(())
}

fn timeline(
  settings: &Settings,
  cache: &SnapshotCache,
  store: &JsonHistoryStore,
  reference: Option<&str>,
  mode: ViewMode,
) -> Result<()> {
  let history = store.load().history;
  let snapshots = cache.load().unwrap_or_default();
  let no_snapshot = Value::Null;
  let tables = KeyTables::default();

  let orders: Vec<(String, &Value)> = snapshots
    .iter()
    .enumerate()
    .map(|(i, s)| (order_reference(s, &settings.reference_path, i), s))
    .filter(|(r, _)| reference.is_none_or(|wanted| wanted == r.as_str()))
    .collect();

  // An order with history but no cached snapshot still has a timeline.
  let orders = match (orders.is_empty(), reference) {
    (true, Some(wanted)) => vec![(wanted.to_owned(), &no_snapshot)],
    (true, None) => anyhow::bail!("no cached orders; run `ordertrack reconcile` first"),
    (false, _) => orders,
  };

  for (reference, snapshot) in orders {
    let events = build_timeline(&history, &reference, snapshot, &tables, &settings.timeline, mode);
    println!("Order {reference}:");
    for event in present(&events) {
      println!("  {event}");
    }
  }
  Ok(())
}

fn history(store: &JsonHistoryStore, reference: Option<&str>, mode: ViewMode) -> Result<()> {
  let history = store.load().history;
  let tables = KeyTables::default();
  let references: Vec<&str> = match reference {
    Some(r) => vec![r],
    None => history.references().collect(),
  };

  for reference in references {
    let entries = history_entries(&history, reference, &tables, mode);
    if entries.is_empty() {
      continue;
    }
    println!("Change history for {reference}:");
    for entry in &entries {
      println!("{}", render::history_line(entry, mode));
    }
  }
  Ok(())
}

fn migrate(store: &JsonHistoryStore) -> Result<()> {
  match store
    .migrate()
    .with_context(|| format!("failed to migrate {}", store.path().display()))?
  {
    Some(report) => println!(
      "Migrated {} change set(s); dropped {} unreadable entries.",
      report.change_sets, report.dropped_entries
    ),
    None => println!("Nothing to migrate."),
  }
  Ok(())
}
