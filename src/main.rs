use clap::{Parser, Subcommand};
use color_eyre::{eyre::eyre, Result};
use serde::Serialize;
use std::path::PathBuf;
use std::sync::Arc;
use tracing::info;

use studiodash::config::Config;
use studiodash::http::ReqwestTransport;
use studiodash::persist::{PersistenceAdapter, SqliteSnapshotStorage};
use studiodash::{Dashboard, Phase, ResourceKey};

#[derive(Parser, Debug)]
#[command(name = "studiodash")]
#[command(about = "Fetch creator dashboard data with caching, retries and snapshots")]
#[command(version)]
struct Args {
  /// Path to config file (default: $XDG_CONFIG_HOME/studiodash/config.yaml)
  #[arg(short, long, global = true)]
  config: Option<PathBuf>,

  #[command(subcommand)]
  command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
  /// Load creator, model and client data for a creator
  View {
    creator: String,
    /// Bypass the cache
    #[arg(short, long)]
    refresh: bool,
  },
  /// Load a creator's scheduler sheet
  Schedule {
    creator: String,
    /// Restrict the sheet to one week
    #[arg(short, long)]
    week: Option<String>,
    /// Bypass the cache
    #[arg(short, long)]
    refresh: bool,
  },
  /// Print the snapshots restored from the last run
  Snapshots,
}

#[tokio::main]
async fn main() -> Result<()> {
  color_eyre::install()?;
  let _log_guard = studiodash::logging::init()?;

  let args = Args::parse();
  let config = Config::load(args.config.as_deref())?;

  let transport = Arc::new(ReqwestTransport::new(config.timeout())?);
  let persistence = open_persistence(&config)?;
  let dashboard = Dashboard::new(&config, transport, persistence)?;

  match args.command {
    Command::View { creator, refresh } => {
      let result = dashboard.load_creator_view(&creator, refresh).await;
      for report in &result.resources {
        match (&report.phase, &report.error) {
          (Phase::Error, Some(error)) => println!("{:<12} error  {} ({})", report.resource, error, error.code),
          (phase, _) => println!("{:<12} {:?}", report.resource, phase),
        }
      }
      print_json(&dashboard.creator_view(&creator))?;
      info!(creator = %creator, complete = result.is_complete(), "creator view loaded");
    }
    Command::Schedule {
      creator,
      week,
      refresh,
    } => {
      let mut key = ResourceKey::new(&creator);
      if let Some(week) = week {
        key = key.with_filter("week", week);
      }
      let sheet = dashboard.load_schedule(key, refresh).await?;
      print_json(&sheet)?;
    }
    Command::Snapshots => {
      print_json(&dashboard.restored_view())?;
      print_json(&dashboard.schedules().current())?;
    }
  }

  Ok(())
}

fn open_persistence(config: &Config) -> Result<Option<Arc<PersistenceAdapter>>> {
  if !config.persistence.enabled {
    return Ok(None);
  }

  let storage = match &config.persistence.path {
    Some(path) => SqliteSnapshotStorage::open(path),
    None => SqliteSnapshotStorage::open_default(),
  }
  .map_err(|e| eyre!("Failed to open snapshot storage: {}", e))?;

  Ok(Some(Arc::new(PersistenceAdapter::new(
    Arc::new(storage),
    config.persistence.stores.iter().cloned(),
  ))))
}

fn print_json<T: Serialize>(value: &T) -> Result<()> {
  let rendered =
    serde_json::to_string_pretty(value).map_err(|e| eyre!("Failed to render output: {}", e))?;
  println!("{}", rendered);
  Ok(())
}
