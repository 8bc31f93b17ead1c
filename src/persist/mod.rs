//! Snapshot persistence across restarts.
//!
//! Only resolved entity snapshots of whitelisted stores are written. Cache
//! entries and loading/error state are never persisted, so a fresh process
//! always starts with an empty cache and idle resources.

mod storage;

pub use storage::{MemorySnapshotStorage, SnapshotStorage, SqliteSnapshotStorage};

use chrono::{DateTime, Utc};
use serde::{de::DeserializeOwned, Deserialize, Serialize};
use serde_json::Value;
use std::collections::BTreeSet;
use std::sync::Arc;
use tracing::{debug, warn};

/// Version of the snapshot envelope written by `PersistenceAdapter`.
pub const SNAPSHOT_VERSION: u32 = 1;

#[derive(Debug, thiserror::Error)]
pub enum PersistError {
  #[error("storage error: {0}")]
  Storage(String),

  #[error("snapshot encoding error: {0}")]
  Encoding(#[from] serde_json::Error),
}

#[derive(Debug, Serialize, Deserialize)]
struct Envelope<T> {
  version: u32,
  saved_at: DateTime<Utc>,
  snapshot: T,
}

/// Hydrates and saves entity snapshots for whitelisted stores.
pub struct PersistenceAdapter {
  storage: Arc<dyn SnapshotStorage>,
  whitelist: BTreeSet<String>,
}

impl PersistenceAdapter {
  pub fn new<I, S>(storage: Arc<dyn SnapshotStorage>, whitelist: I) -> Self
  where
    I: IntoIterator<Item = S>,
    S: Into<String>,
  {
    Self {
      storage,
      whitelist: whitelist.into_iter().map(Into::into).collect(),
    }
  }

  pub fn is_whitelisted(&self, store: &str) -> bool {
    self.whitelist.contains(store)
  }

  pub fn whitelist(&self) -> impl Iterator<Item = &str> {
    self.whitelist.iter().map(String::as_str)
  }

  /// Restore the last saved snapshot for `store`.
  ///
  /// Anything unreadable (storage failure, corrupt blob, unknown version,
  /// shape mismatch) is logged and treated as "nothing saved".
  pub fn hydrate<T: DeserializeOwned>(&self, store: &str) -> Option<T> {
    if !self.is_whitelisted(store) {
      return None;
    }

    match self.try_hydrate(store) {
      Ok(snapshot) => snapshot,
      Err(e) => {
        warn!(store, error = %e, "ignoring unreadable snapshot");
        None
      }
    }
  }

  fn try_hydrate<T: DeserializeOwned>(&self, store: &str) -> Result<Option<T>, PersistError> {
    let Some(blob) = self.storage.load(store)? else {
      return Ok(None);
    };

    let envelope: Envelope<Value> = serde_json::from_str(&blob)?;
    if envelope.version != SNAPSHOT_VERSION {
      warn!(
        store,
        version = envelope.version,
        expected = SNAPSHOT_VERSION,
        "discarding snapshot with unknown version"
      );
      return Ok(None);
    }

    debug!(store, saved_at = %envelope.saved_at, "hydrated snapshot");
    Ok(Some(serde_json::from_value(envelope.snapshot)?))
  }

  /// Save `snapshot` for `store`. Failures are logged and otherwise ignored.
  pub fn save<T: Serialize>(&self, store: &str, snapshot: &T) {
    if let Err(e) = self.try_save(store, snapshot) {
      warn!(store, error = %e, "failed to persist snapshot");
    }
  }

  /// Save `snapshot` for `store`, returning whether anything was written.
  pub fn try_save<T: Serialize>(&self, store: &str, snapshot: &T) -> Result<bool, PersistError> {
    if !self.is_whitelisted(store) {
      return Ok(false);
    }

    let blob = serde_json::to_string(&Envelope {
      version: SNAPSHOT_VERSION,
      saved_at: Utc::now(),
      snapshot,
    })?;
    self.storage.save(store, &blob)?;
    Ok(true)
  }

  /// Forget the saved snapshot for `store`.
  pub fn clear(&self, store: &str) -> Result<(), PersistError> {
    self.storage.remove(store)
  }
}
