//! Snapshot storage trait and implementations.

use rusqlite::{params, Connection, OptionalExtension};
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::Mutex;

use super::PersistError;

/// String key → JSON blob store, keyed by logical store name.
pub trait SnapshotStorage: Send + Sync {
  /// Load the blob saved under `store`, if any.
  fn load(&self, store: &str) -> Result<Option<String>, PersistError>;

  /// Save `blob` under `store`, replacing any previous blob.
  fn save(&self, store: &str, blob: &str) -> Result<(), PersistError>;

  /// Delete the blob saved under `store`.
  fn remove(&self, store: &str) -> Result<(), PersistError>;
}

/// Storage kept in process memory. Used when persistence is disabled and in tests.
#[derive(Debug, Default)]
pub struct MemorySnapshotStorage {
  blobs: Mutex<HashMap<String, String>>,
}

impl MemorySnapshotStorage {
  pub fn new() -> Self {
    Self::default()
  }

  fn lock(&self) -> Result<std::sync::MutexGuard<'_, HashMap<String, String>>, PersistError> {
    self
      .blobs
      .lock()
      .map_err(|e| PersistError::Storage(format!("Lock poisoned: {}", e)))
  }
}

impl SnapshotStorage for MemorySnapshotStorage {
  fn load(&self, store: &str) -> Result<Option<String>, PersistError> {
    Ok(self.lock()?.get(store).cloned())
  }

  fn save(&self, store: &str, blob: &str) -> Result<(), PersistError> {
    self.lock()?.insert(store.to_string(), blob.to_string());
    Ok(())
  }

  fn remove(&self, store: &str) -> Result<(), PersistError> {
    self.lock()?.remove(store);
    Ok(())
  }
}

/// SQLite-backed snapshot storage.
pub struct SqliteSnapshotStorage {
  conn: Mutex<Connection>,
}

/// Schema for the snapshot table.
const SNAPSHOT_SCHEMA: &str = r#"
CREATE TABLE IF NOT EXISTS snapshots (
    store_name TEXT PRIMARY KEY,
    data TEXT NOT NULL,
    saved_at TEXT NOT NULL DEFAULT (datetime('now'))
);
"#;

impl SqliteSnapshotStorage {
  /// Open snapshot storage at the default location.
  pub fn open_default() -> Result<Self, PersistError> {
    Self::open(&Self::default_path()?)
  }

  /// Open (or create) snapshot storage at `path`.
  pub fn open(path: &Path) -> Result<Self, PersistError> {
    // Ensure parent directory exists
    if let Some(parent) = path.parent() {
      std::fs::create_dir_all(parent).map_err(|e| {
        PersistError::Storage(format!("Failed to create snapshot directory: {}", e))
      })?;
    }

    let conn = Connection::open(path).map_err(|e| {
      PersistError::Storage(format!(
        "Failed to open snapshot database at {}: {}",
        path.display(),
        e
      ))
    })?;

    Self::with_connection(conn)
  }

  /// Storage that lives only as long as the process.
  pub fn in_memory() -> Result<Self, PersistError> {
    let conn = Connection::open_in_memory()
      .map_err(|e| PersistError::Storage(format!("Failed to open in-memory database: {}", e)))?;
    Self::with_connection(conn)
  }

  fn with_connection(conn: Connection) -> Result<Self, PersistError> {
    conn
      .execute_batch(SNAPSHOT_SCHEMA)
      .map_err(|e| PersistError::Storage(format!("Failed to run snapshot migrations: {}", e)))?;

    Ok(Self {
      conn: Mutex::new(conn),
    })
  }

  /// Get the default database path.
  pub fn default_path() -> Result<PathBuf, PersistError> {
    let data_dir = dirs::data_dir()
      .or_else(|| dirs::home_dir().map(|p| p.join(".local/share")))
      .ok_or_else(|| PersistError::Storage("Could not determine data directory".into()))?;

    Ok(data_dir.join("studiodash").join("snapshots.db"))
  }

  fn lock(&self) -> Result<std::sync::MutexGuard<'_, Connection>, PersistError> {
    self
      .conn
      .lock()
      .map_err(|e| PersistError::Storage(format!("Lock poisoned: {}", e)))
  }
}

impl SnapshotStorage for SqliteSnapshotStorage {
  fn load(&self, store: &str) -> Result<Option<String>, PersistError> {
    let conn = self.lock()?;
    conn
      .query_row(
        "SELECT data FROM snapshots WHERE store_name = ?",
        params![store],
        |row| row.get(0),
      )
      .optional()
      .map_err(|e| PersistError::Storage(format!("Failed to load snapshot {}: {}", store, e)))
  }

  fn save(&self, store: &str, blob: &str) -> Result<(), PersistError> {
    let conn = self.lock()?;
    conn
      .execute(
        "INSERT OR REPLACE INTO snapshots (store_name, data, saved_at)
         VALUES (?, ?, datetime('now'))",
        params![store, blob],
      )
      .map_err(|e| PersistError::Storage(format!("Failed to save snapshot {}: {}", store, e)))?;
    Ok(())
  }

  fn remove(&self, store: &str) -> Result<(), PersistError> {
    let conn = self.lock()?;
    conn
      .execute(
        "DELETE FROM snapshots WHERE store_name = ?",
        params![store],
      )
      .map_err(|e| PersistError::Storage(format!("Failed to remove snapshot {}: {}", store, e)))?;
    Ok(())
  }
}
