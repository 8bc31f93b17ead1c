//! Expiring key/value store.

use std::collections::HashMap;
use std::time::Duration;
use tokio::time::Instant;

/// A cached value together with the moment it was stored and its lifetime.
#[derive(Debug, Clone)]
pub struct CacheEntry<T> {
  pub data: T,
  pub timestamp: Instant,
  pub expires_in: Duration,
}

impl<T> CacheEntry<T> {
  pub fn new(data: T, expires_in: Duration) -> Self {
    Self {
      data,
      timestamp: Instant::now(),
      expires_in,
    }
  }

  /// Valid iff `now <= timestamp + expires_in`.
  pub fn is_valid_at(&self, now: Instant) -> bool {
    match self.timestamp.checked_add(self.expires_in) {
      Some(deadline) => now <= deadline,
      None => true,
    }
  }
}

/// TTL cache with lazy expiry and substring-pattern invalidation.
///
/// Expired entries are only removed when read (or by an explicit
/// `purge_expired`); there is no background sweeper. Building canonical keys
/// for parameterized resources is the caller's job, see `ResourceKey`.
#[derive(Debug)]
pub struct TtlCache<T> {
  entries: HashMap<String, CacheEntry<T>>,
}

impl<T> Default for TtlCache<T> {
  fn default() -> Self {
    Self {
      entries: HashMap::new(),
    }
  }
}

impl<T: Clone> TtlCache<T> {
  pub fn new() -> Self {
    Self::default()
  }

  /// Return the value for `key` if it is still valid, evicting it otherwise.
  pub fn get(&mut self, key: &str) -> Option<T> {
    let now = Instant::now();
    match self.entries.get(key) {
      Some(entry) if entry.is_valid_at(now) => Some(entry.data.clone()),
      Some(_) => {
        self.entries.remove(key);
        None
      }
      None => None,
    }
  }

  /// Store `value` under `key`, replacing whatever was there.
  pub fn set(&mut self, key: impl Into<String>, value: T, ttl: Duration) {
    self.entries.insert(key.into(), CacheEntry::new(value, ttl));
  }

  /// Remove every key containing `pattern`, or everything when `pattern` is
  /// `None`. Returns the number of entries removed.
  pub fn invalidate(&mut self, pattern: Option<&str>) -> usize {
    let before = self.entries.len();
    match pattern {
      Some(pattern) => self.entries.retain(|key, _| !key.contains(pattern)),
      None => self.entries.clear(),
    }
    before - self.entries.len()
  }

  /// Drop every entry that has expired. Returns the number removed.
  pub fn purge_expired(&mut self) -> usize {
    let now = Instant::now();
    let before = self.entries.len();
    self.entries.retain(|_, entry| entry.is_valid_at(now));
    before - self.entries.len()
  }

  /// Number of stored entries, including expired ones not yet read.
  pub fn len(&self) -> usize {
    self.entries.len()
  }

  pub fn is_empty(&self) -> bool {
    self.entries.is_empty()
  }

  pub fn entry(&self, key: &str) -> Option<&CacheEntry<T>> {
    self.entries.get(key)
  }
}
