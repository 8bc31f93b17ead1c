//! Canonical cache keys for parameterized resources.

use sha2::{Digest, Sha256};
use std::collections::BTreeMap;
use std::fmt;

/// Identifies what to fetch: a subject (creator name, model name) plus
/// optional filters.
///
/// Filters are kept sorted so two keys built from the same filters in a
/// different order produce the same cache key.
#[derive(Debug, Clone, Default, PartialEq, Eq, Hash)]
pub struct ResourceKey {
  subject: String,
  filters: BTreeMap<String, String>,
}

impl ResourceKey {
  pub fn new(subject: impl AsRef<str>) -> Self {
    Self {
      subject: subject.as_ref().trim().to_string(),
      filters: BTreeMap::new(),
    }
  }

  pub fn with_filter(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
    self.filters.insert(name.into(), value.into());
    self
  }

  pub fn subject(&self) -> &str {
    &self.subject
  }

  pub fn filters(&self) -> &BTreeMap<String, String> {
    &self.filters
  }

  /// Cache key for this resource under `entity_type`.
  ///
  /// `"{entity_type}:{subject}"`, with a filter digest appended when filters
  /// are present. Kind and subject stay readable so pattern invalidation by
  /// either one works.
  pub fn cache_key(&self, entity_type: &str) -> String {
    if self.filters.is_empty() {
      format!("{}:{}", entity_type, self.subject)
    } else {
      format!(
        "{}:{}:{}",
        entity_type,
        self.subject,
        filter_digest(&self.filters)
      )
    }
  }
}

impl From<&str> for ResourceKey {
  fn from(subject: &str) -> Self {
    Self::new(subject)
  }
}

impl From<String> for ResourceKey {
  fn from(subject: String) -> Self {
    Self::new(subject)
  }
}

impl From<&ResourceKey> for ResourceKey {
  fn from(key: &ResourceKey) -> Self {
    key.clone()
  }
}

impl fmt::Display for ResourceKey {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    write!(f, "{}", self.subject)?;
    if !self.filters.is_empty() {
      let pairs: Vec<String> = self
        .filters
        .iter()
        .map(|(k, v)| format!("{}={}", k, v))
        .collect();
      write!(f, " [{}]", pairs.join(", "))?;
    }
    Ok(())
  }
}

/// SHA256 over length-prefixed sorted pairs, truncated to 16 hex chars.
fn filter_digest(filters: &BTreeMap<String, String>) -> String {
  let mut hasher = Sha256::new();
  for (name, value) in filters {
    hasher.update((name.len() as u64).to_le_bytes());
    hasher.update(name.as_bytes());
    hasher.update((value.len() as u64).to_le_bytes());
    hasher.update(value.as_bytes());
  }
  let mut digest = hex::encode(hasher.finalize());
  digest.truncate(16);
  digest
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn test_plain_key() {
    assert_eq!(ResourceKey::new("Alice").cache_key("creator"), "creator:Alice");
    assert_eq!(
      ResourceKey::new("  Alice \n").cache_key("creator"),
      "creator:Alice"
    );
  }

  #[test]
  fn test_filter_order_does_not_matter() {
    let a = ResourceKey::new("Alice")
      .with_filter("week", "2024-W10")
      .with_filter("platform", "fansly");
    let b = ResourceKey::new("Alice")
      .with_filter("platform", "fansly")
      .with_filter("week", "2024-W10");

    assert_eq!(a.cache_key("scheduler"), b.cache_key("scheduler"));
  }

  #[test]
  fn test_different_filters_do_not_collide() {
    let a = ResourceKey::new("Alice").with_filter("week", "1");
    let b = ResourceKey::new("Alice").with_filter("week", "2");
    let c = ResourceKey::new("Alice").with_filter("wee", "k1");

    assert_ne!(a.cache_key("scheduler"), b.cache_key("scheduler"));
    assert_ne!(a.cache_key("scheduler"), c.cache_key("scheduler"));
  }

  #[test]
  fn test_filter_digest_encoding_is_stable() {
    let key = ResourceKey::new("Alice").with_filter("week", "10");
    assert_eq!(key.cache_key("scheduler"), "scheduler:Alice:07455ec085442254");

    let key = key.with_filter("platform", "fansly");
    assert_eq!(key.cache_key("scheduler"), "scheduler:Alice:58292574def95074");
  }

  #[test]
  fn test_filtered_key_keeps_subject_searchable() {
    let key = ResourceKey::new("Alice")
      .with_filter("week", "1")
      .cache_key("scheduler");
    assert!(key.starts_with("scheduler:Alice:"));
    assert_eq!(key.len(), "scheduler:Alice:".len() + 16);
  }

  #[test]
  fn test_display() {
    let key = ResourceKey::new("Alice").with_filter("week", "10");
    assert_eq!(key.to_string(), "Alice [week=10]");
    assert_eq!(ResourceKey::from("Bob").to_string(), "Bob");
  }
}
