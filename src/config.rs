use color_eyre::{eyre::eyre, Result};
use serde::Deserialize;
use std::path::{Path, PathBuf};
use std::time::Duration;
use url::Url;

use crate::http::RetryPolicy;

/// Environment variable overriding `api.base_url`.
pub const API_URL_ENV: &str = "STUDIODASH_API_URL";

#[derive(Debug, Clone, Default, Deserialize)]
pub struct Config {
  #[serde(default)]
  pub api: ApiConfig,
  #[serde(default)]
  pub retry: RetryConfig,
  #[serde(default)]
  pub ttl: TtlConfig,
  #[serde(default)]
  pub persistence: PersistenceConfig,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ApiConfig {
  /// Dashboard API root (e.g., "https://dash.example.com/")
  #[serde(default = "default_base_url")]
  pub base_url: String,
  /// Per-request timeout
  #[serde(default = "default_timeout_secs")]
  pub timeout_secs: u64,
}

impl Default for ApiConfig {
  fn default() -> Self {
    Self {
      base_url: default_base_url(),
      timeout_secs: default_timeout_secs(),
    }
  }
}

fn default_base_url() -> String {
  "http://localhost:3000/".to_string()
}

fn default_timeout_secs() -> u64 {
  30
}

#[derive(Debug, Clone, Deserialize)]
pub struct RetryConfig {
  #[serde(default = "default_max_retries")]
  pub max_retries: u32,
  #[serde(default = "default_base_delay_ms")]
  pub base_delay_ms: u64,
  /// Spread each backoff delay by ±factor; 0 keeps delays exact
  #[serde(default)]
  pub jitter_factor: f64,
}

impl Default for RetryConfig {
  fn default() -> Self {
    Self {
      max_retries: default_max_retries(),
      base_delay_ms: default_base_delay_ms(),
      jitter_factor: 0.0,
    }
  }
}

fn default_max_retries() -> u32 {
  3
}

fn default_base_delay_ms() -> u64 {
  1000
}

/// Cache lifetimes in seconds, per entity kind.
#[derive(Debug, Clone, Deserialize)]
pub struct TtlConfig {
  #[serde(default = "default_creator_ttl")]
  pub creator: u64,
  #[serde(default = "default_model_ttl")]
  pub model: u64,
  #[serde(default = "default_client_data_ttl")]
  pub client_data: u64,
  #[serde(default = "default_scheduler_ttl")]
  pub scheduler: u64,
}

impl Default for TtlConfig {
  fn default() -> Self {
    Self {
      creator: default_creator_ttl(),
      model: default_model_ttl(),
      client_data: default_client_data_ttl(),
      scheduler: default_scheduler_ttl(),
    }
  }
}

fn default_creator_ttl() -> u64 {
  600
}

fn default_model_ttl() -> u64 {
  600
}

fn default_client_data_ttl() -> u64 {
  900
}

fn default_scheduler_ttl() -> u64 {
  120
}

impl TtlConfig {
  pub fn creator(&self) -> Duration {
    Duration::from_secs(self.creator)
  }

  pub fn model(&self) -> Duration {
    Duration::from_secs(self.model)
  }

  pub fn client_data(&self) -> Duration {
    Duration::from_secs(self.client_data)
  }

  pub fn scheduler(&self) -> Duration {
    Duration::from_secs(self.scheduler)
  }
}

#[derive(Debug, Clone, Deserialize)]
pub struct PersistenceConfig {
  #[serde(default = "default_enabled")]
  pub enabled: bool,
  /// SQLite file (defaults to the user data directory)
  #[serde(default)]
  pub path: Option<PathBuf>,
  /// Store names whose snapshots survive restarts
  #[serde(default = "default_stores")]
  pub stores: Vec<String>,
}

impl Default for PersistenceConfig {
  fn default() -> Self {
    Self {
      enabled: default_enabled(),
      path: None,
      stores: default_stores(),
    }
  }
}

fn default_enabled() -> bool {
  true
}

fn default_stores() -> Vec<String> {
  ["creator", "model", "client_data", "scheduler"]
    .into_iter()
    .map(String::from)
    .collect()
}

impl Config {
  /// Load configuration from file.
  ///
  /// Search order:
  /// 1. Explicit path if provided
  /// 2. ./studiodash.yaml (current directory)
  /// 3. $XDG_CONFIG_HOME/studiodash/config.yaml
  ///
  /// Without any file the defaults are used. `STUDIODASH_API_URL` overrides
  /// the base URL either way.
  pub fn load(explicit_path: Option<&Path>) -> Result<Self> {
    let path = if let Some(p) = explicit_path {
      if p.exists() {
        Some(p.to_path_buf())
      } else {
        return Err(eyre!("Config file not found: {}", p.display()));
      }
    } else {
      Self::find_config_file()
    };

    let mut config = match path {
      Some(p) => Self::load_from_path(&p)?,
      None => Config::default(),
    };

    if let Ok(url) = std::env::var(API_URL_ENV) {
      config.api.base_url = url;
    }

    Ok(config)
  }

  fn find_config_file() -> Option<PathBuf> {
    // Check current directory
    let local = PathBuf::from("studiodash.yaml");
    if local.exists() {
      return Some(local);
    }

    // Check XDG config directory
    if let Some(config_dir) = dirs::config_dir() {
      let xdg_path = config_dir.join("studiodash").join("config.yaml");
      if xdg_path.exists() {
        return Some(xdg_path);
      }
    }

    None
  }

  fn load_from_path(path: &Path) -> Result<Self> {
    let contents = std::fs::read_to_string(path)
      .map_err(|e| eyre!("Failed to read config file {}: {}", path.display(), e))?;

    Self::parse(&contents).map_err(|e| eyre!("Failed to parse config file {}: {}", path.display(), e))
  }

  fn parse(contents: &str) -> std::result::Result<Self, serde_yaml::Error> {
    // An empty file is valid and means "all defaults".
    if contents.trim().is_empty() {
      return Ok(Config::default());
    }
    serde_yaml::from_str(contents)
  }

  /// The API base URL, normalized to end with a slash.
  pub fn base_url(&self) -> Result<Url> {
    let raw = self.api.base_url.trim();
    let normalized = if raw.ends_with('/') {
      raw.to_string()
    } else {
      format!("{}/", raw)
    };
    Url::parse(&normalized).map_err(|e| eyre!("Invalid api.base_url {:?}: {}", raw, e))
  }

  pub fn timeout(&self) -> Duration {
    Duration::from_secs(self.api.timeout_secs)
  }

  pub fn retry_policy(&self) -> RetryPolicy {
    RetryPolicy {
      max_retries: self.retry.max_retries,
      base_delay: Duration::from_millis(self.retry.base_delay_ms),
      jitter_factor: if self.retry.jitter_factor.is_finite() {
        self.retry.jitter_factor
      } else {
        0.0
      },
    }
  }
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn test_defaults() {
    let config = Config::default();
    assert_eq!(config.retry_policy(), RetryPolicy::default());
    assert_eq!(config.ttl.scheduler(), Duration::from_secs(120));
    assert_eq!(config.ttl.client_data(), Duration::from_secs(900));
    assert!(config.persistence.enabled);
    assert_eq!(config.persistence.stores.len(), 4);
    assert_eq!(config.timeout(), Duration::from_secs(30));
  }

  #[test]
  fn test_partial_yaml_keeps_defaults() {
    let config = Config::parse(
      r#"
api:
  base_url: https://dash.example.com/v2
retry:
  max_retries: 5
ttl:
  scheduler: 60
persistence:
  stores: [creator]
"#,
    )
    .unwrap();

    assert_eq!(config.retry.max_retries, 5);
    assert_eq!(config.retry.base_delay_ms, 1000);
    assert_eq!(config.ttl.scheduler(), Duration::from_secs(60));
    assert_eq!(config.ttl.creator(), Duration::from_secs(600));
    assert_eq!(config.persistence.stores, vec!["creator".to_string()]);
    assert_eq!(
      config.base_url().unwrap().as_str(),
      "https://dash.example.com/v2/"
    );
  }

  #[test]
  fn test_non_finite_jitter_is_disabled() {
    for raw in [".nan", ".inf", "-.inf"] {
      let config = Config::parse(&format!("retry:\n  jitter_factor: {}\n", raw)).unwrap();
      let policy = config.retry_policy();
      assert_eq!(policy.jitter_factor, 0.0, "{}", raw);
      assert_eq!(policy.delay_for(2), Duration::from_millis(2000));
    }
  }

  #[test]
  fn test_empty_file_is_default() {
    let config = Config::parse("  \n").unwrap();
    assert_eq!(config.api.timeout_secs, 30);
  }

  #[test]
  fn test_invalid_base_url() {
    let mut config = Config::default();
    config.api.base_url = "not a url".into();
    assert!(config.base_url().is_err());
  }

  #[test]
  fn test_load_from_explicit_path() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("config.yaml");
    std::fs::write(&path, "retry:\n  jitter_factor: 0.25\n").unwrap();

    let config = Config::load_from_path(&path).unwrap();
    assert_eq!(config.retry_policy().jitter_factor, 0.25);

    let missing = dir.path().join("missing.yaml");
    assert!(Config::load(Some(missing.as_path())).is_err());
  }
}
