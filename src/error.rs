//! Error taxonomy for the data-access layer.
//!
//! `FetchError` describes why a single network fetch failed and whether it is
//! worth retrying. `ApiError` is the immutable value recorded in a resource's
//! error slot once a store gives up on a fetch.

use std::any::Any;

use chrono::{DateTime, Utc};
use serde::Serialize;

/// Failure of one fetch through the HTTP boundary.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum FetchError {
  /// Transport failure (connection refused, DNS, timeout, broken body)
  #[error("network error: {0}")]
  Network(String),

  /// 429 or 500; retried up to the policy cap
  #[error("HTTP {status}: {body}")]
  RetryableHttp { status: u16, body: String },

  /// Any other non-2xx status; surfaced verbatim without retrying
  #[error("HTTP {status}: {body}")]
  TerminalHttp { status: u16, body: String },

  /// Response body does not match the entity contract
  #[error("unexpected response shape: {0}")]
  Mapping(String),

  /// The request could not be built (bad base URL, unencodable path)
  #[error("invalid request: {0}")]
  InvalidRequest(String),

  #[error("gave up after {attempts} attempts: {last}")]
  RetryExhausted { attempts: u32, last: Box<FetchError> },

  /// A newer fetch for the same key replaced this one
  #[error("superseded by a newer fetch")]
  Superseded,

  /// The fetch panicked
  #[error("internal error: {0}")]
  Internal(String),
}

impl FetchError {
  /// Whether the retrying client should try again after this error.
  pub fn is_retryable(&self) -> bool {
    matches!(self, Self::Network(_) | Self::RetryableHttp { .. })
  }

  /// HTTP status carried by this error, looking through retry exhaustion.
  pub fn status(&self) -> Option<u16> {
    match self {
      Self::RetryableHttp { status, .. } | Self::TerminalHttp { status, .. } => Some(*status),
      Self::RetryExhausted { last, .. } => last.status(),
      _ => None,
    }
  }
}

/// Error recorded in a resource slot. Each new failure replaces the previous one.
#[derive(Debug, Clone, PartialEq, Serialize, thiserror::Error)]
#[error("{message}")]
pub struct ApiError {
  pub message: String,
  pub code: String,
  pub timestamp: DateTime<Utc>,
}

impl ApiError {
  pub fn new(code: impl Into<String>, message: impl Into<String>) -> Self {
    Self {
      message: message.into(),
      code: code.into(),
      timestamp: Utc::now(),
    }
  }

  /// The generic "failed to fetch <resource>" error with the cause appended.
  pub fn fetch_failed(label: &str, code: &str, cause: &FetchError) -> Self {
    Self::new(code, format!("Failed to fetch {}: {}", label, cause))
  }
}

/// Extract a readable message from a caught panic payload.
pub(crate) fn panic_message(payload: &(dyn Any + Send)) -> String {
  if let Some(s) = payload.downcast_ref::<&str>() {
    (*s).to_string()
  } else if let Some(s) = payload.downcast_ref::<String>() {
    s.clone()
  } else {
    "unknown panic".to_string()
  }
}
