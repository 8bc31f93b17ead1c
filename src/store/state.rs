use serde::Serialize;

use crate::error::ApiError;

/// Where a resource is in its fetch lifecycle.
///
/// `Idle → Loading → {Ready, Error}`; a refresh re-enters `Loading`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Phase {
  /// Nothing fetched yet in this process
  Idle,
  /// A fetch is in flight
  Loading,
  /// The last fetch (or override) produced a value
  Ready,
  /// The last fetch failed
  Error,
}

/// Loading/error state of one resource slot, plus its current value.
#[derive(Debug, Clone)]
pub struct ResourceState<T> {
  pub phase: Phase,
  pub value: Option<T>,
  pub error: Option<ApiError>,
  /// Cache key the value was fetched for; `None` for restored snapshots
  pub key: Option<String>,
}

impl<T> Default for ResourceState<T> {
  fn default() -> Self {
    Self {
      phase: Phase::Idle,
      value: None,
      error: None,
      key: None,
    }
  }
}

impl<T> ResourceState<T> {
  /// Startup state: idle with no error, optionally carrying a restored value.
  pub fn hydrated(value: Option<T>) -> Self {
    Self {
      value,
      ..Self::default()
    }
  }

  pub fn is_loading(&self) -> bool {
    self.phase == Phase::Loading
  }

  pub fn is_ready(&self) -> bool {
    self.phase == Phase::Ready
  }

  pub fn is_error(&self) -> bool {
    self.phase == Phase::Error
  }

  pub fn data(&self) -> Option<&T> {
    self.value.as_ref()
  }

  pub fn error(&self) -> Option<&ApiError> {
    self.error.as_ref()
  }

  /// The value, only if it is ready and was fetched for `key`.
  pub fn value_for(&self, key: &str) -> Option<&T> {
    if self.phase != Phase::Ready || self.key.as_deref() != Some(key) {
      return None;
    }
    self.value.as_ref()
  }

  pub(crate) fn begin_loading(&mut self) {
    self.phase = Phase::Loading;
    self.error = None;
  }

  /// Replace the value with one fetched for `key` and mark the slot ready.
  pub(crate) fn resolve_for(&mut self, key: &str, value: T) {
    self.key = Some(key.to_string());
    self.resolve(value);
  }

  /// Replace the value wholesale and mark the slot ready, keeping its key.
  pub(crate) fn resolve(&mut self, value: T) {
    self.phase = Phase::Ready;
    self.value = Some(value);
    self.error = None;
  }

  /// Record a failure. The previous value is kept so it can still be shown.
  pub(crate) fn fail(&mut self, error: ApiError) {
    self.phase = Phase::Error;
    self.error = Some(error);
  }

  /// Leave `Loading` without a result. Returns whether the phase changed.
  pub(crate) fn clear_loading(&mut self) -> bool {
    if self.phase != Phase::Loading {
      return false;
    }
    self.phase = if self.error.is_some() {
      Phase::Error
    } else if self.value.is_some() {
      Phase::Ready
    } else {
      Phase::Idle
    };
    true
  }
}
