//! Typed entity snapshots and their per-entity transform functions.
//!
//! The API returns free-form JSON (arrays, wrapped objects, bare objects).
//! Each entity owns an explicit `from_response` transform that turns that JSON
//! into its canonical snapshot or a `FetchError::Mapping`.

mod client_data;
mod creator;
mod model;
mod scheduler;

pub use client_data::ClientData;
pub use creator::Creator;
pub use model::Model;
pub use scheduler::{ScheduleSlot, SchedulerSheet};

use serde::{de::DeserializeOwned, Deserialize, Serialize};
use serde_json::{Map, Value};
use std::time::Duration;
use url::Url;

use crate::cache::ResourceKey;
use crate::error::FetchError;
use crate::http::HttpRequest;

/// An entity kind served by one `EntityStore`.
pub trait Entity: Clone + Send + Sync + Serialize + DeserializeOwned + 'static {
  /// Storage name used for cache keys and persistence (e.g., "creator")
  fn entity_type() -> &'static str;

  /// Human-readable name for error messages (e.g., "client data")
  fn label() -> &'static str;

  /// Code recorded in `ApiError::code` when a fetch fails
  fn error_code() -> &'static str;

  /// How long a fetched snapshot may be served from cache
  fn default_ttl() -> Duration;

  /// Build the request that fetches the resource identified by `key`.
  fn request(base: &Url, key: &ResourceKey) -> Result<HttpRequest, FetchError>;

  /// Map a response body onto the snapshot.
  fn from_response(body: Value) -> Result<Self, FetchError>;
}

/// Append path segments to the base URL, percent-encoding each one.
pub(crate) fn endpoint(base: &Url, segments: &[&str]) -> Result<Url, FetchError> {
  let mut url = base.clone();
  url
    .path_segments_mut()
    .map_err(|_| FetchError::InvalidRequest(format!("base URL {} cannot carry a path", base)))?
    .pop_if_empty()
    .extend(segments);
  Ok(url)
}

/// Append each filter of `key` as a query parameter.
pub(crate) fn with_filters(mut url: Url, key: &ResourceKey) -> Url {
  if !key.filters().is_empty() {
    let mut pairs = url.query_pairs_mut();
    for (name, value) in key.filters() {
      pairs.append_pair(name, value);
    }
  }
  url
}

/// Find the object describing a single entity in a response body.
///
/// Accepts a bare object, an object wrapping the payload under one of
/// `wrappers`, or an array whose first element is the payload.
pub(crate) fn single_object(body: Value, wrappers: &[&str]) -> Result<Map<String, Value>, FetchError> {
  match body {
    Value::Array(items) => match items.into_iter().next() {
      Some(first) => single_object(first, wrappers),
      None => Err(FetchError::Mapping("response array is empty".into())),
    },
    Value::Object(mut map) => {
      for wrapper in wrappers {
        if matches!(map.get(*wrapper), Some(Value::Object(_)) | Some(Value::Array(_))) {
          if let Some(inner) = map.remove(*wrapper) {
            return single_object(inner, wrappers);
          }
        }
      }
      Ok(map)
    }
    other => Err(FetchError::Mapping(format!(
      "expected an object, got {}",
      json_kind(&other)
    ))),
  }
}

/// Decode a payload object into an API type, naming the entity on failure.
pub(crate) fn decode<T: DeserializeOwned>(label: &str, map: Map<String, Value>) -> Result<T, FetchError> {
  serde_json::from_value(Value::Object(map))
    .map_err(|e| FetchError::Mapping(format!("{}: {}", label, e)))
}

pub(crate) fn json_kind(value: &Value) -> &'static str {
  match value {
    Value::Null => "null",
    Value::Bool(_) => "a boolean",
    Value::Number(_) => "a number",
    Value::String(_) => "a string",
    Value::Array(_) => "an array",
    Value::Object(_) => "an object",
  }
}

/// Identifiers arrive as numbers from some endpoints and strings from others.
#[derive(Debug, Deserialize)]
#[serde(untagged)]
pub(crate) enum ApiId {
  Number(u64),
  Text(String),
}

impl ApiId {
  pub(crate) fn into_string(self) -> String {
    match self {
      ApiId::Number(n) => n.to_string(),
      ApiId::Text(s) => s,
    }
  }
}
