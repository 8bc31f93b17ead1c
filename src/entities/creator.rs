use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::time::Duration;
use url::Url;

use super::{decode, endpoint, single_object, with_filters, ApiId, Entity};
use crate::cache::ResourceKey;
use crate::error::FetchError;
use crate::http::HttpRequest;

/// A content-creator account.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Creator {
  pub id: String,
  pub name: String,
  pub display_name: Option<String>,
  pub status: String,
  pub platforms: Vec<String>,
  pub updated_at: Option<DateTime<Utc>>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct ApiCreator {
  id: ApiId,
  name: String,
  #[serde(default, alias = "display_name")]
  display_name: Option<String>,
  #[serde(default)]
  status: Option<String>,
  #[serde(default)]
  platforms: Vec<String>,
  #[serde(default, alias = "updated_at")]
  updated_at: Option<DateTime<Utc>>,
}

impl From<ApiCreator> for Creator {
  fn from(api: ApiCreator) -> Self {
    Creator {
      id: api.id.into_string(),
      name: api.name,
      display_name: api.display_name.filter(|s| !s.is_empty()),
      status: api.status.unwrap_or_else(|| "active".to_string()),
      platforms: api.platforms,
      updated_at: api.updated_at,
    }
  }
}

impl Entity for Creator {
  fn entity_type() -> &'static str {
    "creator"
  }

  fn label() -> &'static str {
    "creator"
  }

  fn error_code() -> &'static str {
    "CREATOR_FETCH_ERROR"
  }

  fn default_ttl() -> Duration {
    Duration::from_secs(10 * 60)
  }

  fn request(base: &Url, key: &ResourceKey) -> Result<HttpRequest, FetchError> {
    let url = endpoint(base, &["api", "creators", key.subject()])?;
    Ok(HttpRequest::get(with_filters(url, key)))
  }

  fn from_response(body: Value) -> Result<Self, FetchError> {
    let map = single_object(body, &["creator", "data"])?;
    decode::<ApiCreator>(Self::label(), map).map(Creator::from)
  }
}
