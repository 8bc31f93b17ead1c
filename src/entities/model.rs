use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::time::Duration;
use url::Url;

use super::{decode, endpoint, single_object, with_filters, ApiId, Entity};
use crate::cache::ResourceKey;
use crate::error::FetchError;
use crate::http::HttpRequest;

/// The public persona a creator account is run under.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Model {
  pub id: String,
  pub name: String,
  pub creator: Option<String>,
  pub profile_url: Option<String>,
  pub subscriber_count: u64,
  pub tags: Vec<String>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct ApiModel {
  id: ApiId,
  name: String,
  #[serde(default, alias = "creatorName")]
  creator: Option<String>,
  #[serde(default, alias = "profile_url")]
  profile_url: Option<String>,
  #[serde(default, alias = "subscribers")]
  subscriber_count: Option<u64>,
  #[serde(default)]
  tags: Vec<String>,
}

impl From<ApiModel> for Model {
  fn from(api: ApiModel) -> Self {
    Model {
      id: api.id.into_string(),
      name: api.name,
      creator: api.creator,
      profile_url: api.profile_url,
      subscriber_count: api.subscriber_count.unwrap_or(0),
      tags: api.tags,
    }
  }
}

impl Entity for Model {
  fn entity_type() -> &'static str {
    "model"
  }

  fn label() -> &'static str {
    "model"
  }

  fn error_code() -> &'static str {
    "MODEL_FETCH_ERROR"
  }

  fn default_ttl() -> Duration {
    Duration::from_secs(10 * 60)
  }

  fn request(base: &Url, key: &ResourceKey) -> Result<HttpRequest, FetchError> {
    let url = endpoint(base, &["api", "models", key.subject()])?;
    Ok(HttpRequest::get(with_filters(url, key)))
  }

  fn from_response(body: Value) -> Result<Self, FetchError> {
    let map = single_object(body, &["model", "data"])?;
    decode::<ApiModel>(Self::label(), map).map(Model::from)
  }
}
