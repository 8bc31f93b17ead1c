use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::time::Duration;
use url::Url;

use super::{decode, endpoint, single_object, Entity};
use crate::cache::ResourceKey;
use crate::error::FetchError;
use crate::http::HttpRequest;

/// Commercial data kept for a creator (revenue, contract).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ClientData {
  pub creator: String,
  pub monthly_revenue: f64,
  pub currency: String,
  pub contract_status: Option<String>,
  pub notes: Option<String>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct ApiClientData {
  #[serde(alias = "creatorName")]
  creator: String,
  #[serde(default, alias = "revenue", alias = "monthly_revenue")]
  monthly_revenue: Option<f64>,
  #[serde(default)]
  currency: Option<String>,
  #[serde(default, alias = "contract_status")]
  contract_status: Option<String>,
  #[serde(default)]
  notes: Option<String>,
}

impl From<ApiClientData> for ClientData {
  fn from(api: ApiClientData) -> Self {
    ClientData {
      creator: api.creator,
      monthly_revenue: api.monthly_revenue.unwrap_or(0.0),
      currency: api
        .currency
        .map(|c| c.to_uppercase())
        .unwrap_or_else(|| "USD".to_string()),
      contract_status: api.contract_status,
      notes: api.notes.filter(|n| !n.trim().is_empty()),
    }
  }
}

impl Entity for ClientData {
  fn entity_type() -> &'static str {
    "client_data"
  }

  fn label() -> &'static str {
    "client data"
  }

  fn error_code() -> &'static str {
    "CLIENT_DATA_FETCH_ERROR"
  }

  fn default_ttl() -> Duration {
    Duration::from_secs(15 * 60)
  }

  /// Client data is looked up by POST with the creator and filters in the body.
  fn request(base: &Url, key: &ResourceKey) -> Result<HttpRequest, FetchError> {
    let url = endpoint(base, &["api", "client-data"])?;

    let mut body = Map::new();
    for (name, value) in key.filters() {
      body.insert(name.clone(), Value::String(value.clone()));
    }
    body.insert("creator".into(), Value::String(key.subject().to_string()));

    Ok(HttpRequest::post(url, Value::Object(body)))
  }

  fn from_response(body: Value) -> Result<Self, FetchError> {
    let map = single_object(body, &["clientData", "client_data", "data"])?;
    decode::<ApiClientData>(Self::label(), map).map(ClientData::from)
  }
}
