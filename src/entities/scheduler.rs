//! Posting schedule backed by an external spreadsheet.
//!
//! The sheet service is rate-limited and edited by hand, so rows come back
//! loosely shaped and the snapshot is cached only briefly.

use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::time::Duration;
use url::Url;

use super::{endpoint, json_kind, with_filters, Entity};
use crate::cache::ResourceKey;
use crate::error::FetchError;
use crate::http::HttpRequest;

/// One scheduled post.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ScheduleSlot {
  pub date: String,
  pub time: Option<String>,
  pub content_type: String,
  pub status: String,
  pub caption: Option<String>,
}

/// All schedule rows for one creator.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SchedulerSheet {
  pub creator: Option<String>,
  pub slots: Vec<ScheduleSlot>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct ApiScheduleRow {
  #[serde(default)]
  date: Option<String>,
  #[serde(default)]
  time: Option<String>,
  #[serde(default, alias = "type", alias = "content_type")]
  content_type: Option<String>,
  #[serde(default)]
  status: Option<String>,
  #[serde(default)]
  caption: Option<String>,
}

impl ApiScheduleRow {
  /// Blank spreadsheet rows have no date; they are dropped.
  fn into_slot(self) -> Option<ScheduleSlot> {
    let date = self.date.map(|d| d.trim().to_string()).filter(|d| !d.is_empty())?;
    Some(ScheduleSlot {
      date,
      time: non_blank(self.time),
      content_type: non_blank(self.content_type).unwrap_or_else(|| "post".to_string()),
      status: non_blank(self.status).unwrap_or_else(|| "planned".to_string()),
      caption: non_blank(self.caption),
    })
  }
}

fn non_blank(value: Option<String>) -> Option<String> {
  value
    .map(|v| v.trim().to_string())
    .filter(|v| !v.is_empty())
}

const ROW_KEYS: &[&str] = &["rows", "slots", "schedule", "data"];

impl Entity for SchedulerSheet {
  fn entity_type() -> &'static str {
    "scheduler"
  }

  fn label() -> &'static str {
    "scheduler sheet"
  }

  fn error_code() -> &'static str {
    "SCHEDULER_FETCH_ERROR"
  }

  fn default_ttl() -> Duration {
    Duration::from_secs(2 * 60)
  }

  fn request(base: &Url, key: &ResourceKey) -> Result<HttpRequest, FetchError> {
    let url = endpoint(base, &["api", "scheduler", key.subject()])?;
    Ok(HttpRequest::get(with_filters(url, key)))
  }

  /// Accepts a bare array of rows or an object carrying the rows under one of
  /// `rows`, `slots`, `schedule` or `data`.
  fn from_response(body: Value) -> Result<Self, FetchError> {
    let (creator, rows) = match body {
      Value::Array(rows) => (None, rows),
      Value::Object(mut map) => {
        let creator = map
          .get("creator")
          .and_then(Value::as_str)
          .map(String::from);
        let rows = ROW_KEYS
          .iter()
          .find_map(|k| match map.remove(*k) {
            Some(Value::Array(rows)) => Some(rows),
            _ => None,
          })
          .ok_or_else(|| FetchError::Mapping("scheduler sheet: no rows in response".into()))?;
        (creator, rows)
      }
      other => {
        return Err(FetchError::Mapping(format!(
          "scheduler sheet: expected rows, got {}",
          json_kind(&other)
        )))
      }
    };

    let slots = rows
      .into_iter()
      .enumerate()
      .map(|(i, row)| {
        serde_json::from_value::<ApiScheduleRow>(row)
          .map_err(|e| FetchError::Mapping(format!("scheduler sheet row {}: {}", i, e)))
      })
      .collect::<Result<Vec<_>, _>>()?
      .into_iter()
      .filter_map(ApiScheduleRow::into_slot)
      .collect();

    Ok(SchedulerSheet { creator, slots })
  }
}
