use async_trait::async_trait;
use reqwest::header::CONTENT_TYPE;
use reqwest::Method;
use serde_json::Value;
use std::time::Duration;
use url::Url;

use crate::error::FetchError;

/// A single JSON request against the dashboard API.
#[derive(Debug, Clone, PartialEq)]
pub struct HttpRequest {
  pub method: Method,
  pub url: Url,
  pub body: Option<Value>,
}

impl HttpRequest {
  pub fn get(url: Url) -> Self {
    Self {
      method: Method::GET,
      url,
      body: None,
    }
  }

  pub fn post(url: Url, body: Value) -> Self {
    Self {
      method: Method::POST,
      url,
      body: Some(body),
    }
  }
}

/// Raw response: status code and body text, before any classification.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HttpResponse {
  pub status: u16,
  pub body: String,
}

impl HttpResponse {
  pub fn new(status: u16, body: impl Into<String>) -> Self {
    Self {
      status,
      body: body.into(),
    }
  }

  pub fn is_success(&self) -> bool {
    (200..300).contains(&self.status)
  }

  /// Parse the body as JSON. An empty body parses as `null`.
  pub fn json(&self) -> Result<Value, FetchError> {
    if self.body.trim().is_empty() {
      return Ok(Value::Null);
    }
    serde_json::from_str(&self.body)
      .map_err(|e| FetchError::Mapping(format!("response body is not valid JSON: {}", e)))
  }
}

/// Sends one request and returns whatever the server answered.
///
/// Implementations report transport failures as `FetchError::Network` and
/// must not interpret status codes; that is the retrying client's job.
#[async_trait]
pub trait Transport: Send + Sync {
  async fn send(&self, request: &HttpRequest) -> Result<HttpResponse, FetchError>;
}

/// Transport backed by a shared `reqwest::Client`.
#[derive(Clone)]
pub struct ReqwestTransport {
  client: reqwest::Client,
}

impl ReqwestTransport {
  pub fn new(timeout: Duration) -> Result<Self, FetchError> {
    let client = reqwest::Client::builder()
      .timeout(timeout)
      .build()
      .map_err(|e| FetchError::Network(format!("Failed to build HTTP client: {}", e)))?;

    Ok(Self { client })
  }
}

#[async_trait]
impl Transport for ReqwestTransport {
  async fn send(&self, request: &HttpRequest) -> Result<HttpResponse, FetchError> {
    let mut builder = self
      .client
      .request(request.method.clone(), request.url.clone())
      .header(CONTENT_TYPE, "application/json");

    if let Some(body) = &request.body {
      builder = builder.json(body);
    }

    let response = builder
      .send()
      .await
      .map_err(|e| FetchError::Network(e.to_string()))?;

    let status = response.status().as_u16();
    let body = response
      .text()
      .await
      .map_err(|e| FetchError::Network(format!("Failed to read response body: {}", e)))?;

    Ok(HttpResponse { status, body })
  }
}
