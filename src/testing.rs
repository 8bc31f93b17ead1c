//! Test doubles shared by the unit tests.

use async_trait::async_trait;
use serde_json::Value;
use std::collections::{HashMap, VecDeque};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::time::Instant;
use url::Url;

use crate::error::FetchError;
use crate::http::{HttpRequest, HttpResponse, RetryPolicy, RetryingHttpClient, Transport};

/// A canned answer for one call.
#[derive(Debug, Clone)]
pub enum Reply {
  Respond(HttpResponse),
  NetworkDown,
  Delayed(Duration, Box<Reply>),
}

impl Reply {
  pub fn status(status: u16, body: &str) -> Self {
    Reply::Respond(HttpResponse::new(status, body))
  }

  pub fn ok(body: Value) -> Self {
    Reply::Respond(HttpResponse::new(200, body.to_string()))
  }

  pub fn after(self, delay: Duration) -> Self {
    Reply::Delayed(delay, Box::new(self))
  }
}

#[derive(Default)]
struct Route {
  script: VecDeque<Reply>,
  fallback: Option<Reply>,
}

#[derive(Debug, Clone)]
pub struct RecordedCall {
  pub path: String,
  pub at: Instant,
  pub request: HttpRequest,
}

/// In-memory transport answering by URL path.
///
/// Scripted replies are consumed in order; once a route's script is empty its
/// fallback (if any) answers every further call. Unknown paths get a 404.
#[derive(Default)]
pub struct ScriptedTransport {
  routes: Mutex<HashMap<String, Route>>,
  calls: Mutex<Vec<RecordedCall>>,
}

impl ScriptedTransport {
  pub fn new() -> Self {
    Self::default()
  }

  pub fn respond(&self, path: &str, reply: Reply) -> &Self {
    self
      .routes
      .lock()
      .unwrap()
      .entry(path.to_string())
      .or_default()
      .script
      .push_back(reply);
    self
  }

  pub fn always(&self, path: &str, reply: Reply) -> &Self {
    self
      .routes
      .lock()
      .unwrap()
      .entry(path.to_string())
      .or_default()
      .fallback = Some(reply);
    self
  }

  pub fn calls(&self) -> Vec<RecordedCall> {
    self.calls.lock().unwrap().clone()
  }

  pub fn calls_to(&self, path: &str) -> usize {
    self
      .calls
      .lock()
      .unwrap()
      .iter()
      .filter(|c| c.path == path)
      .count()
  }

  pub fn call_times(&self, path: &str) -> Vec<Instant> {
    self
      .calls
      .lock()
      .unwrap()
      .iter()
      .filter(|c| c.path == path)
      .map(|c| c.at)
      .collect()
  }

  fn next_reply(&self, path: &str) -> Reply {
    let mut routes = self.routes.lock().unwrap();
    match routes.get_mut(path) {
      Some(route) => route
        .script
        .pop_front()
        .or_else(|| route.fallback.clone())
        .unwrap_or_else(|| Reply::status(404, "script exhausted")),
      None => Reply::status(404, "no route"),
    }
  }
}

#[async_trait]
impl Transport for ScriptedTransport {
  async fn send(&self, request: &HttpRequest) -> Result<HttpResponse, FetchError> {
    let path = request.url.path().to_string();
    self.calls.lock().unwrap().push(RecordedCall {
      path: path.clone(),
      at: Instant::now(),
      request: request.clone(),
    });

    let mut reply = self.next_reply(&path);
    loop {
      match reply {
        Reply::Respond(response) => return Ok(response),
        Reply::NetworkDown => return Err(FetchError::Network("connection refused".into())),
        Reply::Delayed(delay, inner) => {
          tokio::time::sleep(delay).await;
          reply = *inner;
        }
      }
    }
  }
}

pub fn base_url() -> Url {
  Url::parse("http://dash.test/").unwrap()
}

pub fn client_for(transport: &Arc<ScriptedTransport>) -> RetryingHttpClient {
  RetryingHttpClient::new(transport.clone(), base_url(), RetryPolicy::default())
}
