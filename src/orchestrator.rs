//! Concurrent multi-resource fetches for composite views.
//!
//! A composite view (creator + model + client data) renders whatever part of
//! its data arrived. `FetchOrchestrator::fetch_bundle` therefore never fails:
//! each sub-fetch settles on its own and its failure is only visible in that
//! resource's state afterwards.

use async_trait::async_trait;
use futures::future::{join_all, FutureExt};
use serde::Serialize;
use std::panic::AssertUnwindSafe;
use tracing::{debug, error, warn};

use crate::cache::ResourceKey;
use crate::error::{panic_message, ApiError};
use crate::store::Phase;

/// One resource slot that can take part in a bundle.
#[async_trait]
pub trait ResourceFetcher: Send + Sync {
  /// Name of the resource (e.g., "creator")
  fn resource(&self) -> &'static str;

  /// Fetch the resource, recording the outcome in its own state.
  async fn fetch_resource(&self, key: &ResourceKey, force_refresh: bool) -> Result<(), ApiError>;

  /// Force the resource out of `Loading`. Returns whether it was loading.
  fn clear_loading(&self) -> bool;

  /// Record a failure the resource could not record itself.
  fn record_failure(&self, detail: &str);

  /// Current phase and error of the resource.
  fn report(&self) -> ResourceReport;
}

/// State of one resource after a bundle settled.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ResourceReport {
  pub resource: &'static str,
  pub phase: Phase,
  pub error: Option<ApiError>,
  /// Whether the resource holds a value (fresh, cached, or restored)
  pub has_value: bool,
}

/// Per-resource outcome of a bundle.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct BundleResult {
  pub resources: Vec<ResourceReport>,
}

impl BundleResult {
  pub fn get(&self, resource: &str) -> Option<&ResourceReport> {
    self.resources.iter().find(|r| r.resource == resource)
  }

  pub fn ready(&self) -> impl Iterator<Item = &ResourceReport> {
    self.resources.iter().filter(|r| r.phase == Phase::Ready)
  }

  pub fn failed(&self) -> impl Iterator<Item = &ResourceReport> {
    self.resources.iter().filter(|r| r.phase == Phase::Error)
  }

  /// True when every resource ended `Ready`.
  pub fn is_complete(&self) -> bool {
    self.resources.iter().all(|r| r.phase == Phase::Ready)
  }

  pub fn any_loading(&self) -> bool {
    self.resources.iter().any(|r| r.phase == Phase::Loading)
  }
}

/// Clears loading flags of every resource in a bundle when dropped, so the
/// flags are reset even if the bundle future is dropped mid-flight.
struct LoadingReset<'a> {
  resources: &'a [&'a dyn ResourceFetcher],
}

impl LoadingReset<'_> {
  fn reset(&self) {
    for resource in self.resources {
      if resource.clear_loading() {
        debug!(resource = resource.resource(), "cleared stuck loading flag");
      }
    }
  }
}

impl Drop for LoadingReset<'_> {
  fn drop(&mut self) {
    self.reset();
  }
}

/// Runs the fetches of one logical view concurrently.
#[derive(Debug, Clone, Copy, Default)]
pub struct FetchOrchestrator;

impl FetchOrchestrator {
  pub fn new() -> Self {
    Self
  }

  /// Fetch every resource for `key` concurrently and wait for all of them.
  ///
  /// Never fails and never short-circuits. Rejected sub-fetches are logged;
  /// a panicking sub-fetch is recorded as that resource's error. Once this
  /// returns no resource in the bundle is `Loading`.
  pub async fn fetch_bundle(
    &self,
    key: &ResourceKey,
    force_refresh: bool,
    resources: &[&dyn ResourceFetcher],
  ) -> BundleResult {
    let reset = LoadingReset { resources };

    let fetches = resources.iter().map(|resource| {
      AssertUnwindSafe(resource.fetch_resource(key, force_refresh)).catch_unwind()
    });

    match AssertUnwindSafe(join_all(fetches)).catch_unwind().await {
      Ok(outcomes) => {
        for (resource, outcome) in resources.iter().zip(outcomes) {
          match outcome {
            Ok(Ok(())) => {}
            Ok(Err(e)) => warn!(
              resource = resource.resource(),
              key = %key,
              code = %e.code,
              error = %e,
              "bundle sub-fetch failed"
            ),
            Err(panic) => {
              let detail = panic_message(panic.as_ref());
              error!(
                resource = resource.resource(),
                key = %key,
                panic = %detail,
                "bundle sub-fetch panicked"
              );
              resource.record_failure(&detail);
            }
          }
        }
      }
      Err(panic) => {
        error!(
          key = %key,
          panic = %panic_message(panic.as_ref()),
          "bundle orchestration panicked"
        );
      }
    }

    reset.reset();

    BundleResult {
      resources: resources.iter().map(|r| r.report()).collect(),
    }
  }
}

#[cfg(test)]
mod tests {
  use super::*;
  use crate::entities::{ClientData, Creator, Model};
  use crate::store::EntityStore;
  use crate::testing::{client_for, Reply, ScriptedTransport};
  use serde_json::json;
  use std::sync::atomic::{AtomicBool, Ordering};
  use std::sync::{Arc, Mutex};
  use std::time::Duration;

  struct Stores {
    transport: Arc<ScriptedTransport>,
    creators: EntityStore<Creator>,
    models: EntityStore<Model>,
    client_data: EntityStore<ClientData>,
  }

  fn stores() -> Stores {
    let transport = Arc::new(ScriptedTransport::new());
    let client = client_for(&transport);
    Stores {
      creators: EntityStore::new(client.clone()),
      models: EntityStore::new(client.clone()),
      client_data: EntityStore::new(client),
      transport,
    }
  }

  fn healthy_creator_and_model(transport: &ScriptedTransport) {
    transport.always(
      "/api/creators/Alice",
      Reply::ok(json!({"id": 1, "name": "Alice"})),
    );
    transport.always(
      "/api/models/Alice",
      Reply::ok(json!({"model": {"id": 2, "name": "Lexi"}})),
    );
  }

  #[tokio::test(start_paused = true)]
  async fn test_partial_failure_resolves() {
    let s = stores();
    healthy_creator_and_model(&s.transport);
    s.transport
      .always("/api/client-data", Reply::status(500, "sheet backend down"));

    let result = FetchOrchestrator::new()
      .fetch_bundle(
        &ResourceKey::new("Alice"),
        false,
        &[&s.creators, &s.models, &s.client_data],
      )
      .await;

    assert_eq!(result.ready().count(), 2);
    assert_eq!(result.failed().count(), 1);
    assert!(!result.is_complete());
    assert!(!result.any_loading());

    let failed = result.get("client_data").unwrap();
    assert_eq!(failed.phase, Phase::Error);
    let error = failed.error.as_ref().unwrap();
    assert_eq!(error.code, "CLIENT_DATA_FETCH_ERROR");
    assert!(error.message.starts_with("Failed to fetch client data"));

    assert_eq!(s.transport.calls_to("/api/client-data"), 4);
    assert_eq!(s.creators.phase(), Phase::Ready);
    assert_eq!(s.models.phase(), Phase::Ready);
    assert_eq!(s.client_data.phase(), Phase::Error);
  }

  #[tokio::test(start_paused = true)]
  async fn test_full_success_and_cache_reuse() {
    let s = stores();
    healthy_creator_and_model(&s.transport);
    s.transport.always(
      "/api/client-data",
      Reply::ok(json!({"creator": "Alice", "revenue": 10.0})),
    );
    let key = ResourceKey::new("Alice");
    let bundle: [&dyn ResourceFetcher; 3] = [&s.creators, &s.models, &s.client_data];

    let first = FetchOrchestrator::new().fetch_bundle(&key, false, &bundle).await;
    let second = FetchOrchestrator::new().fetch_bundle(&key, false, &bundle).await;

    assert!(first.is_complete());
    assert!(second.is_complete());
    assert_eq!(s.transport.calls().len(), 3);
  }

  #[tokio::test(start_paused = true)]
  async fn test_sub_fetches_run_concurrently() {
    let s = stores();
    let slow = Duration::from_secs(3);
    s.transport.always(
      "/api/creators/Alice",
      Reply::ok(json!({"id": 1, "name": "Alice"})).after(slow),
    );
    s.transport.always(
      "/api/models/Alice",
      Reply::ok(json!({"id": 2, "name": "Lexi"})).after(slow),
    );
    s.transport.always(
      "/api/client-data",
      Reply::ok(json!({"creator": "Alice"})).after(slow),
    );

    let started = tokio::time::Instant::now();
    let result = FetchOrchestrator::new()
      .fetch_bundle(
        &ResourceKey::new("Alice"),
        false,
        &[&s.creators, &s.models, &s.client_data],
      )
      .await;

    assert!(result.is_complete());
    assert!(started.elapsed() < Duration::from_secs(4));
  }

  /// A fetcher that panics mid-fetch after raising its loading flag.
  #[derive(Default)]
  struct PanickingFetcher {
    loading: AtomicBool,
    failure: Mutex<Option<String>>,
  }

  #[async_trait]
  impl ResourceFetcher for PanickingFetcher {
    fn resource(&self) -> &'static str {
      "panicky"
    }

    async fn fetch_resource(&self, _key: &ResourceKey, _force_refresh: bool) -> Result<(), ApiError> {
      self.loading.store(true, Ordering::SeqCst);
      tokio::task::yield_now().await;
      panic!("sheet parser exploded");
    }

    fn clear_loading(&self) -> bool {
      self.loading.swap(false, Ordering::SeqCst)
    }

    fn record_failure(&self, detail: &str) {
      *self.failure.lock().unwrap() = Some(detail.to_string());
    }

    fn report(&self) -> ResourceReport {
      let failure = self.failure.lock().unwrap().clone();
      ResourceReport {
        resource: "panicky",
        phase: if self.loading.load(Ordering::SeqCst) {
          Phase::Loading
        } else if failure.is_some() {
          Phase::Error
        } else {
          Phase::Idle
        },
        error: failure.map(|f| ApiError::new("PANICKY_FETCH_ERROR", f)),
        has_value: false,
      }
    }
  }

  #[tokio::test(start_paused = true)]
  async fn test_panicking_sub_fetch_is_contained() {
    let s = stores();
    healthy_creator_and_model(&s.transport);
    let panicky = PanickingFetcher::default();

    let result = FetchOrchestrator::new()
      .fetch_bundle(
        &ResourceKey::new("Alice"),
        false,
        &[&s.creators, &panicky, &s.models],
      )
      .await;

    assert!(!result.any_loading());
    assert!(!panicky.loading.load(Ordering::SeqCst));
    assert_eq!(result.ready().count(), 2);
    let report = result.get("panicky").unwrap();
    assert_eq!(report.phase, Phase::Error);
    assert_eq!(
      report.error.as_ref().unwrap().message,
      "sheet parser exploded"
    );
  }

  #[tokio::test(start_paused = true)]
  async fn test_dropped_bundle_resets_loading() {
    let s = stores();
    s.transport.always(
      "/api/creators/Alice",
      Reply::ok(json!({"id": 1, "name": "Alice"})).after(Duration::from_secs(60)),
    );
    let key = ResourceKey::new("Alice");
    let bundle: [&dyn ResourceFetcher; 1] = [&s.creators];

    let orchestrator = FetchOrchestrator::new();
    let timed_out = tokio::time::timeout(
      Duration::from_secs(1),
      orchestrator.fetch_bundle(&key, false, &bundle),
    )
    .await;

    assert!(timed_out.is_err());
    assert!(!s.creators.is_loading());
    assert_eq!(s.creators.phase(), Phase::Idle);
  }
}
