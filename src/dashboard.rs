//! The creator dashboard's data layer, wired from configuration.
//!
//! `Dashboard` is an explicit dependency container: it owns one `EntityStore`
//! per entity kind, all sharing one `RetryingHttpClient` and (optionally) one
//! `PersistenceAdapter`. Nothing is global, so tests build isolated instances.

use color_eyre::Result;
use serde::Serialize;
use std::sync::Arc;
use tracing::info;

use crate::cache::ResourceKey;
use crate::config::{Config, TtlConfig};
use crate::entities::{ClientData, Creator, Model, SchedulerSheet};
use crate::error::ApiError;
use crate::http::{RetryingHttpClient, Transport};
use crate::orchestrator::{BundleResult, FetchOrchestrator};
use crate::persist::PersistenceAdapter;
use crate::store::{EntityStore, StoreOptions};

/// Values behind the creator view. A missing part is either failed, still
/// loading, or was last fetched for a different creator.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct CreatorView {
  pub creator: Option<Creator>,
  pub model: Option<Model>,
  pub client_data: Option<ClientData>,
}

pub struct Dashboard {
  creators: EntityStore<Creator>,
  models: EntityStore<Model>,
  client_data: EntityStore<ClientData>,
  schedules: EntityStore<SchedulerSheet>,
  orchestrator: FetchOrchestrator,
}

impl Dashboard {
  pub fn new(
    config: &Config,
    transport: Arc<dyn Transport>,
    persistence: Option<Arc<PersistenceAdapter>>,
  ) -> Result<Self> {
    let client = RetryingHttpClient::new(transport, config.base_url()?, config.retry_policy());
    Ok(Self::from_client(client, &config.ttl, persistence))
  }

  /// Build every store around `client`, hydrating whitelisted snapshots.
  pub fn from_client(
    client: RetryingHttpClient,
    ttl: &TtlConfig,
    persistence: Option<Arc<PersistenceAdapter>>,
  ) -> Self {
    let base_url = client.base_url().to_string();
    let options = |lifetime| StoreOptions {
      ttl: Some(lifetime),
      persistence: persistence.clone(),
    };

    let dashboard = Self {
      creators: EntityStore::with_options(client.clone(), options(ttl.creator())),
      models: EntityStore::with_options(client.clone(), options(ttl.model())),
      client_data: EntityStore::with_options(client.clone(), options(ttl.client_data())),
      schedules: EntityStore::with_options(client, options(ttl.scheduler())),
      orchestrator: FetchOrchestrator::new(),
    };

    info!(
      base_url = %base_url,
      persistence = persistence.is_some(),
      "dashboard data layer ready"
    );
    dashboard
  }

  /// Fetch creator, model and client data for `name` concurrently.
  ///
  /// Always resolves; failed parts are reported per resource.
  pub async fn load_creator_view(&self, name: &str, force_refresh: bool) -> BundleResult {
    let key = ResourceKey::new(name);
    self
      .orchestrator
      .fetch_bundle(
        &key,
        force_refresh,
        &[&self.creators, &self.models, &self.client_data],
      )
      .await
  }

  /// The parts of `name`'s view that are ready with data fetched for `name`.
  pub fn creator_view(&self, name: &str) -> CreatorView {
    let key = ResourceKey::new(name);
    CreatorView {
      creator: self.creators.current_for(&key),
      model: self.models.current_for(&key),
      client_data: self.client_data.current_for(&key),
    }
  }

  /// Last known values of every store, regardless of subject or phase.
  pub fn restored_view(&self) -> CreatorView {
    CreatorView {
      creator: self.creators.current(),
      model: self.models.current(),
      client_data: self.client_data.current(),
    }
  }

  /// Fetch the scheduler sheet directly; failures reach the caller.
  pub async fn load_schedule(
    &self,
    key: impl Into<ResourceKey>,
    force_refresh: bool,
  ) -> Result<SchedulerSheet, ApiError> {
    self.schedules.fetch(key, force_refresh).await
  }

  /// Invalidate matching entries in every store's cache.
  pub fn invalidate(&self, pattern: Option<&str>) -> usize {
    self.creators.invalidate(pattern)
      + self.models.invalidate(pattern)
      + self.client_data.invalidate(pattern)
      + self.schedules.invalidate(pattern)
  }

  pub fn creators(&self) -> &EntityStore<Creator> {
    &self.creators
  }

  pub fn models(&self) -> &EntityStore<Model> {
    &self.models
  }

  pub fn client_data(&self) -> &EntityStore<ClientData> {
    &self.client_data
  }

  pub fn schedules(&self) -> &EntityStore<SchedulerSheet> {
    &self.schedules
  }
}
