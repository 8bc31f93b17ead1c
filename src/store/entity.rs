//! Per-entity store combining the TTL cache, the retrying client and the
//! resource state machine.

use async_trait::async_trait;
use futures::future::{AbortHandle, Abortable, Aborted, BoxFuture, FutureExt, Shared};
use std::collections::HashMap;
use std::panic::AssertUnwindSafe;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError, Weak};
use std::time::Duration;
use tracing::{debug, warn};

use super::state::{Phase, ResourceState};
use crate::cache::{ResourceKey, TtlCache};
use crate::entities::Entity;
use crate::error::{panic_message, ApiError, FetchError};
use crate::http::RetryingHttpClient;
use crate::orchestrator::{ResourceFetcher, ResourceReport};
use crate::persist::PersistenceAdapter;

/// Outcome shared by every caller waiting on one network fetch.
#[derive(Clone)]
enum Settled<T> {
  Ready(T),
  Failed(ApiError),
  /// A newer fetch for the same key replaced this one
  Superseded,
}

type SharedOutcome<T> = Shared<BoxFuture<'static, Settled<T>>>;

struct InFlight<T> {
  generation: u64,
  outcome: SharedOutcome<T>,
  abort: AbortHandle,
}

struct StoreInner<T> {
  resource: ResourceState<T>,
  cache: TtlCache<T>,
  /// One pending fetch per canonical cache key
  in_flight: HashMap<String, InFlight<T>>,
  /// Latest generation issued per key that has not settled yet
  latest: HashMap<String, u64>,
  next_generation: u64,
}

struct StoreShared<T> {
  client: RetryingHttpClient,
  ttl: Duration,
  persistence: Option<Arc<PersistenceAdapter>>,
  inner: Mutex<StoreInner<T>>,
}

/// What a caller should do next.
enum Next<T> {
  Wait(SharedOutcome<T>),
  Done(Result<T, ApiError>),
}

/// Optional knobs for an `EntityStore`.
#[derive(Clone, Default)]
pub struct StoreOptions {
  /// Cache lifetime; falls back to the entity's default
  pub ttl: Option<Duration>,
  /// Where snapshots are hydrated from and saved to
  pub persistence: Option<Arc<PersistenceAdapter>>,
}

/// Cached, retrying, stateful access to one entity kind.
///
/// Clones share the same cache and state. Concurrent non-forced fetches for
/// the same key share a single network call; a forced refresh aborts the call
/// it replaces, and a response older than the latest request for its key is
/// never written.
pub struct EntityStore<T: Entity> {
  shared: Arc<StoreShared<T>>,
}

impl<T: Entity> Clone for EntityStore<T> {
  fn clone(&self) -> Self {
    Self {
      shared: Arc::clone(&self.shared),
    }
  }
}

impl<T: Entity> EntityStore<T> {
  pub fn new(client: RetryingHttpClient) -> Self {
    Self::with_options(client, StoreOptions::default())
  }

  /// Build a store, restoring the last persisted snapshot if there is one.
  ///
  /// The cache always starts empty and the resource always starts `Idle`.
  pub fn with_options(client: RetryingHttpClient, options: StoreOptions) -> Self {
    let ttl = options.ttl.unwrap_or_else(T::default_ttl);
    let hydrated = options
      .persistence
      .as_ref()
      .and_then(|p| p.hydrate::<T>(T::entity_type()));

    if hydrated.is_some() {
      debug!(entity = T::entity_type(), "restored persisted snapshot");
    }

    Self {
      shared: Arc::new(StoreShared {
        client,
        ttl,
        persistence: options.persistence,
        inner: Mutex::new(StoreInner {
          resource: ResourceState::hydrated(hydrated),
          cache: TtlCache::new(),
          in_flight: HashMap::new(),
          latest: HashMap::new(),
          next_generation: 0,
        }),
      }),
    }
  }

  /// Fetch the resource identified by `key`.
  ///
  /// Unless `force_refresh` is set, a valid cache entry is returned without
  /// touching the network. Failures are recorded in the resource's error slot
  /// and returned to the caller.
  pub async fn fetch(&self, key: impl Into<ResourceKey>, force_refresh: bool) -> Result<T, ApiError> {
    let key = key.into();
    let cache_key = key.cache_key(T::entity_type());

    let mut outcome = match self.begin(key, &cache_key, force_refresh) {
      Next::Wait(outcome) => outcome,
      Next::Done(result) => return result,
    };

    loop {
      match outcome.await {
        Settled::Ready(value) => return Ok(value),
        Settled::Failed(error) => return Err(error),
        Settled::Superseded => match self.follow(&cache_key) {
          Next::Wait(next) => outcome = next,
          Next::Done(result) => return result,
        },
      }
    }
  }

  /// Override the current value without touching the cache or the network.
  pub fn set_current(&self, value: T) {
    self.shared.lock().resource.resolve(value.clone());
    self.shared.persist(&value);
  }

  pub fn state(&self) -> ResourceState<T> {
    self.shared.lock().resource.clone()
  }

  /// Last known value, whichever key it was fetched for.
  pub fn current(&self) -> Option<T> {
    self.shared.lock().resource.value.clone()
  }

  /// The value, only if the resource is ready with data fetched for `key`.
  pub fn current_for(&self, key: impl Into<ResourceKey>) -> Option<T> {
    let cache_key = key.into().cache_key(T::entity_type());
    self.shared.lock().resource.value_for(&cache_key).cloned()
  }

  pub fn phase(&self) -> Phase {
    self.shared.lock().resource.phase
  }

  pub fn error(&self) -> Option<ApiError> {
    self.shared.lock().resource.error.clone()
  }

  pub fn is_loading(&self) -> bool {
    self.shared.lock().resource.is_loading()
  }

  pub fn ttl(&self) -> Duration {
    self.shared.ttl
  }

  /// Drop cache entries whose key contains `pattern` (all when `None`).
  pub fn invalidate(&self, pattern: Option<&str>) -> usize {
    let removed = self.shared.lock().cache.invalidate(pattern);
    debug!(
      entity = T::entity_type(),
      pattern = pattern.unwrap_or("*"),
      removed,
      "invalidated cache"
    );
    removed
  }

  /// Number of cache entries currently held, expired or not.
  pub fn cached_len(&self) -> usize {
    self.shared.lock().cache.len()
  }

  /// Force the resource out of `Loading`. Returns whether it was loading.
  pub fn clear_loading(&self) -> bool {
    self.shared.lock().resource.clear_loading()
  }

  /// Record a failure that happened outside the store's own fetch path.
  pub fn record_failure(&self, error: ApiError) {
    self.shared.lock().resource.fail(error);
  }

  fn begin(&self, key: ResourceKey, cache_key: &str, force_refresh: bool) -> Next<T> {
    let mut inner = self.shared.lock();

    if !force_refresh {
      if let Some(value) = inner.cache.get(cache_key) {
        debug!(entity = T::entity_type(), key = cache_key, "cache hit");
        inner.resource.resolve_for(cache_key, value.clone());
        return Next::Done(Ok(value));
      }

      if let Some(outcome) = inner.in_flight.get(cache_key).map(|f| f.outcome.clone()) {
        debug!(entity = T::entity_type(), key = cache_key, "joining in-flight fetch");
        // The fetch may have been abandoned and its loading flag reset.
        if !inner.resource.is_loading() {
          inner.resource.begin_loading();
        }
        return Next::Wait(outcome);
      }

      debug!(entity = T::entity_type(), key = cache_key, "cache miss");
    }

    Next::Wait(self.start(&mut inner, key, cache_key))
  }

  /// Issue a new generation for `cache_key` and register its fetch.
  fn start(&self, inner: &mut StoreInner<T>, key: ResourceKey, cache_key: &str) -> SharedOutcome<T> {
    inner.next_generation += 1;
    let generation = inner.next_generation;
    inner.latest.insert(cache_key.to_string(), generation);

    if let Some(previous) = inner.in_flight.remove(cache_key) {
      debug!(
        entity = T::entity_type(),
        key = cache_key,
        superseded = previous.generation,
        generation,
        "superseding in-flight fetch"
      );
      previous.abort.abort();
    }

    inner.resource.begin_loading();

    let client = self.shared.client.clone();
    let work = async move { fetch_remote::<T>(&client, &key).await };

    let store = Arc::downgrade(&self.shared);
    let settle_key = cache_key.to_string();
    let (abort, registration) = AbortHandle::new_pair();

    let outcome = Abortable::new(AssertUnwindSafe(work).catch_unwind(), registration)
      .map(move |result| match result {
        Ok(Ok(fetched)) => settle(&store, generation, &settle_key, fetched),
        Ok(Err(panic)) => {
          let cause = FetchError::Internal(panic_message(panic.as_ref()));
          settle(&store, generation, &settle_key, Err(cause))
        }
        Err(Aborted) => Settled::Superseded,
      })
      .boxed()
      .shared();

    inner.in_flight.insert(
      cache_key.to_string(),
      InFlight {
        generation,
        outcome: outcome.clone(),
        abort,
      },
    );

    outcome
  }

  /// After a superseded outcome: wait on the newer fetch, or read what it left.
  fn follow(&self, cache_key: &str) -> Next<T> {
    let mut inner = self.shared.lock();

    if let Some(in_flight) = inner.in_flight.get(cache_key) {
      return Next::Wait(in_flight.outcome.clone());
    }

    if let Some(value) = inner.cache.get(cache_key) {
      return Next::Done(Ok(value));
    }

    let error = inner.resource.error.clone().unwrap_or_else(|| {
      ApiError::fetch_failed(T::label(), T::error_code(), &FetchError::Superseded)
    });
    Next::Done(Err(error))
  }
}

impl<T: Entity> StoreShared<T> {
  fn lock(&self) -> MutexGuard<'_, StoreInner<T>> {
    self.inner.lock().unwrap_or_else(PoisonError::into_inner)
  }

  fn persist(&self, value: &T) {
    if let Some(persistence) = &self.persistence {
      persistence.save(T::entity_type(), value);
    }
  }

  /// Commit a finished fetch unless a newer one was issued for the same key.
  fn commit(&self, generation: u64, cache_key: &str, result: Result<T, FetchError>) -> Settled<T> {
    let mut inner = self.lock();

    if inner.latest.get(cache_key) != Some(&generation) {
      debug!(
        entity = T::entity_type(),
        key = cache_key,
        generation,
        "discarding stale response"
      );
      return Settled::Superseded;
    }
    inner.latest.remove(cache_key);
    inner.in_flight.remove(cache_key);

    match result {
      Ok(value) => {
        inner.cache.set(cache_key, value.clone(), self.ttl);
        inner.resource.resolve_for(cache_key, value.clone());
        drop(inner);
        self.persist(&value);
        Settled::Ready(value)
      }
      Err(error) => {
        warn!(
          entity = T::entity_type(),
          key = cache_key,
          error = %error,
          "fetch failed"
        );
        let error = ApiError::fetch_failed(T::label(), T::error_code(), &error);
        inner.resource.fail(error.clone());
        Settled::Failed(error)
      }
    }
  }
}

fn settle<T: Entity>(
  store: &Weak<StoreShared<T>>,
  generation: u64,
  cache_key: &str,
  result: Result<T, FetchError>,
) -> Settled<T> {
  match store.upgrade() {
    Some(store) => store.commit(generation, cache_key, result),
    // Store dropped while the fetch was running; hand the result to waiters only.
    None => match result {
      Ok(value) => Settled::Ready(value),
      Err(error) => Settled::Failed(ApiError::fetch_failed(T::label(), T::error_code(), &error)),
    },
  }
}

async fn fetch_remote<T: Entity>(client: &RetryingHttpClient, key: &ResourceKey) -> Result<T, FetchError> {
  let request = T::request(client.base_url(), key)?;
  let response = client.execute(&request).await?;
  T::from_response(response.json()?)
}

#[async_trait]
impl<T: Entity> ResourceFetcher for EntityStore<T> {
  fn resource(&self) -> &'static str {
    T::entity_type()
  }

  async fn fetch_resource(&self, key: &ResourceKey, force_refresh: bool) -> Result<(), ApiError> {
    self.fetch(key.clone(), force_refresh).await.map(|_| ())
  }

  fn clear_loading(&self) -> bool {
    EntityStore::clear_loading(self)
  }

  fn record_failure(&self, detail: &str) {
    let cause = FetchError::Internal(detail.to_string());
    EntityStore::record_failure(self, ApiError::fetch_failed(T::label(), T::error_code(), &cause));
  }

  fn report(&self) -> ResourceReport {
    let inner = self.shared.lock();
    ResourceReport {
      resource: T::entity_type(),
      phase: inner.resource.phase,
      error: inner.resource.error.clone(),
      has_value: inner.resource.value.is_some(),
    }
  }
}
