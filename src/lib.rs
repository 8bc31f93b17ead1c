//! Resilient data access for the creator management dashboard.
//!
//! Entity snapshots (creators, models, client data, scheduler sheets) are
//! fetched through a retrying HTTP client, cached with per-entity TTLs,
//! tracked as loading/ready/error resources, and optionally persisted
//! across restarts. `Dashboard` wires all of it together.

pub mod cache;
pub mod config;
pub mod dashboard;
pub mod entities;
pub mod error;
pub mod http;
pub mod logging;
pub mod orchestrator;
pub mod persist;
pub mod store;

#[cfg(test)]
mod testing;

pub use cache::{ResourceKey, TtlCache};
pub use config::Config;
pub use dashboard::{CreatorView, Dashboard};
pub use error::{ApiError, FetchError};
pub use http::{RetryPolicy, RetryingHttpClient};
pub use orchestrator::{BundleResult, FetchOrchestrator, ResourceFetcher, ResourceReport};
pub use persist::PersistenceAdapter;
pub use store::{EntityStore, Phase, ResourceState};
