//! In-memory caching primitives.
//!
//! - `TtlCache`: expiring key/value store, checked lazily on read
//! - `ResourceKey`: canonical keys for resources parameterized by filters
//!
//! Nothing here is ever persisted: entries carry process-local instants.

mod key;
mod ttl;

pub use key::ResourceKey;
pub use ttl::{CacheEntry, TtlCache};
