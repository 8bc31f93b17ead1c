//! Entity stores and their resource state.

mod entity;
mod state;

pub use entity::{EntityStore, StoreOptions};
pub use state::{Phase, ResourceState};
