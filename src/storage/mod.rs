//! Storage layer: the entity-store contract and an in-memory backend.

pub mod memory;
pub mod traits;

pub use memory::InMemoryEntityStore;
pub use traits::{EntityStore, StorageError};
