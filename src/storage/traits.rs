//! Abstract storage traits for identilink.
//!
//! The matching engine never owns canonical records; it reads them from an
//! entity store supplied by the host. By using a trait, we enable:
//! - An in-memory backend for tests, tooling and embedded use
//! - Database-backed stores owned by the resolution workflow

use thiserror::Error;

use crate::entity::{Entity, EntityId};

/// Errors that can occur during storage operations.
#[derive(Debug, Error)]
pub enum StorageError {
    /// Entity not found.
    #[error("Entity not found: {0}")]
    EntityNotFound(EntityId),

    /// Key already exists.
    #[error("Duplicate key: {0}")]
    DuplicateKey(String),

    /// Backend error.
    #[error("Storage backend error: {0}")]
    BackendError(String),

    /// Connection failed.
    #[error("Connection error: {0}")]
    ConnectionError(String),
}

/// Read-side contract the engine requires from the entity store.
///
/// # Consistency
/// - `find_page` must use a stable order so consecutive pages neither repeat
///   nor skip records while the store is not being written to.
pub trait EntityStore: Send + Sync {
    /// Get an entity by ID.
    fn get(&self, id: &EntityId) -> Result<Option<Entity>, StorageError>;

    /// Load every entity.
    fn find_all(&self) -> Result<Vec<Entity>, StorageError>;

    /// Load one page of entities in store order.
    fn find_page(&self, skip: usize, limit: usize) -> Result<Vec<Entity>, StorageError>;

    /// Number of stored entities.
    fn count(&self) -> Result<usize, StorageError>;
}
