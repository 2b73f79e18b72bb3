//! In-memory storage backend.
//!
//! Thread-safe reference implementation of [`EntityStore`]. Records are kept
//! in id order so paging is stable.

use std::collections::BTreeMap;
use std::sync::RwLock;

use crate::entity::{Entity, EntityId};
use crate::storage::traits::{EntityStore, StorageError};

fn lock_err(context: &'static str) -> StorageError {
    StorageError::BackendError(format!("poisoned lock: {context}"))
}

/// Thread-safe in-memory entity store.
#[derive(Debug, Default)]
pub struct InMemoryEntityStore {
    by_id: RwLock<BTreeMap<EntityId, Entity>>,
}

impl InMemoryEntityStore {
    /// Create a new empty store.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Create a store pre-populated with `entities` (later duplicates win).
    #[must_use]
    pub fn with_entities(entities: impl IntoIterator<Item = Entity>) -> Self {
        let by_id = entities.into_iter().map(|e| (e.id.clone(), e)).collect();
        Self {
            by_id: RwLock::new(by_id),
        }
    }

    /// Insert a new entity. Returns error if the ID already exists.
    pub fn insert(&self, entity: Entity) -> Result<(), StorageError> {
        let mut by_id = self.by_id.write().map_err(|_| lock_err("entity.insert"))?;
        if by_id.contains_key(&entity.id) {
            return Err(StorageError::DuplicateKey(entity.id.to_string()));
        }
        by_id.insert(entity.id.clone(), entity);
        Ok(())
    }

    /// Insert or replace an entity, returning the previous record.
    pub fn upsert(&self, entity: Entity) -> Result<Option<Entity>, StorageError> {
        let mut by_id = self.by_id.write().map_err(|_| lock_err("entity.upsert"))?;
        Ok(by_id.insert(entity.id.clone(), entity))
    }

    /// Remove an entity. Returns error if not found.
    pub fn remove(&self, id: &EntityId) -> Result<Entity, StorageError> {
        let mut by_id = self.by_id.write().map_err(|_| lock_err("entity.remove"))?;
        by_id
            .remove(id)
            .ok_or_else(|| StorageError::EntityNotFound(id.clone()))
    }
}

impl EntityStore for InMemoryEntityStore {
    fn get(&self, id: &EntityId) -> Result<Option<Entity>, StorageError> {
        let by_id = self.by_id.read().map_err(|_| lock_err("entity.get"))?;
        Ok(by_id.get(id).cloned())
    }

    fn find_all(&self) -> Result<Vec<Entity>, StorageError> {
        let by_id = self.by_id.read().map_err(|_| lock_err("entity.find_all"))?;
        Ok(by_id.values().cloned().collect())
    }

    fn find_page(&self, skip: usize, limit: usize) -> Result<Vec<Entity>, StorageError> {
        let by_id = self.by_id.read().map_err(|_| lock_err("entity.find_page"))?;
        Ok(by_id.values().skip(skip).take(limit).cloned().collect())
    }

    fn count(&self) -> Result<usize, StorageError> {
        let by_id = self.by_id.read().map_err(|_| lock_err("entity.count"))?;
        Ok(by_id.len())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn insert_rejects_duplicates() {
        let store = InMemoryEntityStore::new();
        store.insert(Entity::new("E1")).unwrap();
        let err = store.insert(Entity::new("E1")).unwrap_err();
        assert!(matches!(err, StorageError::DuplicateKey(_)));
        assert_eq!(store.count().unwrap(), 1);
    }

    #[test]
    fn upsert_replaces_and_remove_deletes() {
        let store = InMemoryEntityStore::new();
        assert!(store.upsert(Entity::new("E1").with_name("A")).unwrap().is_none());
        let prev = store.upsert(Entity::new("E1").with_name("B")).unwrap();
        assert_eq!(prev.unwrap().name(), Some("A"));

        let got = store.get(&EntityId::from("E1")).unwrap().unwrap();
        assert_eq!(got.name(), Some("B"));

        store.remove(&EntityId::from("E1")).unwrap();
        assert!(store.get(&EntityId::from("E1")).unwrap().is_none());
        assert!(matches!(
            store.remove(&EntityId::from("E1")),
            Err(StorageError::EntityNotFound(_))
        ));
    }

    #[test]
    fn pages_cover_store_without_overlap() {
        let store = InMemoryEntityStore::with_entities(
            (0..7).map(|i| Entity::new(format!("E{i}"))),
        );

        let mut seen = Vec::new();
        let mut skip = 0;
        loop {
            let page = store.find_page(skip, 3).unwrap();
            if page.is_empty() {
                break;
            }
            skip += page.len();
            seen.extend(page.into_iter().map(|e| e.id));
        }

        let all: Vec<EntityId> = store.find_all().unwrap().into_iter().map(|e| e.id).collect();
        assert_eq!(seen, all);
        assert_eq!(seen.len(), 7);
    }
}
