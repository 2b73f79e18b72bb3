//! Inverted bucket indexes, one per [`IndexKind`].
//!
//! Besides the buckets, the store keeps a posting list (entity → keys it was
//! indexed under) so removal touches exactly the buckets an entity is in and
//! never has to scan.
//!
//! Lock order is postings first, then the per-kind locks. Readers only take
//! per-kind read locks, one kind at a time.

use std::collections::{BTreeMap, BTreeSet, HashMap, HashSet};
use std::sync::{PoisonError, RwLock, RwLockReadGuard, RwLockWriteGuard};

use serde::{Deserialize, Serialize};

use crate::entity::EntityId;

use super::key::{BlockKey, IndexKind};

type Buckets = HashMap<String, HashSet<EntityId>>;

fn read<T>(lock: &RwLock<T>) -> RwLockReadGuard<'_, T> {
    lock.read().unwrap_or_else(PoisonError::into_inner)
}

fn write<T>(lock: &RwLock<T>) -> RwLockWriteGuard<'_, T> {
    lock.write().unwrap_or_else(PoisonError::into_inner)
}

/// Per-kind bucket statistics.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct KindStats {
    pub buckets: usize,
    /// Sum of bucket sizes.
    pub memberships: usize,
    pub largest_bucket: usize,
}

/// Index-wide statistics.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct IndexStats {
    pub entities: usize,
    pub kinds: BTreeMap<IndexKind, KindStats>,
}

impl IndexStats {
    #[must_use]
    pub fn total_buckets(&self) -> usize {
        self.kinds.values().map(|k| k.buckets).sum()
    }
}

/// Bucket maps for every index kind.
#[derive(Debug)]
pub struct IndexStore {
    kinds: [RwLock<Buckets>; IndexKind::COUNT],
    postings: RwLock<HashMap<EntityId, BTreeSet<BlockKey>>>,
}

impl Default for IndexStore {
    fn default() -> Self {
        Self::new()
    }
}

impl IndexStore {
    #[must_use]
    pub fn new() -> Self {
        Self {
            kinds: std::array::from_fn(|_| RwLock::new(HashMap::new())),
            postings: RwLock::new(HashMap::new()),
        }
    }

    fn slot(&self, kind: IndexKind) -> &RwLock<Buckets> {
        &self.kinds[kind.slot()]
    }

    /// Index `id` under exactly `keys`, dropping any memberships from a
    /// previous call. Returns the number of keys now held.
    pub fn replace(&self, id: &EntityId, keys: BTreeSet<BlockKey>) -> usize {
        let mut postings = write(&self.postings);
        if let Some(old) = postings.remove(id) {
            self.unlink(id, &old);
        }
        for key in &keys {
            write(self.slot(key.kind))
                .entry(key.value.clone())
                .or_default()
                .insert(id.clone());
        }
        let n = keys.len();
        if n > 0 {
            postings.insert(id.clone(), keys);
        }
        n
    }

    /// Purge `id` from every bucket. Returns false if it was not indexed.
    pub fn remove(&self, id: &EntityId) -> bool {
        let mut postings = write(&self.postings);
        match postings.remove(id) {
            Some(keys) => {
                self.unlink(id, &keys);
                true
            }
            None => false,
        }
    }

    fn unlink(&self, id: &EntityId, keys: &BTreeSet<BlockKey>) {
        for key in keys {
            let mut buckets = write(self.slot(key.kind));
            if let Some(members) = buckets.get_mut(&key.value) {
                members.remove(id);
                if members.is_empty() {
                    buckets.remove(&key.value);
                }
            }
        }
    }

    /// Union of the buckets named by `keys`.
    #[must_use]
    pub fn lookup<'a>(&self, keys: impl IntoIterator<Item = &'a BlockKey>) -> HashSet<EntityId> {
        let mut out = HashSet::new();
        for key in keys {
            if let Some(members) = read(self.slot(key.kind)).get(&key.value) {
                out.extend(members.iter().cloned());
            }
        }
        out
    }

    /// Members of one bucket, sorted.
    #[must_use]
    pub fn bucket(&self, key: &BlockKey) -> BTreeSet<EntityId> {
        read(self.slot(key.kind))
            .get(&key.value)
            .map(|m| m.iter().cloned().collect())
            .unwrap_or_default()
    }

    /// Keys `id` is currently indexed under.
    #[must_use]
    pub fn keys_for(&self, id: &EntityId) -> BTreeSet<BlockKey> {
        read(&self.postings).get(id).cloned().unwrap_or_default()
    }

    #[must_use]
    pub fn contains(&self, id: &EntityId) -> bool {
        read(&self.postings).contains_key(id)
    }

    /// Returns true if any bucket of any kind still lists `id`.
    #[must_use]
    pub fn any_bucket_contains(&self, id: &EntityId) -> bool {
        self.kinds
            .iter()
            .any(|lock| read(lock).values().any(|members| members.contains(id)))
    }

    #[must_use]
    pub fn entity_count(&self) -> usize {
        read(&self.postings).len()
    }

    /// Drop buckets whose member set is empty. Returns how many were removed.
    pub fn compact(&self) -> usize {
        let _postings = write(&self.postings);
        let mut removed = 0;
        for lock in &self.kinds {
            let mut buckets = write(lock);
            let before = buckets.len();
            buckets.retain(|_, members| !members.is_empty());
            removed += before - buckets.len();
        }
        removed
    }

    pub fn clear(&self) {
        let mut postings = write(&self.postings);
        for lock in &self.kinds {
            write(lock).clear();
        }
        postings.clear();
    }

    #[must_use]
    pub fn stats(&self) -> IndexStats {
        let mut kinds = BTreeMap::new();
        for kind in IndexKind::ALL {
            let buckets = read(self.slot(kind));
            if buckets.is_empty() {
                continue;
            }
            kinds.insert(
                kind,
                KindStats {
                    buckets: buckets.len(),
                    memberships: buckets.values().map(HashSet::len).sum(),
                    largest_bucket: buckets.values().map(HashSet::len).max().unwrap_or(0),
                },
            );
        }
        IndexStats {
            entities: self.entity_count(),
            kinds,
        }
    }

    #[cfg(test)]
    fn insert_empty_bucket(&self, key: &BlockKey) {
        write(self.slot(key.kind))
            .entry(key.value.clone())
            .or_default();
    }
}
