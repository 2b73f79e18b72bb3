//! Bounded prediction cache keyed by unordered entity pairs.
//!
//! Eviction is insertion-order (FIFO): once full, the entry inserted earliest
//! is dropped regardless of how recently it was read. Overwriting an existing
//! key keeps its original position.

use std::collections::hash_map::Entry;
use std::collections::{HashMap, VecDeque};
use std::fmt;

use serde::{Deserialize, Serialize};

use crate::entity::EntityId;

/// Order-independent pair key: `PairKey::new(a, b) == PairKey::new(b, a)`.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct PairKey {
    low: EntityId,
    high: EntityId,
}

impl PairKey {
    #[must_use]
    pub fn new(a: &EntityId, b: &EntityId) -> Self {
        if a <= b {
            Self {
                low: a.clone(),
                high: b.clone(),
            }
        } else {
            Self {
                low: b.clone(),
                high: a.clone(),
            }
        }
    }

    #[must_use]
    pub const fn ids(&self) -> (&EntityId, &EntityId) {
        (&self.low, &self.high)
    }
}

impl fmt::Display for PairKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}|{}", self.low, self.high)
    }
}

/// Cache counters.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct CacheStats {
    pub size: usize,
    pub capacity: usize,
    pub hits: u64,
    pub misses: u64,
    pub evictions: u64,
}

impl CacheStats {
    /// Hits over lookups; `None` before the first lookup.
    #[must_use]
    pub fn hit_rate(&self) -> Option<f64> {
        let lookups = self.hits + self.misses;
        if lookups == 0 {
            return None;
        }
        #[allow(clippy::cast_precision_loss)]
        let rate = self.hits as f64 / lookups as f64;
        Some(rate)
    }
}

/// FIFO cache of pair decisions.
#[derive(Debug)]
pub struct PredictionCache<V> {
    capacity: usize,
    entries: HashMap<PairKey, V>,
    order: VecDeque<PairKey>,
    hits: u64,
    misses: u64,
    evictions: u64,
}

impl<V: Clone> PredictionCache<V> {
    /// A capacity of 0 is treated as 1.
    #[must_use]
    pub fn new(capacity: usize) -> Self {
        let capacity = capacity.max(1);
        Self {
            capacity,
            entries: HashMap::with_capacity(capacity),
            order: VecDeque::with_capacity(capacity),
            hits: 0,
            misses: 0,
            evictions: 0,
        }
    }

    /// Look up a pair, counting the hit or miss.
    pub fn get(&mut self, key: &PairKey) -> Option<V> {
        if let Some(v) = self.entries.get(key) {
            self.hits += 1;
            Some(v.clone())
        } else {
            self.misses += 1;
            None
        }
    }

    #[must_use]
    pub fn contains(&self, key: &PairKey) -> bool {
        self.entries.contains_key(key)
    }

    /// Insert a decision, returning the evicted key if the cache was full.
    pub fn insert(&mut self, key: PairKey, value: V) -> Option<PairKey> {
        match self.entries.entry(key) {
            Entry::Occupied(mut slot) => {
                slot.insert(value);
                return None;
            }
            Entry::Vacant(slot) => {
                self.order.push_back(slot.key().clone());
                slot.insert(value);
            }
        }

        if self.entries.len() <= self.capacity {
            return None;
        }
        let oldest = self.order.pop_front()?;
        self.entries.remove(&oldest);
        self.evictions += 1;
        Some(oldest)
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    #[must_use]
    pub const fn capacity(&self) -> usize {
        self.capacity
    }

    /// Drop every entry. Counters are kept.
    pub fn clear(&mut self) {
        self.entries.clear();
        self.order.clear();
    }

    #[must_use]
    pub fn stats(&self) -> CacheStats {
        CacheStats {
            size: self.entries.len(),
            capacity: self.capacity,
            hits: self.hits,
            misses: self.misses,
            evictions: self.evictions,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn key(a: &str, b: &str) -> PairKey {
        PairKey::new(&EntityId::from(a), &EntityId::from(b))
    }

    #[test]
    fn pair_key_is_order_independent() {
        assert_eq!(key("A", "B"), key("B", "A"));
        assert_eq!(key("B", "A").to_string(), "A|B");
        assert_ne!(key("A", "B"), key("A", "C"));
    }

    #[test]
    fn evicts_earliest_inserted_not_least_recently_used() {
        let mut cache = PredictionCache::new(2);
        cache.insert(key("A", "B"), 1);
        cache.insert(key("A", "C"), 2);
        // Reading the oldest entry does not protect it.
        assert_eq!(cache.get(&key("B", "A")), Some(1));

        let evicted = cache.insert(key("A", "D"), 3);
        assert_eq!(evicted, Some(key("A", "B")));
        assert!(!cache.contains(&key("A", "B")));
        assert_eq!(cache.len(), 2);
    }

    #[test]
    fn overwrite_keeps_position_and_size() {
        let mut cache = PredictionCache::new(2);
        cache.insert(key("A", "B"), 1);
        cache.insert(key("A", "C"), 2);
        assert_eq!(cache.insert(key("B", "A"), 10), None);
        assert_eq!(cache.get(&key("A", "B")), Some(10));

        assert_eq!(cache.insert(key("A", "D"), 3), Some(key("A", "B")));
    }

    #[test]
    fn stats_and_clear() {
        let mut cache = PredictionCache::new(1);
        assert_eq!(cache.stats().hit_rate(), None);
        cache.insert(key("A", "B"), 1);
        cache.get(&key("A", "B"));
        cache.get(&key("A", "Z"));
        cache.insert(key("A", "C"), 2);

        let stats = cache.stats();
        assert_eq!((stats.hits, stats.misses, stats.evictions), (1, 1, 1));
        assert_eq!(stats.hit_rate(), Some(0.5));

        cache.clear();
        assert!(cache.is_empty());
        assert_eq!(cache.stats().hits, 1);
    }
}
