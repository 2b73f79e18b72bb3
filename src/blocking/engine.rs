//! Blocking engine: keeps the index in sync with entity records and answers
//! candidate queries.
//!
//! Mutations are serialized by one writer gate. Full and incremental rebuilds
//! populate a fresh [`IndexStore`] while holding the gate and then swap it in,
//! so a lookup sees either the old index or the new one, never a half-built
//! index.

use std::collections::{BTreeSet, HashSet};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError, RwLock};
use std::time::{Duration, Instant};

use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

use crate::config::BlockingConfig;
use crate::entity::{Entity, EntityId};
use crate::error::MatchResult;
use crate::monitor::{names, PerformanceMonitor};
use crate::storage::EntityStore;

use super::index::{IndexStats, IndexStore};
use super::key::{BlockKey, BlockingStrategy};
use super::keygen::KeyGenerator;

/// Deduplicated ids proposed for comparison with a query entity.
pub type CandidateSet = HashSet<EntityId>;

/// Outcome of a full or incremental rebuild.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct BuildReport {
    pub indexed: usize,
    /// Entities that could not be indexed (logged and skipped).
    pub skipped: usize,
    pub duration: Duration,
}

/// Multi-strategy blocking over an [`EntityStore`].
pub struct BlockingEngine {
    store: Arc<dyn EntityStore>,
    index: RwLock<Arc<IndexStore>>,
    writer: Mutex<()>,
    keys: KeyGenerator,
    monitor: Arc<PerformanceMonitor>,
    cfg: BlockingConfig,
}

impl std::fmt::Debug for BlockingEngine {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("BlockingEngine")
            .field("cfg", &self.cfg)
            .field("indexed", &self.current().entity_count())
            .finish_non_exhaustive()
    }
}

impl BlockingEngine {
    #[must_use]
    pub fn new(
        store: Arc<dyn EntityStore>,
        monitor: Arc<PerformanceMonitor>,
        cfg: BlockingConfig,
    ) -> Self {
        Self {
            store,
            index: RwLock::new(Arc::new(IndexStore::new())),
            writer: Mutex::new(()),
            keys: KeyGenerator::new(cfg.clone()),
            monitor,
            cfg,
        }
    }

    #[must_use]
    pub const fn config(&self) -> &BlockingConfig {
        &self.cfg
    }

    #[must_use]
    pub fn monitor(&self) -> &Arc<PerformanceMonitor> {
        &self.monitor
    }

    fn current(&self) -> Arc<IndexStore> {
        Arc::clone(&self.index.read().unwrap_or_else(PoisonError::into_inner))
    }

    fn gate(&self) -> MutexGuard<'_, ()> {
        self.writer.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn swap(&self, fresh: IndexStore) {
        *self.index.write().unwrap_or_else(PoisonError::into_inner) = Arc::new(fresh);
    }

    fn sync_total_records(&self, index: &IndexStore) {
        self.monitor.set_total_records(index.entity_count() as u64);
    }

    fn index_into(&self, index: &IndexStore, entity: &Entity) -> MatchResult<usize> {
        let keys = self.keys.keys_for(entity)?;
        let n = index.replace(&entity.id, keys);
        debug!(entity_id = %entity.id, keys = n, "entity indexed");
        Ok(n)
    }

    /// Index (or re-index) one entity. Returns the number of buckets it now
    /// belongs to.
    pub fn index_entity(&self, entity: &Entity) -> MatchResult<usize> {
        let started = Instant::now();
        let _gate = self.gate();
        let index = self.current();
        let result = self.index_into(&index, entity);
        match &result {
            Ok(_) => self.monitor.increment(names::ENTITIES_INDEXED, 1),
            Err(e) => {
                warn!(entity_id = %entity.id, error = %e, "failed to index entity");
                self.monitor.increment(names::INDEX_FAILURES, 1);
            }
        }
        self.sync_total_records(&index);
        self.monitor
            .record_duration(names::OP_INDEX_ENTITY, started.elapsed());
        result
    }

    /// Index many entities; failures are logged and skipped.
    pub fn index_entities<'a>(&self, entities: impl IntoIterator<Item = &'a Entity>) -> BuildReport {
        let started = Instant::now();
        let mut indexed = 0;
        let mut skipped = 0;
        for entity in entities {
            if self.index_entity(entity).is_ok() {
                indexed += 1;
            } else {
                skipped += 1;
            }
        }
        BuildReport {
            indexed,
            skipped,
            duration: started.elapsed(),
        }
    }

    /// Purge `id` from every bucket. Unknown ids are a no-op.
    pub fn remove_entity(&self, id: &EntityId) -> bool {
        let _gate = self.gate();
        let index = self.current();
        let removed = index.remove(id);
        if removed {
            self.monitor.forget_blocking_query(id.as_str());
            debug!(entity_id = %id, "entity removed from index");
        }
        self.sync_total_records(&index);
        removed
    }

    /// Remove then re-index, so fields no longer present are fully un-indexed.
    pub fn update_entity(&self, entity: &Entity) -> MatchResult<usize> {
        {
            let _gate = self.gate();
            self.current().remove(&entity.id);
        }
        self.index_entity(entity)
    }

    /// Candidates for `entity` under `strategy`. Never fails: a query entity
    /// that yields no keys gets an empty set. The entity's own id is excluded.
    pub fn get_candidates(&self, entity: &Entity, strategy: BlockingStrategy) -> CandidateSet {
        let started = Instant::now();
        let mut candidates = match self.keys.query_keys(entity, strategy) {
            Ok(keys) => self.current().lookup(&keys),
            Err(e) => {
                warn!(entity_id = %entity.id, error = %e, "candidate lookup degraded to empty set");
                CandidateSet::new()
            }
        };
        candidates.remove(&entity.id);

        debug!(
            entity_id = %entity.id,
            strategy = %strategy,
            candidates = candidates.len(),
            "candidates generated"
        );
        self.monitor.increment_tagged(
            names::CANDIDATE_QUERIES,
            &[("strategy", &strategy.to_string())],
            1,
        );
        self.monitor
            .record_blocking_query(entity.id.as_str(), candidates.len() as u64);
        self.monitor
            .record_duration(names::OP_GET_CANDIDATES, started.elapsed());
        candidates
    }

    /// Clear and rebuild from every entity in the store.
    pub fn build_indexes(&self) -> MatchResult<BuildReport> {
        let timer = self
            .monitor
            .start_timer(names::OP_BUILD_INDEXES, serde_json::json!({ "mode": "full" }));
        let _gate = self.gate();
        let started = Instant::now();

        let entities = match self.store.find_all() {
            Ok(e) => e,
            Err(e) => {
                self.monitor.end_timer(timer);
                return Err(e.into());
            }
        };

        let fresh = IndexStore::new();
        let (indexed, skipped) = self.fill(&fresh, &entities);
        let report = self.install(fresh, indexed, skipped, started);
        self.monitor.end_timer(timer);

        info!(
            indexed = report.indexed,
            skipped = report.skipped,
            elapsed_ms = report.duration.as_millis() as u64,
            "indexes rebuilt"
        );
        Ok(report)
    }

    /// Same effect as [`Self::build_indexes`], reading the store one page of
    /// `batch_size` at a time. `0` uses the configured batch size.
    pub fn incremental_rebuild(&self, batch_size: usize) -> MatchResult<BuildReport> {
        let batch_size = if batch_size == 0 {
            self.cfg.rebuild_batch_size.max(1)
        } else {
            batch_size
        };
        let timer = self.monitor.start_timer(
            names::OP_BUILD_INDEXES,
            serde_json::json!({ "mode": "incremental", "batch_size": batch_size }),
        );
        let _gate = self.gate();
        let started = Instant::now();

        let fresh = IndexStore::new();
        let mut indexed = 0;
        let mut skipped = 0;
        let mut skip = 0;
        loop {
            let page = match self.store.find_page(skip, batch_size) {
                Ok(p) => p,
                Err(e) => {
                    self.monitor.end_timer(timer);
                    return Err(e.into());
                }
            };
            if page.is_empty() {
                break;
            }
            let (ok, bad) = self.fill(&fresh, &page);
            indexed += ok;
            skipped += bad;
            skip += page.len();
            debug!(processed = skip, "rebuild page indexed");
            if page.len() < batch_size {
                break;
            }
        }

        let report = self.install(fresh, indexed, skipped, started);
        self.monitor.end_timer(timer);
        info!(
            indexed = report.indexed,
            skipped = report.skipped,
            batch_size,
            elapsed_ms = report.duration.as_millis() as u64,
            "indexes rebuilt incrementally"
        );
        Ok(report)
    }

    fn fill(&self, index: &IndexStore, entities: &[Entity]) -> (usize, usize) {
        let mut indexed = 0;
        let mut skipped = 0;
        for entity in entities {
            match self.index_into(index, entity) {
                Ok(_) => indexed += 1,
                Err(e) => {
                    warn!(entity_id = %entity.id, error = %e, "skipping entity during rebuild");
                    skipped += 1;
                }
            }
        }
        (indexed, skipped)
    }

    fn install(&self, fresh: IndexStore, indexed: usize, skipped: usize, started: Instant) -> BuildReport {
        self.sync_total_records(&fresh);
        self.swap(fresh);
        self.monitor.reset_blocking_queries();
        self.monitor.increment(names::ENTITIES_INDEXED, indexed as u64);
        if skipped > 0 {
            self.monitor.increment(names::INDEX_FAILURES, skipped as u64);
        }
        BuildReport {
            indexed,
            skipped,
            duration: started.elapsed(),
        }
    }

    /// Drop empty buckets. Returns how many were removed.
    pub fn optimize_indexes(&self) -> usize {
        let _gate = self.gate();
        let removed = self.current().compact();
        if removed > 0 {
            info!(removed, "empty buckets compacted");
        }
        removed
    }

    #[must_use]
    pub fn stats(&self) -> IndexStats {
        self.current().stats()
    }

    /// Keys `id` is currently indexed under.
    #[must_use]
    pub fn indexed_keys(&self, id: &EntityId) -> BTreeSet<BlockKey> {
        self.current().keys_for(id)
    }

    /// Members of one bucket.
    #[must_use]
    pub fn bucket(&self, key: &BlockKey) -> BTreeSet<EntityId> {
        self.current().bucket(key)
    }

    /// Returns true if any bucket still lists `id`.
    #[must_use]
    pub fn is_referenced(&self, id: &EntityId) -> bool {
        self.current().any_bucket_contains(id)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::blocking::IndexKind;
    use crate::storage::InMemoryEntityStore;

    fn engine_with(entities: Vec<Entity>) -> BlockingEngine {
        let store = Arc::new(InMemoryEntityStore::with_entities(entities));
        BlockingEngine::new(
            store,
            Arc::new(PerformanceMonitor::default()),
            BlockingConfig::default(),
        )
    }

    #[test]
    fn index_and_query_by_strategy() {
        let engine = engine_with(Vec::new());
        let a = Entity::new("A").with_name("John Smith").with_department("CSE");
        let b = Entity::new("B").with_name("Jon Smyth").with_department("ECE");
        let c = Entity::new("C").with_name("Mary Jones").with_department("CSE");
        for e in [&a, &b, &c] {
            engine.index_entity(e).unwrap();
        }

        let phonetic = engine.get_candidates(&a, BlockingStrategy::Phonetic);
        assert!(phonetic.contains(&b.id));
        assert!(!phonetic.contains(&a.id));

        let dept = engine.get_candidates(&a, BlockingStrategy::Department);
        assert_eq!(dept, CandidateSet::from([c.id.clone()]));

        let all = engine.get_candidates(&a, BlockingStrategy::MultiPass);
        assert!(all.contains(&b.id) && all.contains(&c.id));
    }

    #[test]
    fn invalid_entity_fails_without_touching_index() {
        let engine = engine_with(Vec::new());
        let err = engine.index_entity(&Entity::new("").with_name("John")).unwrap_err();
        assert!(err.is_validation());
        assert_eq!(engine.stats().entities, 0);
        assert_eq!(engine.monitor().get_metrics().counter(names::INDEX_FAILURES), 1);
        assert!(engine
            .get_candidates(&Entity::new("").with_name("John"), BlockingStrategy::MultiPass)
            .is_empty());
    }

    #[test]
    fn update_unindexes_dropped_fields() {
        let engine = engine_with(Vec::new());
        let a = Entity::new("A").with_email("jdoe@x.edu").with_department("CSE");
        engine.index_entity(&a).unwrap();

        let a2 = Entity::new("A").with_department("CSE");
        engine.update_entity(&a2).unwrap();
        assert!(engine.bucket(&BlockKey::new(IndexKind::Email, "jdoe")).is_empty());
        assert_eq!(engine.indexed_keys(&a.id).len(), 1);
    }

    #[test]
    fn build_swaps_in_store_contents() {
        let engine = engine_with(vec![
            Entity::new("A").with_email("a@x.edu"),
            Entity::new("B").with_email("b@x.edu"),
            Entity::new(" ").with_email("c@x.edu"),
        ]);
        engine.index_entity(&Entity::new("stale").with_email("s@x.edu")).unwrap();

        let report = engine.build_indexes().unwrap();
        assert_eq!(report.indexed, 2);
        assert_eq!(report.skipped, 1);
        assert!(!engine.is_referenced(&EntityId::from("stale")));
        assert_eq!(engine.monitor().get_metrics().blocking.total_records, 2);
        assert_eq!(engine.monitor().get_metrics().operations[names::OP_BUILD_INDEXES].count, 1);
    }

    #[test]
    fn incremental_rebuild_matches_full_build() {
        let entities: Vec<Entity> = (0..23)
            .map(|i| {
                Entity::new(format!("E{i:02}"))
                    .with_name(format!("Person{i}"))
                    .with_department(if i % 2 == 0 { "CSE" } else { "ECE" })
            })
            .collect();
        let engine = engine_with(entities);

        let full = engine.build_indexes().unwrap();
        let full_stats = engine.stats();
        let inc = engine.incremental_rebuild(5).unwrap();
        assert_eq!(full.indexed, inc.indexed);
        assert_eq!(engine.stats(), full_stats);

        let inc = engine.incremental_rebuild(0).unwrap();
        assert_eq!(inc.indexed, 23);
    }

    #[test]
    fn optimize_on_clean_index_removes_nothing() {
        let engine = engine_with(Vec::new());
        engine.index_entity(&Entity::new("A").with_phone("555-1234")).unwrap();
        engine.remove_entity(&EntityId::from("A"));
        assert!(!engine.remove_entity(&EntityId::from("A")));
        assert_eq!(engine.optimize_indexes(), 0);
        assert_eq!(engine.stats().total_buckets(), 0);
    }
}
