//! # identilink - Entity-resolution matching engine
//!
//! identilink decides whether two identity records captured by different
//! campus sensors (badge swipes, camera frames, network associations) describe
//! the same person, without comparing every record against every other one.
//!
//! ## Core Concepts
//!
//! - **Blocking**: each entity is indexed under many overlapping keys
//!   (phonetic name codes, identifier values and prefixes, department, face
//!   buckets) so a query only meets a small candidate set
//! - **Match scoring**: a candidate pair becomes a feature vector, scored by a
//!   remote model, with a deterministic fallback rule and a pair cache
//! - **Monitoring**: timings, counters, histograms, blocking efficiency and
//!   threshold warnings, observed from both stages
//!
//! ## Usage
//!
//! ```rust,ignore
//! use std::sync::Arc;
//! use identilink::{
//!     BlockingEngine, BlockingStrategy, EngineConfig, Entity, InMemoryEntityStore,
//!     MatchScorer, PerformanceMonitor, SimilarityScores,
//! };
//!
//! let cfg = EngineConfig::from_env()?;
//! let monitor = Arc::new(PerformanceMonitor::new(cfg.monitor.clone()));
//! let store = Arc::new(InMemoryEntityStore::with_entities(load_entities()));
//!
//! let blocking = BlockingEngine::new(store, Arc::clone(&monitor), cfg.blocking.clone());
//! blocking.build_indexes()?;
//!
//! let scorer = MatchScorer::with_http(cfg.scorer.clone(), Arc::clone(&monitor))?;
//! for id in blocking.get_candidates(&query, BlockingStrategy::MultiPass) {
//!     let candidate = lookup(&id);
//!     let decision = scorer
//!         .predict_match(&query, &candidate, &SimilarityScores::new().with_name(0.93))
//!         .await;
//! }
//!
//! let report = monitor.shutdown();
//! ```

#![warn(clippy::all)]
#![warn(clippy::pedantic)]
#![allow(clippy::module_name_repetitions)]

// Core records and the store contract
pub mod config;
pub mod entity;
pub mod error;
pub mod storage;

// Matching pipeline
pub mod blocking;
pub mod monitor;
pub mod scoring;

// Re-export primary types at crate root for convenience
pub use blocking::{
    BlockKey, BlockingEngine, BlockingStrategy, BuildReport, CandidateSet, IndexKind, IndexStats,
};
pub use config::{BlockingConfig, EngineConfig, FaceLshConfig, MonitorConfig, ScorerConfig};
pub use entity::{Entity, EntityId, EntityMetadata, EntityStatus, EntityType, Identifiers, Profile};
pub use error::{MatchError, MatchResult, ScoringError, ValidationError};
pub use monitor::{
    MetricsSnapshot, MonitorEvent, PerformanceMonitor, PerformanceReport, ResolutionOutcome,
    ThresholdConfig, ThresholdWarning,
};
pub use scoring::{
    CandidatePair, DecisionSource, Feature, FeatureVector, HttpScoringBackend, MatchDecision,
    MatchScorer, ModelInfo, PairKey, ScorerHealth, ScoringBackend, SimilarityScores,
};
pub use storage::{EntityStore, InMemoryEntityStore, StorageError};
