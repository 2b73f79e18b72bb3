//! Match scoring: turn a candidate pair into a match decision.
//!
//! Decisions come from a remote probabilistic model when it is reachable and
//! from a deterministic rule otherwise. Model decisions are cached per
//! unordered pair.

pub mod backend;
pub mod cache;
pub mod features;
pub mod scorer;

pub use backend::{
    BatchPair, EvaluationOutcome, EvaluationRequest, HttpScoringBackend, ScoringBackend,
    TrainingOutcome, TrainingRequest,
};
pub use cache::{CacheStats, PairKey, PredictionCache};
pub use features::{
    common_identifiers, extract_features, ExtractedFeatures, Feature, FeatureVector,
    SimilarityScores,
};
pub use scorer::{
    fallback_rule, CandidatePair, DecisionSource, MatchDecision, MatchScorer, ModelInfo,
    ScorerHealth,
};
