//! Match scorer: features → remote model (or fallback rule) → cached decision.

use std::sync::{Arc, Mutex, MutexGuard, PoisonError, RwLock};
use std::time::{Duration, Instant};

use chrono::{DateTime, Utc};
use futures::stream::{self, StreamExt};
use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

use crate::config::ScorerConfig;
use crate::entity::Entity;
use crate::error::{MatchResult, ScoringError};
use crate::monitor::{names, PerformanceMonitor};

use super::backend::{
    checked_probability, BatchPair, EvaluationOutcome, EvaluationRequest, HttpScoringBackend, ScoringBackend,
    TrainingOutcome, TrainingRequest,
};
use super::cache::{CacheStats, PairKey, PredictionCache};
use super::features::{extract_features, ExtractedFeatures, FeatureVector, SimilarityScores};

/// Average similarity above which the fallback declares a match.
pub const FALLBACK_SIMILARITY_THRESHOLD: f64 = 0.8;
/// Fallback confidence when the pair shares at least one identifier.
pub const FALLBACK_SHARED_ID_CONFIDENCE: f64 = 0.9;

/// Where a decision came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DecisionSource {
    Model,
    Fallback,
    Cache,
}

/// Match/no-match verdict for one pair.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MatchDecision {
    pub is_match: bool,
    /// In [0, 1].
    pub confidence: f64,
    pub features: FeatureVector,
    pub model_version: String,
    pub processing_time: Duration,
    pub source: DecisionSource,
}

/// Locally tracked model metadata.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ModelInfo {
    pub version: String,
    pub last_trained: Option<DateTime<Utc>>,
    pub accuracy: Option<f64>,
    pub last_evaluation: Option<serde_json::Value>,
}

/// Result of a scorer health probe.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ScorerHealth {
    pub healthy: bool,
    pub status: String,
    pub latency: Duration,
}

/// One pair submitted to [`MatchScorer::batch_predict`].
#[derive(Debug, Clone, Copy)]
pub struct CandidatePair<'a> {
    pub left: &'a Entity,
    pub right: &'a Entity,
    pub scores: SimilarityScores,
}

impl<'a> CandidatePair<'a> {
    #[must_use]
    pub const fn new(left: &'a Entity, right: &'a Entity, scores: SimilarityScores) -> Self {
        Self {
            left,
            right,
            scores,
        }
    }
}

/// The deterministic fallback rule: `(is_match, confidence)`.
///
/// A shared identifier or an average similarity above 0.8 is a match;
/// confidence is the larger of the average and 0.9 when an identifier is
/// shared.
#[must_use]
pub fn fallback_rule(common_identifiers: usize, average_similarity: f64) -> (bool, f64) {
    let avg = if average_similarity.is_finite() {
        average_similarity.clamp(0.0, 1.0)
    } else {
        0.0
    };
    let shared = common_identifiers > 0;
    let is_match = shared || avg > FALLBACK_SIMILARITY_THRESHOLD;
    let floor = if shared {
        FALLBACK_SHARED_ID_CONFIDENCE
    } else {
        0.0
    };
    (is_match, avg.max(floor))
}

/// Pairwise match scorer.
pub struct MatchScorer {
    backend: Arc<dyn ScoringBackend>,
    cfg: ScorerConfig,
    cache: Mutex<PredictionCache<MatchDecision>>,
    model: RwLock<ModelInfo>,
    monitor: Arc<PerformanceMonitor>,
}

impl std::fmt::Debug for MatchScorer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MatchScorer")
            .field("cfg", &self.cfg)
            .field("cache", &self.cache_stats())
            .finish_non_exhaustive()
    }
}

impl MatchScorer {
    #[must_use]
    pub fn new(
        backend: Arc<dyn ScoringBackend>,
        monitor: Arc<PerformanceMonitor>,
        cfg: ScorerConfig,
    ) -> Self {
        let model = ModelInfo {
            version: cfg.model_version.clone(),
            last_trained: None,
            accuracy: None,
            last_evaluation: None,
        };
        Self {
            backend,
            cache: Mutex::new(PredictionCache::new(cfg.cache_capacity)),
            model: RwLock::new(model),
            monitor,
            cfg,
        }
    }

    /// Scorer backed by the HTTP scoring service at `cfg.base_url`.
    pub fn with_http(cfg: ScorerConfig, monitor: Arc<PerformanceMonitor>) -> MatchResult<Self> {
        cfg.validate()?;
        let backend = HttpScoringBackend::new(cfg.clone())?;
        Ok(Self::new(Arc::new(backend), monitor, cfg))
    }

    #[must_use]
    pub const fn config(&self) -> &ScorerConfig {
        &self.cfg
    }

    fn cache(&self) -> MutexGuard<'_, PredictionCache<MatchDecision>> {
        self.cache.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn model_version(&self) -> String {
        self.model
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .version
            .clone()
    }

    fn observe(&self, decision: &MatchDecision) {
        self.monitor
            .record_histogram(names::MATCH_PROBABILITY, decision.confidence);
        let counter = match decision.source {
            DecisionSource::Model => names::MODEL_PREDICTIONS,
            DecisionSource::Fallback => names::FALLBACK_PREDICTIONS,
            DecisionSource::Cache => return,
        };
        self.monitor.increment(counter, 1);
    }

    fn remote_failed(&self, e: &ScoringError, op: &str) {
        warn!(op, error = %e, "remote scorer failed; using fallback rule");
        self.monitor
            .increment_tagged(names::REMOTE_FAILURES, &[("kind", e.kind())], 1);
    }

    fn model_decision(
        &self,
        probability: f64,
        features: FeatureVector,
        version: String,
        started: Instant,
    ) -> MatchDecision {
        MatchDecision {
            is_match: probability >= self.cfg.confidence_threshold,
            confidence: probability,
            features,
            model_version: version,
            processing_time: started.elapsed(),
            source: DecisionSource::Model,
        }
    }

    fn fallback_from(
        &self,
        extracted: ExtractedFeatures,
        scores: &SimilarityScores,
        started: Instant,
    ) -> MatchDecision {
        let (is_match, confidence) = fallback_rule(extracted.common_identifiers, scores.average());
        MatchDecision {
            is_match,
            confidence,
            features: extracted.vector,
            model_version: self.model_version(),
            processing_time: started.elapsed(),
            source: DecisionSource::Fallback,
        }
    }

    /// Decide whether `e1` and `e2` are the same person.
    ///
    /// Never fails: remote errors degrade to [`Self::fallback_prediction`].
    /// Model decisions are cached under the unordered pair key; fallback
    /// decisions are not, so the model is consulted again once it recovers.
    pub async fn predict_match(
        &self,
        e1: &Entity,
        e2: &Entity,
        scores: &SimilarityScores,
    ) -> MatchDecision {
        let started = Instant::now();
        let key = PairKey::new(&e1.id, &e2.id);

        let cached = self.cache().get(&key);
        if let Some(mut hit) = cached {
            self.monitor.increment(names::CACHE_HIT, 1);
            hit.source = DecisionSource::Cache;
            hit.processing_time = started.elapsed();
            debug!(pair = %key, "prediction cache hit");
            return hit;
        }
        self.monitor.increment(names::CACHE_MISS, 1);

        let extracted = extract_features(e1, e2, scores);
        let version = self.model_version();
        let predicted = self
            .backend
            .predict(&extracted.vector, &version)
            .await
            .and_then(checked_probability);
        let decision = match predicted {
            Ok(p) => {
                let decision = self.model_decision(p, extracted.vector, version, started);
                self.cache().insert(key.clone(), decision.clone());
                decision
            }
            Err(e) => {
                self.remote_failed(&e, names::OP_PREDICT);
                self.fallback_from(extracted, scores, started)
            }
        };

        debug!(
            pair = %key,
            is_match = decision.is_match,
            confidence = decision.confidence,
            source = ?decision.source,
            "pair scored"
        );
        self.observe(&decision);
        self.monitor
            .record_duration(names::OP_PREDICT, decision.processing_time);
        decision
    }

    /// Rule-based decision that never touches the network.
    #[must_use]
    pub fn fallback_prediction(
        &self,
        e1: &Entity,
        e2: &Entity,
        scores: &SimilarityScores,
    ) -> MatchDecision {
        let started = Instant::now();
        let extracted = extract_features(e1, e2, scores);
        self.fallback_from(extracted, scores, started)
    }

    /// Score many pairs with one remote call.
    ///
    /// If the batch call fails the pairs are scored one by one through
    /// [`Self::predict_match`], at most `fallback_concurrency` at a time, so a
    /// single bad pair cannot fail the batch. Output is index-aligned with
    /// `pairs`.
    pub async fn batch_predict(&self, pairs: &[CandidatePair<'_>]) -> Vec<MatchDecision> {
        if pairs.is_empty() {
            return Vec::new();
        }
        let started = Instant::now();
        let version = self.model_version();

        let extracted: Vec<ExtractedFeatures> = pairs
            .iter()
            .map(|p| extract_features(p.left, p.right, &p.scores))
            .collect();
        let request: Vec<BatchPair> = pairs
            .iter()
            .zip(&extracted)
            .map(|(p, f)| BatchPair {
                entity1_id: p.left.id.clone(),
                entity2_id: p.right.id.clone(),
                features: f.vector.clone(),
            })
            .collect();

        let outcome: Result<Vec<f64>, ScoringError> = match self.backend.predict_batch(&request, &version).await {
            Ok(probs) if probs.len() != pairs.len() => Err(ScoringError::Misaligned {
                expected: pairs.len(),
                actual: probs.len(),
            }),
            Ok(probs) => probs.into_iter().map(checked_probability).collect(),
            Err(e) => Err(e),
        };

        let decisions = match outcome {
            Ok(probs) => {
                let decisions: Vec<MatchDecision> = probs
                    .into_iter()
                    .zip(extracted)
                    .map(|(p, f)| self.model_decision(p, f.vector, version.clone(), started))
                    .collect();
                let mut cache = self.cache();
                for (pair, decision) in pairs.iter().zip(&decisions) {
                    cache.insert(PairKey::new(&pair.left.id, &pair.right.id), decision.clone());
                }
                drop(cache);
                for decision in &decisions {
                    self.observe(decision);
                }
                decisions
            }
            Err(e) => {
                self.remote_failed(&e, names::OP_BATCH_PREDICT);
                stream::iter(pairs)
                    .map(|p| self.predict_match(p.left, p.right, &p.scores))
                    .buffered(self.cfg.fallback_concurrency.max(1))
                    .collect::<Vec<_>>()
                    .await
            }
        };

        info!(
            pairs = pairs.len(),
            elapsed_ms = started.elapsed().as_millis() as u64,
            "batch scored"
        );
        self.monitor
            .record_duration(names::OP_BATCH_PREDICT, started.elapsed());
        decisions
    }

    /// Ask the service to train a model. Failures are returned, not retried.
    ///
    /// On success the tracked metadata is updated and cached decisions from
    /// the previous model are dropped.
    pub async fn train_model(
        &self,
        training_data: serde_json::Value,
        model_config: serde_json::Value,
    ) -> MatchResult<TrainingOutcome> {
        let request = TrainingRequest {
            training_data,
            model_config,
            model_version: self.model_version(),
        };
        let outcome = self.backend.train(&request).await.map_err(|e| {
            warn!(error = %e, "model training failed");
            e
        })?;

        {
            let mut model = self.model.write().unwrap_or_else(PoisonError::into_inner);
            model.last_trained = Some(Utc::now());
            if outcome.accuracy.is_some() {
                model.accuracy = outcome.accuracy;
            }
            if let Some(v) = outcome.details.get("model_version").and_then(|v| v.as_str()) {
                model.version = v.to_string();
            }
            info!(version = %model.version, accuracy = ?model.accuracy, "model trained");
        }
        self.cache().clear();
        Ok(outcome)
    }

    /// Ask the service to evaluate the current model on `test_data`.
    pub async fn evaluate_model(&self, test_data: serde_json::Value) -> MatchResult<EvaluationOutcome> {
        let request = EvaluationRequest {
            test_data,
            model_version: self.model_version(),
        };
        let outcome = self.backend.evaluate(&request).await.map_err(|e| {
            warn!(error = %e, "model evaluation failed");
            e
        })?;

        let mut model = self.model.write().unwrap_or_else(PoisonError::into_inner);
        if let Some(acc) = outcome.metrics.get("accuracy").and_then(serde_json::Value::as_f64) {
            model.accuracy = Some(acc);
        }
        model.last_evaluation = Some(outcome.metrics.clone());
        info!(version = %model.version, "model evaluated");
        Ok(outcome)
    }

    /// Probe the scoring service.
    pub async fn health_check(&self) -> MatchResult<ScorerHealth> {
        let started = Instant::now();
        let status = self.backend.health().await?;
        let healthy = matches!(status.to_ascii_lowercase().as_str(), "healthy" | "ok");
        Ok(ScorerHealth {
            healthy,
            status,
            latency: started.elapsed(),
        })
    }

    #[must_use]
    pub fn cache_stats(&self) -> CacheStats {
        self.cache().stats()
    }

    pub fn clear_cache(&self) {
        self.cache().clear();
    }

    #[must_use]
    pub fn model_info(&self) -> ModelInfo {
        self.model
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn fallback_rule_cases() {
        assert_eq!(fallback_rule(0, 0.9), (true, 0.9));
        assert_eq!(fallback_rule(2, 0.1), (true, 0.9));
        assert_eq!(fallback_rule(0, 0.0), (false, 0.0));
        // Strictly above 0.8.
        assert_eq!(fallback_rule(0, 0.8), (false, 0.8));
        assert_eq!(fallback_rule(1, 0.95), (true, 0.95));
        assert_eq!(fallback_rule(0, f64::NAN), (false, 0.0));
    }
}
