//! Environment-style configuration.
//!
//! Every knob has a default; `EngineConfig::from_env` overlays values from
//! `IDENTILINK_*` variables (a `.env` file is honored if present).

use std::str::FromStr;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::error::ValidationError;
use crate::monitor::ThresholdConfig;

/// Remote scorer and prediction cache settings.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ScorerConfig {
    /// Base URL of the scoring service, without trailing slash.
    pub base_url: String,
    /// Sent as `X-API-Key` on every call except health checks.
    pub api_key: Option<String>,
    /// Minimum probability required to declare a match.
    pub confidence_threshold: f64,
    /// Maximum cached decisions before FIFO eviction.
    pub cache_capacity: usize,
    pub predict_timeout_ms: u64,
    pub batch_timeout_ms: u64,
    pub health_timeout_ms: u64,
    /// Model version sent with every prediction request.
    pub model_version: String,
    /// In-flight fallback predictions when a batch call fails. 1 keeps the
    /// decomposition strictly sequential.
    pub fallback_concurrency: usize,
}

impl Default for ScorerConfig {
    fn default() -> Self {
        Self {
            base_url: "http://localhost:8001".to_string(),
            api_key: None,
            confidence_threshold: 0.7,
            cache_capacity: 1000,
            predict_timeout_ms: 5_000,
            batch_timeout_ms: 30_000,
            health_timeout_ms: 3_000,
            model_version: "1.0.0".to_string(),
            fallback_concurrency: 1,
        }
    }
}

impl ScorerConfig {
    #[must_use]
    pub const fn predict_timeout(&self) -> Duration {
        Duration::from_millis(self.predict_timeout_ms)
    }

    #[must_use]
    pub const fn batch_timeout(&self) -> Duration {
        Duration::from_millis(self.batch_timeout_ms)
    }

    #[must_use]
    pub const fn health_timeout(&self) -> Duration {
        Duration::from_millis(self.health_timeout_ms)
    }

    /// Check value ranges.
    pub fn validate(&self) -> Result<(), ValidationError> {
        if !(0.0..=1.0).contains(&self.confidence_threshold) {
            return Err(ValidationError::ThresholdOutOfRange {
                value: self.confidence_threshold,
            });
        }
        if self.cache_capacity == 0 {
            return Err(invalid("cache_capacity", "must be at least 1"));
        }
        if self.fallback_concurrency == 0 {
            return Err(invalid("fallback_concurrency", "must be at least 1"));
        }
        if self.base_url.trim().is_empty() {
            return Err(invalid("base_url", "must not be empty"));
        }
        Ok(())
    }
}

/// Locality-sensitive hashing for face embeddings.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct FaceLshConfig {
    pub enabled: bool,
    /// Number of independent bands; a pair collides if any band matches.
    pub bands: usize,
    /// Hyperplanes per band (at most 64).
    pub bits_per_band: usize,
}

impl Default for FaceLshConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            bands: 4,
            bits_per_band: 8,
        }
    }
}

/// Blocking engine settings.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct BlockingConfig {
    pub rebuild_batch_size: usize,
    pub face_lsh: FaceLshConfig,
}

impl Default for BlockingConfig {
    fn default() -> Self {
        Self {
            rebuild_batch_size: 1000,
            face_lsh: FaceLshConfig::default(),
        }
    }
}

/// Performance monitor settings.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct MonitorConfig {
    /// Samples retained per histogram.
    pub histogram_capacity: usize,
    /// Per-subscriber event buffer.
    pub event_capacity: usize,
    /// Interval of the background threshold checker.
    pub check_interval_ms: u64,
    pub thresholds: ThresholdConfig,
}

impl Default for MonitorConfig {
    fn default() -> Self {
        Self {
            histogram_capacity: 1000,
            event_capacity: 1024,
            check_interval_ms: 60_000,
            thresholds: ThresholdConfig::default(),
        }
    }
}

impl MonitorConfig {
    #[must_use]
    pub const fn check_interval(&self) -> Duration {
        Duration::from_millis(self.check_interval_ms)
    }
}

/// Complete engine configuration.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct EngineConfig {
    pub scorer: ScorerConfig,
    pub blocking: BlockingConfig,
    pub monitor: MonitorConfig,
}

fn invalid(key: &str, reason: impl Into<String>) -> ValidationError {
    ValidationError::InvalidConfig {
        key: key.to_string(),
        reason: reason.into(),
    }
}

fn parse<T: FromStr>(key: &str, raw: &str) -> Result<T, ValidationError>
where
    T::Err: std::fmt::Display,
{
    raw.trim()
        .parse::<T>()
        .map_err(|e| invalid(key, format!("cannot parse {raw:?}: {e}")))
}

impl EngineConfig {
    /// Load configuration from the process environment.
    pub fn from_env() -> Result<Self, ValidationError> {
        dotenvy::dotenv().ok();
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Load configuration from an arbitrary key lookup.
    pub fn from_lookup<F>(lookup: F) -> Result<Self, ValidationError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let mut cfg = Self::default();
        let get = |key: &str| lookup(key).filter(|v| !v.trim().is_empty());

        if let Some(v) = get("IDENTILINK_SCORER_URL") {
            cfg.scorer.base_url = v.trim().trim_end_matches('/').to_string();
        }
        if let Some(v) = get("IDENTILINK_SCORER_API_KEY") {
            cfg.scorer.api_key = Some(v);
        }
        if let Some(v) = get("IDENTILINK_CONFIDENCE_THRESHOLD") {
            cfg.scorer.confidence_threshold = parse("IDENTILINK_CONFIDENCE_THRESHOLD", &v)?;
        }
        if let Some(v) = get("IDENTILINK_CACHE_CAPACITY") {
            cfg.scorer.cache_capacity = parse("IDENTILINK_CACHE_CAPACITY", &v)?;
        }
        if let Some(v) = get("IDENTILINK_PREDICT_TIMEOUT_MS") {
            cfg.scorer.predict_timeout_ms = parse("IDENTILINK_PREDICT_TIMEOUT_MS", &v)?;
        }
        if let Some(v) = get("IDENTILINK_BATCH_TIMEOUT_MS") {
            cfg.scorer.batch_timeout_ms = parse("IDENTILINK_BATCH_TIMEOUT_MS", &v)?;
        }
        if let Some(v) = get("IDENTILINK_HEALTH_TIMEOUT_MS") {
            cfg.scorer.health_timeout_ms = parse("IDENTILINK_HEALTH_TIMEOUT_MS", &v)?;
        }
        if let Some(v) = get("IDENTILINK_MODEL_VERSION") {
            cfg.scorer.model_version = v.trim().to_string();
        }
        if let Some(v) = get("IDENTILINK_FALLBACK_CONCURRENCY") {
            cfg.scorer.fallback_concurrency = parse("IDENTILINK_FALLBACK_CONCURRENCY", &v)?;
        }
        if let Some(v) = get("IDENTILINK_REBUILD_BATCH_SIZE") {
            cfg.blocking.rebuild_batch_size = parse("IDENTILINK_REBUILD_BATCH_SIZE", &v)?;
        }
        if let Some(v) = get("IDENTILINK_FACE_LSH") {
            cfg.blocking.face_lsh.enabled = parse("IDENTILINK_FACE_LSH", &v)?;
        }

        cfg.validate()?;
        Ok(cfg)
    }

    /// Check value ranges across all sections.
    pub fn validate(&self) -> Result<(), ValidationError> {
        self.scorer.validate()?;
        if self.blocking.rebuild_batch_size == 0 {
            return Err(invalid("rebuild_batch_size", "must be at least 1"));
        }
        let lsh = &self.blocking.face_lsh;
        if lsh.enabled && (lsh.bands == 0 || lsh.bits_per_band == 0 || lsh.bits_per_band > 64) {
            return Err(invalid("face_lsh", "bands must be >= 1 and bits_per_band in 1..=64"));
        }
        if self.monitor.histogram_capacity == 0 {
            return Err(invalid("histogram_capacity", "must be at least 1"));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use std::collections::HashMap;

    use super::*;

    fn lookup(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| ((*k).to_string(), (*v).to_string()))
            .collect();
        move |key| map.get(key).cloned()
    }

    #[test]
    fn defaults_match_documented_values() {
        let cfg = EngineConfig::from_lookup(lookup(&[])).unwrap();
        assert_eq!(cfg, EngineConfig::default());
        assert_eq!(cfg.scorer.confidence_threshold, 0.7);
        assert_eq!(cfg.scorer.cache_capacity, 1000);
        assert_eq!(cfg.scorer.predict_timeout(), Duration::from_secs(5));
        assert_eq!(cfg.scorer.health_timeout(), Duration::from_secs(3));
        assert_eq!(cfg.blocking.rebuild_batch_size, 1000);
        assert!(cfg.blocking.face_lsh.enabled);
        assert_eq!(cfg.monitor.histogram_capacity, 1000);
    }

    #[test]
    fn env_values_override_defaults() {
        let cfg = EngineConfig::from_lookup(lookup(&[
            ("IDENTILINK_SCORER_URL", "http://scorer:9000/"),
            ("IDENTILINK_SCORER_API_KEY", "secret"),
            ("IDENTILINK_CONFIDENCE_THRESHOLD", "0.85"),
            ("IDENTILINK_CACHE_CAPACITY", "16"),
            ("IDENTILINK_FACE_LSH", "false"),
        ]))
        .unwrap();
        assert_eq!(cfg.scorer.base_url, "http://scorer:9000");
        assert_eq!(cfg.scorer.api_key.as_deref(), Some("secret"));
        assert_eq!(cfg.scorer.confidence_threshold, 0.85);
        assert_eq!(cfg.scorer.cache_capacity, 16);
        assert!(!cfg.blocking.face_lsh.enabled);
    }

    #[test]
    fn invalid_values_are_rejected() {
        let err = EngineConfig::from_lookup(lookup(&[("IDENTILINK_CONFIDENCE_THRESHOLD", "1.5")]))
            .unwrap_err();
        assert!(matches!(err, ValidationError::ThresholdOutOfRange { .. }));

        let err = EngineConfig::from_lookup(lookup(&[("IDENTILINK_CACHE_CAPACITY", "lots")]))
            .unwrap_err();
        assert!(matches!(err, ValidationError::InvalidConfig { .. }));

        let err = EngineConfig::from_lookup(lookup(&[("IDENTILINK_CACHE_CAPACITY", "0")]))
            .unwrap_err();
        assert!(matches!(err, ValidationError::InvalidConfig { .. }));
    }

    #[test]
    fn config_deserializes_partial_json() {
        let cfg: EngineConfig =
            serde_json::from_str(r#"{"scorer":{"confidence_threshold":0.9}}"#).unwrap();
        assert_eq!(cfg.scorer.confidence_threshold, 0.9);
        assert_eq!(cfg.scorer.cache_capacity, 1000);
        assert_eq!(cfg.blocking.rebuild_batch_size, 1000);
    }
}
