//! Roll-up report for external consumers.

use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::metrics::{MetricsSnapshot, OperationMetrics};
use super::names;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ReportSummary {
    pub total_resolutions: u64,
    pub match_rate: Option<f64>,
    pub average_confidence: Option<f64>,
    pub average_processing_ms: Option<f64>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ReportPerformance {
    pub uptime_secs: f64,
    pub resolutions_per_sec: Option<f64>,
    pub predictions_per_sec: Option<f64>,
    pub memory_bytes: Option<u64>,
    pub blocking_efficiency: Option<f64>,
    pub operations: BTreeMap<String, OperationMetrics>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ReportQuality {
    pub manual_review_rate: Option<f64>,
    pub cache_hit_rate: Option<f64>,
    pub fallback_rate: Option<f64>,
}

/// Summary, performance and quality sections in one snapshot.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PerformanceReport {
    pub generated_at: DateTime<Utc>,
    pub summary: ReportSummary,
    pub performance: ReportPerformance,
    pub quality: ReportQuality,
}

#[allow(clippy::cast_precision_loss)]
fn per_sec(count: u64, uptime_secs: f64) -> Option<f64> {
    if count == 0 || uptime_secs <= 0.0 {
        None
    } else {
        Some(count as f64 / uptime_secs)
    }
}

#[allow(clippy::cast_precision_loss)]
fn share(part: u64, whole: u64) -> Option<f64> {
    if whole == 0 {
        None
    } else {
        Some(part as f64 / whole as f64)
    }
}

impl PerformanceReport {
    /// Build the report from a metrics snapshot.
    #[must_use]
    pub fn from_snapshot(snapshot: &MetricsSnapshot) -> Self {
        let res = &snapshot.resolutions;
        let has_resolutions = res.total > 0;

        let hits = snapshot.counter(names::CACHE_HIT);
        let misses = snapshot.counter(names::CACHE_MISS);
        let fallbacks = snapshot.counter(names::FALLBACK_PREDICTIONS);
        let model = snapshot.counter(names::MODEL_PREDICTIONS);
        let predictions = hits + fallbacks + model;

        Self {
            generated_at: snapshot.generated_at,
            summary: ReportSummary {
                total_resolutions: res.total,
                match_rate: res.match_rate(),
                average_confidence: has_resolutions.then_some(res.average_confidence),
                average_processing_ms: has_resolutions.then_some(res.average_processing_ms),
            },
            performance: ReportPerformance {
                uptime_secs: snapshot.uptime_secs,
                resolutions_per_sec: per_sec(res.total, snapshot.uptime_secs),
                predictions_per_sec: per_sec(predictions, snapshot.uptime_secs),
                memory_bytes: snapshot.memory_bytes,
                blocking_efficiency: snapshot.blocking.efficiency,
                operations: snapshot.operations.clone(),
            },
            quality: ReportQuality {
                manual_review_rate: res.manual_review_rate(),
                cache_hit_rate: share(hits, hits + misses),
                fallback_rate: share(fallbacks, fallbacks + model),
            },
        }
    }
}
