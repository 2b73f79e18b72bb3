//! Metric value types and derived metrics.

use std::collections::BTreeMap;
use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::histogram::HistogramSummary;

/// Running timing statistics for one operation name.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct OperationMetrics {
    pub count: u64,
    pub total_ms: f64,
    pub min_ms: f64,
    pub max_ms: f64,
    pub avg_ms: f64,
    pub last_ms: f64,
}

impl OperationMetrics {
    /// Fold one observation into the running values.
    pub fn observe(&mut self, elapsed_ms: f64) {
        if self.count == 0 {
            self.min_ms = elapsed_ms;
            self.max_ms = elapsed_ms;
        } else {
            self.min_ms = self.min_ms.min(elapsed_ms);
            self.max_ms = self.max_ms.max(elapsed_ms);
        }
        self.count += 1;
        self.total_ms += elapsed_ms;
        #[allow(clippy::cast_precision_loss)]
        {
            self.avg_ms = self.total_ms / self.count as f64;
        }
        self.last_ms = elapsed_ms;
    }
}

/// Final outcome of resolving one observation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ResolutionOutcome {
    /// Linked to an existing entity.
    Match,
    /// Created a new canonical entity.
    NewEntity,
    /// Queued for a human decision.
    ManualReview,
}

impl fmt::Display for ResolutionOutcome {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Match => write!(f, "match"),
            Self::NewEntity => write!(f, "new_entity"),
            Self::ManualReview => write!(f, "manual_review"),
        }
    }
}

/// Resolution outcome counters with running averages.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct ResolutionStats {
    pub total: u64,
    pub matches: u64,
    pub new_entities: u64,
    pub manual_reviews: u64,
    pub average_confidence: f64,
    pub average_processing_ms: f64,
}

impl ResolutionStats {
    pub(crate) fn observe(&mut self, outcome: ResolutionOutcome, confidence: f64, elapsed_ms: f64) {
        match outcome {
            ResolutionOutcome::Match => self.matches += 1,
            ResolutionOutcome::NewEntity => self.new_entities += 1,
            ResolutionOutcome::ManualReview => self.manual_reviews += 1,
        }
        self.total += 1;
        #[allow(clippy::cast_precision_loss)]
        let n = self.total as f64;
        self.average_confidence += (confidence - self.average_confidence) / n;
        self.average_processing_ms += (elapsed_ms - self.average_processing_ms) / n;
    }

    fn ratio(part: u64, total: u64) -> Option<f64> {
        if total == 0 {
            None
        } else {
            #[allow(clippy::cast_precision_loss)]
            Some(part as f64 / total as f64)
        }
    }

    #[must_use]
    pub fn match_rate(&self) -> Option<f64> {
        Self::ratio(self.matches, self.total)
    }

    #[must_use]
    pub fn manual_review_rate(&self) -> Option<f64> {
        Self::ratio(self.manual_reviews, self.total)
    }
}

/// Blocking totals and the derived efficiency.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct BlockingMetrics {
    /// Records known to the index (n).
    pub total_records: u64,
    /// Candidate comparisons proposed for the current index generation, one
    /// latest count per query entity.
    pub blocked_comparisons: u64,
    /// n·(n−1)/2.
    pub possible_comparisons: u64,
    pub efficiency: Option<f64>,
}

/// Fraction of all-pairs comparisons avoided by blocking.
///
/// `None` while no comparisons have been recorded or fewer than two records
/// exist.
///
/// # Examples
///
/// ```
/// use identilink::monitor::blocking_efficiency;
///
/// let e = blocking_efficiency(100, 500).unwrap();
/// assert!((e - (1.0 - 500.0 / 4950.0)).abs() < 1e-12);
/// ```
#[must_use]
pub fn blocking_efficiency(total_records: u64, blocked_comparisons: u64) -> Option<f64> {
    let possible = possible_comparisons(total_records);
    if blocked_comparisons == 0 || possible == 0 {
        return None;
    }
    #[allow(clippy::cast_precision_loss)]
    let ratio = blocked_comparisons as f64 / possible as f64;
    Some((1.0 - ratio).clamp(0.0, 1.0))
}

/// n·(n−1)/2, saturating.
#[must_use]
pub fn possible_comparisons(total_records: u64) -> u64 {
    total_records.saturating_mul(total_records.saturating_sub(1)) / 2
}

/// Read-only view of everything the monitor has recorded.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MetricsSnapshot {
    pub generated_at: DateTime<Utc>,
    pub uptime_secs: f64,
    pub counters: BTreeMap<String, u64>,
    pub operations: BTreeMap<String, OperationMetrics>,
    pub histograms: BTreeMap<String, HistogramSummary>,
    pub blocking: BlockingMetrics,
    pub resolutions: ResolutionStats,
    pub memory_bytes: Option<u64>,
    pub pending_timers: usize,
    pub dropped_events: u64,
}

impl MetricsSnapshot {
    /// Counter value, 0 when never incremented.
    #[must_use]
    pub fn counter(&self, name: &str) -> u64 {
        self.counters.get(name).copied().unwrap_or(0)
    }
}
