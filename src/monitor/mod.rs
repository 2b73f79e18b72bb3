//! Performance monitoring for blocking and match scoring.
//!
//! The monitor is wired as an observer: the blocking engine and the match
//! scorer hold an `Arc<PerformanceMonitor>` and report into it; hosts read
//! snapshots and reports, and may subscribe to events. There is no write path
//! from consumers back into the engine.

/// Bounded sample histograms.
pub mod histogram;
/// Metric value types and derived metrics.
pub mod metrics;
/// The monitor itself.
pub mod performance;
/// Report roll-up.
pub mod report;
/// Subscriber stream handle and event type.
pub mod stream;
/// Threshold definitions and checks.
pub mod thresholds;

/// Well-known operation, counter and histogram names.
pub mod names {
    pub const OP_INDEX_ENTITY: &str = "blocking.index_entity";
    pub const OP_GET_CANDIDATES: &str = "blocking.get_candidates";
    pub const OP_BUILD_INDEXES: &str = "blocking.build_indexes";
    pub const OP_PREDICT: &str = "scoring.predict_match";
    pub const OP_BATCH_PREDICT: &str = "scoring.batch_predict";
    pub const OP_RESOLUTION: &str = "resolution";

    pub const ENTITIES_INDEXED: &str = "blocking.entities_indexed";
    pub const INDEX_FAILURES: &str = "blocking.index_failures";
    pub const CANDIDATE_QUERIES: &str = "blocking.candidate_queries";
    pub const CANDIDATE_SET_SIZE: &str = "blocking.candidate_set_size";

    pub const CACHE_HIT: &str = "scoring.cache_hit";
    pub const CACHE_MISS: &str = "scoring.cache_miss";
    pub const MODEL_PREDICTIONS: &str = "scoring.model_predictions";
    pub const FALLBACK_PREDICTIONS: &str = "scoring.fallback_predictions";
    pub const REMOTE_FAILURES: &str = "scoring.remote_failures";
    pub const MATCH_PROBABILITY: &str = "scoring.match_probability";

    pub const RESOLUTIONS: &str = "resolutions";
}

pub use histogram::{Histogram, HistogramSummary};
pub use metrics::{
    blocking_efficiency, BlockingMetrics, MetricsSnapshot, OperationMetrics, ResolutionOutcome,
    ResolutionStats,
};
pub use performance::{resident_memory_bytes, PerformanceMonitor, TimerHandle};
pub use report::{PerformanceReport, ReportPerformance, ReportQuality, ReportSummary};
pub use stream::{MonitorEvent, MonitorStream};
pub use thresholds::{ThresholdConfig, ThresholdInputs, ThresholdWarning};
