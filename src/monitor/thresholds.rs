//! Operational threshold checks.
//!
//! Every breach is a warning; none is fatal.

use std::fmt;

use serde::{Deserialize, Serialize};

/// Limits checked by [`evaluate`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ThresholdConfig {
    /// Resolutions per second below which throughput is considered low.
    pub min_processing_rate: f64,
    /// Resident memory above which usage is considered high.
    pub max_memory_bytes: u64,
    /// Blocking efficiency below which blocking is considered ineffective.
    pub min_blocking_efficiency: f64,
    /// Share of resolutions sent to manual review above which quality is flagged.
    pub max_manual_review_rate: f64,
}

impl Default for ThresholdConfig {
    fn default() -> Self {
        Self {
            min_processing_rate: 10.0,
            max_memory_bytes: 1024 * 1024 * 1024,
            min_blocking_efficiency: 0.8,
            max_manual_review_rate: 0.2,
        }
    }
}

/// Observed values fed to the checks. `None` skips the corresponding check.
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct ThresholdInputs {
    pub processing_rate: Option<f64>,
    pub memory_bytes: Option<u64>,
    pub blocking_efficiency: Option<f64>,
    pub manual_review_rate: Option<f64>,
}

/// A threshold breach.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum ThresholdWarning {
    LowProcessingRate { rate: f64, min: f64 },
    HighMemoryUsage { bytes: u64, max: u64 },
    LowBlockingEfficiency { efficiency: f64, min: f64 },
    HighManualReviewRate { rate: f64, max: f64 },
}

impl fmt::Display for ThresholdWarning {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::LowProcessingRate { rate, min } => {
                write!(f, "low processing rate: {rate:.2}/s (min {min:.2}/s)")
            }
            Self::HighMemoryUsage { bytes, max } => {
                write!(f, "high memory usage: {bytes} bytes (max {max} bytes)")
            }
            Self::LowBlockingEfficiency { efficiency, min } => {
                write!(f, "low blocking efficiency: {efficiency:.3} (min {min:.3})")
            }
            Self::HighManualReviewRate { rate, max } => {
                write!(f, "high manual review rate: {:.1}% (max {:.1}%)", rate * 100.0, max * 100.0)
            }
        }
    }
}

/// Compare observations against limits.
#[must_use]
pub fn evaluate(cfg: &ThresholdConfig, inputs: &ThresholdInputs) -> Vec<ThresholdWarning> {
    let mut out = Vec::new();

    if let Some(rate) = inputs.processing_rate {
        if rate < cfg.min_processing_rate {
            out.push(ThresholdWarning::LowProcessingRate {
                rate,
                min: cfg.min_processing_rate,
            });
        }
    }
    if let Some(bytes) = inputs.memory_bytes {
        if bytes > cfg.max_memory_bytes {
            out.push(ThresholdWarning::HighMemoryUsage {
                bytes,
                max: cfg.max_memory_bytes,
            });
        }
    }
    if let Some(efficiency) = inputs.blocking_efficiency {
        if efficiency < cfg.min_blocking_efficiency {
            out.push(ThresholdWarning::LowBlockingEfficiency {
                efficiency,
                min: cfg.min_blocking_efficiency,
            });
        }
    }
    if let Some(rate) = inputs.manual_review_rate {
        if rate > cfg.max_manual_review_rate {
            out.push(ThresholdWarning::HighManualReviewRate {
                rate,
                max: cfg.max_manual_review_rate,
            });
        }
    }

    out
}
