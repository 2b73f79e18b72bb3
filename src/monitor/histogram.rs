//! Bounded sample histograms.

use std::collections::VecDeque;

use serde::{Deserialize, Serialize};

/// Distribution summary computed on demand.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct HistogramSummary {
    pub count: usize,
    pub min: f64,
    pub max: f64,
    pub mean: f64,
    pub median: f64,
    pub p95: f64,
    pub p99: f64,
}

/// Ring of the most recent samples.
///
/// Once `capacity` samples are held, recording a new one drops the oldest.
#[derive(Debug, Clone)]
pub struct Histogram {
    samples: VecDeque<f64>,
    capacity: usize,
}

fn nearest_rank(sorted: &[f64], p: f64) -> f64 {
    #[allow(clippy::cast_precision_loss, clippy::cast_possible_truncation, clippy::cast_sign_loss)]
    let idx = ((sorted.len() as f64) * p).ceil() as usize;
    let idx = idx.saturating_sub(1).min(sorted.len() - 1);
    sorted[idx]
}

impl Histogram {
    /// Create an empty histogram retaining at most `capacity` samples.
    #[must_use]
    pub fn new(capacity: usize) -> Self {
        let capacity = capacity.max(1);
        Self {
            samples: VecDeque::with_capacity(capacity.min(1024)),
            capacity,
        }
    }

    /// Record a sample. Non-finite values are ignored.
    pub fn record(&mut self, value: f64) {
        if !value.is_finite() {
            return;
        }
        if self.samples.len() == self.capacity {
            self.samples.pop_front();
        }
        self.samples.push_back(value);
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.samples.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.samples.is_empty()
    }

    /// Summarize retained samples; `None` when empty.
    #[must_use]
    pub fn summary(&self) -> Option<HistogramSummary> {
        if self.samples.is_empty() {
            return None;
        }

        let mut sorted: Vec<f64> = self.samples.iter().copied().collect();
        sorted.sort_by(f64::total_cmp);

        let n = sorted.len();
        #[allow(clippy::cast_precision_loss)]
        let mean = sorted.iter().sum::<f64>() / n as f64;
        let median = if n % 2 == 0 {
            (sorted[n / 2 - 1] + sorted[n / 2]) / 2.0
        } else {
            sorted[n / 2]
        };

        Some(HistogramSummary {
            count: n,
            min: sorted[0],
            max: sorted[n - 1],
            mean,
            median,
            p95: nearest_rank(&sorted, 0.95),
            p99: nearest_rank(&sorted, 0.99),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_histogram_has_no_summary() {
        let h = Histogram::new(10);
        assert!(h.summary().is_none());
        assert!(h.is_empty());
    }

    #[test]
    fn summary_statistics() {
        let mut h = Histogram::new(1000);
        for v in 1..=100 {
            h.record(f64::from(v));
        }
        let s = h.summary().unwrap();
        assert_eq!(s.count, 100);
        assert_eq!(s.min, 1.0);
        assert_eq!(s.max, 100.0);
        assert!((s.mean - 50.5).abs() < 1e-9);
        assert!((s.median - 50.5).abs() < 1e-9);
        assert_eq!(s.p95, 95.0);
        assert_eq!(s.p99, 99.0);
    }

    #[test]
    fn ring_keeps_most_recent_samples() {
        let mut h = Histogram::new(3);
        for v in [1.0, 2.0, 3.0, 4.0, 5.0] {
            h.record(v);
        }
        let s = h.summary().unwrap();
        assert_eq!(h.len(), 3);
        assert_eq!(s.min, 3.0);
        assert_eq!(s.max, 5.0);
    }

    #[test]
    fn non_finite_samples_are_ignored() {
        let mut h = Histogram::new(3);
        h.record(f64::NAN);
        h.record(f64::INFINITY);
        assert!(h.is_empty());
    }
}
