//! Performance monitor: timers, counters, histograms and threshold checks.
//!
//! The monitor is an explicitly constructed component shared via `Arc` by the
//! blocking engine and the match scorer. Lifecycle: create at service start,
//! optionally `start_checker`, then `shutdown` to stop the checker and obtain
//! the final report.

use std::collections::{BTreeMap, HashMap};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant};

use chrono::Utc;
use crossbeam_channel::{bounded, select, Sender, TrySendError};
use tracing::{debug, info, warn};

use crate::config::MonitorConfig;

use super::histogram::{Histogram, HistogramSummary};
use super::metrics::{
    blocking_efficiency, possible_comparisons, BlockingMetrics, MetricsSnapshot, OperationMetrics,
    ResolutionOutcome, ResolutionStats,
};
use super::names;
use super::report::PerformanceReport;
use super::stream::{MonitorEvent, MonitorStream};
use super::thresholds::{evaluate, ThresholdInputs, ThresholdWarning};

/// Opaque handle returned by [`PerformanceMonitor::start_timer`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct TimerHandle(u64);

#[derive(Debug)]
struct PendingTimer {
    operation: String,
    metadata: serde_json::Value,
    started: Instant,
}

#[derive(Debug, Default)]
struct MonitorState {
    timers: HashMap<TimerHandle, PendingTimer>,
    counters: BTreeMap<String, u64>,
    operations: BTreeMap<String, OperationMetrics>,
    histograms: BTreeMap<String, Histogram>,
    total_records: u64,
    /// Latest candidate count per query entity; repeating a query replaces it.
    blocked_by_query: HashMap<String, u64>,
    blocked_comparisons: u64,
    resolutions: ResolutionStats,
    reported_memory: Option<u64>,
}

#[derive(Debug)]
struct Checker {
    stop_tx: Sender<()>,
    join: JoinHandle<()>,
}

/// Observer of blocking and scoring activity.
#[derive(Debug)]
pub struct PerformanceMonitor {
    cfg: MonitorConfig,
    started: Instant,
    next_timer: AtomicU64,
    state: Mutex<MonitorState>,
    subscribers: Mutex<Vec<Sender<MonitorEvent>>>,
    dropped_events: AtomicU64,
    checker: Mutex<Option<Checker>>,
}

fn lock<T>(m: &Mutex<T>) -> MutexGuard<'_, T> {
    // Every critical section leaves the state consistent, so a panic elsewhere
    // does not invalidate it.
    m.lock().unwrap_or_else(PoisonError::into_inner)
}

fn counter_key(name: &str, tags: &[(&str, &str)]) -> String {
    if tags.is_empty() {
        return name.to_string();
    }
    let mut tags: Vec<_> = tags.to_vec();
    tags.sort_unstable();
    let joined: Vec<String> = tags.iter().map(|(k, v)| format!("{k}={v}")).collect();
    format!("{name}{{{}}}", joined.join(","))
}

fn duration_ms(d: Duration) -> f64 {
    d.as_secs_f64() * 1000.0
}

/// Resident set size of this process, when the platform exposes it.
#[cfg(target_os = "linux")]
#[must_use]
pub fn resident_memory_bytes() -> Option<u64> {
    let status = std::fs::read_to_string("/proc/self/status").ok()?;
    let line = status.lines().find(|l| l.starts_with("VmRSS:"))?;
    let kib: u64 = line.split_whitespace().nth(1)?.parse().ok()?;
    Some(kib * 1024)
}

/// Resident set size of this process, when the platform exposes it.
#[cfg(not(target_os = "linux"))]
#[must_use]
pub fn resident_memory_bytes() -> Option<u64> {
    None
}

impl Default for PerformanceMonitor {
    fn default() -> Self {
        Self::new(MonitorConfig::default())
    }
}

impl PerformanceMonitor {
    #[must_use]
    pub fn new(cfg: MonitorConfig) -> Self {
        Self {
            cfg,
            started: Instant::now(),
            next_timer: AtomicU64::new(1),
            state: Mutex::new(MonitorState::default()),
            subscribers: Mutex::new(Vec::new()),
            dropped_events: AtomicU64::new(0),
            checker: Mutex::new(None),
        }
    }

    #[must_use]
    pub const fn config(&self) -> &MonitorConfig {
        &self.cfg
    }

    /// Begin timing `operation`.
    pub fn start_timer(&self, operation: &str, metadata: serde_json::Value) -> TimerHandle {
        let handle = TimerHandle(self.next_timer.fetch_add(1, Ordering::Relaxed));
        lock(&self.state).timers.insert(
            handle,
            PendingTimer {
                operation: operation.to_string(),
                metadata,
                started: Instant::now(),
            },
        );
        handle
    }

    /// Finish a timer, fold its duration into the operation metrics and emit a
    /// timing event. Unknown (or already finished) handles are a no-op.
    pub fn end_timer(&self, handle: TimerHandle) -> Option<Duration> {
        let Some(timer) = lock(&self.state).timers.remove(&handle) else {
            warn!(timer = handle.0, "end_timer called with unknown handle");
            return None;
        };

        let elapsed = timer.started.elapsed();
        self.record_duration(&timer.operation, elapsed);

        self.publish(MonitorEvent::Timing {
            operation: timer.operation,
            elapsed_ms: duration_ms(elapsed),
            metadata: timer.metadata,
            at: Utc::now(),
        });
        Some(elapsed)
    }

    /// Fold an externally measured duration into `operation`'s metrics.
    pub fn record_duration(&self, operation: &str, elapsed: Duration) {
        let ms = duration_ms(elapsed);
        let capacity = self.cfg.histogram_capacity;
        let mut state = lock(&self.state);
        state
            .operations
            .entry(operation.to_string())
            .or_default()
            .observe(ms);
        state
            .histograms
            .entry(operation.to_string())
            .or_insert_with(|| Histogram::new(capacity))
            .record(ms);
    }

    /// Add `by` to a counter.
    pub fn increment(&self, name: &str, by: u64) {
        self.increment_tagged(name, &[], by);
    }

    /// Add `by` to a counter qualified by tags (tag order is irrelevant).
    pub fn increment_tagged(&self, name: &str, tags: &[(&str, &str)], by: u64) {
        let key = counter_key(name, tags);
        let mut state = lock(&self.state);
        let slot = state.counters.entry(key).or_insert(0);
        *slot = slot.saturating_add(by);
    }

    /// Record a sample in a bounded histogram.
    pub fn record_histogram(&self, name: &str, value: f64) {
        let capacity = self.cfg.histogram_capacity;
        lock(&self.state)
            .histograms
            .entry(name.to_string())
            .or_insert_with(|| Histogram::new(capacity))
            .record(value);
    }

    /// Summary of a histogram, `None` when it has no samples.
    #[must_use]
    pub fn histogram(&self, name: &str) -> Option<HistogramSummary> {
        lock(&self.state).histograms.get(name).and_then(Histogram::summary)
    }

    /// Set the number of records known to the blocking index (n).
    pub fn set_total_records(&self, total: u64) {
        lock(&self.state).total_records = total;
    }

    /// Record a candidate lookup for `query` proposing `candidates`
    /// comparisons.
    ///
    /// Blocked comparisons count each query entity once: a repeated lookup
    /// replaces that entity's previous count, so sweeping the same records
    /// again leaves the efficiency unchanged.
    pub fn record_blocking_query(&self, query: &str, candidates: u64) {
        {
            let mut state = lock(&self.state);
            let previous = state
                .blocked_by_query
                .insert(query.to_string(), candidates)
                .unwrap_or(0);
            state.blocked_comparisons = state
                .blocked_comparisons
                .saturating_sub(previous)
                .saturating_add(candidates);
        }
        self.record_histogram(names::CANDIDATE_SET_SIZE, candidates as f64);
    }

    /// Drop the recorded lookup of one query entity.
    pub fn forget_blocking_query(&self, query: &str) {
        let mut state = lock(&self.state);
        if let Some(previous) = state.blocked_by_query.remove(query) {
            state.blocked_comparisons = state.blocked_comparisons.saturating_sub(previous);
        }
    }

    /// Start a new index generation: recorded lookups are cleared.
    pub fn reset_blocking_queries(&self) {
        let mut state = lock(&self.state);
        state.blocked_by_query.clear();
        state.blocked_comparisons = 0;
    }

    /// Record the outcome of one resolution.
    pub fn record_resolution(&self, outcome: ResolutionOutcome, confidence: f64, elapsed: Duration) {
        let confidence = if confidence.is_finite() {
            confidence.clamp(0.0, 1.0)
        } else {
            0.0
        };
        lock(&self.state)
            .resolutions
            .observe(outcome, confidence, duration_ms(elapsed));
        self.increment_tagged(names::RESOLUTIONS, &[("outcome", &outcome.to_string())], 1);
        self.record_duration(names::OP_RESOLUTION, elapsed);
    }

    /// Override the memory probe with a host-reported figure.
    pub fn record_memory_usage(&self, bytes: u64) {
        lock(&self.state).reported_memory = Some(bytes);
    }

    /// Current blocking efficiency, if defined.
    #[must_use]
    pub fn blocking_efficiency(&self) -> Option<f64> {
        let state = lock(&self.state);
        blocking_efficiency(state.total_records, state.blocked_comparisons)
    }

    fn memory_bytes(&self) -> Option<u64> {
        lock(&self.state).reported_memory.or_else(resident_memory_bytes)
    }

    /// Read-only snapshot of every metric.
    #[must_use]
    pub fn get_metrics(&self) -> MetricsSnapshot {
        let memory_bytes = self.memory_bytes();
        let state = lock(&self.state);
        MetricsSnapshot {
            generated_at: Utc::now(),
            uptime_secs: self.started.elapsed().as_secs_f64(),
            counters: state.counters.clone(),
            operations: state.operations.clone(),
            histograms: state
                .histograms
                .iter()
                .filter_map(|(k, h)| h.summary().map(|s| (k.clone(), s)))
                .collect(),
            blocking: BlockingMetrics {
                total_records: state.total_records,
                blocked_comparisons: state.blocked_comparisons,
                possible_comparisons: possible_comparisons(state.total_records),
                efficiency: blocking_efficiency(state.total_records, state.blocked_comparisons),
            },
            resolutions: state.resolutions,
            memory_bytes,
            pending_timers: state.timers.len(),
            dropped_events: self.dropped_events.load(Ordering::Relaxed),
        }
    }

    /// Roll up summary, performance and quality sections.
    #[must_use]
    pub fn generate_report(&self) -> PerformanceReport {
        PerformanceReport::from_snapshot(&self.get_metrics())
    }

    /// Run every threshold check once; breaches are logged and published.
    ///
    /// The processing rate is resolutions per second of uptime and is skipped
    /// until the first resolution is recorded.
    pub fn check_thresholds(&self) -> Vec<ThresholdWarning> {
        let snapshot = self.get_metrics();
        let processing_rate = if snapshot.resolutions.total == 0 || snapshot.uptime_secs <= 0.0 {
            None
        } else {
            #[allow(clippy::cast_precision_loss)]
            let total = snapshot.resolutions.total as f64;
            Some(total / snapshot.uptime_secs)
        };

        let inputs = ThresholdInputs {
            processing_rate,
            memory_bytes: snapshot.memory_bytes,
            blocking_efficiency: snapshot.blocking.efficiency,
            manual_review_rate: snapshot.resolutions.manual_review_rate(),
        };

        let warnings = evaluate(&self.cfg.thresholds, &inputs);
        for w in &warnings {
            warn!(warning = %w, "performance threshold breached");
            self.publish(MonitorEvent::Threshold {
                warning: w.clone(),
                at: Utc::now(),
            });
        }
        debug!(breaches = warnings.len(), "threshold check complete");
        warnings
    }

    /// Subscribe to timing and threshold events.
    #[must_use]
    pub fn subscribe(&self) -> MonitorStream {
        let (tx, rx) = bounded(self.cfg.event_capacity.max(1));
        lock(&self.subscribers).push(tx);
        MonitorStream::new(rx)
    }

    #[must_use]
    pub fn dropped_events(&self) -> u64 {
        self.dropped_events.load(Ordering::Relaxed)
    }

    fn publish(&self, event: MonitorEvent) {
        let mut subs = lock(&self.subscribers);
        if subs.is_empty() {
            return;
        }
        subs.retain(|tx| match tx.try_send(event.clone()) {
            Ok(()) => true,
            Err(TrySendError::Full(_)) => {
                // Never block producers: drop if subscriber is slow.
                self.dropped_events.fetch_add(1, Ordering::Relaxed);
                true
            }
            Err(TrySendError::Disconnected(_)) => false,
        });
    }

    /// Spawn the periodic threshold checker. Returns false if one is running.
    ///
    /// The worker holds only a weak reference, so it exits on its own once the
    /// monitor is dropped.
    pub fn start_checker(self: &Arc<Self>, interval: Duration) -> bool {
        let mut slot = lock(&self.checker);
        if slot.is_some() {
            return false;
        }

        let (stop_tx, stop_rx) = bounded::<()>(1);
        let weak = Arc::downgrade(self);
        let interval = interval.max(Duration::from_millis(1));
        let join = thread::Builder::new()
            .name("identilink-monitor".to_string())
            .spawn(move || loop {
                select! {
                    recv(stop_rx) -> _ => break,
                    default(interval) => {
                        let Some(monitor) = weak.upgrade() else { break };
                        monitor.check_thresholds();
                    }
                }
            })
            .expect("failed to spawn identilink monitor worker");

        *slot = Some(Checker { stop_tx, join });
        info!(interval_ms = interval.as_millis() as u64, "threshold checker started");
        true
    }

    /// Stop the checker (if running) and return the final report.
    pub fn shutdown(&self) -> PerformanceReport {
        let checker = lock(&self.checker).take();
        if let Some(Checker { stop_tx, join }) = checker {
            let _ = stop_tx.try_send(());
            drop(stop_tx);
            if join.thread().id() != thread::current().id() {
                let _ = join.join();
            }
        }
        let report = self.generate_report();
        info!(
            resolutions = report.summary.total_resolutions,
            uptime_secs = report.performance.uptime_secs,
            "performance monitor shut down"
        );
        report
    }
}

impl Drop for PerformanceMonitor {
    fn drop(&mut self) {
        // Signal only; the last strong reference may be held by the worker
        // itself, so joining here could deadlock.
        if let Some(Checker { stop_tx, .. }) = lock(&self.checker).take() {
            let _ = stop_tx.try_send(());
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn timer_folds_into_operation_metrics() {
        let monitor = PerformanceMonitor::default();
        let h = monitor.start_timer("op", serde_json::json!({"k": 1}));
        let elapsed = monitor.end_timer(h).unwrap();
        assert!(elapsed <= Duration::from_secs(1));

        let snap = monitor.get_metrics();
        assert_eq!(snap.operations["op"].count, 1);
        assert_eq!(snap.histograms["op"].count, 1);
        assert_eq!(snap.pending_timers, 0);
    }

    #[test]
    fn unknown_timer_handle_is_noop() {
        let monitor = PerformanceMonitor::default();
        let h = monitor.start_timer("op", serde_json::Value::Null);
        assert!(monitor.end_timer(h).is_some());
        assert!(monitor.end_timer(h).is_none());
        assert!(monitor.end_timer(TimerHandle(9999)).is_none());
        assert_eq!(monitor.get_metrics().operations["op"].count, 1);
    }

    #[test]
    fn tagged_counters_are_order_independent() {
        let monitor = PerformanceMonitor::default();
        monitor.increment_tagged("c", &[("a", "1"), ("b", "2")], 1);
        monitor.increment_tagged("c", &[("b", "2"), ("a", "1")], 2);
        monitor.increment("c", 5);
        let snap = monitor.get_metrics();
        assert_eq!(snap.counter("c{a=1,b=2}"), 3);
        assert_eq!(snap.counter("c"), 5);
        assert_eq!(snap.counter("missing"), 0);
    }

    #[test]
    fn histogram_retains_configured_capacity() {
        let monitor = PerformanceMonitor::new(MonitorConfig {
            histogram_capacity: 5,
            ..MonitorConfig::default()
        });
        for v in 0..20 {
            monitor.record_histogram("h", f64::from(v));
        }
        let s = monitor.histogram("h").unwrap();
        assert_eq!(s.count, 5);
        assert_eq!(s.min, 15.0);
        assert!(monitor.histogram("none").is_none());
    }

    #[test]
    fn blocking_efficiency_from_recorded_queries() {
        let monitor = PerformanceMonitor::default();
        monitor.set_total_records(100);
        assert_eq!(monitor.blocking_efficiency(), None);
        for q in ["a", "b", "c", "d", "e"] {
            monitor.record_blocking_query(q, 100);
        }
        let e = monitor.blocking_efficiency().unwrap();
        assert!((e - (1.0 - 500.0 / 4950.0)).abs() < 1e-12);
    }

    #[test]
    fn repeated_query_replaces_its_count() {
        let monitor = PerformanceMonitor::default();
        monitor.set_total_records(100);
        monitor.record_blocking_query("a", 40);
        monitor.record_blocking_query("a", 10);
        monitor.record_blocking_query("b", 5);
        assert_eq!(monitor.get_metrics().blocking.blocked_comparisons, 15);

        monitor.forget_blocking_query("a");
        monitor.forget_blocking_query("missing");
        assert_eq!(monitor.get_metrics().blocking.blocked_comparisons, 5);

        monitor.reset_blocking_queries();
        assert_eq!(monitor.get_metrics().blocking.blocked_comparisons, 0);
        assert_eq!(monitor.blocking_efficiency(), None);
        // The size histogram still sees every lookup.
        assert_eq!(monitor.histogram(names::CANDIDATE_SET_SIZE).unwrap().count, 3);
    }

    #[test]
    fn manual_review_threshold_warns() {
        let monitor = PerformanceMonitor::default();
        monitor.record_memory_usage(1024);
        monitor.record_resolution(ResolutionOutcome::ManualReview, 0.6, Duration::from_millis(1));
        monitor.record_resolution(ResolutionOutcome::Match, 0.9, Duration::from_millis(1));

        let warnings = monitor.check_thresholds();
        assert!(warnings
            .iter()
            .any(|w| matches!(w, ThresholdWarning::HighManualReviewRate { .. })));
        assert!(!warnings
            .iter()
            .any(|w| matches!(w, ThresholdWarning::HighMemoryUsage { .. })));
    }

    #[test]
    fn slow_subscriber_drops_events() {
        let monitor = PerformanceMonitor::new(MonitorConfig {
            event_capacity: 1,
            ..MonitorConfig::default()
        });
        let stream = monitor.subscribe();
        for _ in 0..3 {
            let h = monitor.start_timer("op", serde_json::Value::Null);
            monitor.end_timer(h);
        }
        assert_eq!(stream.drain().len(), 1);
        assert_eq!(monitor.dropped_events(), 2);
    }

    #[test]
    fn checker_runs_and_shutdown_stops_it() {
        let monitor = Arc::new(PerformanceMonitor::default());
        monitor.record_memory_usage(u64::MAX);
        let stream = monitor.subscribe();

        assert!(monitor.start_checker(Duration::from_millis(5)));
        assert!(!monitor.start_checker(Duration::from_millis(5)));

        let ev = stream.recv_timeout(Duration::from_secs(2)).unwrap();
        assert!(matches!(
            ev,
            MonitorEvent::Threshold {
                warning: ThresholdWarning::HighMemoryUsage { .. },
                ..
            }
        ));

        let report = monitor.shutdown();
        assert_eq!(report.summary.total_resolutions, 0);
        assert!(monitor.start_checker(Duration::from_millis(5)));
        monitor.shutdown();
    }
}
