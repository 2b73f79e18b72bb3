use std::sync::Arc;
use std::time::Duration;

use identilink::monitor::names;
use identilink::{
    BlockingConfig, BlockingEngine, BlockingStrategy, Entity, InMemoryEntityStore, MonitorConfig,
    MonitorEvent, PerformanceMonitor, ResolutionOutcome, ThresholdConfig, ThresholdWarning,
};

fn quiet_thresholds() -> ThresholdConfig {
    ThresholdConfig {
        min_processing_rate: 0.0,
        max_memory_bytes: u64::MAX,
        min_blocking_efficiency: 0.0,
        max_manual_review_rate: 1.0,
    }
}

fn monitor_with(thresholds: ThresholdConfig) -> Arc<PerformanceMonitor> {
    Arc::new(PerformanceMonitor::new(MonitorConfig {
        thresholds,
        ..MonitorConfig::default()
    }))
}

#[test]
fn index_build_streams_timing_event() {
    let monitor = monitor_with(quiet_thresholds());
    let events = monitor.subscribe();

    let store = Arc::new(InMemoryEntityStore::with_entities(vec![
        Entity::new("A").with_name("Meera Nair"),
        Entity::new("B").with_name("Mira Nair"),
    ]));
    let engine = BlockingEngine::new(store, Arc::clone(&monitor), BlockingConfig::default());
    engine.build_indexes().unwrap();

    let event = events
        .recv_timeout(Duration::from_secs(1))
        .expect("expected timing event");
    let MonitorEvent::Timing {
        operation, metadata, ..
    } = event
    else {
        panic!("expected timing event, got {event:?}");
    };
    assert_eq!(operation, names::OP_BUILD_INDEXES);
    assert_eq!(metadata["mode"], "full");

    let snap = monitor.get_metrics();
    assert_eq!(snap.pending_timers, 0);
    assert_eq!(snap.operations[names::OP_BUILD_INDEXES].count, 1);
    assert_eq!(snap.blocking.total_records, 2);
}

#[test]
fn report_rolls_up_resolutions() {
    let monitor = monitor_with(quiet_thresholds());
    monitor.record_resolution(ResolutionOutcome::Match, 0.9, Duration::from_millis(10));
    monitor.record_resolution(ResolutionOutcome::Match, 0.7, Duration::from_millis(30));
    monitor.record_resolution(ResolutionOutcome::NewEntity, 0.2, Duration::from_millis(20));
    monitor.record_resolution(ResolutionOutcome::ManualReview, 0.6, Duration::from_millis(20));

    let report = monitor.generate_report();
    assert_eq!(report.summary.total_resolutions, 4);
    assert_eq!(report.summary.match_rate, Some(0.5));
    assert!((report.summary.average_confidence.unwrap() - 0.6).abs() < 1e-9);
    assert!((report.summary.average_processing_ms.unwrap() - 20.0).abs() < 1e-9);
    assert_eq!(report.quality.manual_review_rate, Some(0.25));

    let snap = monitor.get_metrics();
    assert_eq!(snap.counter(&format!("{}{{outcome=match}}", names::RESOLUTIONS)), 2);
    assert_eq!(snap.operations[names::OP_RESOLUTION].count, 4);

    let json = serde_json::to_value(&report).unwrap();
    assert!(json["summary"]["total_resolutions"].is_u64());
}

#[test]
fn breached_thresholds_warn_and_publish() {
    let monitor = monitor_with(ThresholdConfig {
        max_memory_bytes: 1024,
        min_blocking_efficiency: 0.95,
        max_manual_review_rate: 0.1,
        ..quiet_thresholds()
    });
    let events = monitor.subscribe();

    monitor.record_memory_usage(4096);
    monitor.set_total_records(10);
    monitor.record_blocking_query("Q", 9);
    monitor.record_resolution(ResolutionOutcome::ManualReview, 0.5, Duration::from_millis(1));

    let warnings = monitor.check_thresholds();
    assert_eq!(warnings.len(), 3);
    assert!(warnings.contains(&ThresholdWarning::HighMemoryUsage {
        bytes: 4096,
        max: 1024
    }));
    assert!(warnings
        .iter()
        .any(|w| matches!(w, ThresholdWarning::LowBlockingEfficiency { .. })));
    assert!(warnings
        .iter()
        .any(|w| matches!(w, ThresholdWarning::HighManualReviewRate { .. })));

    let published: Vec<ThresholdWarning> = events
        .drain()
        .into_iter()
        .filter_map(|e| match e {
            MonitorEvent::Threshold { warning, .. } => Some(warning),
            MonitorEvent::Timing { .. } => None,
        })
        .collect();
    assert_eq!(published, warnings);
}

#[test]
fn healthy_system_has_no_warnings() {
    let monitor = monitor_with(quiet_thresholds());
    monitor.record_memory_usage(1);
    assert!(monitor.check_thresholds().is_empty());
}

#[test]
fn checker_publishes_until_shutdown() {
    let monitor = monitor_with(ThresholdConfig {
        max_memory_bytes: 10,
        ..quiet_thresholds()
    });
    monitor.record_memory_usage(100);
    let events = monitor.subscribe();

    assert!(monitor.start_checker(Duration::from_millis(5)));
    assert!(!monitor.start_checker(Duration::from_millis(5)));

    let event = events
        .recv_timeout(Duration::from_secs(2))
        .expect("checker should publish a warning");
    assert!(matches!(
        event,
        MonitorEvent::Threshold {
            warning: ThresholdWarning::HighMemoryUsage { .. },
            ..
        }
    ));

    let report = monitor.shutdown();
    assert_eq!(report.performance.memory_bytes, Some(100));

    let _ = events.drain();
    std::thread::sleep(Duration::from_millis(30));
    assert!(events.drain().is_empty());

    // A stopped checker may be started again.
    assert!(monitor.start_checker(Duration::from_millis(5)));
    monitor.shutdown();
}

#[test]
fn pipeline_reports_efficiency_in_final_report() {
    let monitor = monitor_with(quiet_thresholds());
    let entities: Vec<Entity> = (0..20)
        .map(|i| Entity::new(format!("E{i:02}")).with_department(format!("D{}", i % 4)))
        .collect();
    let store = Arc::new(InMemoryEntityStore::with_entities(entities.clone()));
    let engine = BlockingEngine::new(store, Arc::clone(&monitor), BlockingConfig::default());
    engine.build_indexes().unwrap();
    for e in &entities {
        engine.get_candidates(e, BlockingStrategy::Department);
    }

    let report = monitor.shutdown();
    // 20 queries, each meeting the 4 other members of its department.
    let expected = 1.0 - 80.0 / 190.0;
    assert!((report.performance.blocking_efficiency.unwrap() - expected).abs() < 1e-12);
    let sizes = monitor.histogram(names::CANDIDATE_SET_SIZE).unwrap();
    assert_eq!(sizes.count, 20);
}
