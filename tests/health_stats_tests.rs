//! Integration tests for health stats module.
//!
//! These tests verify that HealthStats tracks sampling ticks and HTTP
//! activity correctly, including under concurrent updates.

use std::sync::atomic::Ordering;
use std::sync::Arc;
use sysload_exporter::health_stats::HealthStats;

#[test]
fn test_health_stats_initial_state() {
    let stats = HealthStats::new();

    assert_eq!(stats.total_ticks.load(Ordering::Relaxed), 0);
    assert_eq!(stats.tick_duration_seconds.snapshot().count, 0);
    assert!(!stats.has_derived_tick());
    assert_eq!(stats.get_tick_success_rate(), 100.0);
    assert_eq!(stats.get_last_tick_time_str(), "N/A");
}

#[test]
fn test_tick_accounting() {
    let stats = HealthStats::new();

    // Baseline tick: nothing derived yet.
    stats.record_tick(0.002, 0, None);
    // Two complete ticks.
    stats.record_tick(0.004, 0, Some(20.0));
    stats.record_tick(0.006, 0, Some(60.0));
    // One tick with two unreadable sources that still produced sysload.
    stats.record_tick(0.008, 2, Some(40.0));

    assert_eq!(stats.total_ticks.load(Ordering::Relaxed), 4);
    assert_eq!(stats.skipped_ticks.load(Ordering::Relaxed), 1);
    assert_eq!(stats.complete_ticks.load(Ordering::Relaxed), 2);
    assert_eq!(stats.partial_ticks.load(Ordering::Relaxed), 1);
    assert_eq!(stats.source_read_errors.load(Ordering::Relaxed), 2);
    assert_eq!(stats.get_tick_success_rate(), 75.0);

    let sysload = stats.sysload.snapshot();
    assert_eq!(sysload.count, 3);
    assert_eq!(sysload.last, 40.0);
    assert_eq!(sysload.max, 60.0);
    assert_eq!(sysload.min, 20.0);
    assert!((sysload.avg - 40.0).abs() < 1e-9);

    assert!(stats.has_derived_tick());
    assert_ne!(stats.get_last_tick_time_str(), "N/A");
}

#[test]
fn test_render_table_sections() {
    let stats = HealthStats::new();
    stats.record_tick(0.005, 0, Some(33.0));
    stats.record_http_request();
    stats.record_metrics_endpoint_call();
    stats.record_request_duration(1.5);

    let table = stats.render_table();

    assert!(table.contains("sysload"));
    assert!(table.contains("33.0"));
    assert!(table.contains("SAMPLING LOOP"));
    assert_eq!(stats.metrics_endpoint_calls.load(Ordering::Relaxed), 1);
    assert_eq!(stats.http_request_timestamps.count_last_minute(), 1);
}

#[test]
fn test_concurrent_updates() {
    let stats = Arc::new(HealthStats::new());

    let handles: Vec<_> = (0..8)
        .map(|i| {
            let stats = Arc::clone(&stats);
            std::thread::spawn(move || {
                for _ in 0..100 {
                    stats.record_tick(0.001, 0, Some(i as f64));
                    stats.record_http_request();
                }
            })
        })
        .collect();

    for handle in handles {
        handle.join().unwrap();
    }

    assert_eq!(stats.total_ticks.load(Ordering::Relaxed), 800);
    assert_eq!(stats.complete_ticks.load(Ordering::Relaxed), 800);
    assert_eq!(stats.sysload.snapshot().count, 800);
    assert_eq!(stats.sysload.snapshot().max, 7.0);
    assert_eq!(stats.http_request_timestamps.count_last_minute(), 800);
}
