//! Background sampling task.
//!
//! One tokio task owns the engine and runs `wait -> tick -> publish` on a
//! fixed cadence until the process exits. It is the only writer of the
//! engine gauges.

use std::time::Duration;
use sysload_exporter::{SysloadEngine, TickReport};
use tokio::task::JoinHandle;
use tokio::time::{interval_at, Instant, Interval, MissedTickBehavior};
use tracing::{debug, info};

use crate::state::SharedState;

/// Pushes the outcome of one tick into the self-telemetry gauges and stats.
pub fn record_tick(state: &SharedState, report: &TickReport, ticks: u64) {
    let duration = report.duration.as_secs_f64();
    state.metrics.tick_duration_seconds.set(duration);
    state
        .metrics
        .tick_success
        .set(if report.is_complete() { 1.0 } else { 0.0 });
    state.metrics.ticks_total.set(ticks as f64);
    state
        .health_stats
        .record_tick(duration, report.failures.len(), report.sysload());
}

/// Fixed-cadence ticker whose first tick lands one period from now.
///
/// A late tick pushes the schedule back instead of firing a burst.
pub fn sampling_interval(period: Duration) -> Interval {
    let mut ticker = interval_at(Instant::now() + period, period);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
    ticker
}

/// Starts the sampling loop for a primed engine.
pub fn spawn_sampler(mut engine: SysloadEngine, state: SharedState) -> JoinHandle<()> {
    let interval = Duration::from_secs(engine.topology().refresh_interval);
    info!("Sampling every {}s", interval.as_secs());

    tokio::spawn(async move {
        let mut ticker = sampling_interval(interval);
        loop {
            ticker.tick().await;
            // procfs reads are small and synchronous
            let report = engine.run_tick(&state.metrics);
            record_tick(&state, &report, engine.ticks());
            debug!(
                "Tick {} done in {:.3}ms",
                engine.ticks(),
                report.duration.as_secs_f64() * 1000.0
            );
        }
    })
}
