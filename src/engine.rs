//! The sampling cycle: sample, derive, estimate, smooth, publish.
//!
//! [`SysloadEngine`] owns the previous snapshot and the load history and is
//! driven by a single caller (the scheduler task). Publication goes through
//! the [`MetricSink`] trait so the engine never depends on an exposition
//! format.

use std::collections::{BTreeMap, BTreeSet};
use std::sync::{Arc, RwLock};
use std::time::{Duration, Instant};
use tracing::{debug, warn};

use crate::delta::{derive, DerivedSample};
use crate::error::SysloadError;
use crate::estimator::{SysloadEstimator, SI_CPU_PREFIX, SYSLOAD};
use crate::history::{LoadHistory, WINDOWS};
use crate::sampler::{
    io_util_key, mode_key, CounterSampler, CounterSnapshot, CpuMode, SampleOutcome,
    ALL_CPU_PREFIX, PROC_CTXT, PROC_INTR,
};
use crate::topology::TopologyConfig;

/// Destination for published values.
///
/// Implementations must tolerate concurrent readers while `set` is called;
/// the engine itself never locks around publication.
pub trait MetricSink {
    fn set(&self, key: &str, value: f64);
}

/// A sink that keeps the latest value of every key in memory.
#[derive(Debug, Default)]
pub struct InMemorySink {
    values: RwLock<BTreeMap<String, f64>>,
}

impl InMemorySink {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get(&self, key: &str) -> Option<f64> {
        self.values.read().ok()?.get(key).copied()
    }

    /// Copy of every stored value, in key order.
    pub fn snapshot(&self) -> BTreeMap<String, f64> {
        self.values
            .read()
            .map(|values| values.clone())
            .unwrap_or_default()
    }
}

impl MetricSink for InMemorySink {
    fn set(&self, key: &str, value: f64) {
        if let Ok(mut values) = self.values.write() {
            values.insert(key.to_string(), value);
        }
    }
}

/// What happened during one tick.
#[derive(Debug)]
pub struct TickReport {
    /// Derived values, `None` when there was nothing to compare against.
    pub derived: Option<DerivedSample>,
    /// Sources that could not be read this tick.
    pub failures: Vec<SysloadError>,
    pub duration: Duration,
}

impl TickReport {
    pub fn is_complete(&self) -> bool {
        self.failures.is_empty()
    }

    pub fn sysload(&self) -> Option<f64> {
        self.derived.as_ref().and_then(|d| d.get(SYSLOAD))
    }
}

/// Every key the engine publishes for a topology.
pub fn published_keys(topology: &TopologyConfig) -> BTreeSet<String> {
    let mut keys: BTreeSet<String> = [SYSLOAD, PROC_CTXT, PROC_INTR]
        .into_iter()
        .chain(WINDOWS.iter().map(|(name, _)| *name))
        .map(str::to_string)
        .collect();
    keys.extend(topology.block_devices.iter().map(|d| io_util_key(d)));
    for mode in CpuMode::ALL {
        keys.insert(mode_key(ALL_CPU_PREFIX, mode));
        keys.insert(mode_key(SI_CPU_PREFIX, mode));
    }
    keys
}

/// Drives one topology through successive ticks.
#[derive(Debug)]
pub struct SysloadEngine {
    topology: Arc<TopologyConfig>,
    sampler: CounterSampler,
    estimator: SysloadEstimator,
    history: LoadHistory,
    previous: Option<CounterSnapshot>,
    published: BTreeSet<String>,
    ticks: u64,
}

impl SysloadEngine {
    pub fn new(topology: Arc<TopologyConfig>) -> Self {
        Self {
            sampler: CounterSampler::new(Arc::clone(&topology)),
            estimator: SysloadEstimator::new(Arc::clone(&topology)),
            history: LoadHistory::new(topology.refresh_interval),
            published: published_keys(&topology),
            previous: None,
            ticks: 0,
            topology,
        }
    }

    /// Takes the baseline snapshot. Any unreadable source is fatal here.
    pub fn prime(&mut self) -> Result<(), SysloadError> {
        let SampleOutcome { snapshot, failures } = self.sampler.sample();
        if let Some(err) = failures.into_iter().next() {
            return Err(err.into_startup());
        }
        debug!("Baseline snapshot taken with {} counters", snapshot.len());
        self.previous = Some(snapshot);
        Ok(())
    }

    /// Samples the sources and advances one tick.
    pub fn tick(&mut self) -> TickReport {
        let started = Instant::now();
        let outcome = self.sampler.sample();
        self.advance_since(outcome, started)
    }

    /// Advances one tick with an already taken sample.
    ///
    /// The new snapshot always becomes the baseline for the next tick, even
    /// when some sources failed; keys missing from either side are simply
    /// not derived.
    pub fn advance(&mut self, outcome: SampleOutcome) -> TickReport {
        self.advance_since(outcome, Instant::now())
    }

    /// Advances one tick; the report's duration is measured from `started`.
    fn advance_since(&mut self, outcome: SampleOutcome, started: Instant) -> TickReport {
        let SampleOutcome { snapshot, failures } = outcome;
        self.ticks += 1;

        for failure in &failures {
            warn!("Tick {}: {}", self.ticks, failure);
        }

        let derived = self.previous.take().and_then(|previous| {
            let mut derived = derive(&previous, &snapshot, &self.topology)?;
            let sysload = self.estimator.estimate(&mut derived);
            for (window, mean) in self.history.record(sysload) {
                derived.insert(window, mean);
            }
            Some(derived)
        });

        match &derived {
            Some(d) => debug!(
                "Tick {}: sysload={:.2}, {} derived values",
                self.ticks,
                d.get(SYSLOAD).unwrap_or_default(),
                d.len()
            ),
            None => debug!("Tick {}: no derived values", self.ticks),
        }

        self.previous = Some(snapshot);
        TickReport {
            derived,
            failures,
            duration: started.elapsed(),
        }
    }

    /// Ticks and publishes the result into `sink`.
    pub fn run_tick(&mut self, sink: &dyn MetricSink) -> TickReport {
        let report = self.tick();
        if let Some(derived) = &report.derived {
            self.publish(derived, sink);
        }
        report
    }

    /// Writes the publishable keys of `derived` into `sink`.
    pub fn publish(&self, derived: &DerivedSample, sink: &dyn MetricSink) {
        for (key, value) in derived.iter() {
            if self.published.contains(key) {
                sink.set(key, value);
            }
        }
    }

    pub fn topology(&self) -> &Arc<TopologyConfig> {
        &self.topology
    }

    pub fn history(&self) -> &LoadHistory {
        &self.history
    }

    pub fn published(&self) -> &BTreeSet<String> {
        &self.published
    }

    /// True once a baseline snapshot exists.
    pub fn is_primed(&self) -> bool {
        self.previous.is_some()
    }

    pub fn ticks(&self) -> u64 {
        self.ticks
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{Duration as ChronoDuration, TimeZone, Utc};
    use std::collections::BTreeMap;
    use std::path::PathBuf;

    fn topology() -> Arc<TopologyConfig> {
        Arc::new(TopologyConfig {
            proc_root: PathBuf::from("/nonexistent"),
            block_devices: ["sda".to_string()].into_iter().collect(),
            net_devices: vec!["eth0".to_string()],
            interrupt_groups: BTreeMap::from([("eth0".to_string(), vec!["0".to_string()])]),
            cpu_count: 1,
            threshold: 40.0,
            refresh_interval: 15,
        })
    }

    fn outcome(secs: i64, pairs: &[(&str, u64)]) -> SampleOutcome {
        let t0 = Utc.with_ymd_and_hms(2024, 1, 1, 0, 0, 0).unwrap();
        SampleOutcome {
            snapshot: CounterSnapshot::from_pairs(
                t0 + ChronoDuration::seconds(secs),
                pairs.iter().map(|(k, v)| (*k, *v)),
            ),
            failures: Vec::new(),
        }
    }

    #[test]
    fn test_first_tick_emits_nothing_and_leaves_history() {
        let mut engine = SysloadEngine::new(topology());
        assert!(!engine.is_primed());

        let report = engine.advance(outcome(0, &[("all_cpu_total", 100), ("all_cpu_idle", 50)]));

        assert!(report.derived.is_none());
        assert!(engine.is_primed());
        assert_eq!(engine.history().averages().iter().map(|(_, v)| *v).sum::<f64>(), 0.0);
        assert!(engine
            .history()
            .windows()
            .iter()
            .all(|w| w.history().iter().all(|v| *v == 0.0)));
    }

    #[test]
    fn test_tick_duration_spans_sampling() {
        let mut engine = SysloadEngine::new(topology());
        let wall = Instant::now();
        let report = engine.tick();
        let outer = wall.elapsed();

        // diskstats and stat are both missing under the fake root
        assert_eq!(report.failures.len(), 2);
        assert!(report.duration > Duration::ZERO);
        assert!(report.duration <= outer);
        assert_eq!(engine.ticks(), 1);
    }

    #[test]
    fn test_second_tick_derives_and_records() {
        let mut engine = SysloadEngine::new(topology());
        engine.advance(outcome(0, &[("all_cpu_total", 10_000), ("all_cpu_idle", 5_000)]));
        let report = engine.advance(outcome(15, &[("all_cpu_total", 11_500), ("all_cpu_idle", 5_750)]));

        let derived = report.derived.as_ref().expect("derived values");
        assert_eq!(derived.get("all_cpu_idle"), Some(50.0));
        assert_eq!(derived.get(SYSLOAD), Some(50.0));
        assert_eq!(derived.get("sysload_one"), Some(12.5));
        assert_eq!(report.sysload(), Some(50.0));
        assert_eq!(engine.ticks(), 2);
    }

    #[test]
    fn test_publish_filters_internal_keys() {
        let mut engine = SysloadEngine::new(topology());
        engine.advance(outcome(
            0,
            &[("all_cpu_total", 0), ("eth0_total", 0), ("eth0_sintr", 0), ("eth0_idle", 0)],
        ));
        let report = engine.advance(outcome(
            15,
            &[("all_cpu_total", 100), ("eth0_total", 100), ("eth0_sintr", 60), ("eth0_idle", 40)],
        ));

        let sink = InMemorySink::new();
        engine.publish(report.derived.as_ref().unwrap(), &sink);

        assert_eq!(sink.get("si_cpu_sintr"), Some(60.0));
        assert_eq!(sink.get("si_cpu_idle"), Some(40.0));
        assert_eq!(sink.get(SYSLOAD), Some(60.0));
        assert_eq!(sink.get("eth0_sintr"), None);
        assert_eq!(sink.get("all_cpu_total"), None);
    }

    #[test]
    fn test_partial_outcome_keeps_previous_values() {
        let mut engine = SysloadEngine::new(topology());
        let sink = InMemorySink::new();

        engine.advance(outcome(0, &[("sda_io_util", 0), ("proc_ctxt", 0)]));
        let report = engine.advance(outcome(15, &[("sda_io_util", 1500), ("proc_ctxt", 1500)]));
        engine.publish(report.derived.as_ref().unwrap(), &sink);
        assert_eq!(sink.get("sda_io_util"), Some(10.0));

        // diskstats unreadable: no io key this tick.
        let mut partial = outcome(30, &[("proc_ctxt", 3000)]);
        partial.failures.push(SysloadError::SourceRead {
            path: PathBuf::from("/proc/diskstats"),
            source: std::io::Error::from(std::io::ErrorKind::NotFound),
        });
        let report = engine.advance(partial);
        assert!(!report.is_complete());
        engine.publish(report.derived.as_ref().unwrap(), &sink);

        assert_eq!(sink.get("sda_io_util"), Some(10.0));
        assert_eq!(sink.get("proc_ctxt"), Some(100.0));
    }

    #[test]
    fn test_published_keys() {
        let keys = published_keys(&topology());
        for key in [
            "sysload",
            "sysload_one",
            "sysload_five",
            "sysload_fifteen",
            "sda_io_util",
            "si_cpu_wio",
            "all_cpu_sintr",
            "proc_ctxt",
            "proc_intr",
        ] {
            assert!(keys.contains(key), "missing {key}");
        }
        assert!(!keys.contains("all_cpu_total"));
        assert_eq!(keys.len(), 4 + 1 + 7 + 7 + 2);
    }

    #[test]
    fn test_prime_fails_on_missing_sources() {
        let mut engine = SysloadEngine::new(topology());
        let err = engine.prime().unwrap_err();
        assert!(matches!(err, SysloadError::StartupIo { .. }));
        assert!(!engine.is_primed());
    }
}
