//! Prometheus metrics definitions for sysload-exporter.
//!
//! Every published engine key becomes one plain gauge named
//! `<namespace>_<key>`. A handful of `exporter_*` gauges report on the
//! sampling loop itself.

use ahash::AHashMap as HashMap;
use prometheus::{Gauge, Opts, Registry};
use std::collections::BTreeSet;
use sysload_exporter::estimator::{SI_CPU_PREFIX, SYSLOAD};
use sysload_exporter::history::WINDOWS;
use sysload_exporter::sampler::{ALL_CPU_PREFIX, PROC_CTXT, PROC_INTR};
use sysload_exporter::MetricSink;
use tracing::debug;

/// Makes an engine key usable as a Prometheus metric name.
pub fn sanitize_metric_name(key: &str) -> String {
    key.chars()
        .map(|c| {
            if c.is_ascii_alphanumeric() || c == '_' || c == ':' {
                c
            } else {
                '_'
            }
        })
        .collect()
}

/// Help text for a published key.
fn describe(key: &str) -> String {
    if key == SYSLOAD {
        return "Composite system saturation estimate in percent".to_string();
    }
    if let Some((_, secs)) = WINDOWS.iter().find(|(name, _)| *name == key) {
        return format!("Moving average of sysload over {} minute(s)", secs / 60);
    }
    if key == PROC_CTXT {
        return "Context switches per second".to_string();
    }
    if key == PROC_INTR {
        return "Interrupts serviced per second".to_string();
    }
    if let Some(device) = key.strip_suffix("_io_util") {
        return format!("Share of time device {} was busy with I/O, in percent", device);
    }
    if let Some(mode) = key.strip_prefix(&format!("{SI_CPU_PREFIX}_")) {
        return format!(
            "CPU time in {} mode on the CPUs servicing the busiest network device, in percent",
            mode
        );
    }
    if let Some(mode) = key.strip_prefix(&format!("{ALL_CPU_PREFIX}_")) {
        return format!("Aggregate CPU time in {} mode, in percent", mode);
    }
    format!("Derived value {}", key)
}

/// Registered gauges for the engine output and the exporter itself.
#[derive(Clone)]
pub struct SysloadMetrics {
    gauges: HashMap<String, Gauge>,

    // ========== Exporter self-telemetry ==========
    pub tick_duration_seconds: Gauge,
    pub tick_success: Gauge,
    pub ticks_total: Gauge,
    pub scrape_duration_seconds: Gauge,
}

impl SysloadMetrics {
    /// Registers one gauge per key plus the exporter gauges.
    pub fn new(
        registry: &Registry,
        namespace: &str,
        keys: &BTreeSet<String>,
    ) -> Result<Self, prometheus::Error> {
        let register = |name: &str, help: &str| -> Result<Gauge, prometheus::Error> {
            let gauge = Gauge::with_opts(Opts::new(name, help).namespace(namespace))?;
            registry.register(Box::new(gauge.clone()))?;
            Ok(gauge)
        };

        let mut gauges = HashMap::with_capacity(keys.len());
        for key in keys {
            let gauge = register(&sanitize_metric_name(key), &describe(key))?;
            gauges.insert(key.clone(), gauge);
        }

        Ok(Self {
            gauges,
            tick_duration_seconds: register(
                "exporter_tick_duration_seconds",
                "Duration of the last sampling tick in seconds",
            )?,
            tick_success: register(
                "exporter_tick_success",
                "1 if every counter source was read in the last tick, 0 otherwise",
            )?,
            ticks_total: register(
                "exporter_ticks_total",
                "Number of sampling ticks since startup",
            )?,
            scrape_duration_seconds: register(
                "exporter_scrape_duration_seconds",
                "Duration of the last /metrics request in seconds",
            )?,
        })
    }

    pub fn len(&self) -> usize {
        self.gauges.len()
    }
}

impl MetricSink for SysloadMetrics {
    fn set(&self, key: &str, value: f64) {
        match self.gauges.get(key) {
            Some(gauge) => gauge.set(value),
            None => debug!("No gauge registered for '{}'", key),
        }
    }
}
