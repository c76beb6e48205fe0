//! Health statistics for the exporter itself.
//!
//! Tracks how the sampling loop is doing (tick duration, completeness,
//! source read failures, the latest sysload) and how often the HTTP
//! endpoints are hit. Rendered as a plain-text table on `/health`.

use std::collections::VecDeque;
use std::fmt::Write as FmtWrite;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Mutex, RwLock as StdRwLock};
use std::time::{Duration, Instant};

use chrono::{DateTime, Utc};

/// Running statistics for a single metric.
#[derive(Clone, Copy, Default)]
pub struct RunningStat {
    count: u64,
    sum: f64,
    min: f64,
    max: f64,
    last: f64,
}

impl RunningStat {
    pub fn add(&mut self, value: f64) {
        if self.count == 0 {
            *self = Self {
                count: 1,
                sum: value,
                min: value,
                max: value,
                last: value,
            };
            return;
        }
        self.count += 1;
        self.sum += value;
        self.last = value;
        self.min = self.min.min(value);
        self.max = self.max.max(value);
    }

    pub fn avg(&self) -> f64 {
        if self.count == 0 {
            0.0
        } else {
            self.sum / (self.count as f64)
        }
    }
}

/// Point-in-time copy of a [`Stat`].
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct StatSnapshot {
    pub last: f64,
    pub avg: f64,
    pub max: f64,
    pub min: f64,
    pub count: u64,
}

/// Thread-safe wrapper for running statistics.
#[derive(Default)]
pub struct Stat {
    inner: Mutex<RunningStat>,
}

impl Stat {
    pub fn add_sample(&self, value: f64) {
        if let Ok(mut s) = self.inner.lock() {
            s.add(value);
        }
    }

    pub fn snapshot(&self) -> StatSnapshot {
        self.inner
            .lock()
            .map(|s| StatSnapshot {
                last: s.last,
                avg: s.avg(),
                max: s.max,
                min: s.min,
                count: s.count,
            })
            .unwrap_or_default()
    }
}

/// HTTP request timestamps for the last ten minutes.
pub struct RequestTimestamps {
    inner: Mutex<VecDeque<Instant>>,
}

impl Default for RequestTimestamps {
    fn default() -> Self {
        Self {
            inner: Mutex::new(VecDeque::with_capacity(256)),
        }
    }
}

impl RequestTimestamps {
    const RETENTION: Duration = Duration::from_secs(600);

    pub fn record(&self) {
        if let Ok(mut guard) = self.inner.lock() {
            let now = Instant::now();
            guard.push_back(now);
            while guard
                .front()
                .is_some_and(|&t| now.duration_since(t) > Self::RETENTION)
            {
                guard.pop_front();
            }
        }
    }

    pub fn count_last_minute(&self) -> u64 {
        let Ok(guard) = self.inner.lock() else {
            return 0;
        };
        let now = Instant::now();
        guard
            .iter()
            .filter(|&&t| now.duration_since(t) <= Duration::from_secs(60))
            .count() as u64
    }
}

/// Exporter self-monitoring counters.
pub struct HealthStats {
    // Sampling loop
    pub tick_duration_seconds: Stat,
    pub sysload: Stat,
    pub total_ticks: AtomicU64,
    pub complete_ticks: AtomicU64,
    pub partial_ticks: AtomicU64,
    pub skipped_ticks: AtomicU64,
    pub source_read_errors: AtomicU64,

    // HTTP server
    pub http_request_timestamps: RequestTimestamps,
    pub request_duration_ms: Stat,
    pub metrics_endpoint_calls: AtomicU64,

    pub start_time: Instant,
    pub last_tick_time: StdRwLock<Option<DateTime<Utc>>>,
}

impl Default for HealthStats {
    fn default() -> Self {
        Self {
            tick_duration_seconds: Stat::default(),
            sysload: Stat::default(),
            total_ticks: AtomicU64::new(0),
            complete_ticks: AtomicU64::new(0),
            partial_ticks: AtomicU64::new(0),
            skipped_ticks: AtomicU64::new(0),
            source_read_errors: AtomicU64::new(0),
            http_request_timestamps: RequestTimestamps::default(),
            request_duration_ms: Stat::default(),
            metrics_endpoint_calls: AtomicU64::new(0),
            start_time: Instant::now(),
            last_tick_time: StdRwLock::new(None),
        }
    }
}

impl HealthStats {
    pub fn new() -> Self {
        Default::default()
    }

    /// Records one sampling tick.
    ///
    /// `sysload` is `None` when the tick produced no derived values.
    pub fn record_tick(&self, duration_seconds: f64, source_failures: usize, sysload: Option<f64>) {
        self.total_ticks.fetch_add(1, Ordering::Relaxed);
        self.tick_duration_seconds.add_sample(duration_seconds);

        if source_failures > 0 {
            self.partial_ticks.fetch_add(1, Ordering::Relaxed);
            self.source_read_errors
                .fetch_add(source_failures as u64, Ordering::Relaxed);
        }

        match sysload {
            Some(value) => {
                self.sysload.add_sample(value);
                if source_failures == 0 {
                    self.complete_ticks.fetch_add(1, Ordering::Relaxed);
                }
                if let Ok(mut guard) = self.last_tick_time.write() {
                    *guard = Some(Utc::now());
                }
            }
            None => {
                self.skipped_ticks.fetch_add(1, Ordering::Relaxed);
            }
        }
    }

    pub fn record_http_request(&self) {
        self.http_request_timestamps.record();
    }

    pub fn record_request_duration(&self, duration_ms: f64) {
        self.request_duration_ms.add_sample(duration_ms);
    }

    pub fn record_metrics_endpoint_call(&self) {
        self.metrics_endpoint_calls.fetch_add(1, Ordering::Relaxed);
    }

    /// True once at least one tick has produced derived values.
    pub fn has_derived_tick(&self) -> bool {
        self.sysload.snapshot().count > 0
    }

    /// Percentage of ticks in which every source was read.
    pub fn get_tick_success_rate(&self) -> f64 {
        let total = self.total_ticks.load(Ordering::Relaxed);
        let partial = self.partial_ticks.load(Ordering::Relaxed);
        if total == 0 {
            100.0
        } else {
            (total.saturating_sub(partial) as f64 / total as f64) * 100.0
        }
    }

    pub fn get_uptime_hours(&self) -> f64 {
        self.start_time.elapsed().as_secs_f64() / 3600.0
    }

    pub fn get_last_tick_time_str(&self) -> String {
        self.last_tick_time
            .read()
            .ok()
            .and_then(|guard| *guard)
            .map(|ts| ts.format("%H:%M:%S").to_string())
            .unwrap_or_else(|| "N/A".to_string())
    }

    pub fn render_table(&self) -> String {
        const LEFT: usize = 26;
        const COL: usize = 12;

        fn stat_row(out: &mut String, name: &str, s: StatSnapshot, precision: usize) {
            writeln!(
                out,
                "{:left$} | {:^col$} | {:^col$} | {:^col$} | {:^col$}",
                name,
                format!("{:.*}", precision, s.last),
                format!("{:.*}", precision, s.avg),
                format!("{:.*}", precision, s.max),
                format!("{:.*}", precision, s.min),
                left = LEFT,
                col = COL
            )
            .ok();
        }

        fn value_row(out: &mut String, name: &str, value: String) {
            writeln!(
                out,
                "{:left$} | {:^col$} | {:^col$} | {:^col$} | {:^col$}",
                name,
                value,
                "N/A",
                "N/A",
                "N/A",
                left = LEFT,
                col = COL
            )
            .ok();
        }

        fn section(out: &mut String, title: &str) {
            writeln!(out).ok();
            writeln!(out, "{}", title).ok();
            writeln!(out, "{}", "-".repeat(title.len())).ok();
        }

        let mut out = String::new();

        writeln!(out, "HEALTH ENDPOINT - EXPORTER INTERNAL STATS").ok();
        writeln!(out, "==========================================").ok();
        writeln!(out).ok();
        writeln!(
            out,
            "{:left$} | {:^col$} | {:^col$} | {:^col$} | {:^col$}",
            "",
            "current",
            "average",
            "max",
            "min",
            left = LEFT,
            col = COL
        )
        .ok();

        section(&mut out, "SAMPLING LOOP");
        stat_row(&mut out, "tick_duration (s)", self.tick_duration_seconds.snapshot(), 3);
        stat_row(&mut out, "sysload (%)", self.sysload.snapshot(), 1);
        value_row(
            &mut out,
            "tick_success_rate (%)",
            format!("{:.1}", self.get_tick_success_rate()),
        );
        value_row(
            &mut out,
            "ticks_total",
            self.total_ticks.load(Ordering::Relaxed).to_string(),
        );
        value_row(
            &mut out,
            "ticks_complete",
            self.complete_ticks.load(Ordering::Relaxed).to_string(),
        );
        value_row(
            &mut out,
            "ticks_partial",
            self.partial_ticks.load(Ordering::Relaxed).to_string(),
        );
        value_row(
            &mut out,
            "ticks_skipped",
            self.skipped_ticks.load(Ordering::Relaxed).to_string(),
        );
        value_row(
            &mut out,
            "source_read_errors",
            self.source_read_errors.load(Ordering::Relaxed).to_string(),
        );

        section(&mut out, "HTTP SERVER");
        value_row(
            &mut out,
            "http_requests_last_minute",
            self.http_request_timestamps.count_last_minute().to_string(),
        );
        stat_row(
            &mut out,
            "request_duration (ms)",
            self.request_duration_ms.snapshot(),
            1,
        );
        value_row(
            &mut out,
            "metrics_endpoint_calls",
            self.metrics_endpoint_calls.load(Ordering::Relaxed).to_string(),
        );

        writeln!(out).ok();
        writeln!(
            out,
            "uptime: {:.2} h | last tick: {}",
            self.get_uptime_hours(),
            self.get_last_tick_time_str()
        )
        .ok();

        out
    }
}
