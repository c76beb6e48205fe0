//! Application state management for the exporter.
//!
//! This module defines the shared application state that is passed
//! to HTTP handlers and used by the background sampling task.

use prometheus::Registry;
use std::sync::Arc;
use std::time::Instant;
use sysload_exporter::health_stats::HealthStats;
use sysload_exporter::TopologyConfig;

use crate::config::Config;
use crate::metrics::SysloadMetrics;

/// Type alias for shared application state.
pub type SharedState = Arc<AppState>;

/// Global application state shared across requests and the sampling task.
pub struct AppState {
    pub registry: Registry,
    pub metrics: SysloadMetrics,
    pub config: Arc<Config>,
    /// Topology discovered at startup, never changes afterwards.
    pub topology: Arc<TopologyConfig>,
    pub health_stats: Arc<HealthStats>,
    /// Server start time for uptime calculation.
    pub start_time: Instant,
}
