//! Health check endpoint handler.
//!
//! This module provides the `/health` endpoint handler that returns
//! exporter health statistics as a plain-text table.

use axum::{extract::State, http::StatusCode, response::IntoResponse};
use std::sync::atomic::Ordering;
use tracing::{debug, instrument};

use crate::state::SharedState;

// Time conversion constants
const SECONDS_PER_HOUR: f64 = 3600.0;
const MINUTES_PER_HOUR: f64 = 60.0;
const HOURS_PER_DAY: f64 = 24.0;

/// Footer text for human-readable HTTP endpoints.
pub const FOOTER_TEXT: &str = concat!(
    "sysload-exporter ",
    env!("CARGO_PKG_VERSION"),
    " - composite system saturation estimate"
);

/// Formats an uptime in the largest sensible unit.
pub fn format_uptime(uptime_seconds: f64) -> String {
    let uptime_hours = uptime_seconds / SECONDS_PER_HOUR;
    if uptime_hours < 1.0 {
        format!("{:.1} minutes", uptime_hours * MINUTES_PER_HOUR)
    } else if uptime_hours < HOURS_PER_DAY {
        format!("{:.1} hours", uptime_hours)
    } else {
        format!("{:.1} days", uptime_hours / HOURS_PER_DAY)
    }
}

/// Handler for the /health endpoint.
///
/// Returns 503 until the sampling loop has produced its first derived tick.
#[instrument(skip(state))]
pub async fn health_handler(State(state): State<SharedState>) -> impl IntoResponse {
    debug!("Processing /health request");
    state.health_stats.record_http_request();

    let stats = &state.health_stats;
    let (status, message) = if !stats.has_derived_tick() {
        (StatusCode::SERVICE_UNAVAILABLE, "Waiting for first sample")
    } else if stats.partial_ticks.load(Ordering::Relaxed) > 0
        && stats.complete_ticks.load(Ordering::Relaxed) == 0
    {
        (StatusCode::OK, "OK - counter sources partially unreadable")
    } else {
        (StatusCode::OK, "OK")
    };

    let uptime_str = format_uptime(state.start_time.elapsed().as_secs_f64());
    let table = stats.render_table();

    debug!("Health check: {} - {}", status, message);
    (
        status,
        [("Content-Type", "text/plain; charset=utf-8")],
        format!("{message}\n\nUptime: {uptime_str}\n\n{table}\n{FOOTER_TEXT}\n"),
    )
}
