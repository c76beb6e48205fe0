//! Metrics endpoint handler for Prometheus scraping.
//!
//! Gauges are written by the sampling task; this handler only encodes the
//! registry, so a scrape never triggers a sample.

use axum::{extract::State, http::StatusCode, response::IntoResponse};
use prometheus::{Encoder, TextEncoder};
use std::time::Instant;
use tracing::{debug, error, instrument};

use crate::state::SharedState;

/// Buffer capacity for metrics encoding.
const BUFFER_CAP: usize = 16 * 1024;

/// Error type for metrics endpoint failures.
#[derive(Debug)]
pub enum MetricsError {
    EncodingFailed,
}

impl IntoResponse for MetricsError {
    fn into_response(self) -> axum::response::Response {
        (
            StatusCode::INTERNAL_SERVER_ERROR,
            "Failed to encode metrics",
        )
            .into_response()
    }
}

/// Handler for the /metrics endpoint.
#[instrument(skip(state))]
pub async fn metrics_handler(State(state): State<SharedState>) -> Result<String, MetricsError> {
    let start = Instant::now();
    debug!("Processing /metrics request");

    let families = state.registry.gather();
    let mut buffer = Vec::with_capacity(BUFFER_CAP);
    let encoder = TextEncoder::new();

    if encoder.encode(&families, &mut buffer).is_err() {
        error!("Failed to encode Prometheus metrics");
        return Err(MetricsError::EncodingFailed);
    }

    let request_duration_ms = start.elapsed().as_secs_f64() * 1000.0;
    state.health_stats.record_metrics_endpoint_call();
    state
        .health_stats
        .record_request_duration(request_duration_ms);
    state.health_stats.record_http_request();
    state
        .metrics
        .scrape_duration_seconds
        .set(start.elapsed().as_secs_f64());

    debug!(
        "Metrics request completed: {} families, {} bytes, {:.3}ms",
        families.len(),
        buffer.len(),
        request_duration_ms
    );

    String::from_utf8(buffer).map_err(|_| MetricsError::EncodingFailed)
}
