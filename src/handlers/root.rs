//! Root endpoint handler for the landing page.
//!
//! This module provides the `/` endpoint handler that displays
//! a landing page with all available endpoints and descriptions.

use axum::{
    extract::State,
    response::{Html, IntoResponse},
};
use tracing::{debug, instrument};

use crate::handlers::health::FOOTER_TEXT;
use crate::state::SharedState;

/// Handler for the root `/` endpoint.
#[instrument(skip(state))]
pub async fn root_handler(State(state): State<SharedState>) -> impl IntoResponse {
    debug!("Processing / request");
    state.health_stats.record_http_request();

    let version = env!("CARGO_PKG_VERSION");

    let uptime_secs = state.start_time.elapsed().as_secs();
    let hours = uptime_secs / 3600;
    let minutes = (uptime_secs % 3600) / 60;
    let seconds = uptime_secs % 60;
    let uptime_str = format!("{}h {}m {}s", hours, minutes, seconds);

    let health_item = if state.config.health_enabled() {
        r#"<li>
            <a href="/health">/health</a>
            <div class="endpoint-desc">Sampling loop statistics (text)</div>
        </li>"#
    } else {
        ""
    };

    let html = format!(
        r#"<!DOCTYPE html>
<html lang="en">
<head>
    <meta charset="UTF-8">
    <meta name="viewport" content="width=device-width, initial-scale=1.0">
    <title>Sysload Exporter</title>
    <style>
        body {{ font-family: -apple-system, BlinkMacSystemFont, 'Segoe UI', Roboto, sans-serif; margin: 0; padding: 20px; background: #f5f5f5; line-height: 1.6; }}
        .container {{ max-width: 900px; margin: 0 auto; background: white; padding: 40px; border-radius: 8px; box-shadow: 0 2px 8px rgba(0,0,0,0.1); }}
        h1 {{ color: #333; border-bottom: 3px solid #007bff; padding-bottom: 15px; margin-bottom: 10px; }}
        .subtitle {{ color: #666; font-size: 1.1em; margin-bottom: 30px; }}
        .info {{ background: #e9ecef; padding: 15px; border-radius: 4px; margin: 20px 0; display: flex; justify-content: space-around; flex-wrap: wrap; }}
        .info-label {{ font-weight: 600; color: #555; display: block; font-size: 0.9em; }}
        .info-value {{ font-size: 1.2em; color: #007bff; }}
        .endpoint-list {{ list-style: none; padding: 0; }}
        .endpoint-list li {{ margin: 20px 0; padding: 15px; background: #f8f9fa; border-left: 4px solid #007bff; border-radius: 4px; }}
        .endpoint-list a {{ color: #007bff; text-decoration: none; font-weight: 600; font-size: 1.1em; }}
        .endpoint-desc {{ color: #666; margin-top: 5px; }}
        .footer {{ margin-top: 40px; padding-top: 20px; border-top: 1px solid #ddd; color: #666; font-size: 0.9em; text-align: center; }}
    </style>
</head>
<body>
<div class="container">
    <h1>Sysload Exporter</h1>
    <p class="subtitle">Composite system saturation from disk, CPU and interrupt counters</p>

    <div class="info">
        <div><span class="info-label">Version</span><span class="info-value">{version}</span></div>
        <div><span class="info-label">Uptime</span><span class="info-value">{uptime}</span></div>
        <div><span class="info-label">Refresh</span><span class="info-value">{refresh}s</span></div>
        <div><span class="info-label">Block devices</span><span class="info-value">{devices}</span></div>
    </div>

    <h2>Available Endpoints</h2>
    <ul class="endpoint-list">
        <li>
            <a href="/metrics">/metrics</a>
            <div class="endpoint-desc">Prometheus-compatible metrics endpoint</div>
        </li>
        {health_item}
        <li>
            <a href="/config">/config</a>
            <div class="endpoint-desc">Active configuration and discovered topology (text)</div>
        </li>
    </ul>

    <div class="footer">
        <p>{footer}</p>
    </div>
</div>
</body>
</html>"#,
        version = version,
        uptime = uptime_str,
        refresh = state.topology.refresh_interval,
        devices = state.topology.block_devices.len(),
        health_item = health_item,
        footer = FOOTER_TEXT
    );

    Html(html)
}
