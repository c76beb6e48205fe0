//! Configuration display endpoint handler.
//!
//! This module provides the `/config` endpoint handler that displays
//! the effective exporter configuration and the topology discovered at
//! startup.

use axum::{extract::State, http::StatusCode, response::IntoResponse};
use std::fmt::Write as FmtWrite;
use sysload_exporter::history::LoadWindow;
use sysload_exporter::TopologyConfig;
use tracing::{debug, instrument};

use crate::config::Config;
use crate::handlers::health::FOOTER_TEXT;
use crate::state::SharedState;

fn list_or_none(items: &[String]) -> String {
    if items.is_empty() {
        "none".to_string()
    } else {
        items.join(", ")
    }
}

/// Plain-text view of the effective configuration.
pub fn render_config_text(cfg: &Config) -> String {
    let mut out = String::new();

    writeln!(out, "SERVER CONFIGURATION").ok();
    writeln!(out, "--------------------").ok();
    writeln!(out, "bind:                       {}", cfg.bind()).ok();
    writeln!(out, "port:                       {}", cfg.port()).ok();
    writeln!(out, "namespace:                  {}", cfg.namespace()).ok();
    writeln!(out, "enable_health:              {}", cfg.health_enabled()).ok();
    writeln!(out).ok();

    writeln!(out, "TLS/SSL CONFIGURATION").ok();
    writeln!(out, "---------------------").ok();
    writeln!(out, "enable_tls:                 {}", cfg.tls_enabled()).ok();
    writeln!(
        out,
        "tls_cert_path:              {}",
        cfg.tls_cert_path.as_deref().unwrap_or("none")
    )
    .ok();
    writeln!(
        out,
        "tls_key_path:               {}",
        cfg.tls_key_path.as_deref().unwrap_or("none")
    )
    .ok();
    writeln!(out).ok();

    let opts = cfg.to_discovery_options();
    writeln!(out, "SAMPLING").ok();
    writeln!(out, "--------").ok();
    writeln!(out, "refresh_interval:           {} seconds", opts.refresh_interval).ok();
    writeln!(out, "threshold:                  {:.1} %", opts.threshold).ok();
    writeln!(out, "proc_root:                  {}", opts.proc_root.display()).ok();
    writeln!(
        out,
        "block_devices:              {}",
        opts.block_devices
            .as_deref()
            .map(list_or_none)
            .unwrap_or_else(|| "auto".to_string())
    )
    .ok();
    writeln!(
        out,
        "block_device_pattern:       {}",
        opts.block_device_pattern.as_deref().unwrap_or("default")
    )
    .ok();
    writeln!(out, "net_devices:                {}", list_or_none(&opts.net_devices)).ok();
    writeln!(
        out,
        "irq_match:                  {}",
        opts.irq_match.as_deref().unwrap_or("substring")
    )
    .ok();
    writeln!(out, "irq_exclude:                {}", list_or_none(&opts.irq_exclude)).ok();

    out
}

/// Plain-text view of a discovered topology.
pub fn render_topology(topology: &TopologyConfig) -> String {
    let mut out = String::new();

    writeln!(out, "DISCOVERED TOPOLOGY").ok();
    writeln!(out, "-------------------").ok();
    writeln!(out, "cpu_count:                  {}", topology.cpu_count).ok();
    let devices: Vec<String> = topology.block_devices.iter().cloned().collect();
    writeln!(out, "block_devices:              {}", list_or_none(&devices)).ok();
    writeln!(out, "interrupted CPU groups:").ok();
    for device in &topology.net_devices {
        let group = topology.group(device).unwrap_or_default();
        writeln!(
            out,
            "  {:24}  {}",
            device,
            if group.is_empty() {
                "none".to_string()
            } else {
                format!("cpu {}", group.join(","))
            }
        )
        .ok();
    }
    writeln!(out, "moving average windows:").ok();
    for (name, secs) in sysload_exporter::history::WINDOWS {
        let window = LoadWindow::new(name, secs, topology.refresh_interval);
        writeln!(
            out,
            "  {:24}  {} samples, covers {}s of {}s",
            name,
            window.capacity(),
            window.effective_seconds(),
            window.window_seconds()
        )
        .ok();
    }

    out
}

/// Handler for the /config endpoint.
#[instrument(skip(state))]
pub async fn config_handler(State(state): State<SharedState>) -> impl IntoResponse {
    debug!("Processing /config request");
    state.health_stats.record_http_request();

    let mut out = String::new();
    writeln!(out, "SYSLOAD EXPORTER - CONFIGURATION").ok();
    writeln!(out, "================================").ok();
    writeln!(out).ok();
    out.push_str(&render_config_text(&state.config));
    writeln!(out).ok();
    out.push_str(&render_topology(&state.topology));
    writeln!(out).ok();
    writeln!(out, "{}", FOOTER_TEXT).ok();

    (
        StatusCode::OK,
        [("Content-Type", "text/plain; charset=utf-8")],
        out,
    )
}
