//! Config command implementation.
//!
//! Generates configuration files in various formats.

use std::fs;
use std::path::PathBuf;

use crate::cli::ConfigFormat;
use crate::config::{render_config, Config};

/// Generates configuration files.
pub fn command_config(
    output: Option<PathBuf>,
    format: ConfigFormat,
    commented: bool,
) -> Result<(), Box<dyn std::error::Error>> {
    let config = Config::default();
    let output = output.unwrap_or_else(|| PathBuf::from("sysload-exporter.yaml"));

    let mut content = render_config(&config, &format)?;
    if commented && matches!(format, ConfigFormat::Yaml) {
        content = add_config_comments(content);
    }

    if output.to_string_lossy() == "-" {
        print!("{}", content);
    } else {
        fs::write(&output, content)?;
        println!("✅ Configuration written to: {}", output.display());
    }

    Ok(())
}

/// Adds comments to YAML configuration.
fn add_config_comments(yaml: String) -> String {
    let comments = r#"# Sysload Exporter Configuration
# ==============================
#
# Server Configuration
# --------------------
# bind: "0.0.0.0"              # Bind IP (0.0.0.0 = all interfaces)
# port: 5000                   # HTTP port
# namespace: "sysload"         # Prefix of every exported metric
#
# Sampling
# --------
# refresh_interval: 15         # Seconds between samples (1-30)
# threshold: 40.0              # intr+sintr+system (%) above which the busiest
#                              # network device's CPU usage counts towards sysload
# proc_root: "/proc"           # Where diskstats, cpuinfo, interrupts and stat live
#
# Topology Discovery
# ------------------
# block_devices: null          # Explicit device list, null = auto-discovery
# block_device_pattern: null   # Regex for auto-discovered whole disks
# net_devices: [eth0, eth1, eth2, eth3]
# irq_match: null              # Regex template, {device} = device name; null = substring match
# irq_exclude: [tx]            # Interrupt rows containing these are ignored
#
# Feature Flags
# -------------
# enable_health: true          # Enable /health endpoint
#
# Logging
# -------
# log_level: "info"            # off, error, warn, info, debug, trace
#
# TLS/SSL Configuration
# ---------------------
# enable_tls: false            # Enable HTTPS (default: false)
# tls_cert_path: null          # Path to TLS certificate (PEM format)
# tls_key_path: null           # Path to TLS private key (PEM format)
"#;

    format!("{comments}\n{yaml}")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_command_config_writes_loadable_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("generated.yaml");

        command_config(Some(path.clone()), ConfigFormat::Yaml, true).unwrap();

        let content = fs::read_to_string(&path).unwrap();
        assert!(content.starts_with("# Sysload Exporter Configuration"));
        let loaded = crate::config::load_config(Some(&path)).unwrap();
        assert_eq!(loaded.refresh_interval(), 15);
        assert_eq!(loaded.port(), 5000);
    }
}
