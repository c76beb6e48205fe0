//! Configuration management for sysload-exporter.
//!
//! This module handles loading, merging, and validating configuration from files
//! and CLI arguments. It supports YAML, JSON, and TOML formats.

use crate::cli::{Args, ConfigFormat};
use once_cell::sync::Lazy;
use regex::Regex;
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};
use sysload_exporter::probe::DEFAULT_IRQ_EXCLUDE;
use sysload_exporter::source::DEFAULT_PROC_ROOT;
use sysload_exporter::topology::{
    DiscoveryOptions, DEFAULT_NET_DEVICES, DEFAULT_REFRESH_INTERVAL, DEFAULT_THRESHOLD,
};
use tracing::info;

// Default configuration constants
pub const DEFAULT_BIND_ADDR: &str = "0.0.0.0";
pub const DEFAULT_PORT: u16 = 5000;
pub const DEFAULT_NAMESPACE: &str = "sysload";

const DEFAULT_CONFIG_LOCATIONS: &[&str] = &[
    "/etc/sysload/exporter.yaml",
    "/etc/sysload/exporter.yml",
    "/etc/sysload/exporter.json",
    "./sysload-exporter.yaml",
    "./sysload-exporter.yml",
    "./sysload-exporter.json",
];

static METRIC_NAMESPACE_RE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"^[a-zA-Z_:][a-zA-Z0-9_:]*$").expect("namespace pattern is valid")
});

/// Effective exporter configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    // Server configuration
    pub port: Option<u16>,
    pub bind: Option<String>,

    // Sampling
    #[serde(alias = "refresh-interval")]
    pub refresh_interval: Option<u64>,
    pub threshold: Option<f64>,
    #[serde(alias = "proc-root")]
    pub proc_root: Option<PathBuf>,
    pub namespace: Option<String>,

    // Topology discovery
    /// Explicit block devices; unset means auto-discovery
    #[serde(alias = "block-devices")]
    pub block_devices: Option<Vec<String>>,
    /// Regex for whole-disk names used by auto-discovery
    #[serde(alias = "block-device-pattern")]
    pub block_device_pattern: Option<String>,
    #[serde(alias = "net-devices")]
    pub net_devices: Option<Vec<String>>,
    /// Regex template for interrupt rows, `{device}` is replaced by the device name
    #[serde(alias = "irq-match")]
    pub irq_match: Option<String>,
    /// Interrupt rows containing any of these substrings are ignored
    #[serde(alias = "irq-exclude")]
    pub irq_exclude: Option<Vec<String>>,

    // Logging
    pub log_level: Option<String>,

    // Feature flags
    #[serde(alias = "enable-health")]
    pub enable_health: Option<bool>,

    // TLS/SSL Configuration
    #[serde(alias = "enable-tls")]
    pub enable_tls: Option<bool>,
    #[serde(alias = "tls-cert-path")]
    pub tls_cert_path: Option<String>,
    #[serde(alias = "tls-key-path")]
    pub tls_key_path: Option<String>,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            port: Some(DEFAULT_PORT),
            bind: Some(DEFAULT_BIND_ADDR.to_string()),
            refresh_interval: Some(DEFAULT_REFRESH_INTERVAL),
            threshold: Some(DEFAULT_THRESHOLD),
            proc_root: Some(PathBuf::from(DEFAULT_PROC_ROOT)),
            namespace: Some(DEFAULT_NAMESPACE.to_string()),
            block_devices: None,
            block_device_pattern: None,
            net_devices: Some(DEFAULT_NET_DEVICES.iter().map(|s| s.to_string()).collect()),
            irq_match: None,
            irq_exclude: Some(DEFAULT_IRQ_EXCLUDE.iter().map(|s| s.to_string()).collect()),
            log_level: Some("info".into()),
            enable_health: Some(true),
            enable_tls: Some(false),
            tls_cert_path: None,
            tls_key_path: None,
        }
    }
}

impl Config {
    pub fn port(&self) -> u16 {
        self.port.unwrap_or(DEFAULT_PORT)
    }

    pub fn bind(&self) -> &str {
        self.bind.as_deref().unwrap_or(DEFAULT_BIND_ADDR)
    }

    pub fn namespace(&self) -> &str {
        self.namespace.as_deref().unwrap_or(DEFAULT_NAMESPACE)
    }

    pub fn refresh_interval(&self) -> u64 {
        self.refresh_interval.unwrap_or(DEFAULT_REFRESH_INTERVAL)
    }

    pub fn health_enabled(&self) -> bool {
        self.enable_health.unwrap_or(true)
    }

    pub fn tls_enabled(&self) -> bool {
        self.enable_tls.unwrap_or(false)
    }

    /// Discovery inputs with defaults filled in for unset fields.
    pub fn to_discovery_options(&self) -> DiscoveryOptions {
        let defaults = DiscoveryOptions::default();
        DiscoveryOptions {
            proc_root: self.proc_root.clone().unwrap_or(defaults.proc_root),
            refresh_interval: self.refresh_interval(),
            threshold: self.threshold.unwrap_or(defaults.threshold),
            block_devices: self.block_devices.clone(),
            block_device_pattern: self.block_device_pattern.clone(),
            net_devices: self.net_devices.clone().unwrap_or(defaults.net_devices),
            irq_match: self.irq_match.clone(),
            irq_exclude: self.irq_exclude.clone().unwrap_or(defaults.irq_exclude),
        }
    }
}

/// Splits a comma-separated CLI list, dropping blank entries.
fn split_list(value: &str) -> Vec<String> {
    value
        .split(',')
        .map(|s| s.trim().to_string())
        .filter(|s| !s.is_empty())
        .collect()
}

/// Validate effective config (used by --check-config and at startup)
pub fn validate_effective_config(cfg: &Config) -> Result<(), Box<dyn std::error::Error>> {
    cfg.to_discovery_options().validate()?;

    if let Some(pattern) = cfg.block_device_pattern.as_deref() {
        Regex::new(pattern)
            .map_err(|e| format!("Invalid block_device_pattern '{}': {}", pattern, e))?;
    }

    let namespace = cfg.namespace();
    if !METRIC_NAMESPACE_RE.is_match(namespace) {
        return Err(format!("Invalid metric namespace '{}'", namespace).into());
    }

    if cfg.bind().parse::<std::net::IpAddr>().is_err() {
        return Err(format!("Invalid bind address '{}'", cfg.bind()).into());
    }

    // TLS validation
    if cfg.tls_enabled() {
        let cert_path = cfg.tls_cert_path.as_deref();
        let key_path = cfg.tls_key_path.as_deref();

        match (cert_path, key_path) {
            (None, None) => {
                return Err(
                    "TLS is enabled but neither tls_cert_path nor tls_key_path are set".into(),
                );
            }
            (Some(_), None) => {
                return Err("TLS is enabled but tls_key_path is not set".into());
            }
            (None, Some(_)) => {
                return Err("TLS is enabled but tls_cert_path is not set".into());
            }
            (Some(cert), Some(key)) => {
                check_pem_file("certificate", cert)?;
                check_pem_file("private key", key)?;
            }
        }
    }

    Ok(())
}

fn check_pem_file(kind: &str, path: &str) -> Result<(), Box<dyn std::error::Error>> {
    match fs::metadata(path) {
        Ok(meta) if meta.len() == 0 => Err(format!("TLS {} file is empty: {}", kind, path).into()),
        Ok(_) => Ok(()),
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
            Err(format!("TLS {} file not found: {}", kind, path).into())
        }
        Err(e) => Err(format!("TLS {} file is not readable: {} ({})", kind, path, e).into()),
    }
}

/// Resolves configuration from CLI args, config file, and defaults.
/// This enforces precedence: CLI (if provided) > config file > default.
pub fn resolve_config(args: &Args) -> Result<Config, Box<dyn std::error::Error>> {
    let mut config = if args.no_config {
        Config::default()
    } else {
        load_config(args.config.as_deref())?
    };

    if let Some(bind_ip) = args.bind {
        config.bind = Some(bind_ip.to_string());
    }
    if let Some(cli_port) = args.port {
        config.port = Some(cli_port);
    }

    // Sampling overrides
    if let Some(interval) = args.refresh_interval {
        config.refresh_interval = Some(interval);
    }
    if let Some(threshold) = args.threshold {
        config.threshold = Some(threshold);
    }
    if let Some(root) = &args.proc_root {
        config.proc_root = Some(root.clone());
    }
    if let Some(namespace) = &args.namespace {
        config.namespace = Some(namespace.clone());
    }

    // Comma-separated device lists
    if let Some(devices) = &args.block_devices {
        config.block_devices = Some(split_list(devices));
    }
    if let Some(devices) = &args.net_devices {
        config.net_devices = Some(split_list(devices));
    }

    if args.disable_health {
        config.enable_health = Some(false);
    }

    // TLS configuration: CLI wins if provided
    if args.enable_tls {
        config.enable_tls = Some(true);
    }
    if let Some(cert_path) = &args.tls_cert {
        config.tls_cert_path = Some(cert_path.to_string_lossy().to_string());
    }
    if let Some(key_path) = &args.tls_key {
        config.tls_key_path = Some(key_path.to_string_lossy().to_string());
    }

    Ok(config)
}

/// Loads a config file, or the first default location that exists.
///
/// Without an explicit path and without any default file the built-in
/// defaults are returned. An explicit path that does not exist is an error.
pub fn load_config(path: Option<&Path>) -> Result<Config, Box<dyn std::error::Error>> {
    let path = match path {
        Some(p) => {
            if !p.exists() {
                return Err(format!("Config file not found: {}", p.display()).into());
            }
            p.to_path_buf()
        }
        None => match DEFAULT_CONFIG_LOCATIONS
            .iter()
            .map(Path::new)
            .find(|p| p.exists())
        {
            Some(p) => p.to_path_buf(),
            None => return Ok(Config::default()),
        },
    };

    let content = fs::read_to_string(&path)?;

    match path.extension().and_then(|s| s.to_str()) {
        Some("json") => {
            let config: Config = serde_json::from_str(&content)?;
            info!("Loaded JSON configuration from: {}", path.display());
            Ok(config)
        }
        Some("toml") => {
            let config: Config = toml::from_str(&content)?;
            info!("Loaded TOML configuration from: {}", path.display());
            Ok(config)
        }
        _ => {
            // Default to YAML
            let config: Config = serde_yaml::from_str(&content)?;
            info!("Loaded YAML configuration from: {}", path.display());
            Ok(config)
        }
    }
}

/// Serializes configuration in the requested format
pub fn render_config(
    config: &Config,
    format: &ConfigFormat,
) -> Result<String, Box<dyn std::error::Error>> {
    Ok(match format {
        ConfigFormat::Json => serde_json::to_string_pretty(config)?,
        ConfigFormat::Toml => toml::to_string_pretty(config)?,
        ConfigFormat::Yaml => serde_yaml::to_string(config)?,
    })
}

/// Shows configuration in requested format
pub fn show_config(config: &Config, format: &ConfigFormat) -> Result<(), Box<dyn std::error::Error>> {
    println!("{}", render_config(config, format)?);
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::Parser;

    #[test]
    fn test_default_config_is_valid() {
        let config = Config::default();
        assert!(validate_effective_config(&config).is_ok());
        let opts = config.to_discovery_options();
        assert_eq!(opts.refresh_interval, 15);
        assert_eq!(opts.threshold, 40.0);
        assert_eq!(opts.net_devices, vec!["eth0", "eth1", "eth2", "eth3"]);
        assert!(opts.block_devices.is_none());
    }

    #[test]
    fn test_load_yaml_partial_config() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("exporter.yaml");
        fs::write(
            &path,
            "refresh_interval: 5\nthreshold: 25.0\nnet-devices: [bond0]\nblock_devices: [sda, sdb]\n",
        )
        .unwrap();

        let config = load_config(Some(&path)).unwrap();
        assert_eq!(config.refresh_interval, Some(5));
        assert_eq!(config.port(), DEFAULT_PORT);

        let opts = config.to_discovery_options();
        assert_eq!(opts.threshold, 25.0);
        assert_eq!(opts.net_devices, vec!["bond0"]);
        assert_eq!(opts.block_devices, Some(vec!["sda".into(), "sdb".into()]));
        assert_eq!(opts.irq_exclude, vec!["tx"]);
    }

    #[test]
    fn test_load_json_and_toml() {
        let dir = tempfile::tempdir().unwrap();
        let json = dir.path().join("exporter.json");
        fs::write(&json, r#"{"port": 9100, "namespace": "node_sysload"}"#).unwrap();
        let config = load_config(Some(&json)).unwrap();
        assert_eq!(config.port(), 9100);
        assert_eq!(config.namespace(), "node_sysload");

        let toml_path = dir.path().join("exporter.toml");
        fs::write(&toml_path, "refresh_interval = 30\nirq_exclude = [\"tx\", \"fdir\"]\n").unwrap();
        let config = load_config(Some(&toml_path)).unwrap();
        assert_eq!(config.refresh_interval(), 30);
        assert_eq!(config.irq_exclude, Some(vec!["tx".into(), "fdir".into()]));
    }

    #[test]
    fn test_load_missing_explicit_file_fails() {
        let dir = tempfile::tempdir().unwrap();
        assert!(load_config(Some(&dir.path().join("nope.yaml"))).is_err());
    }

    #[test]
    fn test_cli_overrides_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("exporter.yaml");
        fs::write(&path, "refresh_interval: 5\nport: 7000\n").unwrap();

        let args = Args::parse_from([
            "sysload-exporter",
            "--config",
            path.to_str().unwrap(),
            "--refresh-interval",
            "10",
            "--block-devices",
            "sda, ,sdb",
        ]);
        let config = resolve_config(&args).unwrap();
        assert_eq!(config.refresh_interval(), 10);
        assert_eq!(config.port(), 7000);
        assert_eq!(config.block_devices, Some(vec!["sda".into(), "sdb".into()]));
    }

    #[test]
    fn test_validation_rejects_bad_values() {
        let config = Config {
            refresh_interval: Some(60),
            ..Config::default()
        };
        assert!(validate_effective_config(&config).is_err());

        let config = Config {
            namespace: Some("sys-load".into()),
            ..Config::default()
        };
        assert!(validate_effective_config(&config).is_err());

        let config = Config {
            block_device_pattern: Some("(".into()),
            ..Config::default()
        };
        assert!(validate_effective_config(&config).is_err());

        let config = Config {
            enable_tls: Some(true),
            tls_cert_path: Some("/nonexistent/cert.pem".into()),
            ..Config::default()
        };
        assert!(validate_effective_config(&config).is_err());
    }

    #[test]
    fn test_render_config_formats() {
        let config = Config::default();
        for format in [ConfigFormat::Yaml, ConfigFormat::Json, ConfigFormat::Toml] {
            let rendered = render_config(&config, &format).unwrap();
            assert!(rendered.contains("refresh_interval"));
        }
    }
}
