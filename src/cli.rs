//! CLI arguments and subcommands for sysload-exporter.
//!
//! This module defines the command-line interface structure using the clap library,
//! including all flags, options, and subcommands.

use clap::{Parser, Subcommand, ValueEnum};
use std::net::IpAddr;
use std::path::PathBuf;

/// Log level options for CLI parsing
#[derive(Debug, Clone, ValueEnum)]
pub enum LogLevel {
    Off,
    Error,
    Warn,
    Info,
    Debug,
    Trace,
}

/// Configuration format options for output
#[derive(Debug, Clone, ValueEnum)]
pub enum ConfigFormat {
    Yaml,
    Json,
    Toml,
}

/// Main CLI arguments structure
#[derive(Parser, Debug)]
#[command(
    name = "sysload-exporter",
    about = "Prometheus exporter for a composite system saturation (sysload) estimate",
    long_about = "Prometheus exporter for a composite system saturation (sysload) estimate.\n\n\
                  Samples disk, CPU and interrupt counters from procfs, attributes softirq \
                  load to the busiest network device and publishes a single sysload \
                  percentage together with 1/5/15-minute moving averages.",
    version,
    propagate_version = true
)]
pub struct Args {
    #[command(subcommand)]
    pub command: Option<Commands>,

    /// HTTP listen port
    #[arg(short = 'p', long)]
    pub port: Option<u16>,

    /// Bind to specific interface/IP
    #[arg(long)]
    pub bind: Option<IpAddr>,

    /// Log level
    #[arg(long, value_enum, default_value = "info")]
    pub log_level: LogLevel,

    /// Config file (YAML/JSON/TOML)
    #[arg(short = 'c', long)]
    pub config: Option<PathBuf>,

    /// Disable all config file loading
    #[arg(long)]
    pub no_config: bool,

    /// Print effective merged config and exit
    #[arg(long)]
    pub show_config: bool,

    /// Output format for --show-config
    #[arg(long, value_enum, default_value = "yaml")]
    pub config_format: ConfigFormat,

    /// Validate config and exit (return code 1 on error)
    #[arg(long)]
    pub check_config: bool,

    /// Seconds between samples (1-30)
    #[arg(short = 'r', long)]
    pub refresh_interval: Option<u64>,

    /// Interrupt CPU load (%) above which the busiest device's CPU usage counts
    #[arg(long)]
    pub threshold: Option<f64>,

    /// Root of the procfs counter sources
    #[arg(long)]
    pub proc_root: Option<PathBuf>,

    /// Prefix for every exported metric name
    #[arg(long)]
    pub namespace: Option<String>,

    /// Block devices to track, comma-separated (disables auto-discovery)
    #[arg(long)]
    pub block_devices: Option<String>,

    /// Network devices to probe for interrupt groups, comma-separated
    #[arg(long)]
    pub net_devices: Option<String>,

    /// Disable /health endpoint
    #[arg(long)]
    pub disable_health: bool,

    /// Enable TLS/SSL for HTTPS
    #[arg(long)]
    pub enable_tls: bool,

    /// Path to TLS certificate file (PEM format)
    #[arg(long)]
    pub tls_cert: Option<PathBuf>,

    /// Path to TLS private key file (PEM format)
    #[arg(long)]
    pub tls_key: Option<PathBuf>,
}

/// Subcommands for additional functionality
#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Verify the counter sources and print the discovered topology
    Check,

    /// Generate configuration files
    Config {
        /// Output file path ("-" for stdout)
        #[arg(short = 'o', long)]
        output: Option<PathBuf>,

        /// Output format
        #[arg(long, value_enum, default_value = "yaml")]
        format: ConfigFormat,

        /// Include comments and examples
        #[arg(long)]
        commented: bool,
    },

    /// Run a few sampling ticks and print the published values
    Test {
        /// Number of ticks after the baseline sample
        #[arg(short = 'n', long, default_value_t = 1)]
        iterations: usize,

        /// Also print per-device values that are not exported
        #[arg(long)]
        verbose: bool,
    },
}
