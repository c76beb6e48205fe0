//! sysload-exporter
//!
//! Composite system saturation exporter with tracing logging.
//! This is the main entry point that initializes the server and handles subcommands.

mod cli;
mod commands;
mod config;
mod handlers;
mod metrics;
mod scheduler;
mod startup_checks;
mod state;

use axum::{routing::get, Router};
use axum_server::tls_rustls::RustlsConfig;
use clap::Parser;
use prometheus::Registry;
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Instant;
use sysload_exporter::engine::published_keys;
use sysload_exporter::health_stats::HealthStats;
use sysload_exporter::{SysloadEngine, TopologyConfig};
use tokio::{net::TcpListener, signal};
use tracing::{debug, error, info, Level};

use cli::{Args, Commands, LogLevel};
use commands::{command_check, command_config, command_test};
use config::{resolve_config, show_config, validate_effective_config, Config};
use handlers::{config_handler, health_handler, metrics_handler, root_handler};
use metrics::SysloadMetrics;
use state::{AppState, SharedState};

/// Initializes tracing logging subsystem with configured log level.
///
/// An explicit `--log-level` wins; otherwise `log_level` from the config file
/// is used.
fn setup_logging(config: &Config, args: &Args) {
    let from_config = config
        .log_level
        .as_deref()
        .and_then(|lvl| <LogLevel as clap::ValueEnum>::from_str(lvl, true).ok());
    let level = match (&args.log_level, from_config) {
        (LogLevel::Info, Some(configured)) => configured,
        (cli, _) => cli.clone(),
    };

    let max_level = match level {
        LogLevel::Off => None,
        LogLevel::Error => Some(Level::ERROR),
        LogLevel::Warn => Some(Level::WARN),
        LogLevel::Info => Some(Level::INFO),
        LogLevel::Debug => Some(Level::DEBUG),
        LogLevel::Trace => Some(Level::TRACE),
    };
    let Some(max_level) = max_level else {
        return;
    };

    let subscriber = tracing_subscriber::fmt()
        .with_max_level(max_level)
        .with_target(true)
        .with_thread_ids(false)
        .with_file(true)
        .with_line_number(true)
        .finish();

    if tracing::subscriber::set_global_default(subscriber).is_err() {
        eprintln!("Tracing subscriber already installed");
        return;
    }

    info!("Logging initialized with level: {:?}", level);
}

/// Helper function to load and validate configuration.
/// Exits the process with error code 1 if validation fails.
fn load_validated_config(args: &Args) -> Result<Config, Box<dyn std::error::Error>> {
    let config = resolve_config(args)?;
    if let Err(e) = validate_effective_config(&config) {
        eprintln!("❌ Configuration invalid: {}", e);
        std::process::exit(1);
    }
    Ok(config)
}

/// Resolves on Ctrl+C or SIGTERM.
async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = signal::ctrl_c().await {
            error!("Failed to install Ctrl+C handler: {}", e);
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut sig) => {
                sig.recv().await;
            }
            Err(e) => {
                error!("Failed to install SIGTERM handler: {}", e);
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {
            info!("Received SIGINT (Ctrl+C), shutting down gracefully...");
        }
        _ = terminate => {
            info!("Received SIGTERM, shutting down gracefully...");
        }
    }
}

/// Main application entry point.
#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let args = Args::parse();

    // Early config resolution for show/check modes
    if args.show_config || args.check_config {
        let config = resolve_config(&args)?;

        if args.check_config {
            if let Err(e) = validate_effective_config(&config) {
                eprintln!("❌ Configuration invalid: {}", e);
                std::process::exit(1);
            }
            println!("✅ Configuration is valid");
            return Ok(());
        }

        return show_config(&config, &args.config_format);
    }

    // Handle subcommands
    if let Some(command) = &args.command {
        if let Commands::Config {
            output,
            format,
            commented,
        } = command
        {
            return command_config(output.clone(), format.clone(), *commented);
        }

        let config = load_validated_config(&args)?;
        setup_logging(&config, &args);

        return match command {
            Commands::Check => command_check(&config),
            Commands::Test {
                iterations,
                verbose,
            } => command_test(*iterations, *verbose, &config),
            Commands::Config { .. } => Ok(()),
        };
    }

    // Load configuration for main server mode
    let config = load_validated_config(&args)?;

    setup_logging(&config, &args);

    info!("Starting sysload-exporter {}", env!("CARGO_PKG_VERSION"));

    let opts = config.to_discovery_options();
    if let Err(e) = startup_checks::validate_requirements(&opts.proc_root) {
        error!("❌ Startup validation failed: {}", e);
        std::process::exit(1);
    }

    // Topology is fixed for the lifetime of the process
    let topology = match TopologyConfig::discover(&opts) {
        Ok(topology) => Arc::new(topology),
        Err(e) => {
            error!("❌ Topology discovery failed: {}", e);
            std::process::exit(1);
        }
    };

    let mut engine = SysloadEngine::new(Arc::clone(&topology));
    if let Err(e) = engine.prime() {
        error!("❌ Baseline sample failed: {}", e);
        std::process::exit(1);
    }

    // Initialize Prometheus metrics registry
    let registry = Registry::new();
    let metrics = SysloadMetrics::new(&registry, config.namespace(), &published_keys(&topology))?;
    debug!("{} engine gauges registered", metrics.len());

    let state: SharedState = Arc::new(AppState {
        registry,
        metrics,
        config: Arc::new(config.clone()),
        topology: Arc::clone(&topology),
        health_stats: Arc::new(HealthStats::new()),
        start_time: Instant::now(),
    });

    let sampler = scheduler::spawn_sampler(engine, Arc::clone(&state));

    // Configure HTTP server routes
    let addr: SocketAddr = format!("{}:{}", config.bind(), config.port()).parse()?;

    let mut app = Router::new()
        .route("/", get(root_handler))
        .route("/metrics", get(metrics_handler))
        .route("/config", get(config_handler));

    if config.health_enabled() {
        app = app.route("/health", get(health_handler));
    }

    let app = app.with_state(state);

    if config.tls_enabled() {
        // validate_effective_config() guarantees both paths are set
        let (Some(cert_path), Some(key_path)) = (&config.tls_cert_path, &config.tls_key_path)
        else {
            return Err("TLS is enabled but certificate or key path is missing".into());
        };

        info!("Loading TLS certificate from: {}", cert_path);
        info!("Loading TLS private key from: {}", key_path);

        let tls_config = RustlsConfig::from_pem_file(cert_path, key_path)
            .await
            .map_err(|e| {
                error!("Failed to load TLS configuration: {}", e);
                e
            })?;

        info!("sysload-exporter listening on https://{}", addr);

        let server = axum_server::bind_rustls(addr, tls_config).serve(app.into_make_service());

        tokio::select! {
            result = server => {
                if let Err(e) = result {
                    error!("Server error: {}", e);
                    return Err(e.into());
                }
            }
            _ = shutdown_signal() => {
                info!("Shutdown signal received, exiting...");
            }
        }
    } else {
        let listener = TcpListener::bind(addr).await?;
        info!("sysload-exporter listening on http://{}", addr);

        let server = axum::serve(listener, app).with_graceful_shutdown(shutdown_signal());

        if let Err(e) = server.await {
            error!("Server error: {}", e);
            return Err(e.into());
        }
    }

    sampler.abort();
    info!("sysload-exporter stopped gracefully");
    Ok(())
}
