//! Chorus Server - Standalone headless server for Chorus playback sessions.
//!
//! Serves the session command API over HTTP, backed by an in-memory track
//! library and a simulated transport. Bots that own a real voice transport
//! embed `chorus-core` directly instead.

mod config;

use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{anyhow, Context, Result};
use chorus_core::{bootstrap_services, start_server, LibraryCatalog, SimulatedTransport};
use clap::Parser;
use tokio::signal;

use crate::config::ServerConfig;

/// Chorus Server - Headless per-group playback session server.
#[derive(Parser, Debug)]
#[command(name = "chorus-server")]
#[command(author, version, about, long_about = None)]
struct Args {
    /// Path to the configuration file (YAML).
    #[arg(short, long, value_name = "FILE")]
    config: Option<PathBuf>,

    /// Log level (error, warn, info, debug, trace).
    #[arg(short, long, default_value = "info", env = "CHORUS_LOG_LEVEL")]
    log_level: log::LevelFilter,

    /// Bind port (overrides config file).
    #[arg(short = 'p', long, env = "CHORUS_BIND_PORT")]
    port: Option<u16>,
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    // Initialize logging
    env_logger::Builder::new()
        .filter_level(args.log_level)
        .format_timestamp_millis()
        .init();

    log::info!("Chorus Server v{}", env!("CARGO_PKG_VERSION"));

    // Load configuration
    let mut config =
        ServerConfig::load(args.config.as_deref()).context("Failed to load configuration")?;

    // Apply CLI overrides
    if let Some(port) = args.port {
        config.bind_port = port;
    }

    log::info!(
        "Configuration: bind_port={}, library={} track(s), idle_timeout={}s",
        config.bind_port,
        config.library.len(),
        config.session.idle_timeout_secs
    );
    if config.library.is_empty() {
        log::warn!("Track library is empty - every search will return no match");
    }

    let transport = SimulatedTransport::new(config.transport_config())
        .with_lengths(config.track_lengths());
    let catalog = LibraryCatalog::new(std::mem::take(&mut config.library));

    let services = bootstrap_services(
        config.session.clone(),
        Arc::new(catalog),
        Arc::new(transport),
    )
    .map_err(|e| anyhow!(e))
    .context("Failed to bootstrap services")?;

    log::info!("Services bootstrapped successfully");

    services.log_events();

    // Start background tasks (idle sweeper)
    services.start_background_tasks();

    // The server stops accepting requests on this token before sessions are closed.
    let server_shutdown = services.cancel_token.child_token();
    let server_handle = tokio::spawn(start_server(
        services.app_state(),
        config.bind_port,
        server_shutdown.clone(),
    ));

    tokio::select! {
        _ = shutdown_signal() => {
            log::info!("Shutdown signal received, cleaning up...");
        }
        result = server_handle => {
            match result {
                Ok(Ok(())) => log::warn!("HTTP server exited"),
                Ok(Err(e)) => log::error!("Server error: {}", e),
                Err(e) => log::error!("Server task failed: {}", e),
            }
        }
    }

    server_shutdown.cancel();

    // Graceful shutdown
    services.shutdown().await;

    log::info!("Shutdown complete");
    Ok(())
}

/// Waits for a shutdown signal (Ctrl+C or SIGTERM).
async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = signal::ctrl_c().await {
            log::error!("Failed to install Ctrl+C handler: {}", e);
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut sigterm) => {
                sigterm.recv().await;
            }
            Err(e) => {
                log::error!("Failed to install SIGTERM handler: {}", e);
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }
}
