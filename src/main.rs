//! Port Relay - Entry Point
//!
//! Starts one relay per configured mapping and serves their statistics.

use anyhow::{Context, Result};
use std::path::PathBuf;
use std::sync::Arc;
use tokio::signal;
use tracing::{error, info, warn};

use port_relay::{Config, Server, VERSION};

/// Application entry point
fn main() -> Result<()> {
    // Parse command line arguments
    let config_path = std::env::args()
        .nth(1)
        .map(PathBuf::from)
        .unwrap_or_else(|| PathBuf::from("config.toml"));

    // Load configuration
    let config = Config::load(&config_path)
        .with_context(|| format!("Failed to load config from {:?}", config_path))?;

    // Initialize tracing/logging
    port_relay::util::init_tracing(&config.logging)?;

    let runtime = tokio::runtime::Builder::new_multi_thread()
        .worker_threads(config.server.effective_workers())
        .enable_all()
        .build()
        .context("Failed to build tokio runtime")?;

    runtime.block_on(run(config, config_path))
}

async fn run(config: Config, config_path: PathBuf) -> Result<()> {
    info!(
        version = VERSION,
        config_path = ?config_path,
        workers = config.server.effective_workers(),
        "Starting Port Relay"
    );

    // Initialize metrics if enabled
    if config.metrics.enabled {
        port_relay::metrics::init_metrics(&config.metrics)?;
        info!(
            bind_addr = %config.metrics.bind_addr,
            "Metrics endpoint started"
        );
    }

    let server = Arc::new(Server::with_relay_config(&config.relay));

    // A bad mapping is logged and skipped, the rest still start
    for mapping in &config.mappings {
        if let Err(e) = server.add_forwarder(mapping.clone()) {
            error!(
                from = %mapping.from,
                to = %mapping.to,
                protocol = %mapping.protocol,
                error = %e,
                "Failed to add forwarder"
            );
        }
    }

    if server.is_empty() {
        warn!("No relays running");
    }

    let api_addr = port_relay::metrics::start_api_server(config.api.bind_addr, server.clone()).await?;
    info!(
        relays = server.len(),
        "Visit http://{}/stats to view statistics",
        api_addr
    );

    shutdown_signal().await;
    info!("Shutdown signal received");
    server.shutdown().await;

    info!("Port Relay stopped");
    Ok(())
}

/// Wait for shutdown signal (Ctrl+C or SIGTERM)
async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = signal::ctrl_c().await {
            error!(error = %e, "Failed to listen for Ctrl+C");
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
                error!(error = %e, "Failed to install SIGTERM handler");
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
