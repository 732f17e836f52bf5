//! txpool-relayer - batching write relay for an EVM chain
//!
//! Accepts contract-write requests over HTTP, batches them on a fixed
//! tick, and relays signed transactions to the configured node.

use anyhow::{Context, Result};
use std::path::Path;
use std::sync::Arc;
use tokio::signal;
use tracing::{error, info};

use txpool_relayer::api::{self, AppState};
use txpool_relayer::codec;
use txpool_relayer::config::Settings;
use txpool_relayer::metrics::MetricsServer;
use txpool_relayer::pool::TransactionPool;
use txpool_relayer::rpc::HttpRpc;

#[tokio::main]
async fn main() -> Result<()> {
    // Initialize logging
    init_logging();

    info!("Starting txpool-relayer v{}", env!("CARGO_PKG_VERSION"));

    // Load configuration
    let settings = Settings::load()?;
    info!(
        "Loaded configuration for chain {} via {}",
        settings.chain.chain_id, settings.chain.rpc_url
    );

    // Connect to the node; this is the only fatal failure path
    let rpc = Arc::new(
        HttpRpc::connect(&settings.chain.rpc_url)
            .await
            .context("Failed to connect to the ledger node")?,
    );
    info!("Ledger connection established");

    // Parse the default call schema once at startup
    let default_abi = codec::load_abi(Path::new(&settings.codec.abi_path))
        .context("Failed to load call schema")?;

    // Construct the pool and start its scheduler
    let pool = TransactionPool::new(rpc, default_abi, &settings);
    let scheduler_handle = tokio::spawn(pool.clone().run());
    info!("Transaction pool scheduler running");

    // Start API server
    let api_handle = tokio::spawn({
        let config = settings.api.clone();
        let state = AppState::new(pool.clone(), &settings.wallet);
        async move {
            if let Err(e) = api::run_server(config, state).await {
                error!("API server error: {}", e);
            }
        }
    });

    // Start metrics server
    let metrics_handle = if settings.metrics.enabled {
        let server = MetricsServer::new(settings.metrics.port);
        Some(tokio::spawn(async move {
            if let Err(e) = server.run().await {
                error!("Metrics server error: {}", e);
            }
        }))
    } else {
        None
    };

    info!("txpool-relayer is running");
    info!("API server: http://{}:{}", settings.api.host, settings.api.port);
    if settings.metrics.enabled {
        info!("Metrics: http://0.0.0.0:{}/metrics", settings.metrics.port);
    }

    // Wait for shutdown signal
    shutdown_signal().await;

    info!("Shutdown signal received, stopping...");

    // Graceful shutdown: the in-flight batch completes, then tasks end
    pool.stop().await;
    let _ = scheduler_handle.await;

    api_handle.abort();
    if let Some(h) = metrics_handle {
        h.abort();
    }

    info!("txpool-relayer stopped");
    Ok(())
}

fn init_logging() {
    use tracing_subscriber::{fmt, prelude::*, EnvFilter};

    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new("info,txpool_relayer=debug,hyper=warn"));

    tracing_subscriber::registry()
        .with(filter)
        .with(fmt::layer().with_target(true).with_thread_ids(true))
        .init();
}

async fn shutdown_signal() {
    let ctrl_c = async {
        signal::ctrl_c()
            .await
            .expect("Failed to install Ctrl+C handler");
    };

    #[cfg(unix)]
    let terminate = async {
        signal::unix::signal(signal::unix::SignalKind::terminate())
            .expect("Failed to install signal handler")
            .recv()
            .await;
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }
}
