//! # Cache Gateway - Main Entry Point
//!
//! Loads the YAML configuration named by `CACHE_GATEWAY_CONFIG` (or the first
//! command-line argument), initializes logging, connects the backends and
//! serves until SIGTERM or Ctrl+C.

use anyhow::Context;
use tokio::signal;
use tracing::info;

use cache_gateway::{init_logging, GatewayConfig, GatewayServer};

const DEFAULT_CONFIG_PATH: &str = "config/cache-gateway.yaml";

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let config_path = std::env::args()
        .nth(1)
        .or_else(|| std::env::var("CACHE_GATEWAY_CONFIG").ok())
        .unwrap_or_else(|| DEFAULT_CONFIG_PATH.to_string());

    let config = GatewayConfig::load_from_file(&config_path)
        .await
        .with_context(|| format!("Failed to load configuration from {}", config_path))?;

    init_logging(&config.logging)?;
    info!("🚀 Starting cache gateway");
    info!(version = env!("CARGO_PKG_VERSION"), config = %config_path, "📋 Configuration loaded");

    let server = GatewayServer::new(config)
        .await
        .context("Failed to initialize cache gateway")?;

    server.start(shutdown_signal()).await?;

    info!("✅ Cache gateway shutdown complete");
    Ok(())
}

async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = signal::ctrl_c().await {
            tracing::error!(error = %e, "failed to listen for Ctrl+C");
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
                tracing::error!(error = %e, "failed to install SIGTERM handler");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => info!("📡 Received SIGINT (Ctrl+C), initiating graceful shutdown..."),
        _ = terminate => info!("📡 Received SIGTERM, initiating graceful shutdown..."),
    }
}
