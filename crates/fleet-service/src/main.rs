//! Fleet Health Monitor - Main Entry Point

use fleet_service::config::ServiceConfig;
use fleet_service::FleetMonitor;
use std::sync::Arc;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::registry()
        .with(tracing_subscriber::EnvFilter::new(
            std::env::var("RUST_LOG").unwrap_or_else(|_| "info".into()),
        ))
        .with(tracing_subscriber::fmt::layer())
        .init();

    tracing::info!("fleet health monitor v{}", env!("CARGO_PKG_VERSION"));

    let config = ServiceConfig::load();
    let monitor = Arc::new(FleetMonitor::new(config));

    if let Err(err) = monitor.check_persistence().await {
        tracing::error!(error = %err, "persistence unreachable at startup, exiting");
        std::process::exit(1);
    }

    let shutdown_monitor = monitor.clone();
    tokio::spawn(async move {
        let _ = tokio::signal::ctrl_c().await;
        tracing::info!("shutdown signal received");
        shutdown_monitor.shutdown();
    });

    monitor.run().await;

    tracing::info!("fleet health monitor shut down cleanly");
    Ok(())
}
