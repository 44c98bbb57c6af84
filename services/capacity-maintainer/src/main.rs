//! Capacity maintainer
//!
//! Periodically checks that the fleet can absorb the configured number of
//! host failures, retiring and redeploying nodes when it cannot.

use std::sync::Arc;

use anyhow::Result;
use fleet_capacity::SpareCapacityMaintainer;
use fleet_capacity_maintainer::{
    config,
    dry_run::{LoggingDeployer, LoggingMetric},
    snapshot::FleetSnapshot,
    worker::MaintenanceWorker,
};
use tokio::sync::watch;
use tracing::{error, info, warn};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

#[tokio::main]
async fn main() -> Result<()> {
    // Load configuration
    let config = config::Config::from_env()?;

    // Initialize tracing (prefer RUST_LOG, fallback to FLEET_LOG_LEVEL)
    tracing_subscriber::registry()
        .with(EnvFilter::try_from_default_env().unwrap_or_else(|_| config.log_level.clone().into()))
        .with(tracing_subscriber::fmt::layer().json())
        .init();

    info!("Starting capacity maintainer");
    info!(
        snapshot = %config.snapshot_path.display(),
        spare_target = config.maintainer.spare_target,
        max_iterations = config.maintainer.max_iterations,
        "Configuration loaded"
    );

    let repository = match FleetSnapshot::load(&config.snapshot_path)
        .await
        .and_then(FleetSnapshot::into_repository)
    {
        Ok(repository) => Arc::new(repository),
        Err(e) => {
            error!(error = %e, "Failed to load fleet snapshot");
            return Err(e);
        }
    };

    let maintainer = SpareCapacityMaintainer::new(
        repository,
        Arc::new(LoggingDeployer::new()),
        Arc::new(LoggingMetric::new()),
        config.maintainer.clone(),
    );

    // Create shutdown channel for graceful shutdown
    let (shutdown_tx, shutdown_rx) = watch::channel(false);

    // Start maintenance worker in background
    let worker = MaintenanceWorker::new(maintainer);
    let worker_handle = tokio::spawn(async move {
        worker.run(shutdown_rx).await;
    });

    // Wait for shutdown signal (Ctrl+C)
    tokio::signal::ctrl_c().await?;
    info!("Received shutdown signal");

    // Signal shutdown to the worker
    let _ = shutdown_tx.send(true);

    let shutdown_timeout = std::time::Duration::from_secs(10);
    if let Err(e) = tokio::time::timeout(shutdown_timeout, worker_handle).await {
        warn!(error = %e, "Maintenance worker did not shut down in time");
    }

    info!("Capacity maintainer shutdown complete");
    Ok(())
}
