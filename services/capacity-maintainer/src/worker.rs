//! Maintenance background worker.
//!
//! Runs spare capacity maintenance on a periodic interval.

use std::time::Duration;

use fleet_capacity::{MaintenanceOutcome, MaintenanceStats, SpareCapacityMaintainer};
use tokio::sync::watch;
use tracing::{error, info, instrument};

/// Worker that runs the maintenance loop.
pub struct MaintenanceWorker {
    maintainer: SpareCapacityMaintainer,
    interval: Duration,
}

impl MaintenanceWorker {
    /// Create a worker running at the maintainer's configured interval.
    pub fn new(maintainer: SpareCapacityMaintainer) -> Self {
        let interval = maintainer.config().interval;
        Self {
            maintainer,
            interval,
        }
    }

    /// Run the worker until shutdown is signaled.
    #[instrument(skip(self, shutdown))]
    pub async fn run(&self, mut shutdown: watch::Receiver<bool>) {
        info!(
            interval_secs = self.interval.as_secs(),
            spare_target = self.maintainer.config().spare_target,
            "Starting maintenance worker"
        );

        let mut interval = tokio::time::interval(self.interval);
        // Don't immediately tick on startup - wait for first interval
        interval.tick().await;

        loop {
            tokio::select! {
                _ = interval.tick() => {
                    let stats = self.maintainer.maintain().await;
                    report(&stats, self.maintainer.config().spare_target);
                }
                _ = shutdown.changed() => {
                    if *shutdown.borrow() {
                        info!("Maintenance worker shutting down");
                        break;
                    }
                }
            }
        }
    }
}

/// Log cycles that leave the fleet below its target.
fn report(stats: &MaintenanceStats, spare_target: usize) {
    if stats.spare_host_capacity >= spare_target {
        return;
    }
    match stats.outcome {
        MaintenanceOutcome::BudgetExceeded | MaintenanceOutcome::NotFound => error!(
            spares = stats.spare_host_capacity,
            target = spare_target,
            outcome = ?stats.outcome,
            "Fleet cannot absorb the target number of host failures"
        ),
        _ => info!(
            spares = stats.spare_host_capacity,
            target = spare_target,
            "Spare capacity is being restored"
        ),
    }
}
