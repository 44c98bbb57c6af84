//! Tunables for prioritization and spare capacity maintenance.

use std::time::Duration;

/// Spare hosts kept free by the prioritizer unless the request says otherwise.
pub const DEFAULT_ALLOCATION_SPARES: usize = 2;

/// Configuration of the spare capacity maintainer.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MaintainerConfig {
    /// Number of host failures the fleet should survive.
    pub spare_target: usize,
    /// Maximum number of plans explored per maintenance cycle.
    pub max_iterations: usize,
    /// How long to wait for an application lock before skipping it.
    pub lock_timeout: Duration,
    /// Time between maintenance cycles.
    pub interval: Duration,
}

impl Default for MaintainerConfig {
    fn default() -> Self {
        Self {
            spare_target: 1,
            max_iterations: 1000,
            lock_timeout: Duration::from_secs(1),
            interval: Duration::from_secs(10 * 60),
        }
    }
}

impl MaintainerConfig {
    pub fn with_max_iterations(mut self, max_iterations: usize) -> Self {
        self.max_iterations = max_iterations;
        self
    }

    pub fn with_spare_target(mut self, spare_target: usize) -> Self {
        self.spare_target = spare_target;
        self
    }

    pub fn with_lock_timeout(mut self, lock_timeout: Duration) -> Self {
        self.lock_timeout = lock_timeout;
        self
    }
}
