//! Metric sink used by the maintainer.

use std::collections::BTreeMap;

use parking_lot::Mutex;

/// Gauge reporting the number of host failures the fleet can absorb.
pub const SPARE_HOST_CAPACITY: &str = "spareHostCapacity";
/// Gauge reporting hosts whose children use more than the host has.
pub const OVERCOMMITTED_HOSTS: &str = "overcommittedHosts";
/// Counter of maintenance redeployments failing with a transient error.
pub const DEPLOYMENT_TRANSIENT_FAILURE: &str = "maintenanceDeployment.transientFailure";
/// Counter of maintenance redeployments failing for any other reason.
pub const DEPLOYMENT_FAILURE: &str = "maintenanceDeployment.failure";

/// Destination for metric values.
pub trait Metric: Send + Sync {
    /// Report the latest value of a gauge.
    fn set(&self, name: &str, value: f64);

    /// Add to a counter.
    fn add(&self, name: &str, value: f64);
}

/// Metric sink keeping the latest values in memory.
#[derive(Debug, Default)]
pub struct InMemoryMetric {
    values: Mutex<BTreeMap<String, f64>>,
}

impl InMemoryMetric {
    pub fn new() -> Self {
        Self::default()
    }

    /// Latest value of `name`, if ever reported.
    pub fn get(&self, name: &str) -> Option<f64> {
        self.values.lock().get(name).copied()
    }
}

impl Metric for InMemoryMetric {
    fn set(&self, name: &str, value: f64) {
        self.values.lock().insert(name.to_string(), value);
    }

    fn add(&self, name: &str, value: f64) {
        *self.values.lock().entry(name.to_string()).or_insert(0.0) += value;
    }
}
