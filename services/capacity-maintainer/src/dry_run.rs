//! Collaborators that only log.
//!
//! The service runs against a snapshot file, so redeployments and metric
//! values are reported in the log instead of being sent anywhere.

use async_trait::async_trait;
use fleet_capacity::{DeployError, Deployer, Deployment, Metric};
use fleet_id::ApplicationId;
use tracing::info;

/// Deployer that logs each redeployment it is asked to carry out.
#[derive(Debug, Clone, Default)]
pub struct LoggingDeployer;

impl LoggingDeployer {
    pub fn new() -> Self {
        Self
    }
}

#[async_trait]
impl Deployer for LoggingDeployer {
    async fn deploy_from_local_active(
        &self,
        application: &ApplicationId,
    ) -> Option<Box<dyn Deployment>> {
        Some(Box::new(LoggingDeployment {
            application: application.clone(),
        }))
    }
}

struct LoggingDeployment {
    application: ApplicationId,
}

#[async_trait]
impl Deployment for LoggingDeployment {
    async fn prepare(&mut self) -> Result<(), DeployError> {
        info!(application = %self.application, "Would prepare redeployment");
        Ok(())
    }

    async fn activate(&mut self) -> Result<(), DeployError> {
        info!(application = %self.application, "Would activate redeployment");
        Ok(())
    }
}

/// Metric sink writing every value to the log.
#[derive(Debug, Clone, Default)]
pub struct LoggingMetric;

impl LoggingMetric {
    pub fn new() -> Self {
        Self
    }
}

impl Metric for LoggingMetric {
    fn set(&self, name: &str, value: f64) {
        info!(metric = name, value, "Gauge");
    }

    fn add(&self, name: &str, value: f64) {
        info!(metric = name, value, "Counter");
    }
}
