//! A redeployment carried out by maintenance.

use std::sync::Arc;
use std::time::Duration;

use fleet_id::{ApplicationId, Hostname};
use tracing::{debug, info, warn};

use crate::deployer::{DeployError, Deployer, Deployment};
use crate::metric::{Metric, DEPLOYMENT_FAILURE, DEPLOYMENT_TRANSIENT_FAILURE};
use crate::repository::{ApplicationLock, NodeRepository, RepositoryError};

/// Single-use wrapper of a deployment that holds the application lock.
///
/// The lock is taken with a short timeout so maintenance never holds up
/// regular deployments for long. The deployment is only created when the
/// lock was acquired and the application has active nodes. Deployers must
/// not lock the application themselves while it is held here.
pub struct MaintenanceDeployment {
    application: ApplicationId,
    metric: Arc<dyn Metric>,
    lock: Option<ApplicationLock>,
    deployment: Option<Box<dyn Deployment>>,
}

impl MaintenanceDeployment {
    pub async fn new(
        application: &ApplicationId,
        repository: &NodeRepository,
        deployer: &dyn Deployer,
        metric: Arc<dyn Metric>,
        lock_timeout: Duration,
    ) -> Self {
        let lock = match repository.lock(application, lock_timeout).await {
            Ok(lock) => Some(lock),
            Err(e) => {
                debug!(error = %e, "Skipping maintenance deployment");
                None
            }
        };

        let deployment = if lock.is_some() && !repository.active_nodes(application).is_empty() {
            deployer.deploy_from_local_active(application).await
        } else {
            None
        };

        Self {
            application: application.clone(),
            metric,
            // Release the lock right away if there is nothing to deploy
            lock: deployment.as_ref().and(lock),
            deployment,
        }
    }

    /// Returns true if this can carry out the deployment.
    pub fn is_valid(&self) -> bool {
        self.deployment.is_some()
    }

    pub fn application(&self) -> &ApplicationId {
        &self.application
    }

    /// Retire `nodes` under the held lock. Returns the number of nodes changed.
    ///
    /// Fails with [`RepositoryError::NotLocked`] on an invalid deployment.
    pub fn retire(
        &self,
        repository: &NodeRepository,
        nodes: &[Hostname],
    ) -> Result<usize, RepositoryError> {
        let lock = self
            .lock
            .as_ref()
            .ok_or_else(|| RepositoryError::NotLocked(self.application.clone()))?;
        repository.retire(lock, nodes)
    }

    /// Prepare and activate. Failures are counted and logged, not returned.
    pub async fn deploy(&mut self) -> bool {
        let Some(deployment) = self.deployment.as_mut() else {
            return false;
        };

        let result = match deployment.prepare().await {
            Ok(()) => deployment.activate().await,
            Err(e) => Err(e),
        };

        match result {
            Ok(()) => {
                info!(application = %self.application, "Maintenance deployment activated");
                true
            }
            Err(DeployError::Transient(message)) => {
                self.metric.add(DEPLOYMENT_TRANSIENT_FAILURE, 1.0);
                info!(
                    application = %self.application,
                    error = %message,
                    "Failed to maintenance deploy with a transient error"
                );
                false
            }
            Err(e) => {
                self.metric.add(DEPLOYMENT_FAILURE, 1.0);
                warn!(application = %self.application, error = %e, "Maintenance deploy failed");
                false
            }
        }
    }
}

impl std::fmt::Display for MaintenanceDeployment {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "deployment of {}", self.application)
    }
}
