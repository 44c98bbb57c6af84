//! Redeployment interface and mock implementation.
//!
//! The maintainer never moves nodes itself. It retires them and asks the
//! deployer to redeploy the owning application, which places replacements
//! and eventually removes the retired nodes.
//!
//! A mock implementation is provided for testing and development.

use std::collections::{BTreeMap, BTreeSet};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use async_trait::async_trait;
use fleet_id::ApplicationId;
use parking_lot::Mutex;
use tracing::debug;

/// Errors from preparing or activating a deployment.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum DeployError {
    /// Expected to succeed on retry.
    #[error("transient deployment failure: {0}")]
    Transient(String),

    /// Anything else.
    #[error("deployment failed: {0}")]
    Fatal(String),
}

impl DeployError {
    pub fn is_transient(&self) -> bool {
        matches!(self, Self::Transient(_))
    }
}

/// A redeployment of one application.
#[async_trait]
pub trait Deployment: Send {
    /// Prepare the deployment, allocating replacements for retired nodes.
    async fn prepare(&mut self) -> Result<(), DeployError>;

    /// Activate the prepared deployment.
    async fn activate(&mut self) -> Result<(), DeployError>;
}

/// Source of redeployments.
#[async_trait]
pub trait Deployer: Send + Sync {
    /// Create a redeployment of the application's currently active
    /// version, or `None` if it is not deployed here.
    async fn deploy_from_local_active(
        &self,
        application: &ApplicationId,
    ) -> Option<Box<dyn Deployment>>;
}

// =============================================================================
// Mock
// =============================================================================

#[derive(Debug, Default)]
struct MockState {
    activations: AtomicUsize,
    activated: Mutex<BTreeMap<ApplicationId, usize>>,
    failures: Mutex<BTreeMap<ApplicationId, DeployError>>,
    missing: Mutex<BTreeSet<ApplicationId>>,
}

/// Mock deployer for testing and development.
#[derive(Debug, Clone, Default)]
pub struct MockDeployer {
    state: Arc<MockState>,
}

impl MockDeployer {
    /// Create a new mock deployer.
    pub fn new() -> Self {
        Self::default()
    }

    /// Make every deployment of `application` fail in prepare.
    pub fn fail(&self, application: &ApplicationId, error: DeployError) {
        self.state.failures.lock().insert(application.clone(), error);
    }

    /// Pretend `application` is not deployed.
    pub fn remove(&self, application: &ApplicationId) {
        self.state.missing.lock().insert(application.clone());
    }

    /// Total number of successful activations.
    pub fn activations(&self) -> usize {
        self.state.activations.load(Ordering::SeqCst)
    }

    /// Number of successful activations of `application`.
    pub fn activations_of(&self, application: &ApplicationId) -> usize {
        self.state
            .activated
            .lock()
            .get(application)
            .copied()
            .unwrap_or(0)
    }
}

#[async_trait]
impl Deployer for MockDeployer {
    async fn deploy_from_local_active(
        &self,
        application: &ApplicationId,
    ) -> Option<Box<dyn Deployment>> {
        if self.state.missing.lock().contains(application) {
            return None;
        }
        Some(Box::new(MockDeployment {
            application: application.clone(),
            state: self.state.clone(),
            prepared: false,
        }))
    }
}

struct MockDeployment {
    application: ApplicationId,
    state: Arc<MockState>,
    prepared: bool,
}

#[async_trait]
impl Deployment for MockDeployment {
    async fn prepare(&mut self) -> Result<(), DeployError> {
        if let Some(error) = self.state.failures.lock().get(&self.application) {
            return Err(error.clone());
        }
        self.prepared = true;
        Ok(())
    }

    async fn activate(&mut self) -> Result<(), DeployError> {
        if !self.prepared {
            return Err(DeployError::Fatal(format!(
                "{} was activated before it was prepared",
                self.application
            )));
        }
        self.state.activations.fetch_add(1, Ordering::SeqCst);
        *self
            .state
            .activated
            .lock()
            .entry(self.application.clone())
            .or_insert(0) += 1;
        debug!(application = %self.application, "Mock deployment activated");
        Ok(())
    }
}
