//! # fleet-capacity
//!
//! Node allocation ranking and spare host capacity maintenance for a
//! multi-tenant compute fleet.
//!
//! ## Components
//!
//! - [`NodeList`]: immutable snapshot of hosts and nodes
//! - [`HostCapacity`]: free capacity of hosts and spare host selection
//! - [`NodePrioritizer`]: ranked candidates for one allocation request
//! - [`SpareCapacityMaintainer`]: periodic check that the fleet can absorb
//!   host failures, retiring and redeploying nodes when it cannot
//!
//! ## Collaborators
//!
//! - [`NodeRepository`]: the shared store, with per-application locks
//! - [`Deployer`]: redeploys applications after retirement
//! - [`Metric`]: receives the maintainer's gauges and counters
//! - [`fleet_networking::NameResolver`]: names addresses of new nodes

pub mod capacity;
pub mod config;
pub mod deployer;
pub mod maintainer;
pub mod metric;
pub mod model;
pub mod prioritizer;
pub mod repository;
pub mod resources;
pub mod snapshot;

pub use capacity::HostCapacity;
pub use config::{MaintainerConfig, DEFAULT_ALLOCATION_SPARES};
pub use deployer::{DeployError, Deployer, Deployment, MockDeployer};
pub use maintainer::{
    MaintenanceOutcome, MaintenanceStats, Plan, SearchOutcome, SpareCapacityMaintainer,
};
pub use metric::{InMemoryMetric, Metric};
pub use model::{Allocation, ClusterSpec, ClusterType, IpConfig, Node, NodeState, NodeType};
pub use prioritizer::{
    AllocationRequest, NodePrioritizer, NodeSpec, PrioritizableNode, PrioritizerError,
    RankingContext,
};
pub use repository::{ApplicationLock, LockError, NodeRepository, RepositoryError};
pub use resources::ResourceVector;
pub use snapshot::NodeList;
