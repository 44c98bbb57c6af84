//! Hosts, nodes and their allocations.
//!
//! A host is a [`Node`] of type [`NodeType::Host`]; tenant nodes point back
//! at their host through `parent_hostname`. Nodes are immutable values:
//! changes produce a new node through the `with_*` methods.

use std::collections::BTreeSet;
use std::net::IpAddr;

use fleet_id::{ApplicationId, ClusterId, Hostname, TenantName};
use fleet_networking::AddressPool;
use serde::{Deserialize, Serialize};

use crate::resources::ResourceVector;

/// Role of a node in the fleet.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum NodeType {
    /// A physical or virtual machine that parents tenant nodes.
    Host,
    /// A workload unit allocated to an application.
    Tenant,
}

/// Lifecycle state of a node.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum NodeState {
    /// Provisioned and free for allocation.
    Ready,
    /// Allocated to an application, not yet activated.
    Reserved,
    /// Allocated and in service.
    Active,
    /// Recently removed from an application, may be reused by it.
    Inactive,
    /// Broken; its workload needs a replacement.
    Failed,
}

impl NodeState {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Ready => "ready",
            Self::Reserved => "reserved",
            Self::Active => "active",
            Self::Inactive => "inactive",
            Self::Failed => "failed",
        }
    }
}

impl std::fmt::Display for NodeState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Kind of application cluster.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ClusterType {
    Admin,
    Container,
    Content,
}

/// The cluster (and group within it) a node belongs to.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct ClusterSpec {
    pub cluster_type: ClusterType,
    pub id: ClusterId,
    /// Group index within the cluster, if the cluster is grouped.
    #[serde(default)]
    pub group: Option<u32>,
}

impl ClusterSpec {
    pub fn new(cluster_type: ClusterType, id: ClusterId) -> Self {
        Self {
            cluster_type,
            id,
            group: None,
        }
    }

    pub fn with_group(mut self, group: u32) -> Self {
        self.group = Some(group);
        self
    }
}

/// Binding of a node to an application cluster.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Allocation {
    pub owner: ApplicationId,
    pub cluster: ClusterSpec,
    /// Index of the node within its cluster.
    pub index: u32,
    /// Whether the node is requested to leave its current placement.
    #[serde(default)]
    pub retired: bool,
}

impl Allocation {
    pub fn new(owner: ApplicationId, cluster: ClusterSpec, index: u32) -> Self {
        Self {
            owner,
            cluster,
            index,
            retired: false,
        }
    }

    pub fn retire(&self) -> Self {
        Self {
            retired: true,
            ..self.clone()
        }
    }
}

/// Addresses of a node and, for hosts, the pool handed to children.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct IpConfig {
    #[serde(default)]
    pub primary: BTreeSet<IpAddr>,
    #[serde(default)]
    pub pool: AddressPool,
}

/// A host or tenant node.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Node {
    pub hostname: Hostname,
    pub node_type: NodeType,
    pub state: NodeState,
    pub resources: ResourceVector,
    #[serde(default)]
    pub parent_hostname: Option<Hostname>,
    #[serde(default)]
    pub allocation: Option<Allocation>,
    #[serde(default)]
    pub ip_config: IpConfig,
    /// Tenant this host is exclusively reserved to.
    #[serde(default)]
    pub reserved_to: Option<TenantName>,
}

impl Node {
    /// Create a host with the given capacity and child address pool.
    pub fn host(hostname: Hostname, resources: ResourceVector, ip_config: IpConfig) -> Self {
        Self {
            hostname,
            node_type: NodeType::Host,
            state: NodeState::Ready,
            resources,
            parent_hostname: None,
            allocation: None,
            ip_config,
            reserved_to: None,
        }
    }

    /// Create an unallocated tenant node on a host.
    pub fn child(
        hostname: Hostname,
        parent: Hostname,
        resources: ResourceVector,
        addresses: BTreeSet<IpAddr>,
    ) -> Self {
        Self {
            hostname,
            node_type: NodeType::Tenant,
            state: NodeState::Ready,
            resources,
            parent_hostname: Some(parent),
            allocation: None,
            ip_config: IpConfig {
                primary: addresses,
                pool: AddressPool::default(),
            },
            reserved_to: None,
        }
    }

    pub fn with_state(&self, state: NodeState) -> Self {
        Self {
            state,
            ..self.clone()
        }
    }

    pub fn with_allocation(&self, allocation: Allocation) -> Self {
        Self {
            allocation: Some(allocation),
            ..self.clone()
        }
    }

    pub fn reserved_to(&self, tenant: TenantName) -> Self {
        Self {
            reserved_to: Some(tenant),
            ..self.clone()
        }
    }

    pub fn is_host(&self) -> bool {
        self.node_type == NodeType::Host
    }

    pub fn is_retired(&self) -> bool {
        self.allocation.as_ref().is_some_and(|a| a.retired)
    }

    /// Returns true if this node is allocated to `application`.
    pub fn is_owned_by(&self, application: &ApplicationId) -> bool {
        self.allocation.as_ref().is_some_and(|a| &a.owner == application)
    }

    pub fn owner(&self) -> Option<&ApplicationId> {
        self.allocation.as_ref().map(|a| &a.owner)
    }
}

impl std::fmt::Display for Node {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self.node_type {
            NodeType::Host => write!(f, "host {}", self.hostname),
            NodeType::Tenant => write!(f, "node {}", self.hostname),
        }
    }
}
