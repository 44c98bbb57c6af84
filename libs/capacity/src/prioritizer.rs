//! Candidate ranking for one allocation request.
//!
//! The prioritizer is responsible for:
//! - Selecting the spare hosts that new work should stay off
//! - Collecting candidates from four sources: application, surplus, ready
//!   and new nodes
//! - Ranking candidates with a pure comparator over an explicit context
//!
//! A prioritizer is built per request over an immutable snapshot and
//! discarded afterwards. It never mutates the repository; committing the
//! chosen nodes is the caller's business.

use std::cmp::Ordering;
use std::collections::{BTreeMap, BTreeSet};
use std::sync::Arc;

use fleet_id::{ApplicationId, Hostname};
use fleet_networking::NameResolver;
use tracing::{debug, warn};

use crate::capacity::HostCapacity;
use crate::config::DEFAULT_ALLOCATION_SPARES;
use crate::model::{ClusterSpec, Node, NodeState, NodeType};
use crate::resources::ResourceVector;
use crate::snapshot::NodeList;

/// Errors raised for malformed allocation requests.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum PrioritizerError {
    /// New nodes can only be synthesized for count-based requests.
    #[error("cannot create new nodes for {0}")]
    UnsupportedNodeSpec(NodeSpec),

    /// A count-based request must carry its resources before new nodes are created.
    #[error("requested resources are not specified for {0}")]
    UnspecifiedResources(NodeSpec),
}

// =============================================================================
// Request
// =============================================================================

/// What an application cluster asks for.
#[derive(Debug, Clone, PartialEq)]
pub enum NodeSpec {
    /// A number of tenant nodes, optionally with explicit resources.
    Count {
        count: usize,
        resources: Option<ResourceVector>,
    },
    /// Every node of a type.
    Type { node_type: NodeType },
}

impl NodeSpec {
    pub fn count(count: usize, resources: ResourceVector) -> Self {
        Self::Count {
            count,
            resources: Some(resources),
        }
    }

    /// The node type this spec requests.
    pub fn node_type(&self) -> NodeType {
        match self {
            Self::Count { .. } => NodeType::Tenant,
            Self::Type { node_type } => *node_type,
        }
    }

    pub fn resources(&self) -> Option<&ResourceVector> {
        match self {
            Self::Count { resources, .. } => resources.as_ref(),
            Self::Type { .. } => None,
        }
    }

    /// Returns true if `n` nodes are enough for this spec.
    pub fn fulfilled_by(&self, n: usize) -> bool {
        match self {
            Self::Count { count, .. } => *count <= n,
            Self::Type { .. } => true,
        }
    }

    /// Returns true if a node with `current` resources can be resized in
    /// place to this spec, given the free capacity of its parent.
    pub fn can_resize(
        &self,
        current: &ResourceVector,
        parent_free: &ResourceVector,
        topology_change: bool,
        current_cluster_size: usize,
    ) -> bool {
        let Self::Count { count, resources } = self else {
            return false;
        };
        let Some(requested) = resources else {
            return false;
        };
        // Removing nodes or changing groups needs fresh placement
        if topology_change || *count < current_cluster_size {
            return false;
        }
        // Growing the cluster with smaller nodes would move work onto the existing ones
        if *count > current_cluster_size && !requested.satisfies(current) {
            return false;
        }
        (*parent_free + *current).satisfies(requested)
    }
}

impl std::fmt::Display for NodeSpec {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Count {
                count,
                resources: Some(resources),
            } => write!(f, "{count} nodes with {resources}"),
            Self::Count {
                count,
                resources: None,
            } => write!(f, "{count} nodes"),
            Self::Type { node_type } => write!(f, "all {node_type:?} nodes"),
        }
    }
}

/// One request for capacity by an application cluster.
#[derive(Debug, Clone)]
pub struct AllocationRequest {
    pub application: ApplicationId,
    pub cluster: ClusterSpec,
    pub node_spec: NodeSpec,
    /// Number of groups the cluster should have after allocation.
    pub wanted_groups: usize,
    /// Number of spare hosts to keep free.
    pub spares: usize,
    /// Restrict new nodes to hosts already used by the tenant and disallow
    /// in-place resizing.
    pub allocate_fully: bool,
}

impl AllocationRequest {
    pub fn new(application: ApplicationId, cluster: ClusterSpec, node_spec: NodeSpec) -> Self {
        Self {
            application,
            cluster,
            node_spec,
            wanted_groups: 1,
            spares: DEFAULT_ALLOCATION_SPARES,
            allocate_fully: false,
        }
    }

    pub fn with_groups(mut self, wanted_groups: usize) -> Self {
        self.wanted_groups = wanted_groups;
        self
    }

    pub fn with_spares(mut self, spares: usize) -> Self {
        self.spares = spares;
        self
    }

    pub fn allocating_fully(mut self) -> Self {
        self.allocate_fully = true;
        self
    }
}

// =============================================================================
// Candidates
// =============================================================================

/// A candidate placement with the attributes used for ranking.
#[derive(Debug, Clone)]
pub struct PrioritizableNode {
    pub node: Arc<Node>,
    pub parent: Option<Arc<Node>>,
    /// Free capacity of the parent, counting all of its children.
    pub free_parent_capacity: ResourceVector,
    /// Left over from an earlier downsize of the same cluster.
    pub is_surplus: bool,
    /// Synthesized by this request, not yet in the repository.
    pub is_new: bool,
    /// The parent is one of the spare hosts.
    pub violates_spares: bool,
    /// Can be resized in place to the requested resources.
    pub is_resizable: bool,
}

impl PrioritizableNode {
    fn skew_with(&self, resources: &ResourceVector) -> f64 {
        match &self.parent {
            Some(parent) => {
                ResourceVector::skew(&parent.resources, &(self.free_parent_capacity - *resources))
            }
            None => 0.0,
        }
    }

    /// How much placing this node increases the imbalance of its parent.
    pub fn skew_increase(&self) -> f64 {
        self.skew_with(&self.node.resources) - self.skew_with(&ResourceVector::ZERO)
    }
}

/// Facts about the request that change how candidates rank.
#[derive(Debug, Clone, Copy, Default)]
pub struct RankingContext {
    /// The request replaces failed nodes, so spare hosts may be used.
    pub replacing_failures: bool,
}

/// Total order over candidates: better candidates sort first.
pub fn compare(a: &PrioritizableNode, b: &PrioritizableNode, context: &RankingContext) -> Ordering {
    let spares = if context.replacing_failures {
        Ordering::Equal
    } else {
        prefer(!a.violates_spares, !b.violates_spares)
    };

    spares
        .then_with(|| prefer(!a.is_new, !b.is_new))
        .then_with(|| prefer(in_state(a, NodeState::Active), in_state(b, NodeState::Active)))
        .then_with(|| prefer(!a.is_surplus, !b.is_surplus))
        .then_with(|| prefer(in_state(a, NodeState::Inactive), in_state(b, NodeState::Inactive)))
        .then_with(|| prefer(in_state(a, NodeState::Reserved), in_state(b, NodeState::Reserved)))
        .then_with(|| prefer(in_state(a, NodeState::Ready), in_state(b, NodeState::Ready)))
        .then_with(|| a.skew_increase().total_cmp(&b.skew_increase()))
        .then_with(|| a.node.hostname.cmp(&b.node.hostname))
}

/// Orders `true` before `false`.
fn prefer(a: bool, b: bool) -> Ordering {
    b.cmp(&a)
}

fn in_state(candidate: &PrioritizableNode, state: NodeState) -> bool {
    candidate.node.state == state
}

// =============================================================================
// Prioritizer
// =============================================================================

/// Builds and ranks the candidate set of one allocation request.
pub struct NodePrioritizer<'a> {
    all_nodes: &'a NodeList,
    capacity: HostCapacity<'a>,
    request: &'a AllocationRequest,
    resolver: &'a dyn NameResolver,
    spare_hosts: BTreeSet<Hostname>,
    is_topology_change: bool,
    current_cluster_size: usize,
    is_allocating_for_replacement: bool,
    nodes: BTreeMap<Hostname, PrioritizableNode>,
}

impl<'a> NodePrioritizer<'a> {
    pub fn new(
        all_nodes: &'a NodeList,
        request: &'a AllocationRequest,
        resolver: &'a dyn NameResolver,
    ) -> Self {
        let capacity = HostCapacity::new(all_nodes);
        let spare_hosts = capacity.find_spare_hosts(all_nodes, request.spares);

        let nodes_in_cluster = all_nodes
            .owner(&request.application)
            .cluster(&request.cluster.id)
            .matching(|node| {
                node.allocation
                    .as_ref()
                    .is_some_and(|a| a.cluster.cluster_type == request.cluster.cluster_type)
            });
        let active_in_cluster = nodes_in_cluster.not_retired().state(NodeState::Active);

        let current_groups: BTreeSet<u32> = active_in_cluster
            .iter()
            .filter_map(|node| node.allocation.as_ref().and_then(|a| a.cluster.group))
            .collect();
        let is_topology_change = current_groups.len() != request.wanted_groups;

        let current_cluster_size = active_in_cluster
            .iter()
            .filter(|node| {
                node.allocation
                    .as_ref()
                    .is_some_and(|a| a.cluster.group == request.cluster.group)
            })
            .count();

        let failed = nodes_in_cluster.state(NodeState::Failed).len();
        let is_allocating_for_replacement =
            failed > 0 && request.node_spec.fulfilled_by(nodes_in_cluster.len() - failed);

        debug!(
            application = %request.application,
            cluster = %request.cluster.id,
            spare_hosts = spare_hosts.len(),
            is_topology_change,
            current_cluster_size,
            is_allocating_for_replacement,
            "Prepared node prioritizer"
        );

        Self {
            all_nodes,
            capacity,
            request,
            resolver,
            spare_hosts,
            is_topology_change,
            current_cluster_size,
            is_allocating_for_replacement,
            nodes: BTreeMap::new(),
        }
    }

    /// Hosts reserved as failover capacity for this request.
    pub fn spare_hosts(&self) -> &BTreeSet<Hostname> {
        &self.spare_hosts
    }

    pub fn is_topology_change(&self) -> bool {
        self.is_topology_change
    }

    pub fn is_allocating_for_replacement(&self) -> bool {
        self.is_allocating_for_replacement
    }

    pub fn ranking_context(&self) -> RankingContext {
        RankingContext {
            replacing_failures: self.is_allocating_for_replacement,
        }
    }

    /// Add nodes left over from an earlier downsize of this cluster.
    pub fn add_surplus_nodes(&mut self, surplus: &[Arc<Node>]) {
        for node in surplus {
            let candidate = self.to_prioritizable(node.clone(), true, false);
            self.admit_unless_violating_spares(candidate);
        }
    }

    /// Add nodes already allocated to the application.
    pub fn add_application_nodes(&mut self) {
        let node_type = self.request.node_spec.node_type();
        let owned = self.all_nodes.owner(&self.request.application).matching(|node| {
            node.node_type == node_type
                && matches!(
                    node.state,
                    NodeState::Active | NodeState::Inactive | NodeState::Reserved
                )
        });
        for node in &owned {
            let candidate = self.to_prioritizable(node.clone(), false, false);
            self.insert(candidate);
        }
    }

    /// Add provisioned nodes not allocated to any application.
    pub fn add_ready_nodes(&mut self) {
        let ready = self
            .all_nodes
            .node_type(self.request.node_spec.node_type())
            .state(NodeState::Ready);
        for node in &ready {
            let candidate = self.to_prioritizable(node.clone(), false, false);
            self.admit_unless_violating_spares(candidate);
        }
    }

    /// Add one new node on each host with room for the requested resources.
    ///
    /// `can_allocate_to` filters the hosts considered. Returns the number
    /// of new nodes added.
    pub fn add_new_nodes(
        &mut self,
        can_allocate_to: impl Fn(&Node) -> bool,
    ) -> Result<usize, PrioritizerError> {
        let requested = match &self.request.node_spec {
            NodeSpec::Count {
                resources: Some(resources),
                ..
            } => *resources,
            spec @ NodeSpec::Count { resources: None, .. } => {
                return Err(PrioritizerError::UnspecifiedResources(spec.clone()))
            }
            spec @ NodeSpec::Type { .. } => {
                return Err(PrioritizerError::UnsupportedNodeSpec(spec.clone()))
            }
        };

        let tenant = self.request.application.tenant();
        let mut hosts = self.all_nodes.hosts().matching(|host| {
            can_allocate_to(host) && host.reserved_to.as_ref().is_none_or(|t| t == tenant)
        });

        if self.request.allocate_fully {
            let tenant_hosts: BTreeSet<Hostname> = self
                .all_nodes
                .node_type(NodeType::Tenant)
                .iter()
                .filter(|node| node.owner().is_some_and(|owner| owner.tenant() == tenant))
                .filter_map(|node| node.parent_hostname.clone())
                .collect();
            hosts = hosts.matching(|host| tenant_hosts.contains(&host.hostname));
        }

        let used_addresses = self.all_nodes.addresses();
        let mut added = 0;
        for host in &hosts {
            if !self.capacity.has_capacity(host, &requested) || self.has_cluster_child(host) {
                continue;
            }

            debug!(host = %host.hostname, "Trying to add new node");
            let allocation = match host.ip_config.pool.find_allocation(&used_addresses, self.resolver) {
                Ok(Some(allocation)) => allocation,
                // No free addresses in this pool
                Ok(None) => continue,
                Err(e) => {
                    warn!(host = %host.hostname, error = %e, "Failed allocating IP address");
                    continue;
                }
            };
            let hostname = match allocation.hostname.parse::<Hostname>() {
                Ok(hostname) => hostname,
                Err(e) => {
                    warn!(
                        host = %host.hostname,
                        resolved = %allocation.hostname,
                        error = %e,
                        "Resolved an invalid hostname"
                    );
                    continue;
                }
            };

            let node = Node::child(hostname, host.hostname.clone(), requested, allocation.addresses)
                .with_state(NodeState::Reserved);
            let candidate = self.to_prioritizable(Arc::new(node), false, true);
            if !candidate.violates_spares || self.is_allocating_for_replacement {
                debug!(node = %candidate.node.hostname, host = %host.hostname, "Adding new node");
                self.insert(candidate);
                added += 1;
            }
        }
        Ok(added)
    }

    /// Collect candidates from every source: application, surplus, ready
    /// and new nodes, in that order.
    ///
    /// A request new nodes cannot be created for is logged and the other
    /// sources are kept.
    pub fn candidates(
        mut self,
        surplus: &[Arc<Node>],
        can_allocate_to: impl Fn(&Node) -> bool,
    ) -> Vec<PrioritizableNode> {
        self.add_application_nodes();
        self.add_surplus_nodes(surplus);
        self.add_ready_nodes();
        if let Err(e) = self.add_new_nodes(can_allocate_to) {
            debug!(application = %self.request.application, error = %e, "Not adding new nodes");
        }
        self.prioritize()
    }

    /// All admitted candidates, best first.
    pub fn prioritize(&self) -> Vec<PrioritizableNode> {
        let context = self.ranking_context();
        let mut ranked: Vec<_> = self.nodes.values().cloned().collect();
        ranked.sort_by(|a, b| compare(a, b, &context));
        ranked
    }

    fn to_prioritizable(&self, node: Arc<Node>, is_surplus: bool, is_new: bool) -> PrioritizableNode {
        let parent = self.all_nodes.parent_of(&node).cloned();
        let mut candidate = PrioritizableNode {
            node,
            parent: None,
            free_parent_capacity: ResourceVector::ZERO,
            is_surplus,
            is_new,
            violates_spares: false,
            is_resizable: false,
        };

        if let Some(parent) = parent {
            let free = self.capacity.free_capacity_of(&parent, false);
            candidate.free_parent_capacity = free;
            if !is_new {
                candidate.is_resizable = !self.request.allocate_fully
                    && self.request.node_spec.can_resize(
                        &candidate.node.resources,
                        &free,
                        self.is_topology_change,
                        self.current_cluster_size,
                    );
            }
            candidate.violates_spares = self.spare_hosts.contains(&parent.hostname);
            candidate.parent = Some(parent);
        }
        candidate
    }

    fn has_cluster_child(&self, host: &Node) -> bool {
        self.all_nodes
            .children_of(host)
            .owner(&self.request.application)
            .iter()
            .any(|child| {
                child
                    .allocation
                    .as_ref()
                    .is_some_and(|a| a.cluster.id == self.request.cluster.id)
            })
    }

    fn admit_unless_violating_spares(&mut self, candidate: PrioritizableNode) {
        if !candidate.violates_spares || self.is_allocating_for_replacement {
            self.insert(candidate);
        } else {
            debug!(node = %candidate.node.hostname, "Skipping candidate on spare host");
        }
    }

    fn insert(&mut self, candidate: PrioritizableNode) {
        self.nodes.insert(candidate.node.hostname.clone(), candidate);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;

    const HOST: ResourceVector = ResourceVector::new(10.0, 100.0, 1000.0, 1.0);
    const SMALL: ResourceVector = ResourceVector::new(2.0, 20.0, 200.0, 0.2);
    const LARGE: ResourceVector = ResourceVector::new(4.0, 40.0, 400.0, 0.4);

    #[rstest]
    #[case(3, 3, true)]
    #[case(3, 4, true)]
    #[case(3, 2, false)]
    fn test_count_fulfilled_by(#[case] count: usize, #[case] n: usize, #[case] expected: bool) {
        assert_eq!(NodeSpec::count(count, SMALL).fulfilled_by(n), expected);
    }

    #[test]
    fn test_type_spec_is_always_fulfilled_and_never_resized() {
        let spec = NodeSpec::Type {
            node_type: NodeType::Host,
        };
        assert!(spec.fulfilled_by(0));
        assert!(!spec.can_resize(&SMALL, &HOST, false, 0));
        assert_eq!(spec.node_type(), NodeType::Host);
    }

    #[rstest]
    // Same size, fits in parent
    #[case(3, LARGE, HOST, false, 3, true)]
    // Topology change
    #[case(3, LARGE, HOST, true, 3, false)]
    // Shrinking the cluster
    #[case(2, LARGE, HOST, false, 3, false)]
    // Growing with smaller nodes
    #[case(4, ResourceVector::new(1.0, 10.0, 100.0, 0.1), HOST, false, 3, false)]
    // Parent too full
    #[case(3, LARGE, ResourceVector::new(1.0, 10.0, 100.0, 0.1), false, 3, false)]
    fn test_can_resize(
        #[case] count: usize,
        #[case] requested: ResourceVector,
        #[case] parent_free: ResourceVector,
        #[case] topology_change: bool,
        #[case] cluster_size: usize,
        #[case] expected: bool,
    ) {
        let spec = NodeSpec::count(count, requested);
        assert_eq!(
            spec.can_resize(&SMALL, &parent_free, topology_change, cluster_size),
            expected
        );
    }

    #[test]
    fn test_count_without_resources_cannot_resize() {
        let spec = NodeSpec::Count {
            count: 1,
            resources: None,
        };
        assert!(!spec.can_resize(&SMALL, &HOST, false, 1));
    }

    fn candidate(hostname: &str, state: NodeState) -> PrioritizableNode {
        let node = Node::child(
            hostname.parse().unwrap(),
            "host1".parse().unwrap(),
            SMALL,
            BTreeSet::new(),
        )
        .with_state(state);
        PrioritizableNode {
            node: Arc::new(node),
            parent: None,
            free_parent_capacity: ResourceVector::ZERO,
            is_surplus: false,
            is_new: false,
            violates_spares: false,
            is_resizable: false,
        }
    }

    #[test]
    fn test_existing_before_new() {
        let existing = candidate("node2", NodeState::Ready);
        let new = PrioritizableNode {
            is_new: true,
            ..candidate("node1", NodeState::Reserved)
        };
        let context = RankingContext::default();
        assert_eq!(compare(&existing, &new, &context), Ordering::Less);
    }

    #[test]
    fn test_state_precedence() {
        let context = RankingContext::default();
        let active = candidate("node4", NodeState::Active);
        let surplus = PrioritizableNode {
            is_surplus: true,
            ..candidate("node1", NodeState::Active)
        };
        let inactive = candidate("node3", NodeState::Inactive);
        let reserved = candidate("node2", NodeState::Reserved);
        let ready = candidate("node0", NodeState::Ready);

        let mut ranked = vec![ready, reserved, inactive, surplus, active];
        ranked.sort_by(|a, b| compare(a, b, &context));
        let names: Vec<_> = ranked.iter().map(|c| c.node.hostname.to_string()).collect();
        assert_eq!(names, vec!["node4", "node1", "node3", "node2", "node0"]);
    }

    #[test]
    fn test_spare_violation_ignored_when_replacing() {
        let on_spare = PrioritizableNode {
            violates_spares: true,
            ..candidate("node1", NodeState::Ready)
        };
        let elsewhere = candidate("node2", NodeState::Ready);

        let normal = RankingContext::default();
        assert_eq!(compare(&on_spare, &elsewhere, &normal), Ordering::Greater);

        let replacing = RankingContext {
            replacing_failures: true,
        };
        assert_eq!(compare(&on_spare, &elsewhere, &replacing), Ordering::Less);
    }

    #[test]
    fn test_lower_skew_increase_first() {
        let parent = Arc::new(Node::host("host1".parse().unwrap(), HOST, Default::default()));
        // Parent already uses a lot of cpu; a cpu-heavy node skews it further
        let free = ResourceVector::new(2.0, 80.0, 800.0, 0.8);
        let cpu_heavy = PrioritizableNode {
            node: Arc::new(
                Node::child("node1".parse().unwrap(), parent.hostname.clone(), ResourceVector::new(2.0, 2.0, 20.0, 0.1), BTreeSet::new()),
            ),
            parent: Some(parent.clone()),
            free_parent_capacity: free,
            ..candidate("node1", NodeState::Ready)
        };
        let memory_heavy = PrioritizableNode {
            node: Arc::new(
                Node::child("node2".parse().unwrap(), parent.hostname.clone(), ResourceVector::new(0.2, 40.0, 400.0, 0.1), BTreeSet::new()),
            ),
            parent: Some(parent),
            free_parent_capacity: free,
            ..candidate("node2", NodeState::Ready)
        };

        assert!(memory_heavy.skew_increase() < cpu_heavy.skew_increase());
        assert_eq!(
            compare(&memory_heavy, &cpu_heavy, &RankingContext::default()),
            Ordering::Less
        );
    }
}
