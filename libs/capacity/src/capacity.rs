//! Free capacity of hosts.
//!
//! All functions are pure over a [`NodeList`] snapshot and safe to call
//! from any number of readers.

use std::cmp::Ordering;
use std::collections::BTreeSet;

use fleet_id::Hostname;

use crate::model::{Node, NodeState};
use crate::resources::ResourceVector;
use crate::snapshot::NodeList;

/// Capacity calculations over one snapshot.
#[derive(Debug, Clone, Copy)]
pub struct HostCapacity<'a> {
    all_nodes: &'a NodeList,
}

impl<'a> HostCapacity<'a> {
    pub fn new(all_nodes: &'a NodeList) -> Self {
        Self { all_nodes }
    }

    pub fn all_nodes(&self) -> &'a NodeList {
        self.all_nodes
    }

    /// Capacity of `host` not used by its children.
    ///
    /// Retired children still count as used: they hold their resources
    /// until actually moved. With `exclude_inactive`, children that are
    /// inactive or retired are not counted, since they are on their way out.
    /// Non-host nodes have no free capacity.
    pub fn free_capacity_of(&self, host: &Node, exclude_inactive: bool) -> ResourceVector {
        if !host.is_host() {
            return ResourceVector::ZERO;
        }

        self.all_nodes
            .children_of(host)
            .iter()
            .filter(|child| !(exclude_inactive && is_inactive_or_retired(child)))
            .fold(host.resources, |free, child| free - child.resources)
    }

    /// Returns true if `host` can fit `requested` next to its current children.
    pub fn has_capacity(&self, host: &Node, requested: &ResourceVector) -> bool {
        self.free_capacity_of(host, false).satisfies(requested)
    }

    /// Number of addresses in the host's pool not used by any node.
    pub fn free_ips(&self, host: &Node) -> usize {
        host.ip_config.pool.free_count(&self.all_nodes.addresses())
    }

    /// Order hosts by spare-worthiness: more free capacity first, not
    /// counting inactive or retired children. Ties are broken by hostname.
    pub fn compare_without_inactive(&self, a: &Node, b: &Node) -> Ordering {
        let free_a = self.free_capacity_of(a, true);
        let free_b = self.free_capacity_of(b, true);
        free_b
            .cmp_size(&free_a)
            .then_with(|| a.hostname.cmp(&b.hostname))
    }

    /// The `count` active hosts among `candidates` best suited as spares.
    ///
    /// Hosts without a free address cannot receive a node and are never
    /// picked.
    pub fn find_spare_hosts(&self, candidates: &NodeList, count: usize) -> BTreeSet<Hostname> {
        let mut hosts: Vec<_> = candidates
            .hosts()
            .state(NodeState::Active)
            .iter()
            .filter(|host| self.free_ips(host) > 0)
            .cloned()
            .collect();
        hosts.sort_by(|a, b| self.compare_without_inactive(a, b));
        hosts
            .into_iter()
            .take(count)
            .map(|host| host.hostname.clone())
            .collect()
    }

    /// Active hosts whose children use more than the host has.
    pub fn overcommitted_hosts(&self) -> Vec<Hostname> {
        self.all_nodes
            .hosts()
            .state(NodeState::Active)
            .iter()
            .filter(|host| self.free_capacity_of(host, false).is_overcommitted())
            .map(|host| host.hostname.clone())
            .collect()
    }
}

fn is_inactive_or_retired(node: &Node) -> bool {
    node.state == NodeState::Inactive || node.is_retired()
}
