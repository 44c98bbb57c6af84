//! Simulated placement of nodes on active hosts.
//!
//! A [`Fleet`] is a cheap, owned copy of the parts of a snapshot the spare
//! search needs. Moves are applied to copies, never to the repository.

use std::cmp::Ordering;
use std::collections::{BTreeMap, BTreeSet};

use fleet_id::{ApplicationId, ClusterId, Hostname};

use crate::model::NodeState;
use crate::resources::ResourceVector;
use crate::snapshot::NodeList;

/// Nodes of one application cluster group; they move together.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct ClusterKey {
    pub application: ApplicationId,
    pub cluster: ClusterId,
    pub group: Option<u32>,
}

/// Relocation of one cluster group's nodes from one host to another.
#[derive(Debug, Clone, PartialEq)]
pub struct Move {
    pub key: ClusterKey,
    pub nodes: Vec<Hostname>,
    pub from: Hostname,
    pub to: Hostname,
    /// Combined resources of the moved nodes.
    pub resources: ResourceVector,
}

impl Move {
    pub fn application(&self) -> &ApplicationId {
        &self.key.application
    }
}

impl std::fmt::Display for Move {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "{} node(s) of {} from {} to {}",
            self.nodes.len(),
            self.key.application,
            self.from,
            self.to
        )
    }
}

#[derive(Debug, Clone)]
struct Child {
    hostname: Hostname,
    resources: ResourceVector,
    state: NodeState,
    key: Option<ClusterKey>,
    /// Still at its placement in the repository.
    at_origin: bool,
}

impl Child {
    fn is_active(&self) -> bool {
        self.state == NodeState::Active
    }

    fn is_movable(&self, excluded: &BTreeSet<ApplicationId>) -> bool {
        self.is_active()
            && self.at_origin
            && self
                .key
                .as_ref()
                .is_some_and(|key| !excluded.contains(&key.application))
    }
}

#[derive(Debug, Clone)]
struct Host {
    hostname: Hostname,
    capacity: ResourceVector,
    children: Vec<Child>,
}

impl Host {
    /// Free capacity ignoring inactive children, which are leaving the
    /// host. Retired children still hold their resources until moved.
    fn free(&self) -> ResourceVector {
        self.capacity
            - self
                .children
                .iter()
                .filter(|c| c.state != NodeState::Inactive)
                .map(|c| c.resources)
                .sum::<ResourceVector>()
    }

    /// Resources that must be re-placed if this host fails.
    fn load(&self) -> ResourceVector {
        self.active_children().sum()
    }

    fn active_children(&self) -> impl Iterator<Item = ResourceVector> + '_ {
        self.children
            .iter()
            .filter(|c| c.is_active())
            .map(|c| c.resources)
    }

    /// The host as seen by a move into it, without any hostnames.
    ///
    /// Hosts of equal shape are interchangeable as move destinations.
    fn shape(&self) -> HostShape {
        let mut children: Vec<_> = self
            .children
            .iter()
            .map(|c| (bits(&c.resources), c.state, c.key.clone(), c.at_origin))
            .collect();
        children.sort();
        HostShape {
            capacity: bits(&self.capacity),
            children,
        }
    }

    fn has_cluster(&self, key: &ClusterKey) -> bool {
        self.children.iter().any(|c| {
            c.key.as_ref().is_some_and(|k| {
                k.application == key.application && k.cluster == key.cluster
            })
        })
    }
}

/// Active hosts and the nodes placed on them.
#[derive(Debug, Clone, Default)]
pub struct Fleet {
    /// Ordered by hostname.
    hosts: Vec<Host>,
}

impl Fleet {
    /// Capture the active hosts of a snapshot with all their children.
    pub fn from_snapshot(nodes: &NodeList) -> Self {
        let mut children: BTreeMap<&Hostname, Vec<Child>> = BTreeMap::new();
        for node in nodes.iter().filter(|n| !n.is_host()) {
            let Some(parent) = node.parent_hostname.as_ref() else {
                continue;
            };
            let key = node.allocation.as_ref().map(|a| ClusterKey {
                application: a.owner.clone(),
                cluster: a.cluster.id.clone(),
                group: a.cluster.group,
            });
            children.entry(parent).or_default().push(Child {
                hostname: node.hostname.clone(),
                resources: node.resources,
                state: node.state,
                key,
                at_origin: true,
            });
        }

        let hosts = nodes
            .hosts()
            .state(NodeState::Active)
            .iter()
            .map(|host| Host {
                hostname: host.hostname.clone(),
                capacity: host.resources,
                children: children.remove(&host.hostname).unwrap_or_default(),
            })
            .collect();
        Self { hosts }
    }

    pub fn host_count(&self) -> usize {
        self.hosts.len()
    }

    /// Number of host failures the fleet can absorb in the worst case.
    ///
    /// Hosts fail in order of decreasing load. The active children of a
    /// failed host are re-placed, largest first, on the surviving host with
    /// the least free capacity that still fits them. Counting stops at the
    /// first child that cannot be re-placed.
    pub fn spare_host_count(&self) -> usize {
        let mut survivors: Vec<Survivor<'_>> = self
            .hosts
            .iter()
            .map(|host| Survivor {
                hostname: &host.hostname,
                free: host.free(),
                load: host.load(),
                evacuees: host.active_children().collect(),
            })
            .collect();

        let mut failed = 0;
        while let Some(index) = heaviest(&survivors) {
            let mut evacuees = survivors.swap_remove(index).evacuees;
            evacuees.sort_by(|a, b| b.cmp_size(a));

            for resources in evacuees {
                let Some(target) = best_fit(&survivors, &resources) else {
                    return failed;
                };
                let target = &mut survivors[target];
                target.free = target.free - resources;
                target.load = target.load + resources;
                target.evacuees.push(resources);
            }
            failed += 1;
        }
        failed
    }

    /// Moves possible from this state, in a deterministic order.
    ///
    /// Nodes already moved by the plan leading here, inactive nodes and
    /// nodes of `excluded` applications stay put. Of several destinations
    /// with the same shape only the first by hostname is offered.
    pub fn candidate_moves(&self, excluded: &BTreeSet<ApplicationId>) -> Vec<Move> {
        let shapes: Vec<HostShape> = self.hosts.iter().map(Host::shape).collect();
        let mut moves = Vec::new();
        for from in &self.hosts {
            let mut groups: BTreeMap<&ClusterKey, (Vec<Hostname>, ResourceVector)> = BTreeMap::new();
            for child in from.children.iter().filter(|c| c.is_movable(excluded)) {
                if let Some(key) = &child.key {
                    let group = groups.entry(key).or_insert_with(|| (Vec::new(), ResourceVector::ZERO));
                    group.0.push(child.hostname.clone());
                    group.1 = group.1 + child.resources;
                }
            }

            for (key, (nodes, resources)) in groups {
                let mut offered: Vec<&HostShape> = Vec::new();
                for (to, shape) in self.hosts.iter().zip(&shapes) {
                    if to.hostname == from.hostname
                        || to.has_cluster(key)
                        || !to.free().satisfies(&resources)
                        || offered.contains(&shape)
                    {
                        continue;
                    }
                    offered.push(shape);
                    moves.push(Move {
                        key: key.clone(),
                        nodes: nodes.clone(),
                        from: from.hostname.clone(),
                        to: to.hostname.clone(),
                        resources,
                    });
                }
            }
        }
        moves
    }

    /// A copy of this fleet with `mv` applied.
    pub fn apply(&self, mv: &Move) -> Fleet {
        let mut fleet = self.clone();
        let mut moved = Vec::new();
        if let Some(from) = fleet.hosts.iter_mut().find(|h| h.hostname == mv.from) {
            let (leaving, staying): (Vec<Child>, Vec<Child>) = std::mem::take(&mut from.children)
                .into_iter()
                .partition(|c| mv.nodes.contains(&c.hostname));
            from.children = staying;
            moved = leaving;
        }
        if let Some(to) = fleet.hosts.iter_mut().find(|h| h.hostname == mv.to) {
            to.children.extend(moved.into_iter().map(|child| Child {
                at_origin: false,
                ..child
            }));
        }
        fleet
    }

    /// Identity of this state up to swapping hosts of equal capacity.
    ///
    /// Two fleets with the same signature place every node with the same
    /// neighbours on hosts of the same size, so they have the same spare
    /// count and the same moves ahead of them.
    pub fn signature(&self) -> FleetSignature {
        let mut hosts: Vec<_> = self
            .hosts
            .iter()
            .map(|host| {
                let mut children: Vec<_> = host
                    .children
                    .iter()
                    .map(|c| (c.hostname.clone(), c.at_origin))
                    .collect();
                children.sort();
                (bits(&host.capacity), children)
            })
            .collect();
        hosts.sort();
        FleetSignature(hosts)
    }
}

/// See [`Fleet::signature`].
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct FleetSignature(Vec<([u64; 4], Vec<(Hostname, bool)>)>);

#[derive(Debug, PartialEq)]
struct HostShape {
    capacity: [u64; 4],
    children: Vec<([u64; 4], NodeState, Option<ClusterKey>, bool)>,
}

/// Exact bit patterns, for use as a hash or equality key.
fn bits(resources: &ResourceVector) -> [u64; 4] {
    [
        resources.vcpu.to_bits(),
        resources.memory_gb.to_bits(),
        resources.disk_gb.to_bits(),
        resources.bandwidth_gbps.to_bits(),
    ]
}

struct Survivor<'a> {
    hostname: &'a Hostname,
    free: ResourceVector,
    load: ResourceVector,
    evacuees: Vec<ResourceVector>,
}

/// Index of the survivor with the largest load; ties go to the lowest hostname.
fn heaviest(survivors: &[Survivor<'_>]) -> Option<usize> {
    survivors
        .iter()
        .enumerate()
        .max_by(|(_, a), (_, b)| {
            a.load
                .cmp_size(&b.load)
                .then_with(|| b.hostname.cmp(a.hostname))
        })
        .map(|(index, _)| index)
}

/// Index of the survivor with the least free capacity that fits `resources`.
fn best_fit(survivors: &[Survivor<'_>], resources: &ResourceVector) -> Option<usize> {
    survivors
        .iter()
        .enumerate()
        .filter(|(_, s)| s.free.satisfies(resources))
        .min_by(|(_, a), (_, b)| compare_free(a, b))
        .map(|(index, _)| index)
}

fn compare_free(a: &Survivor<'_>, b: &Survivor<'_>) -> Ordering {
    a.free
        .cmp_size(&b.free)
        .then_with(|| a.hostname.cmp(b.hostname))
}

#[cfg(test)]
mod tests {
    use std::collections::BTreeSet;

    use super::*;
    use crate::model::{Allocation, ClusterSpec, ClusterType, IpConfig, Node};

    const FULL: ResourceVector = ResourceVector::new(10.0, 100.0, 1000.0, 1.0);
    const HALF: ResourceVector = ResourceVector::new(5.0, 50.0, 500.0, 0.5);

    fn name(s: &str) -> Hostname {
        s.parse().unwrap()
    }

    fn app(id: usize) -> ApplicationId {
        ApplicationId::from_parts(&format!("tenant{id}"), &format!("application{id}"), "default")
            .unwrap()
    }

    fn host(index: usize, resources: ResourceVector) -> Node {
        Node::host(name(&format!("host{index}")), resources, IpConfig::default())
            .with_state(NodeState::Active)
    }

    fn node(index: usize, app_id: usize, host: usize, resources: ResourceVector) -> Node {
        let cluster = ClusterSpec::new(ClusterType::Content, format!("cluster{app_id}").parse().unwrap())
            .with_group(0);
        Node::child(
            name(&format!("node{index}")),
            name(&format!("host{host}")),
            resources,
            BTreeSet::new(),
        )
        .with_allocation(Allocation::new(app(app_id), cluster, 0))
        .with_state(NodeState::Active)
    }

    #[test]
    fn test_empty_fleet_has_no_spares() {
        assert_eq!(Fleet::default().spare_host_count(), 0);
    }

    #[test]
    fn test_empty_hosts_are_all_spares() {
        let fleet = Fleet::from_snapshot(&NodeList::from_nodes([host(0, FULL), host(1, FULL)]));
        assert_eq!(fleet.spare_host_count(), 2);
    }

    #[test]
    fn test_one_free_host_is_one_spare() {
        let nodes = NodeList::from_nodes([host(0, FULL), host(1, FULL), node(0, 0, 0, FULL)]);
        assert_eq!(Fleet::from_snapshot(&nodes).spare_host_count(), 1);
    }

    #[test]
    fn test_half_used_hosts_absorb_each_other() {
        let nodes = NodeList::from_nodes([
            host(0, FULL),
            host(1, FULL),
            host(2, FULL),
            host(3, FULL),
            node(0, 0, 0, HALF),
            node(1, 0, 1, HALF),
            node(2, 1, 2, HALF),
            node(3, 1, 3, HALF),
        ]);
        assert_eq!(Fleet::from_snapshot(&nodes).spare_host_count(), 2);
    }

    #[test]
    fn test_inactive_hosts_are_ignored() {
        let nodes = NodeList::from_nodes([
            host(0, FULL),
            host(1, FULL).with_state(NodeState::Ready),
            node(0, 0, 0, FULL),
        ]);
        let fleet = Fleet::from_snapshot(&nodes);
        assert_eq!(fleet.host_count(), 1);
        assert_eq!(fleet.spare_host_count(), 0);
    }

    #[test]
    fn test_inactive_children_leave_room_for_a_spare() {
        let nodes = NodeList::from_nodes([
            host(0, FULL),
            host(1, FULL),
            node(0, 0, 0, FULL),
            node(1, 1, 1, FULL).with_state(NodeState::Inactive),
        ]);
        assert_eq!(Fleet::from_snapshot(&nodes).spare_host_count(), 1);
    }

    #[test]
    fn test_retired_children_still_hold_resources() {
        let cluster = ClusterSpec::new(ClusterType::Content, "cluster1".parse().unwrap());
        let retired = node(1, 1, 1, FULL).with_allocation(Allocation::new(app(1), cluster, 0).retire());
        let nodes = NodeList::from_nodes([host(0, FULL), host(1, FULL), node(0, 0, 0, FULL), retired]);
        assert_eq!(Fleet::from_snapshot(&nodes).spare_host_count(), 0);
    }

    #[test]
    fn test_moves_respect_capacity_and_cluster() {
        let nodes = NodeList::from_nodes([
            host(0, FULL),
            host(1, FULL),
            host(2, FULL),
            node(0, 0, 0, HALF),
            node(1, 0, 1, HALF),
            node(2, 1, 2, FULL),
        ]);
        let fleet = Fleet::from_snapshot(&nodes);
        let moves = fleet.candidate_moves(&BTreeSet::new());

        // Application 0 cannot share a host with itself and host2 is full
        assert!(moves.is_empty());

        let nodes = NodeList::from_nodes([
            host(0, FULL),
            host(1, FULL),
            node(0, 0, 0, HALF),
            node(1, 1, 1, HALF),
        ]);
        let fleet = Fleet::from_snapshot(&nodes);
        let moves = fleet.candidate_moves(&BTreeSet::new());
        let pairs: Vec<_> = moves.iter().map(|m| (m.nodes[0].to_string(), m.to.to_string())).collect();
        assert_eq!(
            pairs,
            vec![("node0".to_string(), "host1".to_string()), ("node1".to_string(), "host0".to_string())]
        );

        let excluded = BTreeSet::from([app(0)]);
        assert_eq!(fleet.candidate_moves(&excluded).len(), 1);
    }

    #[test]
    fn test_moved_nodes_do_not_move_again() {
        let nodes = NodeList::from_nodes([
            host(0, FULL),
            host(1, FULL),
            host(2, FULL),
            node(0, 0, 0, HALF),
        ]);
        let fleet = Fleet::from_snapshot(&nodes);
        let first = fleet.candidate_moves(&BTreeSet::new())[0].clone();
        assert_eq!(first.to, name("host1"));

        let moved = fleet.apply(&first);
        assert!(moved.candidate_moves(&BTreeSet::new()).is_empty());
        assert_eq!(moved.spare_host_count(), 2);
    }

    #[test]
    fn test_equal_destinations_are_offered_once() {
        let nodes = NodeList::from_nodes([
            host(0, FULL),
            host(1, HALF),
            host(2, HALF),
            host(3, HALF),
            host(4, FULL),
            node(0, 0, 0, HALF),
        ]);
        let fleet = Fleet::from_snapshot(&nodes);
        let destinations: Vec<_> = fleet
            .candidate_moves(&BTreeSet::new())
            .into_iter()
            .map(|m| m.to.to_string())
            .collect();
        assert_eq!(destinations, vec!["host1", "host4"]);
    }

    #[test]
    fn test_signature_ignores_which_equal_host_is_used() {
        let nodes = NodeList::from_nodes([
            host(0, FULL),
            host(1, FULL),
            host(2, FULL),
            node(0, 0, 0, HALF),
        ]);
        let fleet = Fleet::from_snapshot(&nodes);
        let to = |hostname: &str| Move {
            key: ClusterKey {
                application: app(0),
                cluster: "cluster0".parse().unwrap(),
                group: Some(0),
            },
            nodes: vec![name("node0")],
            from: name("host0"),
            to: name(hostname),
            resources: HALF,
        };

        let one = fleet.apply(&to("host1"));
        let other = fleet.apply(&to("host2"));
        assert_eq!(one.signature(), other.signature());
        assert_ne!(one.signature(), fleet.signature());
    }

    #[test]
    fn test_group_moves_together() {
        let nodes = NodeList::from_nodes([
            host(0, FULL),
            host(1, FULL),
            node(0, 0, 0, ResourceVector::new(2.0, 20.0, 200.0, 0.2)),
            node(1, 0, 0, ResourceVector::new(2.0, 20.0, 200.0, 0.2)),
        ]);
        let fleet = Fleet::from_snapshot(&nodes);
        let moves = fleet.candidate_moves(&BTreeSet::new());

        assert_eq!(moves.len(), 1);
        assert_eq!(moves[0].nodes, vec![name("node0"), name("node1")]);
        assert_eq!(moves[0].resources, ResourceVector::new(4.0, 40.0, 400.0, 0.4));
    }
}
