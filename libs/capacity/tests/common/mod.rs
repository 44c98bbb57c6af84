//! Shared fixture for fleet scenario tests.

#![allow(dead_code)]

use std::collections::BTreeSet;
use std::net::{IpAddr, Ipv4Addr};
use std::sync::Arc;

use fleet_capacity::metric::SPARE_HOST_CAPACITY;
use fleet_capacity::{
    Allocation, ClusterSpec, ClusterType, InMemoryMetric, IpConfig, MaintainerConfig,
    MockDeployer, Node, NodeRepository, NodeState, ResourceVector, SpareCapacityMaintainer,
};
use fleet_id::{ApplicationId, Hostname};
use fleet_networking::AddressPool;

/// Addresses in each host's pool.
const POOL_SIZE: u8 = 10;

/// A repository with a maintainer, a mock deployer and an in-memory metric.
///
/// Hosts are named `host0`, `host1`, ... and nodes `node0`, `node1`, ...
/// in order of creation. Every host is active, and so is every node not
/// added through [`FleetTester::add_nodes_in_state`].
pub struct FleetTester {
    pub repository: Arc<NodeRepository>,
    pub deployer: MockDeployer,
    pub metric: Arc<InMemoryMetric>,
    pub maintainer: SpareCapacityMaintainer,
    host_index: usize,
    node_index: usize,
}

impl FleetTester {
    pub fn new() -> Self {
        Self::with_config(MaintainerConfig::default())
    }

    pub fn with_max_iterations(max_iterations: usize) -> Self {
        Self::with_config(MaintainerConfig::default().with_max_iterations(max_iterations))
    }

    pub fn with_config(config: MaintainerConfig) -> Self {
        let repository = Arc::new(NodeRepository::new());
        let deployer = MockDeployer::new();
        let metric = Arc::new(InMemoryMetric::new());
        let maintainer = SpareCapacityMaintainer::new(
            repository.clone(),
            Arc::new(deployer.clone()),
            metric.clone(),
            config,
        );
        Self {
            repository,
            deployer,
            metric,
            maintainer,
            host_index: 0,
            node_index: 0,
        }
    }

    pub fn app(id: usize) -> ApplicationId {
        ApplicationId::from_parts(&format!("tenant{id}"), &format!("application{id}"), "default")
            .unwrap()
    }

    pub fn hostname(name: &str) -> Hostname {
        name.parse().unwrap()
    }

    /// Add `count` active hosts with a pool of free addresses each.
    pub fn add_hosts(&mut self, count: usize, resources: ResourceVector) {
        let hosts: Vec<_> = (0..count)
            .map(|_| {
                let index = self.host_index;
                self.host_index += 1;
                let octet = u8::try_from(index).unwrap();
                let ip_config = IpConfig {
                    primary: BTreeSet::from([ip(1, octet, 0)]),
                    pool: AddressPool::new((1..=POOL_SIZE).map(|n| ip(2, octet, n))),
                };
                Node::host(Self::hostname(&format!("host{index}")), resources, ip_config)
                    .with_state(NodeState::Active)
            })
            .collect();
        self.repository.add_nodes(hosts).unwrap();
    }

    /// Add `count` active nodes of application `id` in one content cluster,
    /// placed on consecutive hosts starting at `host_offset`.
    pub fn add_nodes(&mut self, id: usize, count: usize, resources: ResourceVector, host_offset: usize) {
        self.add_nodes_in_state(id, count, resources, host_offset, NodeState::Active);
    }

    pub fn add_nodes_in_state(
        &mut self,
        id: usize,
        count: usize,
        resources: ResourceVector,
        host_offset: usize,
        state: NodeState,
    ) {
        let cluster = ClusterSpec::new(ClusterType::Content, format!("cluster{id}").parse().unwrap())
            .with_group(0);
        let nodes: Vec<_> = (0..count)
            .map(|i| {
                let index = self.node_index;
                self.node_index += 1;
                Node::child(
                    Self::hostname(&format!("node{index}")),
                    Self::hostname(&format!("host{}", host_offset + i)),
                    resources,
                    BTreeSet::new(),
                )
                .with_allocation(Allocation::new(Self::app(id), cluster.clone(), i as u32))
                .with_state(state)
            })
            .collect();
        self.repository.add_nodes(nodes).unwrap();
    }

    pub fn retired(&self) -> Vec<Hostname> {
        self.repository
            .list()
            .retired()
            .iter()
            .map(|node| node.hostname.clone())
            .collect()
    }

    pub fn spare_host_capacity(&self) -> Option<f64> {
        self.metric.get(SPARE_HOST_CAPACITY)
    }
}

fn ip(network: u8, host: u8, n: u8) -> IpAddr {
    IpAddr::V4(Ipv4Addr::new(10, network, host, n))
}

/// Resources scaled from one vcpu: `n` vcpu, `10n` GB memory, `100n` GB
/// disk and `n / 10` Gbps.
pub fn size(n: f64) -> ResourceVector {
    ResourceVector::new(n, n * 10.0, n * 100.0, n / 10.0)
}
