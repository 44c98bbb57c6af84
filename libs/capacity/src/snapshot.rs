//! Point-in-time view of the node repository.
//!
//! A [`NodeList`] is immutable: every filter returns a new list sharing the
//! same node values. Concurrent writers never affect a list already taken.

use std::collections::BTreeSet;
use std::net::IpAddr;
use std::sync::Arc;

use fleet_id::{ApplicationId, ClusterId, Hostname};

use crate::model::{Node, NodeState, NodeType};

/// An ordered, immutable list of nodes.
#[derive(Debug, Clone, Default)]
pub struct NodeList {
    nodes: Vec<Arc<Node>>,
}

impl NodeList {
    /// Create a list, ordered by hostname.
    pub fn new(nodes: impl IntoIterator<Item = Arc<Node>>) -> Self {
        let mut nodes: Vec<_> = nodes.into_iter().collect();
        nodes.sort_by(|a, b| a.hostname.cmp(&b.hostname));
        Self { nodes }
    }

    pub fn from_nodes(nodes: impl IntoIterator<Item = Node>) -> Self {
        Self::new(nodes.into_iter().map(Arc::new))
    }

    /// Keep the nodes matching `predicate`.
    pub fn matching(&self, predicate: impl Fn(&Node) -> bool) -> NodeList {
        Self {
            nodes: self
                .nodes
                .iter()
                .filter(|node| predicate(node))
                .cloned()
                .collect(),
        }
    }

    pub fn hosts(&self) -> NodeList {
        self.node_type(NodeType::Host)
    }

    pub fn node_type(&self, node_type: NodeType) -> NodeList {
        self.matching(|node| node.node_type == node_type)
    }

    pub fn state(&self, state: NodeState) -> NodeList {
        self.matching(|node| node.state == state)
    }

    /// Nodes allocated to `application`.
    pub fn owner(&self, application: &ApplicationId) -> NodeList {
        self.matching(|node| node.is_owned_by(application))
    }

    /// Allocated nodes belonging to the cluster with this id.
    pub fn cluster(&self, id: &ClusterId) -> NodeList {
        self.matching(|node| node.allocation.as_ref().is_some_and(|a| &a.cluster.id == id))
    }

    pub fn retired(&self) -> NodeList {
        self.matching(Node::is_retired)
    }

    pub fn not_retired(&self) -> NodeList {
        self.matching(|node| !node.is_retired())
    }

    /// Nodes whose parent is `host`.
    pub fn children_of(&self, host: &Node) -> NodeList {
        self.matching(|node| node.parent_hostname.as_ref() == Some(&host.hostname))
    }

    /// The parent host of `node`, if present in this list.
    pub fn parent_of(&self, node: &Node) -> Option<&Arc<Node>> {
        node.parent_hostname.as_ref().and_then(|parent| self.get(parent))
    }

    pub fn get(&self, hostname: &Hostname) -> Option<&Arc<Node>> {
        self.nodes
            .binary_search_by(|node| node.hostname.cmp(hostname))
            .ok()
            .map(|index| &self.nodes[index])
    }

    /// Primary addresses of every node in this list.
    pub fn addresses(&self) -> BTreeSet<IpAddr> {
        self.nodes
            .iter()
            .flat_map(|node| node.ip_config.primary.iter().copied())
            .collect()
    }

    pub fn iter(&self) -> impl Iterator<Item = &Arc<Node>> {
        self.nodes.iter()
    }

    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }
}

impl<'a> IntoIterator for &'a NodeList {
    type Item = &'a Arc<Node>;
    type IntoIter = std::slice::Iter<'a, Arc<Node>>;

    fn into_iter(self) -> Self::IntoIter {
        self.nodes.iter()
    }
}
