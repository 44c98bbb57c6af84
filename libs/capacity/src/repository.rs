//! In-memory node repository.
//!
//! The repository is the single shared mutable resource. Readers take a
//! [`NodeList`] snapshot and never see a partial write; writers go through
//! narrow operations that replace whole nodes under a write lock.
//!
//! Application locks serialize changes to one application's nodes. They
//! are independent of the snapshot lock, so holding one never blocks
//! readers or other applications.

use std::collections::{BTreeMap, BTreeSet, HashMap};
use std::sync::Arc;
use std::time::Duration;

use fleet_id::{ApplicationId, Hostname};
use parking_lot::{Mutex, RwLock};
use tokio::sync::OwnedMutexGuard;
use tracing::{debug, info};

use crate::model::{Node, NodeState};
use crate::snapshot::NodeList;

/// Errors from repository writes.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum RepositoryError {
    /// A node with this hostname already exists.
    #[error("node {0} already exists")]
    DuplicateNode(Hostname),

    /// No node with this hostname exists.
    #[error("node {0} not found")]
    UnknownNode(Hostname),

    /// The node is not allocated to the application holding the lock.
    #[error("node {hostname} is not allocated to {application}")]
    NotOwned {
        hostname: Hostname,
        application: ApplicationId,
    },

    /// A write needing the application lock was attempted without it.
    #[error("{0} is not locked")]
    NotLocked(ApplicationId),
}

/// Failure to acquire an application lock.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum LockError {
    /// Someone else held the lock for the whole timeout.
    #[error("could not lock {application} within {timeout:?}")]
    Unavailable {
        application: ApplicationId,
        timeout: Duration,
    },
}

/// Exclusive right to change one application's nodes.
///
/// Released on drop.
#[derive(Debug)]
pub struct ApplicationLock {
    application: ApplicationId,
    _guard: OwnedMutexGuard<()>,
}

impl ApplicationLock {
    pub fn application(&self) -> &ApplicationId {
        &self.application
    }
}

/// Thread-safe store of all hosts and nodes.
#[derive(Debug, Default)]
pub struct NodeRepository {
    nodes: RwLock<BTreeMap<Hostname, Arc<Node>>>,
    /// Only applications whose lock is held or awaited have an entry.
    locks: Mutex<HashMap<ApplicationId, Arc<tokio::sync::Mutex<()>>>>,
}

impl NodeRepository {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add nodes in one transaction. Nothing is added if any hostname is taken.
    pub fn add_nodes(&self, nodes: impl IntoIterator<Item = Node>) -> Result<usize, RepositoryError> {
        let nodes: Vec<Node> = nodes.into_iter().collect();
        let mut stored = self.nodes.write();

        {
            let mut seen = BTreeSet::new();
            for node in &nodes {
                if stored.contains_key(&node.hostname) || !seen.insert(&node.hostname) {
                    return Err(RepositoryError::DuplicateNode(node.hostname.clone()));
                }
            }
        }

        let count = nodes.len();
        for node in nodes {
            stored.insert(node.hostname.clone(), Arc::new(node));
        }
        debug!(count, total = stored.len(), "Added nodes");
        Ok(count)
    }

    /// A consistent snapshot of every node.
    pub fn list(&self) -> NodeList {
        NodeList::new(self.nodes.read().values().cloned())
    }

    pub fn get(&self, hostname: &Hostname) -> Option<Arc<Node>> {
        self.nodes.read().get(hostname).cloned()
    }

    /// Active nodes allocated to `application`.
    pub fn active_nodes(&self, application: &ApplicationId) -> NodeList {
        self.list().owner(application).state(NodeState::Active)
    }

    pub fn len(&self) -> usize {
        self.nodes.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.nodes.read().is_empty()
    }

    /// Lock `application`, waiting at most `timeout`.
    pub async fn lock(
        &self,
        application: &ApplicationId,
        timeout: Duration,
    ) -> Result<ApplicationLock, LockError> {
        let mutex = {
            let mut locks = self.locks.lock();
            // Guards and waiters hold a clone, so a count of one is unused
            locks.retain(|_, mutex| Arc::strong_count(mutex) > 1);
            locks.entry(application.clone()).or_default().clone()
        };

        match tokio::time::timeout(timeout, mutex.lock_owned()).await {
            Ok(guard) => Ok(ApplicationLock {
                application: application.clone(),
                _guard: guard,
            }),
            Err(_) => Err(LockError::Unavailable {
                application: application.clone(),
                timeout,
            }),
        }
    }

    /// Mark nodes of the locked application as retired.
    ///
    /// All nodes are retired or none are. Nodes already retired are left
    /// untouched. Returns the number of nodes changed.
    pub fn retire(
        &self,
        lock: &ApplicationLock,
        hostnames: &[Hostname],
    ) -> Result<usize, RepositoryError> {
        let mut stored = self.nodes.write();

        let mut updates = Vec::new();
        for hostname in hostnames {
            let node = stored
                .get(hostname)
                .ok_or_else(|| RepositoryError::UnknownNode(hostname.clone()))?;
            let allocation = node
                .allocation
                .as_ref()
                .filter(|a| &a.owner == lock.application())
                .ok_or_else(|| RepositoryError::NotOwned {
                    hostname: hostname.clone(),
                    application: lock.application().clone(),
                })?;
            if !allocation.retired {
                updates.push(node.with_allocation(allocation.retire()));
            }
        }

        let count = updates.len();
        for node in updates {
            info!(
                node = %node.hostname,
                application = %lock.application(),
                "Retiring node"
            );
            stored.insert(node.hostname.clone(), Arc::new(node));
        }
        Ok(count)
    }

    #[cfg(test)]
    fn lock_entries(&self) -> usize {
        self.locks.lock().len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::{Allocation, ClusterSpec, ClusterType, IpConfig};
    use crate::resources::ResourceVector;

    const RESOURCES: ResourceVector = ResourceVector::new(1.0, 10.0, 100.0, 0.1);

    fn app(name: &str) -> ApplicationId {
        ApplicationId::from_parts("tenant1", name, "default").unwrap()
    }

    fn name(s: &str) -> Hostname {
        s.parse().unwrap()
    }

    fn node(hostname: &str, owner: &str) -> Node {
        let cluster = ClusterSpec::new(ClusterType::Container, "c1".parse().unwrap());
        Node::child(name(hostname), name("host1"), RESOURCES, BTreeSet::new())
            .with_allocation(Allocation::new(app(owner), cluster, 0))
            .with_state(NodeState::Active)
    }

    fn repository() -> NodeRepository {
        let repository = NodeRepository::new();
        repository
            .add_nodes([
                Node::host(name("host1"), RESOURCES, IpConfig::default()),
                node("node1", "a"),
                node("node2", "a"),
                node("node3", "b"),
            ])
            .unwrap();
        repository
    }

    #[test]
    fn test_add_duplicate_is_rejected_atomically() {
        let repository = repository();
        let result = repository.add_nodes([node("node4", "a"), node("node1", "a")]);

        assert_eq!(result, Err(RepositoryError::DuplicateNode(name("node1"))));
        assert!(repository.get(&name("node4")).is_none());
        assert_eq!(repository.len(), 4);
    }

    #[test]
    fn test_active_nodes() {
        assert_eq!(repository().active_nodes(&app("a")).len(), 2);
        assert!(repository().active_nodes(&app("c")).is_empty());
    }

    #[tokio::test]
    async fn test_retire() {
        let repository = repository();
        let before = repository.list();
        let lock = repository.lock(&app("a"), Duration::from_secs(1)).await.unwrap();

        assert_eq!(repository.retire(&lock, &[name("node1")]).unwrap(), 1);
        assert!(repository.get(&name("node1")).unwrap().is_retired());
        // Snapshots taken earlier are unaffected
        assert!(!before.get(&name("node1")).unwrap().is_retired());
        // Retiring again changes nothing
        assert_eq!(repository.retire(&lock, &[name("node1")]).unwrap(), 0);
    }

    #[tokio::test]
    async fn test_retire_is_all_or_nothing() {
        let repository = repository();
        let lock = repository.lock(&app("a"), Duration::from_secs(1)).await.unwrap();

        let result = repository.retire(&lock, &[name("node2"), name("node3")]);
        assert!(matches!(result, Err(RepositoryError::NotOwned { .. })));
        assert!(!repository.get(&name("node2")).unwrap().is_retired());

        let result = repository.retire(&lock, &[name("node2"), name("node9")]);
        assert_eq!(result, Err(RepositoryError::UnknownNode(name("node9"))));
        assert!(!repository.get(&name("node2")).unwrap().is_retired());
    }

    #[tokio::test]
    async fn test_lock_times_out_while_held() {
        let repository = repository();
        let held = repository.lock(&app("a"), Duration::from_secs(1)).await.unwrap();

        let result = repository.lock(&app("a"), Duration::from_millis(10)).await;
        assert!(matches!(result, Err(LockError::Unavailable { .. })));

        // Other applications are not blocked
        assert!(repository.lock(&app("b"), Duration::from_millis(10)).await.is_ok());

        drop(held);
        assert!(repository.lock(&app("a"), Duration::from_millis(10)).await.is_ok());
    }

    #[tokio::test]
    async fn test_unused_locks_are_forgotten() {
        let repository = repository();
        for name in ["a", "b", "c", "d"] {
            let lock = repository.lock(&app(name), Duration::from_secs(1)).await.unwrap();
            drop(lock);
        }
        let held = repository.lock(&app("e"), Duration::from_secs(1)).await.unwrap();
        assert_eq!(repository.lock_entries(), 1);

        // A timed out waiter leaves only the held entry behind
        assert!(repository.lock(&app("e"), Duration::from_millis(10)).await.is_err());
        let other = repository.lock(&app("f"), Duration::from_secs(1)).await.unwrap();
        assert_eq!(repository.lock_entries(), 2);

        drop(held);
        drop(other);
        let _last = repository.lock(&app("g"), Duration::from_secs(1)).await.unwrap();
        assert_eq!(repository.lock_entries(), 1);
    }
}
