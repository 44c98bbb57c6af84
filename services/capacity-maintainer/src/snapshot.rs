//! Loading the fleet from a snapshot file.

use std::path::Path;

use anyhow::{Context, Result};
use fleet_capacity::{Node, NodeRepository};
use serde::{Deserialize, Serialize};
use tracing::info;

/// Serialized form of the fleet: `{"nodes": [...]}`.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct FleetSnapshot {
    pub nodes: Vec<Node>,
}

impl FleetSnapshot {
    /// Parse a snapshot from JSON.
    pub fn parse(json: &str) -> Result<Self> {
        serde_json::from_str(json).context("invalid fleet snapshot")
    }

    /// Read and parse a snapshot file.
    pub async fn load(path: &Path) -> Result<Self> {
        let json = tokio::fs::read_to_string(path)
            .await
            .with_context(|| format!("failed to read {}", path.display()))?;
        Self::parse(&json)
    }

    /// Create a repository holding every node of the snapshot.
    pub fn into_repository(self) -> Result<NodeRepository> {
        let repository = NodeRepository::new();
        let added = repository.add_nodes(self.nodes)?;
        let hosts = repository.list().hosts().len();
        info!(nodes = added, hosts, "Loaded fleet snapshot");
        Ok(repository)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const SNAPSHOT: &str = r#"{
        "nodes": [
            {
                "hostname": "host1.example.com",
                "node_type": "host",
                "state": "active",
                "resources": {"vcpu": 16.0, "memory_gb": 64.0, "disk_gb": 1000.0, "bandwidth_gbps": 10.0},
                "ip_config": {"primary": ["10.0.0.1"], "pool": ["10.0.1.1", "10.0.1.2"]}
            },
            {
                "hostname": "node1.example.com",
                "node_type": "tenant",
                "state": "active",
                "resources": {"vcpu": 4.0, "memory_gb": 16.0, "disk_gb": 100.0, "bandwidth_gbps": 1.0},
                "parent_hostname": "host1.example.com",
                "allocation": {
                    "owner": "tenant1:app1:default",
                    "cluster": {"cluster_type": "content", "id": "music", "group": 0},
                    "index": 0
                },
                "ip_config": {"primary": ["10.0.1.1"]}
            }
        ]
    }"#;

    #[test]
    fn test_parse_snapshot() {
        let snapshot = FleetSnapshot::parse(SNAPSHOT).unwrap();
        assert_eq!(snapshot.nodes.len(), 2);

        let node = &snapshot.nodes[1];
        assert!(!node.is_retired());
        assert_eq!(node.owner().map(|o| o.to_string()).as_deref(), Some("tenant1:app1:default"));
    }

    #[test]
    fn test_into_repository() {
        let repository = FleetSnapshot::parse(SNAPSHOT)
            .unwrap()
            .into_repository()
            .unwrap();
        assert_eq!(repository.len(), 2);
        assert_eq!(repository.list().hosts().len(), 1);
    }

    #[test]
    fn test_duplicate_hostnames_are_rejected() {
        let mut snapshot = FleetSnapshot::parse(SNAPSHOT).unwrap();
        snapshot.nodes.push(snapshot.nodes[0].clone());
        assert!(snapshot.into_repository().is_err());
    }

    #[test]
    fn test_invalid_owner_is_rejected() {
        let json = SNAPSHOT.replace("tenant1:app1:default", "not an application");
        assert!(FleetSnapshot::parse(&json).is_err());
    }

    #[tokio::test]
    async fn test_missing_file() {
        let err = FleetSnapshot::load(Path::new("/nonexistent/fleet.json"))
            .await
            .unwrap_err();
        assert!(err.to_string().contains("/nonexistent/fleet.json"));
    }
}
