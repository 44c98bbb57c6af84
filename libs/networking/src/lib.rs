//! Networking utilities for node placement.
//!
//! This library provides helpers for:
//! - Address pools owned by hosts, from which child nodes get their addresses
//! - Name resolution of pool addresses into the hostname of a new node
//! - A mock resolver for tests and dry runs

use std::collections::{BTreeMap, BTreeSet};
use std::net::IpAddr;

use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::debug;

/// Networking errors.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum NetworkError {
    /// Invalid IP address.
    #[error("invalid IP address: {0}")]
    InvalidAddress(String),

    /// The address has no name record.
    #[error("could not resolve hostname of {address}: {reason}")]
    Resolution { address: IpAddr, reason: String },
}

// ============================================================================
// Name resolution
// ============================================================================

/// Resolves addresses to hostnames when a new node is synthesized on a host.
pub trait NameResolver: Send + Sync {
    /// Returns the hostname registered for an address.
    fn resolve_hostname(&self, address: IpAddr) -> Result<String, NetworkError>;
}

/// In-memory resolver for tests and dry runs.
#[derive(Debug, Clone, Default)]
pub struct MockNameResolver {
    records: BTreeMap<IpAddr, String>,
    any_lookup: bool,
}

impl MockNameResolver {
    /// Create a resolver with no records.
    pub fn new() -> Self {
        Self::default()
    }

    /// Add an explicit address record.
    pub fn add_record(mut self, address: IpAddr, hostname: &str) -> Self {
        self.records.insert(address, hostname.to_string());
        self
    }

    /// Answer lookups without a record with a name derived from the address.
    pub fn mock_any_lookup(mut self) -> Self {
        self.any_lookup = true;
        self
    }
}

impl NameResolver for MockNameResolver {
    fn resolve_hostname(&self, address: IpAddr) -> Result<String, NetworkError> {
        if let Some(hostname) = self.records.get(&address) {
            return Ok(hostname.clone());
        }
        if self.any_lookup {
            return Ok(generated_hostname(address));
        }
        Err(NetworkError::Resolution {
            address,
            reason: "no record".to_string(),
        })
    }
}

/// Derive a stable hostname from an address, e.g. `10-0-0-1.node.local`.
fn generated_hostname(address: IpAddr) -> String {
    let label: String = address
        .to_string()
        .chars()
        .map(|c| if c.is_ascii_alphanumeric() { c } else { '-' })
        .collect();
    format!("{}.node.local", label.trim_matches('-'))
}

// ============================================================================
// Address pools
// ============================================================================

/// Addresses a host can hand out to its children.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct AddressPool {
    addresses: BTreeSet<IpAddr>,
}

/// Address and hostname assigned to a new node.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AddressAllocation {
    /// Hostname the address resolves to.
    pub hostname: String,

    /// Addresses assigned to the node.
    pub addresses: BTreeSet<IpAddr>,
}

impl AddressPool {
    /// Create a pool from a set of addresses.
    pub fn new(addresses: impl IntoIterator<Item = IpAddr>) -> Self {
        Self {
            addresses: addresses.into_iter().collect(),
        }
    }

    /// Parse a pool from textual addresses.
    pub fn parse<'a>(addresses: impl IntoIterator<Item = &'a str>) -> Result<Self, NetworkError> {
        let addresses = addresses
            .into_iter()
            .map(|s| {
                s.parse::<IpAddr>()
                    .map_err(|_| NetworkError::InvalidAddress(s.to_string()))
            })
            .collect::<Result<BTreeSet<_>, _>>()?;
        Ok(Self { addresses })
    }

    pub fn is_empty(&self) -> bool {
        self.addresses.is_empty()
    }

    /// Addresses in this pool not present in `used`, in ascending order.
    pub fn unused<'a>(&'a self, used: &'a BTreeSet<IpAddr>) -> impl Iterator<Item = IpAddr> + 'a {
        self.addresses.difference(used).copied()
    }

    /// Number of addresses not present in `used`.
    pub fn free_count(&self, used: &BTreeSet<IpAddr>) -> usize {
        self.unused(used).count()
    }

    /// Find an allocation for a new node.
    ///
    /// Returns `Ok(None)` when every address is taken. A resolution failure
    /// of the first free address is returned as an error; the caller decides
    /// whether to skip this host.
    pub fn find_allocation(
        &self,
        used: &BTreeSet<IpAddr>,
        resolver: &dyn NameResolver,
    ) -> Result<Option<AddressAllocation>, NetworkError> {
        let Some(address) = self.unused(used).next() else {
            return Ok(None);
        };

        let hostname = resolver.resolve_hostname(address)?;
        debug!(%address, %hostname, "Resolved address for new node");

        Ok(Some(AddressAllocation {
            hostname,
            addresses: BTreeSet::from([address]),
        }))
    }
}
