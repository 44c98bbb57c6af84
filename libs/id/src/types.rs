//! Name type definitions for fleet resources.
//!
//! Plain names share one character set; hostnames additionally allow dots.
//! `ApplicationId` is the composite owner identity of allocated nodes.

use crate::define_name;
use crate::IdError;

/// Characters allowed in tenant, application, instance and cluster names.
fn is_label_char(c: char) -> bool {
    c.is_ascii_alphanumeric() || c == '-' || c == '_'
}

/// Characters allowed in hostnames.
fn is_hostname_char(c: char) -> bool {
    c.is_ascii_alphanumeric() || c == '-' || c == '.'
}

// =============================================================================
// Ownership
// =============================================================================

define_name!(TenantName, "tenant name", 64, is_label_char);
define_name!(ApplicationName, "application name", 64, is_label_char);
define_name!(InstanceName, "instance name", 64, is_label_char);

// =============================================================================
// Placement
// =============================================================================

define_name!(ClusterId, "cluster id", 64, is_label_char);
define_name!(Hostname, "hostname", 253, is_hostname_char);

// =============================================================================
// Application identity
// =============================================================================

/// Identity of a deployed application: `{tenant}:{application}:{instance}`.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct ApplicationId {
    tenant: TenantName,
    application: ApplicationName,
    instance: InstanceName,
}

impl ApplicationId {
    /// Instance name used when none is given.
    pub const DEFAULT_INSTANCE: &'static str = "default";

    /// Creates an application ID from already validated parts.
    #[must_use]
    pub fn new(tenant: TenantName, application: ApplicationName, instance: InstanceName) -> Self {
        Self {
            tenant,
            application,
            instance,
        }
    }

    /// Validates each part and builds an application ID.
    pub fn from_parts(tenant: &str, application: &str, instance: &str) -> Result<Self, IdError> {
        Ok(Self {
            tenant: tenant.parse()?,
            application: application.parse()?,
            instance: instance.parse()?,
        })
    }

    /// Parses the serialized form `tenant:application:instance`.
    pub fn parse(s: &str) -> Result<Self, IdError> {
        let mut parts = s.split(':');
        match (parts.next(), parts.next(), parts.next(), parts.next()) {
            (Some(tenant), Some(application), Some(instance), None) => {
                Self::from_parts(tenant, application, instance)
            }
            _ => Err(IdError::MalformedApplicationId(s.to_string())),
        }
    }

    /// The owning tenant.
    pub fn tenant(&self) -> &TenantName {
        &self.tenant
    }

    pub fn application(&self) -> &ApplicationName {
        &self.application
    }

    pub fn instance(&self) -> &InstanceName {
        &self.instance
    }
}

impl std::fmt::Display for ApplicationId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}:{}:{}", self.tenant, self.application, self.instance)
    }
}

impl std::str::FromStr for ApplicationId {
    type Err = IdError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::parse(s)
    }
}

impl serde::Serialize for ApplicationId {
    fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: serde::Serializer,
    {
        serializer.serialize_str(&self.to_string())
    }
}

impl<'de> serde::Deserialize<'de> for ApplicationId {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: serde::Deserializer<'de>,
    {
        let s = String::deserialize(deserializer)?;
        Self::parse(&s).map_err(serde::de::Error::custom)
    }
}
