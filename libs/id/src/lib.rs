//! # fleet-id
//!
//! Validated name types for the fleet capacity engine.
//!
//! ## Design Principles
//!
//! - Names are operator- or tenant-chosen labels; they are validated once at
//!   the boundary and carried as typed values afterwards
//! - Every name has a canonical string form with strict parsing
//! - Names roundtrip through serialization (parse → format → parse)
//! - Types keep tenants, applications, clusters and hosts from being mixed up
//!
//! ## Formats
//!
//! - Plain names (`TenantName`, `ApplicationName`, `InstanceName`,
//!   `ClusterId`): `[A-Za-z0-9_-]+`, at most 64 characters
//! - `Hostname`: `[A-Za-z0-9.-]+`, at most 253 characters
//! - `ApplicationId`: `{tenant}:{application}:{instance}`
//!
//! Examples:
//! - `tenant1:music:default`
//! - `host3.example.com`

mod error;
mod macros;
mod types;

pub use error::IdError;
pub use types::*;
