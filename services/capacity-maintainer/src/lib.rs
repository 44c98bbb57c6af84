//! Capacity maintainer service.
//!
//! Loads a fleet snapshot into an in-memory repository and keeps running
//! spare capacity maintenance over it. Redeployments and metrics are
//! written to the log.

pub mod config;
pub mod dry_run;
pub mod snapshot;
pub mod worker;
