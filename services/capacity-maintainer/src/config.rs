//! Configuration for the capacity maintainer service.

use std::path::PathBuf;
use std::time::Duration;

use anyhow::{Context, Result};
use fleet_capacity::MaintainerConfig;

/// Service configuration.
#[derive(Debug, Clone)]
pub struct Config {
    /// JSON fleet snapshot loaded at startup.
    pub snapshot_path: PathBuf,

    /// Maintainer tunables.
    pub maintainer: MaintainerConfig,

    /// Log level (trace, debug, info, warn, error).
    pub log_level: String,
}

impl Config {
    /// Load configuration from environment variables.
    pub fn from_env() -> Result<Self> {
        Self::from_vars(|key| std::env::var(key).ok())
    }

    /// Load configuration from a variable lookup.
    pub fn from_vars(var: impl Fn(&str) -> Option<String>) -> Result<Self> {
        let defaults = MaintainerConfig::default();

        let snapshot_path = var("FLEET_SNAPSHOT_PATH")
            .unwrap_or_else(|| "fleet.json".to_string())
            .into();

        let spare_target = parse(&var, "FLEET_SPARE_TARGET", defaults.spare_target)?;
        let max_iterations = parse(&var, "FLEET_MAX_ITERATIONS", defaults.max_iterations)?;
        let lock_timeout_ms = parse(
            &var,
            "FLEET_LOCK_TIMEOUT_MS",
            defaults.lock_timeout.as_millis() as u64,
        )?;
        let interval_secs = parse(
            &var,
            "FLEET_MAINTENANCE_INTERVAL_SECS",
            defaults.interval.as_secs(),
        )?;

        let log_level = var("FLEET_LOG_LEVEL").unwrap_or_else(|| "info".to_string());

        Ok(Self {
            snapshot_path,
            maintainer: MaintainerConfig {
                spare_target,
                max_iterations,
                lock_timeout: Duration::from_millis(lock_timeout_ms),
                interval: Duration::from_secs(interval_secs),
            },
            log_level,
        })
    }
}

fn parse<T>(var: &impl Fn(&str) -> Option<String>, key: &str, default: T) -> Result<T>
where
    T: std::str::FromStr,
    T::Err: std::error::Error + Send + Sync + 'static,
{
    match var(key) {
        Some(value) => value
            .parse()
            .with_context(|| format!("invalid {key}: {value:?}")),
        None => Ok(default),
    }
}
