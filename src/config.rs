//! Process configuration from environment variables (a `.env` file is honored by the binary).

use std::path::PathBuf;
use std::str::FromStr;
use std::time::Duration;

use crate::error::ConfigError;
use crate::nearby::DEFAULT_LIVE_CONCURRENCY;
use crate::sync::{DEFAULT_STALE_CUTOFF_DAYS, DEFAULT_SYNC_CONCURRENCY};

pub const DEFAULT_SYNC_INTERVAL_SECS: u64 = 3600;
pub const DEFAULT_NEARBY_RADIUS_METERS: f64 = 500.0;
pub const DEFAULT_HTTP_TIMEOUT_SECS: u64 = 30;

#[derive(Debug, Clone, PartialEq)]
pub struct AppConfig {
    /// JSON array of repository descriptors. Required.
    pub repositories_path: PathBuf,
    /// JSON snapshot of the stop index. Without it stops live only in memory.
    pub stops_path: Option<PathBuf>,
    /// Where fetched archives and extracted tables are kept.
    pub work_dir: Option<PathBuf>,
    pub stale_cutoff_days: i64,
    pub sync_interval: Duration,
    pub sync_concurrency: usize,
    pub nearby_radius_meters: f64,
    pub live_concurrency: usize,
    pub http_timeout: Duration,
}

impl AppConfig {
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|name| std::env::var(name).ok())
    }

    /// Builds the config from any key lookup; unset and empty values take defaults.
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self, ConfigError> {
        let get = |name: &str| lookup(name).filter(|v| !v.trim().is_empty());

        let repositories_path = get("REPOSITORIES_PATH")
            .map(PathBuf::from)
            .ok_or(ConfigError::Missing("REPOSITORIES_PATH"))?;

        Ok(Self {
            repositories_path,
            stops_path: get("STOPS_PATH").map(PathBuf::from),
            work_dir: get("WORK_DIR").map(PathBuf::from),
            stale_cutoff_days: parsed(&get, "STALE_CUTOFF_DAYS", DEFAULT_STALE_CUTOFF_DAYS)?,
            sync_interval: Duration::from_secs(parsed(
                &get,
                "SYNC_INTERVAL_SECS",
                DEFAULT_SYNC_INTERVAL_SECS,
            )?),
            sync_concurrency: parsed(&get, "SYNC_CONCURRENCY", DEFAULT_SYNC_CONCURRENCY)?,
            nearby_radius_meters: parsed(
                &get,
                "NEARBY_RADIUS_METERS",
                DEFAULT_NEARBY_RADIUS_METERS,
            )?,
            live_concurrency: parsed(&get, "LIVE_CONCURRENCY", DEFAULT_LIVE_CONCURRENCY)?,
            http_timeout: Duration::from_secs(parsed(
                &get,
                "HTTP_TIMEOUT_SECS",
                DEFAULT_HTTP_TIMEOUT_SECS,
            )?),
        })
    }
}

fn parsed<T: FromStr>(
    get: &impl Fn(&str) -> Option<String>,
    name: &'static str,
    default: T,
) -> Result<T, ConfigError> {
    match get(name) {
        None => Ok(default),
        Some(value) => value
            .trim()
            .parse()
            .map_err(|_| ConfigError::Invalid { name, value }),
    }
}
