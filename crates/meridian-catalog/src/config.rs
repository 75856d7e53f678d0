//! Tree-lock configuration.
//!
//! Operators tune three knobs: how many lock nodes may live in memory before
//! the reaper starts evicting (`maxNodesInMemory`), how far it evicts down to
//! (`minNodesInMemory`), and how often it wakes (`cleanIntervalMillis`).
//! Acquisition timeouts and long-hold reporting round out the surface.

use std::time::Duration;

use serde::{Deserialize, Serialize};

use meridian_core::{Error, Result};

/// Default high-water mark for in-memory lock nodes.
pub const DEFAULT_MAX_NODES_IN_MEMORY: usize = 100_000;

/// Default low-water mark for in-memory lock nodes.
pub const DEFAULT_MIN_NODES_IN_MEMORY: usize = 10_000;

/// Default reaper period (60 seconds).
pub const DEFAULT_CLEAN_INTERVAL_MILLIS: u64 = 60_000;

/// Default bound on a whole path acquisition (30 seconds).
pub const DEFAULT_ACQUIRE_TIMEOUT_MILLIS: u64 = 30_000;

/// Default age at which a hold is reported as long-running (30 seconds).
pub const DEFAULT_HOLD_WARN_THRESHOLD_MILLIS: u64 = 30_000;

/// Configuration for the tree-lock subsystem.
///
/// # Example
///
/// ```rust
/// use meridian_catalog::config::TreeLockConfig;
///
/// let config: TreeLockConfig = serde_json::from_str(
///     r#"{ "maxNodesInMemory": 5000, "minNodesInMemory": 500, "cleanIntervalMillis": 10000 }"#,
/// ).unwrap();
/// config.validate().unwrap();
/// assert_eq!(config.max_nodes_in_memory, 5000);
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct TreeLockConfig {
    /// Node count above which the reaper evicts (root included).
    pub max_nodes_in_memory: usize,

    /// Node count the reaper evicts down to (root included).
    pub min_nodes_in_memory: usize,

    /// Period between reaper passes, in milliseconds.
    pub clean_interval_millis: u64,

    /// Bound on acquiring a whole path, in milliseconds. `0` waits forever.
    pub acquire_timeout_millis: u64,

    /// Holds older than this are logged by the reaper, in milliseconds.
    pub hold_warn_threshold_millis: u64,
}

impl Default for TreeLockConfig {
    fn default() -> Self {
        Self {
            max_nodes_in_memory: DEFAULT_MAX_NODES_IN_MEMORY,
            min_nodes_in_memory: DEFAULT_MIN_NODES_IN_MEMORY,
            clean_interval_millis: DEFAULT_CLEAN_INTERVAL_MILLIS,
            acquire_timeout_millis: DEFAULT_ACQUIRE_TIMEOUT_MILLIS,
            hold_warn_threshold_millis: DEFAULT_HOLD_WARN_THRESHOLD_MILLIS,
        }
    }
}

impl TreeLockConfig {
    /// Loads configuration from `MERIDIAN_TREE_LOCK_*` environment variables,
    /// falling back to defaults for unset ones.
    ///
    /// # Errors
    ///
    /// Returns [`Error::InvalidInput`] if a variable does not parse or the
    /// resulting configuration is invalid.
    pub fn from_env() -> Result<Self> {
        Self::from_lookup(|name| std::env::var(name).ok())
    }

    /// Loads configuration through an arbitrary variable lookup.
    ///
    /// # Errors
    ///
    /// Returns [`Error::InvalidInput`] if a value does not parse or the
    /// resulting configuration is invalid.
    pub fn from_lookup<F>(lookup: F) -> Result<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let mut config = Self::default();

        if let Some(max) = parse_usize(&lookup, "MERIDIAN_TREE_LOCK_MAX_NODES")? {
            config.max_nodes_in_memory = max;
        }
        if let Some(min) = parse_usize(&lookup, "MERIDIAN_TREE_LOCK_MIN_NODES")? {
            config.min_nodes_in_memory = min;
        }
        if let Some(ms) = parse_u64(&lookup, "MERIDIAN_TREE_LOCK_CLEAN_INTERVAL_MS")? {
            config.clean_interval_millis = ms;
        }
        if let Some(ms) = parse_u64(&lookup, "MERIDIAN_TREE_LOCK_ACQUIRE_TIMEOUT_MS")? {
            config.acquire_timeout_millis = ms;
        }
        if let Some(ms) = parse_u64(&lookup, "MERIDIAN_TREE_LOCK_HOLD_WARN_MS")? {
            config.hold_warn_threshold_millis = ms;
        }

        config.validate()?;
        Ok(config)
    }

    /// Validates the configuration.
    ///
    /// # Errors
    ///
    /// Returns [`Error::InvalidInput`] unless `0 < min <= max` and the clean
    /// interval and hold-warning threshold are non-zero.
    pub fn validate(&self) -> Result<()> {
        if self.min_nodes_in_memory == 0 {
            return Err(Error::InvalidInput(
                "minNodesInMemory must be at least 1 (the root node)".to_string(),
            ));
        }
        if self.min_nodes_in_memory > self.max_nodes_in_memory {
            return Err(Error::InvalidInput(format!(
                "minNodesInMemory ({}) must not exceed maxNodesInMemory ({})",
                self.min_nodes_in_memory, self.max_nodes_in_memory
            )));
        }
        if self.clean_interval_millis == 0 {
            return Err(Error::InvalidInput(
                "cleanIntervalMillis must be greater than zero".to_string(),
            ));
        }
        if self.hold_warn_threshold_millis == 0 {
            return Err(Error::InvalidInput(
                "holdWarnThresholdMillis must be greater than zero".to_string(),
            ));
        }
        Ok(())
    }

    /// Returns the reaper period.
    #[must_use]
    pub const fn clean_interval(&self) -> Duration {
        Duration::from_millis(self.clean_interval_millis)
    }

    /// Returns the acquisition bound, or `None` to wait forever.
    #[must_use]
    pub const fn acquire_timeout(&self) -> Option<Duration> {
        if self.acquire_timeout_millis == 0 {
            None
        } else {
            Some(Duration::from_millis(self.acquire_timeout_millis))
        }
    }

    /// Returns the long-hold reporting threshold.
    #[must_use]
    pub const fn hold_warn_threshold(&self) -> Duration {
        Duration::from_millis(self.hold_warn_threshold_millis)
    }
}

fn lookup_trimmed<F>(lookup: &F, name: &str) -> Option<String>
where
    F: Fn(&str) -> Option<String>,
{
    lookup(name).and_then(|v| {
        let trimmed = v.trim();
        if trimmed.is_empty() {
            None
        } else {
            Some(trimmed.to_string())
        }
    })
}

fn parse_u64<F>(lookup: &F, name: &str) -> Result<Option<u64>>
where
    F: Fn(&str) -> Option<String>,
{
    let Some(v) = lookup_trimmed(lookup, name) else {
        return Ok(None);
    };
    v.parse::<u64>()
        .map(Some)
        .map_err(|e| Error::InvalidInput(format!("{name} must be a u64: {e}")))
}

fn parse_usize<F>(lookup: &F, name: &str) -> Result<Option<usize>>
where
    F: Fn(&str) -> Option<String>,
{
    let Some(v) = lookup_trimmed(lookup, name) else {
        return Ok(None);
    };
    v.parse::<usize>()
        .map(Some)
        .map_err(|e| Error::InvalidInput(format!("{name} must be a usize: {e}")))
}
