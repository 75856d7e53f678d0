//! Hierarchical tree locks for catalog operations.
//!
//! Every catalog operation locks the whole path from the tree root down to the
//! entity it touches. Altering `lake.hive.db1.orders` takes:
//!
//! ```text
//! [root]                      shared
//! lake                        shared
//! lake.hive                   shared
//! lake.hive.db1               shared
//! lake.hive.db1.orders        exclusive
//! ```
//!
//! Ancestors are always shared, so operations on disjoint subtrees proceed in
//! parallel, while anything that needs a whole subtree to hold still (dropping
//! a schema, renaming a catalog) takes the subtree root exclusively.
//!
//! # Components
//!
//! - [`LockNode`]: one reentrant shared/exclusive lock plus a reference count
//! - [`NodeRegistry`]: the in-memory node population, keyed by path
//! - [`PathLock`]: the root-to-target chain held by one operation
//! - [`TreeLockManager`]: resolve, lock, run, unlock, release
//! - [`BackgroundReaper`]: periodic eviction of unreferenced nodes
//!
//! # Ordering
//!
//! Acquisition is strictly root-to-leaf and release strictly leaf-to-root for
//! every caller. If acquisition fails part way (timeout), the nodes already
//! locked are released in reverse order before the error is returned.
//!
//! # Example
//!
//! ```rust
//! use meridian_catalog::config::TreeLockConfig;
//! use meridian_catalog::lock::{LockError, LockMode, TreeLockManager};
//! use meridian_core::NameIdentifier;
//!
//! let locks = TreeLockManager::new(TreeLockConfig::default())?;
//! let table = NameIdentifier::parse("lake.hive.db1.orders")?;
//!
//! let rows = locks.with_lock(&table, LockMode::Exclusive, || Ok::<_, LockError>(42))?;
//! assert_eq!(rows, 42);
//! # Ok::<(), Box<dyn std::error::Error>>(())
//! ```

mod manager;
mod node;
mod observer;
mod path_lock;
mod reaper;
mod registry;

use std::fmt;
use std::time::Duration;

pub use manager::TreeLockManager;
pub use node::{HoldInfo, LockNode};
pub use observer::LockObserver;
pub use path_lock::PathLock;
pub use reaper::{BackgroundReaper, ReaperHandle, ReaperPass};
pub use registry::{EvictionReport, LongHold, NodeRegistry};

/// Lock mode requested on a node.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum LockMode {
    /// Many holders at once; excludes exclusive holders.
    Shared,
    /// A single holder; excludes everyone else.
    Exclusive,
}

impl LockMode {
    /// Returns the string name of this mode.
    #[must_use]
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::Shared => "shared",
            Self::Exclusive => "exclusive",
        }
    }
}

impl fmt::Display for LockMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Errors raised by the tree-lock subsystem.
#[derive(Debug, thiserror::Error)]
pub enum LockError {
    /// The lock was used out of protocol: unlock without lock, release
    /// without acquire, reuse of a finalized path lock, lock upgrade, or a
    /// reference count going negative. Never retried.
    #[error("lock state error at {path}: {message}")]
    State {
        /// Path of the node or path lock involved.
        path: String,
        /// What went wrong.
        message: String,
    },

    /// One or more nodes failed to unlock during release. The remaining
    /// stack was still unwound.
    #[error("failed to release {failures} lock(s); first failure at {path} ({mode}): {message}")]
    Release {
        /// Path of the first node that failed to unlock.
        path: String,
        /// Mode that node was being unlocked with.
        mode: LockMode,
        /// Number of nodes that failed to unlock.
        failures: usize,
        /// Cause of the first failure.
        message: String,
    },

    /// Acquisition did not complete within the allotted time. Retryable.
    #[error("timed out after {waited:?} waiting for {mode} lock on {path}")]
    Timeout {
        /// Path of the node that could not be locked.
        path: String,
        /// Requested mode on that node.
        mode: LockMode,
        /// How long the caller waited in total.
        waited: Duration,
    },

    /// An internal synchronization primitive was poisoned by a panic.
    #[error("lock poisoned: {what}")]
    Poisoned {
        /// Which primitive was poisoned.
        what: &'static str,
    },
}

impl LockError {
    /// Creates a lock state error.
    #[must_use]
    pub fn state(path: impl fmt::Display, message: impl Into<String>) -> Self {
        Self::State {
            path: path.to_string(),
            message: message.into(),
        }
    }

    /// Returns true if the whole operation may be retried from scratch.
    #[must_use]
    pub const fn is_retryable(&self) -> bool {
        matches!(self, Self::Timeout { .. })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn only_timeouts_are_retryable() {
        let timeout = LockError::Timeout {
            path: "lake".into(),
            mode: LockMode::Shared,
            waited: Duration::from_millis(5),
        };
        assert!(timeout.is_retryable());
        assert!(!LockError::state("lake", "double release").is_retryable());
        assert!(!LockError::Poisoned { what: "registry" }.is_retryable());
    }

    #[test]
    fn release_error_names_node_and_mode() {
        let err = LockError::Release {
            path: "lake.hive".into(),
            mode: LockMode::Exclusive,
            failures: 2,
            message: "not held".into(),
        };
        let text = err.to_string();
        assert!(text.contains("lake.hive"), "{text}");
        assert!(text.contains("exclusive"), "{text}");
    }
}
