//! Resolve, lock, run, unlock, release.

use std::sync::Arc;
use std::time::{Duration, Instant};

use meridian_core::NameIdentifier;
use meridian_core::observability::lock_span;

use super::node::LockNode;
use super::path_lock::PathLock;
use super::reaper::{BackgroundReaper, ReaperHandle};
use super::registry::NodeRegistry;
use super::{LockError, LockMode, LockObserver};
use crate::config::TreeLockConfig;
use crate::metrics;

struct Inner {
    registry: NodeRegistry,
    config: TreeLockConfig,
    observer: Option<Arc<dyn LockObserver>>,
}

/// Entry point for running work under a tree lock.
///
/// A manager owns one [`NodeRegistry`]. It is cheap to clone; clones share
/// the registry, so every component that must coordinate on the same tree
/// holds a clone of the same manager.
///
/// Lock calls block the calling thread. Async callers should run them inside
/// `tokio::task::spawn_blocking`.
#[derive(Clone)]
pub struct TreeLockManager {
    inner: Arc<Inner>,
}

impl TreeLockManager {
    /// Creates a manager with an empty registry.
    ///
    /// # Errors
    ///
    /// Returns [`meridian_core::Error::InvalidInput`] if `config` is invalid.
    pub fn new(config: TreeLockConfig) -> meridian_core::Result<Self> {
        Self::build(config, None)
    }

    /// Creates a manager that reports every node lock and unlock to `observer`.
    ///
    /// # Errors
    ///
    /// Returns [`meridian_core::Error::InvalidInput`] if `config` is invalid.
    pub fn with_observer(
        config: TreeLockConfig,
        observer: Arc<dyn LockObserver>,
    ) -> meridian_core::Result<Self> {
        Self::build(config, Some(observer))
    }

    fn build(
        config: TreeLockConfig,
        observer: Option<Arc<dyn LockObserver>>,
    ) -> meridian_core::Result<Self> {
        config.validate()?;
        let registry = NodeRegistry::new(config.max_nodes_in_memory, config.min_nodes_in_memory);
        tracing::info!(
            max_nodes = config.max_nodes_in_memory,
            min_nodes = config.min_nodes_in_memory,
            clean_interval_ms = config.clean_interval_millis,
            "tree lock manager initialized"
        );
        Ok(Self {
            inner: Arc::new(Inner {
                registry,
                config,
                observer,
            }),
        })
    }

    /// Returns the node registry.
    #[must_use]
    pub fn registry(&self) -> &NodeRegistry {
        &self.inner.registry
    }

    /// Returns the configuration the manager was built with.
    #[must_use]
    pub fn config(&self) -> &TreeLockConfig {
        &self.inner.config
    }

    /// Runs `work` while holding `ident` in `mode` and every ancestor shared,
    /// bounded by the configured acquisition timeout.
    ///
    /// # Errors
    ///
    /// See [`with_lock_timeout`](Self::with_lock_timeout).
    pub fn with_lock<T, E, F>(&self, ident: &NameIdentifier, mode: LockMode, work: F) -> Result<T, E>
    where
        E: From<LockError>,
        F: FnOnce() -> Result<T, E>,
    {
        self.with_lock_timeout(ident, mode, self.inner.config.acquire_timeout(), work)
    }

    /// Runs `work` while holding only the tree root in `mode`.
    ///
    /// An exclusive root lock waits for every in-flight operation to finish
    /// and blocks all new ones until `work` returns.
    ///
    /// # Errors
    ///
    /// See [`with_lock_timeout`](Self::with_lock_timeout).
    pub fn with_root_lock<T, E, F>(&self, mode: LockMode, work: F) -> Result<T, E>
    where
        E: From<LockError>,
        F: FnOnce() -> Result<T, E>,
    {
        self.with_lock(&NameIdentifier::root(), mode, work)
    }

    /// Runs `work` while holding `ident` in `mode` and every ancestor shared.
    ///
    /// `timeout` bounds the whole acquisition; `None` waits forever. The path
    /// lock is released and the chain's reference counts restored whatever
    /// `work` returns, and also if it panics.
    ///
    /// # Errors
    ///
    /// Lock failures take precedence over the outcome of `work`:
    /// - [`LockError::Timeout`] if acquisition did not finish in time (`work`
    ///   never ran).
    /// - [`LockError::Release`] if a node failed to unlock afterwards.
    /// - [`LockError::State`] or [`LockError::Poisoned`] on protocol or
    ///   synchronization failures.
    ///
    /// Otherwise the error returned by `work`, unchanged.
    pub fn with_lock_timeout<T, E, F>(
        &self,
        ident: &NameIdentifier,
        mode: LockMode,
        timeout: Option<Duration>,
        work: F,
    ) -> Result<T, E>
    where
        E: From<LockError>,
        F: FnOnce() -> Result<T, E>,
    {
        let path = ident.to_string();
        let span = lock_span(&path, mode.as_str());
        let _entered = span.enter();

        let registry = &self.inner.registry;
        let chain = registry.resolve(ident)?;
        let guard = ChainGuard::new(registry, chain.clone());
        let mut path_lock = PathLock::new(chain).with_observer(self.inner.observer.clone());

        let started = Instant::now();
        if let Err(err) = path_lock.acquire(mode, timeout) {
            if let LockError::Timeout { waited, .. } = &err {
                metrics::record_timeout(mode, started.elapsed());
                tracing::warn!(waited_ms = waited.as_millis(), error = %err, "tree lock acquisition timed out");
            }
            drop(path_lock);
            if let Err(release_err) = guard.finish() {
                tracing::error!(error = %release_err, "failed to release tree lock chain");
            }
            return Err(err.into());
        }
        metrics::record_acquired(mode, started.elapsed());

        let held_since = Instant::now();
        let outcome = work();
        let unlocked = path_lock.release();
        metrics::record_hold(mode, held_since.elapsed());
        if unlocked.is_err() {
            metrics::record_release_failure();
        }
        let released = guard.finish();

        unlocked?;
        released?;
        outcome
    }

    /// Starts the background reaper for this manager's registry.
    ///
    /// Must be called from within a tokio runtime.
    #[must_use]
    pub fn spawn_reaper(&self) -> ReaperHandle {
        BackgroundReaper::spawn(self.clone())
    }
}

impl std::fmt::Debug for TreeLockManager {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TreeLockManager")
            .field("registry", &self.inner.registry)
            .field("config", &self.inner.config)
            .field("observed", &self.inner.observer.is_some())
            .finish()
    }
}

/// Returns a resolved chain's reference counts exactly once, on
/// [`finish`](Self::finish) or on drop during a panic.
struct ChainGuard<'a> {
    registry: &'a NodeRegistry,
    chain: Option<Vec<Arc<LockNode>>>,
}

impl<'a> ChainGuard<'a> {
    fn new(registry: &'a NodeRegistry, chain: Vec<Arc<LockNode>>) -> Self {
        Self {
            registry,
            chain: Some(chain),
        }
    }

    fn finish(mut self) -> Result<(), LockError> {
        match self.chain.take() {
            Some(chain) => self.registry.release(&chain),
            None => Ok(()),
        }
    }
}

impl Drop for ChainGuard<'_> {
    fn drop(&mut self) {
        if let Some(chain) = self.chain.take() {
            if let Err(err) = self.registry.release(&chain) {
                tracing::error!(error = %err, "failed to release tree lock chain during unwind");
            }
        }
    }
}
