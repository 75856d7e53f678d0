//! The root-to-target chain held by one operation.

use std::fmt;
use std::sync::Arc;
use std::time::{Duration, Instant};

use meridian_core::NameIdentifier;

use super::node::LockNode;
use super::{LockError, LockMode, LockObserver};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Phase {
    Ready,
    Held,
    Finalized,
}

/// Locks every node from the tree root down to a target, ancestors shared and
/// the target in the requested mode.
///
/// A `PathLock` is single use: [`acquire`](Self::acquire) once, then
/// [`release`](Self::release) once. Each held node is recorded together with
/// the mode it was locked in, and release pops that stack, so unlock order is
/// always the exact reverse of lock order.
///
/// A `PathLock` does not own the reference counts of its nodes; whoever
/// resolved the chain releases it with
/// [`NodeRegistry::release`](super::NodeRegistry::release) afterwards.
pub struct PathLock {
    nodes: Vec<Arc<LockNode>>,
    held: Vec<(Arc<LockNode>, LockMode)>,
    mode: Option<LockMode>,
    phase: Phase,
    observer: Option<Arc<dyn LockObserver>>,
}

impl PathLock {
    /// Creates a path lock over a resolved root-to-target chain.
    #[must_use]
    pub fn new(nodes: Vec<Arc<LockNode>>) -> Self {
        Self {
            held: Vec::with_capacity(nodes.len()),
            nodes,
            mode: None,
            phase: Phase::Ready,
            observer: None,
        }
    }

    /// Attaches an observer notified of every node lock and unlock.
    #[must_use]
    pub fn with_observer(mut self, observer: Option<Arc<dyn LockObserver>>) -> Self {
        self.observer = observer;
        self
    }

    /// Returns the path of the target node.
    #[must_use]
    pub fn target(&self) -> Option<&NameIdentifier> {
        self.nodes.last().map(|node| node.path())
    }

    /// Returns the mode requested for the target, once acquired.
    #[must_use]
    pub fn mode(&self) -> Option<LockMode> {
        self.mode
    }

    /// Returns the number of nodes currently held.
    #[must_use]
    pub fn held_count(&self) -> usize {
        self.held.len()
    }

    /// Locks the chain root-to-leaf: every ancestor shared, the target in `mode`.
    ///
    /// `timeout` bounds the whole acquisition, not each node. On failure every
    /// node already locked is released in reverse order before the error is
    /// returned, and the path lock is finalized.
    ///
    /// # Errors
    ///
    /// - [`LockError::State`] if this path lock was already acquired or
    ///   finalized, or the chain is empty.
    /// - [`LockError::Timeout`] or [`LockError::State`] from a node that could
    ///   not be locked.
    pub fn acquire(&mut self, mode: LockMode, timeout: Option<Duration>) -> Result<(), LockError> {
        match self.phase {
            Phase::Ready => {}
            Phase::Held => return Err(LockError::state(self.describe(), "path lock already acquired")),
            Phase::Finalized => {
                return Err(LockError::state(self.describe(), "path lock already finalized"));
            }
        }
        let Some(last) = self.nodes.len().checked_sub(1) else {
            return Err(LockError::state("[empty]", "path lock has no nodes"));
        };

        self.mode = Some(mode);
        let deadline = timeout.map(|t| Instant::now() + t);
        for index in 0..=last {
            let node = Arc::clone(&self.nodes[index]);
            let node_mode = if index == last { mode } else { LockMode::Shared };
            let remaining = deadline.map(|d| d.saturating_duration_since(Instant::now()));

            if let Err(err) = node.lock(node_mode, remaining) {
                tracing::debug!(
                    path = %node.path(),
                    mode = %node_mode,
                    error = %err,
                    "tree lock acquisition failed, unwinding"
                );
                self.phase = Phase::Finalized;
                if let Err(unwind_err) = self.unwind() {
                    tracing::error!(error = %unwind_err, "failed to unwind partially acquired tree lock");
                }
                return Err(err);
            }
            if let Some(observer) = &self.observer {
                observer.on_lock(node.path(), node_mode);
            }
            self.held.push((node, node_mode));
        }

        self.phase = Phase::Held;
        tracing::trace!(path = %self.describe(), mode = %mode, "locked tree lock");
        Ok(())
    }

    /// Unlocks every held node, leaf-to-root.
    ///
    /// A node that fails to unlock does not stop the unwinding; every
    /// remaining node is still unlocked and the first failure is reported.
    ///
    /// # Errors
    ///
    /// - [`LockError::State`] if called before a successful
    ///   [`acquire`](Self::acquire) or after the path lock was released.
    /// - [`LockError::Release`] naming the first node that failed to unlock.
    pub fn release(&mut self) -> Result<(), LockError> {
        match self.phase {
            Phase::Held => {}
            Phase::Ready => {
                return Err(LockError::state(
                    self.describe(),
                    "release called without a prior acquire",
                ));
            }
            Phase::Finalized => {
                return Err(LockError::state(self.describe(), "path lock already finalized"));
            }
        }

        self.phase = Phase::Finalized;
        let result = self.unwind();
        if result.is_ok() {
            tracing::trace!(path = %self.describe(), "unlocked tree lock");
        }
        result
    }

    fn unwind(&mut self) -> Result<(), LockError> {
        let mut failures = 0;
        let mut first: Option<(String, LockMode, String)> = None;

        while let Some((node, mode)) = self.held.pop() {
            match node.unlock(mode) {
                Ok(()) => {
                    if let Some(observer) = &self.observer {
                        observer.on_unlock(node.path(), mode);
                    }
                }
                Err(err) => {
                    tracing::error!(path = %node.path(), mode = %mode, error = %err, "can't release tree lock node");
                    failures += 1;
                    first.get_or_insert_with(|| (node.path().to_string(), mode, err.to_string()));
                }
            }
        }

        match first {
            None => Ok(()),
            Some((path, mode, message)) => Err(LockError::Release {
                path,
                mode,
                failures,
                message,
            }),
        }
    }

    fn describe(&self) -> String {
        self.target()
            .map_or_else(|| "[empty]".to_string(), ToString::to_string)
    }
}

impl Drop for PathLock {
    fn drop(&mut self) {
        if self.phase == Phase::Held {
            tracing::error!(path = %self.describe(), "tree lock dropped while held, unwinding");
            self.phase = Phase::Finalized;
            let _ = self.unwind();
        }
    }
}

impl fmt::Debug for PathLock {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PathLock")
            .field("target", &self.describe())
            .field("mode", &self.mode)
            .field("held", &self.held.len())
            .field("phase", &self.phase)
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::lock::NodeRegistry;
    use std::thread;

    fn resolve(registry: &NodeRegistry, path: &str) -> Vec<Arc<LockNode>> {
        registry
            .resolve(&NameIdentifier::parse(path).unwrap())
            .unwrap()
    }

    #[test]
    fn acquire_locks_ancestors_shared_and_target_in_mode() {
        let registry = NodeRegistry::new(100, 10);
        let chain = resolve(&registry, "lake.hive.db1");
        let mut lock = PathLock::new(chain.clone());

        lock.acquire(LockMode::Exclusive, None).unwrap();
        assert_eq!(lock.held_count(), 4);

        let modes: Vec<LockMode> = chain
            .iter()
            .map(|node| node.holds().unwrap()[0].mode)
            .collect();
        assert_eq!(
            modes,
            [
                LockMode::Shared,
                LockMode::Shared,
                LockMode::Shared,
                LockMode::Exclusive
            ]
        );

        lock.release().unwrap();
        assert!(chain.iter().all(|node| !node.is_locked().unwrap()));
        registry.release(&chain).unwrap();
    }

    #[test]
    fn release_without_acquire_is_a_state_error() {
        let registry = NodeRegistry::new(100, 10);
        let chain = resolve(&registry, "lake");
        let mut lock = PathLock::new(chain.clone());

        assert!(matches!(lock.release(), Err(LockError::State { .. })));
        registry.release(&chain).unwrap();
    }

    #[test]
    fn path_lock_is_single_use() {
        let registry = NodeRegistry::new(100, 10);
        let chain = resolve(&registry, "lake");
        let mut lock = PathLock::new(chain.clone());

        lock.acquire(LockMode::Shared, None).unwrap();
        assert!(matches!(
            lock.acquire(LockMode::Shared, None),
            Err(LockError::State { .. })
        ));
        lock.release().unwrap();
        assert!(matches!(lock.release(), Err(LockError::State { .. })));
        assert!(matches!(
            lock.acquire(LockMode::Shared, None),
            Err(LockError::State { .. })
        ));
        registry.release(&chain).unwrap();
    }

    #[test]
    fn timeout_unwinds_already_locked_ancestors() {
        let registry = Arc::new(NodeRegistry::new(100, 10));
        let blocker_chain = resolve(&registry, "lake.hive");
        let (locked_tx, locked_rx) = std::sync::mpsc::channel();
        let (done_tx, done_rx) = std::sync::mpsc::channel::<()>();

        let blocker = thread::spawn(move || {
            let mut lock = PathLock::new(blocker_chain);
            lock.acquire(LockMode::Exclusive, None).unwrap();
            locked_tx.send(()).unwrap();
            done_rx.recv().unwrap();
            lock.release().unwrap();
        });
        locked_rx.recv().unwrap();

        let chain = resolve(&registry, "lake.hive.db1");
        let mut lock = PathLock::new(chain.clone());
        let err = lock
            .acquire(LockMode::Shared, Some(Duration::from_millis(30)))
            .unwrap_err();
        assert!(matches!(err, LockError::Timeout { ref path, .. } if path == "lake.hive"));
        assert_eq!(lock.held_count(), 0);
        // The root and `lake` were locked shared by this thread and unwound.
        assert!(chain[0].holds().unwrap().iter().all(|h| h.thread != thread::current().id()));
        assert!(chain[1].holds().unwrap().iter().all(|h| h.thread != thread::current().id()));
        assert!(matches!(lock.release(), Err(LockError::State { .. })));

        done_tx.send(()).unwrap();
        blocker.join().unwrap();
        registry.release(&chain).unwrap();
    }

    #[test]
    fn dropping_a_held_lock_unwinds_it() {
        let registry = NodeRegistry::new(100, 10);
        let chain = resolve(&registry, "lake.hive");
        {
            let mut lock = PathLock::new(chain.clone());
            lock.acquire(LockMode::Exclusive, None).unwrap();
        }
        assert!(chain.iter().all(|node| !node.is_locked().unwrap()));
        registry.release(&chain).unwrap();
    }
}
