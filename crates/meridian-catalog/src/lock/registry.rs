//! The in-memory lock node population.
//!
//! All structural bookkeeping (inserting nodes on resolve, removing them on
//! eviction, bumping reference counts) happens inside one short critical
//! section: the registry mutex. That mutex is never held while waiting on a
//! node lock, and node locks are never taken while holding it, so registry
//! bookkeeping cannot block behind a long-running catalog operation.

use std::cmp::Reverse;
use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use meridian_core::NameIdentifier;

use super::LockError;
use super::node::{HoldInfo, LockNode};

/// Outcome of one eviction pass.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct EvictionReport {
    /// Node count (root included) before the pass.
    pub before: usize,
    /// Node count (root included) after the pass.
    pub after: usize,
    /// Nodes removed.
    pub evicted: usize,
    /// Nodes kept because they were referenced.
    pub skipped_referenced: usize,
}

impl EvictionReport {
    fn untouched(size: usize) -> Self {
        Self {
            before: size,
            after: size,
            ..Self::default()
        }
    }
}

/// A hold that has been outstanding longer than the warning threshold.
#[derive(Debug, Clone)]
pub struct LongHold {
    /// Path of the held node.
    pub path: NameIdentifier,
    /// The hold itself.
    pub hold: HoldInfo,
}

/// In-memory tree of [`LockNode`]s keyed by path.
///
/// The root node always exists and is never evicted. Every other node is
/// created lazily by [`resolve`](Self::resolve) and removed only by
/// [`evict_if_possible`](Self::evict_if_possible) while unreferenced.
pub struct NodeRegistry {
    root: Arc<LockNode>,
    nodes: Mutex<HashMap<NameIdentifier, Arc<LockNode>>>,
    max_nodes: usize,
    min_nodes: usize,
}

impl NodeRegistry {
    /// Creates a registry holding only the root node.
    ///
    /// `max_nodes` is the high-water mark that triggers eviction; `min_nodes`
    /// is the low-water mark eviction stops at. Both count the root.
    #[must_use]
    pub fn new(max_nodes: usize, min_nodes: usize) -> Self {
        Self {
            root: Arc::new(LockNode::new(NameIdentifier::root())),
            nodes: Mutex::new(HashMap::new()),
            max_nodes,
            min_nodes,
        }
    }

    /// Returns the root node.
    #[must_use]
    pub fn root(&self) -> &Arc<LockNode> {
        &self.root
    }

    /// Returns the chain of nodes from the root down to `path`, creating any
    /// that are missing, and increments the reference count of every node in
    /// the chain exactly once.
    ///
    /// Every successful call must be paired with one [`release`](Self::release)
    /// of the returned chain.
    ///
    /// # Errors
    ///
    /// Returns [`LockError::Poisoned`] if the registry mutex was poisoned.
    pub fn resolve(&self, path: &NameIdentifier) -> Result<Vec<Arc<LockNode>>, LockError> {
        let mut chain = Vec::with_capacity(path.depth() + 1);
        let mut nodes = self.nodes()?;

        self.root.inc_reference();
        chain.push(Arc::clone(&self.root));
        for prefix in path.prefixes() {
            let node = match nodes.get(&prefix) {
                Some(node) => Arc::clone(node),
                None => {
                    let node = Arc::new(LockNode::new(prefix.clone()));
                    nodes.insert(prefix, Arc::clone(&node));
                    node
                }
            };
            node.inc_reference();
            chain.push(node);
        }
        drop(nodes);

        Ok(chain)
    }

    /// Decrements the reference count of every node in `chain` exactly once.
    ///
    /// Called after the chain's locks have been released. The counts are
    /// returned even if the registry mutex was poisoned, since a node that
    /// stays referenced forever can never be evicted.
    ///
    /// # Errors
    ///
    /// Returns [`LockError::State`] for the first node whose count was already
    /// zero; the remaining nodes are still decremented.
    pub fn release(&self, chain: &[Arc<LockNode>]) -> Result<(), LockError> {
        let guard = self.nodes.lock().unwrap_or_else(PoisonError::into_inner);
        let mut first_error = None;
        for node in chain {
            if let Err(err) = node.dec_reference() {
                first_error.get_or_insert(err);
            }
        }
        drop(guard);

        first_error.map_or(Ok(()), Err)
    }

    /// Evicts unreferenced nodes if the population is above the high-water
    /// mark, deepest first, until it is at or below the low-water mark or no
    /// evictable node remains.
    ///
    /// # Errors
    ///
    /// Returns [`LockError::Poisoned`] if the registry mutex was poisoned.
    pub fn evict_if_possible(&self) -> Result<EvictionReport, LockError> {
        let mut nodes = self.nodes()?;
        let before = nodes.len() + 1;
        if before <= self.max_nodes {
            return Ok(EvictionReport::untouched(before));
        }

        let mut candidates: Vec<NameIdentifier> = nodes
            .iter()
            .filter(|(_, node)| node.reference_count() == 0)
            .map(|(path, _)| path.clone())
            .collect();
        let skipped_referenced = nodes.len() - candidates.len();
        candidates.sort_by_key(|path| Reverse(path.depth()));

        let mut evicted = 0;
        for path in candidates {
            if nodes.len() < self.min_nodes {
                break;
            }
            // Counts only change under this mutex, so the filter above still holds.
            if nodes.remove(&path).is_some() {
                evicted += 1;
            }
        }
        let after = nodes.len() + 1;
        drop(nodes);

        tracing::debug!(before, after, evicted, skipped_referenced, "evicted tree lock nodes");
        Ok(EvictionReport {
            before,
            after,
            evicted,
            skipped_referenced,
        })
    }

    /// Returns holds older than `threshold` on any registered node.
    ///
    /// The registry mutex is only held while snapshotting the node list;
    /// node state is inspected afterwards.
    ///
    /// # Errors
    ///
    /// Returns [`LockError::Poisoned`] if the registry or a node was poisoned.
    pub fn long_holds(&self, threshold: Duration) -> Result<Vec<LongHold>, LockError> {
        let mut snapshot: Vec<Arc<LockNode>> = vec![Arc::clone(&self.root)];
        snapshot.extend(self.nodes()?.values().cloned());

        let mut long_holds = Vec::new();
        for node in snapshot {
            for hold in node.holds()? {
                if hold.held_for >= threshold {
                    long_holds.push(LongHold {
                        path: node.path().clone(),
                        hold,
                    });
                }
            }
        }
        Ok(long_holds)
    }

    /// Returns the node count, root included.
    ///
    /// # Errors
    ///
    /// Returns [`LockError::Poisoned`] if the registry mutex was poisoned.
    pub fn size(&self) -> Result<usize, LockError> {
        Ok(self.nodes()?.len() + 1)
    }

    /// Returns true if a node for `path` is currently materialized.
    ///
    /// # Errors
    ///
    /// Returns [`LockError::Poisoned`] if the registry mutex was poisoned.
    pub fn contains(&self, path: &NameIdentifier) -> Result<bool, LockError> {
        if path.is_root() {
            return Ok(true);
        }
        Ok(self.nodes()?.contains_key(path))
    }

    /// Returns the reference count of the node at `path`, if materialized.
    ///
    /// # Errors
    ///
    /// Returns [`LockError::Poisoned`] if the registry mutex was poisoned.
    pub fn reference_count(&self, path: &NameIdentifier) -> Result<Option<usize>, LockError> {
        if path.is_root() {
            return Ok(Some(self.root.reference_count()));
        }
        Ok(self.nodes()?.get(path).map(|node| node.reference_count()))
    }

    /// Returns the configured high-water mark.
    #[must_use]
    pub fn max_nodes(&self) -> usize {
        self.max_nodes
    }

    /// Returns the configured low-water mark.
    #[must_use]
    pub fn min_nodes(&self) -> usize {
        self.min_nodes
    }

    fn nodes(&self) -> Result<MutexGuard<'_, HashMap<NameIdentifier, Arc<LockNode>>>, LockError> {
        self.nodes
            .lock()
            .map_err(|_| LockError::Poisoned { what: "node registry" })
    }
}

impl std::fmt::Debug for NodeRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("NodeRegistry")
            .field("size", &self.size().ok())
            .field("max_nodes", &self.max_nodes)
            .field("min_nodes", &self.min_nodes)
            .finish_non_exhaustive()
    }
}
