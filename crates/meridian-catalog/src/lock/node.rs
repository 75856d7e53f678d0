//! A single node of the lock tree.
//!
//! [`LockNode`] is a reentrant shared/exclusive lock built on a
//! `Mutex<NodeState>` + `Condvar` pair, with hold ownership tracked per
//! thread. Ownership tracking is what lets a thread that already holds a
//! node take it again (nested catalog calls lock overlapping paths), lets
//! `unlock` reject modes the caller never acquired, and lets the reaper
//! report holds that have been outstanding for too long.
//!
//! Fairness: once an exclusive requester is queued, shared requests from
//! threads that hold nothing on the node wait behind it. Threads already
//! holding the node re-enter immediately so nested calls cannot deadlock
//! behind a queued writer.

use std::collections::HashMap;
use std::fmt;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Condvar, Mutex, MutexGuard, PoisonError};
use std::thread::{self, ThreadId};
use std::time::{Duration, Instant};

use meridian_core::NameIdentifier;

use super::{LockError, LockMode};

#[derive(Debug)]
struct Hold {
    count: usize,
    since: Instant,
}

impl Hold {
    fn new() -> Self {
        Self {
            count: 1,
            since: Instant::now(),
        }
    }
}

#[derive(Debug, Default)]
struct NodeState {
    readers: HashMap<ThreadId, Hold>,
    writer: Option<(ThreadId, Hold)>,
    queued_writers: usize,
}

impl NodeState {
    fn is_writer(&self, thread: ThreadId) -> bool {
        matches!(self.writer, Some((owner, _)) if owner == thread)
    }

    fn add_reader(&mut self, thread: ThreadId) {
        self.readers
            .entry(thread)
            .and_modify(|hold| hold.count += 1)
            .or_insert_with(Hold::new);
    }
}

/// A snapshot of one thread's hold on a node.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HoldInfo {
    /// Mode of the hold.
    pub mode: LockMode,
    /// Thread owning the hold.
    pub thread: ThreadId,
    /// Reentrant acquisitions outstanding.
    pub count: usize,
    /// Time since the first acquisition of this hold.
    pub held_for: Duration,
}

/// One node of the lock tree: a reentrant shared/exclusive lock and the
/// number of in-flight path locks that include it.
pub struct LockNode {
    path: NameIdentifier,
    state: Mutex<NodeState>,
    cond: Condvar,
    references: AtomicUsize,
}

impl LockNode {
    /// Creates an unlocked, unreferenced node.
    #[must_use]
    pub fn new(path: NameIdentifier) -> Self {
        Self {
            path,
            state: Mutex::new(NodeState::default()),
            cond: Condvar::new(),
            references: AtomicUsize::new(0),
        }
    }

    /// Returns the full path this node represents.
    #[must_use]
    pub fn path(&self) -> &NameIdentifier {
        &self.path
    }

    /// Blocks until `mode` is granted to the current thread.
    ///
    /// With a `timeout`, gives up once it has elapsed; a zero timeout only
    /// succeeds if the lock is immediately available.
    ///
    /// # Errors
    ///
    /// - [`LockError::Timeout`] if the timeout elapsed first.
    /// - [`LockError::State`] if the current thread holds the node shared and
    ///   asks for exclusive (an upgrade would wait on itself forever).
    /// - [`LockError::Poisoned`] if the node state mutex was poisoned.
    pub fn lock(&self, mode: LockMode, timeout: Option<Duration>) -> Result<(), LockError> {
        let me = thread::current().id();
        let started = Instant::now();
        let deadline = timeout.map(|t| started + t);
        let mut state = self.state()?;

        match mode {
            LockMode::Shared => {
                if state.is_writer(me) || state.readers.contains_key(&me) {
                    state.add_reader(me);
                    return Ok(());
                }
                while state.writer.is_some() || state.queued_writers > 0 {
                    let (next, timed_out) = self.wait(state, deadline)?;
                    state = next;
                    if timed_out {
                        return Err(self.timeout(mode, started));
                    }
                }
                state.add_reader(me);
            }
            LockMode::Exclusive => {
                if let Some((owner, hold)) = state.writer.as_mut() {
                    if *owner == me {
                        hold.count += 1;
                        return Ok(());
                    }
                }
                if state.readers.contains_key(&me) {
                    return Err(LockError::state(
                        &self.path,
                        "cannot upgrade a shared hold to exclusive",
                    ));
                }
                state.queued_writers += 1;
                while state.writer.is_some() || !state.readers.is_empty() {
                    let (mut next, timed_out) = self.wait(state, deadline)?;
                    if timed_out {
                        next.queued_writers -= 1;
                        drop(next);
                        // Readers held back by our queue slot may proceed now.
                        self.cond.notify_all();
                        return Err(self.timeout(mode, started));
                    }
                    state = next;
                }
                state.queued_writers -= 1;
                state.writer = Some((me, Hold::new()));
            }
        }
        Ok(())
    }

    /// Releases one hold of `mode` owned by the current thread.
    ///
    /// # Errors
    ///
    /// Returns [`LockError::State`] if the current thread holds no `mode` hold
    /// on this node, or [`LockError::Poisoned`] if the state mutex was poisoned.
    pub fn unlock(&self, mode: LockMode) -> Result<(), LockError> {
        let me = thread::current().id();
        let mut state = self.state()?;

        let wake = match mode {
            LockMode::Shared => {
                let Some(hold) = state.readers.get_mut(&me) else {
                    return Err(LockError::state(
                        &self.path,
                        "unlock(shared) without a matching shared lock",
                    ));
                };
                hold.count -= 1;
                if hold.count == 0 {
                    state.readers.remove(&me);
                }
                state.readers.is_empty()
            }
            LockMode::Exclusive => {
                let Some((owner, hold)) = state.writer.as_mut() else {
                    return Err(LockError::state(
                        &self.path,
                        "unlock(exclusive) while no exclusive lock is held",
                    ));
                };
                if *owner != me {
                    return Err(LockError::state(
                        &self.path,
                        "unlock(exclusive) by a thread that does not own it",
                    ));
                }
                hold.count -= 1;
                if hold.count == 0 {
                    state.writer = None;
                    true
                } else {
                    false
                }
            }
        };
        drop(state);

        if wake {
            self.cond.notify_all();
        }
        Ok(())
    }

    /// Returns the current reference count.
    #[must_use]
    pub fn reference_count(&self) -> usize {
        self.references.load(Ordering::Acquire)
    }

    /// Increments the reference count, returning the new value.
    ///
    /// Called by the registry inside its critical section.
    pub(crate) fn inc_reference(&self) -> usize {
        self.references.fetch_add(1, Ordering::AcqRel) + 1
    }

    /// Decrements the reference count, returning the new value.
    ///
    /// Called by the registry inside its critical section.
    pub(crate) fn dec_reference(&self) -> Result<usize, LockError> {
        self.references
            .fetch_update(Ordering::AcqRel, Ordering::Acquire, |n| n.checked_sub(1))
            .map(|previous| previous - 1)
            .map_err(|_| LockError::state(&self.path, "reference count would drop below zero"))
    }

    /// Returns true if any thread holds this node in any mode.
    ///
    /// # Errors
    ///
    /// Returns [`LockError::Poisoned`] if the state mutex was poisoned.
    pub fn is_locked(&self) -> Result<bool, LockError> {
        let state = self.state()?;
        Ok(state.writer.is_some() || !state.readers.is_empty())
    }

    /// Returns a snapshot of every hold on this node.
    ///
    /// # Errors
    ///
    /// Returns [`LockError::Poisoned`] if the state mutex was poisoned.
    pub fn holds(&self) -> Result<Vec<HoldInfo>, LockError> {
        let state = self.state()?;
        let mut holds: Vec<HoldInfo> = state
            .readers
            .iter()
            .map(|(thread, hold)| HoldInfo {
                mode: LockMode::Shared,
                thread: *thread,
                count: hold.count,
                held_for: hold.since.elapsed(),
            })
            .collect();
        if let Some((thread, hold)) = &state.writer {
            holds.push(HoldInfo {
                mode: LockMode::Exclusive,
                thread: *thread,
                count: hold.count,
                held_for: hold.since.elapsed(),
            });
        }
        Ok(holds)
    }

    fn state(&self) -> Result<MutexGuard<'_, NodeState>, LockError> {
        self.state.lock().map_err(poisoned)
    }

    /// Waits for a state change. Returns `true` alongside the guard once the
    /// deadline has passed.
    fn wait<'a>(
        &self,
        guard: MutexGuard<'a, NodeState>,
        deadline: Option<Instant>,
    ) -> Result<(MutexGuard<'a, NodeState>, bool), LockError> {
        let Some(deadline) = deadline else {
            return Ok((self.cond.wait(guard).map_err(poisoned)?, false));
        };
        let now = Instant::now();
        if now >= deadline {
            return Ok((guard, true));
        }
        let (guard, _) = self
            .cond
            .wait_timeout(guard, deadline - now)
            .map_err(poisoned)?;
        Ok((guard, false))
    }

    fn timeout(&self, mode: LockMode, started: Instant) -> LockError {
        LockError::Timeout {
            path: self.path.to_string(),
            mode,
            waited: started.elapsed(),
        }
    }
}

fn poisoned<T>(_: PoisonError<T>) -> LockError {
    LockError::Poisoned { what: "lock node" }
}

impl fmt::Debug for LockNode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("LockNode")
            .field("path", &self.path.to_string())
            .field("references", &self.reference_count())
            .finish_non_exhaustive()
    }
}
