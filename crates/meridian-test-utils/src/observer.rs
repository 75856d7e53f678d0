//! Lock observer with event recording.
//!
//! Records every node lock and unlock, tagged with the calling thread, for
//! later assertion in tests.

use std::sync::Mutex;
use std::thread::{self, ThreadId};

use meridian_catalog::lock::{LockMode, LockObserver};
use meridian_core::NameIdentifier;

/// Whether an event was a lock or an unlock.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LockEventKind {
    /// A node was locked.
    Lock,
    /// A node was unlocked.
    Unlock,
}

/// Record of one node lock or unlock.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LockEvent {
    /// Lock or unlock.
    pub kind: LockEventKind,
    /// Path of the node.
    pub path: NameIdentifier,
    /// Mode locked or unlocked.
    pub mode: LockMode,
    /// Thread that made the call.
    pub thread: ThreadId,
}

/// Lock observer that records all events in call order.
#[derive(Debug, Default)]
pub struct RecordingObserver {
    events: Mutex<Vec<LockEvent>>,
}

impl RecordingObserver {
    /// Creates an observer with no recorded events.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns all recorded events.
    #[must_use]
    pub fn events(&self) -> Vec<LockEvent> {
        self.events.lock().expect("lock").clone()
    }

    /// Returns the events recorded by `thread`, in order.
    #[must_use]
    pub fn events_for(&self, thread: ThreadId) -> Vec<LockEvent> {
        self.events
            .lock()
            .expect("lock")
            .iter()
            .filter(|event| event.thread == thread)
            .cloned()
            .collect()
    }

    /// Returns the `(path, mode)` pairs of `kind` events, in order.
    #[must_use]
    pub fn paths(&self, kind: LockEventKind) -> Vec<(String, LockMode)> {
        self.events
            .lock()
            .expect("lock")
            .iter()
            .filter(|event| event.kind == kind)
            .map(|event| (event.path.to_string(), event.mode))
            .collect()
    }

    /// Clears recorded events.
    pub fn clear(&self) {
        self.events.lock().expect("lock").clear();
    }

    fn record(&self, kind: LockEventKind, path: &NameIdentifier, mode: LockMode) {
        self.events.lock().expect("lock").push(LockEvent {
            kind,
            path: path.clone(),
            mode,
            thread: thread::current().id(),
        });
    }
}

impl LockObserver for RecordingObserver {
    fn on_lock(&self, path: &NameIdentifier, mode: LockMode) {
        self.record(LockEventKind::Lock, path, mode);
    }

    fn on_unlock(&self, path: &NameIdentifier, mode: LockMode) {
        self.record(LockEventKind::Unlock, path, mode);
    }
}
