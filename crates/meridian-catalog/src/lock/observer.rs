//! Hooks into node lock/unlock events.

use meridian_core::NameIdentifier;

use super::LockMode;

/// Receives every successful node lock and every node unlock.
///
/// Callbacks run on the locking thread, inside the acquisition or release
/// loop, so they must be cheap and must not take tree locks themselves.
pub trait LockObserver: Send + Sync {
    /// Called after `path` was locked in `mode`.
    fn on_lock(&self, path: &NameIdentifier, mode: LockMode);

    /// Called after `path` was unlocked from `mode`.
    fn on_unlock(&self, path: &NameIdentifier, mode: LockMode);
}
