//! Periodic eviction of unreferenced lock nodes.

use std::panic::{AssertUnwindSafe, catch_unwind};
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::{Duration, Instant};

use tokio::sync::watch;
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;

use super::registry::EvictionReport;
use super::{LockError, TreeLockManager};
use crate::metrics;

/// Outcome of one reaper pass.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ReaperPass {
    /// What eviction did.
    pub eviction: EvictionReport,
    /// Holds found outstanding past the warning threshold.
    pub long_holds: usize,
    /// Time the pass took.
    pub elapsed: Duration,
}

/// Background task that keeps the node registry within its water marks.
///
/// The reaper sleeps for `cleanIntervalMillis` between passes. A pass evicts
/// unreferenced nodes when the registry is over its high-water mark and logs
/// holds that have been outstanding longer than `holdWarnThresholdMillis`.
/// It never takes a node lock, so it cannot block behind catalog work.
#[derive(Debug)]
pub struct BackgroundReaper;

impl BackgroundReaper {
    /// Spawns the reaper on the current tokio runtime.
    ///
    /// The task runs until [`ReaperHandle::shutdown`] is called or the handle
    /// is dropped.
    #[must_use]
    pub fn spawn(manager: TreeLockManager) -> ReaperHandle {
        let period = manager.config().clean_interval();
        Self::spawn_with(period, move || Self::run_pass(&manager))
    }

    /// Spawns a reaper that runs `pass` every `period`.
    ///
    /// A pass that fails or panics is logged and counted; the next tick runs
    /// the pass again.
    pub(crate) fn spawn_with<F>(period: Duration, pass: F) -> ReaperHandle
    where
        F: FnMut() -> Result<ReaperPass, LockError> + Send + 'static,
    {
        let (shutdown_tx, shutdown_rx) = watch::channel(false);
        let passes = Arc::new(AtomicU64::new(0));
        let task = tokio::spawn(run_reaper_loop(
            period,
            pass,
            shutdown_rx,
            Arc::clone(&passes),
        ));
        ReaperHandle {
            shutdown: shutdown_tx,
            task,
            passes,
        }
    }

    /// Runs a single pass synchronously.
    ///
    /// # Errors
    ///
    /// Returns [`LockError::Poisoned`] if the registry or a node was poisoned.
    pub fn run_pass(manager: &TreeLockManager) -> Result<ReaperPass, LockError> {
        let started = Instant::now();
        let registry = manager.registry();

        let eviction = registry.evict_if_possible()?;
        let long_holds = registry.long_holds(manager.config().hold_warn_threshold())?;
        for long in &long_holds {
            tracing::warn!(
                path = %long.path,
                mode = %long.hold.mode,
                thread = ?long.hold.thread,
                count = long.hold.count,
                held_ms = long.hold.held_for.as_millis(),
                "tree lock held longer than threshold"
            );
        }

        let elapsed = started.elapsed();
        metrics::record_reaper_pass(eviction.evicted, eviction.after, long_holds.len(), elapsed);
        Ok(ReaperPass {
            eviction,
            long_holds: long_holds.len(),
            elapsed,
        })
    }
}

/// Handle to a running [`BackgroundReaper`].
#[derive(Debug)]
pub struct ReaperHandle {
    shutdown: watch::Sender<bool>,
    task: JoinHandle<()>,
    passes: Arc<AtomicU64>,
}

impl ReaperHandle {
    /// Returns the number of passes attempted so far, failed ones included.
    #[must_use]
    pub fn completed_passes(&self) -> u64 {
        self.passes.load(Ordering::Acquire)
    }

    /// Returns true if the task has exited.
    #[must_use]
    pub fn is_finished(&self) -> bool {
        self.task.is_finished()
    }

    /// Signals the task to stop and waits for it to exit.
    pub async fn shutdown(self) {
        let _ = self.shutdown.send(true);
        if let Err(err) = self.task.await {
            tracing::error!(error = %err, "tree lock reaper task ended abnormally");
        }
    }
}

async fn run_reaper_loop<F>(
    period: Duration,
    mut pass: F,
    mut shutdown: watch::Receiver<bool>,
    passes: Arc<AtomicU64>,
) where
    F: FnMut() -> Result<ReaperPass, LockError>,
{
    let mut ticker = tokio::time::interval(period);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

    // The first tick completes immediately.
    ticker.tick().await;
    tracing::info!(interval_ms = period.as_millis(), "tree lock reaper started");

    loop {
        tokio::select! {
            _ = ticker.tick() => {
                run_pass_guarded(&mut pass);
                passes.fetch_add(1, Ordering::AcqRel);
            }
            changed = shutdown.changed() => {
                if changed.is_err() || *shutdown.borrow() {
                    break;
                }
            }
        }
    }

    tracing::info!("tree lock reaper stopped");
}

fn run_pass_guarded<F>(pass: &mut F)
where
    F: FnMut() -> Result<ReaperPass, LockError>,
{
    match catch_unwind(AssertUnwindSafe(|| pass())) {
        Ok(Ok(pass)) => {
            if pass.eviction.evicted > 0 {
                tracing::info!(
                    before = pass.eviction.before,
                    after = pass.eviction.after,
                    evicted = pass.eviction.evicted,
                    "tree lock reaper pass evicted nodes"
                );
            }
        }
        Ok(Err(err)) => {
            tracing::error!(error = %err, "tree lock reaper pass failed");
        }
        Err(_) => {
            tracing::error!("tree lock reaper pass panicked");
        }
    }
}
