//! Tree-lock metrics.
//!
//! Provides metrics for lock acquisition, hold times, and registry upkeep.
//! These metrics complement the structured logging emitted by the lock module.

use std::sync::OnceLock;
use std::time::Duration;

use metrics::{
    counter, describe_counter, describe_gauge, describe_histogram, gauge, histogram,
};

use crate::lock::LockMode;

// ============================================================================
// Acquisition Metrics
// ============================================================================

/// Successful path acquisitions, labelled by target mode.
pub const TREE_LOCK_ACQUIRED: &str = "meridian_tree_lock_acquired_total";

/// Path acquisitions that timed out, labelled by target mode.
pub const TREE_LOCK_TIMEOUTS: &str = "meridian_tree_lock_timeouts_total";

/// Path releases that failed to unlock at least one node.
pub const TREE_LOCK_RELEASE_FAILURES: &str = "meridian_tree_lock_release_failures_total";

/// Time spent waiting to acquire a path, labelled by target mode.
pub const TREE_LOCK_WAIT: &str = "meridian_tree_lock_wait_seconds";

/// Time a path was held, labelled by target mode.
pub const TREE_LOCK_HOLD: &str = "meridian_tree_lock_hold_seconds";

// ============================================================================
// Registry Metrics
// ============================================================================

/// Lock nodes removed by the reaper.
pub const TREE_LOCK_EVICTED_NODES: &str = "meridian_tree_lock_evicted_nodes_total";

/// Holds reported as outstanding past the warning threshold.
pub const TREE_LOCK_LONG_HOLDS: &str = "meridian_tree_lock_long_holds_total";

/// Lock nodes currently in memory, root included.
pub const TREE_LOCK_NODES_IN_MEMORY: &str = "meridian_tree_lock_nodes_in_memory";

/// Duration of one reaper pass.
pub const TREE_LOCK_REAPER_PASS: &str = "meridian_tree_lock_reaper_pass_seconds";

static METRICS_REGISTERED: OnceLock<()> = OnceLock::new();

// ============================================================================
// Metric Registration
// ============================================================================

/// Registers all tree-lock metric descriptions.
///
/// Call once at startup after installing a metrics recorder. Safe to call
/// multiple times; subsequent calls are no-ops.
pub fn register_metrics() {
    METRICS_REGISTERED.get_or_init(|| {
        describe_counter!(TREE_LOCK_ACQUIRED, "Total tree lock path acquisitions");
        describe_counter!(TREE_LOCK_TIMEOUTS, "Total tree lock acquisitions that timed out");
        describe_counter!(
            TREE_LOCK_RELEASE_FAILURES,
            "Total tree lock releases that failed to unlock a node"
        );
        describe_histogram!(TREE_LOCK_WAIT, "Time waiting for a tree lock path in seconds");
        describe_histogram!(TREE_LOCK_HOLD, "Time a tree lock path was held in seconds");
        describe_counter!(TREE_LOCK_EVICTED_NODES, "Total lock nodes evicted by the reaper");
        describe_counter!(TREE_LOCK_LONG_HOLDS, "Total long-running lock holds reported");
        describe_gauge!(TREE_LOCK_NODES_IN_MEMORY, "Lock nodes currently in memory");
        describe_histogram!(TREE_LOCK_REAPER_PASS, "Duration of reaper passes in seconds");
    });
}

// ============================================================================
// Metric Recording
// ============================================================================

/// Records a successful acquisition and how long it waited.
pub fn record_acquired(mode: LockMode, waited: Duration) {
    counter!(TREE_LOCK_ACQUIRED, "mode" => mode.as_str()).increment(1);
    histogram!(TREE_LOCK_WAIT, "mode" => mode.as_str()).record(waited.as_secs_f64());
}

/// Records an acquisition that timed out.
pub fn record_timeout(mode: LockMode, waited: Duration) {
    counter!(TREE_LOCK_TIMEOUTS, "mode" => mode.as_str()).increment(1);
    histogram!(TREE_LOCK_WAIT, "mode" => mode.as_str()).record(waited.as_secs_f64());
}

/// Records how long a path was held.
pub fn record_hold(mode: LockMode, held: Duration) {
    histogram!(TREE_LOCK_HOLD, "mode" => mode.as_str()).record(held.as_secs_f64());
}

/// Records a release that failed to unlock at least one node.
pub fn record_release_failure() {
    counter!(TREE_LOCK_RELEASE_FAILURES).increment(1);
}

/// Records the outcome of one reaper pass.
#[allow(clippy::cast_precision_loss)]
pub fn record_reaper_pass(evicted: usize, nodes_in_memory: usize, long_holds: usize, elapsed: Duration) {
    counter!(TREE_LOCK_EVICTED_NODES).increment(evicted as u64);
    counter!(TREE_LOCK_LONG_HOLDS).increment(long_holds as u64);
    gauge!(TREE_LOCK_NODES_IN_MEMORY).set(nodes_in_memory as f64);
    histogram!(TREE_LOCK_REAPER_PASS).record(elapsed.as_secs_f64());
}
