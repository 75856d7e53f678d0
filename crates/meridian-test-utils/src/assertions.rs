//! Custom assertion helpers for lock ordering.

use std::collections::HashMap;
use std::thread::ThreadId;

use meridian_catalog::lock::NodeRegistry;
use meridian_core::NameIdentifier;

use crate::observer::{LockEvent, LockEventKind};

/// Asserts that, per thread, every unlock releases the most recent
/// still-held lock with the same path and mode, and nothing stays held.
///
/// This is exactly "release order is the reverse of acquisition order".
///
/// # Panics
///
/// Panics on the first unlock that does not match the top of its thread's
/// stack, or if any thread ends with locks still held.
pub fn assert_stack_discipline(events: &[LockEvent]) {
    let mut stacks: HashMap<ThreadId, Vec<&LockEvent>> = HashMap::new();
    for (index, event) in events.iter().enumerate() {
        let stack = stacks.entry(event.thread).or_default();
        match event.kind {
            LockEventKind::Lock => stack.push(event),
            LockEventKind::Unlock => {
                let top = stack.pop().unwrap_or_else(|| {
                    panic!("event {index}: unlock of {} with nothing held", event.path)
                });
                assert_eq!(
                    (&top.path, top.mode),
                    (&event.path, event.mode),
                    "event {index}: unlock does not match most recent lock"
                );
            }
        }
    }
    for (thread, stack) in stacks {
        assert!(
            stack.is_empty(),
            "thread {thread:?} still holds {} lock(s)",
            stack.len()
        );
    }
}

/// Asserts that every acquisition run starts at the root and descends one
/// level at a time, with every node but the last locked shared.
///
/// A run is a maximal sequence of same-thread lock events starting at the
/// root. Nested acquisitions start a new run.
///
/// # Panics
///
/// Panics if a run skips a level, goes back up, or locks an ancestor
/// exclusively.
pub fn assert_root_to_leaf(events: &[LockEvent]) {
    let mut runs: HashMap<ThreadId, Vec<&LockEvent>> = HashMap::new();
    for event in events {
        let run = runs.entry(event.thread).or_default();
        match event.kind {
            LockEventKind::Lock if event.path.is_root() => {
                check_run(run);
                run.clear();
                run.push(event);
            }
            LockEventKind::Lock => run.push(event),
            LockEventKind::Unlock => {
                check_run(run);
                run.clear();
            }
        }
    }
    for run in runs.values() {
        check_run(run);
    }
}

fn check_run(run: &[&LockEvent]) {
    let Some(first) = run.first() else {
        return;
    };
    assert!(first.path.is_root(), "acquisition started at {}", first.path);
    for (depth, event) in run.iter().enumerate() {
        assert_eq!(
            event.path.depth(),
            depth,
            "acquisition of {} out of root-to-leaf order",
            event.path
        );
        if depth + 1 < run.len() {
            assert!(
                run[depth + 1].path.is_descendant_of(&event.path),
                "{} is not below {}",
                run[depth + 1].path,
                event.path
            );
            assert_eq!(
                event.mode,
                meridian_catalog::lock::LockMode::Shared,
                "ancestor {} locked exclusively",
                event.path
            );
        }
    }
}

/// Asserts that every node on the chain down to `path` is unreferenced.
///
/// # Panics
///
/// Panics if any materialized node on the chain has a non-zero count.
pub fn assert_chain_unreferenced(registry: &NodeRegistry, path: &NameIdentifier) {
    assert_eq!(registry.root().reference_count(), 0, "root still referenced");
    for prefix in path.prefixes() {
        let count = registry.reference_count(&prefix).expect("registry");
        assert!(
            matches!(count, None | Some(0)),
            "{prefix} still referenced ({count:?})"
        );
    }
}
