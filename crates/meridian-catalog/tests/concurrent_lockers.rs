//! Integration tests for tree-lock exclusion under contention.
//!
//! These tests drive the lock manager from many threads at once and check
//! that exclusive holds never overlap, that shared ancestors never serialize
//! disjoint subtrees, and that every reference count returns to zero.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::mpsc;
use std::thread;
use std::time::{Duration, Instant};

use meridian_catalog::lock::{LockError, LockMode};
use meridian_test_utils::{assert_chain_unreferenced, ident, init_test_logging, manager, run_concurrently};

/// Waits until `counter` reaches `target` or the deadline passes.
fn wait_for(counter: &AtomicUsize, target: usize, limit: Duration) -> bool {
    let deadline = Instant::now() + limit;
    while Instant::now() < deadline {
        if counter.load(Ordering::SeqCst) >= target {
            return true;
        }
        thread::sleep(Duration::from_millis(1));
    }
    false
}

#[test]
fn test_noop_lock_restores_reference_counts() {
    init_test_logging();
    let locks = manager();
    let path = ident("lake.hive.db1.orders");

    for mode in [LockMode::Shared, LockMode::Exclusive] {
        locks
            .with_lock(&path, mode, || Ok::<_, LockError>(()))
            .unwrap();
        assert_chain_unreferenced(locks.registry(), &path);
    }
}

#[test]
fn test_concurrent_resolves_count_every_caller() {
    let locks = manager();
    let registry = locks.registry();
    let path = ident("lake.hive.db1");
    let callers = 12;

    let chains = run_concurrently(callers, |_| registry.resolve(&path).unwrap());
    assert_eq!(registry.reference_count(&path).unwrap(), Some(callers));
    assert_eq!(registry.root().reference_count(), callers);

    for chain in &chains {
        registry.release(chain).unwrap();
    }
    assert_chain_unreferenced(registry, &path);
}

#[test]
fn test_exclusive_holds_never_overlap() {
    let locks = manager();
    let path = ident("lake.hive.db1.orders");
    let inside = AtomicUsize::new(0);
    let max_inside = AtomicUsize::new(0);
    let entered = AtomicUsize::new(0);

    run_concurrently(8, |_| {
        for _ in 0..25 {
            locks
                .with_lock(&path, LockMode::Exclusive, || {
                    let now = inside.fetch_add(1, Ordering::SeqCst) + 1;
                    max_inside.fetch_max(now, Ordering::SeqCst);
                    entered.fetch_add(1, Ordering::SeqCst);
                    thread::yield_now();
                    inside.fetch_sub(1, Ordering::SeqCst);
                    Ok::<_, LockError>(())
                })
                .unwrap();
        }
    });

    assert_eq!(max_inside.load(Ordering::SeqCst), 1);
    assert_eq!(entered.load(Ordering::SeqCst), 200);
    assert_chain_unreferenced(locks.registry(), &path);
}

#[test]
fn test_disjoint_subtrees_run_concurrently() {
    let locks = manager();
    let inside = AtomicUsize::new(0);

    let overlapped = run_concurrently(2, |index| {
        let path = ident(&format!("lake.hive.db{index}.orders"));
        locks
            .with_lock(&path, LockMode::Exclusive, || {
                inside.fetch_add(1, Ordering::SeqCst);
                // Both workers must be inside at once.
                Ok::<_, LockError>(wait_for(&inside, 2, Duration::from_secs(5)))
            })
            .unwrap()
    });

    assert_eq!(overlapped, [true, true]);
}

#[test]
fn test_shared_parent_and_exclusive_child_coexist_but_block_parent_writer() {
    init_test_logging();
    let locks = manager();
    let parent = ident("lake.a");
    let child = ident("lake.a.b");
    let inside = AtomicUsize::new(0);
    let (release_tx, release_rx) = mpsc::channel::<()>();
    let release_rx = std::sync::Mutex::new(release_rx);

    thread::scope(|scope| {
        let holders: Vec<_> = [(parent.clone(), LockMode::Shared), (child.clone(), LockMode::Exclusive)]
            .into_iter()
            .map(|(path, mode)| {
                let locks = &locks;
                let inside = &inside;
                let release_rx = &release_rx;
                scope.spawn(move || {
                    locks.with_lock(&path, mode, || {
                        inside.fetch_add(1, Ordering::SeqCst);
                        release_rx.lock().unwrap().recv().unwrap();
                        Ok::<_, LockError>(())
                    })
                })
            })
            .collect();

        assert!(wait_for(&inside, 2, Duration::from_secs(5)), "holders did not coexist");

        let err = locks
            .with_lock_timeout(&parent, LockMode::Exclusive, Some(Duration::from_millis(50)), || {
                Ok::<_, LockError>(())
            })
            .unwrap_err();
        assert!(
            matches!(err, LockError::Timeout { ref path, mode: LockMode::Exclusive, .. } if path == "lake.a"),
            "{err}"
        );

        release_tx.send(()).unwrap();
        release_tx.send(()).unwrap();
        for holder in holders {
            holder.join().unwrap().unwrap();
        }
    });

    locks
        .with_lock(&parent, LockMode::Exclusive, || Ok::<_, LockError>(()))
        .unwrap();
    assert_chain_unreferenced(locks.registry(), &child);
}

#[test]
fn test_timeout_leaves_no_partial_holds() {
    let locks = manager();
    let blocked = ident("lake.hive");
    let target = ident("lake.hive.db1.orders");
    let (locked_tx, locked_rx) = mpsc::channel();
    let (done_tx, done_rx) = mpsc::channel::<()>();

    thread::scope(|scope| {
        let holder = {
            let (locks, blocked) = (&locks, &blocked);
            scope.spawn(move || {
                locks.with_lock(blocked, LockMode::Exclusive, || {
                    locked_tx.send(()).unwrap();
                    done_rx.recv().unwrap();
                    Ok::<_, LockError>(())
                })
            })
        };
        locked_rx.recv().unwrap();

        let err = locks
            .with_lock_timeout(&target, LockMode::Exclusive, Some(Duration::from_millis(30)), || {
                Ok::<_, LockError>(())
            })
            .unwrap_err();
        assert!(err.is_retryable());

        // The waiter backed out of the root and `lake`; only the holder remains.
        let chain = locks.registry().resolve(&ident("lake")).unwrap();
        let me = thread::current().id();
        for node in &chain {
            assert!(node.holds().unwrap().iter().all(|hold| hold.thread != me));
        }
        locks.registry().release(&chain).unwrap();

        done_tx.send(()).unwrap();
        holder.join().unwrap().unwrap();
    });

    assert_chain_unreferenced(locks.registry(), &target);
}

#[test]
fn test_queued_writer_is_not_starved_by_new_readers() {
    let locks = manager();
    let path = ident("lake.hive");
    let (reader_in_tx, reader_in_rx) = mpsc::channel();
    let (reader_go_tx, reader_go_rx) = mpsc::channel::<()>();
    let writer_done = AtomicUsize::new(0);

    thread::scope(|scope| {
        let reader = {
            let (locks, path) = (&locks, &path);
            scope.spawn(move || {
                locks.with_lock(path, LockMode::Shared, || {
                    reader_in_tx.send(()).unwrap();
                    reader_go_rx.recv().unwrap();
                    Ok::<_, LockError>(())
                })
            })
        };
        reader_in_rx.recv().unwrap();

        let writer = scope.spawn(|| {
            locks.with_lock(&path, LockMode::Exclusive, || {
                writer_done.fetch_add(1, Ordering::SeqCst);
                Ok::<_, LockError>(())
            })
        });
        // Give the writer time to queue behind the reader.
        thread::sleep(Duration::from_millis(50));

        // A fresh reader must wait behind the queued writer.
        let late = locks.with_lock_timeout(&path, LockMode::Shared, Some(Duration::from_millis(30)), || {
            Ok::<_, LockError>(())
        });
        assert!(matches!(late, Err(LockError::Timeout { .. })));

        reader_go_tx.send(()).unwrap();
        reader.join().unwrap().unwrap();
        writer.join().unwrap().unwrap();
    });

    assert_eq!(writer_done.load(Ordering::SeqCst), 1);
    assert_chain_unreferenced(locks.registry(), &path);
}
