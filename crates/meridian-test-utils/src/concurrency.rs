//! Multi-thread test drivers.

use std::sync::Barrier;
use std::thread;

/// Runs `f(0..threads)` on `threads` scoped threads, released together by a
/// barrier, and returns their results in index order.
///
/// # Panics
///
/// Panics if any worker panics.
pub fn run_concurrently<T, F>(threads: usize, f: F) -> Vec<T>
where
    T: Send,
    F: Fn(usize) -> T + Sync,
{
    let barrier = Barrier::new(threads);
    thread::scope(|scope| {
        let handles: Vec<_> = (0..threads)
            .map(|index| {
                let barrier = &barrier;
                let f = &f;
                scope.spawn(move || {
                    barrier.wait();
                    f(index)
                })
            })
            .collect();
        handles
            .into_iter()
            .map(|handle| handle.join().expect("worker panicked"))
            .collect()
    })
}
