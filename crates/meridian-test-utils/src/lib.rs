//! Shared test utilities for Meridian integration tests.
//!
//! This crate provides:
//! - [`RecordingObserver`]: a lock observer that records every node lock and
//!   unlock for order assertions
//! - Factory functions for configs, managers and seeded catalogs
//! - [`run_concurrently`]: barrier-aligned multi-thread test driver
//! - Custom assertion helpers
//!
//! # Example
//!
//! ```rust,ignore
//! use meridian_test_utils::{RecordingObserver, assert_stack_discipline, observed_manager};
//!
//! let (locks, observer) = observed_manager();
//! locks.with_lock(&ident("lake.hive"), LockMode::Exclusive, || Ok::<_, LockError>(()))?;
//! assert_stack_discipline(&observer.events());
//! ```

#![forbid(unsafe_code)]
#![deny(missing_docs)]
#![deny(rust_2018_idioms)]
#![warn(clippy::pedantic)]
#![allow(clippy::must_use_candidate)]
// Test utilities use expect/unwrap for cleaner test code - panics are acceptable in tests
#![allow(clippy::expect_used)]
#![allow(clippy::unwrap_used)]
#![allow(clippy::missing_panics_doc)]

pub mod assertions;
pub mod concurrency;
pub mod fixtures;
pub mod observer;

pub use assertions::*;
pub use concurrency::*;
pub use fixtures::*;
pub use observer::*;

/// Initialize test logging (call once per test module).
pub fn init_test_logging() {
    use tracing_subscriber::{EnvFilter, fmt};

    let _ = fmt()
        .with_env_filter(
            EnvFilter::from_default_env()
                .add_directive("meridian_catalog=debug".parse().expect("valid directive"))
                .add_directive("meridian_core=debug".parse().expect("valid directive")),
        )
        .with_test_writer()
        .try_init();
}
