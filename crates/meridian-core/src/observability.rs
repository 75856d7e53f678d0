//! Observability infrastructure for Meridian.
//!
//! Structured logging with consistent spans. This module provides the
//! subscriber initialization helper and the span constructors shared by the
//! catalog and lock layers.

use std::sync::Once;
use tracing::Span;
use tracing_subscriber::{EnvFilter, fmt, layer::SubscriberExt, util::SubscriberInitExt};

static INIT: Once = Once::new();

/// Log output format.
#[derive(Debug, Clone, Copy, Default)]
pub enum LogFormat {
    /// JSON structured logs (for production).
    Json,
    /// Pretty-printed logs (for development).
    #[default]
    Pretty,
}

/// Initializes the logging subsystem.
///
/// Call once at application startup. Safe to call multiple times;
/// subsequent calls are no-ops.
///
/// # Environment Variables
///
/// - `RUST_LOG`: Controls log levels (e.g., `info`, `meridian_catalog::lock=trace`)
///
/// # Example
///
/// ```rust
/// use meridian_core::observability::{init_logging, LogFormat};
///
/// init_logging(LogFormat::Pretty);
/// ```
pub fn init_logging(format: LogFormat) {
    INIT.call_once(|| {
        let env_filter =
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));

        match format {
            LogFormat::Json => {
                tracing_subscriber::registry()
                    .with(env_filter)
                    .with(fmt::layer().json())
                    .init();
            }
            LogFormat::Pretty => {
                tracing_subscriber::registry()
                    .with(env_filter)
                    .with(fmt::layer().pretty())
                    .init();
            }
        }
    });
}

/// Creates a span for catalog dispatch operations.
///
/// # Example
///
/// ```rust
/// use meridian_core::observability::catalog_span;
///
/// let span = catalog_span("alter_table", "lake.hive.db1.orders");
/// let _guard = span.enter();
/// // ... dispatch the operation
/// ```
#[must_use]
pub fn catalog_span(operation: &str, ident: &str) -> Span {
    tracing::info_span!("catalog", op = operation, ident = ident)
}

/// Creates a span covering one tree-lock hold.
///
/// Debug level: a lock span wraps every catalog call, so it stays out of
/// default `info` output.
#[must_use]
pub fn lock_span(path: &str, mode: &str) -> Span {
    tracing::debug_span!("tree_lock", path = path, mode = mode)
}
