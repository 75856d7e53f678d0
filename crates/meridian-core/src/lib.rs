//! # meridian-core
//!
//! Core abstractions for the Meridian metadata catalog.
//!
//! This crate provides the foundational types used across all Meridian components:
//!
//! - **Identifiers**: Dotted [`NameIdentifier`]s and [`Namespace`]s for the
//!   metalake / catalog / schema / table / column tree
//! - **Entity Types**: The kinds of entity that live in that tree
//! - **Error Types**: Shared error definitions and result types
//! - **Observability**: Logging initialization and span helpers
//!
//! ## Example
//!
//! ```rust
//! use meridian_core::prelude::*;
//!
//! let schema = NameIdentifier::of_schema("lake", "hive", "db1")?;
//! EntityType::Schema.check(&schema)?;
//! # Ok::<(), meridian_core::Error>(())
//! ```

#![forbid(unsafe_code)]
#![deny(missing_docs)]
#![deny(rust_2018_idioms)]
#![warn(clippy::pedantic)]

pub mod error;
pub mod ident;
pub mod observability;

/// Prelude module for convenient imports.
pub mod prelude {
    pub use crate::error::{Error, Result};
    pub use crate::ident::{EntityType, NameIdentifier, Namespace};
}

// Re-export key types at crate root for ergonomics
pub use error::{Error, Result};
pub use ident::{EntityType, NameIdentifier, Namespace};
pub use observability::{LogFormat, init_logging};
