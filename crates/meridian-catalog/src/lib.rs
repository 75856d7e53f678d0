//! # meridian-catalog
//!
//! Hierarchical lock coordination for the Meridian metadata catalog.
//!
//! The catalog is a tree: metalakes contain catalogs, catalogs contain
//! schemas, schemas contain tables, filesets and topics, tables contain
//! columns. Every operation on that tree runs under a tree lock that covers
//! the path from the root down to the entity it touches:
//!
//! - **Tree locks** ([`lock`]): per-node reentrant shared/exclusive locks,
//!   resolved lazily into an in-memory registry and evicted in the background
//!   once unreferenced
//! - **Dispatch** ([`dispatcher`]): create/load/alter/drop/list operations,
//!   each taking the narrowest lock that keeps it consistent
//! - **Storage seam** ([`store`]): the [`EntityStore`] trait and an
//!   in-memory implementation
//!
//! ## Example
//!
//! ```rust
//! use std::sync::Arc;
//!
//! use meridian_catalog::prelude::*;
//! use meridian_core::{EntityType, NameIdentifier};
//!
//! let locks = TreeLockManager::new(TreeLockConfig::default())?;
//! let catalog = CatalogDispatcher::new(locks, Arc::new(InMemoryEntityStore::new()));
//!
//! let lake = NameIdentifier::of_metalake("lake")?;
//! catalog.create(Entity::new(lake.clone(), EntityType::Metalake, "admin"))?;
//! assert!(catalog.exists(&lake, EntityType::Metalake)?);
//! # Ok::<(), Box<dyn std::error::Error>>(())
//! ```

#![forbid(unsafe_code)]
#![deny(missing_docs)]
#![deny(rust_2018_idioms)]
#![warn(clippy::pedantic)]

pub mod config;
pub mod dispatcher;
pub mod entity;
pub mod error;
pub mod lock;
pub mod metrics;
pub mod store;

// Re-export main types at crate root
pub use config::TreeLockConfig;
pub use dispatcher::CatalogDispatcher;
pub use entity::{AuditInfo, Entity, EntityChange};
pub use error::{CatalogError, Result};
pub use lock::{LockError, LockMode, LockObserver, TreeLockManager};
pub use store::{EntityStore, InMemoryEntityStore};

/// Prelude module for convenient imports.
pub mod prelude {
    pub use crate::config::TreeLockConfig;
    pub use crate::dispatcher::CatalogDispatcher;
    pub use crate::entity::{Entity, EntityChange};
    pub use crate::error::CatalogError;
    pub use crate::lock::{LockError, LockMode, TreeLockManager};
    pub use crate::store::{EntityStore, InMemoryEntityStore};
}
