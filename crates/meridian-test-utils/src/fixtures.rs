//! Pre-built test fixtures for common test scenarios.
//!
//! Provides factory functions to create test data with sensible defaults.

use std::sync::Arc;

use meridian_catalog::config::TreeLockConfig;
use meridian_catalog::dispatcher::CatalogDispatcher;
use meridian_catalog::entity::Entity;
use meridian_catalog::lock::TreeLockManager;
use meridian_catalog::store::InMemoryEntityStore;
use meridian_core::{EntityType, NameIdentifier};

use crate::observer::RecordingObserver;

/// Parses a dotted identifier.
pub fn ident(path: &str) -> NameIdentifier {
    NameIdentifier::parse(path).expect("valid identifier")
}

/// Returns a config with small water marks, a fast reaper, and a short
/// acquisition timeout so stuck tests fail instead of hanging.
pub fn test_config() -> TreeLockConfig {
    TreeLockConfig {
        max_nodes_in_memory: 1_000,
        min_nodes_in_memory: 100,
        clean_interval_millis: 20,
        acquire_timeout_millis: 5_000,
        hold_warn_threshold_millis: 30_000,
    }
}

/// Returns [`test_config`] with the given water marks.
pub fn config_with_water_marks(max: usize, min: usize) -> TreeLockConfig {
    TreeLockConfig {
        max_nodes_in_memory: max,
        min_nodes_in_memory: min,
        ..test_config()
    }
}

/// Creates a manager with [`test_config`].
pub fn manager() -> TreeLockManager {
    TreeLockManager::new(test_config()).expect("valid config")
}

/// Creates a manager with [`test_config`] and a recording observer.
pub fn observed_manager() -> (TreeLockManager, Arc<RecordingObserver>) {
    let observer = Arc::new(RecordingObserver::new());
    let locks =
        TreeLockManager::with_observer(test_config(), observer.clone()).expect("valid config");
    (locks, observer)
}

/// Creates a dispatcher over an empty in-memory store.
pub fn dispatcher(locks: TreeLockManager) -> CatalogDispatcher<InMemoryEntityStore> {
    CatalogDispatcher::new(locks, Arc::new(InMemoryEntityStore::new()))
}

/// Creates a dispatcher seeded with `lake`, `lake.hive`, `lake.hive.db1` and
/// the table `lake.hive.db1.orders`.
pub fn seeded_dispatcher(locks: TreeLockManager) -> CatalogDispatcher<InMemoryEntityStore> {
    let catalog = dispatcher(locks);
    for (path, entity_type) in [
        ("lake", EntityType::Metalake),
        ("lake.hive", EntityType::Catalog),
        ("lake.hive.db1", EntityType::Schema),
        ("lake.hive.db1.orders", EntityType::Table),
    ] {
        catalog
            .create(Entity::new(ident(path), entity_type, "fixture"))
            .expect("seed entity");
    }
    catalog
}
