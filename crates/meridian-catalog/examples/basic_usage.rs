//! Basic usage example: a tree-locked catalog shared by several threads.
//!
//! Run with: `cargo run --example basic_usage`

use std::sync::Arc;
use std::thread;

use meridian_catalog::metrics::register_metrics;
use meridian_catalog::prelude::*;
use metrics_exporter_prometheus::PrometheusBuilder;
use meridian_core::{EntityType, LogFormat, NameIdentifier, Namespace, init_logging};

fn main() -> Result<(), Box<dyn std::error::Error>> {
    init_logging(LogFormat::Pretty);
    let metrics = PrometheusBuilder::new().install_recorder()?;
    register_metrics();

    let locks = TreeLockManager::new(TreeLockConfig::from_env()?)?;
    let catalog = CatalogDispatcher::new(locks, Arc::new(InMemoryEntityStore::new()));

    for (path, entity_type) in [
        ("lake", EntityType::Metalake),
        ("lake.hive", EntityType::Catalog),
        ("lake.hive.sales", EntityType::Schema),
    ] {
        catalog.create(Entity::new(NameIdentifier::parse(path)?, entity_type, "admin"))?;
    }

    let writers: Vec<_> = (0..4)
        .map(|worker| {
            let catalog = catalog.clone();
            thread::spawn(move || -> Result<(), CatalogError> {
                let table = NameIdentifier::of_table("lake", "hive", "sales", &format!("orders_{worker}"))?;
                catalog.create(Entity::new(table, EntityType::Table, format!("worker-{worker}")))?;
                Ok(())
            })
        })
        .collect();
    for writer in writers {
        writer.join().map_err(|_| "writer panicked")??;
    }

    let sales = Namespace::of(["lake", "hive", "sales"])?;
    for table in catalog.list(&sales, EntityType::Table)? {
        println!("{} (created by {})", table.ident, table.audit.creator);
    }
    println!("lock nodes in memory: {}", catalog.locks().registry().size()?);

    for line in metrics.render().lines() {
        if line.starts_with("meridian_tree_lock_acquired_total") {
            println!("{line}");
        }
    }

    Ok(())
}
