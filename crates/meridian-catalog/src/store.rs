//! Entity storage seam.
//!
//! The store holds catalog entities keyed by full identifier. It provides no
//! locking of its own beyond keeping its internal map consistent; callers
//! coordinate through the tree lock (see [`crate::dispatcher`]).

use std::collections::BTreeMap;
use std::ops::Bound;
use std::sync::{RwLock, RwLockReadGuard, RwLockWriteGuard};

use meridian_core::{EntityType, NameIdentifier, Namespace};

use crate::entity::Entity;
use crate::error::{CatalogError, Result};

/// Storage backend for catalog entities.
///
/// Implementations must be safe to share between threads. They are always
/// called with the relevant tree lock held, so check-then-act sequences on a
/// single identifier are race free from the caller's point of view.
pub trait EntityStore: Send + Sync {
    /// Loads the entity of `entity_type` at `ident`.
    ///
    /// # Errors
    ///
    /// Returns [`CatalogError::NotFound`] if no such entity exists.
    fn get(&self, ident: &NameIdentifier, entity_type: EntityType) -> Result<Entity>;

    /// Returns true if any entity exists at `ident`.
    ///
    /// # Errors
    ///
    /// Returns [`CatalogError::Storage`] on backend failure.
    fn exists(&self, ident: &NameIdentifier) -> Result<bool>;

    /// Stores `entity`, replacing an existing one only if `overwrite` is set.
    ///
    /// # Errors
    ///
    /// Returns [`CatalogError::AlreadyExists`] if the identifier is taken and
    /// `overwrite` is false.
    fn put(&self, entity: Entity, overwrite: bool) -> Result<()>;

    /// Replaces the entity at `ident` with the result of `f`.
    ///
    /// If `f` changes the identifier, the entity and all of its descendants
    /// move to the new identifier. Only the last level may change: the entity
    /// stays under the same parent.
    ///
    /// # Errors
    ///
    /// - [`CatalogError::NotFound`] if no such entity exists.
    /// - [`CatalogError::InvalidEntity`] if `f` changes the type or the parent.
    /// - [`CatalogError::AlreadyExists`] if the new identifier is taken.
    /// - Any error returned by `f`; the store is left unchanged.
    fn update(
        &self,
        ident: &NameIdentifier,
        entity_type: EntityType,
        f: &dyn Fn(&Entity) -> Result<Entity>,
    ) -> Result<Entity>;

    /// Deletes the entity at `ident`, and its descendants if `cascade` is set.
    ///
    /// Returns false if there was nothing to delete.
    ///
    /// # Errors
    ///
    /// Returns [`CatalogError::NonEmpty`] if the entity has children and
    /// `cascade` is false.
    fn delete(&self, ident: &NameIdentifier, entity_type: EntityType, cascade: bool)
    -> Result<bool>;

    /// Lists the entities of `entity_type` directly inside `namespace`.
    ///
    /// # Errors
    ///
    /// Returns [`CatalogError::Storage`] on backend failure.
    fn list(&self, namespace: &Namespace, entity_type: EntityType) -> Result<Vec<Entity>>;
}

/// In-memory entity store for tests and development.
///
/// Thread-safe via `RwLock`. Not suitable for production.
#[derive(Debug, Default)]
pub struct InMemoryEntityStore {
    entities: RwLock<BTreeMap<NameIdentifier, Entity>>,
}

impl InMemoryEntityStore {
    /// Creates an empty store.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns the number of stored entities.
    ///
    /// # Errors
    ///
    /// Returns [`CatalogError::Storage`] if the store lock was poisoned.
    pub fn len(&self) -> Result<usize> {
        Ok(self.read()?.len())
    }

    /// Returns true if the store is empty.
    ///
    /// # Errors
    ///
    /// Returns [`CatalogError::Storage`] if the store lock was poisoned.
    pub fn is_empty(&self) -> Result<bool> {
        Ok(self.read()?.is_empty())
    }

    fn read(&self) -> Result<RwLockReadGuard<'_, BTreeMap<NameIdentifier, Entity>>> {
        self.entities
            .read()
            .map_err(|_| CatalogError::storage("entity store lock poisoned"))
    }

    fn write(&self) -> Result<RwLockWriteGuard<'_, BTreeMap<NameIdentifier, Entity>>> {
        self.entities
            .write()
            .map_err(|_| CatalogError::storage("entity store lock poisoned"))
    }
}

/// Identifiers strictly below `ident`. Descendants sort directly after their
/// ancestor, so they form one contiguous range.
fn descendants<'a>(
    entities: &'a BTreeMap<NameIdentifier, Entity>,
    ident: &'a NameIdentifier,
) -> impl Iterator<Item = &'a NameIdentifier> + 'a {
    entities
        .range((Bound::Excluded(ident), Bound::Unbounded))
        .map(|(key, _)| key)
        .take_while(move |key| key.is_descendant_of(ident))
}

fn not_found(ident: &NameIdentifier, entity_type: EntityType) -> CatalogError {
    CatalogError::NotFound {
        entity_type,
        ident: ident.to_string(),
    }
}

impl EntityStore for InMemoryEntityStore {
    fn get(&self, ident: &NameIdentifier, entity_type: EntityType) -> Result<Entity> {
        self.read()?
            .get(ident)
            .filter(|entity| entity.entity_type == entity_type)
            .cloned()
            .ok_or_else(|| not_found(ident, entity_type))
    }

    fn exists(&self, ident: &NameIdentifier) -> Result<bool> {
        Ok(self.read()?.contains_key(ident))
    }

    fn put(&self, entity: Entity, overwrite: bool) -> Result<()> {
        let mut entities = self.write()?;
        if !overwrite && entities.contains_key(&entity.ident) {
            return Err(CatalogError::AlreadyExists {
                entity_type: entity.entity_type,
                ident: entity.ident.to_string(),
            });
        }
        entities.insert(entity.ident.clone(), entity);
        Ok(())
    }

    fn update(
        &self,
        ident: &NameIdentifier,
        entity_type: EntityType,
        f: &dyn Fn(&Entity) -> Result<Entity>,
    ) -> Result<Entity> {
        let mut entities = self.write()?;
        let current = entities
            .get(ident)
            .filter(|entity| entity.entity_type == entity_type)
            .ok_or_else(|| not_found(ident, entity_type))?;

        let updated = f(current)?;
        if updated.entity_type != entity_type {
            return Err(CatalogError::invalid_entity(format!(
                "cannot change {ident} from {entity_type} to {}",
                updated.entity_type
            )));
        }

        if updated.ident != *ident {
            if updated.ident.parent() != ident.parent() {
                return Err(CatalogError::invalid_entity(format!(
                    "cannot move {ident} to {}: only renames within the same parent are allowed",
                    updated.ident
                )));
            }
            if entities.contains_key(&updated.ident) {
                return Err(CatalogError::AlreadyExists {
                    entity_type,
                    ident: updated.ident.to_string(),
                });
            }
            let moved: Vec<NameIdentifier> = descendants(&entities, ident).cloned().collect();
            for old in moved {
                if let Some(mut child) = entities.remove(&old) {
                    if let Some(new_ident) = old.rebase(ident, &updated.ident) {
                        child.ident = new_ident.clone();
                        entities.insert(new_ident, child);
                    }
                }
            }
            entities.remove(ident);
        }

        entities.insert(updated.ident.clone(), updated.clone());
        Ok(updated)
    }

    fn delete(
        &self,
        ident: &NameIdentifier,
        entity_type: EntityType,
        cascade: bool,
    ) -> Result<bool> {
        let mut entities = self.write()?;
        if !entities
            .get(ident)
            .is_some_and(|entity| entity.entity_type == entity_type)
        {
            return Ok(false);
        }

        let below: Vec<NameIdentifier> = descendants(&entities, ident).cloned().collect();
        if !below.is_empty() && !cascade {
            let children = below
                .iter()
                .filter(|key| key.depth() == ident.depth() + 1)
                .count();
            return Err(CatalogError::NonEmpty {
                entity_type,
                ident: ident.to_string(),
                children,
            });
        }

        for key in &below {
            entities.remove(key);
        }
        entities.remove(ident);
        Ok(true)
    }

    fn list(&self, namespace: &Namespace, entity_type: EntityType) -> Result<Vec<Entity>> {
        let entities = self.read()?;
        let parent = namespace.to_identifier();
        let listed = if parent.is_root() {
            entities
                .values()
                .filter(|entity| entity.ident.depth() == 1 && entity.entity_type == entity_type)
                .cloned()
                .collect()
        } else {
            descendants(&entities, &parent)
                .filter(|key| key.depth() == parent.depth() + 1)
                .filter_map(|key| entities.get(key))
                .filter(|entity| entity.entity_type == entity_type)
                .cloned()
                .collect()
        };
        Ok(listed)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn entity(path: &str, entity_type: EntityType) -> Entity {
        Entity::new(NameIdentifier::parse(path).unwrap(), entity_type, "tester")
    }

    fn seeded() -> InMemoryEntityStore {
        let store = InMemoryEntityStore::new();
        store.put(entity("lake", EntityType::Metalake), false).unwrap();
        store.put(entity("lake.hive", EntityType::Catalog), false).unwrap();
        store.put(entity("lake.hive.db1", EntityType::Schema), false).unwrap();
        store.put(entity("lake.hive.db1.orders", EntityType::Table), false).unwrap();
        store.put(entity("lake.hive.db1.events", EntityType::Topic), false).unwrap();
        store.put(entity("lake.hive.db10", EntityType::Schema), false).unwrap();
        store
    }

    #[test]
    fn put_refuses_to_overwrite_unless_asked() {
        let store = seeded();
        let err = store.put(entity("lake.hive", EntityType::Catalog), false).unwrap_err();
        assert!(matches!(err, CatalogError::AlreadyExists { .. }));
        store
            .put(entity("lake.hive", EntityType::Catalog).with_comment("replaced"), true)
            .unwrap();
        let loaded = store
            .get(&NameIdentifier::parse("lake.hive").unwrap(), EntityType::Catalog)
            .unwrap();
        assert_eq!(loaded.comment.as_deref(), Some("replaced"));
    }

    #[test]
    fn get_checks_entity_type() {
        let store = seeded();
        let ident = NameIdentifier::parse("lake.hive.db1.events").unwrap();
        assert!(store.get(&ident, EntityType::Topic).is_ok());
        assert!(matches!(
            store.get(&ident, EntityType::Table),
            Err(CatalogError::NotFound { .. })
        ));
    }

    #[test]
    fn list_returns_direct_children_of_type() {
        let store = seeded();
        let schema = Namespace::of(["lake", "hive", "db1"]).unwrap();
        let tables = store.list(&schema, EntityType::Table).unwrap();
        assert_eq!(tables.len(), 1);
        assert_eq!(tables[0].name(), "orders");

        let catalog = Namespace::of(["lake", "hive"]).unwrap();
        let schemas: Vec<String> = store
            .list(&catalog, EntityType::Schema)
            .unwrap()
            .iter()
            .map(|e| e.name().to_string())
            .collect();
        assert_eq!(schemas, ["db1", "db10"]);

        let metalakes = store.list(&Namespace::empty(), EntityType::Metalake).unwrap();
        assert_eq!(metalakes.len(), 1);
    }

    #[test]
    fn delete_requires_cascade_for_non_empty() {
        let store = seeded();
        let db1 = NameIdentifier::parse("lake.hive.db1").unwrap();

        let err = store.delete(&db1, EntityType::Schema, false).unwrap_err();
        assert!(matches!(err, CatalogError::NonEmpty { children: 2, .. }));

        assert!(store.delete(&db1, EntityType::Schema, true).unwrap());
        assert!(!store.exists(&db1).unwrap());
        assert!(!store.exists(&NameIdentifier::parse("lake.hive.db1.orders").unwrap()).unwrap());
        // A sibling sharing the name prefix survives.
        assert!(store.exists(&NameIdentifier::parse("lake.hive.db10").unwrap()).unwrap());

        assert!(!store.delete(&db1, EntityType::Schema, true).unwrap());
    }

    #[test]
    fn rename_moves_descendants() {
        let store = seeded();
        let db1 = NameIdentifier::parse("lake.hive.db1").unwrap();
        let renamed = store
            .update(&db1, EntityType::Schema, &|entity| {
                let mut next = entity.clone();
                next.ident = entity.ident.with_name("sales")?;
                Ok(next)
            })
            .unwrap();
        assert_eq!(renamed.ident.to_string(), "lake.hive.sales");

        let moved = store
            .get(&NameIdentifier::parse("lake.hive.sales.orders").unwrap(), EntityType::Table)
            .unwrap();
        assert_eq!(moved.ident.to_string(), "lake.hive.sales.orders");
        assert!(!store.exists(&db1).unwrap());
        assert_eq!(store.len().unwrap(), 6);
    }

    #[test]
    fn rename_onto_existing_identifier_fails_without_changes() {
        let store = seeded();
        let db1 = NameIdentifier::parse("lake.hive.db1").unwrap();
        let err = store
            .update(&db1, EntityType::Schema, &|entity| {
                let mut next = entity.clone();
                next.ident = entity.ident.with_name("db10")?;
                Ok(next)
            })
            .unwrap_err();
        assert!(matches!(err, CatalogError::AlreadyExists { .. }));
        assert!(store.exists(&db1).unwrap());
    }

    #[test]
    fn update_cannot_move_an_entity_to_another_parent() {
        let store = seeded();
        let db1 = NameIdentifier::parse("lake.hive.db1").unwrap();
        for target in ["lake.other.db1", "lake.hive.db1.nested", "lake.hive"] {
            let target = NameIdentifier::parse(target).unwrap();
            let err = store
                .update(&db1, EntityType::Schema, &|entity| {
                    let mut next = entity.clone();
                    next.ident = target.clone();
                    Ok(next)
                })
                .unwrap_err();
            assert!(matches!(err, CatalogError::InvalidEntity { .. }), "{target}: {err}");
        }
        assert!(store.exists(&db1).unwrap());
        assert_eq!(store.len().unwrap(), 6);
    }
}
