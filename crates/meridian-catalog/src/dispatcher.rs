//! Tree-locked catalog operations.
//!
//! [`CatalogDispatcher`] is the only path from callers to the entity store.
//! Each operation takes the narrowest lock that keeps it consistent:
//!
//! | Operation | Locked node | Mode |
//! |-----------|-------------|------|
//! | create | parent | exclusive |
//! | load | entity | shared |
//! | alter | entity | exclusive |
//! | alter with rename | parent | exclusive |
//! | drop | parent | exclusive |
//! | list | namespace | shared |
//!
//! Creating or dropping takes the parent exclusively so that concurrent
//! lookups and listings of siblings see either the old or the new set of
//! children, never a half-applied change. A rename changes the parent's set
//! of children too, so it is treated the same way.

use std::sync::Arc;

use meridian_core::observability::catalog_span;
use meridian_core::{EntityType, NameIdentifier, Namespace};

use crate::entity::{Entity, EntityChange};
use crate::error::{CatalogError, Result};
use crate::lock::{LockMode, TreeLockManager};
use crate::store::EntityStore;

/// Runs catalog operations against an [`EntityStore`] under tree locks.
#[derive(Debug)]
pub struct CatalogDispatcher<S> {
    locks: TreeLockManager,
    store: Arc<S>,
}

impl<S> Clone for CatalogDispatcher<S> {
    fn clone(&self) -> Self {
        Self {
            locks: self.locks.clone(),
            store: Arc::clone(&self.store),
        }
    }
}

impl<S: EntityStore> CatalogDispatcher<S> {
    /// Creates a dispatcher over `store`, coordinating through `locks`.
    pub fn new(locks: TreeLockManager, store: Arc<S>) -> Self {
        Self { locks, store }
    }

    /// Returns the lock manager.
    #[must_use]
    pub fn locks(&self) -> &TreeLockManager {
        &self.locks
    }

    /// Returns the entity store.
    #[must_use]
    pub fn store(&self) -> &Arc<S> {
        &self.store
    }

    /// Creates `entity` under its parent.
    ///
    /// # Errors
    ///
    /// - [`CatalogError::Core`] if the identifier depth does not match the type.
    /// - [`CatalogError::NotFound`] if the parent entity does not exist.
    /// - [`CatalogError::AlreadyExists`] if the identifier is taken.
    /// - [`CatalogError::Lock`] if the parent lock could not be taken in time.
    pub fn create(&self, entity: Entity) -> Result<Entity> {
        let entity_type = entity.entity_type;
        let span = catalog_span(&format!("create_{entity_type}"), &entity.ident.to_string());
        let _entered = span.enter();

        entity_type.check(&entity.ident)?;
        let parent = parent_of(&entity.ident)?;

        self.locks.with_lock(&parent, LockMode::Exclusive, || {
            self.require_parent(&parent, entity_type)?;
            if self.store.exists(&entity.ident)? {
                return Err(CatalogError::AlreadyExists {
                    entity_type,
                    ident: entity.ident.to_string(),
                });
            }
            self.store.put(entity.clone(), false)?;
            tracing::info!(ident = %entity.ident, entity_type = %entity_type, "created entity");
            Ok(entity)
        })
    }

    /// Loads the entity of `entity_type` at `ident`.
    ///
    /// # Errors
    ///
    /// - [`CatalogError::Core`] if the identifier depth does not match the type.
    /// - [`CatalogError::NotFound`] if it does not exist.
    /// - [`CatalogError::Lock`] if the lock could not be taken in time.
    pub fn load(&self, ident: &NameIdentifier, entity_type: EntityType) -> Result<Entity> {
        let span = catalog_span(&format!("load_{entity_type}"), &ident.to_string());
        let _entered = span.enter();

        entity_type.check(ident)?;
        self.locks
            .with_lock(ident, LockMode::Shared, || self.store.get(ident, entity_type))
    }

    /// Returns true if an entity of `entity_type` exists at `ident`.
    ///
    /// # Errors
    ///
    /// Same as [`load`](Self::load), except that a missing entity is `false`.
    pub fn exists(&self, ident: &NameIdentifier, entity_type: EntityType) -> Result<bool> {
        match self.load(ident, entity_type) {
            Ok(_) => Ok(true),
            Err(CatalogError::NotFound { .. }) => Ok(false),
            Err(err) => Err(err),
        }
    }

    /// Applies `changes` in order to the entity at `ident`, recording
    /// `modifier` in its audit info.
    ///
    /// All changes apply or none do.
    ///
    /// # Errors
    ///
    /// - [`CatalogError::Core`] if an identifier or new name is invalid.
    /// - [`CatalogError::NotFound`] if the entity does not exist.
    /// - [`CatalogError::AlreadyExists`] if a rename target is taken.
    /// - [`CatalogError::Lock`] if the lock could not be taken in time.
    pub fn alter(
        &self,
        ident: &NameIdentifier,
        entity_type: EntityType,
        changes: &[EntityChange],
        modifier: &str,
    ) -> Result<Entity> {
        let span = catalog_span(&format!("alter_{entity_type}"), &ident.to_string());
        let _entered = span.enter();

        entity_type.check(ident)?;
        let renames = changes.iter().any(|change| change.new_name().is_some());
        let lock_target = if renames {
            parent_of(ident)?
        } else {
            ident.clone()
        };

        self.locks.with_lock(&lock_target, LockMode::Exclusive, || {
            let altered = self.store.update(ident, entity_type, &|current| {
                apply_changes(current, changes, modifier)
            })?;
            tracing::info!(
                ident = %ident,
                new_ident = %altered.ident,
                changes = changes.len(),
                "altered entity"
            );
            Ok(altered)
        })
    }

    /// Drops the entity at `ident`. Returns false if it did not exist.
    ///
    /// # Errors
    ///
    /// - [`CatalogError::Core`] if the identifier depth does not match the type.
    /// - [`CatalogError::NonEmpty`] if it has children and `cascade` is false.
    /// - [`CatalogError::Lock`] if the parent lock could not be taken in time.
    pub fn drop_entity(
        &self,
        ident: &NameIdentifier,
        entity_type: EntityType,
        cascade: bool,
    ) -> Result<bool> {
        let span = catalog_span(&format!("drop_{entity_type}"), &ident.to_string());
        let _entered = span.enter();

        entity_type.check(ident)?;
        let parent = parent_of(ident)?;

        self.locks.with_lock(&parent, LockMode::Exclusive, || {
            let dropped = self.store.delete(ident, entity_type, cascade)?;
            if dropped {
                tracing::info!(ident = %ident, cascade, "dropped entity");
            }
            Ok(dropped)
        })
    }

    /// Lists the entities of `entity_type` directly inside `namespace`.
    ///
    /// # Errors
    ///
    /// - [`CatalogError::InvalidEntity`] if `entity_type` cannot live in a
    ///   namespace of that depth.
    /// - [`CatalogError::Lock`] if the lock could not be taken in time.
    pub fn list(&self, namespace: &Namespace, entity_type: EntityType) -> Result<Vec<Entity>> {
        let target = namespace.to_identifier();
        let span = catalog_span(&format!("list_{entity_type}"), &target.to_string());
        let _entered = span.enter();

        if namespace.len() + 1 != entity_type.depth() {
            return Err(CatalogError::invalid_entity(format!(
                "{entity_type} entities cannot be listed in namespace '{namespace}'"
            )));
        }

        self.locks
            .with_lock(&target, LockMode::Shared, || self.store.list(namespace, entity_type))
    }

    fn require_parent(&self, parent: &NameIdentifier, entity_type: EntityType) -> Result<()> {
        let Some(parent_type) = entity_type.parent_type() else {
            return Ok(());
        };
        match self.store.get(parent, parent_type) {
            Ok(_) => Ok(()),
            Err(CatalogError::NotFound { .. }) => Err(CatalogError::NotFound {
                entity_type: parent_type,
                ident: parent.to_string(),
            }),
            Err(err) => Err(err),
        }
    }
}

fn parent_of(ident: &NameIdentifier) -> Result<NameIdentifier> {
    ident
        .parent()
        .ok_or_else(|| CatalogError::invalid_entity("the root is not a catalog entity"))
}

fn apply_changes(current: &Entity, changes: &[EntityChange], modifier: &str) -> Result<Entity> {
    let mut next = current.clone();
    for change in changes {
        match change {
            EntityChange::Rename { new_name } => {
                next.ident = next.ident.with_name(new_name.as_str())?;
            }
            EntityChange::SetProperty { key, value } => {
                next.properties.insert(key.clone(), value.clone());
            }
            EntityChange::RemoveProperty { key } => {
                next.properties.remove(key);
            }
            EntityChange::UpdateComment { comment } => {
                next.comment.clone_from(comment);
            }
        }
    }
    next.audit.touch(modifier);
    Ok(next)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::TreeLockConfig;
    use crate::store::InMemoryEntityStore;

    fn dispatcher() -> CatalogDispatcher<InMemoryEntityStore> {
        let locks = TreeLockManager::new(TreeLockConfig::default()).unwrap();
        CatalogDispatcher::new(locks, Arc::new(InMemoryEntityStore::new()))
    }

    fn ident(path: &str) -> NameIdentifier {
        NameIdentifier::parse(path).unwrap()
    }

    fn create(d: &CatalogDispatcher<InMemoryEntityStore>, path: &str, entity_type: EntityType) {
        d.create(Entity::new(ident(path), entity_type, "tester")).unwrap();
    }

    #[test]
    fn create_requires_parent() {
        let d = dispatcher();
        let err = d
            .create(Entity::new(ident("lake.hive"), EntityType::Catalog, "tester"))
            .unwrap_err();
        assert!(matches!(
            err,
            CatalogError::NotFound { entity_type: EntityType::Metalake, .. }
        ));

        create(&d, "lake", EntityType::Metalake);
        create(&d, "lake.hive", EntityType::Catalog);
        assert!(d.exists(&ident("lake.hive"), EntityType::Catalog).unwrap());
    }

    #[test]
    fn create_rejects_duplicates_and_bad_depths() {
        let d = dispatcher();
        create(&d, "lake", EntityType::Metalake);

        let dup = d.create(Entity::new(ident("lake"), EntityType::Metalake, "tester"));
        assert!(matches!(dup, Err(CatalogError::AlreadyExists { .. })));

        let bad = d.create(Entity::new(ident("lake.hive"), EntityType::Schema, "tester"));
        assert!(matches!(bad, Err(CatalogError::Core(_))));
    }

    #[test]
    fn alter_applies_changes_in_order() {
        let d = dispatcher();
        create(&d, "lake", EntityType::Metalake);

        let altered = d
            .alter(
                &ident("lake"),
                EntityType::Metalake,
                &[
                    EntityChange::set_property("owner", "alice"),
                    EntityChange::set_property("tier", "gold"),
                    EntityChange::remove_property("tier"),
                    EntityChange::update_comment(Some("primary".to_string())),
                ],
                "bob",
            )
            .unwrap();
        assert_eq!(altered.properties.get("owner").map(String::as_str), Some("alice"));
        assert!(!altered.properties.contains_key("tier"));
        assert_eq!(altered.comment.as_deref(), Some("primary"));
        assert_eq!(altered.audit.last_modifier.as_deref(), Some("bob"));
    }

    #[test]
    fn rename_moves_children_under_parent_lock() {
        let d = dispatcher();
        create(&d, "lake", EntityType::Metalake);
        create(&d, "lake.hive", EntityType::Catalog);
        create(&d, "lake.hive.db1", EntityType::Schema);

        let renamed = d
            .alter(
                &ident("lake.hive"),
                EntityType::Catalog,
                &[EntityChange::rename("iceberg")],
                "bob",
            )
            .unwrap();
        assert_eq!(renamed.ident, ident("lake.iceberg"));
        assert!(d.exists(&ident("lake.iceberg.db1"), EntityType::Schema).unwrap());
        assert!(!d.exists(&ident("lake.hive"), EntityType::Catalog).unwrap());
    }

    #[test]
    fn drop_respects_cascade() {
        let d = dispatcher();
        create(&d, "lake", EntityType::Metalake);
        create(&d, "lake.hive", EntityType::Catalog);

        let err = d
            .drop_entity(&ident("lake"), EntityType::Metalake, false)
            .unwrap_err();
        assert!(matches!(err, CatalogError::NonEmpty { children: 1, .. }));

        assert!(d.drop_entity(&ident("lake"), EntityType::Metalake, true).unwrap());
        assert!(!d.drop_entity(&ident("lake"), EntityType::Metalake, true).unwrap());
    }

    #[test]
    fn list_checks_namespace_depth() {
        let d = dispatcher();
        create(&d, "lake", EntityType::Metalake);
        create(&d, "other", EntityType::Metalake);

        let metalakes = d.list(&Namespace::empty(), EntityType::Metalake).unwrap();
        assert_eq!(metalakes.len(), 2);

        let err = d.list(&Namespace::empty(), EntityType::Table).unwrap_err();
        assert!(matches!(err, CatalogError::InvalidEntity { .. }));
    }

    #[test]
    fn operations_leave_no_lock_references_behind() {
        let d = dispatcher();
        create(&d, "lake", EntityType::Metalake);
        let _ = d.load(&ident("lake.missing"), EntityType::Catalog);
        let _ = d.drop_entity(&ident("lake"), EntityType::Metalake, false);

        let registry = d.locks().registry();
        assert_eq!(registry.root().reference_count(), 0);
        assert_eq!(registry.reference_count(&ident("lake")).unwrap(), Some(0));
    }
}
