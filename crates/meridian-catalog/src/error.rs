//! Error types for meridian-catalog operations.

use thiserror::Error;

use meridian_core::EntityType;

use crate::lock::LockError;

/// Result type alias for catalog operations.
pub type Result<T> = std::result::Result<T, CatalogError>;

/// Errors that can occur during catalog operations.
#[derive(Debug, Error)]
pub enum CatalogError {
    /// The tree lock could not be acquired or released.
    #[error(transparent)]
    Lock(#[from] LockError),

    /// An identifier or input was invalid.
    #[error(transparent)]
    Core(#[from] meridian_core::Error),

    /// The entity does not exist.
    #[error("{entity_type} not found: {ident}")]
    NotFound {
        /// Type of the missing entity.
        entity_type: EntityType,
        /// Identifier that was looked up.
        ident: String,
    },

    /// An entity with the same identifier already exists.
    #[error("{entity_type} already exists: {ident}")]
    AlreadyExists {
        /// Type of the conflicting entity.
        entity_type: EntityType,
        /// Identifier that is taken.
        ident: String,
    },

    /// The entity still has children and the drop was not cascading.
    #[error("{entity_type} {ident} is not empty ({children} children)")]
    NonEmpty {
        /// Type of the entity being dropped.
        entity_type: EntityType,
        /// Identifier of the entity being dropped.
        ident: String,
        /// Number of direct children found.
        children: usize,
    },

    /// The identifier does not fit the entity type, or a change cannot apply.
    #[error("invalid entity: {message}")]
    InvalidEntity {
        /// What is wrong.
        message: String,
    },

    /// The entity store failed.
    #[error("storage error: {message}")]
    Storage {
        /// Description of the storage failure.
        message: String,
    },
}

impl CatalogError {
    /// Creates an invalid-entity error.
    #[must_use]
    pub fn invalid_entity(message: impl Into<String>) -> Self {
        Self::InvalidEntity {
            message: message.into(),
        }
    }

    /// Creates a storage error.
    #[must_use]
    pub fn storage(message: impl Into<String>) -> Self {
        Self::Storage {
            message: message.into(),
        }
    }

    /// Returns true if retrying the whole operation may succeed.
    #[must_use]
    pub fn is_retryable(&self) -> bool {
        matches!(self, Self::Lock(err) if err.is_retryable())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::lock::LockMode;
    use std::time::Duration;

    #[test]
    fn lock_timeouts_are_retryable_through_catalog_error() {
        let err: CatalogError = LockError::Timeout {
            path: "lake".into(),
            mode: LockMode::Exclusive,
            waited: Duration::from_millis(10),
        }
        .into();
        assert!(err.is_retryable());

        let err = CatalogError::NotFound {
            entity_type: EntityType::Table,
            ident: "lake.hive.db1.orders".into(),
        };
        assert!(!err.is_retryable());
        assert_eq!(err.to_string(), "table not found: lake.hive.db1.orders");
    }
}
