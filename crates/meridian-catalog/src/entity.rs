//! Catalog entities and the changes that can be applied to them.

use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use meridian_core::{EntityType, NameIdentifier};

/// Who created and last modified an entity, and when.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AuditInfo {
    /// Principal that created the entity.
    pub creator: String,
    /// Creation time.
    pub create_time: DateTime<Utc>,
    /// Principal that last modified the entity.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub last_modifier: Option<String>,
    /// Last modification time.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub last_modified_time: Option<DateTime<Utc>>,
}

impl AuditInfo {
    /// Creates audit info for an entity created now by `creator`.
    #[must_use]
    pub fn created_by(creator: impl Into<String>) -> Self {
        Self {
            creator: creator.into(),
            create_time: Utc::now(),
            last_modifier: None,
            last_modified_time: None,
        }
    }

    /// Records a modification made now by `modifier`.
    pub fn touch(&mut self, modifier: impl Into<String>) {
        self.last_modifier = Some(modifier.into());
        self.last_modified_time = Some(Utc::now());
    }
}

/// A node of the catalog tree: a metalake, catalog, schema, table, fileset,
/// topic or column.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Entity {
    /// Full identifier.
    pub ident: NameIdentifier,
    /// Kind of entity.
    pub entity_type: EntityType,
    /// Free-form comment.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub comment: Option<String>,
    /// String properties.
    #[serde(default)]
    pub properties: BTreeMap<String, String>,
    /// Audit trail.
    pub audit: AuditInfo,
}

impl Entity {
    /// Creates an entity with no comment or properties.
    #[must_use]
    pub fn new(ident: NameIdentifier, entity_type: EntityType, creator: impl Into<String>) -> Self {
        Self {
            ident,
            entity_type,
            comment: None,
            properties: BTreeMap::new(),
            audit: AuditInfo::created_by(creator),
        }
    }

    /// Sets the comment.
    #[must_use]
    pub fn with_comment(mut self, comment: impl Into<String>) -> Self {
        self.comment = Some(comment.into());
        self
    }

    /// Adds a property.
    #[must_use]
    pub fn with_property(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.properties.insert(key.into(), value.into());
        self
    }

    /// Returns the entity's own name (the last identifier level).
    #[must_use]
    pub fn name(&self) -> &str {
        self.ident.name().unwrap_or_default()
    }
}

/// One modification applied by an alter operation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "camelCase")]
pub enum EntityChange {
    /// Renames the entity within its namespace.
    Rename {
        /// New last level.
        new_name: String,
    },
    /// Sets or overwrites a property.
    SetProperty {
        /// Property key.
        key: String,
        /// Property value.
        value: String,
    },
    /// Removes a property if present.
    RemoveProperty {
        /// Property key.
        key: String,
    },
    /// Replaces the comment.
    UpdateComment {
        /// New comment; `None` clears it.
        comment: Option<String>,
    },
}

impl EntityChange {
    /// Creates a rename change.
    #[must_use]
    pub fn rename(new_name: impl Into<String>) -> Self {
        Self::Rename {
            new_name: new_name.into(),
        }
    }

    /// Creates a set-property change.
    #[must_use]
    pub fn set_property(key: impl Into<String>, value: impl Into<String>) -> Self {
        Self::SetProperty {
            key: key.into(),
            value: value.into(),
        }
    }

    /// Creates a remove-property change.
    #[must_use]
    pub fn remove_property(key: impl Into<String>) -> Self {
        Self::RemoveProperty { key: key.into() }
    }

    /// Creates an update-comment change.
    #[must_use]
    pub fn update_comment(comment: Option<String>) -> Self {
        Self::UpdateComment { comment }
    }

    /// Returns the new name if this change is a rename.
    #[must_use]
    pub fn new_name(&self) -> Option<&str> {
        match self {
            Self::Rename { new_name } => Some(new_name),
            _ => None,
        }
    }
}
