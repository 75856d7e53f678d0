//! Hierarchical names for catalog entities.
//!
//! Every entity in the catalog lives at a dotted path in one namespace tree:
//!
//! ```text
//! metalake                          depth 1
//! └── catalog                       depth 2
//!     └── schema                    depth 3
//!         ├── table / fileset / topic   depth 4
//!         │   └── column            depth 5
//! ```
//!
//! A [`NameIdentifier`] names one node of that tree; a [`Namespace`] names the
//! container that lists its children. The empty identifier is the tree root,
//! which is never an entity but is the top of every lock path.
//!
//! # Example
//!
//! ```rust
//! use meridian_core::ident::NameIdentifier;
//!
//! let table = NameIdentifier::of_table("lake", "hive", "db1", "orders").unwrap();
//! assert_eq!(table.to_string(), "lake.hive.db1.orders");
//! assert_eq!(table.parent().unwrap().to_string(), "lake.hive.db1");
//! assert_eq!(table.depth(), 4);
//! ```

use std::fmt;

use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};

/// Separator between identifier levels.
pub const SEPARATOR: char = '.';

/// Display form of the root identifier.
const ROOT_DISPLAY: &str = "[root]";

/// The container part of an identifier: every level except the name.
#[derive(Debug, Clone, Default, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(try_from = "Vec<String>", into = "Vec<String>")]
pub struct Namespace(Vec<String>);

impl Namespace {
    /// Returns the empty namespace (the container of metalakes).
    #[must_use]
    pub const fn empty() -> Self {
        Self(Vec::new())
    }

    /// Creates a namespace from its levels.
    ///
    /// # Errors
    ///
    /// Returns [`Error::InvalidId`] if a level is empty or contains the separator.
    pub fn of<I, S>(levels: I) -> Result<Self>
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let levels: Vec<String> = levels.into_iter().map(Into::into).collect();
        validate_levels(&levels)?;
        Ok(Self(levels))
    }

    /// Returns the namespace levels.
    #[must_use]
    pub fn levels(&self) -> &[String] {
        &self.0
    }

    /// Returns the number of levels.
    #[must_use]
    pub fn len(&self) -> usize {
        self.0.len()
    }

    /// Returns true for the empty namespace.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// Returns the identifier of the node this namespace names.
    ///
    /// The empty namespace maps to the root identifier.
    #[must_use]
    pub fn to_identifier(&self) -> NameIdentifier {
        NameIdentifier(self.0.clone())
    }
}

impl TryFrom<Vec<String>> for Namespace {
    type Error = Error;

    fn try_from(levels: Vec<String>) -> Result<Self> {
        validate_levels(&levels)?;
        Ok(Self(levels))
    }
}

impl From<Namespace> for Vec<String> {
    fn from(namespace: Namespace) -> Self {
        namespace.0
    }
}

impl fmt::Display for Namespace {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0.join("."))
    }
}

/// A dotted identifier such as `lake.hive.db1.orders`.
///
/// Identifiers are compared and hashed by their levels, so they double as
/// registry keys for anything keyed by catalog path.
///
/// Serialized as the array of its levels; the root is the empty array.
#[derive(Debug, Clone, Default, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(try_from = "Vec<String>", into = "Vec<String>")]
pub struct NameIdentifier(Vec<String>);

impl NameIdentifier {
    /// Returns the root identifier (no levels).
    #[must_use]
    pub const fn root() -> Self {
        Self(Vec::new())
    }

    /// Creates an identifier from its levels.
    ///
    /// # Errors
    ///
    /// Returns [`Error::InvalidId`] if no level is given, a level is empty, or a
    /// level contains the separator.
    pub fn of<I, S>(levels: I) -> Result<Self>
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let levels: Vec<String> = levels.into_iter().map(Into::into).collect();
        if levels.is_empty() {
            return Err(Error::invalid_id(
                "identifier must have at least one level",
            ));
        }
        validate_levels(&levels)?;
        Ok(Self(levels))
    }

    /// Parses a dotted identifier.
    ///
    /// # Errors
    ///
    /// Returns [`Error::InvalidId`] if the string is empty or has an empty level.
    pub fn parse(s: &str) -> Result<Self> {
        Self::of(s.split(SEPARATOR))
    }

    /// Creates a metalake identifier.
    ///
    /// # Errors
    ///
    /// Returns [`Error::InvalidId`] if the name is invalid.
    pub fn of_metalake(metalake: &str) -> Result<Self> {
        Self::of([metalake])
    }

    /// Creates a catalog identifier.
    ///
    /// # Errors
    ///
    /// Returns [`Error::InvalidId`] if any name is invalid.
    pub fn of_catalog(metalake: &str, catalog: &str) -> Result<Self> {
        Self::of([metalake, catalog])
    }

    /// Creates a schema identifier.
    ///
    /// # Errors
    ///
    /// Returns [`Error::InvalidId`] if any name is invalid.
    pub fn of_schema(metalake: &str, catalog: &str, schema: &str) -> Result<Self> {
        Self::of([metalake, catalog, schema])
    }

    /// Creates a table identifier.
    ///
    /// # Errors
    ///
    /// Returns [`Error::InvalidId`] if any name is invalid.
    pub fn of_table(metalake: &str, catalog: &str, schema: &str, table: &str) -> Result<Self> {
        Self::of([metalake, catalog, schema, table])
    }

    /// Creates a fileset identifier.
    ///
    /// # Errors
    ///
    /// Returns [`Error::InvalidId`] if any name is invalid.
    pub fn of_fileset(metalake: &str, catalog: &str, schema: &str, fileset: &str) -> Result<Self> {
        Self::of([metalake, catalog, schema, fileset])
    }

    /// Creates a topic identifier.
    ///
    /// # Errors
    ///
    /// Returns [`Error::InvalidId`] if any name is invalid.
    pub fn of_topic(metalake: &str, catalog: &str, schema: &str, topic: &str) -> Result<Self> {
        Self::of([metalake, catalog, schema, topic])
    }

    /// Creates a column identifier.
    ///
    /// # Errors
    ///
    /// Returns [`Error::InvalidId`] if any name is invalid.
    pub fn of_column(
        metalake: &str,
        catalog: &str,
        schema: &str,
        table: &str,
        column: &str,
    ) -> Result<Self> {
        Self::of([metalake, catalog, schema, table, column])
    }

    /// Returns true for the root identifier.
    #[must_use]
    pub fn is_root(&self) -> bool {
        self.0.is_empty()
    }

    /// Returns all levels, name included. This is the lock path of the identifier.
    #[must_use]
    pub fn levels(&self) -> &[String] {
        &self.0
    }

    /// Returns the number of levels (0 for the root).
    #[must_use]
    pub fn depth(&self) -> usize {
        self.0.len()
    }

    /// Returns the last level, or `None` for the root.
    #[must_use]
    pub fn name(&self) -> Option<&str> {
        self.0.last().map(String::as_str)
    }

    /// Returns the namespace containing this identifier.
    #[must_use]
    pub fn namespace(&self) -> Namespace {
        match self.0.split_last() {
            Some((_, rest)) => Namespace(rest.to_vec()),
            None => Namespace::empty(),
        }
    }

    /// Returns the parent identifier; a metalake's parent is the root.
    ///
    /// Returns `None` only for the root itself.
    #[must_use]
    pub fn parent(&self) -> Option<Self> {
        self.0
            .split_last()
            .map(|(_, rest)| Self(rest.to_vec()))
    }

    /// Returns a child identifier one level below this one.
    ///
    /// # Errors
    ///
    /// Returns [`Error::InvalidId`] if `name` is not a valid level.
    pub fn child(&self, name: impl Into<String>) -> Result<Self> {
        let name = name.into();
        validate_level(self.0.len(), &name)?;
        let mut levels = self.0.clone();
        levels.push(name);
        Ok(Self(levels))
    }

    /// Returns a sibling identifier with the last level replaced.
    ///
    /// # Errors
    ///
    /// Returns [`Error::InvalidId`] if this is the root or `name` is invalid.
    pub fn with_name(&self, name: impl Into<String>) -> Result<Self> {
        let parent = self
            .parent()
            .ok_or_else(|| Error::invalid_id("the root identifier cannot be renamed"))?;
        parent.child(name)
    }

    /// Returns every non-root prefix, shortest first, ending with `self`.
    ///
    /// `lake.hive.db1` yields `lake`, `lake.hive`, `lake.hive.db1`.
    pub fn prefixes(&self) -> impl Iterator<Item = Self> + '_ {
        (1..=self.0.len()).map(|len| Self(self.0[..len].to_vec()))
    }

    /// Returns true if `self` is a strict descendant of `ancestor`.
    #[must_use]
    pub fn is_descendant_of(&self, ancestor: &Self) -> bool {
        self.0.len() > ancestor.0.len() && self.0.starts_with(&ancestor.0)
    }

    /// Replaces the `from` prefix of this identifier with `to`.
    ///
    /// Returns `None` if `from` is not a prefix of `self`.
    #[must_use]
    pub fn rebase(&self, from: &Self, to: &Self) -> Option<Self> {
        let suffix = self.0.strip_prefix(from.0.as_slice())?;
        let mut levels = to.0.clone();
        levels.extend_from_slice(suffix);
        Some(Self(levels))
    }
}

impl fmt::Display for NameIdentifier {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.0.is_empty() {
            f.write_str(ROOT_DISPLAY)
        } else {
            write!(f, "{}", self.0.join("."))
        }
    }
}

impl TryFrom<Vec<String>> for NameIdentifier {
    type Error = Error;

    /// Accepts the empty vector as the root, unlike [`NameIdentifier::of`].
    fn try_from(levels: Vec<String>) -> Result<Self> {
        validate_levels(&levels)?;
        Ok(Self(levels))
    }
}

impl From<NameIdentifier> for Vec<String> {
    fn from(ident: NameIdentifier) -> Self {
        ident.0
    }
}

impl std::str::FromStr for NameIdentifier {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        Self::parse(s)
    }
}

/// Kinds of entities stored in the catalog tree.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum EntityType {
    /// Top-level tenant container.
    Metalake,
    /// A catalog inside a metalake.
    Catalog,
    /// A schema (database) inside a catalog.
    Schema,
    /// A relational table.
    Table,
    /// A fileset (managed or external file collection).
    Fileset,
    /// A messaging topic.
    Topic,
    /// A column of a table.
    Column,
}

impl EntityType {
    /// Returns the string name of this entity type.
    #[must_use]
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::Metalake => "metalake",
            Self::Catalog => "catalog",
            Self::Schema => "schema",
            Self::Table => "table",
            Self::Fileset => "fileset",
            Self::Topic => "topic",
            Self::Column => "column",
        }
    }

    /// Returns the identifier depth every entity of this type has.
    #[must_use]
    pub const fn depth(&self) -> usize {
        match self {
            Self::Metalake => 1,
            Self::Catalog => 2,
            Self::Schema => 3,
            Self::Table | Self::Fileset | Self::Topic => 4,
            Self::Column => 5,
        }
    }

    /// Returns the type of the containing entity, or `None` for metalakes.
    #[must_use]
    pub const fn parent_type(&self) -> Option<Self> {
        match self {
            Self::Metalake => None,
            Self::Catalog => Some(Self::Metalake),
            Self::Schema => Some(Self::Catalog),
            Self::Table | Self::Fileset | Self::Topic => Some(Self::Schema),
            Self::Column => Some(Self::Table),
        }
    }

    /// Returns all entity types, containers first.
    #[must_use]
    pub const fn all() -> &'static [Self] {
        &[
            Self::Metalake,
            Self::Catalog,
            Self::Schema,
            Self::Table,
            Self::Fileset,
            Self::Topic,
            Self::Column,
        ]
    }

    /// Checks that `ident` has the depth this entity type requires.
    ///
    /// # Errors
    ///
    /// Returns [`Error::InvalidId`] on a depth mismatch.
    pub fn check(&self, ident: &NameIdentifier) -> Result<()> {
        if ident.depth() == self.depth() {
            Ok(())
        } else {
            Err(Error::invalid_id(format!(
                "{self} identifier '{ident}' must have {} levels, found {}",
                self.depth(),
                ident.depth()
            )))
        }
    }
}

impl fmt::Display for EntityType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

fn validate_levels(levels: &[String]) -> Result<()> {
    levels
        .iter()
        .enumerate()
        .try_for_each(|(index, level)| validate_level(index, level))
}

fn validate_level(index: usize, level: &str) -> Result<()> {
    if level.is_empty() {
        return Err(Error::invalid_id(format!("level {index} is empty")));
    }
    if level.contains(SEPARATOR) {
        return Err(Error::invalid_id(format!(
            "level {index} ('{level}') contains the separator '{SEPARATOR}'"
        )));
    }
    Ok(())
}
