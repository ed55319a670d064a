//! Index identity types
//!
//! - [`EntityType`]: whether an index covers nodes or relationships
//! - [`IndexIdentifier`]: (entity type, index name) pair naming a logical index
//! - [`IndexConfig`]: opaque per-index settings persisted by the metadata store

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;

/// Kind of host entity an index covers
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum EntityType {
    /// Graph node
    Node,
    /// Graph relationship
    Relationship,
}

impl EntityType {
    /// Stable lowercase name, used in log output and metadata files
    pub fn as_str(&self) -> &'static str {
        match self {
            EntityType::Node => "node",
            EntityType::Relationship => "relationship",
        }
    }
}

impl fmt::Display for EntityType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Settings of a single index (e.g. `type = "exact"`)
///
/// Opaque to the transaction pipeline; only the metadata store interprets it.
pub type IndexConfig = BTreeMap<String, String>;

/// Identifies a logical index
///
/// Stable for the lifetime of the index. Two identifiers with the same
/// index name but different entity types share the remote key space,
/// since remote keys are derived from the index name alone.
///
/// # Examples
///
/// ```
/// use kvindex_core::{EntityType, IndexIdentifier};
///
/// let id = IndexIdentifier::node("people");
/// assert_eq!(id.entity_type, EntityType::Node);
/// assert_eq!(id.to_string(), "node/people");
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct IndexIdentifier {
    /// Entity kind the index covers
    pub entity_type: EntityType,
    /// Index name, also the reverse-index key in the remote store
    pub index_name: String,
}

impl IndexIdentifier {
    /// Create a new identifier
    pub fn new(entity_type: EntityType, index_name: impl Into<String>) -> Self {
        Self {
            entity_type,
            index_name: index_name.into(),
        }
    }

    /// Identifier for a node index
    pub fn node(index_name: impl Into<String>) -> Self {
        Self::new(EntityType::Node, index_name)
    }

    /// Identifier for a relationship index
    pub fn relationship(index_name: impl Into<String>) -> Self {
        Self::new(EntityType::Relationship, index_name)
    }
}

impl fmt::Display for IndexIdentifier {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.entity_type, self.index_name)
    }
}
