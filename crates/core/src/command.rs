//! Mutation commands buffered by a transaction
//!
//! Commands are produced by application calls or replayed from the command
//! log. They are immutable once built; a transaction keeps them in insertion
//! order and that order is preserved when they are staged remotely.

use crate::types::{IndexConfig, IndexIdentifier};
use serde::{Deserialize, Serialize};

/// Discriminant of a [`MutationCommand`]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum CommandKind {
    /// Add an entity to an index entry
    AddEntry,
    /// Remove an entity from an index entry
    RemoveEntry,
    /// Create (or confirm) an index
    CreateIndex,
}

/// A single buffered index mutation
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum MutationCommand {
    /// Add `entity_id` under `key = value` of the index
    AddEntry {
        /// Target index
        identifier: IndexIdentifier,
        /// Indexed field key
        key: String,
        /// Indexed field value
        value: String,
        /// Host entity id
        entity_id: u64,
    },

    /// Remove `entity_id` from `key = value` of the index
    RemoveEntry {
        /// Target index
        identifier: IndexIdentifier,
        /// Indexed field key
        key: String,
        /// Indexed field value
        value: String,
        /// Host entity id
        entity_id: u64,
    },

    /// Create the index with the given configuration
    ///
    /// Applied to the metadata store, never to the remote batch.
    CreateIndex {
        /// Index being created
        identifier: IndexIdentifier,
        /// Index configuration
        config: IndexConfig,
    },
}

impl MutationCommand {
    /// Build an [`MutationCommand::AddEntry`]
    pub fn add(
        identifier: IndexIdentifier,
        key: impl Into<String>,
        value: impl Into<String>,
        entity_id: u64,
    ) -> Self {
        MutationCommand::AddEntry {
            identifier,
            key: key.into(),
            value: value.into(),
            entity_id,
        }
    }

    /// Build a [`MutationCommand::RemoveEntry`]
    pub fn remove(
        identifier: IndexIdentifier,
        key: impl Into<String>,
        value: impl Into<String>,
        entity_id: u64,
    ) -> Self {
        MutationCommand::RemoveEntry {
            identifier,
            key: key.into(),
            value: value.into(),
            entity_id,
        }
    }

    /// Build a [`MutationCommand::CreateIndex`]
    pub fn create_index(identifier: IndexIdentifier, config: IndexConfig) -> Self {
        MutationCommand::CreateIndex { identifier, config }
    }

    /// Index this command targets
    pub fn identifier(&self) -> &IndexIdentifier {
        match self {
            MutationCommand::AddEntry { identifier, .. }
            | MutationCommand::RemoveEntry { identifier, .. }
            | MutationCommand::CreateIndex { identifier, .. } => identifier,
        }
    }

    /// Kind of this command
    pub fn kind(&self) -> CommandKind {
        match self {
            MutationCommand::AddEntry { .. } => CommandKind::AddEntry,
            MutationCommand::RemoveEntry { .. } => CommandKind::RemoveEntry,
            MutationCommand::CreateIndex { .. } => CommandKind::CreateIndex,
        }
    }

    /// Number of remote operations this command stages
    ///
    /// Add/remove stage the entry mutation plus the reverse-index mutation.
    pub fn remote_op_count(&self) -> usize {
        match self {
            MutationCommand::AddEntry { .. } | MutationCommand::RemoveEntry { .. } => 2,
            MutationCommand::CreateIndex { .. } => 0,
        }
    }
}
