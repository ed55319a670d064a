//! Collaborator traits
//!
//! The transaction pipeline talks to three things it does not own:
//! - [`RemoteConnection`]: one connection to the remote key-value store
//! - [`IndexMetadataStore`]: where index configuration is persisted
//! - [`IndexResolver`]: maps logged index names back to identifiers on replay

use crate::error::{RemoteError, Result};
use crate::types::{EntityType, IndexConfig, IndexIdentifier};

/// A connection to the remote key-value store
///
/// Only the batch surface is used by the transaction pipeline:
/// `multi` opens a batch, `sadd`/`srem` stage set mutations into it,
/// `exec` applies the whole batch atomically and `discard` abandons it.
/// Staged operations have no remote effect until `exec`.
pub trait RemoteConnection: Send + 'static {
    /// Open an atomic batch on this connection
    fn multi(&mut self) -> std::result::Result<(), RemoteError>;

    /// Stage "add `member` to the set at `key`"
    fn sadd(&mut self, key: &str, member: &str) -> std::result::Result<(), RemoteError>;

    /// Stage "remove `member` from the set at `key`"
    fn srem(&mut self, key: &str, member: &str) -> std::result::Result<(), RemoteError>;

    /// Apply every staged operation as one unit and close the batch
    fn exec(&mut self) -> std::result::Result<(), RemoteError>;

    /// Drop every staged operation and close the batch
    fn discard(&mut self) -> std::result::Result<(), RemoteError>;

    /// Whether a batch is currently open
    fn in_batch(&self) -> bool;

    /// Whether the connection hit an unrecoverable error and must not be reused
    fn is_broken(&self) -> bool {
        false
    }
}

/// Persistent store of index configuration
pub trait IndexMetadataStore: Send + Sync {
    /// Record `config` for the index unless it is already known.
    ///
    /// Idempotent. Returns `true` if the store changed.
    fn set_if_necessary(
        &self,
        entity_type: EntityType,
        index_name: &str,
        config: &IndexConfig,
    ) -> Result<bool>;

    /// Configuration of an index, if it exists
    fn get(&self, entity_type: EntityType, index_name: &str) -> Option<IndexConfig>;
}

/// Resolves index identifiers for commands replayed from the log
pub trait IndexResolver {
    /// Identifier for a logged (entity type, index name) pair
    fn resolve(&self, entity_type: EntityType, index_name: &str) -> IndexIdentifier;
}
