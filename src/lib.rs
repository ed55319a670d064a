//! # kvindex
//!
//! Transactional set index over a remote key-value store.
//!
//! A host transaction manager drives each transaction through a two-phase
//! commit; kvindex maps that onto the remote store's MULTI/EXEC batch.
//! Index entries live as sets keyed `index:key:value`, and every index
//! keeps a reverse-index set of the keys it has written.
//!
//! ## Quick Start
//!
//! ```ignore
//! use kvindex::prelude::*;
//!
//! let source = DataSource::builder().host("localhost").open()?;
//! let people = IndexIdentifier::node("people");
//!
//! let mut txn = source.create_transaction(1);
//! txn.add(&people, "name", "alice", 42)?;
//! txn.prepare()?;   // MULTI + SADDs staged on a held connection
//! txn.commit()?;    // EXEC, connection released
//!
//! source.close();
//! ```
//!
//! ## Crates
//!
//! - `kvindex-core` - identifiers, commands, key format, errors
//! - `kvindex-storage` - RESP client, in-memory store, connection pool
//! - `kvindex-durability` - command log framing for host recovery
//! - `kvindex-concurrency` - the per-transaction bridge and XA traits
//! - `kvindex-engine` - the data source, its config and index metadata

#![warn(missing_docs)]

pub mod prelude;

// Entry points
pub use kvindex_engine::{
    DataSource, DataSourceBuilder, DataSourceConfig, IndexStore, IndexStoreConfig, BRANCH_ID,
    DATA_SOURCE_NAME,
};

// Transactions
pub use kvindex_concurrency::{TransactionBridge, TransactionStatus, XaDataSource, XaTransaction};

// Core types
pub use kvindex_core::{
    CommandKind, EntityType, Error, IndexConfig, IndexIdentifier, IndexMetadataStore,
    IndexResolver, KeyFormatter, MutationCommand, RemoteConnection, RemoteError, Result,
    KEY_DELIMITER,
};

// Remote store plumbing
pub use kvindex_storage::{
    ConnectionPool, EndpointConfig, ExhaustionPolicy, FaultInjector, Lease, MemoryConnection,
    MemoryConnectionManager, MemoryStore, PoolConfig, RespConnection, RespConnectionManager,
};

// Command log
pub use kvindex_durability::{read_command, write_command, CommandLogReader};
