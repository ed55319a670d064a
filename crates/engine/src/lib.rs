//! Data source for kvindex
//!
//! The [`DataSource`] is what the host transaction manager registers: it
//! owns the connection pool, the key formatter and the index metadata
//! store, and creates one [`TransactionBridge`] per host transaction.
//!
//! [`TransactionBridge`]: kvindex_concurrency::TransactionBridge

#![warn(missing_docs)]
#![warn(clippy::all)]

pub mod config;
pub mod datasource;
pub mod index_store;

pub use config::{DataSourceConfig, IndexStoreConfig};
pub use datasource::{DataSource, DataSourceBuilder, BRANCH_ID, DATA_SOURCE_NAME};
pub use index_store::IndexStore;
