//! Convenient imports for kvindex.
//!
//! ```ignore
//! use kvindex::prelude::*;
//!
//! let source = DataSource::ephemeral(Arc::new(MemoryStore::new()))?;
//! ```

// Main entry point
pub use crate::{DataSource, DataSourceBuilder, DataSourceConfig};

// Error handling
pub use crate::{Error, Result};

// Transactions
pub use crate::{TransactionBridge, TransactionStatus, XaDataSource, XaTransaction};

// Core types
pub use crate::{EntityType, IndexConfig, IndexIdentifier, MutationCommand};

// In-process store
pub use crate::MemoryStore;
