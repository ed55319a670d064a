//! Transaction layer for kvindex
//!
//! This crate maps the host's two-phase commit onto the remote store's
//! atomic batch:
//! - TransactionBridge: per-transaction state machine
//!   (Active -> Prepared -> Committed | RolledBack)
//! - XaTransaction / XaDataSource: the resource-manager contract the host
//!   drives bridges and data sources through

#![warn(missing_docs)]
#![warn(clippy::all)]

pub mod resource;
pub mod transaction;

pub use resource::{XaDataSource, XaTransaction};
pub use transaction::{TransactionBridge, TransactionStatus};
