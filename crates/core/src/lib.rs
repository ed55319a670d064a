//! Core types for kvindex
//!
//! This crate defines the vocabulary shared by every other crate:
//! - [`IndexIdentifier`] and [`EntityType`]: which logical index a command targets
//! - [`MutationCommand`]: the buffered add/remove/create-index commands
//! - [`KeyFormatter`]: index entry to flat remote key mapping
//! - [`Error`]: the canonical error type
//! - Collaborator traits for the remote connection and index metadata

#![warn(missing_docs)]
#![warn(clippy::all)]

pub mod command;
pub mod error;
pub mod keys;
pub mod traits;
pub mod types;

pub use command::{CommandKind, MutationCommand};
pub use error::{Error, RemoteError, Result};
pub use keys::{KeyFormatter, KEY_DELIMITER};
pub use traits::{IndexMetadataStore, IndexResolver, RemoteConnection};
pub use types::{EntityType, IndexConfig, IndexIdentifier};
