//! Error types for kvindex
//!
//! [`Error`] is the canonical error returned across the transaction
//! pipeline. [`RemoteError`] is what a remote connection reports; the
//! pipeline maps it into [`Error`] depending on the phase it occurred in.

use thiserror::Error;

/// Failure reported by a remote key-value connection
#[derive(Debug, Error)]
pub enum RemoteError {
    /// Socket-level failure
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Reply could not be parsed or was not the expected shape
    #[error("protocol error: {0}")]
    Protocol(String),

    /// Server replied with an error
    #[error("server error: {0}")]
    Server(String),

    /// Batch was aborted by the server (EXEC returned null)
    #[error("batch aborted by server")]
    Aborted,

    /// Operation not valid in the connection's current batch state
    #[error("invalid batch state: {0}")]
    BatchState(String),

    /// Connection refused to open
    #[error("connection refused: {0}")]
    Refused(String),

    /// Failure injected by a test backend
    #[error("injected failure: {0}")]
    Injected(String),
}

/// All kvindex errors
#[derive(Debug, Error)]
pub enum Error {
    /// Pool or configuration could not be built; the data source is unusable
    #[error("instantiation failure: {0}")]
    InstantiationFailure(String),

    /// No connection could be acquired (pool exhausted, shut down, or remote unreachable)
    #[error("resource unavailable: {0}")]
    ResourceUnavailable(String),

    /// EXEC or DISCARD failed; the connection was released before this was returned
    #[error("remote execution failure: {0}")]
    RemoteExecutionFailure(#[source] RemoteError),

    /// Staging a command into the remote batch failed during prepare
    #[error("remote error: {0}")]
    Remote(#[from] RemoteError),

    /// Lifecycle call made outside its valid state
    #[error("invalid transaction state: cannot {operation} while {state}")]
    InvalidState {
        /// Operation attempted
        operation: &'static str,
        /// State the transaction was in
        state: String,
    },

    /// Index metadata store failure
    #[error("index store error: {0}")]
    IndexStore(String),

    /// Command log entry failed validation
    #[error("corruption: {0}")]
    Corruption(String),

    /// Encoding or decoding failure
    #[error("serialization error: {0}")]
    Serialization(String),

    /// Invalid configuration
    #[error("config error: {0}")]
    Config(String),

    /// I/O error
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

/// Result type for kvindex operations
pub type Result<T> = std::result::Result<T, Error>;

impl Error {
    /// Check if the host may retry the failed phase later.
    ///
    /// Only pool exhaustion/unreachability is transient; retry policy itself
    /// belongs to the host's recovery machinery.
    pub fn is_retryable(&self) -> bool {
        matches!(self, Error::ResourceUnavailable(_))
    }

    /// Check if this is a lifecycle misuse.
    pub fn is_invalid_state(&self) -> bool {
        matches!(self, Error::InvalidState { .. })
    }

    /// Check if this is a serious/unrecoverable error.
    pub fn is_serious(&self) -> bool {
        matches!(
            self,
            Error::InstantiationFailure(_) | Error::Corruption(_)
        )
    }
}
