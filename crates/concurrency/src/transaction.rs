//! Transaction bridge onto the remote store's atomic batch
//!
//! The remote store has no prepare phase of its own, so the bridge uses
//! the batch as the staging area:
//!
//! ```text
//! append_command()   buffer in memory, no remote effect
//! prepare()          acquire lease -> MULTI -> SADD/SREM per command
//!                    (CreateIndex goes to the metadata store instead)
//! commit()           EXEC -> release lease
//! rollback()         DISCARD -> release lease   (no-op remotely if Active)
//! ```
//!
//! A lease is held from the start of `prepare()` until the end of
//! `commit()`/`rollback()` and is released exactly once on every path,
//! including a prepare that fails partway through staging.
//!
//! If the process dies after the host logged its commit but before
//! `commit()` ran, host recovery replays the command log into a fresh
//! bridge. Set add/remove is idempotent, so re-running the same sequence
//! converges on the same remote state.

use kvindex_core::{
    Error, IndexIdentifier, IndexConfig, IndexMetadataStore, KeyFormatter, MutationCommand,
    RemoteConnection, Result,
};
use kvindex_storage::{ConnectionPool, Lease};
use r2d2::ManageConnection;
use std::collections::BTreeMap;
use std::fmt;
use std::sync::Arc;
use tracing::{debug, error, trace, warn};

use crate::resource::XaTransaction;

/// Lifecycle state of a [`TransactionBridge`]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TransactionStatus {
    /// Buffering commands
    Active,
    /// Batch staged on a held connection, awaiting commit or rollback
    Prepared,
    /// Batch executed (or execution attempted) and connection released
    Committed,
    /// Batch discarded (or never staged)
    RolledBack,
}

impl TransactionStatus {
    /// Whether no further lifecycle call is accepted
    pub fn is_terminal(&self) -> bool {
        matches!(self, TransactionStatus::Committed | TransactionStatus::RolledBack)
    }
}

impl fmt::Display for TransactionStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            TransactionStatus::Active => "active",
            TransactionStatus::Prepared => "prepared",
            TransactionStatus::Committed => "committed",
            TransactionStatus::RolledBack => "rolled back",
        };
        f.write_str(name)
    }
}

/// Per-host-transaction bridge
///
/// Owned by exactly one thread at a time; concurrent transactions each
/// have their own bridge and share only the connection pool.
pub struct TransactionBridge<M: ManageConnection> {
    identifier: u64,
    status: TransactionStatus,
    /// Buffered commands in append order
    commands: Vec<MutationCommand>,
    /// Held from prepare until commit/rollback
    lease: Option<Lease<M>>,
    pool: Arc<ConnectionPool<M>>,
    formatter: KeyFormatter,
    index_store: Arc<dyn IndexMetadataStore>,
}

impl<M> TransactionBridge<M>
where
    M: ManageConnection,
    M::Connection: RemoteConnection,
{
    /// New bridge in `Active` state
    pub fn new(
        identifier: u64,
        pool: Arc<ConnectionPool<M>>,
        formatter: KeyFormatter,
        index_store: Arc<dyn IndexMetadataStore>,
    ) -> Self {
        Self {
            identifier,
            status: TransactionStatus::Active,
            commands: Vec::new(),
            lease: None,
            pool,
            formatter,
            index_store,
        }
    }

    /// Host-assigned identifier
    pub fn identifier(&self) -> u64 {
        self.identifier
    }

    /// Current lifecycle state
    pub fn status(&self) -> TransactionStatus {
        self.status
    }

    /// Whether a connection is currently held
    pub fn holds_connection(&self) -> bool {
        self.lease.is_some()
    }

    /// Buffered commands in append order
    pub fn commands(&self) -> &[MutationCommand] {
        &self.commands
    }

    /// Buffered commands grouped per index, each group in append order
    pub fn commands_by_index(&self) -> BTreeMap<&IndexIdentifier, Vec<&MutationCommand>> {
        let mut grouped: BTreeMap<&IndexIdentifier, Vec<&MutationCommand>> = BTreeMap::new();
        for cmd in &self.commands {
            grouped.entry(cmd.identifier()).or_default().push(cmd);
        }
        grouped
    }

    /// Remote operations the buffered commands will stage on prepare
    pub fn pending_remote_ops(&self) -> usize {
        self.commands.iter().map(MutationCommand::remote_op_count).sum()
    }

    /// Buffer a command. Only valid while `Active`.
    pub fn append_command(&mut self, cmd: MutationCommand) -> Result<()> {
        self.ensure(TransactionStatus::Active, "append a command")?;
        trace!(txn_id = self.identifier, kind = ?cmd.kind(), index = %cmd.identifier(), "command buffered");
        self.commands.push(cmd);
        Ok(())
    }

    /// Buffer "add `entity_id` under `key = value`"
    pub fn add(
        &mut self,
        identifier: &IndexIdentifier,
        key: &str,
        value: &str,
        entity_id: u64,
    ) -> Result<()> {
        self.append_command(MutationCommand::add(identifier.clone(), key, value, entity_id))
    }

    /// Buffer "remove `entity_id` from `key = value`"
    pub fn remove(
        &mut self,
        identifier: &IndexIdentifier,
        key: &str,
        value: &str,
        entity_id: u64,
    ) -> Result<()> {
        self.append_command(MutationCommand::remove(identifier.clone(), key, value, entity_id))
    }

    /// Buffer index creation
    pub fn create_index(&mut self, identifier: &IndexIdentifier, config: IndexConfig) -> Result<()> {
        self.append_command(MutationCommand::create_index(identifier.clone(), config))
    }

    /// Stage every buffered command into a remote batch
    ///
    /// On success the bridge is `Prepared` and holds its connection. On
    /// failure it stays `Active` with its buffer intact and holds nothing:
    /// - acquisition failure surfaces as [`Error::ResourceUnavailable`]
    /// - a staging failure discards the batch and releases the connection
    ///   before the error is returned
    pub fn prepare(&mut self) -> Result<()> {
        self.ensure(TransactionStatus::Active, "prepare")?;

        let mut lease = self.pool.acquire()?;
        let staged = match self.stage(&mut lease) {
            Ok(staged) => staged,
            Err(e) => {
                if lease.in_batch() {
                    if let Err(discard_err) = lease.discard() {
                        warn!(
                            txn_id = self.identifier,
                            error = %discard_err,
                            "discard after failed staging also failed"
                        );
                    }
                }
                self.pool.release(lease);
                warn!(txn_id = self.identifier, error = %e, "prepare failed");
                return Err(e);
            }
        };

        debug!(
            txn_id = self.identifier,
            commands = self.commands.len(),
            remote_ops = staged,
            "transaction prepared"
        );
        // The batch now carries the pending effect
        self.commands = Vec::new();
        self.lease = Some(lease);
        self.status = TransactionStatus::Prepared;
        Ok(())
    }

    /// Execute the staged batch and release the connection
    ///
    /// The connection is released whether or not EXEC succeeds, and the
    /// bridge ends `Committed` either way: the host's commit decision is
    /// already durable and recovery replay re-derives a failed apply.
    pub fn commit(&mut self) -> Result<()> {
        self.ensure(TransactionStatus::Prepared, "commit")?;
        let mut lease = self.take_lease("commit")?;

        let result = lease.exec();
        self.pool.release(lease);
        self.status = TransactionStatus::Committed;

        match result {
            Ok(()) => {
                debug!(txn_id = self.identifier, "transaction committed");
                Ok(())
            }
            Err(e) => {
                error!(
                    txn_id = self.identifier,
                    error = %e,
                    "remote batch execution failed after host commit; recovery must replay"
                );
                Err(Error::RemoteExecutionFailure(e))
            }
        }
    }

    /// Abandon the transaction
    ///
    /// From `Prepared` the staged batch is discarded and the connection
    /// released; from `Active` only the buffer is dropped. Always ends
    /// `RolledBack`.
    pub fn rollback(&mut self) -> Result<()> {
        match self.status {
            TransactionStatus::Active => {
                self.commands = Vec::new();
                self.status = TransactionStatus::RolledBack;
                debug!(txn_id = self.identifier, "transaction rolled back before prepare");
                Ok(())
            }
            TransactionStatus::Prepared => {
                let mut lease = self.take_lease("roll back")?;
                let result = lease.discard();
                self.pool.release(lease);
                self.status = TransactionStatus::RolledBack;

                result.map_err(|e| {
                    warn!(txn_id = self.identifier, error = %e, "discard failed during rollback");
                    Error::RemoteExecutionFailure(e)
                })?;
                debug!(txn_id = self.identifier, "prepared transaction rolled back");
                Ok(())
            }
            TransactionStatus::Committed | TransactionStatus::RolledBack => Err(Error::InvalidState {
                operation: "roll back",
                state: self.status.to_string(),
            }),
        }
    }

    fn ensure(&self, expected: TransactionStatus, operation: &'static str) -> Result<()> {
        if self.status != expected {
            return Err(Error::InvalidState {
                operation,
                state: self.status.to_string(),
            });
        }
        Ok(())
    }

    fn take_lease(&mut self, operation: &'static str) -> Result<Lease<M>> {
        self.lease.take().ok_or_else(|| Error::InvalidState {
            operation,
            state: format!("{} without a connection", self.status),
        })
    }

    /// Open the batch and stage every command, returning the remote op count
    fn stage(&self, conn: &mut M::Connection) -> Result<usize> {
        conn.multi()?;
        let mut staged = 0;
        for cmd in &self.commands {
            match cmd {
                MutationCommand::CreateIndex { identifier, config } => {
                    let created = self.index_store.set_if_necessary(
                        identifier.entity_type,
                        &identifier.index_name,
                        config,
                    )?;
                    debug!(txn_id = self.identifier, index = %identifier, created, "index ensured");
                }
                MutationCommand::AddEntry {
                    identifier,
                    key,
                    value,
                    entity_id,
                } => {
                    let remote_key = self.formatter.format(&identifier.index_name, key, value);
                    trace!(txn_id = self.identifier, remote_key = %remote_key, entity_id, "stage add");
                    conn.sadd(&remote_key, &entity_id.to_string())?;
                    // Reverse index for future deletion of the whole index
                    conn.sadd(&identifier.index_name, &remote_key)?;
                }
                MutationCommand::RemoveEntry {
                    identifier,
                    key,
                    value,
                    entity_id,
                } => {
                    let remote_key = self.formatter.format(&identifier.index_name, key, value);
                    trace!(txn_id = self.identifier, remote_key = %remote_key, entity_id, "stage remove");
                    conn.srem(&remote_key, &entity_id.to_string())?;
                    conn.srem(&identifier.index_name, &remote_key)?;
                }
            }
            staged += cmd.remote_op_count();
        }
        Ok(staged)
    }
}

impl<M> XaTransaction for TransactionBridge<M>
where
    M: ManageConnection,
    M::Connection: RemoteConnection,
{
    fn identifier(&self) -> u64 {
        self.identifier
    }

    fn is_read_only(&self) -> bool {
        self.commands.is_empty() && self.lease.is_none()
    }

    fn inject_command(&mut self, cmd: MutationCommand) -> Result<()> {
        self.append_command(cmd)
    }

    fn prepare(&mut self) -> Result<()> {
        TransactionBridge::prepare(self)
    }

    fn commit(&mut self) -> Result<()> {
        TransactionBridge::commit(self)
    }

    fn rollback(&mut self) -> Result<()> {
        TransactionBridge::rollback(self)
    }
}

impl<M: ManageConnection> Drop for TransactionBridge<M> {
    fn drop(&mut self) {
        if self.lease.is_some() {
            // The lease returns the connection; the pool evicts it since
            // its batch is still open.
            warn!(
                txn_id = self.identifier,
                "prepared transaction dropped without commit or rollback"
            );
        }
    }
}

impl<M: ManageConnection> fmt::Debug for TransactionBridge<M> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TransactionBridge")
            .field("identifier", &self.identifier)
            .field("status", &self.status)
            .field("commands", &self.commands.len())
            .field("holds_connection", &self.lease.is_some())
            .finish()
    }
}
