//! Resource-manager contract
//!
//! The host transaction manager coordinates several resources. It holds
//! each transaction as a `Box<dyn XaTransaction>` and each data source
//! through [`XaDataSource`]; it never needs to know it is talking to a
//! remote key-value store.

use kvindex_core::{MutationCommand, Result};
use std::io::Read;

/// One transaction branch as seen by the host
pub trait XaTransaction: Send {
    /// Host-assigned identifier
    fn identifier(&self) -> u64;

    /// Whether the branch has nothing to apply
    fn is_read_only(&self) -> bool;

    /// Re-buffer a command replayed from the host log during recovery
    fn inject_command(&mut self, cmd: MutationCommand) -> Result<()>;

    /// Phase one: stage the branch's effect
    fn prepare(&mut self) -> Result<()>;

    /// Phase two: make the staged effect visible
    fn commit(&mut self) -> Result<()>;

    /// Abandon the branch
    fn rollback(&mut self) -> Result<()>;
}

/// A resource registered with the host transaction manager
pub trait XaDataSource {
    /// Transaction type this source creates
    type Transaction: XaTransaction;

    /// Resource name the host registers this source under
    fn name(&self) -> &'static str;

    /// Branch id used in global transaction identifiers
    fn branch_id(&self) -> &'static [u8];

    /// New transaction branch for host transaction `identifier`
    fn create_transaction(&self, identifier: u64) -> Self::Transaction;

    /// Decode the next logged command, `None` at end of log
    fn read_command(
        &self,
        input: &mut dyn Read,
        buffer: &mut Vec<u8>,
    ) -> Result<Option<MutationCommand>>;

    /// Push buffered state out before a log rotation or shutdown
    fn flush_all(&self) -> Result<()>;

    /// Release every resource; idempotent
    fn close(&self);
}
