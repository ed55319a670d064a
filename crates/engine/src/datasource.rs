//! The data source registered with the host transaction manager
//!
//! A [`DataSource`] owns everything shared between transactions: the
//! connection pool, the key formatter and the index metadata store. Each
//! host transaction gets its own [`TransactionBridge`] which borrows a
//! connection from the pool only between prepare and commit/rollback.
//!
//! # Example
//!
//! ```ignore
//! let source = DataSource::builder()
//!     .host("cache.internal")
//!     .max_connections(16)
//!     .index_store_path("/var/lib/graph/index-store.json")
//!     .open()?;
//!
//! let mut txn = source.create_transaction(1);
//! txn.add(&IndexIdentifier::node("people"), "name", "alice", 42)?;
//! txn.prepare()?;
//! txn.commit()?;
//! ```

use crate::config::DataSourceConfig;
use crate::index_store::IndexStore;
use kvindex_concurrency::{TransactionBridge, XaDataSource};
use kvindex_core::{
    EntityType, Error, IndexIdentifier, IndexMetadataStore, IndexResolver, KeyFormatter,
    MutationCommand, RemoteConnection, Result,
};
use kvindex_durability::{read_command, CommandLogReader};
use kvindex_storage::{
    ConnectionPool, EndpointConfig, ExhaustionPolicy, MemoryConnectionManager, MemoryStore,
    PoolConfig, RespConnectionManager,
};
use r2d2::ManageConnection;
use std::fmt;
use std::io::Read;
use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tracing::{debug, info, warn};

/// Resource name the host registers this source under
pub const DATA_SOURCE_NAME: &str = "redis";

/// Branch id used in global transaction identifiers
pub const BRANCH_ID: &[u8] = b"redis";

/// Factory for transaction bridges over one remote store
pub struct DataSource<M: ManageConnection> {
    pool: Arc<ConnectionPool<M>>,
    formatter: KeyFormatter,
    index_store: Arc<IndexStore>,
    closed: AtomicBool,
}

impl DataSource<RespConnectionManager> {
    /// Connect to the remote store described by `config`
    ///
    /// Fails with [`Error::InstantiationFailure`] if the configuration is
    /// invalid, the index store cannot be opened, or the endpoint does not
    /// answer.
    pub fn open(config: &DataSourceConfig) -> Result<Self> {
        Self::with_manager(RespConnectionManager::new(config.endpoint.clone()), config)
    }

    /// Builder with default settings
    pub fn builder() -> DataSourceBuilder {
        DataSourceBuilder::new()
    }
}

impl DataSource<MemoryConnectionManager> {
    /// Data source over an in-process store, with in-memory index metadata
    pub fn ephemeral(store: Arc<MemoryStore>) -> Result<Self> {
        Self::with_manager(
            MemoryConnectionManager::new(store),
            &DataSourceConfig::default(),
        )
    }
}

impl<M> DataSource<M>
where
    M: ManageConnection,
    M::Connection: RemoteConnection,
{
    /// Build a data source over any connection manager
    pub fn with_manager(manager: M, config: &DataSourceConfig) -> Result<Self> {
        config
            .validate()
            .map_err(|e| Error::InstantiationFailure(e.to_string()))?;

        let index_store = match &config.index_store.path {
            Some(path) => IndexStore::open(path)
                .map_err(|e| Error::InstantiationFailure(e.to_string()))?,
            None => IndexStore::in_memory(),
        };
        let pool = ConnectionPool::new(manager, &config.pool)?;

        info!(
            host = %config.endpoint.host,
            port = config.endpoint.port,
            database = config.endpoint.database,
            indexes = index_store.len(),
            "data source opened"
        );
        Ok(Self {
            pool: Arc::new(pool),
            formatter: KeyFormatter::new(),
            index_store: Arc::new(index_store),
            closed: AtomicBool::new(false),
        })
    }

    /// New bridge in `Active` state for host transaction `identifier`
    pub fn create_transaction(&self, identifier: u64) -> TransactionBridge<M> {
        if self.is_closed() {
            // Prepare will fail on the shut-down pool
            warn!(txn_id = identifier, "transaction created on a closed data source");
        }
        let index_store: Arc<dyn IndexMetadataStore> = self.index_store.clone();
        TransactionBridge::new(
            identifier,
            Arc::clone(&self.pool),
            self.formatter,
            index_store,
        )
    }

    /// Decode the next command from a host log stream
    pub fn read_command<R: Read>(
        &self,
        input: &mut R,
        buffer: &mut Vec<u8>,
    ) -> Result<Option<MutationCommand>> {
        read_command(input, buffer, self)
    }

    /// Rebuild an in-doubt transaction from its logged commands
    ///
    /// The returned bridge is `Active`; the host drives it through
    /// prepare and commit (or rollback) as it decides.
    pub fn recover_transaction<R: Read>(
        &self,
        identifier: u64,
        input: R,
    ) -> Result<TransactionBridge<M>> {
        let mut txn = self.create_transaction(identifier);
        let mut reader = CommandLogReader::new(input);
        while let Some(cmd) = reader.next_command(self)? {
            txn.append_command(cmd)?;
        }
        info!(
            txn_id = identifier,
            commands = reader.commands_read(),
            "transaction recovered from command log"
        );
        Ok(txn)
    }

    /// Nothing is buffered outside transactions, so this only logs
    pub fn flush_all(&self) -> Result<()> {
        debug!(checked_out = self.pool.checked_out(), "flush requested");
        Ok(())
    }

    /// Shut the pool down. Idempotent.
    pub fn close(&self) {
        if self.closed.swap(true, Ordering::SeqCst) {
            return;
        }
        self.pool.shutdown();
        info!("data source closed");
    }

    /// Whether `close` has run
    pub fn is_closed(&self) -> bool {
        self.closed.load(Ordering::SeqCst)
    }

    /// The shared connection pool
    pub fn pool(&self) -> &Arc<ConnectionPool<M>> {
        &self.pool
    }

    /// The index metadata store
    pub fn index_store(&self) -> &Arc<IndexStore> {
        &self.index_store
    }

    /// The key formatter every bridge uses
    pub fn formatter(&self) -> KeyFormatter {
        self.formatter
    }
}

impl<M: ManageConnection> IndexResolver for DataSource<M> {
    fn resolve(&self, entity_type: EntityType, index_name: &str) -> IndexIdentifier {
        if self.index_store.get(entity_type, index_name).is_none() {
            // Expected when the log also carries the CreateIndex
            debug!(entity_type = %entity_type, index = index_name, "replayed command names an unknown index");
        }
        IndexIdentifier::new(entity_type, index_name)
    }
}

impl<M> XaDataSource for DataSource<M>
where
    M: ManageConnection,
    M::Connection: RemoteConnection,
{
    type Transaction = TransactionBridge<M>;

    fn name(&self) -> &'static str {
        DATA_SOURCE_NAME
    }

    fn branch_id(&self) -> &'static [u8] {
        BRANCH_ID
    }

    fn create_transaction(&self, identifier: u64) -> Self::Transaction {
        DataSource::create_transaction(self, identifier)
    }

    fn read_command(
        &self,
        mut input: &mut dyn Read,
        buffer: &mut Vec<u8>,
    ) -> Result<Option<MutationCommand>> {
        read_command(&mut input, buffer, self)
    }

    fn flush_all(&self) -> Result<()> {
        DataSource::flush_all(self)
    }

    fn close(&self) {
        DataSource::close(self)
    }
}

impl<M: ManageConnection> fmt::Debug for DataSource<M> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("DataSource")
            .field("pool", &self.pool)
            .field("indexes", &self.index_store.len())
            .field("closed", &self.closed.load(Ordering::SeqCst))
            .finish()
    }
}

/// Builder for [`DataSource`]
///
/// Starts from [`DataSourceConfig::default`]; `open` connects over RESP,
/// `open_with_manager` accepts any connection manager.
#[derive(Debug, Clone, Default)]
pub struct DataSourceBuilder {
    config: DataSourceConfig,
}

impl DataSourceBuilder {
    /// Builder with default settings
    pub fn new() -> Self {
        Self::default()
    }

    /// Start from an existing configuration
    pub fn from_config(config: DataSourceConfig) -> Self {
        Self { config }
    }

    /// Replace the whole endpoint configuration
    pub fn endpoint(mut self, endpoint: EndpointConfig) -> Self {
        self.config.endpoint = endpoint;
        self
    }

    /// Remote host name or address
    pub fn host(mut self, host: impl Into<String>) -> Self {
        self.config.endpoint.host = host.into();
        self
    }

    /// Remote port
    pub fn port(mut self, port: u16) -> Self {
        self.config.endpoint.port = port;
        self
    }

    /// Logical database selected on every new connection
    pub fn database(mut self, database: u32) -> Self {
        self.config.endpoint.database = database;
        self
    }

    /// Password sent with AUTH on every new connection
    pub fn password(mut self, password: impl Into<String>) -> Self {
        self.config.endpoint.password = Some(password.into());
        self
    }

    /// Replace the whole pool configuration
    pub fn pool(mut self, pool: PoolConfig) -> Self {
        self.config.pool = pool;
        self
    }

    /// Upper bound on open connections
    pub fn max_connections(mut self, max_size: u32) -> Self {
        self.config.pool.max_size = max_size;
        self
    }

    /// Fail acquisition immediately when the pool is exhausted
    pub fn fail_fast(mut self) -> Self {
        self.config.pool.exhaustion = ExhaustionPolicy::FailFast;
        self
    }

    /// Persist index metadata to this JSON file
    pub fn index_store_path(mut self, path: impl Into<PathBuf>) -> Self {
        self.config.index_store.path = Some(path.into());
        self
    }

    /// The configuration built so far
    pub fn config(&self) -> &DataSourceConfig {
        &self.config
    }

    /// Connect over RESP
    pub fn open(self) -> Result<DataSource<RespConnectionManager>> {
        DataSource::open(&self.config)
    }

    /// Build over a caller-supplied connection manager
    pub fn open_with_manager<M>(self, manager: M) -> Result<DataSource<M>>
    where
        M: ManageConnection,
        M::Connection: RemoteConnection,
    {
        DataSource::with_manager(manager, &self.config)
    }
}
