//! Shared helpers for the integration tests

#![allow(dead_code)]

pub use kvindex::*;
pub use std::sync::Arc;

/// Route tracing output through the test harness. Safe to call repeatedly.
pub fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_test_writer()
        .with_max_level(tracing::Level::DEBUG)
        .try_init();
}

/// A data source over a fresh in-memory store
pub struct TestSource {
    pub store: Arc<MemoryStore>,
    pub source: DataSource<MemoryConnectionManager>,
}

impl TestSource {
    /// Default pool settings
    pub fn new() -> Self {
        Self::with_builder(DataSource::builder())
    }

    /// Pool of `max_size` connections that fails fast when exhausted
    pub fn fail_fast(max_size: u32) -> Self {
        Self::with_builder(DataSource::builder().max_connections(max_size).fail_fast())
    }

    /// Any builder settings
    pub fn with_builder(builder: DataSourceBuilder) -> Self {
        init_tracing();
        let store = Arc::new(MemoryStore::new());
        let source = builder
            .open_with_manager(MemoryConnectionManager::new(Arc::clone(&store)))
            .expect("in-memory data source should open");
        Self { store, source }
    }

    /// Leases currently held
    pub fn checked_out(&self) -> usize {
        self.source.pool().checked_out()
    }

    /// Run `cmds` through a whole transaction: prepare then commit
    pub fn commit_all(&self, identifier: u64, cmds: Vec<MutationCommand>) -> Result<()> {
        let mut txn = self.source.create_transaction(identifier);
        for cmd in cmds {
            txn.append_command(cmd)?;
        }
        txn.prepare()?;
        txn.commit()
    }
}

/// The `people` node index
pub fn people() -> IndexIdentifier {
    IndexIdentifier::node("people")
}

/// Index config marking an exact-match index
pub fn exact_config() -> IndexConfig {
    let mut config = IndexConfig::new();
    config.insert("type".to_string(), "exact".to_string());
    config
}
