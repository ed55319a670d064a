//! In-process remote store
//!
//! `MemoryStore` keeps string sets keyed by string, with the batch
//! semantics of the real remote store:
//! - operations staged after `multi` have no effect until `exec`
//! - `exec` applies the whole batch under one write lock
//! - removing the last member of a set deletes the key
//!
//! Used for ephemeral data sources and by the test suites, which drive the
//! failure paths through [`FaultInjector`].

use kvindex_core::{RemoteConnection, RemoteError};
use parking_lot::RwLock;
use r2d2::ManageConnection;
use rustc_hash::{FxHashMap, FxHashSet};
use std::collections::{BTreeMap, BTreeSet};
use std::sync::atomic::{AtomicBool, AtomicU64, AtomicUsize, Ordering};
use std::sync::Arc;

const STAGING_FAULT_DISARMED: usize = usize::MAX;

/// Switches that make a [`MemoryStore`] fail on purpose
#[derive(Debug)]
pub struct FaultInjector {
    refuse_connections: AtomicBool,
    /// Successful stages left before the next one fails
    staging_budget: AtomicUsize,
    fail_next_exec: AtomicBool,
    fail_next_discard: AtomicBool,
}

impl FaultInjector {
    fn new() -> Self {
        Self {
            refuse_connections: AtomicBool::new(false),
            staging_budget: AtomicUsize::new(STAGING_FAULT_DISARMED),
            fail_next_exec: AtomicBool::new(false),
            fail_next_discard: AtomicBool::new(false),
        }
    }

    /// Refuse new connections and fail validity checks
    pub fn refuse_connections(&self, refuse: bool) {
        self.refuse_connections.store(refuse, Ordering::SeqCst);
    }

    /// Let `ops` more operations stage successfully, then fail the next one.
    ///
    /// One-shot: disarms after firing.
    pub fn fail_staging_after(&self, ops: usize) {
        self.staging_budget.store(ops, Ordering::SeqCst);
    }

    /// Fail the next `exec` on any connection. The batch is dropped unapplied.
    pub fn fail_next_exec(&self) {
        self.fail_next_exec.store(true, Ordering::SeqCst);
    }

    /// Fail the next `discard` on any connection. The batch is still dropped.
    pub fn fail_next_discard(&self) {
        self.fail_next_discard.store(true, Ordering::SeqCst);
    }

    /// Disarm every fault
    pub fn clear(&self) {
        self.refuse_connections(false);
        self.staging_budget
            .store(STAGING_FAULT_DISARMED, Ordering::SeqCst);
        self.fail_next_exec.store(false, Ordering::SeqCst);
        self.fail_next_discard.store(false, Ordering::SeqCst);
    }

    fn refusing(&self) -> bool {
        self.refuse_connections.load(Ordering::SeqCst)
    }

    fn check_stage(&self) -> Result<(), RemoteError> {
        let fired = self
            .staging_budget
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |left| match left {
                STAGING_FAULT_DISARMED => None,
                0 => Some(STAGING_FAULT_DISARMED),
                n => Some(n - 1),
            })
            .map_or(false, |previous| previous == 0);
        if fired {
            return Err(RemoteError::Injected("staging failure".to_string()));
        }
        Ok(())
    }

    fn take_exec_fault(&self) -> bool {
        self.fail_next_exec.swap(false, Ordering::SeqCst)
    }

    fn take_discard_fault(&self) -> bool {
        self.fail_next_discard.swap(false, Ordering::SeqCst)
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
enum StagedOp {
    Add { key: String, member: String },
    Remove { key: String, member: String },
}

/// Shared set store
#[derive(Debug)]
pub struct MemoryStore {
    sets: RwLock<FxHashMap<String, FxHashSet<String>>>,
    faults: FaultInjector,
    batches_applied: AtomicU64,
}

impl MemoryStore {
    /// Create an empty store
    pub fn new() -> Self {
        Self {
            sets: RwLock::new(FxHashMap::default()),
            faults: FaultInjector::new(),
            batches_applied: AtomicU64::new(0),
        }
    }

    /// Fault switches for this store
    pub fn faults(&self) -> &FaultInjector {
        &self.faults
    }

    /// Members of the set at `key` (empty if absent)
    pub fn smembers(&self, key: &str) -> BTreeSet<String> {
        self.sets
            .read()
            .get(key)
            .map(|set| set.iter().cloned().collect())
            .unwrap_or_default()
    }

    /// Whether `member` is in the set at `key`
    pub fn sismember(&self, key: &str, member: &str) -> bool {
        self.sets
            .read()
            .get(key)
            .map_or(false, |set| set.contains(member))
    }

    /// Whether a non-empty set exists at `key`
    pub fn exists(&self, key: &str) -> bool {
        self.sets.read().contains_key(key)
    }

    /// Number of keys holding a non-empty set
    pub fn key_count(&self) -> usize {
        self.sets.read().len()
    }

    /// Ordered copy of the whole store
    pub fn snapshot(&self) -> BTreeMap<String, BTreeSet<String>> {
        self.sets
            .read()
            .iter()
            .map(|(k, v)| (k.clone(), v.iter().cloned().collect()))
            .collect()
    }

    /// Number of batches applied by `exec`
    pub fn batches_applied(&self) -> u64 {
        self.batches_applied.load(Ordering::SeqCst)
    }

    fn apply(&self, ops: Vec<StagedOp>) {
        let mut sets = self.sets.write();
        for op in ops {
            match op {
                StagedOp::Add { key, member } => {
                    sets.entry(key).or_default().insert(member);
                }
                StagedOp::Remove { key, member } => {
                    let emptied = match sets.get_mut(&key) {
                        Some(set) => {
                            set.remove(&member);
                            set.is_empty()
                        }
                        None => false,
                    };
                    if emptied {
                        sets.remove(&key);
                    }
                }
            }
        }
        self.batches_applied.fetch_add(1, Ordering::SeqCst);
    }
}

impl Default for MemoryStore {
    fn default() -> Self {
        Self::new()
    }
}

/// Connection to a [`MemoryStore`]
///
/// Staged operations are queued on the connection itself, so nothing is
/// visible to other connections before `exec`.
#[derive(Debug)]
pub struct MemoryConnection {
    store: Arc<MemoryStore>,
    batch: Option<Vec<StagedOp>>,
}

impl MemoryConnection {
    /// Open a connection to `store`
    pub fn open(store: Arc<MemoryStore>) -> Result<Self, RemoteError> {
        if store.faults.refusing() {
            return Err(RemoteError::Refused("memory store refusing connections".to_string()));
        }
        Ok(Self { store, batch: None })
    }

    /// Number of operations staged in the open batch
    pub fn staged_len(&self) -> usize {
        self.batch.as_ref().map_or(0, Vec::len)
    }

    fn stage(&mut self, op: StagedOp) -> Result<(), RemoteError> {
        let batch = self
            .batch
            .as_mut()
            .ok_or_else(|| RemoteError::BatchState("command staged without MULTI".to_string()))?;
        self.store.faults.check_stage()?;
        batch.push(op);
        Ok(())
    }
}

impl RemoteConnection for MemoryConnection {
    fn multi(&mut self) -> Result<(), RemoteError> {
        if self.batch.is_some() {
            return Err(RemoteError::BatchState("MULTI calls can not be nested".to_string()));
        }
        self.batch = Some(Vec::new());
        Ok(())
    }

    fn sadd(&mut self, key: &str, member: &str) -> Result<(), RemoteError> {
        self.stage(StagedOp::Add {
            key: key.to_string(),
            member: member.to_string(),
        })
    }

    fn srem(&mut self, key: &str, member: &str) -> Result<(), RemoteError> {
        self.stage(StagedOp::Remove {
            key: key.to_string(),
            member: member.to_string(),
        })
    }

    fn exec(&mut self) -> Result<(), RemoteError> {
        let ops = self
            .batch
            .take()
            .ok_or_else(|| RemoteError::BatchState("EXEC without MULTI".to_string()))?;
        if self.store.faults.take_exec_fault() {
            return Err(RemoteError::Injected("exec failure".to_string()));
        }
        self.store.apply(ops);
        Ok(())
    }

    fn discard(&mut self) -> Result<(), RemoteError> {
        if self.batch.take().is_none() {
            return Err(RemoteError::BatchState("DISCARD without MULTI".to_string()));
        }
        if self.store.faults.take_discard_fault() {
            return Err(RemoteError::Injected("discard failure".to_string()));
        }
        Ok(())
    }

    fn in_batch(&self) -> bool {
        self.batch.is_some()
    }
}

/// r2d2 manager handing out [`MemoryConnection`]s to one store
#[derive(Debug, Clone)]
pub struct MemoryConnectionManager {
    store: Arc<MemoryStore>,
}

impl MemoryConnectionManager {
    /// Manager for `store`
    pub fn new(store: Arc<MemoryStore>) -> Self {
        Self { store }
    }

    /// The store connections point at
    pub fn store(&self) -> &Arc<MemoryStore> {
        &self.store
    }
}

impl ManageConnection for MemoryConnectionManager {
    type Connection = MemoryConnection;
    type Error = RemoteError;

    fn connect(&self) -> Result<MemoryConnection, RemoteError> {
        MemoryConnection::open(Arc::clone(&self.store))
    }

    fn is_valid(&self, _conn: &mut MemoryConnection) -> Result<(), RemoteError> {
        if self.store.faults.refusing() {
            return Err(RemoteError::Refused("memory store refusing connections".to_string()));
        }
        Ok(())
    }

    fn has_broken(&self, conn: &mut MemoryConnection) -> bool {
        conn.in_batch() || conn.is_broken()
    }
}
