//! Connection pool gateway
//!
//! Wraps an r2d2 pool and hands out [`Lease`]s: exclusive ownership of one
//! remote connection until the lease is dropped or passed back through
//! [`ConnectionPool::release`]. Release happens in `Drop`, so every exit
//! path (commit, rollback, error propagation, panic unwinding) returns the
//! connection exactly once.
//!
//! A connection returned while a batch is still open is reported as broken
//! by its manager and evicted, so the next lease never inherits staged
//! operations.

use kvindex_core::{Error, Result};
use parking_lot::RwLock;
use r2d2::{ManageConnection, Pool, PooledConnection};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::ops::{Deref, DerefMut};
use std::sync::atomic::{AtomicU64, AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info, warn};

/// What `acquire` does when every connection is checked out
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ExhaustionPolicy {
    /// Wait up to `connection_timeout_ms` for a connection
    #[default]
    Block,
    /// Fail immediately once `max_size` leases are out
    FailFast,
}

/// Pool sizing and exhaustion policy
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct PoolConfig {
    /// Maximum number of open connections
    pub max_size: u32,
    /// Connections kept open while idle.
    ///
    /// Building the pool waits for this many connections, so a non-zero
    /// value makes an unreachable endpoint fail at construction.
    pub min_idle: u32,
    /// How long a blocking acquire (and pool construction) may wait
    pub connection_timeout_ms: u64,
    /// Behaviour on exhaustion
    pub exhaustion: ExhaustionPolicy,
}

impl Default for PoolConfig {
    fn default() -> Self {
        Self {
            max_size: 8,
            min_idle: 1,
            connection_timeout_ms: 5000,
            exhaustion: ExhaustionPolicy::Block,
        }
    }
}

impl PoolConfig {
    /// Reject settings r2d2 would panic on
    pub fn validate(&self) -> Result<()> {
        if self.max_size == 0 {
            return Err(Error::Config("pool.max_size must be at least 1".to_string()));
        }
        if self.min_idle > self.max_size {
            return Err(Error::Config(format!(
                "pool.min_idle ({}) exceeds pool.max_size ({})",
                self.min_idle, self.max_size
            )));
        }
        if self.connection_timeout_ms == 0 {
            return Err(Error::Config(
                "pool.connection_timeout_ms must be positive".to_string(),
            ));
        }
        Ok(())
    }
}

/// Routes r2d2's background connection errors into tracing
#[derive(Debug)]
struct TracingErrorHandler;

impl<E: fmt::Display> r2d2::HandleError<E> for TracingErrorHandler {
    fn handle_error(&self, error: E) {
        warn!(error = %error, "remote connection error");
    }
}

/// Exclusive ownership of one pooled connection
///
/// Dereferences to the underlying connection. Dropping the lease returns
/// the connection to the pool.
pub struct Lease<M: ManageConnection> {
    conn: PooledConnection<M>,
    checked_out: Arc<AtomicUsize>,
}

impl<M: ManageConnection> Deref for Lease<M> {
    type Target = M::Connection;

    fn deref(&self) -> &M::Connection {
        &self.conn
    }
}

impl<M: ManageConnection> DerefMut for Lease<M> {
    fn deref_mut(&mut self) -> &mut M::Connection {
        &mut self.conn
    }
}

impl<M: ManageConnection> Drop for Lease<M> {
    fn drop(&mut self) {
        let left = self.checked_out.fetch_sub(1, Ordering::SeqCst) - 1;
        debug!(checked_out = left, "connection released");
    }
}

impl<M: ManageConnection> fmt::Debug for Lease<M> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Lease").finish_non_exhaustive()
    }
}

/// Shared gateway to the remote store's connections
///
/// Safe to share across threads; `acquire`/`release` may be called
/// concurrently.
pub struct ConnectionPool<M: ManageConnection> {
    pool: RwLock<Option<Pool<M>>>,
    max_size: usize,
    exhaustion: ExhaustionPolicy,
    checked_out: Arc<AtomicUsize>,
    total_acquired: AtomicU64,
}

impl<M: ManageConnection> ConnectionPool<M> {
    /// Build the pool
    ///
    /// Fails with [`Error::InstantiationFailure`] if the configuration is
    /// invalid or `min_idle` connections cannot be opened in time.
    pub fn new(manager: M, config: &PoolConfig) -> Result<Self> {
        config
            .validate()
            .map_err(|e| Error::InstantiationFailure(e.to_string()))?;
        let pool = Pool::builder()
            .max_size(config.max_size)
            .min_idle(Some(config.min_idle))
            .connection_timeout(Duration::from_millis(config.connection_timeout_ms))
            .error_handler(Box::new(TracingErrorHandler))
            .build(manager)
            .map_err(|e| Error::InstantiationFailure(e.to_string()))?;
        info!(
            max_size = config.max_size,
            min_idle = config.min_idle,
            exhaustion = ?config.exhaustion,
            "connection pool ready"
        );
        Ok(Self {
            pool: RwLock::new(Some(pool)),
            max_size: config.max_size as usize,
            exhaustion: config.exhaustion,
            checked_out: Arc::new(AtomicUsize::new(0)),
            total_acquired: AtomicU64::new(0),
        })
    }

    /// Take exclusive ownership of a connection
    ///
    /// Blocks or fails fast per the exhaustion policy. Under `FailFast`
    /// the pool counts as exhausted only once `max_size` leases are out;
    /// below that a new connection may still be opened, bounded by
    /// `connection_timeout_ms`. Fails with [`Error::ResourceUnavailable`]
    /// on exhaustion, unreachability or after [`shutdown`](Self::shutdown).
    pub fn acquire(&self) -> Result<Lease<M>> {
        let pool = self
            .pool
            .read()
            .clone()
            .ok_or_else(|| Error::ResourceUnavailable("connection pool is shut down".to_string()))?;
        if self.exhaustion == ExhaustionPolicy::FailFast && self.checked_out() >= self.max_size {
            return Err(Error::ResourceUnavailable(format!(
                "connection pool exhausted ({} of {} checked out)",
                self.checked_out(),
                self.max_size
            )));
        }
        let conn = pool
            .get()
            .map_err(|e| Error::ResourceUnavailable(e.to_string()))?;
        let now = self.checked_out.fetch_add(1, Ordering::SeqCst) + 1;
        self.total_acquired.fetch_add(1, Ordering::Relaxed);
        debug!(checked_out = now, "connection acquired");
        Ok(Lease {
            conn,
            checked_out: Arc::clone(&self.checked_out),
        })
    }

    /// Give a connection back
    pub fn release(&self, lease: Lease<M>) {
        drop(lease);
    }

    /// Drain and close pooled connections. Idempotent.
    ///
    /// Leases still held stay usable; their connections close when they
    /// are released.
    pub fn shutdown(&self) {
        if let Some(pool) = self.pool.write().take() {
            let state = pool.state();
            info!(
                connections = state.connections,
                idle = state.idle_connections,
                checked_out = self.checked_out(),
                "connection pool shut down"
            );
        }
    }

    /// Whether `shutdown` has run
    pub fn is_shut_down(&self) -> bool {
        self.pool.read().is_none()
    }

    /// Leases currently held
    pub fn checked_out(&self) -> usize {
        self.checked_out.load(Ordering::SeqCst)
    }

    /// Leases handed out since construction
    pub fn total_acquired(&self) -> u64 {
        self.total_acquired.load(Ordering::Relaxed)
    }

    /// Open and idle connection counts, if the pool is still up
    pub fn state(&self) -> Option<r2d2::State> {
        self.pool.read().as_ref().map(Pool::state)
    }
}

impl<M: ManageConnection> fmt::Debug for ConnectionPool<M> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ConnectionPool")
            .field("max_size", &self.max_size)
            .field("exhaustion", &self.exhaustion)
            .field("checked_out", &self.checked_out())
            .field("shut_down", &self.is_shut_down())
            .finish()
    }
}
