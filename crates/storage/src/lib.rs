//! Storage layer for kvindex
//!
//! This crate owns everything that touches the remote key-value store:
//! - RespConnection: RESP client over TCP (MULTI/SADD/SREM/EXEC/DISCARD)
//! - MemoryStore: in-process set store with the same batch semantics
//! - ConnectionPool: r2d2-backed gateway handing out exclusive [`Lease`]s

#![warn(missing_docs)]
#![warn(clippy::all)]

pub mod memory;
pub mod pool;
pub mod resp;

pub use memory::{FaultInjector, MemoryConnection, MemoryConnectionManager, MemoryStore};
pub use pool::{ConnectionPool, ExhaustionPolicy, Lease, PoolConfig};
pub use resp::{EndpointConfig, Reply, RespConnection, RespConnectionManager};
