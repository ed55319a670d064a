//! Transaction Integration Tests
//!
//! Drives whole transaction lifecycles against an in-memory remote store:
//! remote effects, connection accounting, isolation and log recovery.

#[path = "../common/mod.rs"]
mod common;

mod accounting;
mod concurrency;
mod lifecycle;
mod recovery;
