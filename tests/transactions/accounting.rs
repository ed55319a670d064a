//! Connection Accounting Tests
//!
//! Every successful acquire is matched by exactly one release, on every
//! exit path including injected failures.

use crate::common::*;

fn two_entries(txn: &mut TransactionBridge<MemoryConnectionManager>) {
    txn.add(&people(), "name", "alice", 42).unwrap();
    txn.add(&people(), "name", "bob", 7).unwrap();
}

#[test]
fn commit_returns_connection() {
    let t = TestSource::new();
    let mut txn = t.source.create_transaction(1);
    two_entries(&mut txn);

    txn.prepare().unwrap();
    assert!(txn.holds_connection());
    assert_eq!(t.checked_out(), 1);

    txn.commit().unwrap();
    assert!(!txn.holds_connection());
    assert_eq!(t.checked_out(), 0);
}

#[test]
fn rollback_returns_connection() {
    let t = TestSource::new();
    let mut txn = t.source.create_transaction(1);
    two_entries(&mut txn);

    txn.prepare().unwrap();
    txn.rollback().unwrap();
    assert_eq!(t.checked_out(), 0);
}

#[test]
fn staging_failure_releases_and_keeps_buffer() {
    let t = TestSource::new();
    let mut txn = t.source.create_transaction(1);
    two_entries(&mut txn);

    // First SADD stages, the second fails
    t.store.faults().fail_staging_after(1);
    let err = txn.prepare().unwrap_err();
    assert!(matches!(err, Error::Remote(RemoteError::Injected(_))));
    assert_eq!(t.checked_out(), 0);
    assert_eq!(txn.status(), TransactionStatus::Active);
    assert_eq!(txn.commands().len(), 2);
    assert_eq!(t.store.key_count(), 0);

    // The fault is one-shot; the same transaction can prepare again
    txn.prepare().unwrap();
    txn.commit().unwrap();
    assert_eq!(t.checked_out(), 0);
    assert!(t.store.sismember("people:name:bob", "7"));
}

#[test]
fn exec_failure_releases_and_surfaces() {
    let t = TestSource::new();
    let mut txn = t.source.create_transaction(1);
    two_entries(&mut txn);
    txn.prepare().unwrap();

    t.store.faults().fail_next_exec();
    let err = txn.commit().unwrap_err();
    assert!(matches!(err, Error::RemoteExecutionFailure(_)));
    assert_eq!(txn.status(), TransactionStatus::Committed);
    assert_eq!(t.checked_out(), 0);
    assert_eq!(t.store.key_count(), 0);
}

#[test]
fn discard_failure_releases_and_surfaces() {
    let t = TestSource::new();
    let mut txn = t.source.create_transaction(1);
    two_entries(&mut txn);
    txn.prepare().unwrap();

    t.store.faults().fail_next_discard();
    let err = txn.rollback().unwrap_err();
    assert!(matches!(err, Error::RemoteExecutionFailure(_)));
    assert_eq!(txn.status(), TransactionStatus::RolledBack);
    assert_eq!(t.checked_out(), 0);
    assert_eq!(t.store.key_count(), 0);
}

#[test]
fn unreachable_store_is_resource_unavailable() {
    let t = TestSource::with_builder(
        DataSource::builder().pool(PoolConfig {
            connection_timeout_ms: 200,
            ..PoolConfig::default()
        }),
    );
    let mut txn = t.source.create_transaction(1);
    two_entries(&mut txn);

    t.store.faults().refuse_connections(true);
    let err = txn.prepare().unwrap_err();
    assert!(err.is_retryable());
    assert_eq!(t.checked_out(), 0);
    assert_eq!(txn.status(), TransactionStatus::Active);

    t.store.faults().clear();
    txn.prepare().unwrap();
    txn.commit().unwrap();
    assert_eq!(t.checked_out(), 0);
}

#[test]
fn exhausted_pool_fails_fast() {
    let t = TestSource::fail_fast(1);
    let mut first = t.source.create_transaction(1);
    let mut second = t.source.create_transaction(2);
    first.add(&people(), "name", "alice", 42).unwrap();
    second.add(&people(), "name", "bob", 7).unwrap();

    first.prepare().unwrap();
    let err = second.prepare().unwrap_err();
    assert!(matches!(err, Error::ResourceUnavailable(_)));
    assert_eq!(t.checked_out(), 1);

    first.commit().unwrap();
    second.prepare().unwrap();
    second.commit().unwrap();
    assert_eq!(t.checked_out(), 0);
}

#[test]
fn fail_fast_uses_full_pool_capacity() {
    let t = TestSource::fail_fast(3);
    let mut held: Vec<_> = (0..3u64)
        .map(|id| {
            let mut txn = t.source.create_transaction(id);
            txn.add(&people(), "n", &id.to_string(), id).unwrap();
            txn.prepare().unwrap();
            txn
        })
        .collect();
    assert_eq!(t.checked_out(), 3);

    let mut extra = t.source.create_transaction(9);
    extra.add(&people(), "n", "9", 9).unwrap();
    assert!(matches!(extra.prepare().unwrap_err(), Error::ResourceUnavailable(_)));

    for txn in &mut held {
        txn.commit().unwrap();
    }
    extra.prepare().unwrap();
    extra.commit().unwrap();
    assert_eq!(t.checked_out(), 0);
    assert_eq!(t.store.smembers("people").len(), 4);
}

#[test]
fn dropped_prepared_transaction_returns_connection() {
    let t = TestSource::new();
    {
        let mut txn = t.source.create_transaction(1);
        two_entries(&mut txn);
        txn.prepare().unwrap();
        assert_eq!(t.checked_out(), 1);
    }
    assert_eq!(t.checked_out(), 0);
    assert_eq!(t.store.key_count(), 0);

    // The pool replaces the evicted connection
    t.commit_all(2, vec![MutationCommand::add(people(), "name", "carol", 3)])
        .unwrap();
    assert!(t.store.sismember("people:name:carol", "3"));
}

#[test]
fn many_lifecycles_return_to_baseline() {
    let t = TestSource::new();
    for id in 0..50u64 {
        let mut txn = t.source.create_transaction(id);
        txn.add(&people(), "n", &id.to_string(), id).unwrap();
        match id % 4 {
            0 => {
                txn.prepare().unwrap();
                txn.commit().unwrap();
            }
            1 => {
                txn.prepare().unwrap();
                txn.rollback().unwrap();
            }
            2 => {
                t.store.faults().fail_staging_after(0);
                assert!(txn.prepare().is_err());
                txn.rollback().unwrap();
            }
            _ => {
                txn.prepare().unwrap();
                t.store.faults().fail_next_exec();
                assert!(txn.commit().is_err());
            }
        }
        assert_eq!(t.checked_out(), 0, "leak after transaction {}", id);
    }
    assert_eq!(t.source.pool().total_acquired(), 50);
}
