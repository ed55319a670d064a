//! Lifecycle Tests
//!
//! Remote effects of prepare, commit and rollback.

use crate::common::*;

// ============================================================================
// Add and remove
// ============================================================================

#[test]
fn add_then_remove_single_entry() {
    let t = TestSource::new();

    t.commit_all(1, vec![MutationCommand::add(people(), "name", "alice", 42)])
        .unwrap();
    assert!(t.store.sismember("people:name:alice", "42"));
    assert!(t.store.sismember("people", "people:name:alice"));

    t.commit_all(2, vec![MutationCommand::remove(people(), "name", "alice", 42)])
        .unwrap();
    assert!(t.store.smembers("people:name:alice").is_empty());
    assert!(t.store.smembers("people").is_empty());
    assert_eq!(t.store.key_count(), 0);
}

#[test]
fn nothing_is_visible_before_commit() {
    let t = TestSource::new();
    let mut txn = t.source.create_transaction(1);
    txn.add(&people(), "name", "alice", 42).unwrap();
    assert_eq!(t.store.key_count(), 0);

    txn.prepare().unwrap();
    assert_eq!(txn.status(), TransactionStatus::Prepared);
    assert_eq!(t.store.key_count(), 0);

    txn.commit().unwrap();
    assert_eq!(txn.status(), TransactionStatus::Committed);
    assert_eq!(t.store.key_count(), 2);
}

#[test]
fn staged_order_is_append_order() {
    let t = TestSource::new();
    t.commit_all(
        1,
        vec![
            MutationCommand::add(people(), "name", "alice", 42),
            MutationCommand::remove(people(), "name", "alice", 42),
            MutationCommand::add(people(), "name", "alice", 42),
        ],
    )
    .unwrap();
    assert!(t.store.sismember("people:name:alice", "42"));

    t.commit_all(
        2,
        vec![
            MutationCommand::add(people(), "name", "bob", 7),
            MutationCommand::remove(people(), "name", "bob", 7),
        ],
    )
    .unwrap();
    assert!(!t.store.exists("people:name:bob"));
}

#[test]
fn node_and_relationship_indexes_share_keyspace() {
    // The remote key carries no entity type
    let t = TestSource::new();
    t.commit_all(
        1,
        vec![
            MutationCommand::add(IndexIdentifier::node("x"), "k", "v", 1),
            MutationCommand::add(IndexIdentifier::relationship("x"), "k", "v", 2),
        ],
    )
    .unwrap();
    let members = t.store.smembers("x:k:v");
    assert!(members.contains("1") && members.contains("2"));
}

// ============================================================================
// Rollback
// ============================================================================

#[test]
fn rollback_after_prepare_leaves_store_unchanged() {
    let t = TestSource::new();
    t.commit_all(1, vec![MutationCommand::add(people(), "name", "alice", 42)])
        .unwrap();
    let before = t.store.snapshot();

    let mut txn = t.source.create_transaction(2);
    txn.add(&people(), "name", "bob", 7).unwrap();
    txn.remove(&people(), "name", "alice", 42).unwrap();
    txn.prepare().unwrap();
    txn.rollback().unwrap();

    assert_eq!(txn.status(), TransactionStatus::RolledBack);
    assert_eq!(t.store.snapshot(), before);
}

#[test]
fn rollback_before_prepare_touches_nothing() {
    let t = TestSource::new();
    let acquired = t.source.pool().total_acquired();

    let mut txn = t.source.create_transaction(1);
    txn.add(&people(), "name", "alice", 42).unwrap();
    txn.rollback().unwrap();

    assert_eq!(txn.status(), TransactionStatus::RolledBack);
    assert_eq!(t.source.pool().total_acquired(), acquired);
    assert_eq!(t.store.key_count(), 0);
}

// ============================================================================
// State machine
// ============================================================================

#[test]
fn terminal_states_reject_further_calls() {
    let t = TestSource::new();
    let mut txn = t.source.create_transaction(1);
    txn.add(&people(), "name", "alice", 42).unwrap();
    txn.prepare().unwrap();
    txn.commit().unwrap();

    assert!(txn.add(&people(), "name", "bob", 7).unwrap_err().is_invalid_state());
    assert!(txn.prepare().unwrap_err().is_invalid_state());
    assert!(txn.commit().unwrap_err().is_invalid_state());
    assert!(txn.rollback().unwrap_err().is_invalid_state());
}

#[test]
fn commit_requires_prepare() {
    let t = TestSource::new();
    let mut txn = t.source.create_transaction(1);
    txn.add(&people(), "name", "alice", 42).unwrap();

    assert!(txn.commit().unwrap_err().is_invalid_state());
    assert_eq!(txn.status(), TransactionStatus::Active);
}

#[test]
fn prepared_transaction_rejects_appends() {
    let t = TestSource::new();
    let mut txn = t.source.create_transaction(1);
    txn.add(&people(), "name", "alice", 42).unwrap();
    txn.prepare().unwrap();

    assert!(txn.add(&people(), "name", "bob", 7).unwrap_err().is_invalid_state());
    txn.commit().unwrap();
    assert!(!t.store.exists("people:name:bob"));
}

#[test]
fn empty_transaction_commits() {
    let t = TestSource::new();
    let batches = t.store.batches_applied();
    t.commit_all(1, Vec::new()).unwrap();
    assert_eq!(t.store.key_count(), 0);
    assert_eq!(t.store.batches_applied(), batches + 1);
}

// ============================================================================
// Index creation
// ============================================================================

#[test]
fn create_index_writes_metadata_not_remote_keys() {
    let t = TestSource::new();
    t.commit_all(1, vec![MutationCommand::create_index(people(), exact_config())])
        .unwrap();

    assert_eq!(
        t.source.index_store().get(EntityType::Node, "people"),
        Some(exact_config())
    );
    assert_eq!(t.store.key_count(), 0);
}

#[test]
fn create_index_is_idempotent() {
    let t = TestSource::new();
    t.commit_all(1, vec![MutationCommand::create_index(people(), exact_config())])
        .unwrap();
    t.commit_all(2, vec![MutationCommand::create_index(people(), IndexConfig::new())])
        .unwrap();

    assert_eq!(t.source.index_store().len(), 1);
    assert_eq!(
        t.source.index_store().get(EntityType::Node, "people"),
        Some(exact_config())
    );
}
