//! Concurrency Tests
//!
//! Transactions on separate threads share only the pool.

use crate::common::*;
use std::sync::Barrier;
use std::thread;

#[test]
fn concurrent_transactions_do_not_see_each_others_staged_ops() {
    let t = Arc::new(TestSource::new());
    let prepared = Arc::new(Barrier::new(3));
    let checked = Arc::new(Barrier::new(3));

    let handles: Vec<_> = ["people", "places"]
        .into_iter()
        .enumerate()
        .map(|(i, index)| {
            let t = Arc::clone(&t);
            let prepared = Arc::clone(&prepared);
            let checked = Arc::clone(&checked);
            thread::spawn(move || {
                let mut txn = t.source.create_transaction(i as u64);
                txn.add(&IndexIdentifier::node(index), "name", "x", i as u64)
                    .unwrap();
                txn.prepare().unwrap();
                prepared.wait();
                checked.wait();
                txn.commit().unwrap();
            })
        })
        .collect();

    prepared.wait();
    // Both batches are staged on held connections, neither applied
    assert_eq!(t.checked_out(), 2);
    assert_eq!(t.store.key_count(), 0);
    checked.wait();

    for handle in handles {
        handle.join().unwrap();
    }
    assert!(t.store.sismember("people:name:x", "0"));
    assert!(t.store.sismember("places:name:x", "1"));
    assert_eq!(t.checked_out(), 0);
}

#[test]
fn blocked_acquire_proceeds_after_release() {
    let t = Arc::new(TestSource::with_builder(DataSource::builder().max_connections(1)));

    let mut holder = t.source.create_transaction(1);
    holder.add(&people(), "name", "alice", 42).unwrap();
    holder.prepare().unwrap();

    let waiter = {
        let t = Arc::clone(&t);
        thread::spawn(move || {
            let mut txn = t.source.create_transaction(2);
            txn.add(&IndexIdentifier::node("places"), "city", "paris", 7)
                .unwrap();
            txn.prepare().unwrap();
            txn.commit().unwrap();
        })
    };

    holder.commit().unwrap();
    waiter.join().unwrap();

    assert!(t.store.sismember("people:name:alice", "42"));
    assert!(t.store.sismember("places:city:paris", "7"));
    assert_eq!(t.checked_out(), 0);
}

#[test]
fn many_threads_many_transactions() {
    let t = Arc::new(TestSource::new());
    let handles: Vec<_> = (0..8u64)
        .map(|thread_id| {
            let t = Arc::clone(&t);
            thread::spawn(move || {
                let index = IndexIdentifier::node(format!("idx{}", thread_id));
                for n in 0..25u64 {
                    let id = thread_id * 1000 + n;
                    t.commit_all(id, vec![MutationCommand::add(index.clone(), "n", n.to_string(), id)])
                        .unwrap();
                }
            })
        })
        .collect();
    for handle in handles {
        handle.join().unwrap();
    }

    for thread_id in 0..8u64 {
        let reverse = t.store.smembers(&format!("idx{}", thread_id));
        assert_eq!(reverse.len(), 25);
    }
    assert_eq!(t.checked_out(), 0);
    assert_eq!(t.source.pool().total_acquired(), 200);
}
