//! Recovery Tests
//!
//! The host replays its command log into a fresh bridge and commits it.

use crate::common::*;
use std::io::{BufReader, Cursor, Seek, SeekFrom};

fn logged(cmds: &[MutationCommand]) -> Vec<u8> {
    let mut log = Vec::new();
    for cmd in cmds {
        write_command(&mut log, cmd).unwrap();
    }
    log
}

#[test]
fn replay_after_lost_commit() {
    let t = TestSource::new();
    let cmds = vec![
        MutationCommand::create_index(people(), exact_config()),
        MutationCommand::add(people(), "name", "alice", 42),
        MutationCommand::add(people(), "name", "bob", 7),
    ];
    let log = logged(&cmds);

    // Prepared, then the process died before commit
    {
        let mut txn = t.source.create_transaction(1);
        for cmd in cmds.clone() {
            txn.append_command(cmd).unwrap();
        }
        txn.prepare().unwrap();
    }
    assert_eq!(t.store.key_count(), 0);

    let mut recovered = t.source.recover_transaction(1, Cursor::new(log)).unwrap();
    assert_eq!(recovered.commands(), cmds.as_slice());
    recovered.prepare().unwrap();
    recovered.commit().unwrap();

    assert!(t.store.sismember("people:name:alice", "42"));
    assert!(t.store.sismember("people:name:bob", "7"));
    assert_eq!(t.checked_out(), 0);
}

#[test]
fn replay_after_failed_exec_converges() {
    let t = TestSource::new();
    let cmds = vec![
        MutationCommand::add(people(), "name", "alice", 42),
        MutationCommand::remove(people(), "name", "carol", 3),
    ];
    t.commit_all(0, vec![MutationCommand::add(people(), "name", "carol", 3)])
        .unwrap();

    t.store.faults().fail_next_exec();
    assert!(t.commit_all(1, cmds.clone()).is_err());
    assert!(t.store.sismember("people:name:carol", "3"));

    let mut recovered = t
        .source
        .recover_transaction(1, Cursor::new(logged(&cmds)))
        .unwrap();
    recovered.prepare().unwrap();
    recovered.commit().unwrap();
    let after_one = t.store.snapshot();

    // A second replay changes nothing
    t.commit_all(1, cmds).unwrap();
    assert_eq!(t.store.snapshot(), after_one);
    assert!(!t.store.exists("people:name:carol"));
}

#[test]
fn host_reads_commands_one_at_a_time() {
    let t = TestSource::new();
    let cmds = vec![
        MutationCommand::add(people(), "name", "alice", 42),
        MutationCommand::remove(IndexIdentifier::relationship("knows"), "since", "2009", 5),
    ];
    let mut input = Cursor::new(logged(&cmds));
    let mut buffer = Vec::new();

    let mut txn: Box<dyn XaTransaction> = Box::new(t.source.create_transaction(4));
    while let Some(cmd) = XaDataSource::read_command(&t.source, &mut input, &mut buffer).unwrap() {
        txn.inject_command(cmd).unwrap();
    }
    assert!(!txn.is_read_only());
    txn.prepare().unwrap();
    txn.commit().unwrap();

    assert!(t.store.sismember("people:name:alice", "42"));
}

#[test]
fn torn_tail_is_dropped() {
    let t = TestSource::new();
    let first = MutationCommand::add(people(), "name", "alice", 42);
    let mut log = logged(&[first.clone()]);
    let full = log.len();
    log.extend(logged(&[MutationCommand::add(people(), "name", "bob", 7)]));
    log.truncate(full + 5);

    let recovered = t.source.recover_transaction(2, Cursor::new(log)).unwrap();
    assert_eq!(recovered.commands(), &[first]);
}

#[test]
fn corrupted_log_is_rejected() {
    let t = TestSource::new();
    let mut log = logged(&[MutationCommand::add(people(), "name", "alice", 42)]);
    let last = log.len() - 1;
    log[last] ^= 0xff;

    let err = t.source.recover_transaction(3, Cursor::new(log)).unwrap_err();
    assert!(matches!(err, Error::Corruption(_)));
}

#[test]
fn file_backed_log() {
    let t = TestSource::new();
    let cmds = vec![
        MutationCommand::add(people(), "name", "alice", 42),
        MutationCommand::add(people(), "city", "paris", 42),
    ];
    let mut file = tempfile::tempfile().unwrap();
    for cmd in &cmds {
        write_command(&mut file, cmd).unwrap();
    }
    file.seek(SeekFrom::Start(0)).unwrap();

    let mut recovered = t
        .source
        .recover_transaction(5, BufReader::new(file))
        .unwrap();
    recovered.prepare().unwrap();
    recovered.commit().unwrap();
    assert_eq!(t.store.smembers("people").len(), 2);
}
