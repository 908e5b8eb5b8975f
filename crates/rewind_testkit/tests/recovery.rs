//! Round trips through close and reopen on LMDB.

use rewind_core::{
    Config, Durability, Environment, LmdbEngine, OpenFlags, RewindError, SequenceNumber,
    TransactionMode, DEFAULT_MODE,
};
use rewind_testkit::TestEnvironment;
use tempfile::TempDir;

fn commit_records(env: &Environment<LmdbEngine>, count: u64) {
    let records = env.open_catalog(Some("records")).unwrap();
    for i in 0..count {
        let mut txn = env.begin_write().unwrap();
        let stamp = txn.pending_sequence().unwrap();
        txn.put(&records, &i.to_be_bytes(), &stamp.to_bytes()).unwrap();
        assert_eq!(txn.commit().unwrap(), stamp);
    }
}

#[test]
fn n_commits_recover_n() {
    let mut fixture = TestEnvironment::new();
    commit_records(&fixture.env, 25);

    fixture.reopen().unwrap();
    let seqs = fixture.sequences().unwrap();
    assert_eq!(seqs.durable, SequenceNumber::new(25));
    assert_eq!(seqs.current, seqs.durable);
}

#[test]
fn scenario_single_put() {
    let temp = TempDir::new().unwrap();
    let mut env: Environment = Environment::create();
    env.open(temp.path(), OpenFlags::empty(), DEFAULT_MODE).unwrap();
    let root = env.open_catalog(None).unwrap();

    assert_eq!(env.last_durable_sequence().unwrap(), SequenceNumber::ZERO);
    let mut txn = env.begin_transaction(TransactionMode::ReadWrite).unwrap();
    txn.put(&root, b"k1", b"v1").unwrap();
    txn.commit().unwrap();
    assert_eq!(env.last_durable_sequence().unwrap(), SequenceNumber::new(1));

    let txn = env.begin_transaction(TransactionMode::ReadOnly).unwrap();
    assert_eq!(txn.get(&root, b"k1").unwrap(), b"v1");
    assert!(matches!(txn.get(&root, b"missing"), Err(RewindError::NotFound)));
}

#[test]
fn scenario_two_commits_then_reopen() {
    let temp = TempDir::new().unwrap();
    {
        let env: Environment = Environment::open_path(temp.path(), Config::default()).unwrap();
        let root = env.open_catalog(None).unwrap();
        for (key, value) in [(&b"a"[..], &b"1"[..]), (&b"b"[..], &b"2"[..])] {
            let mut txn = env.begin_write().unwrap();
            txn.put(&root, key, value).unwrap();
            txn.commit().unwrap();
        }
    }

    let env: Environment = Environment::open_path(temp.path(), Config::default()).unwrap();
    assert_eq!(env.last_durable_sequence().unwrap(), SequenceNumber::new(2));

    let root = env.open_catalog(None).unwrap();
    let txn = env.begin_read().unwrap();
    assert_eq!(txn.get(&root, b"b").unwrap(), b"2");
}

#[test]
fn deferred_close_leaves_no_gap() {
    let mut fixture = TestEnvironment::with_config(Config::new().durability(Durability::Deferred));
    commit_records(&fixture.env, 3);
    assert_eq!(fixture.sequences().unwrap().gap(), 3);

    fixture.reopen().unwrap();
    let seqs = fixture.sequences().unwrap();
    assert_eq!(seqs.durable, SequenceNumber::new(3));
    assert_eq!(seqs.gap(), 0);
}

#[test]
fn close_twice_then_drop() {
    let mut fixture = TestEnvironment::new();
    commit_records(&fixture.env, 1);
    fixture.env.close().unwrap();
    fixture.env.close().unwrap();
    assert!(matches!(fixture.env.sequences(), Err(RewindError::NotOpen)));
}

#[test]
fn read_only_reopen_sees_recovered_sequence() {
    let temp = TempDir::new().unwrap();
    {
        let env: Environment = Environment::open_path(temp.path(), Config::default()).unwrap();
        commit_records(&env, 4);
    }

    let mut env: Environment = Environment::create();
    env.open(temp.path(), OpenFlags::empty().read_only(true), DEFAULT_MODE).unwrap();
    assert_eq!(env.current_sequence().unwrap(), SequenceNumber::new(4));
    assert_eq!(env.sync().unwrap().gap(), 0);

    let records = env.open_catalog(Some("records")).unwrap();
    let txn = env.begin_read().unwrap();
    let stamp = txn.get(&records, &3u64.to_be_bytes()).unwrap();
    assert_eq!(SequenceNumber::from_bytes(stamp), Some(SequenceNumber::new(4)));
}

#[test]
fn read_only_open_of_fresh_directory_starts_at_zero() {
    let temp = TempDir::new().unwrap();
    {
        // Create the store files without ever committing.
        let env: Environment = Environment::open_path(temp.path(), Config::default()).unwrap();
        drop(env);
    }

    let mut env: Environment = Environment::create();
    env.open(temp.path(), OpenFlags::empty().read_only(true), DEFAULT_MODE).unwrap();
    assert_eq!(env.last_durable_sequence().unwrap(), SequenceNumber::ZERO);
}

#[test]
fn cursor_walks_records_in_key_order() {
    let fixture = TestEnvironment::new();
    commit_records(&fixture.env, 5);

    let records = fixture.open_catalog(Some("records")).unwrap();
    let txn = fixture.begin_read().unwrap();
    let mut cursor = txn.open_cursor(&records).unwrap();
    assert!(matches!(txn.open_cursor(&records), Err(RewindError::CursorInUse)));

    let mut seen = Vec::new();
    let mut entry = cursor.first().unwrap();
    while let Some((key, value)) = entry {
        let index = u64::from_be_bytes(key.try_into().unwrap());
        seen.push((index, SequenceNumber::from_bytes(value).unwrap().as_u64()));
        entry = cursor.next().unwrap();
    }
    assert_eq!(seen, vec![(0, 1), (1, 2), (2, 3), (3, 4), (4, 5)]);

    let (key, _) = cursor.seek(&2u64.to_be_bytes()).unwrap().unwrap();
    assert_eq!(key, &2u64.to_be_bytes()[..]);
    drop(cursor);

    assert!(txn.open_cursor(&records).is_ok());
}

#[test]
fn cursor_over_empty_catalog_finds_nothing() {
    let fixture = TestEnvironment::new();
    let empty = fixture.open_catalog(Some("empty")).unwrap();

    let txn = fixture.begin_read().unwrap();
    let mut cursor = txn.open_cursor(&empty).unwrap();
    assert_eq!(cursor.first().unwrap(), None);
    assert_eq!(cursor.next().unwrap(), None);
    assert_eq!(cursor.seek(b"anything").unwrap(), None);
}

#[test]
fn cursor_seek_past_last_key_stays_at_end() {
    let fixture = TestEnvironment::new();
    commit_records(&fixture.env, 3);
    let records = fixture.open_catalog(Some("records")).unwrap();

    let txn = fixture.begin_read().unwrap();
    let mut cursor = txn.open_cursor(&records).unwrap();
    assert_eq!(cursor.seek(&99u64.to_be_bytes()).unwrap(), None);
    assert_eq!(cursor.next().unwrap(), None);

    let (key, _) = cursor.seek(&2u64.to_be_bytes()).unwrap().unwrap();
    assert_eq!(key, &2u64.to_be_bytes()[..]);
    assert_eq!(cursor.next().unwrap(), None);
    assert_eq!(cursor.next().unwrap(), None);
}

#[test]
fn cursor_inside_write_transaction_sees_staged_records() {
    let fixture = TestEnvironment::new();
    let root = fixture.open_catalog(None).unwrap();

    let mut txn = fixture.begin_write().unwrap();
    txn.put(&root, b"b", b"2").unwrap();
    txn.put(&root, b"a", b"1").unwrap();
    {
        let mut cursor = txn.open_cursor(&root).unwrap();
        assert_eq!(cursor.next().unwrap(), Some((&b"a"[..], &b"1"[..])));
        assert_eq!(cursor.next().unwrap(), Some((&b"b"[..], &b"2"[..])));
        assert_eq!(cursor.next().unwrap(), None);
    }
    txn.commit().unwrap();
}

#[test]
fn one_thread_holds_two_readers() {
    let fixture = TestEnvironment::new();
    commit_records(&fixture.env, 2);
    let records = fixture.open_catalog(Some("records")).unwrap();

    let first = fixture.begin_read().unwrap();
    let second = fixture.begin_read().unwrap();
    let key = 1u64.to_be_bytes();
    assert_eq!(first.get(&records, &key).unwrap(), second.get(&records, &key).unwrap());
    drop(first);
    assert!(second.get(&records, &0u64.to_be_bytes()).is_ok());
}

#[test]
fn capacity_error_when_map_is_full() {
    let fixture = TestEnvironment::with_config(Config::new().map_size(64 * 1024));
    let root = fixture.open_catalog(None).unwrap();
    let value = vec![7u8; 2048];

    let mut txn = fixture.begin_write().unwrap();
    let failure = (0u32..256)
        .map(|i| txn.put(&root, &i.to_be_bytes(), &value))
        .find(Result::is_err);
    assert!(matches!(failure, Some(Err(RewindError::Capacity { .. }))));
}
