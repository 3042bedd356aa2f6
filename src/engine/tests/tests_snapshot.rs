//! Snapshot isolation semantics.

use tempfile::TempDir;

use super::helpers::*;
use crate::options::ReadOptions;

#[test]
fn snapshot_pins_overwritten_value() {
    let dir = TempDir::new().unwrap();
    let db = open(dir.path(), memtable_only_options());

    put(&db, b"k", b"v1");
    let snapshot = db.snapshot();
    put(&db, b"k", b"v2");

    assert_eq!(get(&db, b"k"), Some(b"v2".to_vec()));
    assert_eq!(
        db.get_at(ReadOptions::default(), &snapshot, b"k").unwrap(),
        Some(b"v1".to_vec())
    );
    drop(snapshot);
    assert_eq!(get(&db, b"k"), Some(b"v2".to_vec()));
}

#[test]
fn snapshot_hides_later_inserts_and_deletes() {
    let dir = TempDir::new().unwrap();
    let db = open(dir.path(), memtable_only_options());

    put(&db, b"kept", b"old");
    let snapshot = db.snapshot();
    put(&db, b"new-key", b"new");
    delete(&db, b"kept");

    let ropts = ReadOptions::default();
    assert_eq!(db.get_at(ropts, &snapshot, b"new-key").unwrap(), None);
    assert_eq!(
        db.get_at(ropts, &snapshot, b"kept").unwrap(),
        Some(b"old".to_vec())
    );
    assert_eq!(get(&db, b"kept"), None);
}

#[test]
fn snapshot_reads_are_stable_across_flushes() {
    let dir = TempDir::new().unwrap();
    let db = open(dir.path(), small_buffer_options());

    put(&db, b"pinned", b"before");
    let snapshot = db.snapshot();

    // Overwrite and churn enough data to rotate and flush memtables.
    for i in 0..2000 {
        put(&db, format!("churn{i:05}").as_bytes(), &vec![b'x'; 64]);
    }
    put(&db, b"pinned", b"after");

    // Every intermediate read at the snapshot returns the pinned value.
    for _ in 0..10 {
        assert_eq!(
            db.get_at(ReadOptions::default(), &snapshot, b"pinned").unwrap(),
            Some(b"before".to_vec())
        );
    }
    assert_eq!(get(&db, b"pinned"), Some(b"after".to_vec()));
}

#[test]
fn snapshot_protects_entries_from_compaction() {
    let dir = TempDir::new().unwrap();
    let db = open(dir.path(), compaction_options());

    put(&db, b"key", b"snapshot-value");
    let snapshot = db.snapshot();

    // Overwrite the key many times and force a full manual compaction.
    for i in 0..500 {
        put(&db, b"key", format!("overwrite-{i}").as_bytes());
        put(&db, format!("filler{i:05}").as_bytes(), &vec![b'f'; 128]);
    }
    db.compact_range(None, None).expect("compact");

    assert_eq!(
        db.get_at(ReadOptions::default(), &snapshot, b"key").unwrap(),
        Some(b"snapshot-value".to_vec())
    );
    assert_eq!(get(&db, b"key"), Some(b"overwrite-499".to_vec()));
}

#[test]
fn iterator_at_snapshot_ignores_later_writes() {
    let dir = TempDir::new().unwrap();
    let db = open(dir.path(), memtable_only_options());

    put(&db, b"a", b"1");
    put(&db, b"b", b"2");
    let snapshot = db.snapshot();
    put(&db, b"c", b"3");
    delete(&db, b"a");

    let mut iter = db.iter_at(ReadOptions::default(), &snapshot);
    iter.seek_to_first();
    let mut seen = Vec::new();
    while iter.valid() {
        seen.push((iter.key().to_vec(), iter.value().to_vec()));
        iter.next();
    }
    assert_eq!(
        seen,
        vec![
            (b"a".to_vec(), b"1".to_vec()),
            (b"b".to_vec(), b"2".to_vec()),
        ]
    );
}

#[test]
fn multiple_snapshots_release_in_any_order() {
    let dir = TempDir::new().unwrap();
    let db = open(dir.path(), memtable_only_options());

    put(&db, b"k", b"v1");
    let s1 = db.snapshot();
    put(&db, b"k", b"v2");
    let s2 = db.snapshot();
    put(&db, b"k", b"v3");

    let ropts = ReadOptions::default();
    drop(s1);
    assert_eq!(db.get_at(ropts, &s2, b"k").unwrap(), Some(b"v2".to_vec()));
    drop(s2);
    assert_eq!(get(&db, b"k"), Some(b"v3".to_vec()));
}
