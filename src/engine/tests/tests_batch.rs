//! Atomic batch application through the engine.

use std::sync::Arc;
use std::thread;

use tempfile::TempDir;

use super::helpers::*;
use crate::batch::WriteBatch;
use crate::options::WriteOptions;

#[test]
fn batch_applies_all_records_in_order() {
    let dir = TempDir::new().unwrap();
    let db = open(dir.path(), memtable_only_options());

    put(&db, b"y", b"to-be-deleted");

    let mut batch = WriteBatch::new();
    batch.put(b"x", b"1");
    batch.delete(b"y");
    batch.put(b"z", b"3");
    db.write(WriteOptions::default(), batch).unwrap();

    assert_eq!(get(&db, b"x"), Some(b"1".to_vec()));
    assert_eq!(get(&db, b"y"), None);
    assert_eq!(get(&db, b"z"), Some(b"3".to_vec()));
}

#[test]
fn batch_with_repeated_key_keeps_last_record() {
    let dir = TempDir::new().unwrap();
    let db = open(dir.path(), memtable_only_options());

    let mut batch = WriteBatch::new();
    batch.put(b"k", b"first");
    batch.put(b"k", b"second");
    batch.delete(b"k");
    batch.put(b"k", b"final");
    db.write(WriteOptions::default(), batch).unwrap();

    assert_eq!(get(&db, b"k"), Some(b"final".to_vec()));
}

#[test]
fn empty_batch_is_a_noop() {
    let dir = TempDir::new().unwrap();
    let db = open(dir.path(), memtable_only_options());
    db.write(WriteOptions::default(), WriteBatch::new()).unwrap();
    assert_eq!(collect_all(&db), Vec::new());
}

#[test]
fn concurrent_reader_sees_none_or_all_of_a_batch() {
    let dir = TempDir::new().unwrap();
    let db = Arc::new(open(dir.path(), memtable_only_options()));

    // The batch writes a marker plus two dependents. Readers must never
    // observe a state where only part of the trio exists.
    let writer = {
        let db = Arc::clone(&db);
        thread::spawn(move || {
            for round in 0..300u32 {
                let tag = round.to_string().into_bytes();
                let mut batch = WriteBatch::new();
                batch.put(b"t1", &tag);
                batch.put(b"t2", &tag);
                batch.put(b"t3", &tag);
                db.write(WriteOptions::default(), batch).unwrap();
            }
        })
    };

    let reader = {
        let db = Arc::clone(&db);
        thread::spawn(move || {
            for _ in 0..2000 {
                let snapshot = db.snapshot();
                let ropts = crate::options::ReadOptions::default();
                let a = db.get_at(ropts, &snapshot, b"t1").unwrap();
                let b = db.get_at(ropts, &snapshot, b"t2").unwrap();
                let c = db.get_at(ropts, &snapshot, b"t3").unwrap();
                assert_eq!(a, b, "torn batch: t1 != t2");
                assert_eq!(b, c, "torn batch: t2 != t3");
            }
        })
    };

    writer.join().unwrap();
    reader.join().unwrap();
}

#[test]
fn grouped_writers_all_complete() {
    // Many threads writing small batches concurrently exercises leader
    // election and batch grouping; every write must land.
    let dir = TempDir::new().unwrap();
    let db = Arc::new(open(dir.path(), memtable_only_options()));

    let mut handles = Vec::new();
    for t in 0..8 {
        let db = Arc::clone(&db);
        handles.push(thread::spawn(move || {
            for i in 0..200 {
                let key = format!("t{t:02}-k{i:04}");
                put(&db, key.as_bytes(), key.as_bytes());
            }
        }));
    }
    for handle in handles {
        handle.join().unwrap();
    }

    for t in 0..8 {
        for i in (0..200).step_by(41) {
            let key = format!("t{t:02}-k{i:04}");
            assert_eq!(get(&db, key.as_bytes()), Some(key.clone().into_bytes()), "{key}");
        }
    }
}
