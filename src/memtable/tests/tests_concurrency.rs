//! Concurrent readers against a single writer.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread;

use super::new_memtable;
use crate::keys::{LookupKey, ValueType};
use crate::memtable::MemtableGet;

#[test]
fn readers_never_observe_torn_state() {
    let mem = new_memtable();
    let stop = Arc::new(AtomicBool::new(false));

    let mut readers = Vec::new();
    for _ in 0..4 {
        let mem = Arc::clone(&mem);
        let stop = Arc::clone(&stop);
        readers.push(thread::spawn(move || {
            let mut observed_max = 0u64;
            while !stop.load(Ordering::Relaxed) {
                // A reader at an unbounded snapshot sees some prefix of
                // the writer's inserts; values never regress.
                if let MemtableGet::Found(v) = mem.get(&LookupKey::new(b"counter", u64::MAX >> 8)) {
                    let n: u64 = String::from_utf8(v).unwrap().parse().unwrap();
                    assert!(n >= observed_max, "observed {n} after {observed_max}");
                    observed_max = n;
                }
            }
        }));
    }

    for seq in 1..2000u64 {
        mem.add(seq, ValueType::Value, b"counter", seq.to_string().as_bytes());
    }
    stop.store(true, Ordering::Relaxed);
    for handle in readers {
        handle.join().unwrap();
    }

    assert_eq!(
        mem.get(&LookupKey::new(b"counter", u64::MAX >> 8)),
        MemtableGet::Found(b"1999".to_vec())
    );
}

#[test]
fn snapshot_reads_are_stable_under_writes() {
    let mem = new_memtable();
    mem.add(10, ValueType::Value, b"k", b"at-10");

    let mem2 = Arc::clone(&mem);
    let reader = thread::spawn(move || {
        for _ in 0..1000 {
            assert_eq!(
                mem2.get(&LookupKey::new(b"k", 10)),
                MemtableGet::Found(b"at-10".to_vec())
            );
        }
    });

    for seq in 11..500u64 {
        mem.add(seq, ValueType::Value, b"k", b"newer");
    }
    reader.join().unwrap();
}
