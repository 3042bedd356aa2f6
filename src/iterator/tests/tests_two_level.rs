//! Tests for the two-level (index → data block) cursor.

use super::VecIter;
use crate::iterator::{BoxedIter, Iter, TwoLevelIter};

/// Build a two-level iterator over "blocks" of entries. The index maps
/// each block's last key to the block id; the block function resolves
/// the id back to a `VecIter`.
fn two_level(blocks: Vec<Vec<(Vec<u8>, Vec<u8>)>>) -> TwoLevelIter {
    let mut index = Vec::new();
    for (i, block) in blocks.iter().enumerate() {
        let last_key = block
            .last()
            .map(|(k, _)| k.clone())
            .unwrap_or_else(|| format!("~empty{i}").into_bytes());
        index.push((last_key, vec![i as u8]));
    }
    let index_iter: BoxedIter = Box::new(VecIter::new(index));
    let block_fn = Box::new(move |handle: &[u8]| {
        let id = handle[0] as usize;
        Ok(Box::new(VecIter::new(blocks[id].clone())) as BoxedIter)
    });
    TwoLevelIter::new(index_iter, block_fn)
}

fn entries(pairs: &[(&str, &str)]) -> Vec<(Vec<u8>, Vec<u8>)> {
    pairs
        .iter()
        .map(|(k, v)| (k.as_bytes().to_vec(), v.as_bytes().to_vec()))
        .collect()
}

#[test]
fn scans_across_block_boundaries() {
    let mut iter = two_level(vec![
        entries(&[("a", "1"), ("b", "2")]),
        entries(&[("c", "3"), ("d", "4")]),
        entries(&[("e", "5")]),
    ]);
    let mut keys = Vec::new();
    iter.seek_to_first();
    while iter.valid() {
        keys.push(iter.key().to_vec());
        iter.next();
    }
    assert_eq!(keys, vec![b"a".to_vec(), b"b".to_vec(), b"c".to_vec(), b"d".to_vec(), b"e".to_vec()]);
}

#[test]
fn seek_lands_in_correct_block() {
    let mut iter = two_level(vec![
        entries(&[("a", "1"), ("b", "2")]),
        entries(&[("m", "3"), ("n", "4")]),
    ]);
    iter.seek(b"c");
    assert!(iter.valid());
    assert_eq!(iter.key(), b"m");
    assert_eq!(iter.value(), b"3");
}

#[test]
fn backward_scan_crosses_blocks() {
    let mut iter = two_level(vec![
        entries(&[("a", "1")]),
        entries(&[("b", "2"), ("c", "3")]),
    ]);
    let mut keys = Vec::new();
    iter.seek_to_last();
    while iter.valid() {
        keys.push(iter.key().to_vec());
        iter.prev();
    }
    assert_eq!(keys, vec![b"c".to_vec(), b"b".to_vec(), b"a".to_vec()]);
}

#[test]
fn empty_blocks_are_skipped() {
    let mut iter = two_level(vec![
        entries(&[("a", "1")]),
        entries(&[]),
        entries(&[("z", "9")]),
    ]);
    let mut keys = Vec::new();
    iter.seek_to_first();
    while iter.valid() {
        keys.push(iter.key().to_vec());
        iter.next();
    }
    assert_eq!(keys, vec![b"a".to_vec(), b"z".to_vec()]);
}

#[test]
fn seek_past_everything_is_invalid() {
    let mut iter = two_level(vec![entries(&[("a", "1")])]);
    iter.seek(b"zzzz");
    assert!(!iter.valid());
    assert!(iter.status().is_ok());
}
