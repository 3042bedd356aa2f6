//! Tests covering physical-block framing: fragmentation across block
//! boundaries and tail padding.

use std::fs::{File, OpenOptions};

use tempfile::TempDir;

use crate::wal::{LogReader, LogWriter, BLOCK_SIZE, HEADER_SIZE};

fn write_records(dir: &TempDir, records: &[Vec<u8>]) -> std::path::PathBuf {
    let path = dir.path().join("000001.log");
    let file = OpenOptions::new()
        .create(true)
        .write(true)
        .truncate(true)
        .open(&path)
        .unwrap();
    let mut writer = LogWriter::new(file);
    for record in records {
        writer.add_record(record).unwrap();
    }
    writer.sync().unwrap();
    path
}

fn read_all(path: &std::path::Path) -> Vec<Vec<u8>> {
    let mut reader = LogReader::new(File::open(path).unwrap());
    let mut out = Vec::new();
    while let Some(record) = reader.read_record().unwrap() {
        out.push(record);
    }
    out
}

#[test]
fn record_larger_than_one_block_is_fragmented() {
    let dir = TempDir::new().unwrap();
    let big = vec![0xabu8; BLOCK_SIZE * 3 + 123];
    let path = write_records(&dir, &[big.clone()]);
    assert_eq!(read_all(&path), vec![big]);
}

#[test]
fn record_spanning_many_blocks_roundtrips() {
    let dir = TempDir::new().unwrap();
    let records = vec![
        vec![1u8; 10],
        vec![2u8; BLOCK_SIZE],
        vec![3u8; BLOCK_SIZE * 2],
        vec![4u8; 17],
    ];
    let path = write_records(&dir, &records);
    assert_eq!(read_all(&path), records);
}

#[test]
fn block_tail_shorter_than_header_is_padded() {
    // Leave exactly 3 bytes in the first block, forcing zero padding
    // before the next fragment.
    let dir = TempDir::new().unwrap();
    let first_len = BLOCK_SIZE - HEADER_SIZE - 3;
    let records = vec![vec![9u8; first_len], b"next-block".to_vec()];
    let path = write_records(&dir, &records);

    let file_len = std::fs::metadata(&path).unwrap().len() as usize;
    assert!(file_len > BLOCK_SIZE, "second record must start a new block");
    assert_eq!(read_all(&path), records);
}

#[test]
fn fragment_exactly_fills_block() {
    let dir = TempDir::new().unwrap();
    let records = vec![vec![7u8; BLOCK_SIZE - HEADER_SIZE], b"tail".to_vec()];
    let path = write_records(&dir, &records);
    assert_eq!(read_all(&path), records);
}

#[test]
fn payload_capacity_boundaries_around_block_edge() {
    let dir = TempDir::new().unwrap();
    for delta in [-2i64, -1, 0, 1, 2] {
        let len = (BLOCK_SIZE as i64 - HEADER_SIZE as i64 + delta) as usize;
        let records = vec![vec![5u8; len], b"sentinel".to_vec()];
        let path = write_records(&dir, &records);
        assert_eq!(read_all(&path), records, "payload len {len}");
    }
}
