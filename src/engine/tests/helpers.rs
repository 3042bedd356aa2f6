use std::path::Path;

use tracing_subscriber::EnvFilter;

use crate::engine::Engine;
use crate::options::{CompressionType, Options, ReadOptions, WriteOptions};

/// Initialize tracing controlled by `RUST_LOG`. Safe to call multiple
/// times — only the first call takes effect.
pub fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .with_test_writer()
        .try_init();
}

/// Config whose memtable never fills during a normal test.
pub fn memtable_only_options() -> Options {
    init_tracing();
    Options {
        create_if_missing: true,
        write_buffer_size: 8 * 1024 * 1024,
        ..Default::default()
    }
}

/// Small write buffer: rotations and level-0 flushes happen quickly.
pub fn small_buffer_options() -> Options {
    init_tracing();
    Options {
        create_if_missing: true,
        write_buffer_size: 16 * 1024,
        ..Default::default()
    }
}

/// Aggressive geometry: tiny buffers and files so a moderate write load
/// exercises multi-level compaction.
pub fn compaction_options() -> Options {
    init_tracing();
    Options {
        create_if_missing: true,
        write_buffer_size: 16 * 1024,
        max_file_size: 32 * 1024,
        block_size: 1024,
        compression: CompressionType::None,
        ..Default::default()
    }
}

pub fn open(path: &Path, options: Options) -> Engine {
    Engine::open(options, path).expect("open")
}

pub fn reopen(path: &Path) -> Engine {
    open(path, memtable_only_options())
}

pub fn put(db: &Engine, key: &[u8], value: &[u8]) {
    db.put(WriteOptions::default(), key, value).expect("put");
}

pub fn put_sync(db: &Engine, key: &[u8], value: &[u8]) {
    db.put(WriteOptions { sync: true }, key, value).expect("put");
}

pub fn delete(db: &Engine, key: &[u8]) {
    db.delete(WriteOptions::default(), key).expect("delete");
}

pub fn get(db: &Engine, key: &[u8]) -> Option<Vec<u8>> {
    db.get(ReadOptions::default(), key).expect("get")
}

/// Collect `(key, value)` pairs of a full forward scan.
pub fn collect_all(db: &Engine) -> Vec<(Vec<u8>, Vec<u8>)> {
    let mut iter = db.iter(ReadOptions::default());
    iter.seek_to_first();
    let mut out = Vec::new();
    while iter.valid() {
        out.push((iter.key().to_vec(), iter.value().to_vec()));
        iter.next();
    }
    iter.status().expect("scan status");
    out
}
