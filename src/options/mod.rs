//! Engine configuration.
//!
//! [`Options`] controls durable behavior (buffer sizes, file sizes,
//! compression, filters) and open semantics (`create_if_missing`,
//! `paranoid_checks`). Per-call knobs live in [`ReadOptions`] and
//! [`WriteOptions`].

use std::sync::Arc;

use crate::error::{Error, Result};
use crate::filter::FilterPolicy;
use crate::keys::{BytewiseComparator, Comparator};

/// Block compression codec tag, stored in every block trailer.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum CompressionType {
    /// Store block contents verbatim.
    None = 0,
    /// Snappy-compressed contents.
    Snappy = 1,
    /// Zstd-compressed contents.
    Zstd = 2,
}

impl CompressionType {
    /// Decode a trailer tag. Unknown tags are corruption — a newer or
    /// foreign writer produced the file.
    pub fn from_u8(tag: u8) -> Result<CompressionType> {
        match tag {
            0 => Ok(CompressionType::None),
            1 => Ok(CompressionType::Snappy),
            2 => Ok(CompressionType::Zstd),
            other => Err(Error::corruption(format!("unknown compression tag {other}"))),
        }
    }
}

/// Engine-wide configuration, fixed at open.
#[derive(Clone)]
pub struct Options {
    /// Total order over user keys. Must be identical on every open of
    /// the same database; the name is persisted and checked.
    pub comparator: Arc<dyn Comparator>,

    /// Create the database directory and initial manifest if absent.
    pub create_if_missing: bool,

    /// Fail open if the database already exists.
    pub error_if_exists: bool,

    /// Treat recoverable corruption (a torn WAL tail) as fatal.
    pub paranoid_checks: bool,

    /// Memtable size that triggers rotation to an immutable table and a
    /// background flush.
    pub write_buffer_size: usize,

    /// Upper bound on open table files held by the table cache.
    pub max_open_files: usize,

    /// Uncompressed size threshold for closing a data block.
    pub block_size: usize,

    /// Entries between prefix-compression restart points.
    pub block_restart_interval: usize,

    /// Target size for table files produced by flush and compaction.
    pub max_file_size: usize,

    /// Codec applied to data/index blocks.
    pub compression: CompressionType,

    /// Optional filter policy; when set, tables carry a filter block.
    pub filter_policy: Option<Arc<dyn FilterPolicy>>,

    /// Capacity of the shared data-block cache, in bytes.
    pub block_cache_capacity: usize,
}

impl Default for Options {
    fn default() -> Self {
        Options {
            comparator: Arc::new(BytewiseComparator),
            create_if_missing: false,
            error_if_exists: false,
            paranoid_checks: false,
            write_buffer_size: 4 * 1024 * 1024,
            max_open_files: 1000,
            block_size: 4 * 1024,
            block_restart_interval: 16,
            max_file_size: 2 * 1024 * 1024,
            compression: CompressionType::Snappy,
            filter_policy: None,
            block_cache_capacity: 8 * 1024 * 1024,
        }
    }
}

/// Per-read knobs.
#[derive(Clone, Copy)]
pub struct ReadOptions {
    /// Load blocks read on this path into the block cache.
    pub fill_cache: bool,
}

impl Default for ReadOptions {
    fn default() -> Self {
        ReadOptions { fill_cache: true }
    }
}

/// Per-write knobs.
#[derive(Clone, Copy, Default)]
pub struct WriteOptions {
    /// Fsync the log before acknowledging the write.
    pub sync: bool,
}
