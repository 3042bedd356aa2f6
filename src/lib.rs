//! # StrataDB
//!
//! An embeddable, persistent, ordered key-value store built on a
//! **leveled Log-Structured Merge Tree**. Designed for fast writes,
//! crash-safe recovery, and point-in-time reads.
//!
//! ## Architecture
//!
//! ```text
//! ┌───────────────────────────────────────────────────────────┐
//! │                         Engine                            │
//! │  ┌───────────┐   ┌────────────┐   ┌────────────────────┐  │
//! │  │  Memtable │   │ Immutable  │   │  Tables, level 0   │  │
//! │  │  + WAL    │──►│  memtable  │──►│  Tables, level 1   │  │
//! │  └───────────┘   └────────────┘   │  …                 │  │
//! │       rotate          flush       │  Tables, level 6   │  │
//! │                                   └─────────┬──────────┘  │
//! │                                             │ compaction  │
//! │  ┌──────────────────────────────────────────┴──────────┐  │
//! │  │   Version set  (manifest of edits, CURRENT pointer) │  │
//! │  └─────────────────────────────────────────────────────┘  │
//! └───────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Modules
//!
//! | Module | Purpose |
//! |--------|---------|
//! | [`engine`] | Open/recover, reads, writes, snapshots, iteration, background work |
//! | [`memtable`] | In-memory write buffer over a concurrent skip list |
//! | [`wal`] | Block-framed, CRC-protected write-ahead log |
//! | [`sstable`] | Immutable sorted tables: blocks, filters, index, footer |
//! | [`version`] | Files-per-level snapshots, manifest, compaction picking |
//! | [`compaction`] | Compaction plans: inputs, trivial moves, output limits |
//! | [`cache`] | Sharded LRU caches for open tables and data blocks |
//! | [`batch`] | Atomic write batches |
//! | [`keys`] | Internal key algebra and comparators |
//! | [`encoding`] | Fixed/varint codecs and length-prefixed slices |
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use stratadb::{Engine, Options, ReadOptions, WriteOptions};
//!
//! let mut options = Options::default();
//! options.create_if_missing = true;
//!
//! let db = Engine::open(options, "/tmp/my_db").unwrap();
//!
//! // Write
//! db.put(WriteOptions::default(), b"hello", b"world").unwrap();
//!
//! // Read
//! let value = db.get(ReadOptions::default(), b"hello").unwrap();
//! assert_eq!(value.as_deref(), Some(&b"world"[..]));
//!
//! // Point-in-time view
//! let snapshot = db.snapshot();
//! db.put(WriteOptions::default(), b"hello", b"again").unwrap();
//! let old = db.get_at(ReadOptions::default(), &snapshot, b"hello").unwrap();
//! assert_eq!(old.as_deref(), Some(&b"world"[..]));
//!
//! // Ordered scan
//! let mut iter = db.iter(ReadOptions::default());
//! iter.seek_to_first();
//! while iter.valid() {
//!     println!("{:?} = {:?}", iter.key(), iter.value());
//!     iter.next();
//! }
//!
//! db.close().unwrap();
//! ```

pub mod batch;
pub mod cache;
pub mod compaction;
pub mod encoding;
pub mod engine;
pub mod error;
pub mod filename;
pub mod filter;
pub mod flock;
pub mod iterator;
pub mod keys;
pub mod memtable;
pub mod options;
pub mod sstable;
pub mod version;
pub mod wal;

pub use batch::WriteBatch;
pub use engine::{destroy, repair, DbIter, Engine, Snapshot};
pub use error::{Error, Result};
pub use filter::{BloomFilterPolicy, FilterPolicy};
pub use keys::{BytewiseComparator, Comparator};
pub use options::{CompressionType, Options, ReadOptions, WriteOptions};
