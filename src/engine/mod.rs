//! # Storage Engine
//!
//! This module binds the whole stack together: the write-ahead log and
//! memtable on the write path, the version set and table files on the
//! read path, and the single background worker that flushes and
//! compacts.
//!
//! ## Write path
//!
//! Writers queue FIFO under the engine mutex. The queue head becomes
//! the *leader*: it makes room (rotating the memtable if full, applying
//! level-0 backpressure), coalesces adjacent compatible writers into
//! one batch group, assigns sequence numbers, appends the group to the
//! WAL (fsyncing when requested), inserts into the memtable, and wakes
//! the writers it serviced. Followers just wait on their own condition
//! variable.
//!
//! ## Read path
//!
//! A read captures `(sequence, mem, imm, current version)` under the
//! mutex, then resolves without it: memtable, immutable memtable, then
//! the level stack newest-first. Lookups that probe more than one file
//! charge a seek against the first file; a file that exhausts its seek
//! budget becomes a compaction candidate.
//!
//! ## Background work
//!
//! One worker thread serves one scheduled job at a time: flushing the
//! immutable memtable has priority, then manual compactions, then
//! size- or seek-triggered compactions. Any background I/O failure is
//! recorded and poisons subsequent writes until the database is
//! reopened.

#[cfg(test)]
mod tests;

pub mod iter;
pub mod repair;
pub mod snapshot;

use std::collections::{HashSet, VecDeque};
use std::fs::{self, File, OpenOptions};
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering as AtomicOrdering};
use std::sync::Arc;
use std::thread::JoinHandle;
use std::time::{Duration, Instant};

use parking_lot::{Condvar, Mutex, MutexGuard};
use tracing::{debug, error, info, warn};

use crate::batch::WriteBatch;
use crate::cache::table_cache::TableCache;
use crate::compaction::Compaction;
use crate::error::{Error, Result};
use crate::filename::{
    current_file_name, lock_file_name, log_file_name, manifest_file_name, parse_file_name,
    set_current_file, table_file_name, FileType,
};
use crate::flock::FileLock;
use crate::iterator::{BoxedIter, Iter, MergingIter, TwoLevelIter};
use crate::keys::{
    parse_internal_key, Comparator, InternalKey, InternalKeyComparator, LookupKey, SequenceNumber,
    ValueType, MAX_SEQUENCE_NUMBER, VALUE_TYPE_FOR_SEEK,
};
use crate::memtable::{Memtable, MemtableGet};
use crate::options::{Options, ReadOptions, WriteOptions};
use crate::sstable::builder::TableBuilder;
use crate::sstable::BlockCache;
use crate::version::{
    LevelFileNumIter, Version, VersionEdit, VersionSet, L0_SLOWDOWN_WRITES_TRIGGER,
    L0_STOP_WRITES_TRIGGER, NUM_LEVELS,
};
use crate::wal::{LogReader, LogWriter};

pub use iter::DbIter;
pub use repair::repair;
pub use snapshot::Snapshot;

use snapshot::SnapshotList;

/// Table-cache slots reserved for other file uses.
const NUM_NON_TABLE_CACHE_FILES: usize = 10;

// ------------------------------------------------------------------------------------------------
// Internal bookkeeping types
// ------------------------------------------------------------------------------------------------

/// Per-level compaction counters backing the `stats` property.
#[derive(Default, Clone, Copy)]
struct CompactionStats {
    micros: u64,
    bytes_read: u64,
    bytes_written: u64,
}

/// A queued write request.
struct Writer {
    batch: Option<WriteBatch>,
    sync: bool,
    done: AtomicBool,
    status: Mutex<Option<Result<()>>>,
    cv: Condvar,
}

impl Writer {
    fn new(batch: Option<WriteBatch>, sync: bool) -> Self {
        Writer {
            batch,
            sync,
            done: AtomicBool::new(false),
            status: Mutex::new(None),
            cv: Condvar::new(),
        }
    }
}

/// An in-flight `compact_range` request.
struct ManualCompaction {
    level: usize,
    done: bool,
    begin: Option<InternalKey>,
    end: Option<InternalKey>,
}

/// One compaction output file under construction.
struct CompactionOutput {
    number: u64,
    file_size: u64,
    smallest: Vec<u8>,
    largest: Vec<u8>,
}

/// Mutable state of a running compaction.
struct CompactionState {
    smallest_snapshot: SequenceNumber,
    outputs: Vec<CompactionOutput>,
    builder: Option<TableBuilder>,
    total_bytes: u64,
}

// ------------------------------------------------------------------------------------------------
// Engine state
// ------------------------------------------------------------------------------------------------

/// Everything guarded by the engine mutex.
pub(crate) struct DbState {
    mem: Arc<Memtable>,
    imm: Option<Arc<Memtable>>,
    log_file_number: u64,
    versions: VersionSet,
    writers: VecDeque<Arc<Writer>>,
    pub(crate) snapshots: SnapshotList,
    /// Output files of in-flight flushes/compactions, protected from
    /// garbage collection before their version installs.
    pending_outputs: HashSet<u64>,
    background_compaction_scheduled: bool,
    manual_compaction: Option<ManualCompaction>,
    bg_error: Option<Error>,
    stats: [CompactionStats; NUM_LEVELS],
}

/// Shared core of an open database.
pub(crate) struct EngineInner {
    db_path: PathBuf,
    options: Options,
    icmp: InternalKeyComparator,
    table_cache: Arc<TableCache>,
    pub(crate) state: Mutex<DbState>,
    /// The active WAL segment. Only the leader writer and memtable
    /// rotation touch it; lock order is `state` before `wal`.
    wal: Mutex<LogWriter>,
    /// Signaled when a background job finishes.
    bg_work_finished: Condvar,
    /// Wakes the background worker.
    bg_work_available: Condvar,
    shutting_down: AtomicBool,
    /// Mirrors `state.imm.is_some()` for lock-free checks inside the
    /// compaction merge loop.
    has_imm: AtomicBool,
    _db_lock: FileLock,
}

/// An open database.
///
/// The handle is `Send + Sync`; share it behind an `Arc` to use it from
/// several threads. Dropping the last handle quiesces the background
/// worker and releases the directory lock.
pub struct Engine {
    inner: Arc<EngineInner>,
    worker: Option<JoinHandle<()>>,
}

impl std::fmt::Debug for Engine {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Engine").finish_non_exhaustive()
    }
}

impl Engine {
    // --------------------------------------------------------------------------------------------
    // Open / close
    // --------------------------------------------------------------------------------------------

    /// Open (or create) the database at `path`.
    pub fn open(options: Options, path: impl AsRef<Path>) -> Result<Engine> {
        let db_path = path.as_ref().to_path_buf();
        if db_path.as_os_str().is_empty() {
            return Err(Error::invalid_argument("empty database path"));
        }
        let icmp = InternalKeyComparator::new(Arc::clone(&options.comparator));

        let _ = fs::create_dir_all(&db_path);
        let db_lock = FileLock::lock(lock_file_name(&db_path)).map_err(|e| {
            Error::Io(std::io::Error::new(
                e.kind(),
                format!("cannot lock {}: {e}", db_path.display()),
            ))
        })?;

        let current_exists = current_file_name(&db_path).exists();
        if !current_exists {
            if !options.create_if_missing {
                return Err(Error::invalid_argument(format!(
                    "{}: does not exist (create_if_missing is false)",
                    db_path.display()
                )));
            }
            info!(db = %db_path.display(), "creating new database");
            Self::new_db(&db_path, &icmp)?;
        } else if options.error_if_exists {
            return Err(Error::invalid_argument(format!(
                "{}: exists (error_if_exists is true)",
                db_path.display()
            )));
        }

        let block_cache: Arc<BlockCache> = Arc::new(BlockCache::new(options.block_cache_capacity));
        let table_cache = Arc::new(TableCache::new(
            db_path.clone(),
            options.clone(),
            icmp.clone(),
            options.max_open_files.saturating_sub(NUM_NON_TABLE_CACHE_FILES).max(1),
            Some(block_cache),
        ));

        let mut versions = VersionSet::new(
            db_path.clone(),
            options.clone(),
            icmp.clone(),
            Arc::clone(&table_cache),
        );
        versions.recover()?;

        // Replay WAL segments younger than the manifest state.
        let mut edit = VersionEdit::new();
        let min_log = versions.log_number();
        let prev_log = versions.prev_log_number();
        let mut log_numbers: Vec<u64> = Vec::new();
        for entry in fs::read_dir(&db_path)? {
            let entry = entry?;
            let name = entry.file_name();
            if let Some((FileType::Log, number)) = parse_file_name(&name.to_string_lossy()) {
                if number >= min_log || number == prev_log {
                    log_numbers.push(number);
                }
            }
        }
        log_numbers.sort_unstable();

        let mut max_sequence: SequenceNumber = 0;
        for &log_number in &log_numbers {
            versions.mark_file_number_used(log_number);
            Self::recover_log_file(
                &db_path,
                &options,
                &icmp,
                &table_cache,
                &mut versions,
                log_number,
                &mut edit,
                &mut max_sequence,
            )?;
        }
        if versions.last_sequence() < max_sequence {
            versions.set_last_sequence(max_sequence);
        }

        // Fresh WAL for the new mutable memtable.
        let new_log_number = versions.new_file_number();
        let log_file = File::create(log_file_name(&db_path, new_log_number))?;
        edit.set_prev_log_number(0);
        edit.set_log_number(new_log_number);
        versions.log_and_apply(&mut edit)?;

        let inner = Arc::new(EngineInner {
            db_path,
            options,
            icmp: icmp.clone(),
            table_cache,
            state: Mutex::new(DbState {
                mem: Arc::new(Memtable::new(icmp)),
                imm: None,
                log_file_number: new_log_number,
                versions,
                writers: VecDeque::new(),
                snapshots: SnapshotList::default(),
                pending_outputs: HashSet::new(),
                background_compaction_scheduled: false,
                manual_compaction: None,
                bg_error: None,
                stats: [CompactionStats::default(); NUM_LEVELS],
            }),
            wal: Mutex::new(LogWriter::new(log_file)),
            bg_work_finished: Condvar::new(),
            bg_work_available: Condvar::new(),
            shutting_down: AtomicBool::new(false),
            has_imm: AtomicBool::new(false),
            _db_lock: db_lock,
        });

        {
            let mut state = inner.state.lock();
            inner.delete_obsolete_files(&mut state);
            inner.maybe_schedule_compaction(&mut state);
        }

        let worker_inner = Arc::clone(&inner);
        let worker = std::thread::Builder::new()
            .name("stratadb-bg".to_string())
            .spawn(move || worker_inner.background_main())?;

        info!("database opened");
        Ok(Engine {
            inner,
            worker: Some(worker),
        })
    }

    /// Flush remaining state and stop the background worker. Equivalent
    /// to dropping the handle, but surfaces shutdown errors.
    pub fn close(mut self) -> Result<()> {
        self.shutdown();
        self.inner.wal.lock().flush()
    }

    fn shutdown(&mut self) {
        self.inner.shutting_down.store(true, AtomicOrdering::Release);
        self.inner.bg_work_available.notify_all();
        self.inner.bg_work_finished.notify_all();
        if let Some(handle) = self.worker.take() {
            let _ = handle.join();
        }
    }

    fn new_db(db_path: &Path, icmp: &InternalKeyComparator) -> Result<()> {
        let mut edit = VersionEdit::new();
        edit.set_comparator_name(icmp.user_comparator().name());
        edit.set_log_number(0);
        edit.set_next_file_number(2);
        edit.set_last_sequence(0);

        let manifest = manifest_file_name(db_path, 1);
        let file = OpenOptions::new()
            .create_new(true)
            .write(true)
            .open(&manifest)?;
        let mut log = LogWriter::new(file);
        let mut record = Vec::new();
        edit.encode_to(&mut record);
        let result = log.add_record(&record).and_then(|_| log.sync());
        match result {
            Ok(()) => set_current_file(db_path, 1),
            Err(e) => {
                let _ = fs::remove_file(&manifest);
                Err(e)
            }
        }
    }

    #[allow(clippy::too_many_arguments)]
    fn recover_log_file(
        db_path: &Path,
        options: &Options,
        icmp: &InternalKeyComparator,
        table_cache: &Arc<TableCache>,
        versions: &mut VersionSet,
        log_number: u64,
        edit: &mut VersionEdit,
        max_sequence: &mut SequenceNumber,
    ) -> Result<()> {
        let path = log_file_name(db_path, log_number);
        let file = File::open(&path)?;
        info!(log = %path.display(), "replaying write-ahead log");

        let mut reader = LogReader::new(file);
        let mut mem: Option<Arc<Memtable>> = None;
        loop {
            let record = match reader.read_record() {
                Ok(Some(record)) => record,
                Ok(None) => break,
                Err(e) => {
                    if options.paranoid_checks {
                        return Err(e);
                    }
                    // Drop the torn tail; everything before it is kept.
                    warn!(log = %path.display(), "ignoring corrupted log tail: {e}");
                    break;
                }
            };
            let batch = WriteBatch::from_contents(record)?;
            let mem_ref = mem.get_or_insert_with(|| Arc::new(Memtable::new(icmp.clone())));
            batch.insert_into(mem_ref)?;
            let last_seq = batch.sequence() + batch.count() as u64 - 1;
            if last_seq > *max_sequence {
                *max_sequence = last_seq;
            }
            if mem_ref.approximate_memory_usage() > options.write_buffer_size {
                let mem_full = mem.take().expect("memtable present");
                Self::flush_recovered_memtable(
                    db_path,
                    options,
                    icmp,
                    table_cache,
                    versions,
                    &mem_full,
                    edit,
                )?;
            }
        }
        if let Some(mem) = mem {
            if !mem.is_empty() {
                Self::flush_recovered_memtable(
                    db_path, options, icmp, table_cache, versions, &mem, edit,
                )?;
            }
        }
        Ok(())
    }

    fn flush_recovered_memtable(
        db_path: &Path,
        options: &Options,
        icmp: &InternalKeyComparator,
        table_cache: &Arc<TableCache>,
        versions: &mut VersionSet,
        mem: &Arc<Memtable>,
        edit: &mut VersionEdit,
    ) -> Result<()> {
        let file_number = versions.new_file_number();
        let mut iter = mem.iter();
        match build_table_file(db_path, options, icmp, table_cache, file_number, &mut iter)? {
            Some((file_size, smallest, largest)) => {
                // Recovery flushes always land at level 0.
                edit.add_file(0, file_number, file_size, smallest, largest);
            }
            None => versions.reuse_file_number(file_number),
        }
        Ok(())
    }

    // --------------------------------------------------------------------------------------------
    // Writes
    // --------------------------------------------------------------------------------------------

    /// Insert (or overwrite) one key.
    pub fn put(&self, options: WriteOptions, key: &[u8], value: &[u8]) -> Result<()> {
        let mut batch = WriteBatch::new();
        batch.put(key, value);
        self.write(options, batch)
    }

    /// Remove one key.
    pub fn delete(&self, options: WriteOptions, key: &[u8]) -> Result<()> {
        let mut batch = WriteBatch::new();
        batch.delete(key);
        self.write(options, batch)
    }

    /// Apply a batch atomically.
    pub fn write(&self, options: WriteOptions, batch: WriteBatch) -> Result<()> {
        self.write_inner(options, Some(batch))
    }

    fn write_inner(&self, options: WriteOptions, batch: Option<WriteBatch>) -> Result<()> {
        let inner = &self.inner;
        let force = batch.is_none();
        let writer = Arc::new(Writer::new(batch, options.sync));

        let mut state = inner.state.lock();
        state.writers.push_back(Arc::clone(&writer));
        while !writer.done.load(AtomicOrdering::Acquire)
            && !Arc::ptr_eq(state.writers.front().expect("queue nonempty"), &writer)
        {
            writer.cv.wait(&mut state);
        }
        if writer.done.load(AtomicOrdering::Acquire) {
            let status = writer.status.lock().take().unwrap_or(Ok(()));
            return status;
        }

        // This thread is the leader.
        let mut status = inner.make_room_for_write(&mut state, force);
        let mut last_writer_index = 0;
        if status.is_ok() && !force {
            let (mut group, last_index) = Self::build_batch_group(&state);
            last_writer_index = last_index;
            let sequence_base = state.versions.last_sequence() + 1;
            group.set_sequence(sequence_base);
            let count = group.count() as u64;
            let mem = Arc::clone(&state.mem);
            let sync = writer.sync;

            // Log append, fsync, and memtable insert run without the
            // engine mutex; the queue discipline guarantees only the
            // leader is here.
            let write_result = MutexGuard::unlocked(&mut state, || -> Result<()> {
                {
                    let mut wal = inner.wal.lock();
                    wal.add_record(group.contents())?;
                    if sync {
                        wal.sync()?;
                    } else {
                        wal.flush()?;
                    }
                }
                group.insert_into(&mem)
            });

            match write_result {
                Ok(()) => state.versions.set_last_sequence(sequence_base + count - 1),
                Err(e) => {
                    // The log tail is in an unknown state; poison the
                    // engine rather than risk silent divergence.
                    inner.record_background_error(&mut state, e.clone());
                    status = Err(e);
                }
            }
        }

        for _ in 0..=last_writer_index {
            let serviced = state.writers.pop_front().expect("grouped writer present");
            if !Arc::ptr_eq(&serviced, &writer) {
                *serviced.status.lock() = Some(status.clone());
                serviced.done.store(true, AtomicOrdering::Release);
                serviced.cv.notify_one();
            }
        }
        if let Some(next_leader) = state.writers.front() {
            next_leader.cv.notify_one();
        }
        status
    }

    /// Coalesce the queue head with adjacent compatible writers.
    ///
    /// Group size is capped at 1 MiB, reduced to `first + 128 KiB` when
    /// the leading batch is small so tiny writes stay low-latency. A
    /// sync writer is never grouped under a non-sync leader.
    fn build_batch_group(state: &DbState) -> (WriteBatch, usize) {
        let first = state.writers.front().expect("leader present");
        let first_batch = first.batch.as_ref().expect("leader has a batch");
        let mut size = first_batch.approximate_size();
        let max_size = if size <= 128 << 10 {
            size + (128 << 10)
        } else {
            1 << 20
        };

        let mut group = first_batch.clone();
        let mut last_index = 0;
        for (index, candidate) in state.writers.iter().enumerate().skip(1) {
            if candidate.sync && !first.sync {
                break;
            }
            let Some(batch) = &candidate.batch else { break };
            size += batch.approximate_size();
            if size > max_size {
                break;
            }
            group.append(batch);
            last_index = index;
        }
        (group, last_index)
    }

    // --------------------------------------------------------------------------------------------
    // Reads
    // --------------------------------------------------------------------------------------------

    /// Look up `key` at the latest sequence.
    pub fn get(&self, options: ReadOptions, key: &[u8]) -> Result<Option<Vec<u8>>> {
        self.get_impl(options, key, None)
    }

    /// Look up `key` as of `snapshot`.
    pub fn get_at(
        &self,
        options: ReadOptions,
        snapshot: &Snapshot,
        key: &[u8],
    ) -> Result<Option<Vec<u8>>> {
        self.get_impl(options, key, Some(snapshot))
    }

    fn get_impl(
        &self,
        options: ReadOptions,
        key: &[u8],
        snapshot: Option<&Snapshot>,
    ) -> Result<Option<Vec<u8>>> {
        let inner = &self.inner;
        let (sequence, mem, imm, current) = {
            let state = inner.state.lock();
            let sequence = match snapshot {
                Some(s) => s.sequence(),
                None => state.versions.last_sequence(),
            };
            (
                sequence,
                Arc::clone(&state.mem),
                state.imm.clone(),
                Arc::clone(state.versions.current()),
            )
        };

        let lookup = LookupKey::new(key, sequence);
        match mem.get(&lookup) {
            MemtableGet::Found(value) => return Ok(Some(value)),
            MemtableGet::Deleted => return Ok(None),
            MemtableGet::NotFound => {}
        }
        if let Some(imm) = &imm {
            match imm.get(&lookup) {
                MemtableGet::Found(value) => return Ok(Some(value)),
                MemtableGet::Deleted => return Ok(None),
                MemtableGet::NotFound => {}
            }
        }

        let (value, stats) = current.get(options, &lookup)?;
        if stats.is_some() && current.update_stats(stats) {
            let mut state = inner.state.lock();
            inner.maybe_schedule_compaction(&mut state);
        }
        Ok(value)
    }

    /// Cursor over the whole database at the latest sequence.
    pub fn iter(&self, options: ReadOptions) -> DbIter {
        self.iter_impl(options, None)
    }

    /// Cursor pinned to `snapshot`.
    pub fn iter_at(&self, options: ReadOptions, snapshot: &Snapshot) -> DbIter {
        self.iter_impl(options, Some(snapshot))
    }

    fn iter_impl(&self, options: ReadOptions, snapshot: Option<&Snapshot>) -> DbIter {
        let inner = &self.inner;
        let (sequence, children, version) = {
            let state = inner.state.lock();
            let sequence = match snapshot {
                Some(s) => s.sequence(),
                None => state.versions.last_sequence(),
            };
            let mut children: Vec<BoxedIter> = vec![Box::new(state.mem.iter())];
            if let Some(imm) = &state.imm {
                children.push(Box::new(imm.iter()));
            }
            let version = Arc::clone(state.versions.current());
            version.add_iterators(options, &mut children);
            (sequence, children, version)
        };
        let merged = MergingIter::new(
            Arc::new(inner.icmp.clone()) as Arc<dyn Comparator>,
            children,
        );
        DbIter::new(Arc::clone(inner), version, merged, sequence)
    }

    /// Register a snapshot at the current sequence.
    pub fn snapshot(&self) -> Snapshot {
        let inner = &self.inner;
        let mut state = inner.state.lock();
        let sequence = state.versions.last_sequence();
        let handle = state.snapshots.register(sequence);
        Snapshot {
            handle,
            engine: Arc::downgrade(inner),
        }
    }

    // --------------------------------------------------------------------------------------------
    // Introspection
    // --------------------------------------------------------------------------------------------

    /// Read a named property:
    /// `num-files-at-level-N`, `stats`, `sstables`,
    /// `approximate-memory-usage`.
    pub fn property(&self, name: &str) -> Option<String> {
        let state = self.inner.state.lock();
        if let Some(rest) = name.strip_prefix("num-files-at-level-") {
            let level: usize = rest.parse().ok()?;
            if level >= NUM_LEVELS {
                return None;
            }
            return Some(state.versions.num_level_files(level).to_string());
        }
        match name {
            "stats" => {
                let mut out = String::from(
                    "Level  Files Size(MB) Time(sec) Read(MB) Write(MB)\n\
                     --------------------------------------------------\n",
                );
                for level in 0..NUM_LEVELS {
                    let files = state.versions.num_level_files(level);
                    let stats = &state.stats[level];
                    if files == 0 && stats.micros == 0 {
                        continue;
                    }
                    out.push_str(&format!(
                        "{:>5} {:>6} {:>8.2} {:>9.3} {:>8.2} {:>9.2}\n",
                        level,
                        files,
                        state.versions.num_level_bytes(level) as f64 / 1048576.0,
                        stats.micros as f64 / 1e6,
                        stats.bytes_read as f64 / 1048576.0,
                        stats.bytes_written as f64 / 1048576.0,
                    ));
                }
                Some(out)
            }
            "sstables" => Some(state.versions.current().debug_string()),
            "approximate-memory-usage" => {
                let mut total = state.mem.approximate_memory_usage();
                if let Some(imm) = &state.imm {
                    total += imm.approximate_memory_usage();
                }
                Some(total.to_string())
            }
            _ => None,
        }
    }

    /// Approximate on-disk bytes spanned by each `[start, limit)` range.
    pub fn approximate_sizes(&self, ranges: &[(&[u8], &[u8])]) -> Vec<u64> {
        let state = self.inner.state.lock();
        let version = Arc::clone(state.versions.current());
        ranges
            .iter()
            .map(|(start, limit)| {
                let k1 = InternalKey::new(start, MAX_SEQUENCE_NUMBER, VALUE_TYPE_FOR_SEEK);
                let k2 = InternalKey::new(limit, MAX_SEQUENCE_NUMBER, VALUE_TYPE_FOR_SEEK);
                let begin = state.versions.approximate_offset_of(&version, &k1);
                let end = state.versions.approximate_offset_of(&version, &k2);
                end.saturating_sub(begin)
            })
            .collect()
    }

    // --------------------------------------------------------------------------------------------
    // Manual compaction
    // --------------------------------------------------------------------------------------------

    /// Compact the key range `[begin, end]` (`None` = unbounded) all
    /// the way down. Blocks until the requested range is fully
    /// compacted.
    pub fn compact_range(&self, begin: Option<&[u8]>, end: Option<&[u8]>) -> Result<()> {
        let mut max_level_with_files = 1;
        {
            let state = self.inner.state.lock();
            let version = state.versions.current();
            for level in 1..NUM_LEVELS {
                if version.overlap_in_level(level, begin, end) {
                    max_level_with_files = level;
                }
            }
        }
        self.flush_memtable()?;
        for level in 0..max_level_with_files {
            self.manual_compact_level(level, begin, end)?;
        }
        Ok(())
    }

    /// Force the current memtable out and wait for its flush.
    fn flush_memtable(&self) -> Result<()> {
        self.write_inner(WriteOptions::default(), None)?;
        let inner = &self.inner;
        let mut state = inner.state.lock();
        while state.imm.is_some() && state.bg_error.is_none() {
            inner.bg_work_finished.wait(&mut state);
        }
        match &state.bg_error {
            Some(e) => Err(e.clone()),
            None => Ok(()),
        }
    }

    fn manual_compact_level(
        &self,
        level: usize,
        begin: Option<&[u8]>,
        end: Option<&[u8]>,
    ) -> Result<()> {
        let inner = &self.inner;
        let begin_key = begin.map(|b| InternalKey::new(b, MAX_SEQUENCE_NUMBER, VALUE_TYPE_FOR_SEEK));
        let end_key = end.map(|e| InternalKey::new(e, 0, ValueType::Deletion));

        let mut state = inner.state.lock();
        while state.manual_compaction.is_some() {
            inner.bg_work_finished.wait(&mut state);
        }
        state.manual_compaction = Some(ManualCompaction {
            level,
            done: false,
            begin: begin_key,
            end: end_key,
        });
        inner.maybe_schedule_compaction(&mut state);

        loop {
            if inner.shutting_down.load(AtomicOrdering::Acquire) {
                break;
            }
            if state.bg_error.is_some() {
                break;
            }
            match &state.manual_compaction {
                Some(m) if !m.done => {
                    inner.maybe_schedule_compaction(&mut state);
                    inner.bg_work_finished.wait(&mut state);
                }
                _ => break,
            }
        }
        state.manual_compaction = None;
        inner.bg_work_finished.notify_all();
        match &state.bg_error {
            Some(e) => Err(e.clone()),
            None => Ok(()),
        }
    }
}

impl Drop for Engine {
    fn drop(&mut self) {
        self.shutdown();
        let _ = self.inner.wal.lock().flush();
    }
}

// ------------------------------------------------------------------------------------------------
// EngineInner: background machinery
// ------------------------------------------------------------------------------------------------

impl EngineInner {
    /// Block until the memtable has room, applying level-0 backpressure
    /// and rotating to a fresh memtable + WAL segment when full.
    fn make_room_for_write(&self, state: &mut MutexGuard<'_, DbState>, mut force: bool) -> Result<()> {
        let mut allow_delay = !force;
        loop {
            if let Some(e) = &state.bg_error {
                return Err(e.clone());
            }
            if allow_delay && state.versions.num_level_files(0) >= L0_SLOWDOWN_WRITES_TRIGGER {
                // Hand the CPU to the compactor for a moment instead of
                // stalling a full write completely once level 0 fills.
                MutexGuard::unlocked(state, || {
                    std::thread::sleep(Duration::from_millis(1));
                });
                allow_delay = false;
                continue;
            }
            if !force
                && state.mem.approximate_memory_usage() <= self.options.write_buffer_size
            {
                return Ok(());
            }
            if state.imm.is_some() {
                debug!("waiting for previous memtable flush");
                self.bg_work_finished.wait(state);
                continue;
            }
            if state.versions.num_level_files(0) >= L0_STOP_WRITES_TRIGGER {
                warn!("too many level-0 files; stalling writes");
                self.bg_work_finished.wait(state);
                continue;
            }

            // Rotate: new WAL segment, current memtable becomes immutable.
            let new_log_number = state.versions.new_file_number();
            let file = match File::create(log_file_name(&self.db_path, new_log_number)) {
                Ok(f) => f,
                Err(e) => {
                    state.versions.reuse_file_number(new_log_number);
                    return Err(e.into());
                }
            };
            {
                let mut wal = self.wal.lock();
                let _ = wal.flush();
                *wal = LogWriter::new(file);
            }
            state.log_file_number = new_log_number;
            let full_mem =
                std::mem::replace(&mut state.mem, Arc::new(Memtable::new(self.icmp.clone())));
            state.imm = Some(full_mem);
            self.has_imm.store(true, AtomicOrdering::Release);
            force = false;
            self.maybe_schedule_compaction(state);
        }
    }

    fn record_background_error(&self, state: &mut MutexGuard<'_, DbState>, e: Error) {
        if state.bg_error.is_none() {
            error!("background error: {e}");
            state.bg_error = Some(e);
            self.bg_work_finished.notify_all();
        }
    }

    fn maybe_schedule_compaction(&self, state: &mut MutexGuard<'_, DbState>) {
        if state.background_compaction_scheduled {
            return;
        }
        if self.shutting_down.load(AtomicOrdering::Acquire) || state.bg_error.is_some() {
            return;
        }
        let manual_pending = state
            .manual_compaction
            .as_ref()
            .is_some_and(|m| !m.done);
        if state.imm.is_none() && !manual_pending && !state.versions.needs_compaction() {
            return;
        }
        state.background_compaction_scheduled = true;
        self.bg_work_available.notify_one();
    }

    fn background_main(self: Arc<Self>) {
        let mut state = self.state.lock();
        loop {
            while !self.shutting_down.load(AtomicOrdering::Acquire)
                && !state.background_compaction_scheduled
            {
                self.bg_work_available.wait(&mut state);
            }
            if self.shutting_down.load(AtomicOrdering::Acquire) {
                break;
            }
            self.background_compaction(&mut state);
            state.background_compaction_scheduled = false;
            // The last round may have left a level over threshold.
            self.maybe_schedule_compaction(&mut state);
            self.bg_work_finished.notify_all();
        }
    }

    fn background_compaction(&self, state: &mut MutexGuard<'_, DbState>) {
        if state.imm.is_some() {
            if let Err(e) = self.compact_memtable(state) {
                if !self.shutting_down.load(AtomicOrdering::Acquire) {
                    self.record_background_error(state, e);
                }
            }
            return;
        }

        let is_manual = state
            .manual_compaction
            .as_ref()
            .is_some_and(|m| !m.done);
        let mut manual_end: Option<InternalKey> = None;
        let compaction = if is_manual {
            let (level, begin, end) = {
                let m = state.manual_compaction.as_ref().expect("manual present");
                (m.level, m.begin.clone(), m.end.clone())
            };
            let compaction = state
                .versions
                .compact_range(level, begin.as_ref(), end.as_ref());
            match &compaction {
                None => {
                    if let Some(m) = state.manual_compaction.as_mut() {
                        m.done = true;
                    }
                }
                Some(c) => {
                    manual_end = Some(c.input(0, c.num_input_files(0) - 1).largest.clone());
                    info!(
                        level,
                        files = c.num_input_files(0),
                        "manual compaction round"
                    );
                }
            }
            compaction
        } else {
            state.versions.pick_compaction()
        };

        match compaction {
            None => {}
            Some(mut c) if !is_manual && c.is_trivial_move() => {
                let file = Arc::clone(c.input(0, 0));
                let level = c.level();
                c.edit.remove_file(level, file.number);
                c.edit.add_file(
                    level + 1,
                    file.number,
                    file.file_size,
                    file.smallest.clone(),
                    file.largest.clone(),
                );
                let mut edit = std::mem::take(&mut c.edit);
                match state.versions.log_and_apply(&mut edit) {
                    Ok(()) => {
                        info!(
                            file = file.number,
                            from = level,
                            to = level + 1,
                            bytes = file.file_size,
                            "trivial move"
                        );
                        self.delete_obsolete_files(state);
                    }
                    Err(e) => self.record_background_error(state, e),
                }
            }
            Some(mut c) => {
                let result = self.do_compaction_work(state, &mut c);
                if let Err(e) = result {
                    if !self.shutting_down.load(AtomicOrdering::Acquire) {
                        self.record_background_error(state, e);
                    }
                }
                self.delete_obsolete_files(state);
            }
        }

        if is_manual {
            let bg_error_present = state.bg_error.is_some();
            if let Some(m) = state.manual_compaction.as_mut() {
                if bg_error_present {
                    m.done = true;
                }
                if !m.done {
                    // Only part of the range was compacted; resume after
                    // the last key this round covered.
                    m.begin = manual_end;
                }
            }
        }
    }

    /// Flush the immutable memtable to a level-0 (or pushed-down) table.
    fn compact_memtable(&self, state: &mut MutexGuard<'_, DbState>) -> Result<()> {
        let imm = state.imm.clone().ok_or_else(|| {
            Error::corruption("compact_memtable called without immutable memtable")
        })?;
        let mut edit = VersionEdit::new();
        let base = Arc::clone(state.versions.current());
        self.write_level0_table(state, &imm, &mut edit, &base)?;

        if self.shutting_down.load(AtomicOrdering::Acquire) {
            return Err(Error::Io(std::io::Error::other(
                "deleting database during memtable flush",
            )));
        }

        // The immutable memtable's WAL segment is no longer needed.
        edit.set_prev_log_number(0);
        edit.set_log_number(state.log_file_number);
        state.versions.log_and_apply(&mut edit)?;

        state.imm = None;
        self.has_imm.store(false, AtomicOrdering::Release);
        self.delete_obsolete_files(state);
        Ok(())
    }

    fn write_level0_table(
        &self,
        state: &mut MutexGuard<'_, DbState>,
        mem: &Arc<Memtable>,
        edit: &mut VersionEdit,
        base: &Arc<Version>,
    ) -> Result<()> {
        let start = Instant::now();
        let file_number = state.versions.new_file_number();
        state.pending_outputs.insert(file_number);
        info!(file = file_number, "flushing memtable");

        let db_path = self.db_path.clone();
        let options = self.options.clone();
        let icmp = self.icmp.clone();
        let table_cache = Arc::clone(&self.table_cache);
        let mem = Arc::clone(mem);

        let build_result = MutexGuard::unlocked(state, || {
            let mut iter = mem.iter();
            build_table_file(&db_path, &options, &icmp, &table_cache, file_number, &mut iter)
        });

        state.pending_outputs.remove(&file_number);
        let meta = match build_result {
            Ok(meta) => meta,
            Err(e) => {
                state.versions.reuse_file_number(file_number);
                return Err(e);
            }
        };

        let mut level = 0;
        let mut file_size = 0;
        if let Some((size, smallest, largest)) = meta {
            file_size = size;
            level = base.pick_level_for_memtable_output(
                &self.options,
                smallest.user_key(),
                largest.user_key(),
            );
            edit.add_file(level, file_number, size, smallest, largest);
            info!(file = file_number, level, bytes = size, "memtable flushed");
        } else {
            state.versions.reuse_file_number(file_number);
        }

        let stats = &mut state.stats[level];
        stats.micros += start.elapsed().as_micros() as u64;
        stats.bytes_written += file_size;
        Ok(())
    }

    // --------------------------------------------------------------------------------------------
    // Compaction execution
    // --------------------------------------------------------------------------------------------

    fn make_input_iterator(&self, compaction: &Compaction) -> MergingIter {
        // Compaction reads are sequential and one-shot; do not displace
        // hot blocks from the cache.
        let read_options = ReadOptions { fill_cache: false };
        let mut children: Vec<BoxedIter> = Vec::new();
        for which in 0..2 {
            if compaction.inputs[which].is_empty() {
                continue;
            }
            if compaction.level() + which == 0 {
                for file in &compaction.inputs[0] {
                    children.push(self.table_cache.iter(
                        read_options,
                        file.number,
                        file.file_size,
                    ));
                }
            } else {
                let index =
                    LevelFileNumIter::new(self.icmp.clone(), compaction.inputs[which].clone());
                let table_cache = Arc::clone(&self.table_cache);
                children.push(Box::new(TwoLevelIter::new(
                    Box::new(index),
                    Box::new(move |file_value| {
                        let number = crate::encoding::decode_fixed64(file_value)?;
                        let size = crate::encoding::decode_fixed64(&file_value[8..])?;
                        Ok(table_cache.iter(read_options, number, size))
                    }),
                )));
            }
        }
        MergingIter::new(Arc::new(self.icmp.clone()) as Arc<dyn Comparator>, children)
    }

    fn open_compaction_output(&self, comp: &mut CompactionState) -> Result<TableBuilder> {
        let number = {
            let mut state = self.state.lock();
            let number = state.versions.new_file_number();
            state.pending_outputs.insert(number);
            number
        };
        comp.outputs.push(CompactionOutput {
            number,
            file_size: 0,
            smallest: Vec::new(),
            largest: Vec::new(),
        });
        let file = File::create(table_file_name(&self.db_path, number))?;
        Ok(TableBuilder::new(self.options.clone(), self.icmp.clone(), file))
    }

    fn finish_compaction_output(
        &self,
        comp: &mut CompactionState,
        mut builder: TableBuilder,
    ) -> Result<()> {
        let output = comp.outputs.last_mut().expect("open output");
        let entries = builder.num_entries();
        builder.finish()?;
        output.file_size = builder.file_size();
        comp.total_bytes += output.file_size;

        if entries > 0 {
            // Opening through the cache verifies the footer and index.
            self.table_cache.find_table(output.number, output.file_size)?;
            debug!(
                file = output.number,
                entries,
                bytes = output.file_size,
                "compaction output finished"
            );
        }
        Ok(())
    }

    fn do_compaction_work(
        &self,
        state: &mut MutexGuard<'_, DbState>,
        compaction: &mut Compaction,
    ) -> Result<()> {
        let start = Instant::now();
        info!(
            level = compaction.level(),
            inputs_low = compaction.num_input_files(0),
            inputs_high = compaction.num_input_files(1),
            "compacting"
        );

        let smallest_snapshot = state
            .snapshots
            .oldest()
            .unwrap_or_else(|| state.versions.last_sequence());

        let mut comp = CompactionState {
            smallest_snapshot,
            outputs: Vec::new(),
            builder: None,
            total_bytes: 0,
        };

        let merge_result = MutexGuard::unlocked(state, || {
            self.compaction_merge_loop(compaction, &mut comp)
        });

        // Account stats whatever the outcome.
        let bytes_read: u64 = compaction.inputs[0]
            .iter()
            .chain(compaction.inputs[1].iter())
            .map(|f| f.file_size)
            .sum();
        let level = compaction.level();
        let stats = &mut state.stats[(level + 1).min(NUM_LEVELS - 1)];
        stats.micros += start.elapsed().as_micros() as u64;
        stats.bytes_read += bytes_read;
        stats.bytes_written += comp.total_bytes;

        let result = match merge_result {
            Ok(()) => self.install_compaction_results(state, compaction, &comp),
            Err(e) => Err(e),
        };

        // Outputs are either installed (now live) or garbage; either way
        // they no longer need crash protection.
        for output in &comp.outputs {
            state.pending_outputs.remove(&output.number);
        }

        match &result {
            Ok(()) => info!(
                level,
                outputs = comp.outputs.len(),
                bytes = comp.total_bytes,
                "compaction finished"
            ),
            Err(e) => warn!(level, "compaction failed: {e}"),
        }
        result
    }

    /// The merge itself, run without the engine mutex.
    fn compaction_merge_loop(
        &self,
        compaction: &mut Compaction,
        comp: &mut CompactionState,
    ) -> Result<()> {
        let mut input = self.make_input_iterator(compaction);
        input.seek_to_first();

        let ucmp = Arc::clone(self.icmp.user_comparator());
        let mut current_user_key: Option<Vec<u8>> = None;
        let mut last_sequence_for_key = MAX_SEQUENCE_NUMBER + 1;

        while input.valid() {
            if self.shutting_down.load(AtomicOrdering::Acquire) {
                if let Some(builder) = comp.builder.take() {
                    drop(builder);
                }
                return Err(Error::Io(std::io::Error::other(
                    "deleting database during compaction",
                )));
            }

            // A freshly filled memtable outranks compaction work.
            if self.has_imm.load(AtomicOrdering::Acquire) {
                let mut state = self.state.lock();
                if state.imm.is_some() {
                    if let Err(e) = self.compact_memtable(&mut state) {
                        self.record_background_error(&mut state, e);
                    }
                }
                self.bg_work_finished.notify_all();
            }

            let key = input.key().to_vec();
            if comp.builder.is_some() && compaction.should_stop_before(&key) {
                let builder = comp.builder.take().expect("builder present");
                self.finish_compaction_output(comp, builder)?;
            }

            let mut drop_entry = false;
            match parse_internal_key(&key) {
                Err(_) => {
                    // Keep undecodable entries so corruption stays visible.
                    current_user_key = None;
                    last_sequence_for_key = MAX_SEQUENCE_NUMBER + 1;
                }
                Ok(parsed) => {
                    let first_occurrence = match &current_user_key {
                        None => true,
                        Some(current) => {
                            ucmp.compare(parsed.user_key, current) != std::cmp::Ordering::Equal
                        }
                    };
                    if first_occurrence {
                        current_user_key = Some(parsed.user_key.to_vec());
                        last_sequence_for_key = MAX_SEQUENCE_NUMBER + 1;
                    }

                    if last_sequence_for_key <= comp.smallest_snapshot {
                        // Shadowed by a newer entry that every live
                        // snapshot can already see.
                        drop_entry = true;
                    } else if parsed.value_type == ValueType::Deletion
                        && parsed.sequence <= comp.smallest_snapshot
                        && compaction.is_base_level_for_key(parsed.user_key)
                    {
                        // The tombstone has nothing left to mask.
                        drop_entry = true;
                    }
                    last_sequence_for_key = parsed.sequence;
                }
            }

            if !drop_entry {
                if comp.builder.is_none() {
                    comp.builder = Some(self.open_compaction_output(comp)?);
                }
                let builder = comp.builder.as_mut().expect("builder present");
                if builder.num_entries() == 0 {
                    let output = comp.outputs.last_mut().expect("open output");
                    output.smallest = key.clone();
                }
                let output = comp.outputs.last_mut().expect("open output");
                output.largest = key.clone();
                builder.add(&key, input.value())?;

                if builder.file_size() >= compaction.max_output_file_size() {
                    let builder = comp.builder.take().expect("builder present");
                    self.finish_compaction_output(comp, builder)?;
                }
            }

            input.next();
        }

        if let Some(builder) = comp.builder.take() {
            self.finish_compaction_output(comp, builder)?;
        }
        input.status()
    }

    fn install_compaction_results(
        &self,
        state: &mut MutexGuard<'_, DbState>,
        compaction: &mut Compaction,
        comp: &CompactionState,
    ) -> Result<()> {
        compaction.add_input_deletions();
        let level = compaction.level();
        for output in &comp.outputs {
            let smallest = InternalKey::decode_from(&output.smallest)?;
            let largest = InternalKey::decode_from(&output.largest)?;
            compaction
                .edit
                .add_file(level + 1, output.number, output.file_size, smallest, largest);
        }
        let mut edit = std::mem::take(&mut compaction.edit);
        state.versions.log_and_apply(&mut edit)
    }

    // --------------------------------------------------------------------------------------------
    // Garbage collection
    // --------------------------------------------------------------------------------------------

    /// Remove files no version references.
    fn delete_obsolete_files(&self, state: &mut MutexGuard<'_, DbState>) {
        if state.bg_error.is_some() {
            // After a background error the version state may not match
            // the disk; deleting anything would be guesswork.
            return;
        }
        let mut live = state.versions.live_files();
        live.extend(state.pending_outputs.iter().copied());

        let entries = match fs::read_dir(&self.db_path) {
            Ok(entries) => entries,
            Err(_) => return,
        };
        for entry in entries.flatten() {
            let name = entry.file_name();
            let Some((file_type, number)) = parse_file_name(&name.to_string_lossy()) else {
                continue;
            };
            let keep = match file_type {
                FileType::Log => {
                    number >= state.versions.log_number()
                        || number == state.versions.prev_log_number()
                }
                FileType::Manifest => number >= state.versions.manifest_file_number(),
                FileType::Table | FileType::Temp => live.contains(&number),
                FileType::Current | FileType::Lock => true,
            };
            if !keep {
                if file_type == FileType::Table {
                    self.table_cache.evict(number);
                }
                debug!(file = %name.to_string_lossy(), "deleting obsolete file");
                let _ = fs::remove_file(entry.path());
            }
        }
    }
}

// ------------------------------------------------------------------------------------------------
// Table construction shared by flush and recovery
// ------------------------------------------------------------------------------------------------

/// Drain `iter` into table file `file_number`.
///
/// Returns `None` (and removes the file) when the iterator was empty,
/// otherwise `(file_size, smallest, largest)`.
fn build_table_file(
    db_path: &Path,
    options: &Options,
    icmp: &InternalKeyComparator,
    table_cache: &Arc<TableCache>,
    file_number: u64,
    iter: &mut dyn Iter,
) -> Result<Option<(u64, InternalKey, InternalKey)>> {
    let path = table_file_name(db_path, file_number);
    iter.seek_to_first();
    if !iter.valid() {
        return Ok(None);
    }

    let build = (|| -> Result<(u64, InternalKey, InternalKey)> {
        let file = File::create(&path)?;
        let mut builder = TableBuilder::new(options.clone(), icmp.clone(), file);
        let smallest = InternalKey::decode_from(iter.key())?;
        let mut largest_raw = Vec::new();
        while iter.valid() {
            largest_raw.clear();
            largest_raw.extend_from_slice(iter.key());
            builder.add(iter.key(), iter.value())?;
            iter.next();
        }
        iter.status()?;
        builder.finish()?;
        let largest = InternalKey::decode_from(&largest_raw)?;

        // Opening through the cache validates what was just written.
        table_cache.find_table(file_number, builder.file_size())?;
        Ok((builder.file_size(), smallest, largest))
    })();

    match build {
        Ok(result) => Ok(Some(result)),
        Err(e) => {
            let _ = fs::remove_file(&path);
            Err(e)
        }
    }
}

// ------------------------------------------------------------------------------------------------
// Destroy
// ------------------------------------------------------------------------------------------------

/// Delete the database at `path` entirely.
///
/// Missing directories are not an error; listing failures are masked
/// for backwards compatibility.
pub fn destroy(path: impl AsRef<Path>) -> Result<()> {
    let db_path = path.as_ref();
    let entries = match fs::read_dir(db_path) {
        Ok(entries) => entries,
        Err(_) => return Ok(()),
    };

    let lock_path = lock_file_name(db_path);
    let lock = FileLock::lock(&lock_path)?;
    let mut result: Result<()> = Ok(());
    for entry in entries.flatten() {
        let name = entry.file_name();
        let Some((file_type, _)) = parse_file_name(&name.to_string_lossy()) else {
            continue;
        };
        if file_type == FileType::Lock {
            continue;
        }
        if let Err(e) = fs::remove_file(entry.path()) {
            if result.is_ok() {
                result = Err(e.into());
            }
        }
    }
    drop(lock);
    let _ = fs::remove_file(&lock_path);
    let _ = fs::remove_dir(db_path);
    result
}
