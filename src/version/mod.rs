//! Versions: immutable snapshots of the file layout.
//!
//! A [`Version`] assigns every live table file to a level. Level 0
//! files may overlap each other (each is a flushed memtable); levels 1
//! and up hold files with pairwise-disjoint key ranges sorted by
//! smallest key — the invariant that makes a point lookup touch at most
//! one file per level.
//!
//! Versions are immutable and reference-counted (`Arc`). The engine's
//! current version advances by applying a [`VersionEdit`]; readers,
//! iterators, and in-flight compactions keep their version alive for as
//! long as they need it. The [`VersionSet`](set::VersionSet) tracks all
//! still-referenced versions so obsolete files are only deleted once no
//! version mentions them.
//!
//! Read-path bookkeeping lives here too: every lookup that probes more
//! than one file charges a *seek* to the first file probed, and a file
//! whose seek budget runs out becomes a compaction candidate.

#[cfg(test)]
mod tests;

pub mod edit;
pub mod set;

use std::cmp::Ordering;
use std::sync::Arc;

use parking_lot::Mutex;
use tracing::trace;

use crate::cache::table_cache::TableCache;
use crate::encoding::{decode_fixed64, put_fixed64};
use crate::error::Result;
use crate::iterator::{BoxedIter, Iter, TwoLevelIter};
use crate::keys::{
    parse_internal_key, Comparator, InternalKey, InternalKeyComparator, LookupKey, ValueType,
};
use crate::options::{Options, ReadOptions};

pub use edit::{FileMetaData, VersionEdit};
pub use set::VersionSet;

/// Number of levels in the tree.
pub const NUM_LEVELS: usize = 7;

/// Level-0 file count that triggers a size compaction.
pub const L0_COMPACTION_TRIGGER: usize = 4;

/// Level-0 file count at which writes are briefly delayed.
pub const L0_SLOWDOWN_WRITES_TRIGGER: usize = 8;

/// Level-0 file count at which writes stop until compaction catches up.
pub const L0_STOP_WRITES_TRIGGER: usize = 12;

/// Highest level a fresh memtable flush may be pushed to when nothing
/// overlaps it.
pub const MAX_MEM_COMPACT_LEVEL: usize = 2;

/// Bytes of reads between iterator sampling probes.
pub const READ_BYTES_PERIOD: u64 = 1024 * 1024;

// ------------------------------------------------------------------------------------------------
// Level geometry
// ------------------------------------------------------------------------------------------------

/// Size budget for `level`; the compaction score is the level's byte
/// count divided by this.
pub fn max_bytes_for_level(level: usize) -> f64 {
    let mut result = 10.0 * 1048576.0;
    for _ in 0..level {
        result *= 10.0;
    }
    result
}

/// A compaction output stops growing into its grandparent level once it
/// overlaps this many bytes there.
pub fn max_grandparent_overlap_bytes(options: &Options) -> u64 {
    10 * options.max_file_size as u64
}

/// Cap on total level-L bytes when re-expanding compaction inputs.
pub fn expanded_compaction_byte_size_limit(options: &Options) -> u64 {
    25 * options.max_file_size as u64
}

/// Sum of file sizes.
pub fn total_file_size(files: &[Arc<FileMetaData>]) -> u64 {
    files.iter().map(|f| f.file_size).sum()
}

/// Index of the first file in sorted, disjoint `files` whose largest
/// key is ≥ `ikey` (i.e. the only file that may contain it).
pub fn find_file(icmp: &InternalKeyComparator, files: &[Arc<FileMetaData>], ikey: &[u8]) -> usize {
    files.partition_point(|f| {
        icmp.compare(f.largest.encoded(), ikey) == Ordering::Less
    })
}

fn after_file(icmp: &InternalKeyComparator, user_key: Option<&[u8]>, file: &FileMetaData) -> bool {
    match user_key {
        None => false,
        Some(key) => {
            icmp.user_comparator()
                .compare(key, file.largest.user_key())
                == Ordering::Greater
        }
    }
}

fn before_file(icmp: &InternalKeyComparator, user_key: Option<&[u8]>, file: &FileMetaData) -> bool {
    match user_key {
        None => false,
        Some(key) => {
            icmp.user_comparator()
                .compare(key, file.smallest.user_key())
                == Ordering::Less
        }
    }
}

/// Does any file overlap the user-key range `[smallest, largest]`?
/// `None` bounds are unbounded. `disjoint_sorted` declares whether
/// `files` obey the level-≥1 invariant (enabling binary search).
pub fn some_file_overlaps_range(
    icmp: &InternalKeyComparator,
    disjoint_sorted: bool,
    files: &[Arc<FileMetaData>],
    smallest_user: Option<&[u8]>,
    largest_user: Option<&[u8]>,
) -> bool {
    if !disjoint_sorted {
        return files
            .iter()
            .any(|f| !after_file(icmp, smallest_user, f) && !before_file(icmp, largest_user, f));
    }
    let index = match smallest_user {
        None => 0,
        Some(key) => {
            let small = LookupKey::new(key, crate::keys::MAX_SEQUENCE_NUMBER);
            find_file(icmp, files, small.internal_key())
        }
    };
    if index >= files.len() {
        return false;
    }
    !before_file(icmp, largest_user, &files[index])
}

// ------------------------------------------------------------------------------------------------
// Version
// ------------------------------------------------------------------------------------------------

/// Seek-charge bookkeeping returned by the read path.
pub type GetStats = Option<(usize, Arc<FileMetaData>)>;

/// One immutable files-per-level snapshot.
pub struct Version {
    icmp: InternalKeyComparator,
    table_cache: Arc<TableCache>,
    /// Files per level; level 0 sorted newest-first by file number,
    /// deeper levels sorted by smallest key.
    pub files: Vec<Vec<Arc<FileMetaData>>>,
    /// Largest size-based score (set by finalize; ≥ 1 means compact).
    pub compaction_score: f64,
    /// Level the score refers to.
    pub compaction_level: usize,
    /// Seek-triggered compaction candidate.
    file_to_compact: Mutex<Option<(usize, Arc<FileMetaData>)>>,
}

impl Version {
    /// An empty version (used at bootstrap; real versions come from the
    /// version-set builder).
    pub fn new(icmp: InternalKeyComparator, table_cache: Arc<TableCache>) -> Self {
        Version {
            icmp,
            table_cache,
            files: vec![Vec::new(); NUM_LEVELS],
            compaction_score: -1.0,
            compaction_level: 0,
            file_to_compact: Mutex::new(None),
        }
    }

    /// File count at `level`.
    pub fn num_files(&self, level: usize) -> usize {
        self.files[level].len()
    }

    /// The seek-triggered compaction candidate, if any.
    pub fn file_to_compact(&self) -> Option<(usize, Arc<FileMetaData>)> {
        self.file_to_compact.lock().clone()
    }

    /// Files at each level overlapping `user_key`, newest-context
    /// first: all matching level-0 files by descending number, then the
    /// single candidate per deeper level.
    fn for_each_overlapping(
        &self,
        user_key: &[u8],
        ikey: &[u8],
        mut visit: impl FnMut(usize, &Arc<FileMetaData>) -> bool,
    ) {
        let ucmp = self.icmp.user_comparator();

        let mut level0: Vec<&Arc<FileMetaData>> = self.files[0]
            .iter()
            .filter(|f| {
                ucmp.compare(user_key, f.smallest.user_key()) != Ordering::Less
                    && ucmp.compare(user_key, f.largest.user_key()) != Ordering::Greater
            })
            .collect();
        level0.sort_by(|a, b| b.number.cmp(&a.number));
        for file in level0 {
            if !visit(0, file) {
                return;
            }
        }

        for level in 1..NUM_LEVELS {
            let files = &self.files[level];
            if files.is_empty() {
                continue;
            }
            let index = find_file(&self.icmp, files, ikey);
            if index >= files.len() {
                continue;
            }
            let file = &files[index];
            if ucmp.compare(user_key, file.smallest.user_key()) != Ordering::Less {
                if !visit(level, file) {
                    return;
                }
            }
        }
    }

    /// Point lookup through the level stack.
    ///
    /// Returns the value, `None` for a missing or deleted key, and the
    /// seek-charge stats the engine applies under its mutex.
    pub fn get(
        &self,
        read_options: ReadOptions,
        key: &LookupKey,
    ) -> Result<(Option<Vec<u8>>, GetStats)> {
        let ikey = key.internal_key();
        let user_key = key.user_key();
        let ucmp = self.icmp.user_comparator();

        let mut stats: GetStats = None;
        let mut first_probed: Option<(usize, Arc<FileMetaData>)> = None;
        let mut result: Option<Result<Option<Vec<u8>>>> = None;

        self.for_each_overlapping(user_key, ikey, |level, file| {
            // Charge a seek to the first file probed once a second file
            // has to be consulted.
            match &first_probed {
                None => first_probed = Some((level, Arc::clone(file))),
                Some(first) => {
                    if stats.is_none() {
                        stats = Some(first.clone());
                    }
                }
            }

            match self
                .table_cache
                .get(read_options, file.number, file.file_size, ikey)
            {
                Err(e) => {
                    result = Some(Err(e));
                    false
                }
                Ok(None) => true,
                Ok(Some((found_key, value))) => match parse_internal_key(&found_key) {
                    Err(e) => {
                        result = Some(Err(e));
                        false
                    }
                    Ok(parsed) => {
                        if ucmp.compare(parsed.user_key, user_key) != Ordering::Equal {
                            // Nothing for this user key in the file.
                            true
                        } else {
                            match parsed.value_type {
                                ValueType::Value => {
                                    result = Some(Ok(Some(value)));
                                    false
                                }
                                ValueType::Deletion => {
                                    result = Some(Ok(None));
                                    false
                                }
                            }
                        }
                    }
                },
            }
        });

        match result {
            Some(Ok(value)) => Ok((value, stats)),
            Some(Err(e)) => Err(e),
            None => Ok((None, stats)),
        }
    }

    /// Apply seek charges from a read. Returns true when a file's
    /// budget ran out and a compaction should be scheduled.
    pub fn update_stats(&self, stats: GetStats) -> bool {
        if let Some((level, file)) = stats {
            if file.consume_seek() {
                let mut candidate = self.file_to_compact.lock();
                if candidate.is_none() {
                    trace!(file = file.number, level, "seek budget exhausted");
                    *candidate = Some((level, file));
                    return true;
                }
            }
        }
        false
    }

    /// Account one sampled read during iteration: if more than one file
    /// overlaps the sampled key, charge a seek to the first.
    pub fn record_read_sample(&self, internal_key: &[u8]) -> bool {
        let Ok(parsed) = parse_internal_key(internal_key) else {
            return false;
        };
        let mut matches = 0;
        let mut first: Option<(usize, Arc<FileMetaData>)> = None;
        self.for_each_overlapping(parsed.user_key, internal_key, |level, file| {
            matches += 1;
            if matches == 1 {
                first = Some((level, Arc::clone(file)));
            }
            matches < 2
        });
        if matches >= 2 {
            return self.update_stats(first);
        }
        false
    }

    /// Does `level` contain any file overlapping the user-key range?
    pub fn overlap_in_level(
        &self,
        level: usize,
        smallest_user: Option<&[u8]>,
        largest_user: Option<&[u8]>,
    ) -> bool {
        some_file_overlaps_range(
            &self.icmp,
            level > 0,
            &self.files[level],
            smallest_user,
            largest_user,
        )
    }

    /// Level where a fresh memtable flush covering `[smallest, largest]`
    /// should land: 0 if it overlaps level 0, otherwise pushed down up
    /// to [`MAX_MEM_COMPACT_LEVEL`] while it stays disjoint and the
    /// grandparent overlap remains small.
    pub fn pick_level_for_memtable_output(
        &self,
        options: &Options,
        smallest_user: &[u8],
        largest_user: &[u8],
    ) -> usize {
        if self.overlap_in_level(0, Some(smallest_user), Some(largest_user)) {
            return 0;
        }
        let start = InternalKey::new(
            smallest_user,
            crate::keys::MAX_SEQUENCE_NUMBER,
            crate::keys::VALUE_TYPE_FOR_SEEK,
        );
        let limit = InternalKey::new(largest_user, 0, ValueType::Deletion);
        let mut level = 0;
        while level < MAX_MEM_COMPACT_LEVEL {
            if self.overlap_in_level(level + 1, Some(smallest_user), Some(largest_user)) {
                break;
            }
            if level + 2 < NUM_LEVELS {
                let overlaps = self.get_overlapping_inputs(level + 2, Some(&start), Some(&limit));
                if total_file_size(&overlaps) > max_grandparent_overlap_bytes(options) {
                    break;
                }
            }
            level += 1;
        }
        level
    }

    /// All files at `level` overlapping the internal-key range
    /// `[begin, end]` (`None` = unbounded). For level 0 the range is
    /// transitively expanded: an overlapping file widens the search.
    pub fn get_overlapping_inputs(
        &self,
        level: usize,
        begin: Option<&InternalKey>,
        end: Option<&InternalKey>,
    ) -> Vec<Arc<FileMetaData>> {
        let ucmp = self.icmp.user_comparator();
        let mut user_begin = begin.map(|k| k.user_key().to_vec());
        let mut user_end = end.map(|k| k.user_key().to_vec());
        let mut inputs: Vec<Arc<FileMetaData>> = Vec::new();

        let mut i = 0;
        while i < self.files[level].len() {
            let file = Arc::clone(&self.files[level][i]);
            i += 1;
            let file_start = file.smallest.user_key();
            let file_limit = file.largest.user_key();
            if user_begin
                .as_deref()
                .is_some_and(|b| ucmp.compare(file_limit, b) == Ordering::Less)
            {
                continue; // entirely before the range
            }
            if user_end
                .as_deref()
                .is_some_and(|e| ucmp.compare(file_start, e) == Ordering::Greater)
            {
                continue; // entirely after the range
            }
            if level == 0 {
                // Level-0 files overlap each other: grow the range and
                // restart so everything transitively connected is taken.
                let mut widened = false;
                if let Some(b) = &user_begin {
                    if ucmp.compare(file_start, b) == Ordering::Less {
                        user_begin = Some(file_start.to_vec());
                        widened = true;
                    }
                }
                if let Some(e) = &user_end {
                    if ucmp.compare(file_limit, e) == Ordering::Greater {
                        user_end = Some(file_limit.to_vec());
                        widened = true;
                    }
                }
                if widened {
                    inputs.clear();
                    i = 0;
                    continue;
                }
            }
            inputs.push(file);
        }
        inputs
    }

    /// Child cursors for a full-database merge: one per level-0 file,
    /// one concatenating cursor per deeper level.
    pub fn add_iterators(self: &Arc<Self>, read_options: ReadOptions, iters: &mut Vec<BoxedIter>) {
        for file in &self.files[0] {
            iters.push(
                self.table_cache
                    .iter(read_options, file.number, file.file_size),
            );
        }
        for level in 1..NUM_LEVELS {
            if !self.files[level].is_empty() {
                iters.push(self.concat_iter(read_options, level));
            }
        }
    }

    /// Two-level cursor over one disjoint, sorted level.
    pub fn concat_iter(self: &Arc<Self>, read_options: ReadOptions, level: usize) -> BoxedIter {
        let index = LevelFileNumIter::new(self.icmp.clone(), self.files[level].clone());
        let table_cache = Arc::clone(&self.table_cache);
        // Keep the version alive for as long as the cursor exists.
        let version = Arc::clone(self);
        Box::new(TwoLevelIter::new(
            Box::new(index),
            Box::new(move |file_value| {
                let _pin = &version;
                let number = decode_fixed64(file_value)?;
                let size = decode_fixed64(&file_value[8..])?;
                Ok(table_cache.iter(read_options, number, size))
            }),
        ))
    }

    /// Human-readable per-level file listing (the `sstables` property).
    pub fn debug_string(&self) -> String {
        let mut out = String::new();
        for (level, files) in self.files.iter().enumerate() {
            out.push_str(&format!("--- level {level} ---\n"));
            for f in files {
                out.push_str(&format!(
                    "  {}: {} bytes [{:?} .. {:?}]\n",
                    f.number, f.file_size, f.smallest, f.largest
                ));
            }
        }
        out
    }
}

// ------------------------------------------------------------------------------------------------
// Level file index iterator
// ------------------------------------------------------------------------------------------------

/// Index cursor over the files of one disjoint level: key is the file's
/// largest internal key, value is `fixed64(number) || fixed64(size)`.
pub struct LevelFileNumIter {
    icmp: InternalKeyComparator,
    files: Vec<Arc<FileMetaData>>,
    index: usize,
    value_buf: Vec<u8>,
}

impl LevelFileNumIter {
    /// Cursor over `files`, which must be sorted by smallest key.
    pub fn new(icmp: InternalKeyComparator, files: Vec<Arc<FileMetaData>>) -> Self {
        let index = files.len();
        LevelFileNumIter {
            icmp,
            files,
            index,
            value_buf: Vec::with_capacity(16),
        }
    }

    fn fill_value(&mut self) {
        self.value_buf.clear();
        if self.index < self.files.len() {
            let file = &self.files[self.index];
            put_fixed64(&mut self.value_buf, file.number);
            put_fixed64(&mut self.value_buf, file.file_size);
        }
    }
}

impl Iter for LevelFileNumIter {
    fn valid(&self) -> bool {
        self.index < self.files.len()
    }

    fn seek_to_first(&mut self) {
        self.index = 0;
        self.fill_value();
    }

    fn seek_to_last(&mut self) {
        self.index = self.files.len().saturating_sub(1);
        if self.files.is_empty() {
            self.index = 0;
        }
        self.fill_value();
    }

    fn seek(&mut self, target: &[u8]) {
        self.index = find_file(&self.icmp, &self.files, target);
        self.fill_value();
    }

    fn next(&mut self) {
        debug_assert!(self.valid());
        self.index += 1;
        self.fill_value();
    }

    fn prev(&mut self) {
        debug_assert!(self.valid());
        if self.index == 0 {
            self.index = self.files.len();
        } else {
            self.index -= 1;
        }
        self.fill_value();
    }

    fn key(&self) -> &[u8] {
        debug_assert!(self.valid());
        self.files[self.index].largest.encoded()
    }

    fn value(&self) -> &[u8] {
        debug_assert!(self.valid());
        &self.value_buf
    }

    fn status(&self) -> Result<()> {
        Ok(())
    }
}
