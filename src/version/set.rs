//! The version set: the database's durable metadata authority.
//!
//! Owns the current [`Version`], the file-number allocator, the last
//! sequence number, and the manifest log. Every state change goes
//! through [`VersionSet::log_and_apply`]: the edit is folded into a new
//! version by a [`Builder`], appended to the manifest, fsynced, and —
//! when the manifest was freshly created — `CURRENT` is atomically
//! repointed.
//!
//! On open, [`VersionSet::recover`] replays the manifest named by
//! `CURRENT` into an initial version. The manifest is always rolled on
//! open: the first `log_and_apply` writes a snapshot of the recovered
//! state into a fresh `MANIFEST-NNNNNN` and swings `CURRENT` to it,
//! keeping recovery time proportional to the live file count rather
//! than the database's history.

use std::cmp::Ordering;
use std::collections::HashSet;
use std::fs::{self, File, OpenOptions};
use std::path::PathBuf;
use std::sync::{Arc, Weak};

use tracing::{info, warn};

use crate::cache::table_cache::TableCache;
use crate::compaction::Compaction;
use crate::error::{Error, Result};
use crate::filename::{current_file_name, manifest_file_name, set_current_file};
use crate::keys::{Comparator, InternalKey, InternalKeyComparator, SequenceNumber};
use crate::options::Options;
use crate::wal::{LogReader, LogWriter};

use super::edit::{FileMetaData, VersionEdit};
use super::{max_bytes_for_level, total_file_size, Version, L0_COMPACTION_TRIGGER, NUM_LEVELS};

/// Owner of the version history and the manifest log.
pub struct VersionSet {
    db_path: PathBuf,
    options: Options,
    icmp: InternalKeyComparator,
    table_cache: Arc<TableCache>,

    next_file_number: u64,
    manifest_file_number: u64,
    last_sequence: SequenceNumber,
    /// WAL segment backing the mutable memtable.
    log_number: u64,
    /// WAL segment of the immutable memtable (0 when none).
    prev_log_number: u64,

    current: Arc<Version>,
    /// Every version still referenced somewhere; pruned lazily. Used to
    /// keep files alive until the last referencing version drops.
    live_versions: Vec<Weak<Version>>,

    /// Per-level cursor where the next size compaction starts
    /// (encoded internal key; empty = start of level).
    compact_pointer: Vec<Vec<u8>>,

    manifest_log: Option<LogWriter>,
}

impl VersionSet {
    /// A version set over an empty initial version.
    pub fn new(
        db_path: PathBuf,
        options: Options,
        icmp: InternalKeyComparator,
        table_cache: Arc<TableCache>,
    ) -> Self {
        VersionSet {
            db_path,
            options,
            icmp: icmp.clone(),
            table_cache: Arc::clone(&table_cache),
            next_file_number: 2,
            manifest_file_number: 0,
            last_sequence: 0,
            log_number: 0,
            prev_log_number: 0,
            current: Arc::new(Version::new(icmp, table_cache)),
            live_versions: Vec::new(),
            compact_pointer: vec![Vec::new(); NUM_LEVELS],
            manifest_log: None,
        }
    }

    // --------------------------------------------------------------------------------------------
    // Accessors
    // --------------------------------------------------------------------------------------------

    /// The active version.
    pub fn current(&self) -> &Arc<Version> {
        &self.current
    }

    /// Highest sequence number ever assigned.
    pub fn last_sequence(&self) -> SequenceNumber {
        self.last_sequence
    }

    /// Publish a new last sequence (monotone).
    pub fn set_last_sequence(&mut self, seq: SequenceNumber) {
        debug_assert!(seq >= self.last_sequence);
        self.last_sequence = seq;
    }

    /// WAL segment number of the mutable memtable.
    pub fn log_number(&self) -> u64 {
        self.log_number
    }

    /// WAL segment number of the immutable memtable (0 when none).
    pub fn prev_log_number(&self) -> u64 {
        self.prev_log_number
    }

    /// Number the next manifest file will use.
    pub fn manifest_file_number(&self) -> u64 {
        self.manifest_file_number
    }

    /// Allocate a fresh file number.
    pub fn new_file_number(&mut self) -> u64 {
        let n = self.next_file_number;
        self.next_file_number += 1;
        n
    }

    /// Return an allocated-but-unused number to the pool.
    pub fn reuse_file_number(&mut self, number: u64) {
        if number + 1 == self.next_file_number {
            self.next_file_number = number;
        }
    }

    /// Make sure the allocator never hands out `number` again.
    pub fn mark_file_number_used(&mut self, number: u64) {
        if self.next_file_number <= number {
            self.next_file_number = number + 1;
        }
    }

    /// File count at `level` in the current version.
    pub fn num_level_files(&self, level: usize) -> usize {
        self.current.num_files(level)
    }

    /// Total bytes at `level` in the current version.
    pub fn num_level_bytes(&self, level: usize) -> u64 {
        total_file_size(&self.current.files[level])
    }

    /// True when a size- or seek-triggered compaction is pending.
    pub fn needs_compaction(&self) -> bool {
        self.current.compaction_score >= 1.0 || self.current.file_to_compact().is_some()
    }

    /// File numbers referenced by any still-live version.
    pub fn live_files(&mut self) -> HashSet<u64> {
        let mut live = HashSet::new();
        self.live_versions.retain(|weak| {
            if let Some(version) = weak.upgrade() {
                for level in &version.files {
                    for file in level {
                        live.insert(file.number);
                    }
                }
                true
            } else {
                false
            }
        });
        for level in &self.current.files {
            for file in level {
                live.insert(file.number);
            }
        }
        live
    }

    // --------------------------------------------------------------------------------------------
    // Recovery
    // --------------------------------------------------------------------------------------------

    /// Replay the manifest named by `CURRENT` into the initial version.
    pub fn recover(&mut self) -> Result<()> {
        let current_contents = fs::read_to_string(current_file_name(&self.db_path))?;
        if current_contents.is_empty() || !current_contents.ends_with('\n') {
            return Err(Error::corruption("CURRENT file is malformed"));
        }
        let manifest_name = current_contents.trim_end();
        let manifest_path = self.db_path.join(manifest_name);
        info!(manifest = %manifest_path.display(), "recovering version state");

        let file = File::open(&manifest_path).map_err(|e| {
            Error::corruption(format!(
                "CURRENT points to missing manifest {manifest_name}: {e}"
            ))
        })?;

        let mut reader = LogReader::new(file);
        let mut builder = Builder::new(self.icmp.clone(), Arc::clone(&self.current));

        let mut log_number = None;
        let mut prev_log_number = None;
        let mut next_file_number = None;
        let mut last_sequence = None;

        while let Some(record) = reader.read_record()? {
            let edit = VersionEdit::decode_from(&record)?;
            if let Some(name) = &edit.comparator_name {
                let expected = self.icmp.user_comparator().name();
                if name != expected {
                    return Err(Error::invalid_argument(format!(
                        "comparator mismatch: database uses {name}, options supply {expected}"
                    )));
                }
            }
            builder.apply(&edit, &mut self.compact_pointer);
            if let Some(n) = edit.log_number {
                log_number = Some(n);
            }
            if let Some(n) = edit.prev_log_number {
                prev_log_number = Some(n);
            }
            if let Some(n) = edit.next_file_number {
                next_file_number = Some(n);
            }
            if let Some(n) = edit.last_sequence {
                last_sequence = Some(n);
            }
        }

        let next_file_number =
            next_file_number.ok_or_else(|| Error::corruption("manifest has no next-file entry"))?;
        let log_number =
            log_number.ok_or_else(|| Error::corruption("manifest has no log-number entry"))?;
        let last_sequence =
            last_sequence.ok_or_else(|| Error::corruption("manifest has no last-sequence entry"))?;
        let prev_log_number = prev_log_number.unwrap_or(0);

        self.next_file_number = next_file_number;
        self.mark_file_number_used(log_number);
        self.mark_file_number_used(prev_log_number);
        self.last_sequence = last_sequence;
        self.log_number = log_number;
        self.prev_log_number = prev_log_number;

        let mut version = Version::new(self.icmp.clone(), Arc::clone(&self.table_cache));
        builder.save_to(&mut version)?;
        Self::finalize(&mut version);
        self.install_version(version);

        // Roll the manifest on the next log_and_apply.
        self.manifest_file_number = self.new_file_number();
        self.manifest_log = None;
        Ok(())
    }

    // --------------------------------------------------------------------------------------------
    // Applying edits
    // --------------------------------------------------------------------------------------------

    /// Fold `edit` into a new current version and persist it.
    pub fn log_and_apply(&mut self, edit: &mut VersionEdit) -> Result<()> {
        match edit.log_number {
            Some(n) => debug_assert!(n >= self.log_number && n < self.next_file_number),
            None => edit.set_log_number(self.log_number),
        }
        if edit.prev_log_number.is_none() {
            edit.set_prev_log_number(self.prev_log_number);
        }
        edit.set_next_file_number(self.next_file_number);
        edit.set_last_sequence(self.last_sequence);

        let mut version = Version::new(self.icmp.clone(), Arc::clone(&self.table_cache));
        {
            let mut builder = Builder::new(self.icmp.clone(), Arc::clone(&self.current));
            builder.apply(edit, &mut self.compact_pointer);
            builder.save_to(&mut version)?;
        }
        Self::finalize(&mut version);

        let created_manifest = self.manifest_log.is_none();
        if created_manifest {
            let path = manifest_file_name(&self.db_path, self.manifest_file_number);
            let file = OpenOptions::new()
                .create_new(true)
                .write(true)
                .open(&path)?;
            let mut log = LogWriter::new(file);
            if let Err(e) = self.write_snapshot(&mut log) {
                drop(log);
                let _ = fs::remove_file(&path);
                return Err(e);
            }
            self.manifest_log = Some(log);
            info!(manifest = %path.display(), "rolled new manifest");
        }

        let write_result = (|| -> Result<()> {
            let log = self
                .manifest_log
                .as_mut()
                .ok_or_else(|| Error::corruption("manifest log missing"))?;
            let mut record = Vec::new();
            edit.encode_to(&mut record);
            log.add_record(&record)?;
            log.sync()?;
            Ok(())
        })();

        if let Err(e) = write_result {
            warn!("manifest write failed: {e}");
            if created_manifest {
                self.manifest_log = None;
                let _ = fs::remove_file(manifest_file_name(&self.db_path, self.manifest_file_number));
            }
            return Err(e);
        }

        if created_manifest {
            set_current_file(&self.db_path, self.manifest_file_number)?;
        }

        self.install_version(version);
        self.log_number = edit.log_number.unwrap_or(self.log_number);
        self.prev_log_number = edit.prev_log_number.unwrap_or(self.prev_log_number);
        Ok(())
    }

    fn install_version(&mut self, version: Version) {
        let version = Arc::new(version);
        self.live_versions.push(Arc::downgrade(&version));
        self.current = version;
    }

    /// Write the complete current state as one edit (the first record
    /// of a fresh manifest).
    fn write_snapshot(&mut self, log: &mut LogWriter) -> Result<()> {
        let mut edit = VersionEdit::new();
        edit.set_comparator_name(self.icmp.user_comparator().name());
        for (level, pointer) in self.compact_pointer.iter().enumerate() {
            if !pointer.is_empty() {
                edit.set_compact_pointer(level, InternalKey::decode_from(pointer)?);
            }
        }
        for (level, files) in self.current.files.iter().enumerate() {
            for file in files {
                edit.add_file(
                    level,
                    file.number,
                    file.file_size,
                    file.smallest.clone(),
                    file.largest.clone(),
                );
            }
        }
        edit.set_log_number(self.log_number);
        edit.set_prev_log_number(self.prev_log_number);
        edit.set_next_file_number(self.next_file_number);
        edit.set_last_sequence(self.last_sequence);

        let mut record = Vec::new();
        edit.encode_to(&mut record);
        log.add_record(&record)?;
        Ok(())
    }

    /// Compute the size-based compaction score for `version`.
    fn finalize(version: &mut Version) {
        let mut best_level = 0;
        let mut best_score = -1.0f64;
        for level in 0..NUM_LEVELS - 1 {
            let score = if level == 0 {
                // File count, not bytes: every level-0 file widens every
                // read, and freshly flushed data deserves small merges.
                version.files[0].len() as f64 / L0_COMPACTION_TRIGGER as f64
            } else {
                total_file_size(&version.files[level]) as f64 / max_bytes_for_level(level)
            };
            if score > best_score {
                best_score = score;
                best_level = level;
            }
        }
        version.compaction_level = best_level;
        version.compaction_score = best_score;
    }

    // --------------------------------------------------------------------------------------------
    // Size estimation
    // --------------------------------------------------------------------------------------------

    /// Approximate byte offset of `ikey` within the keyspace of
    /// `version`, counting whole files before it plus a within-file
    /// estimate for the file containing it.
    pub fn approximate_offset_of(&self, version: &Arc<Version>, ikey: &InternalKey) -> u64 {
        let mut result = 0;
        for (level, files) in version.files.iter().enumerate() {
            for file in files {
                if self.icmp.compare(file.largest.encoded(), ikey.encoded()) != Ordering::Greater {
                    result += file.file_size;
                } else if self.icmp.compare(file.smallest.encoded(), ikey.encoded())
                    == Ordering::Greater
                {
                    // Strictly after ikey. Deeper levels are sorted, so
                    // nothing later in this level counts either.
                    if level > 0 {
                        break;
                    }
                } else {
                    result += self.table_cache.approximate_offset_of(
                        file.number,
                        file.file_size,
                        ikey.encoded(),
                    );
                }
            }
        }
        result
    }

    // --------------------------------------------------------------------------------------------
    // Compaction picking
    // --------------------------------------------------------------------------------------------

    /// Choose the next compaction, preferring size-triggered work over
    /// seek-triggered work. `None` when the tree is in shape.
    pub fn pick_compaction(&mut self) -> Option<Compaction> {
        let size_compaction = self.current.compaction_score >= 1.0;
        let seek_compaction = self.current.file_to_compact();

        let mut compaction;
        if size_compaction {
            let level = self.current.compaction_level;
            debug_assert!(level + 1 < NUM_LEVELS);
            compaction = Compaction::new(
                &self.options,
                self.icmp.clone(),
                level,
                Arc::clone(&self.current),
            );
            // Resume after the key where the previous compaction at
            // this level stopped; wrap to the start when exhausted.
            for file in &self.current.files[level] {
                if self.compact_pointer[level].is_empty()
                    || self
                        .icmp
                        .compare(file.largest.encoded(), &self.compact_pointer[level])
                        == Ordering::Greater
                {
                    compaction.inputs[0].push(Arc::clone(file));
                    break;
                }
            }
            if compaction.inputs[0].is_empty() {
                if let Some(file) = self.current.files[level].first() {
                    compaction.inputs[0].push(Arc::clone(file));
                }
            }
        } else if let Some((level, file)) = seek_compaction {
            compaction = Compaction::new(
                &self.options,
                self.icmp.clone(),
                level,
                Arc::clone(&self.current),
            );
            compaction.inputs[0].push(file);
        } else {
            return None;
        }

        if compaction.inputs[0].is_empty() {
            return None;
        }

        // Level-0 inputs may overlap each other; widen to the closure.
        if compaction.level() == 0 {
            let smallest = compaction.inputs[0]
                .iter()
                .map(|f| f.smallest.clone())
                .min_by(|a, b| self.icmp.compare_keys(a, b))?;
            let largest = compaction.inputs[0]
                .iter()
                .map(|f| f.largest.clone())
                .max_by(|a, b| self.icmp.compare_keys(a, b))?;
            compaction.inputs[0] =
                self.current
                    .get_overlapping_inputs(0, Some(&smallest), Some(&largest));
            debug_assert!(!compaction.inputs[0].is_empty());
        }

        self.setup_other_inputs(&mut compaction);
        Some(compaction)
    }

    /// Manual compaction of `[begin, end]` at `level`; `None` when the
    /// range holds no files.
    pub fn compact_range(
        &mut self,
        level: usize,
        begin: Option<&InternalKey>,
        end: Option<&InternalKey>,
    ) -> Option<Compaction> {
        let mut inputs = self.current.get_overlapping_inputs(level, begin, end);
        if inputs.is_empty() {
            return None;
        }

        // Deeper levels hold disjoint files; avoid one enormous manual
        // compaction by trimming the input list at the per-file target.
        if level > 0 {
            let limit = self.options.max_file_size as u64;
            let mut total = 0;
            for i in 0..inputs.len() {
                total += inputs[i].file_size;
                if total >= limit {
                    inputs.truncate(i + 1);
                    break;
                }
            }
        }

        let mut compaction = Compaction::new(
            &self.options,
            self.icmp.clone(),
            level,
            Arc::clone(&self.current),
        );
        compaction.inputs[0] = inputs;
        self.setup_other_inputs(&mut compaction);
        Some(compaction)
    }

    fn setup_other_inputs(&mut self, compaction: &mut Compaction) {
        let level = compaction.level();

        add_boundary_inputs(
            &self.icmp,
            &self.current.files[level],
            &mut compaction.inputs[0],
        );
        let (smallest, mut largest) = self.key_range(&compaction.inputs[0]);

        compaction.inputs[1] =
            self.current
                .get_overlapping_inputs(level + 1, Some(&smallest), Some(&largest));
        add_boundary_inputs(
            &self.icmp,
            &self.current.files[level + 1],
            &mut compaction.inputs[1],
        );

        let (mut all_start, mut all_limit) =
            self.key_range_2(&compaction.inputs[0], &compaction.inputs[1]);

        // Try to grow the level-L side without pulling in more level-L+1
        // files, as long as the expanded total stays reasonable.
        if !compaction.inputs[1].is_empty() {
            let mut expanded0 =
                self.current
                    .get_overlapping_inputs(level, Some(&all_start), Some(&all_limit));
            add_boundary_inputs(&self.icmp, &self.current.files[level], &mut expanded0);
            let inputs0_size = total_file_size(&compaction.inputs[0]);
            let inputs1_size = total_file_size(&compaction.inputs[1]);
            let expanded0_size = total_file_size(&expanded0);
            if expanded0.len() > compaction.inputs[0].len()
                && inputs1_size + expanded0_size < compaction.expanded_size_limit()
            {
                let (new_start, new_limit) = self.key_range(&expanded0);
                let mut expanded1 = self.current.get_overlapping_inputs(
                    level + 1,
                    Some(&new_start),
                    Some(&new_limit),
                );
                add_boundary_inputs(&self.icmp, &self.current.files[level + 1], &mut expanded1);
                if expanded1.len() == compaction.inputs[1].len() {
                    info!(
                        level,
                        files_before = compaction.inputs[0].len(),
                        files_after = expanded0.len(),
                        bytes_before = inputs0_size,
                        bytes_after = expanded0_size,
                        "expanding compaction inputs"
                    );
                    largest = new_limit;
                    compaction.inputs[0] = expanded0;
                    compaction.inputs[1] = expanded1;
                    let (s, l) = self.key_range_2(&compaction.inputs[0], &compaction.inputs[1]);
                    all_start = s;
                    all_limit = l;
                }
            }
        }

        // Grandparents bound output-file growth during the merge.
        if level + 2 < NUM_LEVELS {
            compaction.grandparents = self.current.get_overlapping_inputs(
                level + 2,
                Some(&all_start),
                Some(&all_limit),
            );
        }

        // Future size compactions at this level resume past this range,
        // recorded both in memory and in the edit so a crash before the
        // compaction commits still advances the cursor.
        self.compact_pointer[level] = largest.encoded().to_vec();
        compaction.edit.set_compact_pointer(level, largest);
    }

    fn key_range(&self, files: &[Arc<FileMetaData>]) -> (InternalKey, InternalKey) {
        let mut smallest = InternalKey::default();
        let mut largest = InternalKey::default();
        for (i, file) in files.iter().enumerate() {
            if i == 0 {
                smallest = file.smallest.clone();
                largest = file.largest.clone();
            } else {
                if self.icmp.compare_keys(&file.smallest, &smallest) == Ordering::Less {
                    smallest = file.smallest.clone();
                }
                if self.icmp.compare_keys(&file.largest, &largest) == Ordering::Greater {
                    largest = file.largest.clone();
                }
            }
        }
        (smallest, largest)
    }

    fn key_range_2(
        &self,
        a: &[Arc<FileMetaData>],
        b: &[Arc<FileMetaData>],
    ) -> (InternalKey, InternalKey) {
        let all: Vec<Arc<FileMetaData>> = a.iter().chain(b.iter()).cloned().collect();
        self.key_range(&all)
    }
}

/// Extend `compaction_files` with boundary files from `level_files`:
/// files whose smallest key carries the same user key as the current
/// largest key but an older sequence. Leaving such a file behind would
/// let a later read see a stale version of that user key.
fn add_boundary_inputs(
    icmp: &InternalKeyComparator,
    level_files: &[Arc<FileMetaData>],
    compaction_files: &mut Vec<Arc<FileMetaData>>,
) {
    let Some(mut largest_key) = compaction_files
        .iter()
        .map(|f| f.largest.clone())
        .max_by(|a, b| icmp.compare_keys(a, b))
    else {
        return;
    };

    loop {
        let boundary = find_smallest_boundary_file(icmp, level_files, &largest_key);
        match boundary {
            Some(file) => {
                largest_key = file.largest.clone();
                compaction_files.push(file);
            }
            None => break,
        }
    }
}

/// The file with the smallest `smallest` key such that
/// `user_key(smallest) == user_key(largest_key)` and
/// `smallest > largest_key` in internal order.
fn find_smallest_boundary_file(
    icmp: &InternalKeyComparator,
    level_files: &[Arc<FileMetaData>],
    largest_key: &InternalKey,
) -> Option<Arc<FileMetaData>> {
    let ucmp = icmp.user_comparator();
    let mut smallest_boundary: Option<Arc<FileMetaData>> = None;
    for file in level_files {
        if icmp.compare_keys(&file.smallest, largest_key) == Ordering::Greater
            && ucmp.compare(file.smallest.user_key(), largest_key.user_key()) == Ordering::Equal
        {
            match &smallest_boundary {
                None => smallest_boundary = Some(Arc::clone(file)),
                Some(best) => {
                    if icmp.compare_keys(&file.smallest, &best.smallest) == Ordering::Less {
                        smallest_boundary = Some(Arc::clone(file));
                    }
                }
            }
        }
    }
    smallest_boundary
}

// ------------------------------------------------------------------------------------------------
// Builder
// ------------------------------------------------------------------------------------------------

struct LevelState {
    deleted: HashSet<u64>,
    added: Vec<Arc<FileMetaData>>,
}

/// Folds edits over a base version to produce the next version.
pub struct Builder {
    icmp: InternalKeyComparator,
    base: Arc<Version>,
    levels: Vec<LevelState>,
}

impl Builder {
    /// Start from `base`.
    pub fn new(icmp: InternalKeyComparator, base: Arc<Version>) -> Self {
        Builder {
            icmp,
            base,
            levels: (0..NUM_LEVELS)
                .map(|_| LevelState {
                    deleted: HashSet::new(),
                    added: Vec::new(),
                })
                .collect(),
        }
    }

    /// Fold one edit in, updating the set's compaction cursors.
    pub fn apply(&mut self, edit: &VersionEdit, compact_pointer: &mut [Vec<u8>]) {
        for (level, key) in &edit.compact_pointers {
            compact_pointer[*level] = key.encoded().to_vec();
        }
        for (level, number) in &edit.deleted_files {
            self.levels[*level].deleted.insert(*number);
        }
        for (level, file) in &edit.new_files {
            self.levels[*level].deleted.remove(&file.number);
            self.levels[*level].added.push(Arc::new(file.clone()));
        }
    }

    /// Materialize the result into `version`.
    ///
    /// Files surviving from the base and files added by edits are
    /// merged in smallest-key order; the level-≥1 disjointness
    /// invariant is verified and a violation reported as corruption.
    pub fn save_to(&mut self, version: &mut Version) -> Result<()> {
        for level in 0..NUM_LEVELS {
            let state = &mut self.levels[level];
            let mut files: Vec<Arc<FileMetaData>> = Vec::with_capacity(
                self.base.files[level].len() + state.added.len(),
            );
            files.extend(
                self.base.files[level]
                    .iter()
                    .filter(|f| !state.deleted.contains(&f.number))
                    .cloned(),
            );
            files.extend(state.added.drain(..));

            if level == 0 {
                // Newest first, matching read precedence.
                files.sort_by(|a, b| b.number.cmp(&a.number));
            } else {
                files.sort_by(|a, b| self.icmp.compare_keys(&a.smallest, &b.smallest));
                for pair in files.windows(2) {
                    if self
                        .icmp
                        .compare_keys(&pair[0].largest, &pair[1].smallest)
                        != Ordering::Less
                    {
                        return Err(Error::corruption(format!(
                            "overlapping files {} and {} at level {level}",
                            pair[0].number, pair[1].number
                        )));
                    }
                }
            }
            version.files[level] = files;
        }
        Ok(())
    }
}
