//! Compaction planning.
//!
//! A [`Compaction`] is the immutable plan produced by the version set's
//! picker: which files at level L and L+1 to merge, plus the
//! bookkeeping needed while the merge runs — grandparent files for
//! output rollover, per-level cursors for tombstone elision, and the
//! edit that will delete the inputs once the outputs are installed.
//!
//! The execution of the plan (the actual k-way merge) lives in the
//! engine, which owns the mutex and background-error state.


use std::cmp::Ordering;
use std::sync::Arc;

use crate::keys::{extract_user_key, Comparator, InternalKeyComparator};
use crate::options::Options;
use crate::version::{
    expanded_compaction_byte_size_limit, max_grandparent_overlap_bytes, total_file_size,
    FileMetaData, Version, VersionEdit, NUM_LEVELS,
};

/// A planned merge of level `level` into `level + 1`.
pub struct Compaction {
    level: usize,
    max_output_file_size: u64,
    max_grandparent_overlap: u64,
    expanded_size_limit: u64,
    input_version: Arc<Version>,
    icmp: InternalKeyComparator,
    /// The edit that removes the inputs; outputs are added by the
    /// executor before installation.
    pub edit: VersionEdit,
    /// `inputs[0]` = level-L files, `inputs[1]` = level-(L+1) files.
    pub inputs: [Vec<Arc<FileMetaData>>; 2],
    /// Level-(L+2) files overlapping the output range.
    pub grandparents: Vec<Arc<FileMetaData>>,
    grandparent_index: usize,
    seen_key: bool,
    /// Bytes of grandparent overlap accumulated for the current output.
    overlapped_bytes: u64,
    /// Per-level scan cursors for `is_base_level_for_key`.
    level_ptrs: [usize; NUM_LEVELS],
}

impl Compaction {
    /// A plan skeleton; the picker fills `inputs` and `grandparents`.
    pub fn new(
        options: &Options,
        icmp: InternalKeyComparator,
        level: usize,
        input_version: Arc<Version>,
    ) -> Self {
        Compaction {
            level,
            max_output_file_size: options.max_file_size as u64,
            max_grandparent_overlap: max_grandparent_overlap_bytes(options),
            expanded_size_limit: expanded_compaction_byte_size_limit(options),
            input_version,
            icmp,
            edit: VersionEdit::new(),
            inputs: [Vec::new(), Vec::new()],
            grandparents: Vec::new(),
            grandparent_index: 0,
            seen_key: false,
            overlapped_bytes: 0,
            level_ptrs: [0; NUM_LEVELS],
        }
    }

    /// Level whose files are being merged down.
    pub fn level(&self) -> usize {
        self.level
    }

    /// The version the inputs were chosen from.
    pub fn input_version(&self) -> &Arc<Version> {
        &self.input_version
    }

    /// Size cap for each produced table file.
    pub fn max_output_file_size(&self) -> u64 {
        self.max_output_file_size
    }

    /// Cap on total level-L bytes when re-expanding inputs.
    pub fn expanded_size_limit(&self) -> u64 {
        self.expanded_size_limit
    }

    /// Number of input files on side `which` (0 = level, 1 = level+1).
    pub fn num_input_files(&self, which: usize) -> usize {
        self.inputs[which].len()
    }

    /// Input file `i` on side `which`.
    pub fn input(&self, which: usize, i: usize) -> &Arc<FileMetaData> {
        &self.inputs[which][i]
    }

    /// A single level-L file, nothing at level L+1, and little
    /// grandparent overlap: the file can be moved down by a pure
    /// metadata edit instead of a rewrite.
    pub fn is_trivial_move(&self) -> bool {
        self.num_input_files(0) == 1
            && self.num_input_files(1) == 0
            && total_file_size(&self.grandparents) <= self.max_grandparent_overlap
    }

    /// Record the deletion of every input file in the edit.
    pub fn add_input_deletions(&mut self) {
        for which in 0..2 {
            for file in &self.inputs[which] {
                self.edit.remove_file(self.level + which, file.number);
            }
        }
    }

    /// True when no level below the output level can contain `user_key`
    /// — a tombstone at or below the smallest snapshot can then be
    /// dropped instead of copied down.
    pub fn is_base_level_for_key(&mut self, user_key: &[u8]) -> bool {
        let ucmp = self.icmp.user_comparator();
        for level in (self.level + 2)..NUM_LEVELS {
            let files = &self.input_version.files[level];
            while self.level_ptrs[level] < files.len() {
                let file = &files[self.level_ptrs[level]];
                if ucmp.compare(user_key, file.largest.user_key()) != Ordering::Greater {
                    if ucmp.compare(user_key, file.smallest.user_key()) != Ordering::Less {
                        return false;
                    }
                    break;
                }
                // Keys arrive in ascending order; the cursor never moves back.
                self.level_ptrs[level] += 1;
            }
        }
        true
    }

    /// Called before emitting `internal_key` into the current output:
    /// true when the output should be closed first because it already
    /// overlaps too much of the grandparent level.
    pub fn should_stop_before(&mut self, internal_key: &[u8]) -> bool {
        while self.grandparent_index < self.grandparents.len()
            && self.icmp.compare(
                internal_key,
                self.grandparents[self.grandparent_index].largest.encoded(),
            ) == Ordering::Greater
        {
            if self.seen_key {
                self.overlapped_bytes += self.grandparents[self.grandparent_index].file_size;
            }
            self.grandparent_index += 1;
        }
        self.seen_key = true;

        if self.overlapped_bytes > self.max_grandparent_overlap {
            self.overlapped_bytes = 0;
            return true;
        }
        false
    }

    /// Smallest user key across all inputs, if any.
    pub fn smallest_user_key(&self) -> Option<&[u8]> {
        let ucmp = self.icmp.user_comparator();
        self.inputs
            .iter()
            .flatten()
            .map(|f| f.smallest.user_key())
            .min_by(|a, b| ucmp.compare(a, b))
    }

    /// Largest user key across all inputs, if any.
    pub fn largest_user_key(&self) -> Option<&[u8]> {
        let ucmp = self.icmp.user_comparator();
        self.inputs
            .iter()
            .flatten()
            .map(|f| extract_user_key(f.largest.encoded()))
            .max_by(|a, b| ucmp.compare(a, b))
    }
}
