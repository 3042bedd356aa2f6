//! Version edits: the deltas recorded in the manifest.
//!
//! Every durable state change — a flush adding a level-0 file, a
//! compaction swapping inputs for outputs, a log rotation — is captured
//! as a [`VersionEdit`] and appended to the manifest log. Replaying the
//! edits in order reconstructs the exact file layout.
//!
//! The encoding is a sequence of tagged fields (varint tag, then the
//! field payload):
//!
//! | tag | field |
//! |-----|-------------------------------------------|
//! | 1   | comparator name (length-prefixed)         |
//! | 2   | log number (varint64)                     |
//! | 3   | next file number (varint64)               |
//! | 4   | last sequence (varint64)                  |
//! | 5   | compact pointer (level, internal key)     |
//! | 6   | deleted file (level, file number)         |
//! | 7   | new file (level, number, size, smallest, largest) |
//! | 9   | previous log number (varint64)            |
//!
//! Tag 8 is reserved. Unknown tags are corruption.

use std::sync::atomic::{AtomicI64, Ordering};

use crate::encoding::{
    get_length_prefixed_slice, get_varint32, get_varint64, put_length_prefixed_slice, put_varint32,
    put_varint64,
};
use crate::error::{Error, Result};
use crate::keys::{InternalKey, SequenceNumber};

use super::NUM_LEVELS;

const TAG_COMPARATOR: u32 = 1;
const TAG_LOG_NUMBER: u32 = 2;
const TAG_NEXT_FILE_NUMBER: u32 = 3;
const TAG_LAST_SEQUENCE: u32 = 4;
const TAG_COMPACT_POINTER: u32 = 5;
const TAG_DELETED_FILE: u32 = 6;
const TAG_NEW_FILE: u32 = 7;
// Tag 8 was used by an abandoned large-value scheme; never reused.
const TAG_PREV_LOG_NUMBER: u32 = 9;

// ------------------------------------------------------------------------------------------------
// File metadata
// ------------------------------------------------------------------------------------------------

/// Metadata for one table file owned by some version.
#[derive(Debug)]
pub struct FileMetaData {
    /// Unique file number; names the file on disk.
    pub number: u64,
    /// File size in bytes.
    pub file_size: u64,
    /// Smallest internal key stored in the file.
    pub smallest: InternalKey,
    /// Largest internal key stored in the file.
    pub largest: InternalKey,
    /// Seek-compaction budget: decremented when a lookup probes this
    /// file without finding its key; reaching zero flags the file.
    pub allowed_seeks: AtomicI64,
}

impl FileMetaData {
    /// Create metadata with the standard seek budget: one seek is
    /// "worth" about 16 KiB of compaction work, floor 100.
    pub fn new(number: u64, file_size: u64, smallest: InternalKey, largest: InternalKey) -> Self {
        let allowed_seeks = ((file_size / 16384) as i64).max(100);
        FileMetaData {
            number,
            file_size,
            smallest,
            largest,
            allowed_seeks: AtomicI64::new(allowed_seeks),
        }
    }

    /// Consume one seek from the budget; true once exhausted.
    pub fn consume_seek(&self) -> bool {
        self.allowed_seeks.fetch_sub(1, Ordering::Relaxed) <= 1
    }
}

impl Clone for FileMetaData {
    fn clone(&self) -> Self {
        FileMetaData {
            number: self.number,
            file_size: self.file_size,
            smallest: self.smallest.clone(),
            largest: self.largest.clone(),
            allowed_seeks: AtomicI64::new(self.allowed_seeks.load(Ordering::Relaxed)),
        }
    }
}

// ------------------------------------------------------------------------------------------------
// Version edit
// ------------------------------------------------------------------------------------------------

/// A delta between two versions.
#[derive(Debug, Default, Clone)]
pub struct VersionEdit {
    /// Name of the user comparator; written once per manifest and
    /// checked against the configured comparator on recovery.
    pub comparator_name: Option<String>,
    /// WAL segment backing the (new) mutable memtable.
    pub log_number: Option<u64>,
    /// WAL segment of the immutable memtable still awaiting flush.
    pub prev_log_number: Option<u64>,
    /// High-water mark of the file-number allocator.
    pub next_file_number: Option<u64>,
    /// Highest sequence number covered by the referenced files.
    pub last_sequence: Option<SequenceNumber>,
    /// Per-level round-robin cursors for size compaction.
    pub compact_pointers: Vec<(usize, InternalKey)>,
    /// Files removed from a level: `(level, file number)`.
    pub deleted_files: Vec<(usize, u64)>,
    /// Files added to a level.
    pub new_files: Vec<(usize, FileMetaData)>,
}

impl VersionEdit {
    /// Start an empty edit.
    pub fn new() -> Self {
        VersionEdit::default()
    }

    /// Record the comparator identity.
    pub fn set_comparator_name(&mut self, name: &str) {
        self.comparator_name = Some(name.to_string());
    }

    /// Record the active WAL segment number.
    pub fn set_log_number(&mut self, number: u64) {
        self.log_number = Some(number);
    }

    /// Record the immutable memtable's WAL segment number.
    pub fn set_prev_log_number(&mut self, number: u64) {
        self.prev_log_number = Some(number);
    }

    /// Record the file-number allocator position.
    pub fn set_next_file_number(&mut self, number: u64) {
        self.next_file_number = Some(number);
    }

    /// Record the last assigned sequence number.
    pub fn set_last_sequence(&mut self, seq: SequenceNumber) {
        self.last_sequence = Some(seq);
    }

    /// Record the compaction cursor for `level`.
    pub fn set_compact_pointer(&mut self, level: usize, key: InternalKey) {
        self.compact_pointers.push((level, key));
    }

    /// Remove `file_number` from `level`.
    pub fn remove_file(&mut self, level: usize, file_number: u64) {
        self.deleted_files.push((level, file_number));
    }

    /// Add a file to `level`.
    pub fn add_file(
        &mut self,
        level: usize,
        number: u64,
        file_size: u64,
        smallest: InternalKey,
        largest: InternalKey,
    ) {
        self.new_files
            .push((level, FileMetaData::new(number, file_size, smallest, largest)));
    }

    /// Serialize into `buf` for the manifest log.
    pub fn encode_to(&self, buf: &mut Vec<u8>) {
        if let Some(name) = &self.comparator_name {
            put_varint32(buf, TAG_COMPARATOR);
            put_length_prefixed_slice(buf, name.as_bytes());
        }
        if let Some(n) = self.log_number {
            put_varint32(buf, TAG_LOG_NUMBER);
            put_varint64(buf, n);
        }
        if let Some(n) = self.prev_log_number {
            put_varint32(buf, TAG_PREV_LOG_NUMBER);
            put_varint64(buf, n);
        }
        if let Some(n) = self.next_file_number {
            put_varint32(buf, TAG_NEXT_FILE_NUMBER);
            put_varint64(buf, n);
        }
        if let Some(n) = self.last_sequence {
            put_varint32(buf, TAG_LAST_SEQUENCE);
            put_varint64(buf, n);
        }
        for (level, key) in &self.compact_pointers {
            put_varint32(buf, TAG_COMPACT_POINTER);
            put_varint32(buf, *level as u32);
            put_length_prefixed_slice(buf, key.encoded());
        }
        for (level, number) in &self.deleted_files {
            put_varint32(buf, TAG_DELETED_FILE);
            put_varint32(buf, *level as u32);
            put_varint64(buf, *number);
        }
        for (level, file) in &self.new_files {
            put_varint32(buf, TAG_NEW_FILE);
            put_varint32(buf, *level as u32);
            put_varint64(buf, file.number);
            put_varint64(buf, file.file_size);
            put_length_prefixed_slice(buf, file.smallest.encoded());
            put_length_prefixed_slice(buf, file.largest.encoded());
        }
    }

    /// Parse an edit from a manifest record.
    pub fn decode_from(mut input: &[u8]) -> Result<VersionEdit> {
        let mut edit = VersionEdit::new();
        while !input.is_empty() {
            let (tag, n) = get_varint32(input)?;
            input = &input[n..];
            match tag {
                TAG_COMPARATOR => {
                    let (name, n) = get_length_prefixed_slice(input)?;
                    edit.comparator_name = Some(
                        String::from_utf8(name.to_vec())
                            .map_err(|_| Error::corruption("comparator name is not UTF-8"))?,
                    );
                    input = &input[n..];
                }
                TAG_LOG_NUMBER => {
                    let (v, n) = get_varint64(input)?;
                    edit.log_number = Some(v);
                    input = &input[n..];
                }
                TAG_PREV_LOG_NUMBER => {
                    let (v, n) = get_varint64(input)?;
                    edit.prev_log_number = Some(v);
                    input = &input[n..];
                }
                TAG_NEXT_FILE_NUMBER => {
                    let (v, n) = get_varint64(input)?;
                    edit.next_file_number = Some(v);
                    input = &input[n..];
                }
                TAG_LAST_SEQUENCE => {
                    let (v, n) = get_varint64(input)?;
                    edit.last_sequence = Some(v);
                    input = &input[n..];
                }
                TAG_COMPACT_POINTER => {
                    let (level, n) = get_level(input)?;
                    input = &input[n..];
                    let (key, n) = get_internal_key(input)?;
                    input = &input[n..];
                    edit.compact_pointers.push((level, key));
                }
                TAG_DELETED_FILE => {
                    let (level, n) = get_level(input)?;
                    input = &input[n..];
                    let (number, n) = get_varint64(input)?;
                    input = &input[n..];
                    edit.deleted_files.push((level, number));
                }
                TAG_NEW_FILE => {
                    let (level, n) = get_level(input)?;
                    input = &input[n..];
                    let (number, n) = get_varint64(input)?;
                    input = &input[n..];
                    let (file_size, n) = get_varint64(input)?;
                    input = &input[n..];
                    let (smallest, n) = get_internal_key(input)?;
                    input = &input[n..];
                    let (largest, n) = get_internal_key(input)?;
                    input = &input[n..];
                    edit.new_files
                        .push((level, FileMetaData::new(number, file_size, smallest, largest)));
                }
                other => {
                    return Err(Error::corruption(format!(
                        "unknown version edit tag {other}"
                    )));
                }
            }
        }
        Ok(edit)
    }
}

fn get_level(input: &[u8]) -> Result<(usize, usize)> {
    let (level, n) = get_varint32(input)?;
    if level as usize >= NUM_LEVELS {
        return Err(Error::corruption(format!("level {level} out of range")));
    }
    Ok((level as usize, n))
}

fn get_internal_key(input: &[u8]) -> Result<(InternalKey, usize)> {
    let (raw, n) = get_length_prefixed_slice(input)?;
    Ok((InternalKey::decode_from(raw)?, n))
}
