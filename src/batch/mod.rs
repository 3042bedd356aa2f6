//! Atomic write batches.
//!
//! A [`WriteBatch`] is the unit of application on the write path: every
//! `put`/`delete` — including single-key convenience calls — travels
//! through one. The serialized form is both the WAL payload and the
//! wire format the engine replays during recovery:
//!
//! ```text
//! [fixed64 sequence][fixed32 count]
//! ( [tag: u8][varint32 klen][key]            — Deletion
//! | [tag: u8][varint32 klen][key]
//!            [varint32 vlen][value] )*       — Value
//! ```
//!
//! The sequence field records the number assigned to the batch's first
//! record; record `i` commits at `sequence + i`. A batch is applied to
//! the memtable entry-by-entry but becomes visible atomically, because
//! the engine publishes `last_sequence` only after the whole batch is
//! in.

#[cfg(test)]
mod tests;

use crate::encoding::{
    decode_fixed32, decode_fixed64, get_length_prefixed_slice, put_length_prefixed_slice,
};
use crate::error::{Error, Result};
use crate::keys::{SequenceNumber, ValueType};
use crate::memtable::Memtable;

/// Serialized header: sequence (8) + count (4).
pub const BATCH_HEADER_SIZE: usize = 12;

/// An ordered set of updates applied atomically.
#[derive(Clone)]
pub struct WriteBatch {
    rep: Vec<u8>,
}

impl Default for WriteBatch {
    fn default() -> Self {
        Self::new()
    }
}

impl WriteBatch {
    /// An empty batch.
    pub fn new() -> Self {
        WriteBatch {
            rep: vec![0; BATCH_HEADER_SIZE],
        }
    }

    /// Rebuild a batch from its serialized form (WAL replay).
    pub fn from_contents(contents: Vec<u8>) -> Result<Self> {
        if contents.len() < BATCH_HEADER_SIZE {
            return Err(Error::corruption("write batch too small"));
        }
        Ok(WriteBatch { rep: contents })
    }

    /// The serialized form (the WAL payload).
    pub fn contents(&self) -> &[u8] {
        &self.rep
    }

    /// Queue an insertion of `key` → `value`.
    pub fn put(&mut self, key: &[u8], value: &[u8]) {
        self.set_count(self.count() + 1);
        self.rep.push(ValueType::Value as u8);
        put_length_prefixed_slice(&mut self.rep, key);
        put_length_prefixed_slice(&mut self.rep, value);
    }

    /// Queue a deletion of `key`.
    pub fn delete(&mut self, key: &[u8]) {
        self.set_count(self.count() + 1);
        self.rep.push(ValueType::Deletion as u8);
        put_length_prefixed_slice(&mut self.rep, key);
    }

    /// Drop all queued updates.
    pub fn clear(&mut self) {
        self.rep.clear();
        self.rep.resize(BATCH_HEADER_SIZE, 0);
    }

    /// Number of queued updates.
    pub fn count(&self) -> u32 {
        decode_fixed32(&self.rep[8..]).unwrap_or(0)
    }

    pub(crate) fn set_count(&mut self, count: u32) {
        self.rep[8..12].copy_from_slice(&count.to_le_bytes());
    }

    /// Sequence number assigned to the first record.
    pub fn sequence(&self) -> SequenceNumber {
        decode_fixed64(&self.rep).unwrap_or(0)
    }

    pub(crate) fn set_sequence(&mut self, seq: SequenceNumber) {
        self.rep[..8].copy_from_slice(&seq.to_le_bytes());
    }

    /// Serialized size in bytes; used by the leader to cap group commits.
    pub fn approximate_size(&self) -> usize {
        self.rep.len()
    }

    /// True when no updates are queued.
    pub fn is_empty(&self) -> bool {
        self.count() == 0
    }

    /// Walk the queued updates in order.
    pub fn iterate<H: BatchHandler>(&self, handler: &mut H) -> Result<()> {
        let mut input = &self.rep[BATCH_HEADER_SIZE..];
        let mut found: u32 = 0;
        while !input.is_empty() {
            let tag = input[0];
            input = &input[1..];
            match ValueType::from_u8(tag)? {
                ValueType::Value => {
                    let (key, n) = get_length_prefixed_slice(input)?;
                    let key = key.to_vec();
                    input = &input[n..];
                    let (value, n) = get_length_prefixed_slice(input)?;
                    handler.put(&key, value);
                    input = &input[n..];
                }
                ValueType::Deletion => {
                    let (key, n) = get_length_prefixed_slice(input)?;
                    handler.delete(key);
                    input = &input[n..];
                }
            }
            found += 1;
        }
        if found != self.count() {
            return Err(Error::corruption("write batch count mismatch"));
        }
        Ok(())
    }

    /// Apply every record to `mem`, assigning sequences starting at this
    /// batch's sequence field.
    pub fn insert_into(&self, mem: &Memtable) -> Result<()> {
        let mut inserter = MemtableInserter {
            sequence: self.sequence(),
            mem,
        };
        self.iterate(&mut inserter)
    }

    /// Append `other`'s records to this batch (group commit).
    pub fn append(&mut self, other: &WriteBatch) {
        self.set_count(self.count() + other.count());
        self.rep.extend_from_slice(&other.rep[BATCH_HEADER_SIZE..]);
    }
}

/// Visitor over a batch's records.
pub trait BatchHandler {
    /// Called for each queued insertion.
    fn put(&mut self, key: &[u8], value: &[u8]);
    /// Called for each queued deletion.
    fn delete(&mut self, key: &[u8]);
}

struct MemtableInserter<'a> {
    sequence: SequenceNumber,
    mem: &'a Memtable,
}

impl BatchHandler for MemtableInserter<'_> {
    fn put(&mut self, key: &[u8], value: &[u8]) {
        self.mem.add(self.sequence, ValueType::Value, key, value);
        self.sequence += 1;
    }

    fn delete(&mut self, key: &[u8]) {
        self.mem.add(self.sequence, ValueType::Deletion, key, b"");
        self.sequence += 1;
    }
}
