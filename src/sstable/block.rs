//! Prefix-compressed key/value blocks.
//!
//! A block body is a run of entries, each encoded as
//!
//! ```text
//! [varint32 shared][varint32 non_shared][varint32 value_len]
//! [non_shared key bytes][value bytes]
//! ```
//!
//! where `shared` bytes are copied from the previous key. Every
//! `restart_interval` entries the prefix resets (`shared = 0`) and the
//! entry's offset is recorded in the restart array appended at the end
//! of the block:
//!
//! ```text
//! [u32 restart_offset]* [u32 num_restarts]
//! ```
//!
//! Restart points give the iterator binary-search entry into the block;
//! within a restart group it scans linearly.

use std::cmp::Ordering;
use std::sync::Arc;

use crate::encoding::{decode_fixed32, get_varint32, put_fixed32, put_varint32};
use crate::error::{Error, Result};
use crate::iterator::Iter;
use crate::keys::Comparator;

const U32_SIZE: usize = std::mem::size_of::<u32>();

// ------------------------------------------------------------------------------------------------
// Builder
// ------------------------------------------------------------------------------------------------

/// Accumulates sorted entries into one block body.
pub struct BlockBuilder {
    restart_interval: usize,
    buffer: Vec<u8>,
    restarts: Vec<u32>,
    count_since_restart: usize,
    last_key: Vec<u8>,
    finished: bool,
}

impl BlockBuilder {
    /// Start an empty block with the given restart interval.
    pub fn new(restart_interval: usize) -> Self {
        BlockBuilder {
            restart_interval: restart_interval.max(1),
            buffer: Vec::new(),
            restarts: vec![0],
            count_since_restart: 0,
            last_key: Vec::new(),
            finished: false,
        }
    }

    /// Append an entry. Keys must arrive in strictly increasing order.
    pub fn add(&mut self, key: &[u8], value: &[u8]) {
        debug_assert!(!self.finished);

        let shared = if self.count_since_restart < self.restart_interval {
            let max = key.len().min(self.last_key.len());
            let mut n = 0;
            while n < max && key[n] == self.last_key[n] {
                n += 1;
            }
            n
        } else {
            // Restart point: abandon prefix compression.
            self.restarts.push(self.buffer.len() as u32);
            self.count_since_restart = 0;
            0
        };
        let non_shared = key.len() - shared;

        put_varint32(&mut self.buffer, shared as u32);
        put_varint32(&mut self.buffer, non_shared as u32);
        put_varint32(&mut self.buffer, value.len() as u32);
        self.buffer.extend_from_slice(&key[shared..]);
        self.buffer.extend_from_slice(value);

        self.last_key.clear();
        self.last_key.extend_from_slice(key);
        self.count_since_restart += 1;
    }

    /// Append the restart array and return the completed block body.
    pub fn finish(&mut self) -> &[u8] {
        for &restart in &self.restarts {
            put_fixed32(&mut self.buffer, restart);
        }
        put_fixed32(&mut self.buffer, self.restarts.len() as u32);
        self.finished = true;
        &self.buffer
    }

    /// Size the block would have if finished now.
    pub fn current_size_estimate(&self) -> usize {
        self.buffer.len() + self.restarts.len() * U32_SIZE + U32_SIZE
    }

    /// True once the current entry count is a restart boundary, i.e.
    /// closing the block here wastes no partial prefix group.
    pub fn is_at_restart_point(&self) -> bool {
        self.count_since_restart == 0 || self.count_since_restart == self.restart_interval
    }

    /// True when no entries have been added.
    pub fn is_empty(&self) -> bool {
        self.buffer.is_empty()
    }

    /// Reset for reuse on the next block.
    pub fn reset(&mut self) {
        self.buffer.clear();
        self.restarts.clear();
        self.restarts.push(0);
        self.count_since_restart = 0;
        self.last_key.clear();
        self.finished = false;
    }
}

// ------------------------------------------------------------------------------------------------
// Decoded block
// ------------------------------------------------------------------------------------------------

/// An immutable, decoded block body.
pub struct Block {
    data: Vec<u8>,
    restart_offset: usize,
    num_restarts: u32,
}

impl Block {
    /// Validate the restart array and wrap `data`.
    pub fn new(data: Vec<u8>) -> Result<Block> {
        if data.len() < U32_SIZE {
            return Err(Error::corruption("block too small for restart count"));
        }
        let num_restarts = decode_fixed32(&data[data.len() - U32_SIZE..])?;
        let max_restarts = (data.len() - U32_SIZE) / U32_SIZE;
        if num_restarts as usize > max_restarts {
            return Err(Error::corruption("restart count exceeds block size"));
        }
        let restart_offset = data.len() - (1 + num_restarts as usize) * U32_SIZE;
        Ok(Block {
            data,
            restart_offset,
            num_restarts,
        })
    }

    /// Number of bytes held (used as cache charge).
    pub fn size(&self) -> usize {
        self.data.len()
    }

    fn restart_point(&self, index: u32) -> Result<u32> {
        debug_assert!(index < self.num_restarts);
        decode_fixed32(&self.data[self.restart_offset + (index as usize) * U32_SIZE..])
    }

    /// Cursor over this block under `cmp`.
    pub fn iter(self: &Arc<Self>, cmp: Arc<dyn Comparator>) -> BlockIter {
        BlockIter {
            block: Arc::clone(self),
            cmp,
            current: self.restart_offset,
            restart_index: 0,
            key: Vec::new(),
            value_range: (0, 0),
            status: None,
        }
    }
}

// ------------------------------------------------------------------------------------------------
// Iterator
// ------------------------------------------------------------------------------------------------

/// Cursor over a single block.
pub struct BlockIter {
    block: Arc<Block>,
    cmp: Arc<dyn Comparator>,
    /// Offset of the current entry; `restart_offset` means invalid.
    current: usize,
    /// Restart group containing `current`.
    restart_index: u32,
    /// Materialized current key (prefix-decompressed).
    key: Vec<u8>,
    /// Current value as (offset, len) into the block data.
    value_range: (usize, usize),
    status: Option<Error>,
}

impl BlockIter {
    fn corrupt(&mut self, msg: &str) {
        if self.status.is_none() {
            self.status = Some(Error::corruption(msg.to_string()));
        }
        self.current = self.block.restart_offset;
        self.key.clear();
    }

    fn next_entry_offset(&self) -> usize {
        self.value_range.0 + self.value_range.1
    }

    fn seek_to_restart_point(&mut self, index: u32) {
        self.key.clear();
        self.restart_index = index;
        let offset = match self.block.restart_point(index) {
            Ok(o) => o as usize,
            Err(_) => {
                self.corrupt("bad restart point");
                return;
            }
        };
        // Position "before" the restart entry: parse_next_entry will
        // read from here because the value range is empty.
        self.value_range = (offset, 0);
    }

    /// Decode the entry at `next_entry_offset`. Returns false at the end
    /// of the entry region or on corruption.
    fn parse_next_entry(&mut self) -> bool {
        self.current = self.next_entry_offset();
        if self.current >= self.block.restart_offset {
            // No more entries; mark invalid.
            self.current = self.block.restart_offset;
            return false;
        }

        let data = &self.block.data[..self.block.restart_offset];
        let mut pos = self.current;
        let (shared, n) = match get_varint32(&data[pos..]) {
            Ok(v) => v,
            Err(_) => {
                self.corrupt("bad entry header");
                return false;
            }
        };
        pos += n;
        let (non_shared, n) = match get_varint32(&data[pos..]) {
            Ok(v) => v,
            Err(_) => {
                self.corrupt("bad entry header");
                return false;
            }
        };
        pos += n;
        let (value_len, n) = match get_varint32(&data[pos..]) {
            Ok(v) => v,
            Err(_) => {
                self.corrupt("bad entry header");
                return false;
            }
        };
        pos += n;

        let (shared, non_shared, value_len) = (shared as usize, non_shared as usize, value_len as usize);
        if shared > self.key.len() || pos + non_shared + value_len > self.block.restart_offset {
            self.corrupt("entry overruns block");
            return false;
        }

        self.key.truncate(shared);
        self.key.extend_from_slice(&data[pos..pos + non_shared]);
        self.value_range = (pos + non_shared, value_len);

        while self.restart_index + 1 < self.block.num_restarts {
            match self.block.restart_point(self.restart_index + 1) {
                Ok(r) if (r as usize) < self.current => self.restart_index += 1,
                _ => break,
            }
        }
        true
    }

    /// Key of the entry beginning exactly at a restart point.
    fn restart_key(&self, index: u32) -> Result<&[u8]> {
        let offset = self.block.restart_point(index)? as usize;
        let data = &self.block.data[..self.block.restart_offset];
        let mut pos = offset;
        let (shared, n) = get_varint32(&data[pos..])?;
        pos += n;
        let (non_shared, n) = get_varint32(&data[pos..])?;
        pos += n;
        let (_value_len, n) = get_varint32(&data[pos..])?;
        pos += n;
        if shared != 0 {
            return Err(Error::corruption("restart entry has shared prefix"));
        }
        let non_shared = non_shared as usize;
        if pos + non_shared > data.len() {
            return Err(Error::corruption("restart key overruns block"));
        }
        Ok(&data[pos..pos + non_shared])
    }
}

impl Iter for BlockIter {
    fn valid(&self) -> bool {
        self.current < self.block.restart_offset
    }

    fn seek_to_first(&mut self) {
        if self.block.num_restarts == 0 {
            self.corrupt("block has no restart points");
            return;
        }
        self.seek_to_restart_point(0);
        self.parse_next_entry();
    }

    fn seek_to_last(&mut self) {
        if self.block.num_restarts == 0 {
            self.corrupt("block has no restart points");
            return;
        }
        self.seek_to_restart_point(self.block.num_restarts - 1);
        // Walk forward to the final entry of the block.
        while self.parse_next_entry() && self.next_entry_offset() < self.block.restart_offset {}
    }

    fn seek(&mut self, target: &[u8]) {
        if self.block.num_restarts == 0 {
            self.corrupt("block has no restart points");
            return;
        }
        // Binary search: largest restart whose key is < target.
        let mut left: u32 = 0;
        let mut right: u32 = self.block.num_restarts - 1;
        while left < right {
            let mid = (left + right + 1) / 2;
            match self.restart_key(mid) {
                Ok(key) => {
                    if self.cmp.compare(key, target) == Ordering::Less {
                        left = mid;
                    } else {
                        right = mid - 1;
                    }
                }
                Err(_) => {
                    self.corrupt("bad restart key");
                    return;
                }
            }
        }
        self.seek_to_restart_point(left);
        // Linear scan within the group.
        loop {
            if !self.parse_next_entry() {
                return;
            }
            if self.cmp.compare(&self.key, target) != Ordering::Less {
                return;
            }
        }
    }

    fn next(&mut self) {
        debug_assert!(self.valid());
        self.parse_next_entry();
    }

    fn prev(&mut self) {
        debug_assert!(self.valid());
        let original = self.current;
        // Back up to the restart group that ends before the current entry.
        while let Ok(r) = self.block.restart_point(self.restart_index) {
            if (r as usize) < original {
                break;
            }
            if self.restart_index == 0 {
                // No entry precedes the first one.
                self.current = self.block.restart_offset;
                self.key.clear();
                return;
            }
            self.restart_index -= 1;
        }
        self.seek_to_restart_point(self.restart_index);
        // Parse forward until the entry just before `original`.
        while self.parse_next_entry() && self.next_entry_offset() < original {}
    }

    fn key(&self) -> &[u8] {
        debug_assert!(self.valid());
        &self.key
    }

    fn value(&self) -> &[u8] {
        debug_assert!(self.valid());
        let (off, len) = self.value_range;
        &self.block.data[off..off + len]
    }

    fn status(&self) -> Result<()> {
        match &self.status {
            None => Ok(()),
            Some(e) => Err(e.clone()),
        }
    }
}
