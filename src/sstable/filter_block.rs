//! Filter block construction and probing.
//!
//! The filter block maps **data-block offsets** to filters: one filter
//! is generated per 2 KiB range of file offset, so a reader can go from
//! the offset of a candidate data block straight to the filter that
//! covers the keys stored there.
//!
//! Layout:
//!
//! ```text
//! [filter 0][filter 1]…
//! [u32 offset of filter 0][u32 offset of filter 1]…
//! [u32 offset of the offset array][u8 base_lg]
//! ```

use std::sync::Arc;

use crate::encoding::{decode_fixed32, put_fixed32};
use crate::filter::FilterPolicy;
use crate::keys::extract_user_key;

/// log2 of the file-offset range covered by one filter (2 KiB).
const FILTER_BASE_LG: u8 = 11;
const FILTER_BASE: u64 = 1 << FILTER_BASE_LG;

// ------------------------------------------------------------------------------------------------
// Builder
// ------------------------------------------------------------------------------------------------

/// Accumulates per-block key sets and emits the filter block.
pub struct FilterBlockBuilder {
    policy: Arc<dyn FilterPolicy>,
    /// User keys added since the last filter was generated.
    keys: Vec<Vec<u8>>,
    /// Concatenated generated filters.
    result: Vec<u8>,
    /// Start offset of each generated filter within `result`.
    filter_offsets: Vec<u32>,
}

impl FilterBlockBuilder {
    /// Start building with the given policy.
    pub fn new(policy: Arc<dyn FilterPolicy>) -> Self {
        FilterBlockBuilder {
            policy,
            keys: Vec::new(),
            result: Vec::new(),
            filter_offsets: Vec::new(),
        }
    }

    /// Note that a data block begins at `block_offset`; filters for all
    /// completed 2 KiB ranges before it are generated now.
    pub fn start_block(&mut self, block_offset: u64) {
        let filter_index = block_offset / FILTER_BASE;
        while (self.filter_offsets.len() as u64) < filter_index {
            self.generate_filter();
        }
    }

    /// Add the user portion of an internal key to the pending filter.
    pub fn add_internal_key(&mut self, internal_key: &[u8]) {
        self.keys.push(extract_user_key(internal_key).to_vec());
    }

    /// Emit the completed filter block body.
    pub fn finish(&mut self) -> crate::error::Result<&[u8]> {
        if !self.keys.is_empty() {
            self.generate_filter();
        }
        let array_offset = self.result.len() as u32;
        let offsets = std::mem::take(&mut self.filter_offsets);
        for offset in offsets {
            put_fixed32(&mut self.result, offset);
        }
        put_fixed32(&mut self.result, array_offset);
        self.result.push(FILTER_BASE_LG);
        Ok(&self.result)
    }

    fn generate_filter(&mut self) {
        self.filter_offsets.push(self.result.len() as u32);
        if self.keys.is_empty() {
            // Empty range: a zero-length filter, matched conservatively
            // by the reader.
            return;
        }
        let keys = std::mem::take(&mut self.keys);
        match self.policy.create_filter(&keys) {
            Ok(filter) => self.result.extend_from_slice(&filter),
            // A filter that fails to build degrades to "no filter" for
            // this range; lookups fall through to the data block.
            Err(_) => {}
        }
    }
}

// ------------------------------------------------------------------------------------------------
// Reader
// ------------------------------------------------------------------------------------------------

/// Probes a filter block produced by [`FilterBlockBuilder`].
pub struct FilterBlockReader {
    policy: Arc<dyn FilterPolicy>,
    data: Vec<u8>,
    /// Offset of the offset array within `data`.
    array_start: usize,
    num_filters: usize,
    base_lg: u8,
}

impl FilterBlockReader {
    /// Parse a filter block body. Malformed input yields a reader that
    /// matches everything (filters must never hide data).
    pub fn new(policy: Arc<dyn FilterPolicy>, data: Vec<u8>) -> Self {
        let mut reader = FilterBlockReader {
            policy,
            data,
            array_start: 0,
            num_filters: 0,
            base_lg: FILTER_BASE_LG,
        };
        let n = reader.data.len();
        if n < 5 {
            return reader;
        }
        reader.base_lg = reader.data[n - 1];
        let Ok(array_offset) = decode_fixed32(&reader.data[n - 5..]) else {
            return reader;
        };
        let array_offset = array_offset as usize;
        if array_offset > n - 5 {
            return reader;
        }
        reader.array_start = array_offset;
        reader.num_filters = (n - 5 - array_offset) / 4;
        reader
    }

    /// May `user_key` be present in the data block at `block_offset`?
    pub fn key_may_match(&self, block_offset: u64, user_key: &[u8]) -> bool {
        if self.num_filters == 0 || self.base_lg >= 64 {
            return true;
        }
        let index = (block_offset >> self.base_lg) as usize;
        if index >= self.num_filters {
            // Out of range: err on the side of reading the block.
            return true;
        }
        let start = match decode_fixed32(&self.data[self.array_start + index * 4..]) {
            Ok(v) => v as usize,
            Err(_) => return true,
        };
        let limit = if index + 1 < self.num_filters {
            match decode_fixed32(&self.data[self.array_start + (index + 1) * 4..]) {
                Ok(v) => v as usize,
                Err(_) => return true,
            }
        } else {
            self.array_start
        };
        if start > limit || limit > self.array_start {
            return true;
        }
        if start == limit {
            // Empty filter covers no keys.
            return false;
        }
        self.policy
            .key_may_match(user_key, &self.data[start..limit])
    }
}
