//! Filter policies for negative-lookup short-circuiting.
//!
//! A [`FilterPolicy`] turns a set of user keys into a compact byte-string
//! filter stored alongside each table's data blocks, and later answers
//! "may this key be present?" against that byte string. A `false` answer
//! is authoritative; `true` means the data block must be consulted.
//!
//! [`BloomFilterPolicy`] is the built-in implementation, backed by
//! [`bloomfilter::Bloom`] serialized verbatim into the filter block.


use bloomfilter::Bloom;
use tracing::warn;

use crate::error::{Error, Result};

/// Capability interface for building and probing key filters.
pub trait FilterPolicy: Send + Sync {
    /// Persistent identity; stored in the table's meta-index so a reader
    /// only applies a filter it understands.
    fn name(&self) -> &'static str;

    /// Build a filter over `keys`. Keys may repeat and arrive in any
    /// order within one data-block range.
    fn create_filter(&self, keys: &[Vec<u8>]) -> Result<Vec<u8>>;

    /// Probe a filter previously produced by [`create_filter`].
    ///
    /// Must return `true` for every key that was in the building set;
    /// should return `false` for most keys that were not.
    ///
    /// [`create_filter`]: FilterPolicy::create_filter
    fn key_may_match(&self, key: &[u8], filter: &[u8]) -> bool;
}

/// Bloom-filter policy with a configurable false-positive rate.
pub struct BloomFilterPolicy {
    fp_rate: f64,
}

impl BloomFilterPolicy {
    /// Default false-positive rate (1%).
    pub const DEFAULT_FP_RATE: f64 = 0.01;

    /// Create a policy with the default false-positive rate.
    pub fn new() -> Self {
        Self::with_fp_rate(Self::DEFAULT_FP_RATE)
    }

    /// Create a policy targeting the given false-positive rate.
    pub fn with_fp_rate(fp_rate: f64) -> Self {
        BloomFilterPolicy { fp_rate }
    }
}

impl Default for BloomFilterPolicy {
    fn default() -> Self {
        Self::new()
    }
}

impl FilterPolicy for BloomFilterPolicy {
    fn name(&self) -> &'static str {
        "stratadb.BuiltinBloomFilter"
    }

    fn create_filter(&self, keys: &[Vec<u8>]) -> Result<Vec<u8>> {
        let mut bloom: Bloom<[u8]> = Bloom::new_for_fp_rate(keys.len().max(1), self.fp_rate)
            .map_err(|e| Error::corruption(format!("bloom sizing failed: {e}")))?;
        for key in keys {
            bloom.set(key);
        }
        Ok(bloom.as_slice().to_vec())
    }

    fn key_may_match(&self, key: &[u8], filter: &[u8]) -> bool {
        match Bloom::<[u8]>::from_slice(filter) {
            Ok(bloom) => bloom.check(key),
            Err(e) => {
                // An unreadable filter must never hide data.
                warn!("undecodable bloom filter ({e}); treating as match");
                true
            }
        }
    }
}
