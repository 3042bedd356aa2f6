//! Internal key algebra.
//!
//! Every entry the engine stores is addressed by an **internal key**:
//! the caller's key followed by an 8-byte trailer packing a 56-bit
//! sequence number and a value-type tag:
//!
//! ```text
//! [user_key bytes][fixed64: seq << 8 | type]
//! ```
//!
//! Internal keys order ascending by user key, then **descending** by
//! `(sequence, type)` — for one user key the newest write sorts first.
//! That ordering is what lets a point lookup stop at the first match at
//! or below its snapshot, and what lets compaction see all versions of
//! a key adjacently.
//!
//! The [`Comparator`] trait is the capability interface for key
//! ordering: a name (persisted in the manifest and checked on reopen),
//! a total order, and two key-shortening hooks the table builder uses
//! to produce compact index separators. [`BytewiseComparator`] is the
//! default; [`InternalKeyComparator`] lifts any user comparator to
//! internal keys.

#[cfg(test)]
mod tests;

use std::fmt;
use std::sync::Arc;

use crate::encoding::{decode_fixed64, put_fixed64};
use crate::error::{Error, Result};

// ------------------------------------------------------------------------------------------------
// Sequence numbers and value types
// ------------------------------------------------------------------------------------------------

/// Monotonically increasing write identifier. 56 bits are usable; the
/// remaining byte of the packed trailer holds the value type.
pub type SequenceNumber = u64;

/// Largest sequence number the trailer can represent.
pub const MAX_SEQUENCE_NUMBER: SequenceNumber = (1 << 56) - 1;

/// Tag stored in the low byte of the internal-key trailer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
#[repr(u8)]
pub enum ValueType {
    /// A tombstone masking older versions of the key.
    Deletion = 0,
    /// A concrete value.
    Value = 1,
}

/// Value type used when constructing seek targets. Since the trailer
/// sorts descending, [`ValueType::Value`] (the largest tag) positions a
/// seek at the newest entry for `(user_key, sequence)`.
pub const VALUE_TYPE_FOR_SEEK: ValueType = ValueType::Value;

impl ValueType {
    /// Decode a trailer tag byte.
    pub fn from_u8(tag: u8) -> Result<ValueType> {
        match tag {
            0 => Ok(ValueType::Deletion),
            1 => Ok(ValueType::Value),
            other => Err(Error::corruption(format!("unknown value type tag {other}"))),
        }
    }
}

/// Pack a sequence number and value type into the 8-byte trailer word.
#[inline]
pub fn pack_sequence_and_type(seq: SequenceNumber, vt: ValueType) -> u64 {
    debug_assert!(seq <= MAX_SEQUENCE_NUMBER);
    (seq << 8) | vt as u64
}

// ------------------------------------------------------------------------------------------------
// Internal key construction and parsing
// ------------------------------------------------------------------------------------------------

/// Append the internal-key encoding of `(user_key, seq, vt)` to `buf`.
pub fn append_internal_key(buf: &mut Vec<u8>, user_key: &[u8], seq: SequenceNumber, vt: ValueType) {
    buf.extend_from_slice(user_key);
    put_fixed64(buf, pack_sequence_and_type(seq, vt));
}

/// The user portion of an encoded internal key.
#[inline]
pub fn extract_user_key(internal_key: &[u8]) -> &[u8] {
    debug_assert!(internal_key.len() >= 8);
    &internal_key[..internal_key.len() - 8]
}

/// An internal key decomposed into its parts. Borrows the user key from
/// the encoded form.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ParsedInternalKey<'a> {
    /// The caller-visible key bytes.
    pub user_key: &'a [u8],
    /// Write sequence of this entry.
    pub sequence: SequenceNumber,
    /// Value or tombstone.
    pub value_type: ValueType,
}

/// Split an encoded internal key into `(user_key, sequence, type)`.
pub fn parse_internal_key(internal_key: &[u8]) -> Result<ParsedInternalKey<'_>> {
    if internal_key.len() < 8 {
        return Err(Error::corruption(format!(
            "internal key too short: {} bytes",
            internal_key.len()
        )));
    }
    let split = internal_key.len() - 8;
    let trailer = decode_fixed64(&internal_key[split..])?;
    let value_type = ValueType::from_u8((trailer & 0xff) as u8)?;
    Ok(ParsedInternalKey {
        user_key: &internal_key[..split],
        sequence: trailer >> 8,
        value_type,
    })
}

/// An owned, encoded internal key.
///
/// Used wherever key bounds outlive the buffers they were parsed from:
/// file metadata (smallest/largest), compaction ranges, manifest edits.
#[derive(Clone, Default, PartialEq, Eq)]
pub struct InternalKey {
    encoded: Vec<u8>,
}

impl InternalKey {
    /// Build an internal key from its parts.
    pub fn new(user_key: &[u8], seq: SequenceNumber, vt: ValueType) -> Self {
        let mut encoded = Vec::with_capacity(user_key.len() + 8);
        append_internal_key(&mut encoded, user_key, seq, vt);
        InternalKey { encoded }
    }

    /// Wrap an already-encoded internal key.
    pub fn decode_from(encoded: &[u8]) -> Result<Self> {
        // Validate eagerly so downstream accessors cannot slice short buffers.
        parse_internal_key(encoded)?;
        Ok(InternalKey {
            encoded: encoded.to_vec(),
        })
    }

    /// The full encoded form.
    pub fn encoded(&self) -> &[u8] {
        &self.encoded
    }

    /// The user portion.
    pub fn user_key(&self) -> &[u8] {
        extract_user_key(&self.encoded)
    }

    /// True if no key has been stored.
    pub fn is_empty(&self) -> bool {
        self.encoded.is_empty()
    }
}

impl fmt::Debug for InternalKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match parse_internal_key(&self.encoded) {
            Ok(parsed) => write!(
                f,
                "InternalKey({:?} @ {} : {:?})",
                String::from_utf8_lossy(parsed.user_key),
                parsed.sequence,
                parsed.value_type
            ),
            Err(_) => write!(f, "InternalKey(<invalid {} bytes>)", self.encoded.len()),
        }
    }
}

/// Seek target for point lookups: the internal key of `(user_key, seq)`
/// with the seek value type, positioning at the newest visible entry.
pub struct LookupKey {
    ikey: Vec<u8>,
}

impl LookupKey {
    /// Build a lookup key for `user_key` at snapshot `seq`.
    pub fn new(user_key: &[u8], seq: SequenceNumber) -> Self {
        let mut ikey = Vec::with_capacity(user_key.len() + 8);
        append_internal_key(&mut ikey, user_key, seq, VALUE_TYPE_FOR_SEEK);
        LookupKey { ikey }
    }

    /// The encoded internal key to seek with.
    pub fn internal_key(&self) -> &[u8] {
        &self.ikey
    }

    /// The user portion.
    pub fn user_key(&self) -> &[u8] {
        extract_user_key(&self.ikey)
    }
}

// ------------------------------------------------------------------------------------------------
// Comparators
// ------------------------------------------------------------------------------------------------

/// Total order over keys plus the key-shortening hooks used by the
/// table builder.
pub trait Comparator: Send + Sync {
    /// Persistent identity of this ordering. Stored in the manifest;
    /// a mismatch on reopen is corruption.
    fn name(&self) -> &'static str;

    /// Three-way comparison.
    fn compare(&self, a: &[u8], b: &[u8]) -> std::cmp::Ordering;

    /// Shorten `start` in place to some key `k` with
    /// `start <= k < limit`, if a shorter key exists. Used for index
    /// separators between data blocks.
    fn find_shortest_separator(&self, start: &mut Vec<u8>, limit: &[u8]);

    /// Shorten `key` in place to some key `k >= key`. Used for the
    /// final index entry of a table.
    fn find_short_successor(&self, key: &mut Vec<u8>);
}

/// Default ordering: plain byte-wise lexicographic comparison.
#[derive(Debug, Default, Clone, Copy)]
pub struct BytewiseComparator;

impl Comparator for BytewiseComparator {
    fn name(&self) -> &'static str {
        "stratadb.BytewiseComparator"
    }

    fn compare(&self, a: &[u8], b: &[u8]) -> std::cmp::Ordering {
        a.cmp(b)
    }

    fn find_shortest_separator(&self, start: &mut Vec<u8>, limit: &[u8]) {
        // Find length of common prefix.
        let min_len = start.len().min(limit.len());
        let mut diff = 0;
        while diff < min_len && start[diff] == limit[diff] {
            diff += 1;
        }
        if diff >= min_len {
            // One is a prefix of the other; no shortening possible.
            return;
        }
        let byte = start[diff];
        if byte < 0xff && byte + 1 < limit[diff] {
            start.truncate(diff + 1);
            start[diff] = byte + 1;
            debug_assert!(self.compare(start, limit) == std::cmp::Ordering::Less);
        }
    }

    fn find_short_successor(&self, key: &mut Vec<u8>) {
        // Bump the first byte that can be incremented and truncate.
        for i in 0..key.len() {
            if key[i] != 0xff {
                key[i] += 1;
                key.truncate(i + 1);
                return;
            }
        }
        // All 0xff: key is its own successor; leave unchanged.
    }
}

/// Lifts a user comparator to encoded internal keys: ascending user
/// order, then descending trailer (newest first).
#[derive(Clone)]
pub struct InternalKeyComparator {
    user: Arc<dyn Comparator>,
}

impl InternalKeyComparator {
    /// Wrap a user comparator.
    pub fn new(user: Arc<dyn Comparator>) -> Self {
        InternalKeyComparator { user }
    }

    /// The wrapped user comparator.
    pub fn user_comparator(&self) -> &Arc<dyn Comparator> {
        &self.user
    }

    /// Compare two [`InternalKey`]s.
    pub fn compare_keys(&self, a: &InternalKey, b: &InternalKey) -> std::cmp::Ordering {
        self.compare(a.encoded(), b.encoded())
    }
}

impl Comparator for InternalKeyComparator {
    fn name(&self) -> &'static str {
        "stratadb.InternalKeyComparator"
    }

    fn compare(&self, a: &[u8], b: &[u8]) -> std::cmp::Ordering {
        let user_order = self.user.compare(extract_user_key(a), extract_user_key(b));
        if user_order != std::cmp::Ordering::Equal {
            return user_order;
        }
        // Equal user keys: the larger trailer (newer entry) sorts first.
        let a_trailer = u64::from_le_bytes(a[a.len() - 8..].try_into().unwrap_or([0; 8]));
        let b_trailer = u64::from_le_bytes(b[b.len() - 8..].try_into().unwrap_or([0; 8]));
        b_trailer.cmp(&a_trailer)
    }

    fn find_shortest_separator(&self, start: &mut Vec<u8>, limit: &[u8]) {
        let user_start = extract_user_key(start).to_vec();
        let user_limit = extract_user_key(limit);
        let mut tmp = user_start.clone();
        self.user.find_shortest_separator(&mut tmp, user_limit);
        if tmp.len() < user_start.len() && self.user.compare(&user_start, &tmp).is_lt() {
            // A shorter user key suffices; give it the maximal trailer so
            // it still sorts before every real entry with that user key.
            put_fixed64(
                &mut tmp,
                pack_sequence_and_type(MAX_SEQUENCE_NUMBER, VALUE_TYPE_FOR_SEEK),
            );
            debug_assert!(self.compare(start, &tmp).is_lt());
            debug_assert!(self.compare(&tmp, limit).is_lt());
            *start = tmp;
        }
    }

    fn find_short_successor(&self, key: &mut Vec<u8>) {
        let user_key = extract_user_key(key).to_vec();
        let mut tmp = user_key.clone();
        self.user.find_short_successor(&mut tmp);
        if tmp.len() < user_key.len() && self.user.compare(&user_key, &tmp).is_lt() {
            put_fixed64(
                &mut tmp,
                pack_sequence_and_type(MAX_SEQUENCE_NUMBER, VALUE_TYPE_FOR_SEEK),
            );
            debug_assert!(self.compare(key, &tmp).is_lt());
            *key = tmp;
        }
    }
}
