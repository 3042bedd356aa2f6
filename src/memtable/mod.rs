//! # Memtable Module
//!
//! The mutable, in-memory write buffer of the storage engine: a sorted
//! map from **encoded internal keys** to values, backed by a concurrent
//! skip list.
//!
//! ## Design Invariants
//!
//! - At most one logical writer at a time (the engine's write mutex
//!   serializes insertions); readers never block and always observe a
//!   consistent prefix of published entries.
//! - Entries are never overwritten or removed: every write inserts a new
//!   internal key whose sequence number makes it unique. Deletes are
//!   tombstone entries, not physical removal.
//! - Lookups resolve to the newest entry at or below the caller's
//!   snapshot sequence; a tombstone there masks anything older in the
//!   table stack below.
//! - Approximate memory usage is tracked so the engine can decide when
//!   to rotate the memtable out for flushing.
//!
//! ## Lifecycle
//!
//! A memtable is reference-counted (`Arc`). The engine keeps one mutable
//! `mem` and at most one immutable `imm` awaiting flush; iterators and
//! the flush job hold their own references, and the skip list's memory
//! is released wholesale when the last reference drops.

#[cfg(test)]
mod tests;

use std::ops::Bound;
use std::sync::atomic::{AtomicUsize, Ordering as AtomicOrdering};
use std::sync::Arc;

use crossbeam_skiplist::SkipMap;

use crate::error::Result;
use crate::iterator::Iter;
use crate::keys::{
    append_internal_key, extract_user_key, parse_internal_key, Comparator, InternalKeyComparator,
    LookupKey, SequenceNumber, ValueType,
};

/// Rough per-entry bookkeeping overhead charged to the memory estimate.
const ENTRY_OVERHEAD: usize = 8;

// ------------------------------------------------------------------------------------------------
// Skip-list key wrapper
// ------------------------------------------------------------------------------------------------

/// Encoded internal key ordered by the internal-key comparator.
///
/// The comparator handle rides along with every key so the skip list's
/// `Ord` follows the engine's configured user comparator.
struct MemKey {
    cmp: InternalKeyComparator,
    ikey: Vec<u8>,
}

impl PartialEq for MemKey {
    fn eq(&self, other: &Self) -> bool {
        self.cmp.compare(&self.ikey, &other.ikey) == std::cmp::Ordering::Equal
    }
}

impl Eq for MemKey {}

impl PartialOrd for MemKey {
    fn partial_cmp(&self, other: &Self) -> Option<std::cmp::Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for MemKey {
    fn cmp(&self, other: &Self) -> std::cmp::Ordering {
        self.cmp.compare(&self.ikey, &other.ikey)
    }
}

// ------------------------------------------------------------------------------------------------
// Memtable
// ------------------------------------------------------------------------------------------------

/// Outcome of a memtable point lookup.
#[derive(Debug, PartialEq)]
pub enum MemtableGet {
    /// A live value visible at the requested sequence.
    Found(Vec<u8>),
    /// A tombstone visible at the requested sequence; the key is dead
    /// and older layers must not be consulted.
    Deleted,
    /// Nothing known about the key at the requested sequence.
    NotFound,
}

/// The in-memory write buffer.
pub struct Memtable {
    cmp: InternalKeyComparator,
    map: SkipMap<MemKey, Vec<u8>>,
    approximate_size: AtomicUsize,
}

impl Memtable {
    /// Create an empty memtable ordered by `cmp`.
    pub fn new(cmp: InternalKeyComparator) -> Self {
        Memtable {
            cmp,
            map: SkipMap::new(),
            approximate_size: AtomicUsize::new(0),
        }
    }

    /// Insert an entry.
    ///
    /// The caller supplies the globally assigned sequence number; with a
    /// [`ValueType::Deletion`] tag, `value` is ignored and stored empty.
    pub fn add(&self, seq: SequenceNumber, vt: ValueType, user_key: &[u8], value: &[u8]) {
        let mut ikey = Vec::with_capacity(user_key.len() + 8);
        append_internal_key(&mut ikey, user_key, seq, vt);
        let stored = match vt {
            ValueType::Value => value.to_vec(),
            ValueType::Deletion => Vec::new(),
        };
        self.approximate_size
            .fetch_add(ikey.len() + stored.len() + ENTRY_OVERHEAD, AtomicOrdering::Relaxed);
        self.map.insert(
            MemKey {
                cmp: self.cmp.clone(),
                ikey,
            },
            stored,
        );
    }

    /// Look up `key.user_key()` at `key`'s snapshot sequence.
    pub fn get(&self, key: &LookupKey) -> MemtableGet {
        let probe = MemKey {
            cmp: self.cmp.clone(),
            ikey: key.internal_key().to_vec(),
        };
        let Some(entry) = self.map.lower_bound(Bound::Included(&probe)) else {
            return MemtableGet::NotFound;
        };
        let found = &entry.key().ikey;
        let user_cmp = self.cmp.user_comparator();
        if user_cmp
            .compare(extract_user_key(found), key.user_key())
            .is_ne()
        {
            return MemtableGet::NotFound;
        }
        // Internal ordering guarantees this is the newest entry with
        // seq <= the lookup sequence for this user key.
        match parse_internal_key(found) {
            Ok(parsed) if parsed.value_type == ValueType::Value => {
                MemtableGet::Found(entry.value().clone())
            }
            Ok(_) => MemtableGet::Deleted,
            // A key we inserted ourselves cannot fail to parse; treat
            // defensively as absent.
            Err(_) => MemtableGet::NotFound,
        }
    }

    /// Bytes of key/value data held, plus bookkeeping overhead.
    pub fn approximate_memory_usage(&self) -> usize {
        self.approximate_size.load(AtomicOrdering::Relaxed)
    }

    /// True when no entries have been inserted.
    pub fn is_empty(&self) -> bool {
        self.map.is_empty()
    }

    /// Number of entries (every version and tombstone counts).
    pub fn len(&self) -> usize {
        self.map.len()
    }

    /// Cursor over the full contents in internal-key order.
    pub fn iter(self: &Arc<Self>) -> MemtableIter {
        MemtableIter {
            mem: Arc::clone(self),
            current: None,
        }
    }
}

// ------------------------------------------------------------------------------------------------
// Iterator
// ------------------------------------------------------------------------------------------------

/// Cursor over a memtable.
///
/// Holds a reference on the memtable, so it remains usable after the
/// engine rotates or flushes the table. Each step re-seeks the skip
/// list from the current key, which keeps the cursor safely decoupled
/// from the map's internal nodes.
pub struct MemtableIter {
    mem: Arc<Memtable>,
    current: Option<(Vec<u8>, Vec<u8>)>,
}

impl MemtableIter {
    fn probe(&self, ikey: &[u8]) -> MemKey {
        MemKey {
            cmp: self.mem.cmp.clone(),
            ikey: ikey.to_vec(),
        }
    }

    fn capture(
        &self,
        entry: Option<crossbeam_skiplist::map::Entry<'_, MemKey, Vec<u8>>>,
    ) -> Option<(Vec<u8>, Vec<u8>)> {
        entry.map(|e| (e.key().ikey.clone(), e.value().clone()))
    }
}

impl Iter for MemtableIter {
    fn valid(&self) -> bool {
        self.current.is_some()
    }

    fn seek_to_first(&mut self) {
        self.current = self.capture(self.mem.map.front());
    }

    fn seek_to_last(&mut self) {
        self.current = self.capture(self.mem.map.back());
    }

    fn seek(&mut self, target: &[u8]) {
        let probe = self.probe(target);
        self.current = self.capture(self.mem.map.lower_bound(Bound::Included(&probe)));
    }

    fn next(&mut self) {
        if let Some((ikey, _)) = &self.current {
            let probe = self.probe(ikey);
            self.current = self.capture(self.mem.map.lower_bound(Bound::Excluded(&probe)));
        }
    }

    fn prev(&mut self) {
        if let Some((ikey, _)) = &self.current {
            let probe = self.probe(ikey);
            self.current = self.capture(self.mem.map.upper_bound(Bound::Excluded(&probe)));
        }
    }

    fn key(&self) -> &[u8] {
        &self.current.as_ref().expect("key() on invalid memtable iterator").0
    }

    fn value(&self) -> &[u8] {
        &self.current.as_ref().expect("value() on invalid memtable iterator").1
    }

    fn status(&self) -> Result<()> {
        Ok(())
    }
}
