//! The user-facing database cursor.
//!
//! [`DbIter`] turns the internal merged stream (every version of every
//! key, newest first) into the caller's view: one live value per user
//! key at the cursor's sequence, tombstones and stale versions hidden,
//! forward and backward traversal.
//!
//! The cursor owns references to the memtables and the version it reads
//! from, so the underlying files stay alive for its whole lifetime. As
//! it scans, it periodically samples a key per megabyte read and
//! reports it back; a sampled key overlapped by multiple files charges
//! a seek and can trigger a compaction of the offending file.

use std::cmp::Ordering;
use std::sync::Arc;

use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};

use crate::error::{Error, Result};
use crate::iterator::{Iter, MergingIter};
use crate::keys::{
    extract_user_key, parse_internal_key, Comparator, LookupKey, SequenceNumber, ValueType,
};
use crate::version::{Version, READ_BYTES_PERIOD};

use super::EngineInner;

#[derive(PartialEq, Clone, Copy)]
enum Direction {
    Forward,
    Reverse,
}

/// Cursor over the live keys of the database at a fixed sequence.
pub struct DbIter {
    engine: Arc<EngineInner>,
    version: Arc<Version>,
    iter: MergingIter,
    sequence: SequenceNumber,
    ucmp: Arc<dyn Comparator>,
    direction: Direction,
    valid: bool,
    /// Reverse mode: the user key/value of the current entry.
    /// Forward mode: scratch for the key to skip past.
    saved_key: Vec<u8>,
    saved_value: Vec<u8>,
    status: Option<Error>,
    rng: StdRng,
    bytes_until_read_sampling: u64,
}

impl DbIter {
    pub(crate) fn new(
        engine: Arc<EngineInner>,
        version: Arc<Version>,
        iter: MergingIter,
        sequence: SequenceNumber,
    ) -> Self {
        let ucmp = Arc::clone(engine.icmp.user_comparator());
        let mut rng = StdRng::from_os_rng();
        let initial_budget = rng.random_range(0..2 * READ_BYTES_PERIOD);
        DbIter {
            engine,
            version,
            iter,
            sequence,
            ucmp,
            direction: Direction::Forward,
            valid: false,
            saved_key: Vec::new(),
            saved_value: Vec::new(),
            status: None,
            rng,
            bytes_until_read_sampling: initial_budget,
        }
    }

    /// True when positioned at an entry.
    pub fn valid(&self) -> bool {
        self.valid
    }

    /// First error the cursor encountered, if any.
    pub fn status(&self) -> Result<()> {
        if let Some(e) = &self.status {
            return Err(e.clone());
        }
        self.iter.status()
    }

    /// Current user key. Requires `valid()`.
    pub fn key(&self) -> &[u8] {
        debug_assert!(self.valid);
        match self.direction {
            Direction::Forward => extract_user_key(self.iter.key()),
            Direction::Reverse => &self.saved_key,
        }
    }

    /// Current value. Requires `valid()`.
    pub fn value(&self) -> &[u8] {
        debug_assert!(self.valid);
        match self.direction {
            Direction::Forward => self.iter.value(),
            Direction::Reverse => &self.saved_value,
        }
    }

    /// Position at the first live key.
    pub fn seek_to_first(&mut self) {
        self.direction = Direction::Forward;
        self.saved_key.clear();
        self.saved_value.clear();
        self.iter.seek_to_first();
        if self.iter.valid() {
            self.find_next_user_entry(false);
        } else {
            self.valid = false;
        }
    }

    /// Position at the last live key.
    pub fn seek_to_last(&mut self) {
        self.direction = Direction::Reverse;
        self.saved_key.clear();
        self.saved_value.clear();
        self.iter.seek_to_last();
        self.find_prev_user_entry();
    }

    /// Position at the first live key ≥ `target`.
    pub fn seek(&mut self, target: &[u8]) {
        self.direction = Direction::Forward;
        self.saved_key.clear();
        self.saved_value.clear();
        let lookup = LookupKey::new(target, self.sequence);
        self.iter.seek(lookup.internal_key());
        if self.iter.valid() {
            self.find_next_user_entry(false);
        } else {
            self.valid = false;
        }
    }

    /// Advance to the next live key.
    pub fn next(&mut self) {
        debug_assert!(self.valid);

        if self.direction == Direction::Reverse {
            // The internal iterator sits just before saved_key (or is
            // exhausted); bring it to the first entry at or after it.
            self.direction = Direction::Forward;
            if self.iter.valid() {
                self.iter.next();
            } else {
                self.iter.seek_to_first();
            }
            if !self.iter.valid() {
                self.valid = false;
                self.saved_key.clear();
                return;
            }
            // saved_key holds the user key we are leaving behind.
        } else {
            self.saved_key.clear();
            self.saved_key.extend_from_slice(extract_user_key(self.iter.key()));
            self.iter.next();
            if !self.iter.valid() {
                self.valid = false;
                self.saved_key.clear();
                return;
            }
        }

        self.find_next_user_entry(true);
    }

    /// Step back to the previous live key.
    pub fn prev(&mut self) {
        debug_assert!(self.valid);

        if self.direction == Direction::Forward {
            // Walk the internal iterator behind the current user key.
            self.saved_key.clear();
            self.saved_key.extend_from_slice(extract_user_key(self.iter.key()));
            loop {
                self.iter.prev();
                if !self.iter.valid() {
                    self.valid = false;
                    self.saved_key.clear();
                    self.saved_value.clear();
                    return;
                }
                if self
                    .ucmp
                    .compare(extract_user_key(self.iter.key()), &self.saved_key)
                    == Ordering::Less
                {
                    break;
                }
            }
            self.direction = Direction::Reverse;
        }

        self.find_prev_user_entry();
    }

    /// Move forward to the next visible entry. With `skipping`, entries
    /// whose user key is ≤ `saved_key` are hidden (older versions of a
    /// key already yielded, or keys masked by a tombstone).
    fn find_next_user_entry(&mut self, mut skipping: bool) {
        debug_assert!(self.direction == Direction::Forward);
        loop {
            if !self.iter.valid() {
                break;
            }
            let Some((user_key, sequence, value_type)) = self.parse_current() else {
                self.iter.next();
                continue;
            };
            if sequence <= self.sequence {
                match value_type {
                    ValueType::Deletion => {
                        // Everything at this user key from here on is
                        // dead; remember it so older versions are hidden.
                        self.saved_key.clear();
                        self.saved_key.extend_from_slice(&user_key);
                        skipping = true;
                    }
                    ValueType::Value => {
                        if skipping
                            && self.ucmp.compare(&user_key, &self.saved_key) != Ordering::Greater
                        {
                            // Hidden by a newer entry or tombstone.
                        } else {
                            self.valid = true;
                            self.saved_key.clear();
                            return;
                        }
                    }
                }
            }
            self.iter.next();
        }
        self.saved_key.clear();
        self.valid = false;
    }

    /// Move backward to the previous visible entry, accumulating the
    /// newest version of each user key into `saved_key`/`saved_value`.
    fn find_prev_user_entry(&mut self) {
        debug_assert!(self.direction == Direction::Reverse);

        let mut value_type = ValueType::Deletion;
        while self.iter.valid() {
            if let Some((user_key, sequence, entry_type)) = self.parse_current() {
                if sequence <= self.sequence {
                    if value_type != ValueType::Deletion
                        && self.ucmp.compare(&user_key, &self.saved_key) == Ordering::Less
                    {
                        // saved_key holds a complete, live entry.
                        break;
                    }
                    value_type = entry_type;
                    if value_type == ValueType::Deletion {
                        self.saved_key.clear();
                        self.saved_value.clear();
                    } else {
                        self.saved_key.clear();
                        self.saved_key.extend_from_slice(&user_key);
                        self.saved_value.clear();
                        self.saved_value.extend_from_slice(self.iter.value());
                    }
                }
            }
            self.iter.prev();
        }

        if value_type == ValueType::Deletion {
            self.valid = false;
            self.saved_key.clear();
            self.saved_value.clear();
            self.direction = Direction::Forward;
        } else {
            self.valid = true;
        }
    }

    /// Decode the internal iterator's current key, charging the read
    /// toward the sampling budget.
    fn parse_current(&mut self) -> Option<(Vec<u8>, SequenceNumber, ValueType)> {
        let key = self.iter.key().to_vec();
        let bytes_read = (key.len() + self.iter.value().len()) as u64;

        while self.bytes_until_read_sampling < bytes_read {
            self.bytes_until_read_sampling += self.rng.random_range(0..2 * READ_BYTES_PERIOD);
            if self.version.record_read_sample(&key) {
                let mut state = self.engine.state.lock();
                self.engine.maybe_schedule_compaction(&mut state);
            }
        }
        self.bytes_until_read_sampling -= bytes_read;

        match parse_internal_key(&key) {
            Ok(parsed) => Some((
                parsed.user_key.to_vec(),
                parsed.sequence,
                parsed.value_type,
            )),
            Err(e) => {
                if self.status.is_none() {
                    self.status = Some(e);
                }
                None
            }
        }
    }
}
