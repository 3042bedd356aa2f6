//! Internal iteration interfaces.
//!
//! Everything that yields ordered `(internal key, value)` pairs — the
//! memtable, a table's data blocks, a whole level — implements the
//! [`Iter`] cursor trait. Unlike `std::iter::Iterator`, a cursor is
//! bidirectional and seekable: the merging machinery positions children
//! at arbitrary keys and walks them in either direction.
//!
//! Composition mirrors the read path:
//!
//! - [`MergingIter`] — k-way merge over heterogeneous children with a
//!   direction flag; equal keys resolve in child order (callers place
//!   newer sources first).
//! - [`TwoLevelIter`] — an index iterator whose values designate data
//!   blocks, opened lazily through a callback. Used for single tables
//!   (index block → data block) and whole levels (file list → table).
//!
//! Resource cleanup (cache handles, memtable and version references) is
//! carried by ownership: child iterators hold the `Arc`s they need, so
//! dropping the parent releases everything.

#[cfg(test)]
mod tests;

use std::cmp::Ordering;
use std::sync::Arc;

use crate::error::{Error, Result};
use crate::keys::Comparator;

/// Bidirectional, seekable cursor over ordered key/value pairs.
///
/// `key` and `value` may only be called while `valid()` holds. After a
/// failed operation `valid()` is false and [`status`](Iter::status)
/// reports the cause.
pub trait Iter: Send {
    /// True when positioned at an entry.
    fn valid(&self) -> bool;

    /// Position at the first entry.
    fn seek_to_first(&mut self);

    /// Position at the last entry.
    fn seek_to_last(&mut self);

    /// Position at the first entry with key ≥ `target`.
    fn seek(&mut self, target: &[u8]);

    /// Advance to the next entry.
    fn next(&mut self);

    /// Step back to the previous entry.
    fn prev(&mut self);

    /// Key at the current position.
    fn key(&self) -> &[u8];

    /// Value at the current position.
    fn value(&self) -> &[u8];

    /// First error encountered, if any.
    fn status(&self) -> Result<()>;
}

/// Boxed cursor, the common currency between layers.
pub type BoxedIter = Box<dyn Iter>;

// ------------------------------------------------------------------------------------------------
// Empty / error iterators
// ------------------------------------------------------------------------------------------------

/// A cursor over nothing, optionally carrying an error.
pub struct EmptyIter {
    status: Option<Error>,
}

impl EmptyIter {
    /// An empty cursor with OK status.
    pub fn new() -> Self {
        EmptyIter { status: None }
    }

    /// An empty cursor that reports `err` from [`Iter::status`].
    pub fn with_error(err: Error) -> Self {
        EmptyIter { status: Some(err) }
    }
}

impl Default for EmptyIter {
    fn default() -> Self {
        Self::new()
    }
}

impl Iter for EmptyIter {
    fn valid(&self) -> bool {
        false
    }
    fn seek_to_first(&mut self) {}
    fn seek_to_last(&mut self) {}
    fn seek(&mut self, _target: &[u8]) {}
    fn next(&mut self) {}
    fn prev(&mut self) {}
    fn key(&self) -> &[u8] {
        unreachable!("key() on invalid iterator")
    }
    fn value(&self) -> &[u8] {
        unreachable!("value() on invalid iterator")
    }
    fn status(&self) -> Result<()> {
        match &self.status {
            None => Ok(()),
            Some(e) => Err(e.clone()),
        }
    }
}

// ------------------------------------------------------------------------------------------------
// Merging iterator
// ------------------------------------------------------------------------------------------------

#[derive(PartialEq, Clone, Copy)]
enum Direction {
    Forward,
    Reverse,
}

/// K-way merge over child cursors.
///
/// Yields the union of the children in comparator order. When several
/// children are positioned at equal keys, the child with the smaller
/// index wins — callers order children newest-first so fresher layers
/// shadow older ones.
pub struct MergingIter {
    cmp: Arc<dyn Comparator>,
    children: Vec<BoxedIter>,
    current: Option<usize>,
    direction: Direction,
}

impl MergingIter {
    /// Merge `children` under `cmp`.
    pub fn new(cmp: Arc<dyn Comparator>, children: Vec<BoxedIter>) -> Self {
        MergingIter {
            cmp,
            children,
            current: None,
            direction: Direction::Forward,
        }
    }

    fn find_smallest(&mut self) {
        let mut smallest: Option<usize> = None;
        for (i, child) in self.children.iter().enumerate() {
            if !child.valid() {
                continue;
            }
            match smallest {
                None => smallest = Some(i),
                Some(s) => {
                    if self.cmp.compare(child.key(), self.children[s].key()) == Ordering::Less {
                        smallest = Some(i);
                    }
                }
            }
        }
        self.current = smallest;
    }

    fn find_largest(&mut self) {
        let mut largest: Option<usize> = None;
        for (i, child) in self.children.iter().enumerate().rev() {
            if !child.valid() {
                continue;
            }
            match largest {
                None => largest = Some(i),
                Some(l) => {
                    if self.cmp.compare(child.key(), self.children[l].key()) == Ordering::Greater {
                        largest = Some(i);
                    }
                }
            }
        }
        self.current = largest;
    }
}

impl Iter for MergingIter {
    fn valid(&self) -> bool {
        self.current.is_some()
    }

    fn seek_to_first(&mut self) {
        for child in &mut self.children {
            child.seek_to_first();
        }
        self.direction = Direction::Forward;
        self.find_smallest();
    }

    fn seek_to_last(&mut self) {
        for child in &mut self.children {
            child.seek_to_last();
        }
        self.direction = Direction::Reverse;
        self.find_largest();
    }

    fn seek(&mut self, target: &[u8]) {
        for child in &mut self.children {
            child.seek(target);
        }
        self.direction = Direction::Forward;
        self.find_smallest();
    }

    fn next(&mut self) {
        let Some(cur) = self.current else { return };

        // After reverse movement, the non-current children sit before the
        // current key; reposition them at the first entry past it.
        if self.direction == Direction::Reverse {
            let current_key = self.children[cur].key().to_vec();
            for (i, child) in self.children.iter_mut().enumerate() {
                if i == cur {
                    continue;
                }
                child.seek(&current_key);
                if child.valid() && self.cmp.compare(&current_key, child.key()) == Ordering::Equal {
                    child.next();
                }
            }
            self.direction = Direction::Forward;
        }

        self.children[cur].next();
        self.find_smallest();
    }

    fn prev(&mut self) {
        let Some(cur) = self.current else { return };

        // Mirror image of next(): park every other child just before the
        // current key.
        if self.direction == Direction::Forward {
            let current_key = self.children[cur].key().to_vec();
            for (i, child) in self.children.iter_mut().enumerate() {
                if i == cur {
                    continue;
                }
                child.seek(&current_key);
                if child.valid() {
                    // Child is at the first entry >= current_key; step back.
                    child.prev();
                } else {
                    // All of this child's entries are < current_key.
                    child.seek_to_last();
                }
            }
            self.direction = Direction::Reverse;
        }

        self.children[cur].prev();
        self.find_largest();
    }

    fn key(&self) -> &[u8] {
        let cur = self.current.expect("key() on invalid merging iterator");
        self.children[cur].key()
    }

    fn value(&self) -> &[u8] {
        let cur = self.current.expect("value() on invalid merging iterator");
        self.children[cur].value()
    }

    fn status(&self) -> Result<()> {
        for child in &self.children {
            child.status()?;
        }
        Ok(())
    }
}

// ------------------------------------------------------------------------------------------------
// Two-level iterator
// ------------------------------------------------------------------------------------------------

/// Opens the data cursor designated by an index value.
pub type BlockFn = Box<dyn Fn(&[u8]) -> Result<BoxedIter> + Send>;

/// Cascading cursor: an index iterator whose values name data blocks,
/// each opened on demand through a callback.
///
/// Positions are defined by the data iterator; empty data blocks are
/// skipped transparently in both directions.
pub struct TwoLevelIter {
    index_iter: BoxedIter,
    block_fn: BlockFn,
    data_iter: Option<BoxedIter>,
    /// Index value the current `data_iter` was opened from, so a
    /// repositioned index does not reopen the same block.
    data_handle: Vec<u8>,
    status: Option<Error>,
}

impl TwoLevelIter {
    /// Build a two-level cursor from an index and a block opener.
    pub fn new(index_iter: BoxedIter, block_fn: BlockFn) -> Self {
        TwoLevelIter {
            index_iter,
            block_fn,
            data_iter: None,
            data_handle: Vec::new(),
            status: None,
        }
    }

    fn save_error(&mut self, err: Error) {
        if self.status.is_none() {
            self.status = Some(err);
        }
    }

    fn init_data_block(&mut self) {
        if !self.index_iter.valid() {
            self.data_iter = None;
            return;
        }
        let handle = self.index_iter.value().to_vec();
        if self.data_iter.is_some() && handle == self.data_handle {
            return;
        }
        match (self.block_fn)(&handle) {
            Ok(iter) => {
                self.data_handle = handle;
                self.data_iter = Some(iter);
            }
            Err(e) => {
                self.save_error(e);
                self.data_iter = None;
            }
        }
    }

    fn skip_empty_data_blocks_forward(&mut self) {
        while self.data_iter.as_ref().is_none_or(|it| !it.valid()) {
            if !self.index_iter.valid() {
                self.data_iter = None;
                return;
            }
            self.index_iter.next();
            self.init_data_block();
            if let Some(it) = &mut self.data_iter {
                it.seek_to_first();
            }
        }
    }

    fn skip_empty_data_blocks_backward(&mut self) {
        while self.data_iter.as_ref().is_none_or(|it| !it.valid()) {
            if !self.index_iter.valid() {
                self.data_iter = None;
                return;
            }
            self.index_iter.prev();
            self.init_data_block();
            if let Some(it) = &mut self.data_iter {
                it.seek_to_last();
            }
        }
    }
}

impl Iter for TwoLevelIter {
    fn valid(&self) -> bool {
        self.data_iter.as_ref().is_some_and(|it| it.valid())
    }

    fn seek_to_first(&mut self) {
        self.index_iter.seek_to_first();
        self.init_data_block();
        if let Some(it) = &mut self.data_iter {
            it.seek_to_first();
        }
        self.skip_empty_data_blocks_forward();
    }

    fn seek_to_last(&mut self) {
        self.index_iter.seek_to_last();
        self.init_data_block();
        if let Some(it) = &mut self.data_iter {
            it.seek_to_last();
        }
        self.skip_empty_data_blocks_backward();
    }

    fn seek(&mut self, target: &[u8]) {
        self.index_iter.seek(target);
        self.init_data_block();
        if let Some(it) = &mut self.data_iter {
            it.seek(target);
        }
        self.skip_empty_data_blocks_forward();
    }

    fn next(&mut self) {
        if let Some(it) = &mut self.data_iter {
            it.next();
        }
        self.skip_empty_data_blocks_forward();
    }

    fn prev(&mut self) {
        if let Some(it) = &mut self.data_iter {
            it.prev();
        }
        self.skip_empty_data_blocks_backward();
    }

    fn key(&self) -> &[u8] {
        self.data_iter
            .as_ref()
            .expect("key() on invalid two-level iterator")
            .key()
    }

    fn value(&self) -> &[u8] {
        self.data_iter
            .as_ref()
            .expect("value() on invalid two-level iterator")
            .value()
    }

    fn status(&self) -> Result<()> {
        self.index_iter.status()?;
        if let Some(it) = &self.data_iter {
            it.status()?;
        }
        match &self.status {
            None => Ok(()),
            Some(e) => Err(e.clone()),
        }
    }
}
