//! Snapshots: pinned sequence numbers.
//!
//! A [`Snapshot`] fixes the sequence number reads resolve against, so a
//! holder sees the database exactly as it was at acquisition. Live
//! snapshots also pin compaction: entries at or above the oldest
//! snapshot's sequence are never dropped by a merge.
//!
//! Release is `Drop`-based — letting the handle go unregisters it from
//! the engine's snapshot list.

use std::sync::{Arc, Weak};

use crate::keys::SequenceNumber;

use super::EngineInner;

/// Registered state of one snapshot.
pub(crate) struct SnapshotHandle {
    pub sequence: SequenceNumber,
    pub id: u64,
}

/// Ordered list of live snapshots (oldest first), guarded by the
/// engine mutex.
#[derive(Default)]
pub(crate) struct SnapshotList {
    entries: Vec<Arc<SnapshotHandle>>,
    next_id: u64,
}

impl SnapshotList {
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Sequence of the oldest live snapshot.
    pub fn oldest(&self) -> Option<SequenceNumber> {
        self.entries.first().map(|h| h.sequence)
    }

    pub fn register(&mut self, sequence: SequenceNumber) -> Arc<SnapshotHandle> {
        let handle = Arc::new(SnapshotHandle {
            sequence,
            id: self.next_id,
        });
        self.next_id += 1;
        self.entries.push(Arc::clone(&handle));
        handle
    }

    pub fn unregister(&mut self, id: u64) {
        self.entries.retain(|h| h.id != id);
    }
}

/// A point-in-time view of the database.
///
/// Obtained from [`Engine::snapshot`](super::Engine::snapshot); passed
/// to reads and iterators. Dropping the handle releases the pin.
pub struct Snapshot {
    pub(crate) handle: Arc<SnapshotHandle>,
    pub(crate) engine: Weak<EngineInner>,
}

impl Snapshot {
    /// The pinned sequence number.
    pub(crate) fn sequence(&self) -> SequenceNumber {
        self.handle.sequence
    }
}

impl Drop for Snapshot {
    fn drop(&mut self) {
        if let Some(engine) = self.engine.upgrade() {
            let mut state = engine.state.lock();
            state.snapshots.unregister(self.handle.id);
        }
    }
}
