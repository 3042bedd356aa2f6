mod tests_concurrency;

use std::sync::Arc;

use crate::keys::{BytewiseComparator, InternalKeyComparator};
use crate::memtable::Memtable;

pub fn new_memtable() -> Arc<Memtable> {
    Arc::new(Memtable::new(InternalKeyComparator::new(Arc::new(
        BytewiseComparator,
    ))))
}
