mod tests_set;

use std::path::Path;
use std::sync::Arc;

use crate::cache::table_cache::TableCache;
use crate::keys::{BytewiseComparator, InternalKey, InternalKeyComparator, ValueType};
use crate::options::Options;
use crate::version::edit::FileMetaData;

pub fn icmp() -> InternalKeyComparator {
    InternalKeyComparator::new(Arc::new(BytewiseComparator))
}

pub fn table_cache(db_path: &Path) -> Arc<TableCache> {
    Arc::new(TableCache::new(
        db_path.to_path_buf(),
        Options::default(),
        icmp(),
        100,
        None,
    ))
}

/// Fabricate metadata for a file spanning `[smallest, largest]` user
/// keys at the given sequences.
pub fn file(number: u64, smallest: &[u8], small_seq: u64, largest: &[u8], large_seq: u64) -> Arc<FileMetaData> {
    Arc::new(FileMetaData::new(
        number,
        number * 1000,
        InternalKey::new(smallest, small_seq, ValueType::Value),
        InternalKey::new(largest, large_seq, ValueType::Value),
    ))
}
