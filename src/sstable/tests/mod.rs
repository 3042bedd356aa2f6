
use std::fs::File;
use std::path::Path;
use std::sync::Arc;

use crate::keys::{
    append_internal_key, BytewiseComparator, InternalKeyComparator, ValueType,
};
use crate::options::Options;
use crate::sstable::builder::TableBuilder;
use crate::sstable::Table;

pub fn icmp() -> InternalKeyComparator {
    InternalKeyComparator::new(Arc::new(BytewiseComparator))
}

pub fn ikey(user: &[u8], seq: u64) -> Vec<u8> {
    let mut buf = Vec::new();
    append_internal_key(&mut buf, user, seq, ValueType::Value);
    buf
}

/// Build a table at `path` from `(user_key, seq, value)` triples, which
/// must already be in internal-key order.
pub fn build_table(path: &Path, options: &Options, entries: &[(Vec<u8>, u64, Vec<u8>)]) -> u64 {
    let file = File::create(path).unwrap();
    let mut builder = TableBuilder::new(options.clone(), icmp(), file);
    for (user, seq, value) in entries {
        builder.add(&ikey(user, *seq), value).unwrap();
    }
    builder.finish().unwrap();
    builder.file_size()
}

pub fn open_table(path: &Path, options: &Options, file_size: u64) -> Arc<Table> {
    let file = File::open(path).unwrap();
    Arc::new(Table::open(options, icmp(), &file, file_size, 1, None).unwrap())
}
