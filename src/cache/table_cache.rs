//! Cache of open table files.
//!
//! Maps file number → open [`Table`] (random-access mapping plus parsed
//! index and filter), bounded by `max_open_files`. Lookups that miss
//! open the file — preferring the `.ldb` suffix, falling back to the
//! legacy `.sst` — and insert the handle with unit charge.

use std::fs::File;
use std::path::PathBuf;
use std::sync::Arc;

use tracing::debug;

use crate::error::{Error, Result};
use crate::filename::{sst_table_file_name, table_file_name};
use crate::iterator::{BoxedIter, EmptyIter};
use crate::keys::InternalKeyComparator;
use crate::options::{Options, ReadOptions};
use crate::sstable::{BlockCache, Table};

use super::ShardedCache;

/// Shared cache of open tables.
pub struct TableCache {
    db_path: PathBuf,
    options: Options,
    icmp: InternalKeyComparator,
    cache: ShardedCache<u64, Table>,
    block_cache: Option<Arc<BlockCache>>,
}

impl TableCache {
    /// A cache holding at most `entries` open tables.
    pub fn new(
        db_path: PathBuf,
        options: Options,
        icmp: InternalKeyComparator,
        entries: usize,
        block_cache: Option<Arc<BlockCache>>,
    ) -> Self {
        TableCache {
            db_path,
            options,
            icmp,
            cache: ShardedCache::new(entries),
            block_cache,
        }
    }

    /// Fetch (opening if necessary) the table for `file_number`.
    pub fn find_table(&self, file_number: u64, file_size: u64) -> Result<Arc<Table>> {
        if let Some(table) = self.cache.lookup(&file_number) {
            return Ok(table);
        }

        let primary = table_file_name(&self.db_path, file_number);
        let file = match File::open(&primary) {
            Ok(f) => f,
            Err(_) => {
                // Files written before the suffix change use `.sst`.
                let legacy = sst_table_file_name(&self.db_path, file_number);
                File::open(&legacy).map_err(|_| {
                    Error::corruption(format!("missing table file {}", primary.display()))
                })?
            }
        };

        let cache_id = match &self.block_cache {
            Some(cache) => cache.new_id(),
            None => 0,
        };
        let table = Arc::new(Table::open(
            &self.options,
            self.icmp.clone(),
            &file,
            file_size,
            cache_id,
            self.block_cache.clone(),
        )?);
        debug!(file_number, file_size, "opened table");
        Ok(self.cache.insert(file_number, table, 1))
    }

    /// Cursor over the whole table; errors surface through the cursor's
    /// status so merge construction never fails midway.
    pub fn iter(&self, read_options: ReadOptions, file_number: u64, file_size: u64) -> BoxedIter {
        match self.find_table(file_number, file_size) {
            Ok(table) => table.iter(read_options),
            Err(e) => Box::new(EmptyIter::with_error(e)),
        }
    }

    /// Point lookup inside one table; see [`Table::internal_get`].
    pub fn get(
        &self,
        read_options: ReadOptions,
        file_number: u64,
        file_size: u64,
        ikey: &[u8],
    ) -> Result<Option<(Vec<u8>, Vec<u8>)>> {
        let table = self.find_table(file_number, file_size)?;
        table.internal_get(read_options, ikey)
    }

    /// Approximate in-file offset of `ikey` for size estimation.
    pub fn approximate_offset_of(&self, file_number: u64, file_size: u64, ikey: &[u8]) -> u64 {
        match self.find_table(file_number, file_size) {
            Ok(table) => table.approximate_offset_of(ikey),
            Err(_) => 0,
        }
    }

    /// Drop the cached handle after the file is deleted.
    pub fn evict(&self, file_number: u64) {
        self.cache.erase(&file_number);
    }
}
