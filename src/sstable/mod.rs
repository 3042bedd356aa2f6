//! Sorted String Table (SSTable) Module
//!
//! This module implements the **immutable**, **disk-backed** sorted
//! table format used for every persistent level of the tree.
//!
//! # On-disk layout
//!
//! ```text
//! [data block][trailer]
//! [data block][trailer]
//! ...
//! [filter block][trailer]          (optional)
//! [meta-index block][trailer]
//! [index block][trailer]
//! [footer: 48 bytes]
//! ```
//!
//! - **Data blocks** hold prefix-compressed internal-key entries
//!   (see [`block`]).
//! - Each block is followed by a 5-byte **trailer**: a compression tag
//!   and a CRC32 over `contents || tag`. Unknown tags are corruption.
//! - The **filter block** maps data-block offsets to filters
//!   (see [`filter_block`]).
//! - The **meta-index block** has one entry, `filter.<policy name>` →
//!   filter block handle, when a filter policy is configured.
//! - The **index block** has one entry per data block: a separator key
//!   ≥ every key in the block and < every key in the next, with the
//!   block's [`BlockHandle`] as value.
//! - The **footer** carries the meta-index and index handles, padding,
//!   and the table magic.
//!
//! # Concurrency model
//!
//! Tables are immutable; a [`Table`] maps its file read-only and serves
//! any number of concurrent readers. Decoded data blocks are shared
//! through the block cache, keyed by `(cache_id, block_offset)` so
//! entries never collide across files.

#[cfg(test)]
mod tests;

pub mod block;
pub mod builder;
pub mod filter_block;

use std::fs::File;
use std::sync::Arc;

use memmap2::Mmap;
use tracing::error;

use crate::cache::ShardedCache;
use crate::encoding::{decode_fixed64, get_varint64, put_fixed64, put_varint64};
use crate::error::{Error, Result};
use crate::iterator::{BoxedIter, Iter, TwoLevelIter};
use crate::keys::{extract_user_key, Comparator, InternalKeyComparator};
use crate::options::{CompressionType, Options, ReadOptions};

use block::Block;
use filter_block::FilterBlockReader;

/// Magic constant terminating every table file.
pub const TABLE_MAGIC: u64 = 0xdb4775248b80fb57;

/// Encoded footer length: two padded handles + magic.
pub const FOOTER_LEN: usize = 48;

/// Per-block trailer: compression tag (1) + CRC32 (4).
pub const BLOCK_TRAILER_SIZE: usize = 5;

/// Meta-index key prefix for the filter block entry.
pub const FILTER_KEY_PREFIX: &str = "filter.";

/// Cache key for decoded data blocks.
pub type BlockCacheKey = (u64, u64);

/// Shared data-block cache type.
pub type BlockCache = ShardedCache<BlockCacheKey, Block>;

// ------------------------------------------------------------------------------------------------
// Block handles and footer
// ------------------------------------------------------------------------------------------------

/// Location of a block within the table file.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct BlockHandle {
    /// File offset of the block contents.
    pub offset: u64,
    /// Length of the contents, excluding the trailer.
    pub size: u64,
}

impl BlockHandle {
    /// Maximum encoded length: two full varint64s.
    pub const MAX_ENCODED_LENGTH: usize = 20;

    /// Append the varint encoding to `buf`.
    pub fn encode_to(&self, buf: &mut Vec<u8>) {
        put_varint64(buf, self.offset);
        put_varint64(buf, self.size);
    }

    /// Decode a handle from the front of `buf`; returns bytes consumed.
    pub fn decode_from(buf: &[u8]) -> Result<(BlockHandle, usize)> {
        let (offset, n1) = get_varint64(buf)?;
        let (size, n2) = get_varint64(&buf[n1..])?;
        Ok((BlockHandle { offset, size }, n1 + n2))
    }
}

/// Fixed-length table footer.
#[derive(Debug, Clone, Copy)]
pub struct Footer {
    /// Handle of the meta-index block.
    pub metaindex_handle: BlockHandle,
    /// Handle of the index block.
    pub index_handle: BlockHandle,
}

impl Footer {
    /// Append the 48-byte encoding to `buf`.
    pub fn encode_to(&self, buf: &mut Vec<u8>) {
        let start = buf.len();
        self.metaindex_handle.encode_to(buf);
        self.index_handle.encode_to(buf);
        buf.resize(start + FOOTER_LEN - 8, 0);
        put_fixed64(buf, TABLE_MAGIC);
    }

    /// Decode a footer from exactly [`FOOTER_LEN`] bytes.
    pub fn decode_from(buf: &[u8]) -> Result<Footer> {
        if buf.len() < FOOTER_LEN {
            return Err(Error::corruption("footer too short"));
        }
        let magic = decode_fixed64(&buf[FOOTER_LEN - 8..])?;
        if magic != TABLE_MAGIC {
            return Err(Error::corruption("bad table magic"));
        }
        let (metaindex_handle, n) = BlockHandle::decode_from(buf)?;
        let (index_handle, _) = BlockHandle::decode_from(&buf[n..])?;
        Ok(Footer {
            metaindex_handle,
            index_handle,
        })
    }
}

// ------------------------------------------------------------------------------------------------
// Block compression
// ------------------------------------------------------------------------------------------------

/// Compress a block body per the configured codec.
///
/// Falls back to storing raw bytes when compression does not save at
/// least 1/8 of the size.
pub(crate) fn compress_block(
    contents: &[u8],
    ctype: CompressionType,
) -> Result<(Vec<u8>, CompressionType)> {
    match ctype {
        CompressionType::None => Ok((contents.to_vec(), CompressionType::None)),
        CompressionType::Snappy => {
            let compressed = snap::raw::Encoder::new()
                .compress_vec(contents)
                .map_err(|e| Error::corruption(format!("snappy compression failed: {e}")))?;
            if compressed.len() < contents.len() - contents.len() / 8 {
                Ok((compressed, CompressionType::Snappy))
            } else {
                Ok((contents.to_vec(), CompressionType::None))
            }
        }
        CompressionType::Zstd => {
            let compressed = zstd::bulk::compress(contents, 0)
                .map_err(|e| Error::corruption(format!("zstd compression failed: {e}")))?;
            if compressed.len() < contents.len() - contents.len() / 8 {
                Ok((compressed, CompressionType::Zstd))
            } else {
                Ok((contents.to_vec(), CompressionType::None))
            }
        }
    }
}

/// Undo [`compress_block`] given the trailer tag.
pub(crate) fn decompress_block(data: &[u8], ctype: CompressionType) -> Result<Vec<u8>> {
    match ctype {
        CompressionType::None => Ok(data.to_vec()),
        CompressionType::Snappy => snap::raw::Decoder::new()
            .decompress_vec(data)
            .map_err(|e| Error::corruption(format!("snappy decompression failed: {e}"))),
        CompressionType::Zstd => zstd::stream::decode_all(std::io::Cursor::new(data))
            .map_err(|e| Error::corruption(format!("zstd decompression failed: {e}"))),
    }
}

// ------------------------------------------------------------------------------------------------
// Table reader
// ------------------------------------------------------------------------------------------------

/// An open, immutable table file.
pub struct Table {
    icmp: InternalKeyComparator,
    mmap: Mmap,
    /// Namespaces this table's entries in the shared block cache.
    cache_id: u64,
    block_cache: Option<Arc<BlockCache>>,
    index_block: Arc<Block>,
    filter: Option<FilterBlockReader>,
    metaindex_offset: u64,
}

impl std::fmt::Debug for Table {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Table").finish_non_exhaustive()
    }
}

impl Table {
    /// Open a table file of `file_size` bytes.
    ///
    /// Reads and validates the footer, index block, and (if a policy is
    /// configured) the filter block.
    pub fn open(
        options: &Options,
        icmp: InternalKeyComparator,
        file: &File,
        file_size: u64,
        cache_id: u64,
        block_cache: Option<Arc<BlockCache>>,
    ) -> Result<Table> {
        if (file_size as usize) < FOOTER_LEN {
            return Err(Error::corruption("file is too short to be a table"));
        }
        // Tables are immutable once finished; the mapping stays in sync
        // with the file contents for its whole life.
        let mmap = unsafe { Mmap::map(file)? };
        if mmap.len() < file_size as usize {
            return Err(Error::corruption("table file shorter than recorded size"));
        }

        let footer_start = file_size as usize - FOOTER_LEN;
        let footer = Footer::decode_from(&mmap[footer_start..file_size as usize])?;

        let index_contents = read_block_contents(&mmap, footer.index_handle)?;
        let index_block = Arc::new(Block::new(index_contents)?);

        // Locate the filter block through the meta-index.
        let mut filter = None;
        if let Some(policy) = &options.filter_policy {
            let meta_contents = read_block_contents(&mmap, footer.metaindex_handle)?;
            let meta_block = Arc::new(Block::new(meta_contents)?);
            let meta_cmp: Arc<dyn Comparator> = Arc::new(crate::keys::BytewiseComparator);
            let mut meta_iter = meta_block.iter(meta_cmp);
            let key = format!("{}{}", FILTER_KEY_PREFIX, policy.name());
            meta_iter.seek(key.as_bytes());
            if meta_iter.valid() && meta_iter.key() == key.as_bytes() {
                match BlockHandle::decode_from(meta_iter.value()) {
                    Ok((handle, _)) => {
                        let contents = read_block_contents(&mmap, handle)?;
                        filter = Some(FilterBlockReader::new(Arc::clone(policy), contents));
                    }
                    Err(e) => {
                        // A broken filter pointer costs performance, not
                        // correctness; log and read without it.
                        error!("ignoring undecodable filter handle: {e}");
                    }
                }
            }
        }

        Ok(Table {
            icmp,
            mmap,
            cache_id,
            block_cache,
            index_block,
            filter,
            metaindex_offset: footer.metaindex_handle.offset,
        })
    }

    fn comparator(&self) -> Arc<dyn Comparator> {
        Arc::new(self.icmp.clone())
    }

    /// Load (or fetch from cache) the data block at `handle`.
    fn data_block(&self, handle: BlockHandle, fill_cache: bool) -> Result<Arc<Block>> {
        let key: BlockCacheKey = (self.cache_id, handle.offset);
        if let Some(cache) = &self.block_cache {
            if let Some(block) = cache.lookup(&key) {
                return Ok(block);
            }
        }
        let contents = read_block_contents(&self.mmap, handle)?;
        let block = Arc::new(Block::new(contents)?);
        if fill_cache {
            if let Some(cache) = &self.block_cache {
                let charge = block.size();
                cache.insert(key, Arc::clone(&block), charge);
            }
        }
        Ok(block)
    }

    /// Cursor over a single data block named by an encoded handle (the
    /// value of an index entry).
    fn block_iter(&self, handle_enc: &[u8], fill_cache: bool) -> Result<BoxedIter> {
        let (handle, _) = BlockHandle::decode_from(handle_enc)?;
        let block = self.data_block(handle, fill_cache)?;
        Ok(Box::new(block.iter(self.comparator())))
    }

    /// Two-level cursor over the whole table.
    pub fn iter(self: &Arc<Self>, read_options: ReadOptions) -> BoxedIter {
        let index_iter = Box::new(self.index_block.iter(self.comparator()));
        let table = Arc::clone(self);
        let fill_cache = read_options.fill_cache;
        Box::new(TwoLevelIter::new(
            index_iter,
            Box::new(move |handle_enc| table.block_iter(handle_enc, fill_cache)),
        ))
    }

    /// Point lookup: the first entry with internal key ≥ `ikey` inside
    /// the one candidate data block, or `None`.
    ///
    /// The caller decides whether the returned entry's user key and
    /// value type actually answer its query.
    pub fn internal_get(
        &self,
        read_options: ReadOptions,
        ikey: &[u8],
    ) -> Result<Option<(Vec<u8>, Vec<u8>)>> {
        let mut index_iter = self.index_block.iter(self.comparator());
        index_iter.seek(ikey);
        if !index_iter.valid() {
            index_iter.status()?;
            return Ok(None);
        }

        let handle_enc = index_iter.value().to_vec();
        if let Some(filter) = &self.filter {
            let (handle, _) = BlockHandle::decode_from(&handle_enc)?;
            if !filter.key_may_match(handle.offset, extract_user_key(ikey)) {
                return Ok(None);
            }
        }

        let mut block_iter = self.block_iter(&handle_enc, read_options.fill_cache)?;
        block_iter.seek(ikey);
        if block_iter.valid() {
            let result = (block_iter.key().to_vec(), block_iter.value().to_vec());
            block_iter.status()?;
            return Ok(Some(result));
        }
        block_iter.status()?;
        Ok(None)
    }

    /// Approximate file offset where `ikey` would live, derived from
    /// the index. Keys past the last block map to the meta area.
    pub fn approximate_offset_of(&self, ikey: &[u8]) -> u64 {
        let mut index_iter = self.index_block.iter(self.comparator());
        index_iter.seek(ikey);
        if index_iter.valid() {
            if let Ok((handle, _)) = BlockHandle::decode_from(index_iter.value()) {
                return handle.offset;
            }
        }
        self.metaindex_offset
    }
}

/// Read, checksum-verify, and decompress the block at `handle`.
fn read_block_contents(mmap: &Mmap, handle: BlockHandle) -> Result<Vec<u8>> {
    let offset = handle.offset as usize;
    let size = handle.size as usize;
    let end = offset
        .checked_add(size)
        .and_then(|e| e.checked_add(BLOCK_TRAILER_SIZE))
        .ok_or_else(|| Error::corruption("block handle overflow"))?;
    if end > mmap.len() {
        return Err(Error::corruption("block handle out of file bounds"));
    }

    let contents = &mmap[offset..offset + size];
    let trailer = &mmap[offset + size..end];
    let tag = trailer[0];
    let expected_crc = u32::from_le_bytes([trailer[1], trailer[2], trailer[3], trailer[4]]);

    let mut hasher = crc32fast::Hasher::new();
    hasher.update(contents);
    hasher.update(&[tag]);
    if hasher.finalize() != expected_crc {
        return Err(Error::corruption("block checksum mismatch"));
    }

    let ctype = CompressionType::from_u8(tag)?;
    decompress_block(contents, ctype)
}
