//! Table construction.
//!
//! [`TableBuilder`] consumes internal keys in sorted order and writes a
//! complete table file: data blocks, the optional filter block, the
//! meta-index block, the index block, and the footer. The caller (flush
//! or compaction) drives it entry by entry and calls
//! [`finish`](TableBuilder::finish) once, which makes the file durable.

use std::fs::File;
use std::io::{BufWriter, Write};
use std::sync::Arc;

use tracing::trace;

use crate::error::Result;
use crate::keys::{Comparator, InternalKeyComparator};
use crate::options::{CompressionType, Options};

use super::block::BlockBuilder;
use super::filter_block::FilterBlockBuilder;
use super::{compress_block, BlockHandle, Footer, FILTER_KEY_PREFIX};

/// Streaming writer for one immutable table file.
pub struct TableBuilder {
    options: Options,
    icmp: InternalKeyComparator,
    file: BufWriter<File>,
    offset: u64,
    num_entries: u64,
    data_block: BlockBuilder,
    index_block: BlockBuilder,
    last_key: Vec<u8>,
    /// A data block was just closed; its index entry is deferred until
    /// the next key arrives so the separator can be shortened.
    pending_index_entry: bool,
    pending_handle: BlockHandle,
    filter_block: Option<FilterBlockBuilder>,
    closed: bool,
}

impl TableBuilder {
    /// Start building into `file`.
    pub fn new(options: Options, icmp: InternalKeyComparator, file: File) -> Self {
        let mut filter_block = options
            .filter_policy
            .as_ref()
            .map(|policy| FilterBlockBuilder::new(Arc::clone(policy)));
        if let Some(fb) = &mut filter_block {
            fb.start_block(0);
        }
        let restart_interval = options.block_restart_interval;
        TableBuilder {
            options,
            icmp,
            file: BufWriter::new(file),
            offset: 0,
            num_entries: 0,
            data_block: BlockBuilder::new(restart_interval),
            // Index entries are uncompressible pointers; restart every entry.
            index_block: BlockBuilder::new(1),
            last_key: Vec::new(),
            pending_index_entry: false,
            pending_handle: BlockHandle::default(),
            filter_block,
            closed: false,
        }
    }

    /// Append an entry. `key` is an encoded internal key and must be
    /// strictly greater than every key added before it.
    pub fn add(&mut self, key: &[u8], value: &[u8]) -> Result<()> {
        debug_assert!(!self.closed);

        if self.pending_index_entry {
            debug_assert!(self.data_block.is_empty());
            self.icmp.find_shortest_separator(&mut self.last_key, key);
            let mut handle_enc = Vec::new();
            self.pending_handle.encode_to(&mut handle_enc);
            self.index_block.add(&self.last_key, &handle_enc);
            self.pending_index_entry = false;
        }

        if let Some(fb) = &mut self.filter_block {
            fb.add_internal_key(key);
        }

        self.last_key.clear();
        self.last_key.extend_from_slice(key);
        self.num_entries += 1;
        self.data_block.add(key, value);

        if self.data_block.current_size_estimate() >= self.options.block_size
            && self.data_block.is_at_restart_point()
        {
            self.flush()?;
        }
        Ok(())
    }

    /// Close out the current data block, if any.
    pub fn flush(&mut self) -> Result<()> {
        debug_assert!(!self.closed);
        if self.data_block.is_empty() {
            return Ok(());
        }
        debug_assert!(!self.pending_index_entry);
        self.pending_handle = self.write_data_block()?;
        self.pending_index_entry = true;
        self.file.flush()?;
        if let Some(fb) = &mut self.filter_block {
            fb.start_block(self.offset);
        }
        Ok(())
    }

    /// Finalize the table: filter, meta-index, index, footer; then
    /// flush and fsync the file.
    pub fn finish(&mut self) -> Result<()> {
        self.flush()?;
        debug_assert!(!self.closed);
        self.closed = true;

        // Filter block, stored uncompressed.
        let filter_handle = match &mut self.filter_block {
            Some(fb) => {
                let contents = fb.finish()?.to_vec();
                Some(Self::write_raw(
                    &mut self.file,
                    &mut self.offset,
                    &contents,
                    CompressionType::None,
                )?)
            }
            None => None,
        };

        // Meta-index block: names the filter block, if present.
        let mut meta_block = BlockBuilder::new(self.options.block_restart_interval);
        if let (Some(handle), Some(policy)) = (&filter_handle, &self.options.filter_policy) {
            let key = format!("{}{}", FILTER_KEY_PREFIX, policy.name());
            let mut handle_enc = Vec::new();
            handle.encode_to(&mut handle_enc);
            meta_block.add(key.as_bytes(), &handle_enc);
        }
        let metaindex_handle = Self::write_block(
            &mut self.file,
            &mut self.offset,
            self.options.compression,
            &mut meta_block,
        )?;

        // Index block, with the final separator entry.
        if self.pending_index_entry {
            self.icmp.find_short_successor(&mut self.last_key);
            let mut handle_enc = Vec::new();
            self.pending_handle.encode_to(&mut handle_enc);
            self.index_block.add(&self.last_key, &handle_enc);
            self.pending_index_entry = false;
        }
        let index_handle = Self::write_block(
            &mut self.file,
            &mut self.offset,
            self.options.compression,
            &mut self.index_block,
        )?;

        let footer = Footer {
            metaindex_handle,
            index_handle,
        };
        let mut footer_enc = Vec::new();
        footer.encode_to(&mut footer_enc);
        self.file.write_all(&footer_enc)?;
        self.offset += footer_enc.len() as u64;

        self.file.flush()?;
        self.file.get_ref().sync_all()?;
        trace!(
            entries = self.num_entries,
            bytes = self.offset,
            "finished table"
        );
        Ok(())
    }

    /// Entries added so far.
    pub fn num_entries(&self) -> u64 {
        self.num_entries
    }

    /// Bytes written so far (the final file size once finished).
    pub fn file_size(&self) -> u64 {
        self.offset
    }

    fn write_data_block(&mut self) -> Result<BlockHandle> {
        Self::write_block(
            &mut self.file,
            &mut self.offset,
            self.options.compression,
            &mut self.data_block,
        )
    }

    /// Finish `block`, compress it per `compression`, and write it with
    /// its trailer.
    fn write_block(
        file: &mut BufWriter<File>,
        offset: &mut u64,
        compression: CompressionType,
        block: &mut BlockBuilder,
    ) -> Result<BlockHandle> {
        let contents = block.finish().to_vec();
        let (payload, ctype) = compress_block(&contents, compression)?;
        let handle = Self::write_raw(file, offset, &payload, ctype)?;
        block.reset();
        Ok(handle)
    }

    /// Write `contents` followed by the 5-byte trailer
    /// (compression tag + CRC over contents‖tag).
    fn write_raw(
        file: &mut BufWriter<File>,
        offset: &mut u64,
        contents: &[u8],
        ctype: CompressionType,
    ) -> Result<BlockHandle> {
        let handle = BlockHandle {
            offset: *offset,
            size: contents.len() as u64,
        };
        file.write_all(contents)?;

        let tag = ctype as u8;
        let mut hasher = crc32fast::Hasher::new();
        hasher.update(contents);
        hasher.update(&[tag]);
        let crc = hasher.finalize();

        let mut trailer = [0u8; super::BLOCK_TRAILER_SIZE];
        trailer[0] = tag;
        trailer[1..5].copy_from_slice(&crc.to_le_bytes());
        file.write_all(&trailer)?;

        *offset += contents.len() as u64 + super::BLOCK_TRAILER_SIZE as u64;
        Ok(handle)
    }
}
