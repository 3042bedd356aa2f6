//! Write-Ahead Logging (WAL) Module
//!
//! This module implements the **durable**, **append-only** record log used
//! by both the write path (one segment per memtable) and the manifest
//! (a log of version edits). It provides CRC-protected persistence of
//! arbitrary byte records with crash-tolerant replay.
//!
//! # On-disk layout
//!
//! The file is a sequence of fixed-size **32 KiB physical blocks**. A
//! logical record is split into one or more fragments, each carrying a
//! 7-byte header:
//!
//! ```text
//! [crc32 : u32 LE][length : u16 LE][type : u8][payload bytes]
//! ```
//!
//! - `crc32` covers `type || payload`.
//! - `type` is Full, First, Middle, or Last — a record that fits in the
//!   current block is written as one Full fragment; otherwise First,
//!   zero or more Middle, and a Last fragment.
//! - A fragment never crosses a block boundary. If fewer than 7 bytes
//!   remain in a block, the tail is zero-padded and the next fragment
//!   starts in the next block.
//!
//! # Concurrency model
//!
//! - [`LogWriter`] has a single owner (the engine's leader writer, or
//!   the version set for the manifest); callers serialize access.
//! - [`LogReader`] owns its source and is used only during recovery.
//!
//! # Guarantees
//!
//! - **Durability:** [`LogWriter::sync`] flushes the block buffer and
//!   fsyncs the file before returning; callers invoke it per the
//!   requested write options.
//! - **Integrity:** every fragment checksum is verified during replay.
//! - **Torn-tail tolerance:** a record cut short by a crash is reported
//!   as corruption; recovery decides (per `paranoid_checks`) whether to
//!   drop it and keep everything before it, or to fail.

#[cfg(test)]
mod tests;

use std::fs::File;
use std::io::{BufWriter, Read, Write};

use crc32fast::Hasher as Crc32;
use tracing::trace;

use crate::error::{Error, Result};

/// Size of one physical log block.
pub const BLOCK_SIZE: usize = 32 * 1024;

/// Size of the per-fragment header: crc (4) + length (2) + type (1).
pub const HEADER_SIZE: usize = 7;

const TYPE_ZERO: u8 = 0;
const TYPE_FULL: u8 = 1;
const TYPE_FIRST: u8 = 2;
const TYPE_MIDDLE: u8 = 3;
const TYPE_LAST: u8 = 4;
const MAX_RECORD_TYPE: u8 = TYPE_LAST;

// ------------------------------------------------------------------------------------------------
// Writer
// ------------------------------------------------------------------------------------------------

/// Appends framed records to a log file.
pub struct LogWriter {
    dest: BufWriter<File>,
    /// Write offset within the current 32 KiB block.
    block_offset: usize,
}

impl LogWriter {
    /// Wrap a freshly created log file.
    pub fn new(file: File) -> Self {
        LogWriter {
            dest: BufWriter::new(file),
            block_offset: 0,
        }
    }

    /// Wrap a log file being reopened for append, where `initial_len`
    /// bytes are already present.
    pub fn with_initial_length(file: File, initial_len: u64) -> Self {
        LogWriter {
            dest: BufWriter::new(file),
            block_offset: (initial_len as usize) % BLOCK_SIZE,
        }
    }

    /// Append one logical record.
    ///
    /// The record is fragmented across block boundaries as needed. The
    /// data reaches the OS buffer cache; call [`sync`] for durability.
    ///
    /// [`sync`]: LogWriter::sync
    pub fn add_record(&mut self, data: &[u8]) -> Result<()> {
        let mut left = data;
        let mut begin = true;
        loop {
            let leftover = BLOCK_SIZE - self.block_offset;
            if leftover < HEADER_SIZE {
                // Zero-fill the block tail; the next fragment starts fresh.
                if leftover > 0 {
                    const ZEROES: [u8; HEADER_SIZE] = [0; HEADER_SIZE];
                    self.dest.write_all(&ZEROES[..leftover])?;
                }
                self.block_offset = 0;
            }

            let avail = BLOCK_SIZE - self.block_offset - HEADER_SIZE;
            let fragment_len = left.len().min(avail);
            let end = fragment_len == left.len();

            let record_type = match (begin, end) {
                (true, true) => TYPE_FULL,
                (true, false) => TYPE_FIRST,
                (false, true) => TYPE_LAST,
                (false, false) => TYPE_MIDDLE,
            };

            self.emit_physical_record(record_type, &left[..fragment_len])?;
            left = &left[fragment_len..];
            begin = false;
            if end {
                break;
            }
        }
        Ok(())
    }

    /// Flush buffered fragments to the OS.
    pub fn flush(&mut self) -> Result<()> {
        self.dest.flush()?;
        Ok(())
    }

    /// Flush buffered fragments and fsync the file.
    pub fn sync(&mut self) -> Result<()> {
        self.dest.flush()?;
        self.dest.get_ref().sync_all()?;
        Ok(())
    }

    fn emit_physical_record(&mut self, record_type: u8, payload: &[u8]) -> Result<()> {
        debug_assert!(payload.len() <= 0xffff);
        debug_assert!(self.block_offset + HEADER_SIZE + payload.len() <= BLOCK_SIZE);

        let mut hasher = Crc32::new();
        hasher.update(&[record_type]);
        hasher.update(payload);
        let crc = hasher.finalize();

        let mut header = [0u8; HEADER_SIZE];
        header[..4].copy_from_slice(&crc.to_le_bytes());
        header[4..6].copy_from_slice(&(payload.len() as u16).to_le_bytes());
        header[6] = record_type;

        self.dest.write_all(&header)?;
        self.dest.write_all(payload)?;
        self.block_offset += HEADER_SIZE + payload.len();
        trace!(len = payload.len(), record_type, "emitted log fragment");
        Ok(())
    }
}

// ------------------------------------------------------------------------------------------------
// Reader
// ------------------------------------------------------------------------------------------------

/// Replays framed records from a log file.
pub struct LogReader<R: Read> {
    src: R,
    /// Contents of the current block.
    block: Vec<u8>,
    /// Parse position within `block`.
    pos: usize,
    /// True once the source returned a short or empty block.
    hit_file_end: bool,
    /// True when the most recent block was shorter than [`BLOCK_SIZE`]
    /// (a torn tail rather than mid-file damage).
    last_block_partial: bool,
    /// Verify fragment checksums (disabled only in tests).
    checksum: bool,
}

impl<R: Read> LogReader<R> {
    /// Create a reader over `src`, verifying checksums.
    pub fn new(src: R) -> Self {
        LogReader {
            src,
            block: Vec::with_capacity(BLOCK_SIZE),
            pos: 0,
            hit_file_end: false,
            last_block_partial: false,
            checksum: true,
        }
    }

    /// Read the next logical record.
    ///
    /// Returns `Ok(Some(record))`, `Ok(None)` at clean end of log, or
    /// `Err(Corruption)` for checksum mismatches, malformed fragments,
    /// and records cut short by a crash.
    pub fn read_record(&mut self) -> Result<Option<Vec<u8>>> {
        let mut record = Vec::new();
        let mut in_fragmented_record = false;

        loop {
            if self.block.len() - self.pos < HEADER_SIZE {
                if !self.load_next_block()? {
                    if in_fragmented_record {
                        return Err(Error::corruption("log ends inside fragmented record"));
                    }
                    return Ok(None);
                }
                continue;
            }

            let header = &self.block[self.pos..self.pos + HEADER_SIZE];
            let expected_crc = u32::from_le_bytes([header[0], header[1], header[2], header[3]]);
            let length = u16::from_le_bytes([header[4], header[5]]) as usize;
            let record_type = header[6];

            if record_type == TYPE_ZERO && length == 0 && expected_crc == 0 {
                // Zero padding; nothing else lives in this block.
                self.pos = self.block.len();
                continue;
            }

            let payload_start = self.pos + HEADER_SIZE;
            if payload_start + length > self.block.len() {
                if self.last_block_partial {
                    // Writer died mid-fragment.
                    return Err(Error::corruption("truncated record at end of log"));
                }
                return Err(Error::corruption("log fragment overruns block"));
            }

            if record_type > MAX_RECORD_TYPE {
                return Err(Error::corruption(format!(
                    "unknown log fragment type {record_type}"
                )));
            }

            let payload = &self.block[payload_start..payload_start + length];
            if self.checksum {
                let mut hasher = Crc32::new();
                hasher.update(&[record_type]);
                hasher.update(payload);
                if hasher.finalize() != expected_crc {
                    return Err(Error::corruption("log fragment checksum mismatch"));
                }
            }

            let payload = payload.to_vec();
            self.pos = payload_start + length;

            match record_type {
                TYPE_FULL => {
                    if in_fragmented_record {
                        return Err(Error::corruption("full fragment inside fragmented record"));
                    }
                    return Ok(Some(payload));
                }
                TYPE_FIRST => {
                    if in_fragmented_record {
                        return Err(Error::corruption("first fragment inside fragmented record"));
                    }
                    in_fragmented_record = true;
                    record = payload;
                }
                TYPE_MIDDLE => {
                    if !in_fragmented_record {
                        return Err(Error::corruption("middle fragment without first"));
                    }
                    record.extend_from_slice(&payload);
                }
                _ => {
                    // TYPE_LAST
                    if !in_fragmented_record {
                        return Err(Error::corruption("last fragment without first"));
                    }
                    record.extend_from_slice(&payload);
                    return Ok(Some(record));
                }
            }
        }
    }

    /// Pull the next physical block from the source. Returns `false` at
    /// end of file.
    fn load_next_block(&mut self) -> Result<bool> {
        if self.hit_file_end {
            return Ok(false);
        }
        self.block.clear();
        self.block.resize(BLOCK_SIZE, 0);
        let mut filled = 0;
        while filled < BLOCK_SIZE {
            let n = self.src.read(&mut self.block[filled..])?;
            if n == 0 {
                break;
            }
            filled += n;
        }
        self.block.truncate(filled);
        self.pos = 0;
        if filled < BLOCK_SIZE {
            self.hit_file_end = true;
            self.last_block_partial = true;
        }
        Ok(filled > 0)
    }
}
