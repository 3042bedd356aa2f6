//! Best-effort database repair.
//!
//! Rebuilds the manifest from whatever survives on disk: every log
//! segment is replayed (tolerating torn tails) into fresh level-0
//! tables, every readable table file is re-registered at level 0 with
//! bounds and sequences recovered by scanning it, and a new manifest
//! naming the result replaces the old chain.
//!
//! Repair favors recovering *something* over recovering everything:
//! unreadable tables are skipped, and writes newer than the surviving
//! files are gone. It is the tool of last resort after manifest loss or
//! corruption.

use std::fs::{self, File, OpenOptions};
use std::path::Path;
use std::sync::Arc;

use tracing::{info, warn};

use crate::batch::WriteBatch;
use crate::cache::table_cache::TableCache;
use crate::error::Result;
use crate::filename::{
    lock_file_name, log_file_name, manifest_file_name, parse_file_name, set_current_file, FileType,
};
use crate::flock::FileLock;
use crate::keys::{parse_internal_key, InternalKey, InternalKeyComparator};
use crate::memtable::Memtable;
use crate::options::{Options, ReadOptions};
use crate::version::VersionEdit;
use crate::wal::{LogReader, LogWriter};

/// Metadata recovered for one surviving table.
struct RecoveredTable {
    number: u64,
    file_size: u64,
    smallest: InternalKey,
    largest: InternalKey,
    max_sequence: u64,
}

/// Rebuild the manifest of the database at `path` from its files.
pub fn repair(path: impl AsRef<Path>, options: Options) -> Result<()> {
    let db_path = path.as_ref();
    let icmp = InternalKeyComparator::new(Arc::clone(&options.comparator));
    let _lock = FileLock::lock(lock_file_name(db_path))?;

    // Inventory the directory.
    let mut logs: Vec<u64> = Vec::new();
    let mut table_numbers: Vec<u64> = Vec::new();
    let mut manifests: Vec<u64> = Vec::new();
    let mut max_number = 1;
    for entry in fs::read_dir(db_path)? {
        let entry = entry?;
        let name = entry.file_name();
        let Some((file_type, number)) = parse_file_name(&name.to_string_lossy()) else {
            continue;
        };
        max_number = max_number.max(number);
        match file_type {
            FileType::Log => logs.push(number),
            FileType::Table => table_numbers.push(number),
            FileType::Manifest => manifests.push(number),
            _ => {}
        }
    }
    logs.sort_unstable();
    table_numbers.sort_unstable();
    let mut next_file_number = max_number + 1;

    let table_cache = Arc::new(TableCache::new(
        db_path.to_path_buf(),
        options.clone(),
        icmp.clone(),
        options.max_open_files.max(16),
        None,
    ));

    // Convert every log segment into a level-0 table.
    for &log_number in &logs {
        let file_number = next_file_number;
        next_file_number += 1;
        match convert_log_to_table(
            db_path,
            &options,
            &icmp,
            &table_cache,
            log_number,
            file_number,
        ) {
            Ok(true) => table_numbers.push(file_number),
            Ok(false) => {}
            Err(e) => warn!(log = log_number, "skipping unreadable log: {e}"),
        }
        let _ = fs::remove_file(log_file_name(db_path, log_number));
    }

    // Scan surviving tables for their bounds and sequences.
    let mut recovered: Vec<RecoveredTable> = Vec::new();
    let mut max_sequence = 0u64;
    for &number in &table_numbers {
        match scan_table(db_path, &table_cache, number) {
            Ok(Some(table)) => {
                max_sequence = max_sequence.max(table.max_sequence);
                recovered.push(table);
            }
            Ok(None) => warn!(table = number, "skipping empty table"),
            Err(e) => warn!(table = number, "skipping unreadable table: {e}"),
        }
    }

    // Write the replacement manifest.
    let manifest_number = next_file_number;
    next_file_number += 1;
    let mut edit = VersionEdit::new();
    edit.set_comparator_name(icmp.user_comparator().name());
    edit.set_log_number(0);
    edit.set_next_file_number(next_file_number);
    edit.set_last_sequence(max_sequence);
    for table in &recovered {
        // Level 0 tolerates overlapping ranges, so every recovered
        // table can land there; compaction sorts the tree out later.
        edit.add_file(
            0,
            table.number,
            table.file_size,
            table.smallest.clone(),
            table.largest.clone(),
        );
    }

    let manifest_path = manifest_file_name(db_path, manifest_number);
    let file = OpenOptions::new()
        .create_new(true)
        .write(true)
        .open(&manifest_path)?;
    let mut log = LogWriter::new(file);
    let mut record = Vec::new();
    edit.encode_to(&mut record);
    if let Err(e) = log.add_record(&record).and_then(|_| log.sync()) {
        let _ = fs::remove_file(&manifest_path);
        return Err(e);
    }
    set_current_file(db_path, manifest_number)?;

    for &old in &manifests {
        let _ = fs::remove_file(manifest_file_name(db_path, old));
    }

    info!(
        tables = recovered.len(),
        logs = logs.len(),
        last_sequence = max_sequence,
        "repair complete"
    );
    Ok(())
}

/// Replay one log into a table file. Returns false when the log held no
/// applicable records.
fn convert_log_to_table(
    db_path: &Path,
    options: &Options,
    icmp: &InternalKeyComparator,
    table_cache: &Arc<TableCache>,
    log_number: u64,
    file_number: u64,
) -> Result<bool> {
    let file = File::open(log_file_name(db_path, log_number))?;
    let mut reader = LogReader::new(file);
    let mem = Arc::new(Memtable::new(icmp.clone()));
    loop {
        match reader.read_record() {
            Ok(Some(record)) => match WriteBatch::from_contents(record) {
                Ok(batch) => {
                    if let Err(e) = batch.insert_into(&mem) {
                        warn!(log = log_number, "dropping undecodable batch: {e}");
                    }
                }
                Err(e) => warn!(log = log_number, "dropping malformed record: {e}"),
            },
            Ok(None) => break,
            Err(e) => {
                warn!(log = log_number, "log ends with corruption: {e}");
                break;
            }
        }
    }
    if mem.is_empty() {
        return Ok(false);
    }
    let mut iter = mem.iter();
    let built = super::build_table_file(db_path, options, icmp, table_cache, file_number, &mut iter)?;
    Ok(built.is_some())
}

/// Read a table end to end, collecting bounds and the highest sequence.
fn scan_table(
    db_path: &Path,
    table_cache: &Arc<TableCache>,
    number: u64,
) -> Result<Option<RecoveredTable>> {
    let path = crate::filename::table_file_name(db_path, number);
    let file_size = match fs::metadata(&path) {
        Ok(meta) => meta.len(),
        Err(_) => fs::metadata(crate::filename::sst_table_file_name(db_path, number))?.len(),
    };

    let mut iter = table_cache.iter(ReadOptions { fill_cache: false }, number, file_size);
    iter.seek_to_first();
    let mut smallest: Option<InternalKey> = None;
    let mut largest: Option<InternalKey> = None;
    let mut max_sequence = 0u64;
    while iter.valid() {
        let key = InternalKey::decode_from(iter.key())?;
        if let Ok(parsed) = parse_internal_key(iter.key()) {
            max_sequence = max_sequence.max(parsed.sequence);
        }
        if smallest.is_none() {
            smallest = Some(key.clone());
        }
        largest = Some(key);
        iter.next();
    }
    iter.status()?;

    match (smallest, largest) {
        (Some(smallest), Some(largest)) => Ok(Some(RecoveredTable {
            number,
            file_size,
            smallest,
            largest,
            max_sequence,
        })),
        _ => Ok(None),
    }
}
