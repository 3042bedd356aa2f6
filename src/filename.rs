//! Database directory layout.
//!
//! All files live directly under the database directory:
//!
//! - `CURRENT` — name of the active manifest, newline-terminated.
//! - `LOCK` — advisory exclusive lock.
//! - `MANIFEST-NNNNNN` — version edit log.
//! - `NNNNNN.log` — write-ahead log segments.
//! - `NNNNNN.ldb` — table files (`NNNNNN.sst` accepted when reading).
//! - `NNNNNN.dbtmp` — scratch files for atomic `CURRENT` updates.

use std::fs::{self, File, OpenOptions};
use std::io::Write;
use std::path::{Path, PathBuf};

use crate::error::Result;

/// Kind of a file found in the database directory.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FileType {
    /// `NNNNNN.log`
    Log,
    /// `LOCK`
    Lock,
    /// `NNNNNN.ldb` or `NNNNNN.sst`
    Table,
    /// `MANIFEST-NNNNNN`
    Manifest,
    /// `CURRENT`
    Current,
    /// `NNNNNN.dbtmp`
    Temp,
}

/// `dbname/NNNNNN.log`
pub fn log_file_name(db: &Path, number: u64) -> PathBuf {
    db.join(format!("{number:06}.log"))
}

/// `dbname/NNNNNN.ldb`
pub fn table_file_name(db: &Path, number: u64) -> PathBuf {
    db.join(format!("{number:06}.ldb"))
}

/// `dbname/NNNNNN.sst` — the legacy table suffix, accepted on read.
pub fn sst_table_file_name(db: &Path, number: u64) -> PathBuf {
    db.join(format!("{number:06}.sst"))
}

/// `dbname/MANIFEST-NNNNNN`
pub fn manifest_file_name(db: &Path, number: u64) -> PathBuf {
    db.join(format!("MANIFEST-{number:06}"))
}

/// `dbname/CURRENT`
pub fn current_file_name(db: &Path) -> PathBuf {
    db.join("CURRENT")
}

/// `dbname/LOCK`
pub fn lock_file_name(db: &Path) -> PathBuf {
    db.join("LOCK")
}

/// `dbname/NNNNNN.dbtmp`
pub fn temp_file_name(db: &Path, number: u64) -> PathBuf {
    db.join(format!("{number:06}.dbtmp"))
}

/// Classify a bare file name. Returns `None` for foreign files, which
/// the engine leaves untouched.
pub fn parse_file_name(name: &str) -> Option<(FileType, u64)> {
    match name {
        "CURRENT" => return Some((FileType::Current, 0)),
        "LOCK" => return Some((FileType::Lock, 0)),
        _ => {}
    }
    if let Some(rest) = name.strip_prefix("MANIFEST-") {
        let number = rest.parse::<u64>().ok()?;
        return Some((FileType::Manifest, number));
    }
    if let Some((stem, suffix)) = name.rsplit_once('.') {
        let number = stem.parse::<u64>().ok()?;
        let file_type = match suffix {
            "log" => FileType::Log,
            "ldb" | "sst" => FileType::Table,
            "dbtmp" => FileType::Temp,
            _ => return None,
        };
        return Some((file_type, number));
    }
    None
}

/// Point `CURRENT` at `MANIFEST-<manifest_number>`.
///
/// The new contents are written to a temp file, fsynced, and renamed
/// over `CURRENT` so a crash leaves either the old or the new pointer.
pub fn set_current_file(db: &Path, manifest_number: u64) -> Result<()> {
    let tmp = temp_file_name(db, manifest_number);
    let contents = format!("MANIFEST-{manifest_number:06}\n");
    {
        let mut file = OpenOptions::new()
            .create(true)
            .write(true)
            .truncate(true)
            .open(&tmp)?;
        file.write_all(contents.as_bytes())?;
        file.sync_all()?;
    }
    if let Err(e) = fs::rename(&tmp, current_file_name(db)) {
        let _ = fs::remove_file(&tmp);
        return Err(e.into());
    }
    // Make the rename itself durable.
    if let Ok(dir) = File::open(db) {
        let _ = dir.sync_all();
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn names_follow_the_layout() {
        let db = Path::new("/data/db");
        assert_eq!(log_file_name(db, 7), Path::new("/data/db/000007.log"));
        assert_eq!(table_file_name(db, 42), Path::new("/data/db/000042.ldb"));
        assert_eq!(sst_table_file_name(db, 42), Path::new("/data/db/000042.sst"));
        assert_eq!(
            manifest_file_name(db, 3),
            Path::new("/data/db/MANIFEST-000003")
        );
        assert_eq!(temp_file_name(db, 9), Path::new("/data/db/000009.dbtmp"));
    }

    #[test]
    fn parse_recognizes_every_kind() {
        assert_eq!(parse_file_name("CURRENT"), Some((FileType::Current, 0)));
        assert_eq!(parse_file_name("LOCK"), Some((FileType::Lock, 0)));
        assert_eq!(parse_file_name("MANIFEST-000005"), Some((FileType::Manifest, 5)));
        assert_eq!(parse_file_name("000123.log"), Some((FileType::Log, 123)));
        assert_eq!(parse_file_name("000124.ldb"), Some((FileType::Table, 124)));
        assert_eq!(parse_file_name("000125.sst"), Some((FileType::Table, 125)));
        assert_eq!(parse_file_name("000126.dbtmp"), Some((FileType::Temp, 126)));
    }

    #[test]
    fn parse_rejects_foreign_files() {
        assert!(parse_file_name("README.md").is_none());
        assert!(parse_file_name("000123.tmp").is_none());
        assert!(parse_file_name("MANIFEST-abc").is_none());
        assert!(parse_file_name("notanumber.log").is_none());
        assert!(parse_file_name("").is_none());
    }

    #[test]
    fn set_current_file_is_atomic_and_readable() {
        let dir = TempDir::new().unwrap();
        set_current_file(dir.path(), 12).unwrap();
        let contents = std::fs::read_to_string(current_file_name(dir.path())).unwrap();
        assert_eq!(contents, "MANIFEST-000012\n");
        // No temp residue.
        assert!(!temp_file_name(dir.path(), 12).exists());

        // Re-pointing replaces the old value.
        set_current_file(dir.path(), 13).unwrap();
        let contents = std::fs::read_to_string(current_file_name(dir.path())).unwrap();
        assert_eq!(contents, "MANIFEST-000013\n");
    }
}
