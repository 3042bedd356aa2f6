//! Version-set behavior: manifest persistence, builder invariants, and
//! compaction picking.

use std::sync::Arc;

use tempfile::TempDir;

use super::{icmp, table_cache};
use crate::error::Error;
use crate::filename::current_file_name;
use crate::keys::{InternalKey, ValueType};
use crate::version::set::{Builder, VersionSet};
use crate::version::{Version, VersionEdit, L0_COMPACTION_TRIGGER, NUM_LEVELS};

fn new_set(dir: &TempDir) -> VersionSet {
    VersionSet::new(
        dir.path().to_path_buf(),
        crate::options::Options::default(),
        icmp(),
        table_cache(dir.path()),
    )
}

fn add_file_edit(level: usize, number: u64, smallest: &[u8], largest: &[u8]) -> VersionEdit {
    let mut edit = VersionEdit::new();
    edit.add_file(
        level,
        number,
        1000,
        InternalKey::new(smallest, number * 10, ValueType::Value),
        InternalKey::new(largest, number * 10 + 1, ValueType::Value),
    );
    edit
}

#[test]
fn log_and_apply_persists_across_recover() {
    let dir = TempDir::new().unwrap();
    {
        let mut set = new_set(&dir);
        let mut edit = add_file_edit(1, 7, b"a", b"m");
        edit.set_log_number(0);
        set.set_last_sequence(55);
        set.log_and_apply(&mut edit).unwrap();
        assert!(current_file_name(dir.path()).exists());
        assert_eq!(set.num_level_files(1), 1);
    }
    {
        let mut set = new_set(&dir);
        set.recover().unwrap();
        assert_eq!(set.num_level_files(1), 1);
        assert_eq!(set.last_sequence(), 55);
        assert_eq!(set.current().files[1][0].number, 7);
    }
}

#[test]
fn recover_without_current_file_fails() {
    let dir = TempDir::new().unwrap();
    let mut set = new_set(&dir);
    assert!(set.recover().is_err());
}

#[test]
fn recover_rejects_comparator_mismatch() {
    let dir = TempDir::new().unwrap();
    {
        let mut set = new_set(&dir);
        let mut edit = VersionEdit::new();
        edit.set_comparator_name("some.other.Comparator");
        set.log_and_apply(&mut edit).unwrap();
    }
    // The snapshot record carries our comparator, but the explicit edit
    // carries a foreign one; recovery must reject it.
    let mut set = new_set(&dir);
    let err = set.recover().unwrap_err();
    assert!(matches!(err, Error::InvalidArgument(_)));
}

#[test]
fn deleted_files_disappear_from_next_version() {
    let dir = TempDir::new().unwrap();
    let mut set = new_set(&dir);
    set.log_and_apply(&mut add_file_edit(2, 4, b"a", b"c")).unwrap();
    set.log_and_apply(&mut add_file_edit(2, 5, b"e", b"g")).unwrap();
    assert_eq!(set.num_level_files(2), 2);

    let mut edit = VersionEdit::new();
    edit.remove_file(2, 4);
    set.log_and_apply(&mut edit).unwrap();
    assert_eq!(set.num_level_files(2), 1);
    assert_eq!(set.current().files[2][0].number, 5);
}

#[test]
fn file_numbers_are_never_reissued_after_recovery() {
    let dir = TempDir::new().unwrap();
    let first_allocated;
    {
        let mut set = new_set(&dir);
        let mut edit = add_file_edit(1, 3, b"a", b"b");
        set.log_and_apply(&mut edit).unwrap();
        first_allocated = set.new_file_number();
    }
    let mut set = new_set(&dir);
    set.recover().unwrap();
    let after_recover = set.new_file_number();
    assert!(after_recover > first_allocated || after_recover >= 3);
}

#[test]
fn builder_sorts_levels_and_detects_overlap() {
    let dir = TempDir::new().unwrap();
    let base = Arc::new(Version::new(icmp(), table_cache(dir.path())));
    let mut compact_pointers = vec![Vec::new(); NUM_LEVELS];

    let mut edit = VersionEdit::new();
    edit.add_file(
        1,
        2,
        100,
        InternalKey::new(b"m", 10, ValueType::Value),
        InternalKey::new(b"p", 11, ValueType::Value),
    );
    edit.add_file(
        1,
        1,
        100,
        InternalKey::new(b"a", 10, ValueType::Value),
        InternalKey::new(b"c", 11, ValueType::Value),
    );

    let mut builder = Builder::new(icmp(), Arc::clone(&base));
    builder.apply(&edit, &mut compact_pointers);
    let mut version = Version::new(icmp(), table_cache(dir.path()));
    builder.save_to(&mut version).unwrap();
    let numbers: Vec<u64> = version.files[1].iter().map(|f| f.number).collect();
    assert_eq!(numbers, vec![1, 2], "sorted by smallest key");

    // Overlapping files at level >= 1 are a corruption.
    let mut bad_edit = VersionEdit::new();
    bad_edit.add_file(
        1,
        3,
        100,
        InternalKey::new(b"b", 10, ValueType::Value),
        InternalKey::new(b"z", 11, ValueType::Value),
    );
    let mut builder = Builder::new(icmp(), Arc::new(version));
    builder.apply(&bad_edit, &mut compact_pointers);
    let mut bad_version = Version::new(icmp(), table_cache(dir.path()));
    assert!(builder.save_to(&mut bad_version).unwrap_err().is_corruption());
}

#[test]
fn level0_sorted_newest_first() {
    let dir = TempDir::new().unwrap();
    let mut set = new_set(&dir);
    set.log_and_apply(&mut add_file_edit(0, 3, b"a", b"z")).unwrap();
    set.log_and_apply(&mut add_file_edit(0, 9, b"a", b"z")).unwrap();
    set.log_and_apply(&mut add_file_edit(0, 6, b"a", b"z")).unwrap();
    let numbers: Vec<u64> = set.current().files[0].iter().map(|f| f.number).collect();
    assert_eq!(numbers, vec![9, 6, 3]);
}

#[test]
fn level0_file_count_drives_compaction_score() {
    let dir = TempDir::new().unwrap();
    let mut set = new_set(&dir);
    for i in 0..L0_COMPACTION_TRIGGER as u64 {
        set.log_and_apply(&mut add_file_edit(0, 10 + i, b"a", b"z"))
            .unwrap();
    }
    assert!(set.needs_compaction());
    assert_eq!(set.current().compaction_level, 0);
    assert!(set.current().compaction_score >= 1.0);
}

#[test]
fn pick_compaction_includes_overlapping_level1_files() {
    let dir = TempDir::new().unwrap();
    let mut set = new_set(&dir);
    for i in 0..L0_COMPACTION_TRIGGER as u64 {
        set.log_and_apply(&mut add_file_edit(0, 10 + i, b"c", b"k"))
            .unwrap();
    }
    set.log_and_apply(&mut add_file_edit(1, 30, b"a", b"d")).unwrap();
    set.log_and_apply(&mut add_file_edit(1, 31, b"j", b"p")).unwrap();
    set.log_and_apply(&mut add_file_edit(1, 32, b"q", b"z")).unwrap();

    let compaction = set.pick_compaction().expect("needs compaction");
    assert_eq!(compaction.level(), 0);
    assert_eq!(compaction.num_input_files(0), L0_COMPACTION_TRIGGER);
    let level1: Vec<u64> = compaction.inputs[1].iter().map(|f| f.number).collect();
    assert_eq!(level1, vec![30, 31], "only overlapping level-1 files");
}

#[test]
fn seek_triggered_compaction_when_no_size_pressure() {
    let dir = TempDir::new().unwrap();
    let mut set = new_set(&dir);
    set.log_and_apply(&mut add_file_edit(1, 5, b"a", b"m")).unwrap();
    assert!(!set.needs_compaction());

    // Exhaust the file's seek budget.
    let target = Arc::clone(&set.current().files[1][0]);
    let stats = Some((1, Arc::clone(&target)));
    while !set.current().update_stats(stats.clone()) {}
    assert!(set.needs_compaction());

    let compaction = set.pick_compaction().expect("seek-triggered");
    assert_eq!(compaction.level(), 1);
    assert_eq!(compaction.input(0, 0).number, 5);
}

#[test]
fn live_files_cover_all_referenced_versions() {
    let dir = TempDir::new().unwrap();
    let mut set = new_set(&dir);
    set.log_and_apply(&mut add_file_edit(1, 5, b"a", b"c")).unwrap();
    let old_version = Arc::clone(set.current());

    let mut edit = VersionEdit::new();
    edit.remove_file(1, 5);
    edit.add_file(
        1,
        6,
        100,
        InternalKey::new(b"a", 1, ValueType::Value),
        InternalKey::new(b"c", 2, ValueType::Value),
    );
    set.log_and_apply(&mut edit).unwrap();

    // File 5 is gone from current but pinned by the old version.
    let live = set.live_files();
    assert!(live.contains(&5));
    assert!(live.contains(&6));

    drop(old_version);
    let live = set.live_files();
    assert!(!live.contains(&5));
    assert!(live.contains(&6));
}

#[test]
fn compact_pointer_round_robins_within_level() {
    let dir = TempDir::new().unwrap();
    let mut set = new_set(&dir);
    // Two disjoint files at level 1, enough bytes to need compaction is
    // not required: drive pick via manual compact_range instead.
    set.log_and_apply(&mut add_file_edit(1, 5, b"a", b"c")).unwrap();
    set.log_and_apply(&mut add_file_edit(1, 6, b"e", b"g")).unwrap();

    let c1 = set
        .compact_range(1, None, None)
        .expect("files exist at level 1");
    assert!(c1.num_input_files(0) >= 1);
}
