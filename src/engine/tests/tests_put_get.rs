//! Basic point operations through the full engine.

use tempfile::TempDir;

use super::helpers::*;

#[test]
fn put_get_delete_cycle() {
    let dir = TempDir::new().unwrap();
    let db = open(dir.path(), memtable_only_options());

    put(&db, b"a", b"1");
    put(&db, b"b", b"2");
    assert_eq!(get(&db, b"a"), Some(b"1".to_vec()));

    delete(&db, b"a");
    assert_eq!(get(&db, b"a"), None);
    assert_eq!(get(&db, b"b"), Some(b"2".to_vec()));
}

#[test]
fn get_of_never_written_key_is_none() {
    let dir = TempDir::new().unwrap();
    let db = open(dir.path(), memtable_only_options());
    assert_eq!(get(&db, b"ghost"), None);
}

#[test]
fn overwrite_returns_latest_value() {
    let dir = TempDir::new().unwrap();
    let db = open(dir.path(), memtable_only_options());
    put(&db, b"k", b"v1");
    put(&db, b"k", b"v2");
    put(&db, b"k", b"v3");
    assert_eq!(get(&db, b"k"), Some(b"v3".to_vec()));
}

#[test]
fn empty_key_and_empty_value() {
    let dir = TempDir::new().unwrap();
    let db = open(dir.path(), memtable_only_options());
    put(&db, b"", b"empty-key");
    put(&db, b"empty-value", b"");
    assert_eq!(get(&db, b""), Some(b"empty-key".to_vec()));
    assert_eq!(get(&db, b"empty-value"), Some(Vec::new()));
}

#[test]
fn binary_keys_preserved_exactly() {
    let dir = TempDir::new().unwrap();
    let db = open(dir.path(), memtable_only_options());
    let key = b"\x00\x01\xff\x00tail";
    let value: Vec<u8> = (0..=255).collect();
    put(&db, key, &value);
    assert_eq!(get(&db, key), Some(value));
    // Similar but distinct binary key stays distinct.
    assert_eq!(get(&db, b"\x00\x01\xff\x00tails"), None);
}

#[test]
fn delete_of_missing_key_is_ok() {
    let dir = TempDir::new().unwrap();
    let db = open(dir.path(), memtable_only_options());
    delete(&db, b"never-existed");
    assert_eq!(get(&db, b"never-existed"), None);
}

#[test]
fn values_survive_memtable_rotation() {
    let dir = TempDir::new().unwrap();
    let db = open(dir.path(), small_buffer_options());
    // Push well past one write buffer.
    for i in 0..2000 {
        put(
            &db,
            format!("key{i:05}").as_bytes(),
            format!("value-{i:05}-{}", "x".repeat(32)).as_bytes(),
        );
    }
    for i in (0..2000).step_by(97) {
        assert_eq!(
            get(&db, format!("key{i:05}").as_bytes()),
            Some(format!("value-{i:05}-{}", "x".repeat(32)).into_bytes()),
            "key{i:05}"
        );
    }
}

#[test]
fn open_missing_without_create_flag_fails() {
    let dir = TempDir::new().unwrap();
    let path = dir.path().join("nonexistent");
    let options = crate::options::Options::default();
    let err = crate::engine::Engine::open(options, &path).unwrap_err();
    assert!(matches!(err, crate::error::Error::InvalidArgument(_)));
}

#[test]
fn error_if_exists_rejects_second_create() {
    let dir = TempDir::new().unwrap();
    {
        let _db = open(dir.path(), memtable_only_options());
    }
    let options = crate::options::Options {
        create_if_missing: true,
        error_if_exists: true,
        ..Default::default()
    };
    assert!(crate::engine::Engine::open(options, dir.path()).is_err());
}

#[test]
fn second_process_style_open_is_locked_out() {
    let dir = TempDir::new().unwrap();
    let _db = open(dir.path(), memtable_only_options());
    // The advisory lock is per open file description, so a second open
    // within this process also fails.
    let options = crate::options::Options {
        create_if_missing: true,
        ..Default::default()
    };
    assert!(crate::engine::Engine::open(options, dir.path()).is_err());
}
