//! Tests for internal-key packing, parsing, and lookup keys.

use crate::keys::*;

#[test]
fn pack_and_parse_roundtrip() {
    let mut buf = Vec::new();
    append_internal_key(&mut buf, b"widget", 42, ValueType::Value);
    assert_eq!(buf.len(), b"widget".len() + 8);

    let parsed = parse_internal_key(&buf).unwrap();
    assert_eq!(parsed.user_key, b"widget");
    assert_eq!(parsed.sequence, 42);
    assert_eq!(parsed.value_type, ValueType::Value);
}

#[test]
fn tombstone_roundtrip() {
    let key = InternalKey::new(b"gone", 7, ValueType::Deletion);
    let parsed = parse_internal_key(key.encoded()).unwrap();
    assert_eq!(parsed.value_type, ValueType::Deletion);
    assert_eq!(parsed.sequence, 7);
    assert_eq!(key.user_key(), b"gone");
}

#[test]
fn empty_user_key_is_valid() {
    let key = InternalKey::new(b"", 1, ValueType::Value);
    assert_eq!(key.encoded().len(), 8);
    assert_eq!(key.user_key(), b"");
    let parsed = parse_internal_key(key.encoded()).unwrap();
    assert_eq!(parsed.user_key, b"");
}

#[test]
fn user_key_with_null_bytes_preserved() {
    let raw = b"\x00a\x00b\x00";
    let key = InternalKey::new(raw, 9, ValueType::Value);
    assert_eq!(key.user_key(), raw);
}

#[test]
fn max_sequence_number_roundtrips() {
    let mut buf = Vec::new();
    append_internal_key(&mut buf, b"k", MAX_SEQUENCE_NUMBER, ValueType::Value);
    let parsed = parse_internal_key(&buf).unwrap();
    assert_eq!(parsed.sequence, MAX_SEQUENCE_NUMBER);
}

#[test]
fn short_buffer_is_corruption() {
    assert!(parse_internal_key(b"short").unwrap_err().is_corruption());
    assert!(parse_internal_key(b"").unwrap_err().is_corruption());
}

#[test]
fn unknown_type_tag_is_corruption() {
    let mut buf = Vec::new();
    buf.extend_from_slice(b"key");
    buf.extend_from_slice(&((5u64 << 8) | 0x7f).to_le_bytes());
    assert!(parse_internal_key(&buf).unwrap_err().is_corruption());
}

#[test]
fn lookup_key_exposes_both_views() {
    let lk = LookupKey::new(b"needle", 100);
    assert_eq!(lk.user_key(), b"needle");
    let parsed = parse_internal_key(lk.internal_key()).unwrap();
    assert_eq!(parsed.user_key, b"needle");
    assert_eq!(parsed.sequence, 100);
    assert_eq!(parsed.value_type, VALUE_TYPE_FOR_SEEK);
}

#[test]
fn decode_from_rejects_garbage() {
    assert!(InternalKey::decode_from(b"abc").is_err());
    let valid = InternalKey::new(b"abc", 3, ValueType::Value);
    let redecoded = InternalKey::decode_from(valid.encoded()).unwrap();
    assert_eq!(redecoded, valid);
}
