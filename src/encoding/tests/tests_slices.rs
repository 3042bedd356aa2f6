//! Tests for length-prefixed byte strings.

use crate::encoding::*;

#[test]
fn slice_roundtrip() {
    let mut buf = Vec::new();
    put_length_prefixed_slice(&mut buf, b"hello");
    let (data, consumed) = get_length_prefixed_slice(&buf).unwrap();
    assert_eq!(data, b"hello");
    assert_eq!(consumed, buf.len());
}

#[test]
fn empty_slice_roundtrip() {
    let mut buf = Vec::new();
    put_length_prefixed_slice(&mut buf, b"");
    assert_eq!(buf, [0x00]);
    let (data, consumed) = get_length_prefixed_slice(&buf).unwrap();
    assert!(data.is_empty());
    assert_eq!(consumed, 1);
}

#[test]
fn slice_preserves_null_bytes() {
    let raw = b"\x00mid\x00dle\x00";
    let mut buf = Vec::new();
    put_length_prefixed_slice(&mut buf, raw);
    let (data, _) = get_length_prefixed_slice(&buf).unwrap();
    assert_eq!(data, raw);
}

#[test]
fn consecutive_slices_decode_in_order() {
    let mut buf = Vec::new();
    put_length_prefixed_slice(&mut buf, b"first");
    put_length_prefixed_slice(&mut buf, b"second");
    let (a, n) = get_length_prefixed_slice(&buf).unwrap();
    assert_eq!(a, b"first");
    let (b, _) = get_length_prefixed_slice(&buf[n..]).unwrap();
    assert_eq!(b, b"second");
}

#[test]
fn slice_longer_than_buffer_is_corruption() {
    let mut buf = Vec::new();
    put_varint32(&mut buf, 100);
    buf.extend_from_slice(b"short");
    let err = get_length_prefixed_slice(&buf).unwrap_err();
    assert!(err.is_corruption());
}

#[test]
fn slice_with_large_length_prefix_is_corruption() {
    // Claims u32::MAX bytes follow.
    let mut buf = Vec::new();
    put_varint32(&mut buf, u32::MAX);
    let err = get_length_prefixed_slice(&buf).unwrap_err();
    assert!(err.is_corruption());
}
