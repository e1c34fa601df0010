//! Varint and little-endian fixed-width integer helpers.
//!
//! Thin wrappers around `integer-encoding`'s `VarInt`/`FixedInt` traits:
//! varint32/varint64 with MSB continuation for block entries and block
//! handles, and little-endian u32/u64 fixed-width fields for restart arrays
//! and the footer.

use integer_encoding::{FixedInt, VarInt};

/// Appends `v` to `out` as a varint32 and returns the number of bytes written.
pub fn put_varint32(out: &mut Vec<u8>, v: u32) -> usize {
    let start = out.len();
    out.resize(start + v.required_space(), 0);
    v.encode_var(&mut out[start..])
}

/// Appends `v` to `out` as a varint64 and returns the number of bytes written.
pub fn put_varint64(out: &mut Vec<u8>, v: u64) -> usize {
    let start = out.len();
    out.resize(start + v.required_space(), 0);
    v.encode_var(&mut out[start..])
}

/// Decodes a varint32 from the front of `buf`, returning (value, bytes consumed).
pub fn get_varint32(buf: &[u8]) -> Option<(u32, usize)> {
    u32::decode_var(buf)
}

/// Decodes a varint64 from the front of `buf`, returning (value, bytes consumed).
pub fn get_varint64(buf: &[u8]) -> Option<(u64, usize)> {
    u64::decode_var(buf)
}

/// Appends `v` to `out` as a little-endian fixed u32.
pub fn put_fixed32(out: &mut Vec<u8>, v: u32) {
    let start = out.len();
    out.resize(start + 4, 0);
    v.encode_fixed(&mut out[start..start + 4]);
}

/// Decodes a little-endian fixed u32 from the front of `buf`.
pub fn get_fixed32(buf: &[u8]) -> u32 {
    u32::decode_fixed(&buf[0..4]).expect("4-byte slice")
}
