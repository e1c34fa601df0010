//! Masked CRC32C, as stored in every block trailer.
//!
//! Uses the CRC32 Castagnoli variant and applies the same rotate+bias mask
//! LevelDB uses, so that the stored checksum bytes don't look like a plain
//! CRC32C of the payload -- this avoids degenerate cases where the data
//! itself contains CRC-like byte patterns.

use crc::{crc32, Hasher32};

const MASK_DELTA: u32 = 0xa282_ead8;

/// Computes the raw (unmasked) CRC32C of `data`.
pub fn crc32c(data: &[u8]) -> u32 {
    let mut digest = crc32::Digest::new(crc32::CASTAGNOLI);
    digest.write(data);
    digest.sum32()
}

/// Computes the raw (unmasked) CRC32C of `data` followed by a single extra byte.
///
/// Used for block trailers, where the checksum covers the payload plus the
/// one-byte compression type that precedes the checksum field itself.
pub fn crc32c_extend(data: &[u8], extra: u8) -> u32 {
    let mut digest = crc32::Digest::new(crc32::CASTAGNOLI);
    digest.write(data);
    digest.write(&[extra]);
    digest.sum32()
}

/// Masks a CRC so that it's safe to store inside data that is itself
/// checksummed.
pub fn mask(crc: u32) -> u32 {
    ((crc >> 15) | (crc << 17)).wrapping_add(MASK_DELTA)
}

/// Inverse of `mask`.
pub fn unmask(masked: u32) -> u32 {
    let rot = masked.wrapping_sub(MASK_DELTA);
    (rot >> 17) | (rot << 15)
}
