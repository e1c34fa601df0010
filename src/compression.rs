//! Pluggable block compression.
//!
//! Blocks are compressed with Snappy by default; a compressor can decline a
//! particular block (if the result isn't worth storing) and the caller falls
//! back to storing it raw.

use crate::error::{Result, Status, StatusCode};

/// On-disk compression type byte, stored in every block trailer.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum CompressionType {
    None = 0,
    Snappy = 1,
}

/// A pluggable, pure compressor. `compress` may decline to compress (e.g. if
/// it determines the result isn't worth it) by returning `None`; the caller
/// falls back to storing the block uncompressed.
pub trait Compressor {
    fn compress(&self, raw: &[u8]) -> Option<Vec<u8>>;
    fn compression_type(&self) -> CompressionType;
}

#[derive(Default, Clone, Copy)]
pub struct NoneCompressor;

impl Compressor for NoneCompressor {
    fn compress(&self, _raw: &[u8]) -> Option<Vec<u8>> {
        None
    }

    fn compression_type(&self) -> CompressionType {
        CompressionType::None
    }
}

#[derive(Default, Clone, Copy)]
pub struct SnappyCompressor;

impl Compressor for SnappyCompressor {
    fn compress(&self, raw: &[u8]) -> Option<Vec<u8>> {
        snap::raw::Encoder::new().compress_vec(raw).ok()
    }

    fn compression_type(&self) -> CompressionType {
        CompressionType::Snappy
    }
}

/// Decompresses a snappy-compressed block. Exposed for the test-only decode
/// path that verifies round-trips; a full table reader is out of scope here.
pub fn decompress_snappy(compressed: &[u8]) -> Result<Vec<u8>> {
    snap::raw::Decoder::new()
        .decompress_vec(compressed)
        .map_err(|e| Status::new(StatusCode::CompressionError, &e.to_string()))
}
