//! Block handle and footer codec.

use crate::error::{Result, Status, StatusCode};
use crate::varint::{get_varint64, put_varint64};

pub const MAGIC: u64 = 0xdb47_7524_8b80_fb57;
/// Two block handles, each padded to 20 bytes, plus the 8-byte magic.
pub const FOOTER_LENGTH: usize = 48;
const PADDED_HANDLES_LENGTH: usize = 40;

/// Identifies the payload bytes of a block within the file (excluding its
/// 5-byte trailer).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct BlockHandle {
    pub offset: u64,
    pub size: u64,
}

impl BlockHandle {
    pub fn new(offset: u64, size: u64) -> BlockHandle {
        BlockHandle { offset, size }
    }

    /// Encodes as two varint64s, appended to `out`.
    pub fn encode(&self, out: &mut Vec<u8>) {
        put_varint64(out, self.offset);
        put_varint64(out, self.size);
    }

    /// Decodes a block handle from the front of `buf`, returning the handle
    /// and the number of bytes consumed.
    pub fn decode(buf: &[u8]) -> Result<(BlockHandle, usize)> {
        let (offset, n1) = get_varint64(buf)
            .ok_or_else(|| Status::new(StatusCode::Corruption, "truncated block handle offset"))?;
        let (size, n2) = get_varint64(&buf[n1..])
            .ok_or_else(|| Status::new(StatusCode::Corruption, "truncated block handle size"))?;
        Ok((BlockHandle { offset, size }, n1 + n2))
    }
}

/// The 48 trailing bytes of a finished table: two padded block handles
/// (meta-index, then index) followed by the 8-byte magic number.
#[derive(Debug, Clone, Copy)]
pub struct Footer {
    pub meta_index: BlockHandle,
    pub index: BlockHandle,
}

impl Footer {
    pub fn new(meta_index: BlockHandle, index: BlockHandle) -> Footer {
        Footer { meta_index, index }
    }

    pub fn encode(&self, out: &mut Vec<u8>) {
        let start = out.len();
        self.meta_index.encode(out);
        self.index.encode(out);
        out.resize(start + PADDED_HANDLES_LENGTH, 0);
        out.extend_from_slice(&MAGIC.to_le_bytes());
    }

    pub fn decode(buf: &[u8]) -> Result<Footer> {
        if buf.len() != FOOTER_LENGTH {
            return Err(Status::new(
                StatusCode::Corruption,
                "footer must be exactly 48 bytes",
            ));
        }
        let magic = u64::from_le_bytes(buf[PADDED_HANDLES_LENGTH..].try_into().unwrap());
        if magic != MAGIC {
            return Err(Status::new(StatusCode::Corruption, "bad footer magic"));
        }
        let (meta_index, n1) = BlockHandle::decode(buf)?;
        let (index, _) = BlockHandle::decode(&buf[n1..])?;
        Ok(Footer { meta_index, index })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn blockhandle_roundtrips() {
        let h = BlockHandle::new(890, 777);
        let mut buf = Vec::new();
        h.encode(&mut buf);
        let (h2, n) = BlockHandle::decode(&buf).unwrap();
        assert_eq!(n, buf.len());
        assert_eq!(h, h2);
    }

    #[test]
    fn footer_roundtrips() {
        let f = Footer::new(BlockHandle::new(44, 4), BlockHandle::new(55, 5));
        let mut buf = Vec::new();
        f.encode(&mut buf);
        assert_eq!(buf.len(), FOOTER_LENGTH);

        let f2 = Footer::decode(&buf).unwrap();
        assert_eq!(f2.meta_index, BlockHandle::new(44, 4));
        assert_eq!(f2.index, BlockHandle::new(55, 5));
    }

    #[test]
    fn footer_decode_rejects_bad_magic() {
        let mut buf = vec![0u8; FOOTER_LENGTH];
        assert!(Footer::decode(&buf).is_err());
        buf[FOOTER_LENGTH - 1] = 0xff;
        assert!(Footer::decode(&buf).is_err());
    }

    #[test]
    fn footer_decode_rejects_wrong_length() {
        let buf = vec![0u8; FOOTER_LENGTH - 1];
        assert!(Footer::decode(&buf).is_err());
    }
}
