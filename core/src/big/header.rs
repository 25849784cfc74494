//! On-disk header of a partitioned matrix file.
//!
//! | bytes  | field                          |
//! |--------|--------------------------------|
//! | 0..4   | magic `BGRM`                   |
//! | 4..8   | format version (u32, LE)       |
//! | 8..16  | rows (u64, LE)                 |
//! | 16..24 | cols (u64, LE)                 |
//! | 24..28 | dtype tag (u32, LE)            |
//! | 28..32 | reserved, zero                 |
//!
//! Elements follow in row-major order, little-endian.

use crate::error::{Result, RlsError};
use crate::matrix::Dtype;

pub const MAGIC: &[u8; 4] = b"BGRM";
pub const VERSION: u32 = 1;
pub const HEADER_LEN: usize = 32;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Header {
    pub rows: usize,
    pub cols: usize,
    pub dtype: Dtype,
}

impl Header {
    /// Total file length for this header's dimensions.
    pub fn file_len(&self) -> usize {
        HEADER_LEN + self.rows * self.cols * self.dtype.width()
    }

    pub fn encode(&self) -> [u8; HEADER_LEN] {
        let mut out = [0u8; HEADER_LEN];
        out[0..4].copy_from_slice(MAGIC);
        out[4..8].copy_from_slice(&VERSION.to_le_bytes());
        out[8..16].copy_from_slice(&(self.rows as u64).to_le_bytes());
        out[16..24].copy_from_slice(&(self.cols as u64).to_le_bytes());
        out[24..28].copy_from_slice(&self.dtype.tag().to_le_bytes());
        out
    }

    pub fn decode(bytes: &[u8]) -> Result<Self> {
        if bytes.len() < HEADER_LEN || &bytes[0..4] != MAGIC {
            return Err(RlsError::Serialization(
                "not a partitioned matrix file".to_string(),
            ));
        }

        let version = u32::from_le_bytes(le_array(&bytes[4..8]));
        if version != VERSION {
            return Err(RlsError::Serialization(format!(
                "unsupported partitioned matrix version {version}"
            )));
        }

        let tag = u32::from_le_bytes(le_array(&bytes[24..28]));
        let dtype = Dtype::from_tag(tag)
            .ok_or_else(|| RlsError::Serialization(format!("unknown dtype tag {tag}")))?;

        Ok(Self {
            rows: u64::from_le_bytes(le_array(&bytes[8..16])) as usize,
            cols: u64::from_le_bytes(le_array(&bytes[16..24])) as usize,
            dtype,
        })
    }
}

fn le_array<const N: usize>(bytes: &[u8]) -> [u8; N] {
    let mut buf = [0u8; N];
    buf.copy_from_slice(bytes);
    buf
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_header_layout() {
        let header = Header {
            rows: 6,
            cols: 4,
            dtype: Dtype::F64,
        };
        let bytes = header.encode();
        assert_eq!(&bytes[0..4], b"BGRM");
        assert_eq!(bytes[8], 6);
        assert_eq!(bytes[16], 4);
        assert_eq!(Header::decode(&bytes).unwrap(), header);
        assert_eq!(header.file_len(), 32 + 6 * 4 * 8);
    }

    #[test]
    fn test_header_rejects_garbage() {
        assert!(matches!(
            Header::decode(b"not a header at all, really no.."),
            Err(RlsError::Serialization(_))
        ));

        let mut bytes = Header {
            rows: 1,
            cols: 1,
            dtype: Dtype::F32,
        }
        .encode();
        bytes[24] = 9;
        assert!(matches!(
            Header::decode(&bytes),
            Err(RlsError::Serialization(_))
        ));
    }
}
