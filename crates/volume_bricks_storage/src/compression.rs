#[cfg(feature = "lz4")]
mod lz4_compression;

#[cfg(feature = "lz4")]
pub use lz4_compression::{Lz4, Lz4FrameDecompressor};

use crate::{BrickError, Result};
#[cfg(feature = "lz4")]
use crate::IoContext;

use serde::{Deserialize, Serialize};

/// A compression algorithm that acts directly on a slice of bytes.
pub trait BytesCompression {
    fn compress_bytes(&self, bytes: &[u8], compressed_bytes: impl std::io::Write) -> std::io::Result<()>;
    fn decompress_bytes(compressed_bytes: &[u8], bytes: &mut impl std::io::Write) -> std::io::Result<()>;
}

/// How each brick payload is stored. Bricks are compressed independently so any one of them can be read alone.
#[derive(Clone, Copy, Debug, Deserialize, Eq, PartialEq, Serialize)]
pub enum BrickCompression {
    None,
    /// The [LZ4 compression algorithm](https://en.wikipedia.org/wiki/LZ4_(compression_algorithm)), with a level from 0 (fastest)
    /// to 10 (most aggressive).
    Lz4 { level: u32 },
}

impl Default for BrickCompression {
    fn default() -> Self {
        BrickCompression::None
    }
}

impl BrickCompression {
    /// Fails if the algorithm was compiled out.
    pub fn validate(&self) -> Result<()> {
        match self {
            BrickCompression::None => Ok(()),
            #[cfg(feature = "lz4")]
            BrickCompression::Lz4 { .. } => Ok(()),
            #[cfg(not(feature = "lz4"))]
            BrickCompression::Lz4 { .. } => Err(BrickError::configuration(
                "LZ4 brick compression requires the \"lz4\" feature",
            )),
        }
    }

    /// Appends the stored form of `bytes` to `out`.
    pub fn compress(&self, bytes: &[u8], out: &mut Vec<u8>) -> Result<()> {
        match *self {
            BrickCompression::None => {
                out.extend_from_slice(bytes);
                Ok(())
            }
            #[cfg(feature = "lz4")]
            BrickCompression::Lz4 { level } => Lz4 { level }
                .compress_bytes(bytes, out)
                .io_context(|| "compressing a brick".to_string()),
            #[cfg(not(feature = "lz4"))]
            BrickCompression::Lz4 { .. } => Err(BrickError::configuration(
                "LZ4 brick compression requires the \"lz4\" feature",
            )),
        }
    }

    /// Appends the decompressed form of `stored` to `out`.
    pub fn decompress(&self, stored: &[u8], out: &mut Vec<u8>) -> Result<()> {
        match *self {
            BrickCompression::None => {
                out.extend_from_slice(stored);
                Ok(())
            }
            #[cfg(feature = "lz4")]
            BrickCompression::Lz4 { .. } => Lz4::decompress_bytes(stored, out)
                .map_err(|e| BrickError::integrity(format!("corrupt LZ4 brick: {}", e))),
            #[cfg(not(feature = "lz4"))]
            BrickCompression::Lz4 { .. } => Err(BrickError::configuration(
                "reading LZ4 compressed bricks requires the \"lz4\" feature",
            )),
        }
    }
}

// ████████╗███████╗███████╗████████╗
// ╚══██╔══╝██╔════╝██╔════╝╚══██╔══╝
//    ██║   █████╗  ███████╗   ██║
//    ██║   ██╔══╝  ╚════██║   ██║
//    ██║   ███████╗███████║   ██║
//    ╚═╝   ╚══════╝╚══════╝   ╚═╝
