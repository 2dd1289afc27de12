use super::BytesCompression;
use crate::{IoContext, RawFile, Result, SourceDecompressor};

use serde::{Deserialize, Serialize};
use std::io::{self, Write};
use std::path::Path;

/// LZ4 frames, one per brick.
#[derive(Clone, Copy, Debug, Deserialize, Serialize)]
pub struct Lz4 {
    /// 0 is fastest, 10 compresses hardest.
    pub level: u32,
}

impl BytesCompression for Lz4 {
    fn compress_bytes(&self, bytes: &[u8], compressed_bytes: impl Write) -> io::Result<()> {
        let mut encoder = lz4::EncoderBuilder::new().level(self.level).build(compressed_bytes)?;
        encoder.write_all(bytes)?;

        encoder.finish().1
    }

    fn decompress_bytes(compressed_bytes: &[u8], bytes: &mut impl Write) -> io::Result<()> {
        io::copy(&mut lz4::Decoder::new(compressed_bytes)?, bytes).map(|_| ())
    }
}

/// Unpacks sources stored as LZ4 frames.
#[derive(Clone, Copy, Debug, Default)]
pub struct Lz4FrameDecompressor;

impl SourceDecompressor for Lz4FrameDecompressor {
    fn decompress(&self, input: &Path, header_skip: u64, output: &Path) -> Result<()> {
        let src = RawFile::open(input, header_skip)?;
        let mut dst = RawFile::create(output)?;
        let mut decoder = lz4::Decoder::new(src).io_context(|| format!("opening LZ4 frame {}", input.display()))?;
        io::copy(&mut decoder, &mut dst).io_context(|| format!("decompressing {}", input.display()))?;

        dst.close()
    }
}

// ████████╗███████╗███████╗████████╗███████╗
// ╚══██╔══╝██╔════╝██╔════╝╚══██╔══╝██╔════╝
//    ██║   █████╗  ███████╗   ██║   ███████╗
//    ██║   ██╔══╝  ╚════██║   ██║   ╚════██║
//    ██║   ███████╗███████║   ██║   ███████║
//    ╚═╝   ╚══════╝╚══════╝   ╚═╝   ╚══════╝

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn compress_and_decompress_bytes() {
        let bytes: Vec<u8> = (0u8..100).collect();

        let mut compressed_bytes = Vec::new();
        Lz4 { level: 10 }.compress_bytes(&bytes, &mut compressed_bytes).unwrap();
        let mut decompressed_bytes = Vec::new();
        Lz4::decompress_bytes(&compressed_bytes, &mut decompressed_bytes).unwrap();

        assert_eq!(bytes, decompressed_bytes);
    }

    #[test]
    fn decompress_source_after_header() {
        let dir = tempfile::tempdir().unwrap();
        let input = dir.path().join("volume.lz4");
        let output = dir.path().join("volume.raw");
        let samples: Vec<u8> = (0..1000u32).map(|i| (i % 13) as u8).collect();

        let mut framed = b"HDR".to_vec();
        Lz4 { level: 1 }.compress_bytes(&samples, &mut framed).unwrap();
        std::fs::write(&input, &framed).unwrap();

        Lz4FrameDecompressor.decompress(&input, 3, &output).unwrap();
        assert_eq!(std::fs::read(&output).unwrap(), samples);
    }
}
