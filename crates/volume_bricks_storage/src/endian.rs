//! Byte order conversion of flat sample files.

use crate::{BrickError, ElementType, IoContext, Progress, RawFile, Result};

use serde::{Deserialize, Serialize};
use std::io::Write;
use std::path::Path;

/// Byte order of a file or of the machine that wrote it.
#[derive(Clone, Copy, Debug, Deserialize, Eq, Hash, PartialEq, Serialize)]
pub enum ByteOrder {
    Little,
    Big,
}

impl ByteOrder {
    #[cfg(target_endian = "little")]
    pub const NATIVE: ByteOrder = ByteOrder::Little;
    #[cfg(target_endian = "big")]
    pub const NATIVE: ByteOrder = ByteOrder::Big;

    pub fn native() -> Self {
        Self::NATIVE
    }

    pub fn opposite(&self) -> Self {
        match self {
            ByteOrder::Little => ByteOrder::Big,
            ByteOrder::Big => ByteOrder::Little,
        }
    }

    pub fn tag(&self) -> u8 {
        match self {
            ByteOrder::Little => 0,
            ByteOrder::Big => 1,
        }
    }

    pub fn from_tag(tag: u8) -> Result<Self> {
        match tag {
            0 => Ok(ByteOrder::Little),
            1 => Ok(ByteOrder::Big),
            other => Err(BrickError::integrity(format!("unknown byte order tag {}", other))),
        }
    }

    pub fn name(&self) -> &'static str {
        match self {
            ByteOrder::Little => "little",
            ByteOrder::Big => "big",
        }
    }
}

/// Reverses the bytes of every `width`-byte element of `bytes`. Trailing bytes that do not form a whole element are left alone.
#[inline]
pub fn swap_bytes_in_place(bytes: &mut [u8], width: usize) {
    if width < 2 {
        return;
    }
    for element in bytes.chunks_exact_mut(width) {
        element.reverse();
    }
}

/// Byte-swaps every component of the raw file at `input` into `output`.
///
/// Returns `false` without writing anything for 8-bit data, which has no byte order. Work happens in chunks of the lesser of
/// the file length and `max_chunk_bytes`. A short write aborts the conversion; the caller owns `output` and discards it.
pub fn normalize_endianness(
    input: &Path,
    header_skip: u64,
    element: ElementType,
    output: &Path,
    max_chunk_bytes: u64,
    progress: &mut Progress,
) -> Result<bool> {
    let width = element.bytes_per_component();
    if width < 2 {
        tracing::warn!("Ignoring the request to convert the endianness of 8-bit data");
        return Ok(false);
    }
    tracing::info!("Performing endianness conversion");

    let mut src = RawFile::open(input, header_skip)?;
    let file_len = src.size()?;
    let chunk_len = file_len.min(max_chunk_bytes).max(width as u64);
    // Never split an element across two chunks.
    let chunk_len = (chunk_len - chunk_len % width as u64) as usize;

    let mut dst = RawFile::create(output)?;
    let mut buf = vec![0; chunk_len];
    loop {
        let n = src.read_chunk(&mut buf)?;
        if n == 0 {
            break;
        }
        swap_bytes_in_place(&mut buf[..n], width);
        let written = dst
            .write(&buf[..n])
            .io_context(|| format!("writing {}", output.display()))?;
        if written != n {
            return Err(BrickError::Io {
                context: format!("writing {}", output.display()),
                source: std::io::Error::new(
                    std::io::ErrorKind::WriteZero,
                    format!("short write of {} out of {} bytes", written, n),
                ),
            });
        }
        progress.advance(n as u64);
    }
    progress.finish();
    dst.close()?;

    Ok(true)
}

// ████████╗███████╗███████╗████████╗
// ╚══██╔══╝██╔════╝██╔════╝╚══██╔══╝
//    ██║   █████╗  ███████╗   ██║
//    ██║   ██╔══╝  ╚════██║   ██║
//    ██║   ███████╗███████║   ██║
//    ╚═╝   ╚══════╝╚══════╝   ╚═╝

#[cfg(test)]
mod tests {
    use super::*;
    use byteorder::{BigEndian, ByteOrder as _, LittleEndian};

    #[test]
    fn swaps_each_element() {
        let mut bytes = [1, 2, 3, 4, 5, 6, 7, 8, 9];
        swap_bytes_in_place(&mut bytes, 4);

        assert_eq!(bytes, [4, 3, 2, 1, 8, 7, 6, 5, 9]);
    }

    #[test]
    fn big_endian_file_becomes_little_endian() {
        let dir = tempfile::tempdir().unwrap();
        let input = dir.path().join("be.raw");
        let output = dir.path().join("le.raw");
        let values = [1u32, 0xdead_beef, 70_000, 3];
        let mut bytes = vec![0xaa; 2];
        for v in values.iter() {
            let mut b = [0; 4];
            BigEndian::write_u32(&mut b, *v);
            bytes.extend_from_slice(&b);
        }
        std::fs::write(&input, &bytes).unwrap();

        // A chunk size that is not a multiple of the element width.
        let mut progress = Progress::silent("test", 16);
        let converted =
            normalize_endianness(&input, 2, ElementType::of::<u32>(1), &output, 6, &mut progress).unwrap();
        assert!(converted);

        let out = std::fs::read(&output).unwrap();
        let decoded: Vec<u32> = out.chunks_exact(4).map(LittleEndian::read_u32).collect();
        assert_eq!(decoded, values.to_vec());
    }

    #[test]
    fn eight_bit_data_is_left_alone() {
        let dir = tempfile::tempdir().unwrap();
        let input = dir.path().join("u8.raw");
        let output = dir.path().join("out.raw");
        std::fs::write(&input, [1, 2, 3]).unwrap();

        let mut progress = Progress::silent("test", 3);
        let converted =
            normalize_endianness(&input, 0, ElementType::of::<u8>(1), &output, 64, &mut progress).unwrap();

        assert!(!converted);
        assert!(!output.exists());
    }
}
