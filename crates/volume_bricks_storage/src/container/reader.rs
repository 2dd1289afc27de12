use super::{BlockHeader, BlockKind, RasterDescriptor, CONTAINER_MAGIC, CONTAINER_VERSION, END_OF_BLOCKS};
use crate::{read_up_to, BrickError, ByteOrder, ChecksumAlgorithm, IoContext, Result};

use byteorder::{LittleEndian, ReadBytesExt};
use serde::de::DeserializeOwned;
use std::fs::File;
use std::io::{self, BufReader, Read, Seek, SeekFrom};
use std::path::{Path, PathBuf};
use std::sync::Mutex;

const VERIFY_CHUNK_BYTES: usize = 1 << 20;

/// A committed container opened for reading.
///
/// Opening only walks the block headers. Payloads are read on request.
pub struct Container {
    path: PathBuf,
    file: Mutex<File>,
    byte_order: ByteOrder,
    checksum: ChecksumAlgorithm,
    blocks: Vec<BlockHeader>,
    /// Offset of the digest length field, which is where the digested bytes end.
    digest_offset: u64,
    stored_digest: Vec<u8>,
}

impl Container {
    pub fn open(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref().to_path_buf();
        let file = File::open(&path).io_context(|| format!("opening {}", path.display()))?;
        let file_len = file
            .metadata()
            .io_context(|| format!("reading the size of {}", path.display()))?
            .len();

        let mut reader = BufReader::new(file);
        let mut magic = [0; 8];
        reader.read_exact(&mut magic).map_err(|e| parse_error(&path, e))?;
        if magic != CONTAINER_MAGIC {
            return Err(BrickError::integrity(format!("{} is not a brick container", path.display())));
        }
        let version = reader.read_u32::<LittleEndian>().map_err(|e| parse_error(&path, e))?;
        if version != CONTAINER_VERSION {
            return Err(BrickError::integrity(format!(
                "{} has unsupported container version {}",
                path.display(),
                version
            )));
        }
        let byte_order = ByteOrder::from_tag(reader.read_u8().map_err(|e| parse_error(&path, e))?)?;
        let checksum = ChecksumAlgorithm::from_tag(reader.read_u8().map_err(|e| parse_error(&path, e))?)?;

        let mut pos = CONTAINER_MAGIC.len() as u64 + 6;
        let mut blocks = Vec::new();
        loop {
            let tag = reader.read_u8().map_err(|e| parse_error(&path, e))?;
            pos += 1;
            if tag == END_OF_BLOCKS {
                break;
            }
            let kind = BlockKind::from_tag(tag)?;
            let label_len = reader.read_u32::<LittleEndian>().map_err(|e| parse_error(&path, e))? as u64;
            if pos + 4 + label_len > file_len {
                return Err(truncated(&path));
            }
            let mut label = vec![0; label_len as usize];
            reader.read_exact(&mut label).map_err(|e| parse_error(&path, e))?;
            let label = String::from_utf8(label)
                .map_err(|_| BrickError::integrity(format!("block label in {} is not UTF-8", path.display())))?;
            let payload_len = reader.read_u64::<LittleEndian>().map_err(|e| parse_error(&path, e))?;
            pos += 4 + label_len + 8;

            let payload_offset = pos;
            pos = payload_offset
                .checked_add(payload_len)
                .filter(|end| *end < file_len)
                .ok_or_else(|| truncated(&path))?;
            reader
                .seek(SeekFrom::Start(pos))
                .io_context(|| format!("skipping a block of {}", path.display()))?;
            tracing::debug!("{:?} block \"{}\" of {} bytes at {}", kind, label, payload_len, payload_offset);

            blocks.push(BlockHeader {
                kind,
                label,
                payload_offset,
                payload_len,
            });
        }

        let digest_offset = pos;
        let digest_len = reader.read_u32::<LittleEndian>().map_err(|e| parse_error(&path, e))? as u64;
        if digest_offset + 4 + digest_len != file_len {
            return Err(BrickError::integrity(format!(
                "{} has a trailer of the wrong size",
                path.display()
            )));
        }
        let mut stored_digest = vec![0; digest_len as usize];
        reader
            .read_exact(&mut stored_digest)
            .map_err(|e| parse_error(&path, e))?;

        Ok(Self {
            path,
            file: Mutex::new(reader.into_inner()),
            byte_order,
            checksum,
            blocks,
            digest_offset,
            stored_digest,
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Byte order of the machine that wrote the container, which is also the byte order of its samples.
    pub fn byte_order(&self) -> ByteOrder {
        self.byte_order
    }

    pub fn is_same_endianness(&self) -> bool {
        self.byte_order == ByteOrder::NATIVE
    }

    pub fn checksum_algorithm(&self) -> ChecksumAlgorithm {
        self.checksum
    }

    pub fn blocks(&self) -> &[BlockHeader] {
        &self.blocks
    }

    pub fn blocks_of_kind(&self, kind: BlockKind) -> impl Iterator<Item = &BlockHeader> {
        self.blocks.iter().filter(move |b| b.kind == kind)
    }

    /// Raster, acceleration and histogram blocks are written once per timestep, so the n-th block of a kind belongs to
    /// timestep n.
    pub fn timestep_block(&self, kind: BlockKind, timestep: usize) -> Option<&BlockHeader> {
        self.blocks_of_kind(kind).nth(timestep)
    }

    pub fn timestep_count(&self) -> usize {
        self.blocks_of_kind(BlockKind::RasterData).count()
    }

    /// Fills `buf` from the absolute file offset `offset`.
    pub fn read_at(&self, offset: u64, buf: &mut [u8]) -> Result<()> {
        let mut file = self.file.lock().unwrap_or_else(|poisoned| poisoned.into_inner());
        file.seek(SeekFrom::Start(offset))
            .and_then(|_| file.read_exact(buf))
            .map_err(|e| parse_error(&self.path, e))
    }

    pub fn read_payload(&self, block: &BlockHeader) -> Result<Vec<u8>> {
        let mut payload = vec![0; block.payload_len as usize];
        self.read_at(block.payload_offset, &mut payload)?;

        Ok(payload)
    }

    /// Decodes a block written with `ContainerWriter::append_serialized`.
    pub fn read_block<T: DeserializeOwned>(&self, block: &BlockHeader) -> Result<T> {
        let payload = self.read_payload(block)?;

        Ok(bincode::deserialize(&payload)?)
    }

    /// Decodes the descriptor of a raster block. Also returns the absolute offset of its brick stream.
    pub fn raster_descriptor(&self, block: &BlockHeader) -> Result<(RasterDescriptor, u64)> {
        if block.kind != BlockKind::RasterData {
            return Err(BrickError::configuration(format!(
                "block \"{}\" is a {:?} block, not a raster block",
                block.label, block.kind
            )));
        }
        let mut len_bytes = [0; 8];
        self.read_at(block.payload_offset, &mut len_bytes)?;
        let descriptor_len = u64::from_le_bytes(len_bytes);
        let stream_len = block
            .payload_len
            .checked_sub(8)
            .and_then(|rest| rest.checked_sub(descriptor_len))
            .ok_or_else(|| BrickError::integrity(format!("raster block \"{}\" is truncated", block.label)))?;

        let mut encoded = vec![0; descriptor_len as usize];
        self.read_at(block.payload_offset + 8, &mut encoded)?;
        let descriptor: RasterDescriptor = bincode::deserialize(&encoded)?;
        if descriptor.brick_stream_len() != stream_len {
            return Err(BrickError::integrity(format!(
                "raster block \"{}\" holds {} brick bytes but its table describes {}",
                block.label,
                stream_len,
                descriptor.brick_stream_len()
            )));
        }
        if let Some(entry) = descriptor
            .bricks
            .iter()
            .find(|b| b.offset.checked_add(b.stored_len).map_or(true, |end| end > stream_len))
        {
            return Err(BrickError::integrity(format!(
                "raster block \"{}\" has a brick of {} bytes at {}, past its {} byte stream",
                block.label, entry.stored_len, entry.offset, stream_len
            )));
        }

        Ok((descriptor, block.payload_offset + 8 + descriptor_len))
    }

    /// Recomputes the digest over the file and compares it with the stored one.
    pub fn verify_checksum(&self) -> Result<()> {
        if self.checksum == ChecksumAlgorithm::None {
            return Ok(());
        }

        let mut file = self.file.lock().unwrap_or_else(|poisoned| poisoned.into_inner());
        file.seek(SeekFrom::Start(0))
            .io_context(|| format!("rewinding {}", self.path.display()))?;
        let mut digest = self.checksum.new_digest();
        let mut remaining = self.digest_offset;
        let mut buf = vec![0; VERIFY_CHUNK_BYTES];
        while remaining > 0 {
            let want = remaining.min(buf.len() as u64) as usize;
            let n = read_up_to(&mut *file, &mut buf[..want])
                .io_context(|| format!("reading {}", self.path.display()))?;
            if n == 0 {
                return Err(truncated(&self.path));
            }
            digest.update(&buf[..n]);
            remaining -= n as u64;
        }

        if digest.finalize() != self.stored_digest {
            return Err(BrickError::integrity(format!(
                "checksum mismatch in {}",
                self.path.display()
            )));
        }
        tracing::debug!("Checksum of {} verified", self.path.display());

        Ok(())
    }
}

fn truncated(path: &Path) -> BrickError {
    BrickError::integrity(format!("{} is truncated", path.display()))
}

fn parse_error(path: &Path, e: io::Error) -> BrickError {
    if e.kind() == io::ErrorKind::UnexpectedEof {
        truncated(path)
    } else {
        BrickError::Io {
            context: format!("reading {}", path.display()),
            source: e,
        }
    }
}
