use super::{BlockKind, RasterDescriptor, CONTAINER_MAGIC, CONTAINER_VERSION, END_OF_BLOCKS};
use crate::{BrickError, ByteOrder, ChecksumAlgorithm, ChecksumDigest, IoContext, Result};

use byteorder::{LittleEndian, WriteBytesExt};
use serde::Serialize;
use std::convert::TryFrom;
use std::fs::{File, OpenOptions};
use std::io::{self, BufWriter, Read, Write};
use std::path::{Path, PathBuf};

/// Hashes everything written through it.
struct DigestWriter<W> {
    inner: W,
    digest: Box<dyn ChecksumDigest + Send>,
    written: u64,
}

impl<W: Write> Write for DigestWriter<W> {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        let n = self.inner.write(buf)?;
        self.digest.update(&buf[..n]);
        self.written += n as u64;

        Ok(n)
    }

    fn flush(&mut self) -> io::Result<()> {
        self.inner.flush()
    }
}

/// The single write session of a container.
///
/// Blocks are appended in order and never revisited. Everything goes to `<target>.partial`, which only replaces `target` when
/// [`ContainerWriter::close`] succeeds. Dropping an unclosed writer deletes the partial file.
pub struct ContainerWriter {
    target: PathBuf,
    partial: PathBuf,
    out: Option<DigestWriter<BufWriter<File>>>,
    block_count: usize,
    committed: bool,
    /// A write failed part way through a block.
    poisoned: bool,
}

impl ContainerWriter {
    /// Starts a write session. Fails if another session for `target` is in progress.
    pub fn create(target: impl AsRef<Path>, checksum: ChecksumAlgorithm) -> Result<Self> {
        let target = target.as_ref().to_path_buf();
        let partial = partial_path(&target)?;
        let file = OpenOptions::new()
            .write(true)
            .create_new(true)
            .open(&partial)
            .io_context(|| format!("creating {}", partial.display()))?;

        let mut writer = Self {
            target,
            partial,
            out: Some(DigestWriter {
                inner: BufWriter::new(file),
                digest: checksum.new_digest(),
                written: 0,
            }),
            block_count: 0,
            committed: false,
            poisoned: false,
        };
        writer.write_header(checksum)?;

        Ok(writer)
    }

    fn write_header(&mut self, checksum: ChecksumAlgorithm) -> Result<()> {
        let partial = self.partial.clone();
        let out = self.out()?;
        out.write_all(&CONTAINER_MAGIC)
            .and_then(|_| out.write_u32::<LittleEndian>(CONTAINER_VERSION))
            .and_then(|_| out.write_u8(ByteOrder::NATIVE.tag()))
            .and_then(|_| out.write_u8(checksum.tag()))
            .io_context(|| format!("writing the header of {}", partial.display()))
    }

    fn out(&mut self) -> Result<&mut DigestWriter<BufWriter<File>>> {
        let poisoned = self.poisoned;
        self.out.as_mut().ok_or_else(|| session_ended(poisoned))
    }

    /// Once bytes of a block may have reached the file, a failure discards the whole session.
    fn discard_on_error<T>(&mut self, result: Result<T>) -> Result<T> {
        if result.is_err() && self.out.is_some() {
            tracing::warn!("Discarding unfinished container {}", self.partial.display());
            self.poisoned = true;
            self.discard();
        }

        result
    }

    fn discard(&mut self) {
        drop(self.out.take());
        if let Err(e) = std::fs::remove_file(&self.partial) {
            if e.kind() != io::ErrorKind::NotFound {
                tracing::warn!("Failed to delete unfinished container {}: {}", self.partial.display(), e);
            }
        }
    }

    fn write_block_header(&mut self, kind: BlockKind, label: &str, payload_len: u64) -> Result<()> {
        let partial = self.partial.clone();
        let out = self.out()?;
        out.write_u8(kind.tag())
            .and_then(|_| out.write_u32::<LittleEndian>(label.len() as u32))
            .and_then(|_| out.write_all(label.as_bytes()))
            .and_then(|_| out.write_u64::<LittleEndian>(payload_len))
            .io_context(|| format!("writing a {:?} block header to {}", kind, partial.display()))?;
        self.block_count += 1;

        Ok(())
    }

    /// Appends a block with an opaque payload.
    pub fn append_block(&mut self, kind: BlockKind, label: &str, payload: &[u8]) -> Result<()> {
        check_label(label)?;
        self.out()?;
        let result = self.write_block(kind, label, payload);

        self.discard_on_error(result)
    }

    fn write_block(&mut self, kind: BlockKind, label: &str, payload: &[u8]) -> Result<()> {
        self.write_block_header(kind, label, payload.len() as u64)?;
        let partial = self.partial.clone();
        self.out()?
            .write_all(payload)
            .io_context(|| format!("writing a {:?} block to {}", kind, partial.display()))
    }

    /// Appends a block holding the `bincode` encoding of `value`.
    pub fn append_serialized<T: Serialize>(&mut self, kind: BlockKind, label: &str, value: &T) -> Result<()> {
        let payload = bincode::serialize(value)
            .map_err(|e| BrickError::configuration(format!("encoding a {:?} block: {}", kind, e)))?;

        self.append_block(kind, label, &payload)
    }

    /// Appends a raster block: the descriptor followed by the brick stream read from `bricks`, copied in chunks of at most
    /// `incore_bytes`.
    ///
    /// `bricks` must yield exactly the bytes of the brick table. If it yields fewer or more, the session is discarded.
    pub fn append_raster(
        &mut self,
        label: &str,
        descriptor: &RasterDescriptor,
        bricks: &mut impl Read,
        incore_bytes: usize,
    ) -> Result<()> {
        check_label(label)?;
        let encoded = bincode::serialize(descriptor)
            .map_err(|e| BrickError::configuration(format!("encoding a raster descriptor: {}", e)))?;
        let stream_len = descriptor.brick_stream_len();
        let payload_len = (8 + encoded.len() as u64)
            .checked_add(stream_len)
            .ok_or_else(|| BrickError::integrity(format!("a brick stream of {} bytes is too large", stream_len)))?;
        self.out()?;
        let result = self.write_raster(label, &encoded, payload_len, stream_len, bricks, incore_bytes);

        self.discard_on_error(result)
    }

    fn write_raster(
        &mut self,
        label: &str,
        encoded: &[u8],
        payload_len: u64,
        stream_len: u64,
        bricks: &mut impl Read,
        incore_bytes: usize,
    ) -> Result<()> {
        self.write_block_header(BlockKind::RasterData, label, payload_len)?;

        let partial = self.partial.clone();
        let out = self.out()?;
        out.write_u64::<LittleEndian>(encoded.len() as u64)
            .and_then(|_| out.write_all(encoded))
            .io_context(|| format!("writing a raster descriptor to {}", partial.display()))?;

        let copied = crate::copy_bounded(&mut (&mut *bricks).take(stream_len), out, incore_bytes)
            .io_context(|| format!("copying bricks to {}", partial.display()))?;
        if copied != stream_len {
            return Err(BrickError::integrity(format!(
                "brick stream ended after {} bytes, its brick table needs {}",
                copied, stream_len
            )));
        }
        let mut extra = [0; 1];
        if crate::read_up_to(bricks, &mut extra).io_context(|| "reading past the brick stream".to_string())? != 0 {
            return Err(BrickError::integrity(format!(
                "brick stream is longer than the {} bytes of its brick table",
                stream_len
            )));
        }

        Ok(())
    }

    /// Bytes written so far, header included.
    pub fn bytes_written(&self) -> u64 {
        self.out.as_ref().map(|o| o.written).unwrap_or(0)
    }

    pub fn block_count(&self) -> usize {
        self.block_count
    }

    /// Ends the session: appends the trailer and checksum, then moves the file into place. Returns the target path.
    pub fn close(mut self) -> Result<PathBuf> {
        let partial = self.partial.clone();
        let poisoned = self.poisoned;
        let mut out = self.out.take().ok_or_else(|| session_ended(poisoned))?;

        out.write_u8(END_OF_BLOCKS)
            .io_context(|| format!("writing the trailer of {}", partial.display()))?;
        let DigestWriter { mut inner, digest, .. } = out;
        let digest = digest.finalize();
        inner
            .write_u32::<LittleEndian>(digest.len() as u32)
            .and_then(|_| inner.write_all(&digest))
            .and_then(|_| inner.flush())
            .and_then(|_| inner.get_ref().sync_all())
            .io_context(|| format!("finishing {}", partial.display()))?;
        drop(inner);

        std::fs::rename(&self.partial, &self.target)
            .io_context(|| format!("moving {} to {}", partial.display(), self.target.display()))?;
        self.committed = true;
        tracing::info!("Wrote {} blocks to {}", self.block_count, self.target.display());

        Ok(self.target.clone())
    }
}

impl Drop for ContainerWriter {
    fn drop(&mut self) {
        if self.committed {
            return;
        }
        self.discard();
    }
}

fn session_ended(poisoned: bool) -> BrickError {
    if poisoned {
        BrickError::integrity("an earlier write failed and the container was discarded")
    } else {
        BrickError::configuration("the container write session is already closed")
    }
}

fn check_label(label: &str) -> Result<()> {
    if u32::try_from(label.len()).is_err() {
        return Err(BrickError::configuration(format!(
            "block label of {} bytes is too long",
            label.len()
        )));
    }

    Ok(())
}

fn partial_path(target: &Path) -> Result<PathBuf> {
    let mut name = target
        .file_name()
        .ok_or_else(|| BrickError::configuration(format!("{} is not a file path", target.display())))?
        .to_os_string();
    name.push(".partial");

    Ok(target.with_file_name(name))
}
