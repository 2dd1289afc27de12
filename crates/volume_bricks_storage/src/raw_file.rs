//! Byte-addressable handles for flat sample files and the temporary files passed between pipeline stages.

use crate::{IoContext, Result};

use std::fs::{File, OpenOptions};
use std::io::{self, Read, Seek, SeekFrom, Write};
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU64, Ordering};

/// A large flat file of samples, optionally preceded by a header that every read skips.
///
/// Offsets passed to `read_at` and `seek` are relative to the end of the header.
pub struct RawFile {
    file: File,
    path: PathBuf,
    header_skip: u64,
}

impl RawFile {
    /// Opens an existing file for reading.
    pub fn open(path: impl AsRef<Path>, header_skip: u64) -> Result<Self> {
        let path = path.as_ref().to_path_buf();
        let mut file = File::open(&path).io_context(|| format!("opening {}", path.display()))?;
        file.seek(SeekFrom::Start(header_skip))
            .io_context(|| format!("skipping the header of {}", path.display()))?;

        Ok(Self {
            file,
            path,
            header_skip,
        })
    }

    /// Creates (or truncates) a file for writing.
    pub fn create(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref().to_path_buf();
        let file = OpenOptions::new()
            .read(true)
            .write(true)
            .create(true)
            .truncate(true)
            .open(&path)
            .io_context(|| format!("creating {}", path.display()))?;

        Ok(Self {
            file,
            path,
            header_skip: 0,
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn header_skip(&self) -> u64 {
        self.header_skip
    }

    /// Number of bytes after the header.
    pub fn size(&self) -> Result<u64> {
        let len = self
            .file
            .metadata()
            .io_context(|| format!("reading the size of {}", self.path.display()))?
            .len();

        Ok(len.saturating_sub(self.header_skip))
    }

    pub fn seek_to(&mut self, offset: u64) -> Result<()> {
        let header_skip = self.header_skip;
        self.file
            .seek(SeekFrom::Start(header_skip + offset))
            .io_context(|| format!("seeking in {}", self.path.display()))?;

        Ok(())
    }

    /// Fills `buf` from `offset`, failing if the file ends first.
    pub fn read_at(&mut self, offset: u64, buf: &mut [u8]) -> Result<()> {
        self.seek_to(offset)?;
        let path = &self.path;
        self.file
            .read_exact(buf)
            .io_context(|| format!("reading {} bytes at {} from {}", buf.len(), offset, path.display()))
    }

    /// Bounded read from the current position. Returns the number of bytes read, which is only smaller than `buf` at the end of
    /// the file.
    pub fn read_chunk(&mut self, buf: &mut [u8]) -> Result<usize> {
        let path = &self.path;
        read_up_to(&mut self.file, buf).io_context(|| format!("reading {}", path.display()))
    }

    /// Writes all of `bytes` at the current position.
    pub fn write_chunk(&mut self, bytes: &[u8]) -> Result<()> {
        let path = &self.path;
        self.file
            .write_all(bytes)
            .io_context(|| format!("writing {}", path.display()))
    }

    /// Flushes and closes the handle.
    pub fn close(mut self) -> Result<()> {
        let path = &self.path;
        self.file
            .flush()
            .io_context(|| format!("flushing {}", path.display()))
    }
}

impl Read for RawFile {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        self.file.read(buf)
    }
}

impl Write for RawFile {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        self.file.write(buf)
    }

    fn flush(&mut self) -> io::Result<()> {
        self.file.flush()
    }
}

/// Reads until `buf` is full or the reader is exhausted.
pub fn read_up_to(reader: &mut impl Read, buf: &mut [u8]) -> io::Result<usize> {
    let mut filled = 0;
    while filled < buf.len() {
        match reader.read(&mut buf[filled..]) {
            Ok(0) => break,
            Ok(n) => filled += n,
            Err(e) if e.kind() == io::ErrorKind::Interrupted => continue,
            Err(e) => return Err(e),
        }
    }

    Ok(filled)
}

/// Copies everything `reader` yields into `writer` through a buffer of `chunk_bytes`. Returns the number of bytes copied.
pub fn copy_bounded(reader: &mut impl Read, writer: &mut impl Write, chunk_bytes: usize) -> io::Result<u64> {
    let mut buf = vec![0; chunk_bytes.max(1)];
    let mut total = 0;
    loop {
        let n = read_up_to(reader, &mut buf)?;
        if n == 0 {
            break;
        }
        writer.write_all(&buf[..n])?;
        total += n as u64;
    }

    Ok(total)
}

static TEMP_FILE_COUNTER: AtomicU64 = AtomicU64::new(0);

/// A temporary file that is deleted when the guard drops. Ownership of the guard is ownership of the file.
#[derive(Debug)]
pub struct TempFile {
    path: PathBuf,
}

impl TempFile {
    /// Reserves a unique path in `dir`. The file itself is created by whichever stage writes it.
    pub fn new_in(dir: impl AsRef<Path>, stem: &str) -> Self {
        let n = TEMP_FILE_COUNTER.fetch_add(1, Ordering::Relaxed);
        let name = format!("{}-{}-{}.tmp", stem, std::process::id(), n);

        Self {
            path: dir.as_ref().join(name),
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl Drop for TempFile {
    fn drop(&mut self) {
        if let Err(e) = std::fs::remove_file(&self.path) {
            if e.kind() != io::ErrorKind::NotFound {
                tracing::warn!("Failed to delete temporary file {}: {}", self.path.display(), e);
            }
        }
    }
}

/// Unpacks a compressed source file into a flat sample file.
pub trait SourceDecompressor {
    /// Decompresses `input`, ignoring its first `header_skip` bytes, into `output`.
    fn decompress(&self, input: &Path, header_skip: u64, output: &Path) -> Result<()>;
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

    #[test]
    fn header_is_skipped_by_every_read() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("with_header.raw");
        std::fs::write(&path, [9, 9, 9, 1, 2, 3, 4]).unwrap();

        let mut file = RawFile::open(&path, 3).unwrap();
        assert_eq!(file.size().unwrap(), 4);

        let mut buf = [0; 2];
        file.read_at(2, &mut buf).unwrap();
        assert_eq!(buf, [3, 4]);

        file.seek_to(0).unwrap();
        let mut all = [0; 8];
        assert_eq!(file.read_chunk(&mut all).unwrap(), 4);
        assert_eq!(&all[..4], &[1, 2, 3, 4]);
    }

    #[test]
    fn temp_file_is_deleted_on_drop() {
        let dir = tempfile::tempdir().unwrap();
        let temp = TempFile::new_in(dir.path(), "stage");
        std::fs::write(temp.path(), b"partial").unwrap();
        let path = temp.path().to_path_buf();

        drop(temp);
        assert!(!path.exists());
    }

    #[test]
    fn copy_bounded_copies_everything() {
        let src: Vec<u8> = (0..=255).collect();
        let mut dst = Vec::new();

        let n = copy_bounded(&mut src.as_slice(), &mut dst, 7).unwrap();
        assert_eq!(n, 256);
        assert_eq!(dst, src);
    }
}
