use std::io::Write;
use std::path::Path;

/// Writes `header` followed by the native-endian bytes of `samples` to a new file at `path`.
pub fn write_raw_samples<T: bytemuck::Pod>(path: &Path, header: &[u8], samples: &[T]) -> std::io::Result<()> {
    let mut file = std::io::BufWriter::new(std::fs::File::create(path)?);
    file.write_all(header)?;
    file.write_all(bytemuck::cast_slice(samples))?;

    file.flush()
}
