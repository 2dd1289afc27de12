//! The persisted container: an append-only sequence of typed, length-prefixed blocks closed by a whole-file checksum.
//!
//! ```text
//! header   magic "VBRICKS\0" | u32 version | u8 byte order | u8 checksum algorithm
//! block    u8 kind | u32 label length | label | u64 payload length | payload
//! ...
//! trailer  u8 0 | u32 digest length | digest
//! ```
//!
//! Framing integers are little-endian. The digest covers every byte before the digest length.

mod reader;
mod writer;

pub use reader::Container;
pub use writer::ContainerWriter;

use crate::{
    BrickCompression, BrickError, ComponentSemantic, ElementType, Result, ScalarRange,
};

use serde::{Deserialize, Serialize};
use volume_bricks_core::prelude::*;

pub const CONTAINER_MAGIC: [u8; 8] = *b"VBRICKS\0";
pub const CONTAINER_VERSION: u32 = 1;
pub const END_OF_BLOCKS: u8 = 0;

/// What a block holds.
#[derive(Clone, Copy, Debug, Deserialize, Eq, Hash, PartialEq, Serialize)]
pub enum BlockKind {
    RasterData,
    AccelerationIndex,
    Histogram1D,
    Histogram2D,
    KeyValueMetadata,
}

impl BlockKind {
    pub fn tag(&self) -> u8 {
        match self {
            BlockKind::RasterData => 1,
            BlockKind::AccelerationIndex => 2,
            BlockKind::Histogram1D => 3,
            BlockKind::Histogram2D => 4,
            BlockKind::KeyValueMetadata => 5,
        }
    }

    pub fn from_tag(tag: u8) -> Result<Self> {
        match tag {
            1 => Ok(BlockKind::RasterData),
            2 => Ok(BlockKind::AccelerationIndex),
            3 => Ok(BlockKind::Histogram1D),
            4 => Ok(BlockKind::Histogram2D),
            5 => Ok(BlockKind::KeyValueMetadata),
            other => Err(BrickError::integrity(format!("unknown block kind {}", other))),
        }
    }
}

/// Where one block lives in a committed container.
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct BlockHeader {
    pub kind: BlockKind,
    pub label: String,
    /// Absolute file offset of the first payload byte.
    pub payload_offset: u64,
    pub payload_len: u64,
}

/// Where one brick lives inside a raster block's brick stream.
#[derive(Clone, Copy, Debug, Deserialize, Eq, PartialEq, Serialize)]
pub struct BrickEntry {
    /// Offset from the start of the brick stream.
    pub offset: u64,
    pub stored_len: u64,
    /// Extent in voxel coordinates of the brick's level, halo included.
    pub extent: Extent3u,
}

/// Everything needed to interpret a raster block's brick stream.
#[derive(Clone, Debug, Deserialize, PartialEq, Serialize)]
pub struct RasterDescriptor {
    /// Axis labels, spatial axes first.
    pub axis_semantics: Vec<String>,
    /// Size of every axis. Axes past the third are carried along without interpretation.
    pub domain_size: Vec<u64>,
    /// How much each level is reduced per axis.
    pub decimation: Vec<u64>,
    pub level_count: u8,
    /// Configured brick size, halo included.
    pub brick_size: Point3u,
    pub overlap: Point3u,
    pub element: ElementType,
    pub component_semantics: Vec<ComponentSemantic>,
    /// Physical size of one voxel.
    pub aspect: [f32; 3],
    pub compression: BrickCompression,
    /// Range of the stored values.
    pub value_range: ScalarRange,
    pub level_domains: Vec<Point3u>,
    pub level_brick_counts: Vec<Point3u>,
    /// One entry per brick, in address order.
    pub bricks: Vec<BrickEntry>,
}

impl RasterDescriptor {
    /// The spatial domain of level 0.
    pub fn spatial_domain(&self) -> Result<Point3u> {
        if self.domain_size.len() < 3 {
            return Err(BrickError::integrity(format!(
                "raster domain has {} axes, expected at least 3",
                self.domain_size.len()
            )));
        }

        Ok(PointN([
            self.domain_size[0],
            self.domain_size[1],
            self.domain_size[2],
        ]))
    }

    /// Total bytes of the brick stream.
    pub fn brick_stream_len(&self) -> u64 {
        self.bricks.iter().fold(0, |total: u64, b| total.saturating_add(b.stored_len))
    }
}

/// Free form key/value pairs describing where the data came from.
#[derive(Clone, Debug, Default, Deserialize, Eq, PartialEq, Serialize)]
pub struct KeyValueMetadata {
    pub pairs: Vec<(String, String)>,
}

impl KeyValueMetadata {
    pub fn push(&mut self, key: impl Into<String>, value: impl Into<String>) {
        self.pairs.push((key.into(), value.into()));
    }

    pub fn get(&self, key: &str) -> Option<&str> {
        self.pairs
            .iter()
            .find(|(k, _)| k == key)
            .map(|(_, v)| v.as_str())
    }
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
    use crate::{AccelerationEntry, AccelerationIndex, ChecksumAlgorithm, RawFile};
    use pretty_assertions::assert_eq;
    use std::io::{Seek, SeekFrom, Write};

    fn descriptor(bricks: Vec<BrickEntry>) -> RasterDescriptor {
        RasterDescriptor {
            axis_semantics: vec!["X".into(), "Y".into(), "Z".into()],
            domain_size: vec![2, 2, 1],
            decimation: vec![2, 2, 2],
            level_count: 1,
            brick_size: Point3u::fill(16),
            overlap: Point3u::fill(2),
            element: ElementType::of::<u8>(1),
            component_semantics: vec![ComponentSemantic::Scalar],
            aspect: [1.0, 1.0, 1.0],
            compression: BrickCompression::None,
            value_range: ScalarRange::Unsigned(1, 4),
            level_domains: vec![PointN([2, 2, 1])],
            level_brick_counts: vec![Point3u::ONES],
            bricks,
        }
    }

    fn write_container(dir: &std::path::Path, checksum: ChecksumAlgorithm) -> std::path::PathBuf {
        let target = dir.join("volume.vbricks");
        let bricks_path = dir.join("bricks.tmp");
        std::fs::write(&bricks_path, [1u8, 2, 3, 4]).unwrap();

        let entry = BrickEntry {
            offset: 0,
            stored_len: 4,
            extent: Extent3u::from_min_and_shape(Point3u::ZERO, PointN([2, 2, 1])),
        };
        let mut writer = ContainerWriter::create(&target, checksum).unwrap();
        let mut bricks = RawFile::open(&bricks_path, 0).unwrap();
        writer
            .append_raster("timestep 0", &descriptor(vec![entry]), &mut bricks, 2)
            .unwrap();
        let accel = AccelerationIndex {
            channel: 0,
            entries: vec![AccelerationEntry {
                min_scalar: 1.0,
                max_scalar: 4.0,
                min_gradient: 1.0,
                max_gradient: 2.0,
            }],
        };
        writer
            .append_serialized(BlockKind::AccelerationIndex, "acceleration 0", &accel)
            .unwrap();
        let mut kv = KeyValueMetadata::default();
        kv.push("Data Source", "test");
        writer
            .append_serialized(BlockKind::KeyValueMetadata, "metadata", &kv)
            .unwrap();

        writer.close().unwrap()
    }

    #[test]
    fn blocks_are_read_back_in_order() {
        let dir = tempfile::tempdir().unwrap();
        let path = write_container(dir.path(), ChecksumAlgorithm::Md5);

        let container = Container::open(&path).unwrap();
        let kinds: Vec<_> = container.blocks().iter().map(|b| b.kind).collect();
        assert_eq!(
            kinds,
            vec![
                BlockKind::RasterData,
                BlockKind::AccelerationIndex,
                BlockKind::KeyValueMetadata
            ]
        );
        assert_eq!(container.blocks()[0].label, "timestep 0");

        let (raster, stream_offset) = container.raster_descriptor(&container.blocks()[0]).unwrap();
        assert_eq!(raster.bricks.len(), 1);
        let mut brick = vec![0; 4];
        container.read_at(stream_offset, &mut brick).unwrap();
        assert_eq!(brick, vec![1, 2, 3, 4]);

        let kv: KeyValueMetadata = container.read_block(&container.blocks()[2]).unwrap();
        assert_eq!(kv.get("Data Source"), Some("test"));

        container.verify_checksum().unwrap();
        assert!(!path.with_extension("vbricks.partial").exists());
    }

    #[test]
    fn corruption_fails_checksum() {
        let dir = tempfile::tempdir().unwrap();
        let path = write_container(dir.path(), ChecksumAlgorithm::Md5);
        let container = Container::open(&path).unwrap();
        let brick_offset = container.raster_descriptor(&container.blocks()[0]).unwrap().1;

        let mut file = std::fs::OpenOptions::new().write(true).open(&path).unwrap();
        file.seek(SeekFrom::Start(brick_offset)).unwrap();
        file.write_all(&[42]).unwrap();
        drop(file);

        let container = Container::open(&path).unwrap();
        assert!(container.verify_checksum().unwrap_err().is_integrity());
    }

    #[test]
    fn unchecked_containers_verify_trivially() {
        let dir = tempfile::tempdir().unwrap();
        let path = write_container(dir.path(), ChecksumAlgorithm::None);

        let container = Container::open(&path).unwrap();
        assert_eq!(container.checksum_algorithm(), ChecksumAlgorithm::None);
        container.verify_checksum().unwrap();
    }

    #[test]
    fn abandoned_writer_leaves_nothing_behind() {
        let dir = tempfile::tempdir().unwrap();
        let target = dir.path().join("abandoned.vbricks");
        {
            let mut writer = ContainerWriter::create(&target, ChecksumAlgorithm::Md5).unwrap();
            writer
                .append_block(BlockKind::KeyValueMetadata, "metadata", &[1, 2, 3])
                .unwrap();
        }

        assert_eq!(std::fs::read_dir(dir.path()).unwrap().count(), 0);
    }

    #[test]
    fn only_one_write_session_per_target() {
        let dir = tempfile::tempdir().unwrap();
        let target = dir.path().join("busy.vbricks");
        let _first = ContainerWriter::create(&target, ChecksumAlgorithm::Md5).unwrap();

        assert!(ContainerWriter::create(&target, ChecksumAlgorithm::Md5).err().unwrap().is_io());
    }

    #[test]
    fn truncated_container_is_rejected() {
        let dir = tempfile::tempdir().unwrap();
        let path = write_container(dir.path(), ChecksumAlgorithm::Md5);
        let len = std::fs::metadata(&path).unwrap().len();
        let file = std::fs::OpenOptions::new().write(true).open(&path).unwrap();
        file.set_len(len - 20).unwrap();

        assert!(Container::open(&path).is_err());
    }

    fn one_brick_of(len: u64) -> RasterDescriptor {
        descriptor(vec![BrickEntry {
            offset: 0,
            stored_len: len,
            extent: Extent3u::from_min_and_shape(Point3u::ZERO, PointN([2, 2, 1])),
        }])
    }

    #[test]
    fn short_brick_stream_discards_the_session() {
        let dir = tempfile::tempdir().unwrap();
        let target = dir.path().join("short.vbricks");
        let mut writer = ContainerWriter::create(&target, ChecksumAlgorithm::Md5).unwrap();
        writer
            .append_block(BlockKind::KeyValueMetadata, "metadata", &[1, 2, 3])
            .unwrap();

        let err = writer
            .append_raster("timestep 0", &one_brick_of(4), &mut &[1u8, 2][..], 2)
            .unwrap_err();
        assert!(err.is_integrity());
        assert!(!dir.path().join("short.vbricks.partial").exists());

        // Nothing more can be written, and nothing is committed.
        assert!(writer
            .append_block(BlockKind::KeyValueMetadata, "metadata", &[4])
            .unwrap_err()
            .is_integrity());
        assert!(writer.close().unwrap_err().is_integrity());
        assert_eq!(std::fs::read_dir(dir.path()).unwrap().count(), 0);
    }

    #[test]
    fn long_brick_stream_discards_the_session() {
        let dir = tempfile::tempdir().unwrap();
        let target = dir.path().join("long.vbricks");
        let mut writer = ContainerWriter::create(&target, ChecksumAlgorithm::Md5).unwrap();

        let err = writer
            .append_raster("timestep 0", &one_brick_of(4), &mut &[1u8, 2, 3, 4, 5][..], 2)
            .unwrap_err();
        assert!(err.is_integrity());
        assert!(writer.close().unwrap_err().is_integrity());
        assert!(!target.exists());
    }

    #[test]
    fn oversized_lengths_are_integrity_errors() {
        let dir = tempfile::tempdir().unwrap();
        let path = write_container(dir.path(), ChecksumAlgorithm::Md5);

        // The payload length of the first block: after the 14 byte header, the kind, the label length and "timestep 0".
        let mut file = std::fs::OpenOptions::new().write(true).open(&path).unwrap();
        file.seek(SeekFrom::Start(14 + 1 + 4 + 10)).unwrap();
        file.write_all(&u64::MAX.to_le_bytes()).unwrap();
        drop(file);

        assert!(Container::open(&path).err().unwrap().is_integrity());
    }

    #[test]
    fn bricks_past_the_stream_are_integrity_errors() {
        let dir = tempfile::tempdir().unwrap();
        let target = dir.path().join("shifted.vbricks");
        let entry = BrickEntry {
            offset: 2,
            stored_len: 4,
            extent: Extent3u::from_min_and_shape(Point3u::ZERO, PointN([2, 2, 1])),
        };
        let mut writer = ContainerWriter::create(&target, ChecksumAlgorithm::Md5).unwrap();
        writer
            .append_raster("timestep 0", &descriptor(vec![entry]), &mut &[1u8, 2, 3, 4][..], 2)
            .unwrap();
        let path = writer.close().unwrap();

        let container = Container::open(&path).unwrap();
        assert!(container
            .raster_descriptor(&container.blocks()[0])
            .unwrap_err()
            .is_integrity());
    }
}

