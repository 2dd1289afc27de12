#![allow(
    clippy::type_complexity,
    clippy::needless_collect,
    clippy::too_many_arguments
)]

//! Out-of-core storage for large volumes: ingestion of flat raw sample files into multiresolution brick pyramids, per-brick
//! acceleration metadata, and the append-only container they are written to.
//!
//! Ingestion (see `ingest`) runs these stages, each streaming through files in bounded chunks:
//!   - `scan`: exact global min/max and a value histogram
//!   - `endian`: byte order normalization
//!   - `quantize`: narrowing wide types to 8 or 16 bits
//!   - `lod` and `layout`: the level pyramid and how each level is cut into overlapping bricks
//!   - `bricking`: box filtered levels, bricks, acceleration entries and histograms
//!   - `container`: the append-only, checksummed block file
//!
//! On the read side, a `ContainerDataset` opens one timestep of a committed container and serves bricks through an LRU cache.
//! Its `MetadataView` answers geometry and visibility queries without touching voxel payloads, and `rebrick` presents any
//! `BrickedVolume` with a different brick size.

#[macro_use]
pub mod element;

pub mod acceleration;
pub mod bricking;
pub mod caching;
pub mod compression;
pub mod container;
pub mod dataset;
pub mod digest;
pub mod downsample;
pub mod endian;
pub mod error;
pub mod histogram;
pub mod ingest;
pub mod layout;
pub mod lod;
pub mod metadata;
pub mod progress;
pub mod quantize;
pub mod raw_file;
pub mod rebrick;
pub mod scan;

pub use acceleration::*;
pub use bricking::*;
pub use caching::*;
pub use compression::*;
pub use container::*;
pub use dataset::*;
pub use digest::*;
pub use downsample::*;
pub use element::*;
pub use endian::*;
pub use error::*;
pub use histogram::*;
pub use ingest::*;
pub use layout::*;
pub use lod::*;
pub use metadata::*;
pub use progress::*;
pub use quantize::*;
pub use raw_file::*;
pub use rebrick::*;
pub use scan::*;

// Hash type to use for small keys like `BrickKey`.
pub type SmallKeyBuildHasher = ahash::RandomState;

pub mod prelude {
    pub use super::{
        analyze_range, ingest, ingest_with_progress, read_brick_as, rebrick, BlockKind, BrickCompression, BrickError,
        BrickKey, BrickLayout, BrickedVolume, ChecksumAlgorithm, ComponentSemantic, Container, ContainerDataset,
        ContainerWriter, ElementType, IngestConfig, IngestSummary, MetadataView, RebrickConfig, RebrickedVolume, Sample,
        ScalarKind, ScalarRange, SourceCompression,
    };

    #[cfg(feature = "lz4")]
    pub use super::Lz4;
}
