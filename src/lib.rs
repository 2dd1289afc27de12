//! Out-of-core storage for large scientific volumes.
//!
//! This library is organized into two crates:
//! - **core**: lattice point and extent data types
//! - **storage**: ingestion of raw sample files into brick pyramids, the container format, and the read side
//!
//! The usual entry points are `ingest`, which converts flat raw files into a container, `ContainerDataset`, which reads one
//! timestep of a container brick by brick, and `rebrick`, which presents a dataset with another brick size.

pub use volume_bricks_core as core;
pub use volume_bricks_storage as storage;

pub mod prelude {
    pub use super::core::prelude::*;
    pub use super::storage::prelude::*;
}
