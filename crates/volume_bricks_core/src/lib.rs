//! Lattice types for addressing voxels of 3D volumes:
//! - `PointN`: a point, voxel coordinate or per-axis size, most importantly `Point3u` and `Point3f`
//! - `ExtentN`: an axis-aligned box of points, most importantly `Extent3u`

pub mod extent;
pub mod int_math;
pub mod point;

pub use extent::{Extent3PointIter, Extent3u, ExtentN};
pub use int_math::{div_ceil, halve_clamped};
pub use point::{Point3, Point3f, Point3u, PointN};

pub mod prelude {
    pub use super::{Extent3u, ExtentN, Point3, Point3f, Point3u, PointN};
}
