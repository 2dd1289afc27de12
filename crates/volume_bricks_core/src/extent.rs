use crate::{Point3u, PointN};

use core::ops::Range;
use itertools::{iproduct, ConsTuples, Product};

#[cfg(feature = "serde")]
use serde::{Deserialize, Serialize};

/// A 3-dimensional extent with scalar type `u64`.
pub type Extent3u = ExtentN<[u64; 3]>;

/// An axis-aligned box of lattice points: `[minimum, minimum + shape)` on every axis. Brick extents, sample windows and
/// downsampling footprints are all expressed this way.
#[derive(Clone, Copy, Debug, Default, Eq, Hash, PartialEq)]
#[cfg_attr(feature = "serde", derive(Deserialize, Serialize))]
pub struct ExtentN<N> {
    /// First point on every axis.
    pub minimum: PointN<N>,
    /// Points per axis.
    pub shape: PointN<N>,
}

impl<N> ExtentN<N> {
    #[inline]
    pub fn from_min_and_shape(minimum: PointN<N>, shape: PointN<N>) -> Self {
        Self { minimum, shape }
    }
}

impl Extent3u {
    /// The extent `[minimum, least_upper_bound)`. Axes where the bound lies below the minimum get an empty shape.
    #[inline]
    pub fn from_min_and_lub(minimum: Point3u, least_upper_bound: Point3u) -> Self {
        let shape = least_upper_bound.saturating_sub(&minimum);

        Self { minimum, shape }
    }

    /// One past the last point on every axis.
    #[inline]
    pub fn least_upper_bound(&self) -> Point3u {
        self.minimum + self.shape
    }

    #[inline]
    pub fn volume(&self) -> u64 {
        self.shape.volume()
    }

    #[inline]
    pub fn num_points(&self) -> usize {
        self.volume() as usize
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.num_points() == 0
    }

    #[inline]
    pub fn contains(&self, p: Point3u) -> bool {
        let lub = self.least_upper_bound();

        self.minimum <= p && p < lub
    }

    /// The points shared by both extents. Disjoint extents give an empty extent.
    #[inline]
    pub fn intersection(&self, other: &Self) -> Self {
        let minimum = self.minimum.join(&other.minimum);
        let lub = self.least_upper_bound().meet(&other.least_upper_bound());

        Self::from_min_and_lub(minimum, lub)
    }

    /// Empty extents are subsets of everything.
    #[inline]
    pub fn is_subset_of(&self, other: &Self) -> bool {
        self.is_empty() || self.intersection(other).eq(self)
    }

    /// The half-open interval covered on `axis`.
    #[inline]
    pub fn axis_range(&self, axis: usize) -> Range<u64> {
        self.minimum.at(axis)..self.minimum.at(axis) + self.shape.at(axis)
    }

    /// Visits every point in row-major order: X fastest, then Y, then Z.
    ///
    /// ```
    /// # use volume_bricks_core::prelude::*;
    /// #
    /// let extent = Extent3u::from_min_and_shape(PointN([0, 0, 0]), PointN([2, 2, 1]));
    /// let points = extent.iter_points().collect::<Vec<_>>();
    /// assert_eq!(points, vec![
    ///     PointN([0, 0, 0]), PointN([1, 0, 0]), PointN([0, 1, 0]), PointN([1, 1, 0])
    /// ]);
    /// ```
    #[inline]
    pub fn iter_points(&self) -> Extent3PointIter {
        let lub = self.least_upper_bound();

        Extent3PointIter {
            // Outermost first, so Z varies slowest.
            product: iproduct!(
                self.minimum.z()..lub.z(),
                self.minimum.y()..lub.y(),
                self.minimum.x()..lub.x()
            ),
        }
    }

    /// The linear offset of `p` inside a row-major (X fastest) array covering this extent.
    #[inline]
    pub fn linear_offset(&self, p: Point3u) -> usize {
        let local = p - self.minimum;

        ((local.z() * self.shape.y() + local.y()) * self.shape.x() + local.x()) as usize
    }
}

type RangeProduct2 = Product<Range<u64>, Range<u64>>;
type RangeProduct3 = Product<RangeProduct2, Range<u64>>;

/// Row-major iterator over the points of an `Extent3u`.
pub struct Extent3PointIter {
    product: ConsTuples<RangeProduct3, ((u64, u64), u64)>,
}

impl Iterator for Extent3PointIter {
    type Item = Point3u;

    #[inline]
    fn next(&mut self) -> Option<Self::Item> {
        self.product.next().map(|(z, y, x)| PointN([x, y, z]))
    }
}

// ████████╗███████╗███████╗████████╗
// ╚══██╔══╝██╔════╝██╔════╝╚══██╔══╝
//    ██║   █████╗  ███████╗   ██║
//    ██║   ██╔══╝  ╚════██║   ██║
//    ██║   ███████╗███████║   ██║
//    ╚═╝   ╚══════╝╚══════╝   ╚═╝
