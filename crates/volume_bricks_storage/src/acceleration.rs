//! Per-brick scalar and gradient ranges used to skip bricks that cannot contain a queried value.

use crate::Sample;

use serde::{Deserialize, Serialize};
use volume_bricks_core::prelude::*;

/// Which component acceleration data is computed on, indexed by `components - 1`. The fourth component of 4-component data is
/// treated as alpha.
pub const ACCELERATION_CHANNEL_BY_COMPONENTS: [usize; 4] = [0, 0, 0, 3];

pub fn acceleration_channel(components: u8) -> usize {
    ACCELERATION_CHANNEL_BY_COMPONENTS
        .get((components as usize).saturating_sub(1))
        .copied()
        .unwrap_or(0)
}

/// Scalar and gradient magnitude range of one brick's designated channel.
#[derive(Clone, Copy, Debug, Deserialize, PartialEq, Serialize)]
pub struct AccelerationEntry {
    pub min_scalar: f64,
    pub max_scalar: f64,
    pub min_gradient: f64,
    pub max_gradient: f64,
}

impl AccelerationEntry {
    /// Folds the ranges of one brick. `samples` is row-major over `shape` with `components` values per voxel.
    ///
    /// Gradients use central differences inside the brick and one-sided differences on its faces. Axes of size 1 contribute
    /// no gradient.
    pub fn from_brick<T: Sample>(samples: &[T], shape: Point3u, components: usize, channel: usize) -> Self {
        let extent = Extent3u::from_min_and_shape(Point3u::ZERO, shape);
        let value = |p: Point3u| samples[extent.linear_offset(p) * components + channel].to_f64();

        let mut entry = Self {
            min_scalar: f64::INFINITY,
            max_scalar: f64::NEG_INFINITY,
            min_gradient: f64::INFINITY,
            max_gradient: f64::NEG_INFINITY,
        };
        for p in extent.iter_points() {
            let v = value(p);
            if v.is_nan() {
                continue;
            }
            entry.min_scalar = entry.min_scalar.min(v);
            entry.max_scalar = entry.max_scalar.max(v);

            let g = gradient_magnitude(&value, p, shape);
            entry.min_gradient = entry.min_gradient.min(g);
            entry.max_gradient = entry.max_gradient.max(g);
        }

        entry
    }

    /// Returns `true` iff the brick can contain `isovalue`.
    #[inline]
    pub fn contains_isovalue(&self, isovalue: f64) -> bool {
        isovalue <= self.max_scalar
    }

    /// Returns `true` iff `[min, max]` overlaps the brick's scalar range.
    #[inline]
    pub fn overlaps_scalar_range(&self, min: f64, max: f64) -> bool {
        max >= self.min_scalar && min <= self.max_scalar
    }

    /// Returns `true` iff `[min, max]` overlaps the brick's gradient range.
    #[inline]
    pub fn overlaps_gradient_range(&self, min: f64, max: f64) -> bool {
        max >= self.min_gradient && min <= self.max_gradient
    }
}

/// Magnitude of the finite difference gradient at `p`.
pub fn gradient_magnitude(value: &impl Fn(Point3u) -> f64, p: Point3u, shape: Point3u) -> f64 {
    let mut sum_sq = 0.0;
    for axis in 0..3 {
        let size = shape.at(axis);
        if size < 2 {
            continue;
        }
        let i = p.at(axis);
        let mut lo = p;
        let mut hi = p;
        *lo.at_mut(axis) = i.saturating_sub(1);
        *hi.at_mut(axis) = (i + 1).min(size - 1);
        let d = (value(hi) - value(lo)) / (hi.at(axis) - lo.at(axis)) as f64;
        sum_sq += d * d;
    }

    sum_sq.sqrt()
}

/// One entry per brick, in brick address order.
#[derive(Clone, Debug, Default, Deserialize, PartialEq, Serialize)]
pub struct AccelerationIndex {
    pub channel: usize,
    pub entries: Vec<AccelerationEntry>,
}

// ████████╗███████╗███████╗████████╗
// ╚══██╔══╝██╔════╝██╔════╝╚══██╔══╝
//    ██║   █████╗  ███████╗   ██║
//    ██║   ██╔══╝  ╚════██║   ██║
//    ██║   ███████╗███████║   ██║
//    ╚═╝   ╚══════╝╚══════╝   ╚═╝
