//! Brick geometry: how each level of a pyramid is cut into overlapping bricks and how bricks are addressed.

use crate::{BrickError, LodPlan, Result};

use serde::{Deserialize, Serialize};
use volume_bricks_core::prelude::*;
use volume_bricks_core::div_ceil;

/// Uniquely addresses one brick: the level and the brick's index on each axis.
#[derive(Clone, Copy, Debug, Deserialize, Eq, Hash, Ord, PartialEq, PartialOrd, Serialize)]
pub struct BrickKey {
    pub lod: u8,
    pub index: [u64; 3],
}

impl BrickKey {
    pub fn new(lod: u8, index: Point3u) -> Self {
        Self { lod, index: index.0 }
    }

    pub fn index(&self) -> Point3u {
        PointN(self.index)
    }
}

/// The geometry of a brick pyramid.
///
/// Brick extents are in voxel coordinates of their own level and include the halo shared with neighbors.
pub trait BrickLayout {
    fn level_count(&self) -> usize;

    /// Domain size of `lod`, or zero beyond the coarsest level.
    fn domain_size(&self, lod: u8) -> Point3u;

    /// Bricks per axis at `lod`, or zero beyond the coarsest level.
    fn brick_count(&self, lod: u8) -> Point3u;

    fn brick_extent(&self, key: BrickKey) -> Option<Extent3u>;

    /// Halo voxels duplicated across every interior face.
    fn overlap(&self) -> Point3u;

    fn contains_key(&self, key: BrickKey) -> bool {
        (key.lod as usize) < self.level_count()
            && Extent3u::from_min_and_shape(Point3u::ZERO, self.brick_count(key.lod)).contains(key.index())
    }

    fn total_brick_count(&self) -> u64 {
        (0..self.level_count())
            .map(|lod| self.brick_count(lod as u8).volume())
            .sum()
    }

    /// Position of `key` in address order: level, then z, then y, then x.
    fn brick_ordinal(&self, key: BrickKey) -> Option<usize> {
        if !self.contains_key(key) {
            return None;
        }
        let before: u64 = (0..key.lod).map(|lod| self.brick_count(lod).volume()).sum();
        let counts = Extent3u::from_min_and_shape(Point3u::ZERO, self.brick_count(key.lod));

        Some(before as usize + counts.linear_offset(key.index()))
    }
}

/// Every brick key of `layout` in address order: level, then z, then y, then x.
pub fn brick_keys<'a>(layout: &'a dyn BrickLayout) -> impl Iterator<Item = BrickKey> + 'a {
    (0..layout.level_count()).flat_map(move |lod| level_brick_keys(layout, lod as u8))
}

/// The brick keys of one level in address order.
pub fn level_brick_keys(layout: &dyn BrickLayout, lod: u8) -> impl Iterator<Item = BrickKey> {
    Extent3u::from_min_and_shape(Point3u::ZERO, layout.brick_count(lod))
        .iter_points()
        .map(move |index| BrickKey::new(lod, index))
}

/// Bricks with a fixed inner size and a halo of `overlap` voxels around every interior face.
///
/// On each axis with domain `d`, inner size `n` and overlap `o`, there are `max(1, ceil(d / n))` bricks and brick `i` spans
/// `[i·n - ⌊o/2⌋, (i+1)·n + ⌈o/2⌉)` clamped to `[0, d)`. Boundary faces get no halo.
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct OverlappedBrickLayout {
    plan: LodPlan,
    inner: Point3u,
    overlap: Point3u,
}

impl OverlappedBrickLayout {
    /// The ingestion geometry: bricks of `brick_size` voxels including the overlap.
    pub fn for_ingestion(plan: LodPlan, brick_size: Point3u, overlap: Point3u) -> Result<Self> {
        for axis in 0..3 {
            if brick_size.at(axis) <= overlap.at(axis) {
                return Err(BrickError::configuration(format!(
                    "brick size {:?} must exceed the overlap {:?} on every axis",
                    brick_size.0, overlap.0
                )));
            }
        }

        Ok(Self::with_inner_size(plan, brick_size - overlap, overlap))
    }

    /// Bricks with `inner` voxels per axis before the halo is added.
    pub fn with_inner_size(plan: LodPlan, inner: Point3u, overlap: Point3u) -> Self {
        Self {
            plan,
            inner,
            overlap,
        }
    }

    pub fn inner_size(&self) -> Point3u {
        self.inner
    }

    pub fn plan(&self) -> &LodPlan {
        &self.plan
    }

    /// The voxels a brick owns, excluding its halo.
    pub fn inner_extent(&self, key: BrickKey) -> Option<Extent3u> {
        let domain = self.plan.domain_size(key.lod as usize)?;
        if !self.contains_key(key) {
            return None;
        }
        let min = key.index() * self.inner;
        let lub = ((key.index() + Point3u::ONES) * self.inner).meet(&domain);

        Some(Extent3u::from_min_and_lub(min, lub))
    }
}

impl BrickLayout for OverlappedBrickLayout {
    fn level_count(&self) -> usize {
        self.plan.level_count()
    }

    fn domain_size(&self, lod: u8) -> Point3u {
        self.plan.domain_size(lod as usize).unwrap_or(Point3u::ZERO)
    }

    fn brick_count(&self, lod: u8) -> Point3u {
        match self.plan.domain_size(lod as usize) {
            Some(domain) => domain.zip_components(&self.inner, |d, n| div_ceil(d, n).max(1)),
            None => Point3u::ZERO,
        }
    }

    fn brick_extent(&self, key: BrickKey) -> Option<Extent3u> {
        let inner = self.inner_extent(key)?;
        let domain = self.domain_size(key.lod);
        let low_halo = self.overlap.map_components(|o| o / 2);
        let high_halo = self.overlap - low_halo;
        let min = inner.minimum.saturating_sub(&low_halo);
        let lub = (inner.least_upper_bound() + high_halo).meet(&domain);

        Some(Extent3u::from_min_and_lub(min, lub))
    }

    fn overlap(&self) -> Point3u {
        self.overlap
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
    use pretty_assertions::assert_eq;

    fn layout(domain: [u64; 3], brick: u64, overlap: u64) -> OverlappedBrickLayout {
        let plan = LodPlan::for_ingestion(PointN(domain), brick).unwrap();

        OverlappedBrickLayout::for_ingestion(plan, Point3u::fill(brick), Point3u::fill(overlap)).unwrap()
    }

    #[test]
    fn small_domain_is_one_brick() {
        let layout = layout([8, 8, 1], 16, 2);

        assert_eq!(layout.total_brick_count(), 1);
        assert_eq!(
            layout.brick_extent(BrickKey::new(0, Point3u::ZERO)),
            Some(Extent3u::from_min_and_shape(Point3u::ZERO, PointN([8, 8, 1])))
        );
    }

    #[test]
    fn interior_faces_get_halo() {
        let layout = layout([30, 1, 1], 12, 2);
        // inner size 10
        assert_eq!(layout.brick_count(0), PointN([3, 1, 1]));

        let extent_x = |i| layout.brick_extent(BrickKey::new(0, PointN([i, 0, 0]))).unwrap().axis_range(0);
        assert_eq!(extent_x(0), 0..11);
        assert_eq!(extent_x(1), 9..21);
        assert_eq!(extent_x(2), 19..30);
    }

    #[test]
    fn keys_are_in_address_order() {
        let layout = layout([20, 20, 1], 12, 2);
        let keys: Vec<_> = brick_keys(&layout).collect();

        assert_eq!(keys.len() as u64, layout.total_brick_count());
        for (i, key) in keys.iter().enumerate() {
            assert_eq!(layout.brick_ordinal(*key), Some(i));
        }
        assert_eq!(keys[1], BrickKey::new(0, PointN([1, 0, 0])));
        assert_eq!(keys[2], BrickKey::new(0, PointN([0, 1, 0])));
    }

    #[test]
    fn out_of_range_keys_have_no_extent() {
        let layout = layout([8, 8, 1], 16, 2);

        assert_eq!(layout.brick_extent(BrickKey::new(0, PointN([1, 0, 0]))), None);
        assert_eq!(layout.brick_extent(BrickKey::new(1, Point3u::ZERO)), None);
        assert_eq!(layout.brick_ordinal(BrickKey::new(3, Point3u::ZERO)), None);
    }

    #[test]
    fn overlap_must_be_smaller_than_brick() {
        let plan = LodPlan::for_ingestion(PointN([8, 8, 8]), 2).unwrap();

        assert!(OverlappedBrickLayout::for_ingestion(plan, Point3u::fill(2), Point3u::fill(2))
            .unwrap_err()
            .is_configuration());
    }
}
