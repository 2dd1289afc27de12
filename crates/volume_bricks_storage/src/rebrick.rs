//! Re-tiling a committed volume into a different brick geometry on demand.
//!
//! The wrapped volume's own levels are reused wherever the new ladder has a level with the same domain. Coarser levels that
//! only exist in the new ladder are box filtered from the next finer one, recursively, when a brick is requested.

use crate::{
    level_brick_keys, match_sample_type, BoxFilterDownsampler, BrickCache, BrickError, BrickKey, BrickLayout,
    BrickedVolume, Downsampler, ElementType, LevelFootprint, LodPlan, OverlappedBrickLayout, Result, Sample,
    ScalarRange,
};

use serde::{Deserialize, Serialize};
use std::sync::{Arc, Mutex};
use volume_bricks_core::prelude::*;

/// The geometry requested from [`rebrick`].
#[derive(Clone, Debug, Deserialize, Eq, PartialEq, Serialize)]
pub struct RebrickConfig {
    /// Inner brick size. The halo is the wrapped volume's overlap.
    pub brick_size: Point3u,
    /// Wrapped bricks kept in memory.
    pub cache_capacity: usize,
}

impl Default for RebrickConfig {
    fn default() -> Self {
        Self {
            brick_size: Point3u::fill(64),
            cache_capacity: 64,
        }
    }
}

/// Wraps `inner` in a view with bricks of `config.brick_size`.
///
/// Wherever the finest domain exceeds the brick size it must be a multiple of it, otherwise an `Integrity` error is returned.
/// The ladder keeps halving until every axis of the coarsest level fits in one brick.
pub fn rebrick<V: BrickedVolume>(inner: V, config: &RebrickConfig) -> Result<RebrickedVolume<V>> {
    let brick_size = config.brick_size;
    if brick_size.0.iter().any(|&b| b == 0) {
        return Err(BrickError::configuration(format!(
            "rebricking needs a positive brick size, got {:?}",
            brick_size.0
        )));
    }

    let domain = inner.layout().domain_size(0);
    for axis in 0..3 {
        let (d, b) = (domain.at(axis), brick_size.at(axis));
        if d > b && d % b != 0 {
            return Err(BrickError::integrity(format!(
                "domain {:?} is not divisible by brick size {:?}",
                domain.0, brick_size.0
            )));
        }
    }

    let plan = LodPlan::until_single_brick(domain, brick_size)?;
    let layout = OverlappedBrickLayout::with_inner_size(plan, brick_size, inner.layout().overlap());
    tracing::info!(
        "Rebricking {:?} into {:?} bricks: {} levels, {} bricks",
        domain.0,
        brick_size.0,
        layout.level_count(),
        layout.total_brick_count()
    );

    Ok(RebrickedVolume {
        inner,
        layout,
        cache: Mutex::new(BrickCache::with_capacity(config.cache_capacity)),
    })
}

/// A bricked volume presented with another brick geometry. Element type, byte order and value range are the wrapped
/// volume's.
pub struct RebrickedVolume<V> {
    inner: V,
    layout: OverlappedBrickLayout,
    cache: Mutex<BrickCache<BrickKey, Arc<Vec<u8>>>>,
}

impl<V: BrickedVolume> RebrickedVolume<V> {
    pub fn inner(&self) -> &V {
        &self.inner
    }

    pub fn into_inner(self) -> V {
        self.inner
    }

    pub fn brick_layout(&self) -> &OverlappedBrickLayout {
        &self.layout
    }

    fn wrapped_brick(&self, key: BrickKey) -> Result<Arc<Vec<u8>>> {
        if let Some(bytes) = self
            .cache
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .get(&key)
        {
            return Ok(Arc::clone(bytes));
        }

        let bytes = self
            .inner
            .brick(key)?
            .ok_or_else(|| BrickError::integrity(format!("wrapped volume has no brick {:?}", key)))?;
        self.cache
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .insert(key, Arc::clone(&bytes));

        Ok(bytes)
    }

    /// The voxels of `extent` at `lod` of this ladder, row-major.
    fn read_region(&self, lod: u8, extent: &Extent3u) -> Result<Vec<u8>> {
        let wrapped = self.inner.layout();
        let domain = self.layout.domain_size(lod);
        if (lod as usize) < wrapped.level_count() && wrapped.domain_size(lod) == domain {
            return self.gather(lod, extent);
        }
        if lod == 0 {
            return Err(BrickError::integrity(format!(
                "wrapped finest level {:?} differs from {:?}",
                wrapped.domain_size(0).0,
                domain.0
            )));
        }

        let footprint = LevelFootprint::new(self.layout.domain_size(lod - 1), domain);
        let src_extent = footprint.footprint_of_extent(extent);
        let src = self.read_region(lod - 1, &src_extent)?;
        let element = self.inner.element_type();

        match_sample_type!(element, T => {
            Ok(downsample_bytes::<T>(&footprint, &src, &src_extent, extent, element))
        })
    }

    /// Copies `extent` out of the wrapped bricks of `lod` that intersect it.
    fn gather(&self, lod: u8, extent: &Extent3u) -> Result<Vec<u8>> {
        let wrapped = self.inner.layout();
        let element_bytes = self.inner.element_type().bytes_per_element();
        let mut out = vec![0; extent.num_points() * element_bytes];
        for key in level_brick_keys(wrapped, lod) {
            let brick_extent = match wrapped.brick_extent(key) {
                Some(e) => e,
                None => continue,
            };
            let shared = brick_extent.intersection(extent);
            if shared.is_empty() {
                continue;
            }

            let brick = self.wrapped_brick(key)?;
            if brick.len() != brick_extent.num_points() * element_bytes {
                return Err(BrickError::integrity(format!(
                    "wrapped brick {:?} holds {} bytes, its extent needs {}",
                    key,
                    brick.len(),
                    brick_extent.num_points() * element_bytes
                )));
            }
            let row_bytes = shared.shape.x() as usize * element_bytes;
            for z in shared.axis_range(2) {
                for y in shared.axis_range(1) {
                    let p = PointN([shared.minimum.x(), y, z]);
                    let src = brick_extent.linear_offset(p) * element_bytes;
                    let dst = extent.linear_offset(p) * element_bytes;
                    out[dst..dst + row_bytes].copy_from_slice(&brick[src..src + row_bytes]);
                }
            }
        }

        Ok(out)
    }
}

fn downsample_bytes<T: Sample>(
    footprint: &LevelFootprint,
    src_bytes: &[u8],
    src_extent: &Extent3u,
    dst_extent: &Extent3u,
    element: ElementType,
) -> Vec<u8> {
    let components = element.components as usize;
    // Copy into typed buffers, the byte buffers carry no alignment guarantee.
    let mut src = vec![T::default(); src_bytes.len() / std::mem::size_of::<T>()];
    let src_byte_len = src.len() * std::mem::size_of::<T>();
    bytemuck::cast_slice_mut::<T, u8>(&mut src).copy_from_slice(&src_bytes[..src_byte_len]);
    let mut dst = vec![T::default(); dst_extent.num_points() * components];
    BoxFilterDownsampler.downsample(footprint, &src, src_extent, &mut dst, dst_extent, components);

    bytemuck::cast_slice(&dst).to_vec()
}

impl<V: BrickedVolume> BrickedVolume for RebrickedVolume<V> {
    fn layout(&self) -> &dyn BrickLayout {
        &self.layout
    }

    fn element_type(&self) -> ElementType {
        self.inner.element_type()
    }

    fn is_same_endianness(&self) -> bool {
        self.inner.is_same_endianness()
    }

    fn value_range(&self) -> ScalarRange {
        self.inner.value_range()
    }

    fn brick(&self, key: BrickKey) -> Result<Option<Arc<Vec<u8>>>> {
        let extent = match self.layout.brick_extent(key) {
            Some(extent) => extent,
            None => return Ok(None),
        };

        self.read_region(key.lod, &extent).map(|bytes| Some(Arc::new(bytes)))
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
    use crate::ingest::tests::ingest_samples;
    use crate::{brick_keys, read_brick_as, ContainerDataset, IngestConfig};
    use pretty_assertions::assert_eq;
    use utilities::data_sets::{ramp_8x8, random_samples};

    fn ramp_dataset(dir: &std::path::Path) -> ContainerDataset {
        let config = IngestConfig {
            brick_size: 16,
            brick_overlap: 2,
            ..Default::default()
        };
        let (path, _) = ingest_samples(dir, &ramp_8x8(), [8, 8, 1], config);

        ContainerDataset::open(path, 0, 4).unwrap()
    }

    fn config(brick_size: [u64; 3]) -> RebrickConfig {
        RebrickConfig {
            brick_size: PointN(brick_size),
            cache_capacity: 8,
        }
    }

    fn sub_region(samples: &[u16], domain: Point3u, extent: &Extent3u) -> Vec<u16> {
        let whole = Extent3u::from_min_and_shape(Point3u::ZERO, domain);

        extent.iter_points().map(|p| samples[whole.linear_offset(p)]).collect()
    }

    #[test]
    fn splitting_either_axis_adds_one_synthesized_level() {
        let dir = tempfile::tempdir().unwrap();

        for (size, counts) in vec![([4, 8, 1], [2, 1, 1]), ([8, 4, 1], [1, 2, 1])] {
            let view = rebrick(ramp_dataset(dir.path()), &config(size)).unwrap();

            assert_eq!(view.layout().level_count(), 2);
            assert_eq!(view.layout().brick_count(0), PointN(counts));
            assert_eq!(view.layout().brick_count(1), Point3u::ONES);
            assert_eq!(view.layout().total_brick_count(), 3);
        }
    }

    #[test]
    fn finest_bricks_carry_the_wrapped_voxels() {
        let dir = tempfile::tempdir().unwrap();
        let samples = ramp_8x8();
        let view = rebrick(ramp_dataset(dir.path()), &config([4, 8, 1])).unwrap();

        let mut brick: Vec<u16> = Vec::new();
        for key in level_brick_keys(view.layout(), 0) {
            assert!(read_brick_as(&view, key, &mut brick).unwrap());
            let extent = view.layout().brick_extent(key).unwrap();
            assert_eq!(brick, sub_region(&samples, PointN([8, 8, 1]), &extent));
        }
        // The halo reaches one voxel into the neighbor.
        let second = view.layout().brick_extent(BrickKey::new(0, PointN([1, 0, 0]))).unwrap();
        assert_eq!(second.minimum, PointN([3, 0, 0]));
    }

    #[test]
    fn synthesized_level_is_box_filtered() {
        let dir = tempfile::tempdir().unwrap();
        let samples = ramp_8x8();
        let view = rebrick(ramp_dataset(dir.path()), &config([4, 8, 1])).unwrap();

        let mut coarse: Vec<u16> = Vec::new();
        assert!(read_brick_as(&view, BrickKey::new(1, Point3u::ZERO), &mut coarse).unwrap());

        let expected: Vec<u16> = Extent3u::from_min_and_shape(Point3u::ZERO, PointN([4, 4, 1]))
            .iter_points()
            .map(|p| {
                let sum: u32 = [(0, 0), (1, 0), (0, 1), (1, 1)]
                    .iter()
                    .map(|(dx, dy)| samples[((2 * p.y() + dy) * 8 + 2 * p.x() + dx) as usize] as u32)
                    .sum();
                (sum as f64 / 4.0).round() as u16
            })
            .collect();
        assert_eq!(coarse, expected);
    }

    #[test]
    fn one_brick_covering_everything() {
        let dir = tempfile::tempdir().unwrap();
        let view = rebrick(ramp_dataset(dir.path()), &config([8, 8, 8])).unwrap();

        assert_eq!(view.layout().total_brick_count(), 1);
        let mut brick: Vec<u16> = Vec::new();
        read_brick_as(&view, BrickKey::new(0, Point3u::ZERO), &mut brick).unwrap();
        assert_eq!(brick.len(), 64);
        assert_eq!(brick, ramp_8x8());
    }

    #[test]
    fn non_dividing_brick_size_is_rejected() {
        let dir = tempfile::tempdir().unwrap();

        let err = rebrick(ramp_dataset(dir.path()), &config([3, 8, 1])).err().unwrap();
        assert!(err.is_integrity());
        let err = rebrick(ramp_dataset(dir.path()), &config([0, 8, 1])).err().unwrap();
        assert!(err.is_configuration());
    }

    #[test]
    fn ladder_halves_down_to_one_brick() {
        let dir = tempfile::tempdir().unwrap();
        let domain = PointN([32, 16, 8]);
        let samples: Vec<u8> = random_samples(7, domain.num_points());
        let ingest = IngestConfig {
            brick_size: 16,
            brick_overlap: 2,
            ..Default::default()
        };
        let (path, summary) = ingest_samples(dir.path(), &samples, domain.0, ingest);
        assert_eq!(summary.level_count, 2);

        let view = rebrick(ContainerDataset::open(path, 0, 4).unwrap(), &config([8, 8, 8])).unwrap();

        let counts: Vec<_> = (0..view.layout().level_count())
            .map(|lod| view.layout().brick_count(lod as u8))
            .collect();
        assert_eq!(counts, vec![PointN([4, 2, 1]), PointN([2, 1, 1]), Point3u::ONES]);
        assert_eq!(view.layout().total_brick_count(), 11);

        let whole = Extent3u::from_min_and_shape(Point3u::ZERO, domain);
        let mut brick: Vec<u8> = Vec::new();
        for key in brick_keys(view.layout()) {
            assert!(read_brick_as(&view, key, &mut brick).unwrap());
            let extent = view.layout().brick_extent(key).unwrap();
            assert_eq!(brick.len(), extent.num_points());
            if key.lod == 0 {
                let expected: Vec<u8> = extent.iter_points().map(|p| samples[whole.linear_offset(p)]).collect();
                assert_eq!(brick, expected);
            }
        }
    }

    #[test]
    fn metadata_passes_through() {
        let dir = tempfile::tempdir().unwrap();
        let dataset = ramp_dataset(dir.path());
        let element = dataset.element_type();
        let range = dataset.value_range();

        let view = rebrick(dataset, &config([4, 4, 1])).unwrap();

        assert_eq!(view.element_type(), element);
        assert_eq!(view.value_range(), range);
        assert!(view.is_same_endianness());
        assert_eq!(view.layout().overlap(), Point3u::fill(2));
    }

    #[test]
    fn out_of_range_keys_read_nothing() {
        let dir = tempfile::tempdir().unwrap();
        let view = rebrick(ramp_dataset(dir.path()), &config([4, 8, 1])).unwrap();

        let mut bytes = vec![1, 2, 3];
        assert!(!view.read_brick(BrickKey::new(0, PointN([2, 0, 0])), &mut bytes).unwrap());
        assert!(!view.read_brick(BrickKey::new(2, Point3u::ZERO), &mut bytes).unwrap());
        assert!(bytes.is_empty());
    }
}
