//! Read side view of one timestep: brick geometry and acceleration data, without touching voxel payloads.

use crate::{AccelerationEntry, AccelerationIndex, BrickEntry, BrickError, BrickKey, BrickLayout, RasterDescriptor, Result};

use volume_bricks_core::prelude::*;

/// Brick geometry reconstructed from a raster block, plus the acceleration entries of its bricks when they were stored.
///
/// Every visibility predicate answers `true` when there is no acceleration data: without it, any brick may be visible.
#[derive(Clone, Debug)]
pub struct MetadataView {
    level_domains: Vec<Point3u>,
    level_brick_counts: Vec<Point3u>,
    /// Index of the first brick of each level.
    level_starts: Vec<usize>,
    brick_size: Point3u,
    overlap: Point3u,
    bricks: Vec<BrickEntry>,
    acceleration: Option<Vec<AccelerationEntry>>,
}

impl MetadataView {
    pub fn new(descriptor: &RasterDescriptor, acceleration: Option<&AccelerationIndex>) -> Result<Self> {
        let levels = descriptor.level_count as usize;
        if descriptor.level_domains.len() != levels || descriptor.level_brick_counts.len() != levels {
            return Err(BrickError::integrity(format!(
                "raster descriptor declares {} levels but describes {} domains and {} brick counts",
                levels,
                descriptor.level_domains.len(),
                descriptor.level_brick_counts.len()
            )));
        }

        let mut level_starts = Vec::with_capacity(levels);
        let mut total: usize = 0;
        for counts in descriptor.level_brick_counts.iter() {
            level_starts.push(total);
            total = checked_volume(*counts, 1)
                .and_then(|n| total.checked_add(n as usize))
                .ok_or_else(|| BrickError::integrity(format!("brick counts {:?} overflow", counts)))?;
        }
        if descriptor.bricks.len() != total {
            return Err(BrickError::integrity(format!(
                "raster descriptor lists {} bricks, its levels hold {}",
                descriptor.bricks.len(),
                total
            )));
        }
        check_brick_extents(descriptor, &level_starts)?;
        if let Some(index) = acceleration {
            if index.entries.len() != total {
                return Err(BrickError::integrity(format!(
                    "{} acceleration entries for {} bricks",
                    index.entries.len(),
                    total
                )));
            }
        }

        Ok(Self {
            level_domains: descriptor.level_domains.clone(),
            level_brick_counts: descriptor.level_brick_counts.clone(),
            level_starts,
            brick_size: descriptor.brick_size,
            overlap: descriptor.overlap,
            bricks: descriptor.bricks.clone(),
            acceleration: acceleration.map(|index| index.entries.clone()),
        })
    }

    pub fn has_acceleration_data(&self) -> bool {
        self.acceleration.is_some()
    }

    /// The configured brick size, halo included.
    pub fn configured_brick_size(&self) -> Point3u {
        self.brick_size
    }

    fn ordinal(&self, key: BrickKey) -> Option<usize> {
        let counts = *self.level_brick_counts.get(key.lod as usize)?;
        let level = Extent3u::from_min_and_shape(Point3u::ZERO, counts);
        if !level.contains(key.index()) {
            return None;
        }

        Some(self.level_starts[key.lod as usize] + level.linear_offset(key.index()))
    }

    pub fn brick_entry(&self, key: BrickKey) -> Option<&BrickEntry> {
        self.ordinal(key).map(|i| &self.bricks[i])
    }

    pub fn acceleration_entry(&self, key: BrickKey) -> Option<&AccelerationEntry> {
        let i = self.ordinal(key)?;

        self.acceleration.as_ref().map(|entries| &entries[i])
    }

    /// Size of the brick in voxels, halo included.
    pub fn brick_size(&self, key: BrickKey) -> Option<Point3u> {
        self.brick_entry(key).map(|b| b.extent.shape)
    }

    /// The brick's size without the halo it shares with neighbors: half the overlap is trimmed from every interior face.
    /// Faces on the domain boundary keep their full extent.
    pub fn effective_brick_size(&self, key: BrickKey) -> Option<Point3f> {
        let size = self.brick_size(key)?;
        let counts = self.level_brick_counts[key.lod as usize];
        let mut effective = Point3f::from(size);
        for axis in 0..3 {
            let half_overlap = self.overlap.at(axis) as f32 / 2.0;
            let i = key.index[axis];
            if i > 0 {
                *effective.at_mut(axis) -= half_overlap;
            }
            if i + 1 < counts.at(axis) {
                *effective.at_mut(axis) -= half_overlap;
            }
        }

        Some(effective)
    }

    /// `true` iff the brick can contain `isovalue`.
    pub fn contains_isovalue(&self, key: BrickKey, isovalue: f64) -> bool {
        self.acceleration_entry(key)
            .map_or(true, |e| e.contains_isovalue(isovalue))
    }

    /// `true` iff the brick's values can overlap `[min, max]`.
    pub fn contains_range(&self, key: BrickKey, min: f64, max: f64) -> bool {
        self.acceleration_entry(key)
            .map_or(true, |e| e.overlaps_scalar_range(min, max))
    }

    /// `true` iff the brick's values can overlap `[min, max]` and its gradient magnitudes can overlap
    /// `[min_gradient, max_gradient]`.
    pub fn contains_range_and_gradient(
        &self,
        key: BrickKey,
        min: f64,
        max: f64,
        min_gradient: f64,
        max_gradient: f64,
    ) -> bool {
        self.acceleration_entry(key).map_or(true, |e| {
            e.overlaps_scalar_range(min, max) && e.overlaps_gradient_range(min_gradient, max_gradient)
        })
    }
}

fn checked_volume(shape: Point3u, element_bytes: u64) -> Option<u64> {
    (0..3).try_fold(element_bytes, |acc, axis| acc.checked_mul(shape.at(axis)))
}

/// Every brick must lie inside its level, so decoding it never allocates more than the level holds.
fn check_brick_extents(descriptor: &RasterDescriptor, level_starts: &[usize]) -> Result<()> {
    let element_bytes = descriptor.element.bytes_per_element() as u64;
    for (lod, domain) in descriptor.level_domains.iter().enumerate() {
        let end = level_starts.get(lod + 1).copied().unwrap_or(descriptor.bricks.len());
        for entry in descriptor.bricks[level_starts[lod]..end].iter() {
            let extent = entry.extent;
            let inside = (0..3).all(|axis| {
                extent
                    .minimum
                    .at(axis)
                    .checked_add(extent.shape.at(axis))
                    .map_or(false, |lub| lub <= domain.at(axis))
            });
            if !inside || checked_volume(extent.shape, element_bytes).is_none() {
                return Err(BrickError::integrity(format!(
                    "brick extent {:?} does not fit the {:?} domain of level {}",
                    extent, domain, lod
                )));
            }
        }
    }

    Ok(())
}

impl BrickLayout for MetadataView {
    fn level_count(&self) -> usize {
        self.level_domains.len()
    }

    fn domain_size(&self, lod: u8) -> Point3u {
        self.level_domains.get(lod as usize).copied().unwrap_or(Point3u::ZERO)
    }

    fn brick_count(&self, lod: u8) -> Point3u {
        self.level_brick_counts
            .get(lod as usize)
            .copied()
            .unwrap_or(Point3u::ZERO)
    }

    fn brick_extent(&self, key: BrickKey) -> Option<Extent3u> {
        self.brick_entry(key).map(|b| b.extent)
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
    use crate::{
        brick_keys, BrickCompression, ComponentSemantic, ElementType, LodPlan, OverlappedBrickLayout, ScalarRange,
    };
    use pretty_assertions::assert_eq;

    fn descriptor(domain: Point3u, brick: u64, overlap: u64) -> RasterDescriptor {
        let plan = LodPlan::for_ingestion(domain, brick).unwrap();
        let layout = OverlappedBrickLayout::for_ingestion(plan, Point3u::fill(brick), Point3u::fill(overlap)).unwrap();
        let bricks = brick_keys(&layout)
            .map(|key| BrickEntry {
                offset: 0,
                stored_len: 0,
                extent: layout.brick_extent(key).unwrap(),
            })
            .collect();

        RasterDescriptor {
            axis_semantics: vec!["X".into(), "Y".into(), "Z".into()],
            domain_size: domain.0.to_vec(),
            decimation: vec![2; 3],
            level_count: layout.level_count() as u8,
            brick_size: Point3u::fill(brick),
            overlap: Point3u::fill(overlap),
            element: ElementType::of::<u8>(1),
            component_semantics: vec![ComponentSemantic::Scalar],
            aspect: [1.0; 3],
            compression: BrickCompression::None,
            value_range: ScalarRange::Unsigned(0, 255),
            level_domains: layout.plan().level_domains().to_vec(),
            level_brick_counts: (0..layout.level_count()).map(|l| layout.brick_count(l as u8)).collect(),
            bricks,
        }
    }

    fn acceleration(n: usize) -> AccelerationIndex {
        AccelerationIndex {
            channel: 0,
            entries: (0..n)
                .map(|i| AccelerationEntry {
                    min_scalar: 10.0 * i as f64,
                    max_scalar: 10.0 * i as f64 + 5.0,
                    min_gradient: 0.0,
                    max_gradient: 1.0,
                })
                .collect(),
        }
    }

    #[test]
    fn effective_size_trims_interior_faces_only() {
        let view = MetadataView::new(&descriptor(PointN([30, 30, 1]), 12, 2), None).unwrap();
        assert_eq!(view.brick_count(0), PointN([3, 3, 1]));

        // First brick: 11 wide with one interior face on x and y.
        assert_eq!(view.brick_size(BrickKey::new(0, Point3u::ZERO)), Some(PointN([11, 11, 1])));
        assert_eq!(
            view.effective_brick_size(BrickKey::new(0, Point3u::ZERO)),
            Some(PointN([10.0, 10.0, 1.0]))
        );
        // Middle brick: 12 wide with two interior faces on x.
        assert_eq!(
            view.effective_brick_size(BrickKey::new(0, PointN([1, 2, 0]))),
            Some(PointN([10.0, 10.0, 1.0]))
        );
        assert_eq!(view.effective_brick_size(BrickKey::new(0, PointN([3, 0, 0]))), None);
    }

    #[test]
    fn effective_size_never_exceeds_brick_size() {
        let view = MetadataView::new(&descriptor(PointN([100, 37, 9]), 16, 2), None).unwrap();

        for key in brick_keys(&view) {
            let size = Point3f::from(view.brick_size(key).unwrap());
            let effective = view.effective_brick_size(key).unwrap();
            let counts = view.brick_count(key.lod);
            for axis in 0..3 {
                let interior_faces =
                    (key.index[axis] > 0) as u32 + (key.index[axis] + 1 < counts.at(axis)) as u32;
                assert!(effective.at(axis) <= size.at(axis));
                assert_eq!(size.at(axis) - effective.at(axis), interior_faces as f32);
            }
        }
    }

    #[test]
    fn predicates_assume_visible_without_acceleration_data() {
        let view = MetadataView::new(&descriptor(PointN([30, 30, 1]), 12, 2), None).unwrap();
        assert!(!view.has_acceleration_data());

        for key in brick_keys(&view) {
            assert!(view.contains_isovalue(key, 1e9));
            assert!(view.contains_range(key, -5.0, -1.0));
            assert!(view.contains_range_and_gradient(key, 1e6, 1e7, 1e6, 1e7));
        }
    }

    #[test]
    fn predicates_use_acceleration_entries() {
        let desc = descriptor(PointN([30, 1, 1]), 12, 2);
        // 3 + 2 + 1 bricks over three levels.
        assert_eq!(desc.bricks.len(), 6);
        let view = MetadataView::new(&desc, Some(&acceleration(6))).unwrap();
        let second = BrickKey::new(0, PointN([1, 0, 0]));

        assert!(view.contains_isovalue(second, 15.0));
        assert!(!view.contains_isovalue(second, 15.5));
        assert!(view.contains_range(second, 0.0, 10.0));
        assert!(!view.contains_range(second, 16.0, 19.0));
        assert!(view.contains_range_and_gradient(second, 12.0, 13.0, 0.5, 2.0));
        assert!(!view.contains_range_and_gradient(second, 12.0, 13.0, 1.5, 2.0));
    }

    #[test]
    fn misaligned_acceleration_data_is_rejected() {
        let desc = descriptor(PointN([30, 1, 1]), 12, 2);

        assert!(MetadataView::new(&desc, Some(&acceleration(2))).unwrap_err().is_integrity());
    }

    #[test]
    fn bricks_outside_their_level_are_rejected() {
        let mut raster = descriptor(PointN([30, 30, 1]), 12, 2);
        raster.bricks[1].extent.shape = PointN([u64::MAX, 1, 1]);
        assert!(MetadataView::new(&raster, None).unwrap_err().is_integrity());

        let mut raster = descriptor(PointN([30, 30, 1]), 12, 2);
        raster.level_brick_counts[0] = PointN([u64::MAX, u64::MAX, 2]);
        assert!(MetadataView::new(&raster, None).unwrap_err().is_integrity());
    }
}
