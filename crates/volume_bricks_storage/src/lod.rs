use crate::{BrickError, Result};

use volume_bricks_core::prelude::*;
use volume_bricks_core::{div_ceil, halve_clamped};

/// Coarsening stops once the largest axis fits in a brick of this size, or in the target brick if that is smaller.
pub const MIN_BRICK_THRESHOLD: u64 = 64;

/// The domain size of every resolution level of a pyramid. Level 0 is the source volume.
///
/// Every level halves all axes of the previous level at once, so small axes can reach 1 well before the largest one. Axes
/// never drop below 1.
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct LodPlan {
    level_domains: Vec<Point3u>,
}

impl LodPlan {
    /// Plans the pyramid built during ingestion. Levels are added while the largest axis of the previous level exceeds
    /// `min(64, target_brick_size)`.
    pub fn for_ingestion(domain: Point3u, target_brick_size: u64) -> Result<Self> {
        check_domain(domain)?;
        if target_brick_size == 0 {
            return Err(BrickError::configuration("the target brick size must be positive"));
        }

        let threshold = MIN_BRICK_THRESHOLD.min(target_brick_size);
        let mut largest = domain.max_component();
        let mut levels = 1;
        while largest > threshold {
            largest /= 2;
            levels += 1;
        }

        Ok(Self::with_level_count(domain, levels))
    }

    /// Plans a pyramid that keeps halving until a single brick with `inner` voxels per axis covers the whole level.
    pub fn until_single_brick(domain: Point3u, inner: Point3u) -> Result<Self> {
        check_domain(domain)?;
        if inner.0.iter().any(|&n| n == 0) {
            return Err(BrickError::configuration("brick sizes must be positive on every axis"));
        }

        let mut level_domains = vec![domain];
        loop {
            let last = level_domains.len() - 1;
            let counts = level_domains[last].zip_components(&inner, div_ceil);
            if counts == Point3u::ONES {
                break;
            }
            let next = level_domains.len() as u32;
            level_domains.push(domain.map_components(|d| halve_clamped(d, next)));
        }

        Ok(Self { level_domains })
    }

    fn with_level_count(domain: Point3u, levels: usize) -> Self {
        let level_domains = (0..levels)
            .map(|level| {
                let shifted = domain.right_shift(level as u32);
                if shifted.0.iter().any(|&d| d == 0) {
                    tracing::debug!("Clamping axes of level {} domain {:?} to 1", level, shifted.0);
                }

                domain.map_components(|d| halve_clamped(d, level as u32))
            })
            .collect();

        Self { level_domains }
    }

    pub fn level_count(&self) -> usize {
        self.level_domains.len()
    }

    /// The domain of `level`, or `None` beyond the coarsest level.
    pub fn domain_size(&self, level: usize) -> Option<Point3u> {
        self.level_domains.get(level).copied()
    }

    pub fn level_domains(&self) -> &[Point3u] {
        &self.level_domains
    }
}

fn check_domain(domain: Point3u) -> Result<()> {
    if domain.0.iter().any(|&d| d == 0) {
        return Err(BrickError::configuration(format!(
            "every domain axis must be positive, got {:?}",
            domain.0
        )));
    }

    Ok(())
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

    #[test]
    fn small_volume_has_one_level() {
        let plan = LodPlan::for_ingestion(PointN([8, 8, 1]), 16).unwrap();

        assert_eq!(plan.level_count(), 1);
        assert_eq!(plan.domain_size(0), Some(PointN([8, 8, 1])));
    }

    #[test]
    fn halving_follows_largest_axis() {
        let plan = LodPlan::for_ingestion(PointN([512, 100, 3]), 256).unwrap();

        // 512 -> 256 -> 128 -> 64
        assert_eq!(plan.level_count(), 4);
        assert_eq!(
            plan.level_domains(),
            &[
                PointN([512, 100, 3]),
                PointN([256, 50, 1]),
                PointN([128, 25, 1]),
                PointN([64, 12, 1]),
            ]
        );
    }

    #[test]
    fn small_target_bricks_lower_the_threshold() {
        let plan = LodPlan::for_ingestion(PointN([64, 64, 64]), 16).unwrap();

        // 64 -> 32 -> 16
        assert_eq!(plan.level_count(), 3);
    }

    #[test]
    fn single_brick_ladder() {
        let plan = LodPlan::until_single_brick(PointN([8, 8, 1]), PointN([4, 8, 1])).unwrap();
        assert_eq!(plan.level_domains(), &[PointN([8, 8, 1]), PointN([4, 4, 1])]);

        let plan = LodPlan::until_single_brick(PointN([8, 8, 1]), PointN([8, 8, 8])).unwrap();
        assert_eq!(plan.level_count(), 1);
    }

    #[test]
    fn zero_sizes_are_configuration_errors() {
        assert!(LodPlan::for_ingestion(PointN([0, 4, 4]), 16).unwrap_err().is_configuration());
        assert!(LodPlan::for_ingestion(PointN([4, 4, 4]), 0).unwrap_err().is_configuration());
        assert!(LodPlan::until_single_brick(PointN([4, 4, 4]), PointN([0, 4, 4]))
            .unwrap_err()
            .is_configuration());
    }
}
