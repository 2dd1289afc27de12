use rand::distributions::{Distribution, Standard};
use rand::{rngs::StdRng, SeedableRng};
use volume_bricks_core::prelude::*;

/// An 8×8×1 volume whose sample `i` (X fastest) is `i % 32`.
pub fn ramp_8x8() -> Vec<u16> {
    (0..64u16).map(|i| i % 32).collect()
}

/// `n` uniformly distributed samples. The same `seed` always gives the same samples.
pub fn random_samples<T>(seed: u64, n: usize) -> Vec<T>
where
    Standard: Distribution<T>,
{
    let mut rng = StdRng::seed_from_u64(seed);

    Standard.sample_iter(&mut rng).take(n).collect()
}

/// A cube of `edge_length` voxels holding a solid sphere: `inner_value` within the sphere's radius of the center, otherwise
/// `outer_value`. Returns the samples (X fastest) and the radius.
pub fn sphere_volume<T: Copy>(edge_length: u64, inner_value: T, outer_value: T) -> (Vec<T>, f32) {
    let extent = Extent3u::from_min_and_shape(Point3u::ZERO, Point3u::fill(edge_length));
    let center = edge_length as f32 / 2.0;
    let radius = center - 1.0;

    let samples = extent
        .iter_points()
        .map(|p| {
            let d = Point3f::from(p) - Point3f::fill(center);
            let norm = (d.x() * d.x() + d.y() * d.y() + d.z() * d.z()).sqrt();
            if norm < radius {
                inner_value
            } else {
                outer_value
            }
        })
        .collect();

    (samples, radius)
}
