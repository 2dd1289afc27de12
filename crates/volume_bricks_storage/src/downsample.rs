//! Deriving coarser levels from finer ones.

use crate::{ElementType, Progress, RawFile, Result, Sample};

use core::ops::Range;
use volume_bricks_core::prelude::*;

/// Relates a level to the next finer level: which fine voxels each coarse voxel summarizes.
///
/// On an axis with fine size `S` and coarse size `T`, coarse voxel `t` covers fine voxels `[t·S/T, max(t·S/T + 1, (t+1)·S/T))`.
/// For the usual `S = 2T` that is a 2 voxel box; axes already clamped to 1 map one to one.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub struct LevelFootprint {
    pub fine_domain: Point3u,
    pub coarse_domain: Point3u,
}

impl LevelFootprint {
    pub fn new(fine_domain: Point3u, coarse_domain: Point3u) -> Self {
        Self {
            fine_domain,
            coarse_domain,
        }
    }

    #[inline]
    pub fn axis_range(&self, axis: usize, t: u64) -> Range<u64> {
        let s = self.fine_domain.at(axis);
        let c = self.coarse_domain.at(axis);
        let start = t * s / c;
        let end = ((t + 1) * s / c).max(start + 1);

        start..end
    }

    /// The fine voxels averaged into coarse voxel `p`.
    #[inline]
    pub fn footprint(&self, p: Point3u) -> Extent3u {
        let r = [
            self.axis_range(0, p.x()),
            self.axis_range(1, p.y()),
            self.axis_range(2, p.z()),
        ];

        Extent3u::from_min_and_lub(
            PointN([r[0].start, r[1].start, r[2].start]),
            PointN([r[0].end, r[1].end, r[2].end]),
        )
    }

    /// The fine voxels needed to compute every coarse voxel of `coarse`.
    pub fn footprint_of_extent(&self, coarse: &Extent3u) -> Extent3u {
        if coarse.is_empty() {
            return Extent3u::from_min_and_shape(Point3u::ZERO, Point3u::ZERO);
        }
        let first = self.footprint(coarse.minimum);
        let last = self.footprint(coarse.least_upper_bound() - Point3u::ONES);

        Extent3u::from_min_and_lub(first.minimum, last.least_upper_bound())
    }
}

/// Computes coarse voxels from the fine voxels they cover.
pub trait Downsampler {
    /// Writes every voxel of `dst_extent` (coarse level coordinates) into `dst`, reading from `src`, which holds the fine
    /// voxels of `src_extent`. Both arrays are row-major with `components` interleaved values per voxel, and `src_extent` must
    /// contain the footprint of `dst_extent`.
    fn downsample<T: Sample>(
        &self,
        footprint: &LevelFootprint,
        src: &[T],
        src_extent: &Extent3u,
        dst: &mut [T],
        dst_extent: &Extent3u,
        components: usize,
    );
}

/// Every coarse value is the unweighted mean of the fine values it covers, per component. Integer means round to nearest.
#[derive(Clone, Copy, Debug, Default)]
pub struct BoxFilterDownsampler;

impl Downsampler for BoxFilterDownsampler {
    fn downsample<T: Sample>(
        &self,
        footprint: &LevelFootprint,
        src: &[T],
        src_extent: &Extent3u,
        dst: &mut [T],
        dst_extent: &Extent3u,
        components: usize,
    ) {
        let mut sums = vec![0.0f64; components];
        for (i, p) in dst_extent.iter_points().enumerate() {
            let fp = footprint.footprint(p);
            for s in sums.iter_mut() {
                *s = 0.0;
            }
            for q in fp.iter_points() {
                let base = src_extent.linear_offset(q) * components;
                for (c, s) in sums.iter_mut().enumerate() {
                    *s += src[base + c].to_f64();
                }
            }
            let n = fp.volume() as f64;
            for (c, s) in sums.iter().enumerate() {
                dst[i * components + c] = T::from_f64(s / n);
            }
        }
    }
}

/// Streams a flat level into the flat file of the next coarser level, one coarse row at a time.
///
/// Only the fine rows under one coarse row are ever resident.
pub fn downsample_flat_level<T: Sample, D: Downsampler>(
    downsampler: &D,
    src: &mut RawFile,
    src_offset: u64,
    dst: &mut RawFile,
    footprint: &LevelFootprint,
    element: ElementType,
    progress: &mut Progress,
) -> Result<()> {
    let components = element.components as usize;
    let element_bytes = element.bytes_per_element() as u64;
    let fine = footprint.fine_domain;
    let coarse = footprint.coarse_domain;
    let fine_extent = Extent3u::from_min_and_shape(Point3u::ZERO, fine);

    let mut dst_row = vec![T::default(); coarse.x() as usize * components];
    let mut src_rows: Vec<T> = Vec::new();
    for z in 0..coarse.z() {
        for y in 0..coarse.y() {
            let dst_extent = Extent3u::from_min_and_shape(PointN([0, y, z]), PointN([coarse.x(), 1, 1]));
            let src_extent = footprint.footprint_of_extent(&dst_extent);

            src_rows.clear();
            src_rows.resize(src_extent.num_points() * components, T::default());
            let row_values = fine.x() as usize * components;
            let rows_per_slice = src_extent.shape.y() as usize;
            for (slice_i, fz) in src_extent.axis_range(2).enumerate() {
                // The rows of one slice are contiguous in the flat file.
                let first = fine_extent.linear_offset(PointN([0, src_extent.minimum.y(), fz])) as u64;
                let start = slice_i * rows_per_slice * row_values;
                let slab = &mut src_rows[start..start + rows_per_slice * row_values];
                src.read_at(src_offset + first * element_bytes, bytemuck::cast_slice_mut(slab))?;
            }

            downsampler.downsample(footprint, &src_rows, &src_extent, &mut dst_row, &dst_extent, components);
            dst.write_chunk(bytemuck::cast_slice(&dst_row))?;
        }
        progress.advance(1);
    }

    Ok(())
}

// ████████╗███████╗███████╗████████╗
// ╚══██╔══╝██╔════╝██╔════╝╚══██╔══╝
//    ██║   █████╗  ███████╗   ██║
//    ██║   ██╔══╝  ╚════██║   ██║
//    ██║   ███████╗███████║   ██║
//    ╚═╝   ╚══════╝╚══════╝   ╚═╝
