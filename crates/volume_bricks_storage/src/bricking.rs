//! Cutting a flat volume into the overlapping bricks of every level of its pyramid.
//!
//! Level 0 is read straight from the flat source. Every coarser level is first box filtered into a temporary flat file, then
//! bricked the same way. Bricks are written in address order (level, then z, then y, then x) and the acceleration entries are
//! folded in the same order, so entry `i` always describes brick `i`.

use crate::{
    acceleration_channel, brick_keys, gradient_magnitude, level_brick_keys, match_sample_type, AccelerationEntry,
    AccelerationIndex, BoxFilterDownsampler, BrickCompression, BrickEntry, BrickError, BrickLayout, ElementType,
    Histogram1D, Histogram2D, LevelFootprint, OverlappedBrickLayout, Progress, ProgressCallback, RawFile, Result,
    Sample, TempFile, MAX_COMPONENTS, MAX_HISTOGRAM_2D_BINS,
};

use std::path::Path;
use volume_bricks_core::prelude::*;

/// What to produce besides the bricks themselves.
#[derive(Clone, Default)]
pub struct BrickingOptions {
    pub compression: BrickCompression,
    /// Compute a value histogram from level 0.
    pub histogram_1d: bool,
    /// Compute a value by gradient magnitude histogram from level 0.
    pub histogram_2d: bool,
    pub progress: Option<ProgressCallback>,
}

/// The bricks of one timestep, ready to be appended to a container.
#[derive(Debug)]
pub struct BrickedTimestep {
    /// The brick stream, in address order.
    pub bricks: TempFile,
    pub table: Vec<BrickEntry>,
    pub acceleration: AccelerationIndex,
    pub histogram_1d: Option<Histogram1D>,
    pub histogram_2d: Option<Histogram2D>,
}

impl BrickedTimestep {
    pub fn stream_len(&self) -> u64 {
        self.table.iter().map(|b| b.stored_len).sum()
    }
}

/// Bricks the flat volume that starts `source_offset` bytes into `source` (after its header).
///
/// Any failure leaves nothing behind: the temporary files created here are deleted when their guards drop.
pub fn brick_timestep(
    source: &RawFile,
    source_offset: u64,
    layout: &OverlappedBrickLayout,
    element: ElementType,
    options: &BrickingOptions,
    temp_dir: &Path,
) -> Result<BrickedTimestep> {
    if element.components == 0 || element.components > MAX_COMPONENTS {
        return Err(BrickError::configuration(format!(
            "cannot brick {} components per voxel",
            element.components
        )));
    }
    options.compression.validate()?;

    let bricks = TempFile::new_in(temp_dir, "bricks");
    let (table, acceleration) = match_sample_type!(element, T => {
        brick_levels::<T>(source, source_offset, layout, element, options, temp_dir, bricks.path())
    })?;
    verify_bricks(layout, &table, &acceleration, bricks.path())?;

    let (histogram_1d, histogram_2d) = if element.components == 4 || !(options.histogram_1d || options.histogram_2d) {
        (None, None)
    } else {
        match_sample_type!(element, T => {
            level0_histograms::<T>(source, source_offset, layout, element, &acceleration, options)
        })?
    };

    Ok(BrickedTimestep {
        bricks,
        table,
        acceleration,
        histogram_1d,
        histogram_2d,
    })
}

fn brick_levels<T: Sample>(
    source: &RawFile,
    source_offset: u64,
    layout: &OverlappedBrickLayout,
    element: ElementType,
    options: &BrickingOptions,
    temp_dir: &Path,
    bricks_path: &Path,
) -> Result<(Vec<BrickEntry>, AccelerationIndex)> {
    let components = element.components as usize;
    let channel = acceleration_channel(element.components);
    let mut out = RawFile::create(bricks_path)?;
    let mut table = Vec::with_capacity(layout.total_brick_count() as usize);
    let mut acceleration = AccelerationIndex {
        channel,
        entries: Vec::with_capacity(table.capacity()),
    };
    let mut progress = Progress::new("Bricking", layout.total_brick_count(), options.progress.clone());

    // The flat file of the level being bricked. Level 0 is the source itself.
    let mut level_temp: Option<TempFile> = None;
    let mut level_file = RawFile::open(source.path(), source.header_skip())?;
    let mut level_offset = source_offset;

    let mut samples: Vec<T> = Vec::new();
    let mut stored = Vec::new();
    let mut stream_offset = 0;
    for lod in 0..layout.level_count() {
        let lod = lod as u8;
        let domain = layout.domain_size(lod);
        tracing::debug!(
            "Level {}: domain {:?}, {:?} bricks",
            lod,
            domain.0,
            layout.brick_count(lod).0
        );

        for key in level_brick_keys(layout, lod) {
            let extent = layout
                .brick_extent(key)
                .ok_or_else(|| BrickError::integrity(format!("no extent for brick {:?}", key)))?;
            read_region(&mut level_file, level_offset, domain, &extent, components, &mut samples)?;

            acceleration
                .entries
                .push(AccelerationEntry::from_brick(&samples, extent.shape, components, channel));

            stored.clear();
            options.compression.compress(bytemuck::cast_slice(&samples), &mut stored)?;
            out.write_chunk(&stored)?;
            table.push(BrickEntry {
                offset: stream_offset,
                stored_len: stored.len() as u64,
                extent,
            });
            stream_offset += stored.len() as u64;
            progress.advance(1);
        }

        let next = lod as usize + 1;
        if next < layout.level_count() {
            let coarse_domain = layout.domain_size(next as u8);
            let footprint = LevelFootprint::new(domain, coarse_domain);
            let coarse_temp = TempFile::new_in(temp_dir, "level");
            let mut coarse_file = RawFile::create(coarse_temp.path())?;
            let mut downsample_progress = Progress::new("Downsampling", coarse_domain.z(), options.progress.clone());
            crate::downsample_flat_level::<T, _>(
                &BoxFilterDownsampler,
                &mut level_file,
                level_offset,
                &mut coarse_file,
                &footprint,
                element,
                &mut downsample_progress,
            )?;
            coarse_file.close()?;

            // The finer level's temporary file is no longer needed once the coarser one exists.
            level_file = RawFile::open(coarse_temp.path(), 0)?;
            level_temp = Some(coarse_temp);
            level_offset = 0;
        }
    }
    drop(level_temp);
    progress.finish();
    out.close()?;

    Ok((table, acceleration))
}

/// Reads the voxels of `extent` from a flat level of size `domain` that starts at `offset`. `buf` is resized to fit.
pub fn read_region<T: Sample>(
    file: &mut RawFile,
    offset: u64,
    domain: Point3u,
    extent: &Extent3u,
    components: usize,
    buf: &mut Vec<T>,
) -> Result<()> {
    let level_extent = Extent3u::from_min_and_shape(Point3u::ZERO, domain);
    if !extent.is_subset_of(&level_extent) {
        return Err(BrickError::integrity(format!(
            "region {:?} lies outside the level domain {:?}",
            extent, domain.0
        )));
    }
    let element_bytes = (components * std::mem::size_of::<T>()) as u64;
    let row_values = extent.shape.x() as usize * components;

    buf.clear();
    buf.resize(extent.num_points() * components, T::default());
    let mut rows = buf.chunks_exact_mut(row_values.max(1));
    for z in extent.axis_range(2) {
        for y in extent.axis_range(1) {
            let first = level_extent.linear_offset(PointN([extent.minimum.x(), y, z])) as u64;
            if let Some(row) = rows.next() {
                file.read_at(offset + first * element_bytes, bytemuck::cast_slice_mut(row))?;
            }
        }
    }

    Ok(())
}

fn verify_bricks(
    layout: &OverlappedBrickLayout,
    table: &[BrickEntry],
    acceleration: &AccelerationIndex,
    bricks_path: &Path,
) -> Result<()> {
    let expected = layout.total_brick_count() as usize;
    if table.len() != expected || acceleration.entries.len() != expected {
        return Err(BrickError::integrity(format!(
            "produced {} bricks and {} acceleration entries, expected {}",
            table.len(),
            acceleration.entries.len(),
            expected
        )));
    }
    for (key, entry) in brick_keys(layout).zip(table) {
        if layout.brick_extent(key) != Some(entry.extent) {
            return Err(BrickError::integrity(format!("brick {:?} has the wrong extent", key)));
        }
    }

    let stream_len: u64 = table.iter().map(|b| b.stored_len).sum();
    let on_disk = RawFile::open(bricks_path, 0)?.size()?;
    if on_disk != stream_len {
        return Err(BrickError::integrity(format!(
            "brick stream holds {} bytes, expected {}",
            on_disk, stream_len
        )));
    }

    Ok(())
}

/// Histograms over the level 0 voxels, each counted once: halo voxels belong to the neighbor that owns them.
fn level0_histograms<T: Sample>(
    source: &RawFile,
    source_offset: u64,
    layout: &OverlappedBrickLayout,
    element: ElementType,
    acceleration: &AccelerationIndex,
    options: &BrickingOptions,
) -> Result<(Option<Histogram1D>, Option<Histogram2D>)> {
    let level0 = layout.brick_count(0).volume() as usize;
    let entries = &acceleration.entries[..level0.min(acceleration.entries.len())];
    let min = entries.iter().map(|e| e.min_scalar).fold(f64::INFINITY, f64::min);
    let max = entries.iter().map(|e| e.max_scalar).fold(f64::NEG_INFINITY, f64::max);
    let max_gradient = entries.iter().map(|e| e.max_gradient).fold(0.0, f64::max);
    if !(min.is_finite() && max.is_finite()) {
        tracing::warn!("Level 0 holds no finite values, skipping histograms");
        return Ok((None, None));
    }

    let integral = !element.is_float();
    let mut histogram_1d = if options.histogram_1d {
        Some(Histogram1D::for_range(min, max, integral))
    } else {
        None
    };
    let mut histogram_2d = if options.histogram_2d {
        let value_bins = if integral {
            ((max - min) as usize).saturating_add(1).min(MAX_HISTOGRAM_2D_BINS)
        } else {
            MAX_HISTOGRAM_2D_BINS
        };
        Some(Histogram2D::new((min, max), value_bins, max_gradient, MAX_HISTOGRAM_2D_BINS))
    } else {
        None
    };
    tracing::info!("Computing histograms");

    let components = element.components as usize;
    let channel = acceleration.channel;
    let domain = layout.domain_size(0);
    let mut file = RawFile::open(source.path(), source.header_skip())?;
    let mut samples: Vec<T> = Vec::new();
    for key in level_brick_keys(layout, 0) {
        let (extent, inner) = match (layout.brick_extent(key), layout.inner_extent(key)) {
            (Some(extent), Some(inner)) => (extent, inner),
            _ => return Err(BrickError::integrity(format!("no extent for brick {:?}", key))),
        };
        read_region(&mut file, source_offset, domain, &extent, components, &mut samples)?;

        let local = Extent3u::from_min_and_shape(Point3u::ZERO, extent.shape);
        let value = |p: Point3u| samples[local.linear_offset(p) * components + channel].to_f64();
        for p in inner.iter_points() {
            let p = p - extent.minimum;
            let v = value(p);
            if v.is_nan() {
                continue;
            }
            if let Some(h) = histogram_1d.as_mut() {
                h.add(v);
            }
            if let Some(h) = histogram_2d.as_mut() {
                h.add(v, gradient_magnitude(&value, p, extent.shape));
            }
        }
    }

    Ok((histogram_1d, histogram_2d))
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
    use crate::LodPlan;
    use pretty_assertions::assert_eq;

    fn write_source(dir: &Path, values: &[u16]) -> RawFile {
        let path = dir.join("source.raw");
        std::fs::write(&path, bytemuck::cast_slice(values)).unwrap();

        RawFile::open(&path, 0).unwrap()
    }

    fn read_stream(bricked: &BrickedTimestep) -> Vec<u8> {
        std::fs::read(bricked.bricks.path()).unwrap()
    }

    #[test]
    fn small_volume_is_one_brick_matching_the_source() {
        let dir = tempfile::tempdir().unwrap();
        let values: Vec<u16> = (0..64).map(|i| i % 32).collect();
        let source = write_source(dir.path(), &values);
        let domain = PointN([8, 8, 1]);
        let plan = LodPlan::for_ingestion(domain, 16).unwrap();
        let layout = OverlappedBrickLayout::for_ingestion(plan, Point3u::fill(16), Point3u::fill(2)).unwrap();

        let bricked = brick_timestep(
            &source,
            0,
            &layout,
            ElementType::of::<u16>(1),
            &BrickingOptions::default(),
            dir.path(),
        )
        .unwrap();

        assert_eq!(bricked.table.len(), 1);
        assert_eq!(read_stream(&bricked), bytemuck::cast_slice::<u16, u8>(&values).to_vec());
        let entry = bricked.acceleration.entries[0];
        assert_eq!((entry.min_scalar, entry.max_scalar), (0.0, 31.0));
    }

    #[test]
    fn coarser_levels_are_box_filtered() {
        let dir = tempfile::tempdir().unwrap();
        // 4x1x1 volume, bricks of 2 without overlap so every level is bricked.
        let values: Vec<u16> = vec![0, 2, 4, 8];
        let source = write_source(dir.path(), &values);
        let plan = LodPlan::for_ingestion(PointN([4, 1, 1]), 2).unwrap();
        assert_eq!(plan.level_count(), 2);
        let layout = OverlappedBrickLayout::for_ingestion(plan, PointN([2, 1, 1]), Point3u::ZERO).unwrap();

        let bricked = brick_timestep(
            &source,
            0,
            &layout,
            ElementType::of::<u16>(1),
            &BrickingOptions::default(),
            dir.path(),
        )
        .unwrap();

        // Level 0 has two bricks, level 1 one brick of the means 1 and 6.
        assert_eq!(bricked.table.len(), 3);
        let stream = read_stream(&bricked);
        let coarse: &[u16] = bytemuck::cast_slice(&stream[8..12]);
        assert_eq!(coarse, &[1, 6]);
        assert_eq!(bricked.table[2].offset, 8);
        assert_eq!(bricked.acceleration.entries.len(), 3);
        assert_eq!(bricked.acceleration.entries[1].max_scalar, 8.0);
    }

    #[test]
    fn overlapping_bricks_share_their_halo() {
        let dir = tempfile::tempdir().unwrap();
        let values: Vec<u16> = (0..30).collect();
        let source = write_source(dir.path(), &values);
        let plan = LodPlan::for_ingestion(PointN([30, 1, 1]), 64).unwrap();
        let layout = OverlappedBrickLayout::for_ingestion(plan, PointN([12, 1, 1]), PointN([2, 0, 0])).unwrap();

        let bricked = brick_timestep(
            &source,
            0,
            &layout,
            ElementType::of::<u16>(1),
            &BrickingOptions::default(),
            dir.path(),
        )
        .unwrap();

        let stream = read_stream(&bricked);
        let second = &bricked.table[1];
        let start = second.offset as usize;
        let brick: &[u16] = bytemuck::cast_slice(&stream[start..start + second.stored_len as usize]);
        assert_eq!(brick.first(), Some(&9));
        assert_eq!(brick.last(), Some(&20));
    }

    #[test]
    fn histograms_count_each_voxel_once() {
        let dir = tempfile::tempdir().unwrap();
        let values: Vec<u16> = (0..30).collect();
        let source = write_source(dir.path(), &values);
        let plan = LodPlan::for_ingestion(PointN([30, 1, 1]), 64).unwrap();
        let layout = OverlappedBrickLayout::for_ingestion(plan, PointN([12, 1, 1]), PointN([2, 0, 0])).unwrap();
        let options = BrickingOptions {
            histogram_1d: true,
            histogram_2d: true,
            ..Default::default()
        };

        let bricked = brick_timestep(&source, 0, &layout, ElementType::of::<u16>(1), &options, dir.path()).unwrap();

        let h1 = bricked.histogram_1d.unwrap();
        assert_eq!(h1.total(), 30);
        assert!(h1.bins().iter().all(|&c| c == 1));
        let h2 = bricked.histogram_2d.unwrap();
        assert_eq!(h2.total(), 30);
        assert_eq!(h2.max_gradient(), 1.0);
    }

    #[test]
    fn color_data_has_no_histograms() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("rgba.raw");
        std::fs::write(&path, vec![7u8; 4 * 4]).unwrap();
        let source = RawFile::open(&path, 0).unwrap();
        let plan = LodPlan::for_ingestion(PointN([2, 2, 1]), 16).unwrap();
        let layout = OverlappedBrickLayout::for_ingestion(plan, Point3u::fill(16), Point3u::fill(2)).unwrap();
        let options = BrickingOptions {
            histogram_1d: true,
            histogram_2d: true,
            ..Default::default()
        };

        let bricked = brick_timestep(&source, 0, &layout, ElementType::of::<u8>(4), &options, dir.path()).unwrap();

        assert!(bricked.histogram_1d.is_none());
        assert!(bricked.histogram_2d.is_none());
        assert_eq!(bricked.acceleration.channel, 3);
    }

    #[test]
    fn short_source_is_an_io_error() {
        let dir = tempfile::tempdir().unwrap();
        let source = write_source(dir.path(), &[1, 2, 3]);
        let plan = LodPlan::for_ingestion(PointN([8, 8, 1]), 16).unwrap();
        let layout = OverlappedBrickLayout::for_ingestion(plan, Point3u::fill(16), Point3u::fill(2)).unwrap();

        let err = brick_timestep(
            &source,
            0,
            &layout,
            ElementType::of::<u16>(1),
            &BrickingOptions::default(),
            dir.path(),
        )
        .unwrap_err();

        assert!(err.is_io());
        // Only the source is left.
        assert_eq!(std::fs::read_dir(dir.path()).unwrap().count(), 1);
    }
}
