//! Bricked volumes that can be read brick by brick.

use crate::{
    swap_bytes_in_place, AccelerationIndex, BlockKind, BrickCache, BrickError, BrickKey, BrickLayout, Container,
    ElementType, Histogram1D, Histogram2D, KeyValueMetadata, MetadataView, RasterDescriptor, Result, Sample,
    ScalarRange,
};

use std::path::Path;
use std::sync::{Arc, Mutex};

/// A pyramid of bricks with a single element type.
///
/// Brick payloads are row-major (X fastest) over the brick's extent, in native byte order.
pub trait BrickedVolume {
    fn layout(&self) -> &dyn BrickLayout;

    fn element_type(&self) -> ElementType;

    /// `true` iff the stored samples were written on a machine with the same byte order as this one.
    fn is_same_endianness(&self) -> bool;

    /// Range of the stored values.
    fn value_range(&self) -> ScalarRange;

    /// The payload of `key`, or `None` if the key is out of range.
    fn brick(&self, key: BrickKey) -> Result<Option<Arc<Vec<u8>>>>;

    /// Copies the payload of `key` into `out`. Returns `false` if the key is out of range.
    fn read_brick(&self, key: BrickKey, out: &mut Vec<u8>) -> Result<bool> {
        out.clear();
        match self.brick(key)? {
            Some(bytes) => {
                out.extend_from_slice(&bytes);
                Ok(true)
            }
            None => Ok(false),
        }
    }
}

/// Reads the payload of `key` as samples of type `T`, which must match the volume's element type.
pub fn read_brick_as<T: Sample>(volume: &dyn BrickedVolume, key: BrickKey, out: &mut Vec<T>) -> Result<bool> {
    let element = volume.element_type();
    if element.kind != T::KIND || element.bit_width != T::BIT_WIDTH {
        return Err(BrickError::configuration(format!(
            "cannot read {} bricks as {:?}",
            element,
            std::any::type_name::<T>()
        )));
    }

    out.clear();
    let bytes = match volume.brick(key)? {
        Some(bytes) => bytes,
        None => return Ok(false),
    };
    let whole = bytes.len() / std::mem::size_of::<T>();
    out.resize(whole, T::default());
    bytemuck::cast_slice_mut::<T, u8>(out.as_mut_slice()).copy_from_slice(&bytes[..whole * std::mem::size_of::<T>()]);

    Ok(true)
}

/// One timestep of a committed container.
pub struct ContainerDataset {
    container: Container,
    timestep: usize,
    descriptor: RasterDescriptor,
    stream_offset: u64,
    view: MetadataView,
    histogram_1d: Option<Histogram1D>,
    histogram_2d: Option<Histogram2D>,
    key_values: KeyValueMetadata,
    cache: Mutex<BrickCache<BrickKey, Arc<Vec<u8>>>>,
}

impl ContainerDataset {
    /// Opens `timestep` of the container at `path`, keeping up to `cache_capacity` decoded bricks in memory.
    pub fn open(path: impl AsRef<Path>, timestep: usize, cache_capacity: usize) -> Result<Self> {
        let container = Container::open(path)?;
        let raster = container
            .timestep_block(BlockKind::RasterData, timestep)
            .ok_or_else(|| {
                BrickError::configuration(format!(
                    "{} holds {} timesteps, cannot open timestep {}",
                    container.path().display(),
                    container.timestep_count(),
                    timestep
                ))
            })?;
        let (descriptor, stream_offset) = container.raster_descriptor(raster)?;

        let acceleration: Option<AccelerationIndex> = container
            .timestep_block(BlockKind::AccelerationIndex, timestep)
            .map(|block| container.read_block(block))
            .transpose()?;
        let view = MetadataView::new(&descriptor, acceleration.as_ref())?;

        let histogram_1d = container
            .timestep_block(BlockKind::Histogram1D, timestep)
            .map(|block| container.read_block(block))
            .transpose()?;
        let histogram_2d = container
            .timestep_block(BlockKind::Histogram2D, timestep)
            .map(|block| container.read_block(block))
            .transpose()?;
        let key_values = container
            .blocks_of_kind(BlockKind::KeyValueMetadata)
            .next()
            .map(|block| container.read_block(block))
            .transpose()?
            .unwrap_or_default();

        tracing::debug!(
            "Opened timestep {} of {}: {} levels, {} bricks",
            timestep,
            container.path().display(),
            view.level_count(),
            view.total_brick_count()
        );

        Ok(Self {
            container,
            timestep,
            descriptor,
            stream_offset,
            view,
            histogram_1d,
            histogram_2d,
            key_values,
            cache: Mutex::new(BrickCache::with_capacity(cache_capacity)),
        })
    }

    pub fn container(&self) -> &Container {
        &self.container
    }

    pub fn timestep(&self) -> usize {
        self.timestep
    }

    pub fn descriptor(&self) -> &RasterDescriptor {
        &self.descriptor
    }

    pub fn metadata(&self) -> &MetadataView {
        &self.view
    }

    pub fn histogram_1d(&self) -> Option<&Histogram1D> {
        self.histogram_1d.as_ref()
    }

    pub fn histogram_2d(&self) -> Option<&Histogram2D> {
        self.histogram_2d.as_ref()
    }

    pub fn key_values(&self) -> &KeyValueMetadata {
        &self.key_values
    }

    fn load_brick(&self, key: BrickKey) -> Result<Option<Vec<u8>>> {
        let entry = match self.view.brick_entry(key) {
            Some(entry) => *entry,
            None => return Ok(None),
        };

        let mut stored = vec![0; entry.stored_len as usize];
        self.container
            .read_at(self.stream_offset + entry.offset, &mut stored)?;
        let expected = entry.extent.num_points() * self.descriptor.element.bytes_per_element();
        let mut bytes = Vec::new();
        self.descriptor.compression.decompress(&stored, &mut bytes)?;
        if bytes.len() != expected {
            return Err(BrickError::integrity(format!(
                "brick {:?} decoded to {} bytes, expected {}",
                key,
                bytes.len(),
                expected
            )));
        }
        if !self.container.is_same_endianness() {
            swap_bytes_in_place(&mut bytes, self.descriptor.element.bytes_per_component());
        }

        Ok(Some(bytes))
    }
}

impl BrickedVolume for ContainerDataset {
    fn layout(&self) -> &dyn BrickLayout {
        &self.view
    }

    fn element_type(&self) -> ElementType {
        self.descriptor.element
    }

    fn is_same_endianness(&self) -> bool {
        self.container.is_same_endianness()
    }

    fn value_range(&self) -> ScalarRange {
        self.descriptor.value_range
    }

    fn brick(&self, key: BrickKey) -> Result<Option<Arc<Vec<u8>>>> {
        if let Some(bytes) = self
            .cache
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .get(&key)
        {
            return Ok(Some(Arc::clone(bytes)));
        }

        let bytes = match self.load_brick(key)? {
            Some(bytes) => Arc::new(bytes),
            None => return Ok(None),
        };
        self.cache
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .insert(key, Arc::clone(&bytes));

        Ok(Some(bytes))
    }
}

// ████████╗███████╗███████╗████████╗
// ╚══██╔══╝██╔════╝██╔════╝╚══██╔══╝
//    ██║   █████╗  ███████╗   ██║
//    ██║   ██╔══╝  ╚════██║   ██║
//    ██║   ███████╗███████║   ██║
//    ╚═╝   ╚══════╝╚══════╝   ╚═╝
