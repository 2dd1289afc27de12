//! Converting flat raw sample files into a bricked container.
//!
//! The pipeline runs, in order: source preparation (decompression and concatenation), endianness conversion, quantization,
//! pyramid planning, then bricking and block writing once per timestep. Each stage reads the file produced by the previous one
//! and hands its own output on as a `TempFile`, so every intermediate file is deleted as soon as the next stage is done with it.

use crate::{
    brick_timestep, component_semantics, copy_bounded, normalize_endianness, quantize_file, select_strategy,
    BlockKind, BrickCompression, BrickError, BrickLayout, BrickingOptions, ByteOrder, ChecksumAlgorithm,
    ComponentSemantic, ContainerWriter, ElementType, Histogram1D, IoContext, KeyValueMetadata, LodPlan,
    OverlappedBrickLayout, Progress, ProgressCallback, RasterDescriptor, RawFile, Result, ScalarRange, TempFile,
};

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use volume_bricks_core::prelude::*;

/// How source files are packed.
#[derive(Clone, Copy, Debug, Deserialize, Eq, PartialEq, Serialize)]
pub enum SourceCompression {
    None,
    /// LZ4 frames. Requires the "lz4" feature.
    Lz4Frame,
}

impl Default for SourceCompression {
    fn default() -> Self {
        SourceCompression::None
    }
}

/// Everything `ingest` needs to know about the sources and the container to build.
#[derive(Clone, Debug, Deserialize, PartialEq, Serialize)]
#[serde(default)]
pub struct IngestConfig {
    /// Where intermediate files go.
    pub temp_dir: PathBuf,
    /// Bits per component: 8, 16, 32 or 64.
    pub component_bits: u8,
    pub components: u8,
    pub signed: bool,
    pub is_float: bool,
    /// Number of volumes stored back to back in the sources.
    pub timesteps: u64,
    /// Swap the byte order of the sources.
    pub convert_endianness: bool,
    pub domain_size: [u64; 3],
    /// Physical size of one voxel.
    pub aspect: [f32; 3],
    /// Brick edge length, halo included.
    pub brick_size: u64,
    pub brick_overlap: u64,
    /// Rescale everything wider than 8 bits to 8 bits.
    pub quantize_to_8bit: bool,
    /// Bytes ignored at the start of every source file.
    pub header_skip: u64,
    pub source_compression: SourceCompression,
    pub description: String,
    /// Recorded as "Data Source". Defaults to the source file names.
    pub source_label: String,
    /// Meaning of the components of 1 and 2 component data.
    pub semantic: ComponentSemantic,
    /// Appended to the key/value metadata block.
    pub key_values: Vec<(String, String)>,
    pub acceleration: bool,
    pub compression: BrickCompression,
    pub checksum: ChecksumAlgorithm,
    /// Upper bound on the buffers of every streaming stage.
    pub incore_bytes: usize,
}

impl Default for IngestConfig {
    fn default() -> Self {
        Self {
            temp_dir: std::env::temp_dir(),
            component_bits: 8,
            components: 1,
            signed: false,
            is_float: false,
            timesteps: 1,
            convert_endianness: false,
            domain_size: [0; 3],
            aspect: [1.0; 3],
            brick_size: 64,
            brick_overlap: 2,
            quantize_to_8bit: false,
            header_skip: 0,
            source_compression: SourceCompression::None,
            description: String::new(),
            source_label: String::new(),
            semantic: ComponentSemantic::Scalar,
            key_values: Vec::new(),
            acceleration: true,
            compression: BrickCompression::None,
            checksum: ChecksumAlgorithm::Md5,
            incore_bytes: 64 << 20,
        }
    }
}

impl IngestConfig {
    /// Checks everything that can be checked without touching a file. Returns the source element type.
    pub fn validate(&self) -> Result<ElementType> {
        let element = ElementType::from_flags(self.component_bits, self.components, self.signed, self.is_float)?;
        if self.domain_size.iter().any(|&d| d == 0) {
            return Err(BrickError::configuration(format!(
                "every domain axis must be positive, got {:?}",
                self.domain_size
            )));
        }
        if self.timesteps == 0 {
            return Err(BrickError::configuration("at least one timestep is required"));
        }
        if self.brick_size <= self.brick_overlap {
            return Err(BrickError::configuration(format!(
                "brick size {} must exceed the overlap {}",
                self.brick_size, self.brick_overlap
            )));
        }
        if self.incore_bytes < element.bytes_per_element() {
            return Err(BrickError::configuration(format!(
                "an in-core buffer of {} bytes cannot hold one element",
                self.incore_bytes
            )));
        }
        if self.aspect.iter().any(|a| !(a.is_finite() && *a > 0.0)) {
            return Err(BrickError::configuration(format!(
                "aspect ratio {:?} must be positive",
                self.aspect
            )));
        }
        self.brick_bytes(element)?;
        self.source_bytes(element)?;
        self.compression.validate()?;
        if self.source_compression == SourceCompression::Lz4Frame && cfg!(not(feature = "lz4")) {
            return Err(BrickError::configuration(
                "LZ4 framed sources require the \"lz4\" feature",
            ));
        }

        Ok(element)
    }

    pub fn domain(&self) -> Point3u {
        PointN(self.domain_size)
    }

    /// Bytes in one full brick of `element` samples.
    pub fn brick_bytes(&self, element: ElementType) -> Result<u64> {
        self.brick_size
            .checked_pow(3)
            .and_then(|voxels| voxels.checked_mul(element.bytes_per_element() as u64))
            .ok_or_else(|| BrickError::configuration(format!("brick size {} is too large", self.brick_size)))
    }

    /// Bytes of `element` samples in all timesteps of the domain.
    pub fn source_bytes(&self, element: ElementType) -> Result<u64> {
        self.domain_size
            .iter()
            .try_fold(element.bytes_per_element() as u64, |acc, &d| acc.checked_mul(d))
            .and_then(|timestep| timestep.checked_mul(self.timesteps))
            .ok_or_else(|| {
                BrickError::configuration(format!(
                    "{} timesteps of {:?} voxels are too large",
                    self.timesteps, self.domain_size
                ))
            })
    }
}

/// What `ingest` produced.
#[derive(Clone, Debug, PartialEq)]
pub struct IngestSummary {
    pub level_count: usize,
    pub bricks_per_timestep: u64,
    pub timesteps: u64,
    /// The element type of the stored bricks.
    pub element: ElementType,
    /// Range of the stored values.
    pub value_range: ScalarRange,
    /// `true` iff the samples were rescaled.
    pub quantized: bool,
}

/// The file the next stage reads, and what is known about its contents so far.
struct PipelineState {
    element: ElementType,
    path: PathBuf,
    header_skip: u64,
    /// Owns `path` once a stage has rewritten the source.
    working: Option<TempFile>,
    value_range: Option<ScalarRange>,
    histogram_1d: Option<Histogram1D>,
    quantized: bool,
}

impl PipelineState {
    fn new(source: &Path, header_skip: u64, element: ElementType) -> Self {
        Self {
            element,
            path: source.to_path_buf(),
            header_skip,
            working: None,
            value_range: None,
            histogram_1d: None,
            quantized: false,
        }
    }

    /// Makes `output` the input of the next stage. The previous working file is deleted.
    fn advance(&mut self, output: TempFile) {
        self.path = output.path().to_path_buf();
        self.header_skip = 0;
        self.working = Some(output);
    }

    fn open(&self) -> Result<RawFile> {
        RawFile::open(&self.path, self.header_skip)
    }
}

/// Converts `sources` into a container at `target`.
pub fn ingest(sources: &[PathBuf], target: &Path, config: &IngestConfig) -> Result<IngestSummary> {
    ingest_with_progress(sources, target, config, None)
}

/// Like [`ingest`], also reporting the progress of every stage to `progress`.
pub fn ingest_with_progress(
    sources: &[PathBuf],
    target: &Path,
    config: &IngestConfig,
    progress: Option<ProgressCallback>,
) -> Result<IngestSummary> {
    let span = tracing::info_span!("ingest", target = %target.display());
    let _enter = span.enter();

    let source_element = config.validate()?;
    if sources.is_empty() {
        return Err(BrickError::configuration("no source files given"));
    }
    std::fs::create_dir_all(&config.temp_dir)
        .io_context(|| format!("creating {}", config.temp_dir.display()))?;
    let new_progress = |stage: &'static str, total: u64| Progress::new(stage, total, progress.clone());

    let mut state = prepare_sources(sources, config, source_element)?;
    let expected_bytes = check_source_size(&state, config)?;

    if config.convert_endianness {
        let output = TempFile::new_in(&config.temp_dir, "endian");
        let brick_bytes = config.brick_bytes(source_element)?;
        let total = state.open()?.size()?;
        let converted = normalize_endianness(
            &state.path,
            state.header_skip,
            state.element,
            output.path(),
            brick_bytes,
            &mut new_progress("Converting endianness", total),
        )?;
        if converted {
            state.advance(output);
        }
    }

    let strategy = select_strategy(state.element, config.quantize_to_8bit);
    let output = TempFile::new_in(&config.temp_dir, "quantized");
    let outcome = quantize_file(
        &state.path,
        state.header_skip,
        Some(expected_bytes),
        state.element,
        strategy,
        output.path(),
        config.incore_bytes,
        new_progress,
    )?;
    if outcome.rewritten {
        state.advance(output);
    }
    state.element = outcome.element;
    state.value_range = Some(outcome.value_range);
    // Color data gets no histograms.
    let histograms = state.element.components != 4;
    state.histogram_1d = outcome.histogram.filter(|_| histograms);
    state.quantized = outcome.rewritten;

    let plan = LodPlan::for_ingestion(config.domain(), config.brick_size)?;
    let layout = OverlappedBrickLayout::for_ingestion(
        plan,
        Point3u::fill(config.brick_size),
        Point3u::fill(config.brick_overlap),
    )?;
    tracing::info!(
        "Bricking {:?} into {} levels of {} voxel bricks",
        config.domain_size,
        layout.level_count(),
        config.brick_size
    );

    let mut writer = ContainerWriter::create(target, config.checksum)?;
    let value_range = state.value_range.unwrap_or(ScalarRange::Unsigned(0, 0));
    let source = state.open()?;
    let timestep_bytes = config.domain().volume() * state.element.bytes_per_element() as u64;
    let options = BrickingOptions {
        compression: config.compression,
        histogram_1d: histograms && state.histogram_1d.is_none(),
        histogram_2d: histograms,
        progress: progress.clone(),
    };
    for timestep in 0..config.timesteps {
        let span = tracing::info_span!("timestep", ts = timestep);
        let _enter = span.enter();

        let bricked = brick_timestep(
            &source,
            timestep * timestep_bytes,
            &layout,
            state.element,
            &options,
            &config.temp_dir,
        )?;
        let descriptor = raster_descriptor(config, &layout, state.element, value_range, bricked.table.clone());
        let mut bricks = RawFile::open(bricked.bricks.path(), 0)?;
        writer.append_raster(
            &format!("Raster Volume {}", timestep),
            &descriptor,
            &mut bricks,
            config.incore_bytes,
        )?;

        if config.acceleration {
            tracing::info!("Storing acceleration data");
            writer.append_serialized(
                BlockKind::AccelerationIndex,
                &format!("Acceleration Data {}", timestep),
                &bricked.acceleration,
            )?;
        }
        if let Some(histogram) = state.histogram_1d.as_ref().or_else(|| bricked.histogram_1d.as_ref()) {
            writer.append_serialized(BlockKind::Histogram1D, &format!("1D Histogram {}", timestep), histogram)?;
        }
        if let Some(histogram) = bricked.histogram_2d.as_ref() {
            writer.append_serialized(BlockKind::Histogram2D, &format!("2D Histogram {}", timestep), histogram)?;
        }
    }

    let key_values = key_value_metadata(sources, config, source_element);
    writer.append_serialized(BlockKind::KeyValueMetadata, "Metadata", &key_values)?;
    writer.close()?;

    Ok(IngestSummary {
        level_count: layout.level_count(),
        bricks_per_timestep: layout.total_brick_count(),
        timesteps: config.timesteps,
        element: state.element,
        value_range,
        quantized: state.quantized,
    })
}

/// Decompresses the sources if needed and concatenates them into one flat file.
fn prepare_sources(sources: &[PathBuf], config: &IngestConfig, element: ElementType) -> Result<PipelineState> {
    let mut flat = Vec::with_capacity(sources.len());
    for source in sources {
        flat.push(match config.source_compression {
            SourceCompression::None => (None, source.clone(), config.header_skip),
            SourceCompression::Lz4Frame => {
                let output = TempFile::new_in(&config.temp_dir, "decompressed");
                decompress_lz4(source, config.header_skip, output.path())?;
                let path = output.path().to_path_buf();
                (Some(output), path, 0)
            }
        });
    }

    if flat.len() == 1 {
        if let Some((temp, path, header_skip)) = flat.pop() {
            let mut state = PipelineState::new(&path, header_skip, element);
            state.working = temp;
            return Ok(state);
        }
    }

    tracing::info!("Merging {} source files", flat.len());
    let merged = TempFile::new_in(&config.temp_dir, "merged");
    let mut out = RawFile::create(merged.path())?;
    for (_temp, path, header_skip) in flat.iter() {
        let mut src = RawFile::open(path, *header_skip)?;
        copy_bounded(&mut src, &mut out, config.incore_bytes)
            .io_context(|| format!("appending {} to {}", path.display(), merged.path().display()))?;
    }
    out.close()?;

    let mut state = PipelineState::new(merged.path(), 0, element);
    state.working = Some(merged);

    Ok(state)
}

#[cfg(feature = "lz4")]
fn decompress_lz4(input: &Path, header_skip: u64, output: &Path) -> Result<()> {
    use crate::SourceDecompressor;

    crate::Lz4FrameDecompressor.decompress(input, header_skip, output)
}

#[cfg(not(feature = "lz4"))]
fn decompress_lz4(input: &Path, _header_skip: u64, _output: &Path) -> Result<()> {
    Err(BrickError::configuration(format!(
        "cannot decompress {} without the \"lz4\" feature",
        input.display()
    )))
}

/// Returns the bytes the configured timesteps occupy. Bytes past them are ignored by every stage.
fn check_source_size(state: &PipelineState, config: &IngestConfig) -> Result<u64> {
    let element = state.element;
    let expected = config.source_bytes(element)?;
    let actual = state.open()?.size()?;
    if actual < expected {
        return Err(BrickError::configuration(format!(
            "sources hold {} bytes, {} timesteps of {:?} {} voxels need {}",
            actual, config.timesteps, config.domain_size, element, expected
        )));
    }
    if actual > expected {
        tracing::warn!("Ignoring {} bytes past the last timestep", actual - expected);
    }

    Ok(expected)
}

fn raster_descriptor(
    config: &IngestConfig,
    layout: &OverlappedBrickLayout,
    element: ElementType,
    value_range: ScalarRange,
    bricks: Vec<crate::BrickEntry>,
) -> RasterDescriptor {
    RasterDescriptor {
        axis_semantics: vec!["X".into(), "Y".into(), "Z".into()],
        domain_size: config.domain_size.to_vec(),
        decimation: vec![2; 3],
        level_count: layout.level_count() as u8,
        brick_size: Point3u::fill(config.brick_size),
        overlap: Point3u::fill(config.brick_overlap),
        element,
        component_semantics: component_semantics(element.components, config.semantic),
        aspect: config.aspect,
        compression: config.compression,
        value_range,
        level_domains: layout.plan().level_domains().to_vec(),
        level_brick_counts: (0..layout.level_count())
            .map(|lod| layout.brick_count(lod as u8))
            .collect(),
        bricks,
    }
}

fn key_value_metadata(sources: &[PathBuf], config: &IngestConfig, source_element: ElementType) -> KeyValueMetadata {
    let mut metadata = KeyValueMetadata::default();
    let data_source = if config.source_label.is_empty() {
        sources
            .iter()
            .map(|s| {
                s.file_name()
                    .map(|n| n.to_string_lossy().into_owned())
                    .unwrap_or_else(|| s.display().to_string())
            })
            .collect::<Vec<_>>()
            .join(", ")
    } else {
        config.source_label.clone()
    };
    metadata.push("Data Source", data_source);
    if !config.description.is_empty() {
        metadata.push("Description", config.description.clone());
    }
    let source_order = if config.convert_endianness {
        ByteOrder::NATIVE.opposite()
    } else {
        ByteOrder::NATIVE
    };
    metadata.push("Source Endianness", source_order.name());
    metadata.push("Source Type", source_element.type_name());
    metadata.push("Source Bitwidth", source_element.bit_width.to_string());
    for (key, value) in config.key_values.iter() {
        metadata.push(key.clone(), value.clone());
    }

    metadata
}

// ████████╗███████╗███████╗████████╗
// ╚══██╔══╝██╔════╝██╔════╝╚══██╔══╝
//    ██║   █████╗  ███████╗   ██║
//    ██║   ██╔══╝  ╚════██║   ██║
//    ██║   ███████╗███████║   ██║
//    ╚═╝   ╚══════╝╚══════╝   ╚═╝
