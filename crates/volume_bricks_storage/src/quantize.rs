//! Narrowing wide source types into the 8 or 16 bit representation bricks are stored in.

use crate::{
    match_sample_type, read_up_to, scan_file, ElementType, Histogram1D, IoContext, Progress, RangeInfo,
    RawFile, Result, Sample, ScalarKind, ScalarRange,
};

use std::io::Read;
use std::path::Path;

/// The unsigned type a rescaled stream is written as.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum QuantizeTarget {
    U8,
    U16,
}

impl QuantizeTarget {
    pub fn bit_width(&self) -> u8 {
        match self {
            QuantizeTarget::U8 => 8,
            QuantizeTarget::U16 => 16,
        }
    }

    pub fn max_value(&self) -> u64 {
        match self {
            QuantizeTarget::U8 => u8::MAX as u64,
            QuantizeTarget::U16 => u16::MAX as u64,
        }
    }
}

/// How a source type is carried into the stored representation.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum QuantizeStrategy {
    /// The samples are stored as they are. `scan` says whether the global range is still measured.
    PassThrough { scan: bool },
    /// The samples are rescaled over their global range into `target`.
    Rescale(QuantizeTarget),
}

/// Picks the strategy for `element`.
///
/// | source                       | default             | `force_8bit`       |
/// |------------------------------|---------------------|--------------------|
/// | 8 bit unsigned, 4 components | pass through, no scan | pass through, no scan |
/// | other 8 bit                  | pass through        | rescale to `u8`    |
/// | 16, 32 or 64 bit             | rescale to `u16`    | rescale to `u8`    |
pub fn select_strategy(element: ElementType, force_8bit: bool) -> QuantizeStrategy {
    let is_color = element.bit_width == 8 && element.kind == ScalarKind::Unsigned && element.components == 4;
    if is_color {
        return QuantizeStrategy::PassThrough { scan: false };
    }
    match (element.bit_width, force_8bit) {
        (8, false) => QuantizeStrategy::PassThrough { scan: true },
        (_, true) => QuantizeStrategy::Rescale(QuantizeTarget::U8),
        (_, false) => QuantizeStrategy::Rescale(QuantizeTarget::U16),
    }
}

/// Maps source values onto the target type, either unchanged or linearly over `[min, max]`.
#[derive(Clone, Copy, Debug, PartialEq)]
pub enum QuantizeMapping {
    Identity,
    Linear { min: f64, max: f64, out_max: f64 },
}

impl QuantizeMapping {
    /// Integer data that already fits the target keeps its values. Everything else is rescaled.
    pub fn for_range(range: ScalarRange, target: QuantizeTarget) -> Self {
        if range.fits_unsigned(target.bit_width()) {
            QuantizeMapping::Identity
        } else {
            QuantizeMapping::Linear {
                min: range.min_f64(),
                max: range.max_f64(),
                out_max: target.max_value() as f64,
            }
        }
    }

    #[inline]
    pub fn apply(&self, value: f64) -> f64 {
        match *self {
            QuantizeMapping::Identity => value,
            QuantizeMapping::Linear { min, max, out_max } => {
                if max <= min {
                    0.0
                } else {
                    ((value - min) / (max - min) * out_max).round().max(0.0).min(out_max)
                }
            }
        }
    }

    /// The range of the mapped values.
    pub fn output_range(&self, range: ScalarRange) -> ScalarRange {
        ScalarRange::Unsigned(self.apply(range.min_f64()) as u64, self.apply(range.max_f64()) as u64)
    }
}

/// What the quantizer did to a stream.
#[derive(Clone, Debug, PartialEq)]
pub struct QuantizeOutcome {
    /// The element type of the stored stream.
    pub element: ElementType,
    /// Range of the stored values.
    pub value_range: ScalarRange,
    /// Range of the source, if it was scanned.
    pub source_range: Option<RangeInfo>,
    /// Distribution of the stored values, for rescaled streams.
    pub histogram: Option<Histogram1D>,
    /// `true` iff a new stream was written.
    pub rewritten: bool,
}

/// Runs `strategy` over the raw file at `input`, reading at most `byte_limit` bytes past the header when given. Rescaled
/// samples are written to `output`.
pub fn quantize_file(
    input: &Path,
    header_skip: u64,
    byte_limit: Option<u64>,
    element: ElementType,
    strategy: QuantizeStrategy,
    output: &Path,
    incore_bytes: usize,
    mut on_progress: impl FnMut(&'static str, u64) -> Progress,
) -> Result<QuantizeOutcome> {
    let file_bytes = RawFile::open(input, header_skip)?.size()?;
    let total_bytes = byte_limit.map_or(file_bytes, |limit| limit.min(file_bytes));

    let target = match strategy {
        QuantizeStrategy::PassThrough { scan: false } => {
            tracing::info!("Skipping range analysis of {} color data", element);
            return Ok(QuantizeOutcome {
                element,
                value_range: ScalarRange::Unsigned(0, u8::MAX as u64),
                source_range: None,
                histogram: None,
                rewritten: false,
            });
        }
        QuantizeStrategy::PassThrough { scan: true } => {
            let mut progress = on_progress("Computing value range", total_bytes);
            let scan = scan_file(input, header_skip, byte_limit, element, incore_bytes, &mut progress)?;
            return Ok(QuantizeOutcome {
                element,
                value_range: scan.info.range,
                source_range: Some(scan.info),
                histogram: None,
                rewritten: false,
            });
        }
        QuantizeStrategy::Rescale(target) => target,
    };

    let mut progress = on_progress("Computing value range", total_bytes);
    let scan = scan_file(input, header_skip, byte_limit, element, incore_bytes, &mut progress)?;
    let mapping = QuantizeMapping::for_range(scan.info.range, target);
    tracing::info!(
        "Quantizing {} to {} bits with {:?}",
        element,
        target.bit_width(),
        mapping
    );

    let mut progress = on_progress("Quantizing", total_bytes);
    let histogram = match_sample_type!(element, T => {
        match target {
            QuantizeTarget::U8 => rescale_file::<T, u8>(input, header_skip, total_bytes, output, mapping, incore_bytes, &mut progress),
            QuantizeTarget::U16 => rescale_file::<T, u16>(input, header_skip, total_bytes, output, mapping, incore_bytes, &mut progress),
        }
    })?;

    Ok(QuantizeOutcome {
        element: element.with_scalar(target.bit_width(), ScalarKind::Unsigned),
        value_range: mapping.output_range(scan.info.range),
        source_range: Some(scan.info),
        histogram: Some(histogram),
        rewritten: true,
    })
}

fn rescale_file<S: Sample, D: Sample>(
    input: &Path,
    header_skip: u64,
    byte_limit: u64,
    output: &Path,
    mapping: QuantizeMapping,
    incore_bytes: usize,
    progress: &mut Progress,
) -> Result<Histogram1D> {
    let mut src = RawFile::open(input, header_skip)?.take(byte_limit);
    let mut dst = RawFile::create(output)?;

    let out_max = (1u64 << D::BIT_WIDTH) - 1;
    let mut histogram = Histogram1D::for_unsigned(out_max);

    let samples_per_chunk = (incore_bytes / std::mem::size_of::<S>()).max(1);
    let mut src_buf = vec![S::default(); samples_per_chunk];
    let mut dst_buf = vec![D::default(); samples_per_chunk];
    loop {
        let n = read_up_to(&mut src, bytemuck::cast_slice_mut(&mut src_buf))
            .io_context(|| format!("reading {}", input.display()))?;
        let whole = n / std::mem::size_of::<S>();
        if whole == 0 {
            break;
        }
        for (s, d) in src_buf[..whole].iter().zip(dst_buf.iter_mut()) {
            *d = D::from_f64(mapping.apply(s.to_f64()));
            histogram.add(d.to_f64());
        }
        dst.write_chunk(bytemuck::cast_slice(&dst_buf[..whole]))?;
        progress.advance(n as u64);
        if whole < samples_per_chunk {
            break;
        }
    }
    progress.finish();
    dst.close()?;

    Ok(histogram)
}

// ████████╗███████╗███████╗████████╗
// ╚══██╔══╝██╔════╝██╔════╝╚══██╔══╝
//    ██║   █████╗  ███████╗   ██║
//    ██║   ██╔══╝  ╚════██║   ██║
//    ██║   ███████╗███████║   ██║
//    ╚═╝   ╚══════╝╚══════╝   ╚═╝
