//! Streaming min/max and histogram analysis of raw samples.

use crate::{
    match_sample_type, read_up_to, BrickError, ElementType, IoContext, Progress, RawFile, Result,
    Sample, ScalarRange,
};

use serde::{Deserialize, Serialize};
use std::io::Read;
use std::path::Path;

/// Buckets of the scan histogram (12 bits of resolution).
pub const SCAN_HISTOGRAM_BUCKETS: usize = 4096;

/// Global range of a stream, together with the type it was measured on.
#[derive(Clone, Copy, Debug, Deserialize, PartialEq, Serialize)]
pub struct RangeInfo {
    pub element: ElementType,
    pub range: ScalarRange,
}

impl RangeInfo {
    pub fn min(&self) -> f64 {
        self.range.min_f64()
    }

    pub fn max(&self) -> f64 {
        self.range.max_f64()
    }
}

/// Everything one scanning pass produces.
#[derive(Clone, Debug, PartialEq)]
pub struct ScanResult {
    pub info: RangeInfo,
    pub histogram: Vec<u64>,
    pub samples: u64,
}

/// Accumulates the exact min and max of a sample stream and a 4096 bucket histogram.
///
/// Without a known range, each sample is bucketed relative to the range seen so far. NaNs are not counted.
#[derive(Clone, Debug)]
pub struct RangeScanner<T> {
    min: Option<T>,
    max: Option<T>,
    known_range: Option<(f64, f64)>,
    histogram: Vec<u64>,
    samples: u64,
}

impl<T: Sample> Default for RangeScanner<T> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T: Sample> RangeScanner<T> {
    pub fn new() -> Self {
        Self {
            min: None,
            max: None,
            known_range: None,
            histogram: vec![0; SCAN_HISTOGRAM_BUCKETS],
            samples: 0,
        }
    }

    /// Buckets every sample against `[min, max]` instead of the running range.
    pub fn with_known_range(min: f64, max: f64) -> Self {
        Self {
            known_range: Some((min, max)),
            ..Self::new()
        }
    }

    #[inline]
    pub fn push(&mut self, value: T) {
        if value.is_nan() {
            return;
        }
        self.samples += 1;

        match (self.min, self.max) {
            (Some(min), Some(max)) => {
                if value < min {
                    self.min = Some(value);
                }
                if value > max {
                    self.max = Some(value);
                }
            }
            _ => {
                self.min = Some(value);
                self.max = Some(value);
            }
        }

        let (lo, hi) = match (self.known_range, self.min, self.max) {
            (Some(range), _, _) => range,
            (None, Some(min), Some(max)) => (min.to_f64(), max.to_f64()),
            _ => return,
        };
        let bucket = bucket_of(value.to_f64(), lo, hi, SCAN_HISTOGRAM_BUCKETS);
        self.histogram[bucket] += 1;
    }

    pub fn push_slice(&mut self, values: &[T]) {
        for &v in values {
            self.push(v);
        }
    }

    /// The exact range so far, or `None` if nothing was pushed.
    pub fn range(&self) -> Option<ScalarRange> {
        match (self.min, self.max) {
            (Some(min), Some(max)) => Some(T::range(min, max)),
            _ => None,
        }
    }

    pub fn histogram(&self) -> &[u64] {
        &self.histogram
    }

    pub fn samples(&self) -> u64 {
        self.samples
    }
}

/// Maps `value` from `[lo, hi]` onto `[0, buckets - 1]`. A degenerate range puts everything in bucket 0.
#[inline]
pub fn bucket_of(value: f64, lo: f64, hi: f64, buckets: usize) -> usize {
    if hi <= lo {
        return 0;
    }
    let scaled = (value - lo) * (buckets - 1) as f64 / (hi - lo);

    (scaled.max(0.0) as usize).min(buckets - 1)
}

/// Scans every sample `reader` yields, in chunks of at most `incore_bytes`.
pub fn scan_reader<T: Sample>(
    reader: &mut impl Read,
    components: u8,
    incore_bytes: usize,
    progress: &mut Progress,
) -> Result<ScanResult> {
    let sample_bytes = std::mem::size_of::<T>();
    let mut buf = vec![T::default(); (incore_bytes / sample_bytes).max(1)];
    let mut scanner = RangeScanner::<T>::new();
    let mut trailing = 0;
    loop {
        let bytes: &mut [u8] = bytemuck::cast_slice_mut(&mut buf);
        let n = read_up_to(reader, bytes).io_context(|| "scanning samples".to_string())?;
        if n == 0 {
            break;
        }
        let whole = n / sample_bytes;
        trailing = n % sample_bytes;
        scanner.push_slice(&buf[..whole]);
        progress.advance(n as u64);
        if n < bytes_len(&buf) {
            break;
        }
    }
    if trailing != 0 {
        tracing::warn!("Ignoring {} trailing bytes that do not form a whole sample", trailing);
    }
    progress.finish();

    let range = scanner
        .range()
        .ok_or_else(|| BrickError::configuration("cannot analyze an empty sample stream"))?;

    Ok(ScanResult {
        info: RangeInfo {
            element: ElementType::of::<T>(components),
            range,
        },
        histogram: scanner.histogram,
        samples: scanner.samples,
    })
}

fn bytes_len<T>(buf: &[T]) -> usize {
    buf.len() * std::mem::size_of::<T>()
}

/// Scans a raw file of `element` samples. With a `byte_limit`, bytes past that many are not read.
pub fn scan_file(
    path: &Path,
    header_skip: u64,
    byte_limit: Option<u64>,
    element: ElementType,
    incore_bytes: usize,
    progress: &mut Progress,
) -> Result<ScanResult> {
    let mut file = RawFile::open(path, header_skip)?.take(byte_limit.unwrap_or(u64::MAX));

    match_sample_type!(element, T => scan_reader::<T>(&mut file, element.components, incore_bytes, progress))
}

/// Determines the global range of a raw file without converting it.
pub fn analyze_range(
    path: &Path,
    header_skip: u64,
    element: ElementType,
    incore_bytes: usize,
) -> Result<RangeInfo> {
    let size = RawFile::open(path, header_skip)?.size()?;
    let mut progress = Progress::silent("Analyzing range", size);
    let result = scan_file(path, header_skip, None, element, incore_bytes, &mut progress)?;
    tracing::info!(
        "Range of {}: [{}, {}] over {} samples",
        path.display(),
        result.info.min(),
        result.info.max(),
        result.samples
    );

    Ok(result.info)
}

// ████████╗███████╗███████╗████████╗
// ╚══██╔══╝██╔════╝██╔════╝╚══██╔══╝
//    ██║   █████╗  ███████╗   ██║
//    ██║   ██╔══╝  ╚════██║   ██║
//    ██║   ███████╗███████║   ██║
//    ╚═╝   ╚══════╝╚══════╝   ╚═╝
