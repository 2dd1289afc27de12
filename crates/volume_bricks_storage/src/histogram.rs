//! Value and value-by-gradient histograms stored next to each timestep's bricks.

use crate::scan::bucket_of;

use serde::{Deserialize, Serialize};

pub const MAX_HISTOGRAM_1D_BINS: usize = 4096;
pub const MAX_HISTOGRAM_2D_BINS: usize = 256;

/// Distribution of stored values over `[min, max]`.
#[derive(Clone, Debug, Deserialize, PartialEq, Serialize)]
pub struct Histogram1D {
    min: f64,
    max: f64,
    bins: Vec<u64>,
}

impl Histogram1D {
    pub fn new(min: f64, max: f64, bins: usize) -> Self {
        Self {
            min,
            max,
            bins: vec![0; bins.max(1)],
        }
    }

    /// A histogram of unsigned values in `[0, max]`: one bin per value up to 4096 bins.
    pub fn for_unsigned(max: u64) -> Self {
        let bins = (max.saturating_add(1)).min(MAX_HISTOGRAM_1D_BINS as u64) as usize;

        Self::new(0.0, max as f64, bins)
    }

    /// A histogram suited to values in `[min, max]`. Integral ranges get one bin per value up to 4096 bins.
    pub fn for_range(min: f64, max: f64, integral: bool) -> Self {
        let bins = if integral {
            ((max - min) as u64).saturating_add(1).min(MAX_HISTOGRAM_1D_BINS as u64) as usize
        } else {
            MAX_HISTOGRAM_1D_BINS
        };

        Self::new(min, max, bins)
    }

    #[inline]
    pub fn bin_of(&self, value: f64) -> usize {
        bucket_of(value, self.min, self.max, self.bins.len())
    }

    #[inline]
    pub fn add(&mut self, value: f64) {
        let bin = self.bin_of(value);
        self.bins[bin] += 1;
    }

    pub fn bins(&self) -> &[u64] {
        &self.bins
    }

    pub fn range(&self) -> (f64, f64) {
        (self.min, self.max)
    }

    pub fn total(&self) -> u64 {
        self.bins.iter().sum()
    }
}

/// Joint distribution of stored values and gradient magnitudes. Counts are stored value-major.
#[derive(Clone, Debug, Deserialize, PartialEq, Serialize)]
pub struct Histogram2D {
    value_range: (f64, f64),
    max_gradient: f64,
    value_bins: usize,
    gradient_bins: usize,
    counts: Vec<u64>,
}

impl Histogram2D {
    pub fn new(value_range: (f64, f64), value_bins: usize, max_gradient: f64, gradient_bins: usize) -> Self {
        let value_bins = value_bins.max(1).min(MAX_HISTOGRAM_2D_BINS);
        let gradient_bins = gradient_bins.max(1).min(MAX_HISTOGRAM_2D_BINS);

        Self {
            value_range,
            max_gradient,
            value_bins,
            gradient_bins,
            counts: vec![0; value_bins * gradient_bins],
        }
    }

    #[inline]
    pub fn add(&mut self, value: f64, gradient: f64) {
        let v = bucket_of(value, self.value_range.0, self.value_range.1, self.value_bins);
        let g = bucket_of(gradient, 0.0, self.max_gradient, self.gradient_bins);
        self.counts[v * self.gradient_bins + g] += 1;
    }

    pub fn count(&self, value_bin: usize, gradient_bin: usize) -> u64 {
        self.counts[value_bin * self.gradient_bins + gradient_bin]
    }

    pub fn value_bins(&self) -> usize {
        self.value_bins
    }

    pub fn gradient_bins(&self) -> usize {
        self.gradient_bins
    }

    pub fn max_gradient(&self) -> f64 {
        self.max_gradient
    }

    pub fn total(&self) -> u64 {
        self.counts.iter().sum()
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

    #[test]
    fn unsigned_bins_follow_value() {
        let mut h = Histogram1D::for_unsigned(255);
        assert_eq!(h.bins().len(), 256);
        h.add(0.0);
        h.add(17.0);
        h.add(255.0);

        assert_eq!(h.bins()[0], 1);
        assert_eq!(h.bins()[17], 1);
        assert_eq!(h.bins()[255], 1);
    }

    #[test]
    fn wide_unsigned_ranges_are_capped() {
        let mut h = Histogram1D::for_unsigned(65535);
        assert_eq!(h.bins().len(), 4096);
        h.add(65535.0);
        h.add(16.0);

        assert_eq!(h.bins()[4095], 1);
        // 16 * 4095 / 65535 = 0.99...
        assert_eq!(h.bins()[0], 1);
    }

    #[test]
    fn two_dimensional_bins() {
        let mut h = Histogram2D::new((0.0, 31.0), 32, 10.0, 256);
        h.add(31.0, 10.0);
        h.add(0.0, 0.0);

        assert_eq!(h.count(31, 255), 1);
        assert_eq!(h.count(0, 0), 1);
        assert_eq!(h.total(), 2);
    }
}
