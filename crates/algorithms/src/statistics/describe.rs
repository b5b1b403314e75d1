//! Descriptive statistics of a continuous surface

use floodmap_core::raster::Raster;
use floodmap_core::{Error, Result};
use serde::Serialize;

/// Summary statistics of the valid cells of a band.
///
/// Variance and standard deviation are population moments; skewness and
/// kurtosis are the moment ratios m3/m2^1.5 and m4/m2^2 - 3 (excess).
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct DescriptiveStats {
    pub count: usize,
    pub min: f64,
    pub max: f64,
    pub mean: f64,
    pub median: f64,
    pub std_dev: f64,
    pub variance: f64,
    pub skewness: f64,
    pub kurtosis: f64,
    /// `(percentile, value)` pairs, linear interpolation between ranks
    pub percentiles: Vec<(f64, f64)>,
    pub histogram: Histogram,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Histogram {
    /// `bins + 1` edges from min to max
    pub edges: Vec<f64>,
    pub counts: Vec<usize>,
}

/// Percentiles always reported
pub const BASE_PERCENTILES: [f64; 5] = [0.0, 25.0, 50.0, 75.0, 100.0];

/// Describe the valid (finite) cells of `raster`.
pub fn describe(raster: &Raster<f64>, extra_percentiles: &[f64], bins: usize) -> Result<DescriptiveStats> {
    let mut values = raster.valid_values();
    if values.is_empty() {
        return Err(Error::Algorithm("cannot describe a band with no valid cells".into()));
    }
    if bins == 0 {
        return Err(Error::invalid_param("histogram_bins", 0, "must be >= 1"));
    }
    values.sort_by(|a, b| a.total_cmp(b));

    let n = values.len() as f64;
    let mean = values.iter().sum::<f64>() / n;
    let (m2, m3, m4) = values.iter().fold((0.0, 0.0, 0.0), |(a, b, c), v| {
        let d = v - mean;
        let d2 = d * d;
        (a + d2, b + d2 * d, c + d2 * d2)
    });
    let (m2, m3, m4) = (m2 / n, m3 / n, m4 / n);
    let (skewness, kurtosis) = if m2 > 0.0 {
        (m3 / m2.powf(1.5), m4 / (m2 * m2) - 3.0)
    } else {
        (0.0, 0.0)
    };

    let mut wanted: Vec<f64> = BASE_PERCENTILES.to_vec();
    for p in extra_percentiles {
        if !(0.0..=100.0).contains(p) {
            return Err(Error::invalid_param("extra_percentiles", p, "must be in [0, 100]"));
        }
        if !wanted.contains(p) {
            wanted.push(*p);
        }
    }
    wanted.sort_by(|a, b| a.total_cmp(b));
    let percentiles = wanted.iter().map(|p| (*p, percentile_sorted(&values, *p))).collect();

    let min = values[0];
    let max = values[values.len() - 1];

    Ok(DescriptiveStats {
        count: values.len(),
        min,
        max,
        mean,
        median: percentile_sorted(&values, 50.0),
        std_dev: m2.sqrt(),
        variance: m2,
        skewness,
        kurtosis,
        percentiles,
        histogram: histogram(&values, min, max, bins),
    })
}

/// Percentile of sorted data with linear interpolation between ranks.
pub fn percentile_sorted(sorted: &[f64], p: f64) -> f64 {
    if sorted.is_empty() {
        return f64::NAN;
    }
    let rank = p / 100.0 * (sorted.len() - 1) as f64;
    let lo = rank.floor() as usize;
    let hi = rank.ceil() as usize;
    let t = rank - lo as f64;
    sorted[lo] + (sorted[hi.min(sorted.len() - 1)] - sorted[lo]) * t
}

fn histogram(sorted: &[f64], min: f64, max: f64, bins: usize) -> Histogram {
    let width = (max - min) / bins as f64;
    let edges = (0..=bins).map(|i| min + width * i as f64).collect();
    let mut counts = vec![0usize; bins];
    for v in sorted {
        let idx = if width > 0.0 {
            (((v - min) / width) as usize).min(bins - 1)
        } else {
            0
        };
        counts[idx] += 1;
    }
    Histogram { edges, counts }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    #[test]
    fn test_describe_known_values() {
        let r = Raster::from_vec(vec![1.0, 2.0, 3.0, 4.0, f64::NAN, 5.0], 2, 3).unwrap();
        let s = describe(&r, &[90.0], 4).unwrap();
        assert_eq!(s.count, 5);
        assert_relative_eq!(s.mean, 3.0);
        assert_relative_eq!(s.median, 3.0);
        assert_relative_eq!(s.variance, 2.0);
        assert_relative_eq!(s.skewness, 0.0, epsilon = 1e-12);
        // uniform-like sample: excess kurtosis m4/m2^2 - 3 = 6.8/4 - 3
        assert_relative_eq!(s.kurtosis, -1.3, epsilon = 1e-12);
        assert_eq!(s.percentiles.len(), 6);
        assert_relative_eq!(s.percentiles[4].1, 4.6, epsilon = 1e-12);
        assert_eq!(s.histogram.counts.iter().sum::<usize>(), 5);
        assert_eq!(s.histogram.edges.len(), 5);
    }

    #[test]
    fn test_constant_band() {
        let r = Raster::filled(3, 3, 0.5);
        let s = describe(&r, &[], 10).unwrap();
        assert_eq!(s.std_dev, 0.0);
        assert_eq!(s.histogram.counts[0], 9);
    }

    #[test]
    fn test_empty_band_errors() {
        let r: Raster<f64> = Raster::filled(2, 2, f64::NAN);
        assert!(describe(&r, &[], 10).is_err());
    }
}
