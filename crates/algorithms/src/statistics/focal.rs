//! Focal (moving window) statistics
//!
//! Mean and median over continuous bands, mode (majority) over categorical
//! ones. NaN neighbors are skipped; a NaN center stays NaN so the layer's
//! mask is preserved.

use crate::maybe_rayon::*;
use floodmap_core::raster::{offset_cell, Neighborhood, Raster, RasterElement};
use floodmap_core::{Algorithm, Error, Result};
use ndarray::Array2;

/// Available focal statistics
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FocalStatistic {
    Mean,
    Median,
    /// Most frequent value; ties go to the smallest value
    Mode,
}

/// Parameters for focal statistics
#[derive(Debug, Clone)]
pub struct FocalParams {
    pub neighborhood: Neighborhood,
    pub statistic: FocalStatistic,
}

impl Default for FocalParams {
    fn default() -> Self {
        Self {
            neighborhood: Neighborhood::Square(1),
            statistic: FocalStatistic::Mean,
        }
    }
}

/// Focal statistics algorithm
#[derive(Debug, Clone, Default)]
pub struct Focal;

impl Algorithm for Focal {
    type Input = Raster<f64>;
    type Output = Raster<f64>;
    type Params = FocalParams;
    type Error = Error;

    fn name(&self) -> &'static str {
        "Focal Statistics"
    }

    fn description(&self) -> &'static str {
        "Moving-window mean, median or mode"
    }

    fn execute(&self, input: Self::Input, params: Self::Params) -> Result<Self::Output> {
        focal_statistics(&input, params)
    }
}

/// Compute focal statistics on a raster
pub fn focal_statistics(raster: &Raster<f64>, params: FocalParams) -> Result<Raster<f64>> {
    if params.neighborhood.radius() == 0 {
        return Err(Error::invalid_param("smoothing_radius_px", 0, "focal radius must be > 0"));
    }

    let (rows, cols) = raster.shape();
    let nodata = raster.nodata();
    let offsets = params.neighborhood.offsets();

    let output_data: Vec<f64> = (0..rows)
        .into_par_iter()
        .flat_map(|row| {
            let mut row_data = vec![f64::NAN; cols];
            let mut values: Vec<f64> = Vec::with_capacity(offsets.len());

            for (col, out) in row_data.iter_mut().enumerate() {
                let center = unsafe { raster.get_unchecked(row, col) };
                if center.is_nodata(nodata) {
                    continue;
                }

                values.clear();
                for &(dr, dc) in &offsets {
                    if let Some((r, c)) = offset_cell(row, col, dr, dc, rows, cols) {
                        let v = unsafe { raster.get_unchecked(r, c) };
                        if !v.is_nodata(nodata) {
                            values.push(v);
                        }
                    }
                }

                *out = compute_statistic(&mut values, params.statistic);
            }

            row_data
        })
        .collect();

    let mut output = raster.with_same_meta::<f64>(rows, cols);
    output.set_nodata(Some(f64::NAN));
    *output.data_mut() = Array2::from_shape_vec((rows, cols), output_data)
        .map_err(|e| Error::Other(e.to_string()))?;

    Ok(output)
}

/// Majority filter over a categorical raster. No-data cells keep their value
/// and the output carries the input's no-data tag; no-data neighbours are
/// read as 0.
pub fn focal_mode(raster: &Raster<u8>, neighborhood: Neighborhood) -> Result<Raster<u8>> {
    if neighborhood.radius() == 0 {
        return Err(Error::invalid_param("smoothing_radius_px", 0, "focal radius must be > 0"));
    }
    let (rows, cols) = raster.shape();
    let nodata = raster.nodata();
    let offsets = neighborhood.offsets();

    let output_data: Vec<u8> = (0..rows)
        .into_par_iter()
        .flat_map(|row| {
            let mut row_data = vec![0u8; cols];
            for (col, out) in row_data.iter_mut().enumerate() {
                let center = unsafe { raster.get_unchecked(row, col) };
                if center.is_nodata(nodata) {
                    *out = center;
                    continue;
                }
                let mut counts = [0u32; 256];
                for &(dr, dc) in &offsets {
                    if let Some((r, c)) = offset_cell(row, col, dr, dc, rows, cols) {
                        let v = unsafe { raster.get_unchecked(r, c) };
                        let v = if v.is_nodata(nodata) { 0 } else { v };
                        counts[v as usize] += 1;
                    }
                }
                // max_by_key keeps the last maximum; scan in reverse for the smallest
                *out = (0..=255u8)
                    .rev()
                    .max_by_key(|v| counts[*v as usize])
                    .unwrap_or(0);
            }
            row_data
        })
        .collect();

    let mut output = raster.with_same_meta::<u8>(rows, cols);
    output.set_nodata(nodata);
    *output.data_mut() = Array2::from_shape_vec((rows, cols), output_data)
        .map_err(|e| Error::Other(e.to_string()))?;
    Ok(output)
}

/// Square-window mean of a continuous band.
pub fn focal_mean(raster: &Raster<f64>, radius: usize) -> Result<Raster<f64>> {
    focal_statistics(
        raster,
        FocalParams {
            neighborhood: Neighborhood::Square(radius),
            statistic: FocalStatistic::Mean,
        },
    )
}

pub(crate) fn compute_statistic(values: &mut [f64], stat: FocalStatistic) -> f64 {
    if values.is_empty() {
        return f64::NAN;
    }
    let n = values.len() as f64;

    match stat {
        FocalStatistic::Mean => values.iter().sum::<f64>() / n,
        FocalStatistic::Median => median_in_place(values),
        FocalStatistic::Mode => {
            values.sort_by(|a, b| a.total_cmp(b));
            let mut best = values[0];
            let mut best_run = 0usize;
            let mut i = 0;
            while i < values.len() {
                let mut j = i;
                while j < values.len() && values[j] == values[i] {
                    j += 1;
                }
                if j - i > best_run {
                    best_run = j - i;
                    best = values[i];
                }
                i = j;
            }
            best
        }
    }
}

/// Median, averaging the two middle values for even counts.
pub(crate) fn median_in_place(values: &mut [f64]) -> f64 {
    if values.is_empty() {
        return f64::NAN;
    }
    let mid = values.len() / 2;
    let (_, upper, _) = values.select_nth_unstable_by(mid, |a, b| a.total_cmp(b));
    let upper = *upper;
    if values.len() % 2 == 0 {
        let lower = values[..mid].iter().copied().fold(f64::NEG_INFINITY, f64::max);
        (lower + upper) / 2.0
    } else {
        upper
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use floodmap_core::GeoTransform;

    fn gradient_raster(size: usize) -> Raster<f64> {
        let mut r = Raster::new(size, size);
        r.set_transform(GeoTransform::new(0.0, size as f64, 1.0, -1.0));
        for row in 0..size {
            for col in 0..size {
                r.set(row, col, (row * size + col) as f64).unwrap();
            }
        }
        r
    }

    #[test]
    fn test_focal_mean_uniform() {
        let r = Raster::filled(10, 10, 5.0);
        let result = focal_mean(&r, 1).unwrap();
        assert!((result.get(5, 5).unwrap() - 5.0).abs() < 1e-10);
        assert!((result.get(0, 0).unwrap() - 5.0).abs() < 1e-10);
    }

    #[test]
    fn test_focal_median() {
        let r = gradient_raster(10);
        let result = focal_statistics(&r, FocalParams {
            neighborhood: Neighborhood::Square(1),
            statistic: FocalStatistic::Median,
        })
        .unwrap();
        assert!((result.get(5, 5).unwrap() - 55.0).abs() < 1e-10);
    }

    #[test]
    fn test_nan_center_preserved() {
        let mut r = Raster::filled(5, 5, 1.0);
        r.set(2, 2, f64::NAN).unwrap();
        let result = focal_mean(&r, 1).unwrap();
        assert!(result.get(2, 2).unwrap().is_nan());
        assert_eq!(result.get(2, 3).unwrap(), 1.0);
    }

    #[test]
    fn test_mode_removes_salt_and_pepper() {
        let mut r: Raster<u8> = Raster::filled(5, 5, 0);
        r.set(2, 2, 1).unwrap();
        for c in 0..5 {
            r.set(4, c, 1).unwrap();
            r.set(3, c, 1).unwrap();
        }
        let out = focal_mode(&r, Neighborhood::Square(1)).unwrap();
        assert_eq!(out.get(2, 2).unwrap(), 0, "isolated pixel removed");
        assert_eq!(out.get(4, 2).unwrap(), 1, "solid band kept");
    }

    #[test]
    fn test_mode_tie_and_nodata() {
        let mut r: Raster<u8> = Raster::from_vec(vec![1, 255, 1, 255], 1, 4).unwrap();
        r.set_nodata(Some(255));
        let out = focal_mode(&r, Neighborhood::Square(1)).unwrap();
        // window at col 0: {1, 0} tie -> 0
        assert_eq!(out.get(0, 0).unwrap(), 0);
        // window at col 2: {0, 1, 0}
        assert_eq!(out.get(0, 2).unwrap(), 0);
    }

    #[test]
    fn test_mode_keeps_nodata_cells() {
        let mut r: Raster<u8> = Raster::from_vec(vec![1, 1, 1, 1, 255, 1, 1, 1, 1], 3, 3).unwrap();
        r.set_nodata(Some(255));
        let out = focal_mode(&r, Neighborhood::Square(1)).unwrap();
        assert_eq!(out.nodata(), Some(255));
        assert_eq!(out.get(1, 1).unwrap(), 255);
        assert_eq!(out.get(0, 0).unwrap(), 1);
        assert_eq!(out.get(2, 2).unwrap(), 1);

        let mut strip: Raster<u8> = Raster::from_vec(vec![1, 255, 1, 255], 1, 4).unwrap();
        strip.set_nodata(Some(255));
        let out = focal_mode(&strip, Neighborhood::Square(1)).unwrap();
        assert_eq!(out.get(0, 1).unwrap(), 255);
        assert_eq!(out.get(0, 3).unwrap(), 255);
    }

    #[test]
    fn test_median_even() {
        let mut v = vec![4.0, 1.0, 3.0, 2.0];
        assert_eq!(median_in_place(&mut v), 2.5);
        let mut v = vec![f64::NAN; 0];
        assert!(median_in_place(&mut v).is_nan());
    }

    #[test]
    fn test_radius_zero_error() {
        let r = Raster::filled(5, 5, 1.0);
        assert!(focal_mean(&r, 0).is_err());
    }
}
