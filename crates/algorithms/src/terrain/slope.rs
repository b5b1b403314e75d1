//! Slope calculation from DEMs
//!
//! Rate of change of elevation using the Horn (1981) 3x3 method, in degrees.
//! Missing neighbors (grid edge or NaN) take the center cell's elevation, so
//! every valid DEM cell gets a slope and only NaN cells stay NaN.

use crate::maybe_rayon::*;
use floodmap_core::raster::Raster;
use floodmap_core::{Algorithm, Error, Result};
use ndarray::Array2;

/// Parameters for slope calculation
#[derive(Debug, Clone)]
pub struct SlopeParams {
    /// Multiplier converting horizontal units to elevation units
    pub z_factor: f64,
}

impl Default for SlopeParams {
    fn default() -> Self {
        Self { z_factor: 1.0 }
    }
}

/// Slope algorithm
#[derive(Debug, Clone, Default)]
pub struct Slope;

impl Algorithm for Slope {
    type Input = Raster<f64>;
    type Output = Raster<f64>;
    type Params = SlopeParams;
    type Error = Error;

    fn name(&self) -> &'static str {
        "Slope"
    }

    fn description(&self) -> &'static str {
        "Slope in degrees from a DEM using Horn's method"
    }

    fn execute(&self, input: Self::Input, params: Self::Params) -> Result<Self::Output> {
        slope(&input, params)
    }
}

/// Calculate slope in degrees
///
/// ```text
/// a b c
/// d e f
/// g h i
/// ```
///
/// dz/dx = ((c + 2f + i) - (a + 2d + g)) / (8 * cellsize)
/// dz/dy = ((g + 2h + i) - (a + 2b + c)) / (8 * cellsize)
pub fn slope(dem: &Raster<f64>, params: SlopeParams) -> Result<Raster<f64>> {
    if !(params.z_factor > 0.0) {
        return Err(Error::invalid_param("z_factor", params.z_factor, "must be positive"));
    }
    let (rows, cols) = dem.shape();
    let nodata = dem.nodata();
    let eight_cell_size = 8.0 * dem.cell_size() * params.z_factor;

    let valid = |v: f64| !(v.is_nan() || nodata.is_some_and(|nd| (v - nd).abs() < f64::EPSILON));

    let output_data: Vec<f64> = (0..rows)
        .into_par_iter()
        .flat_map(|row| {
            let mut row_data = vec![f64::NAN; cols];

            for (col, out) in row_data.iter_mut().enumerate() {
                let e = unsafe { dem.get_unchecked(row, col) };
                if !valid(e) {
                    continue;
                }

                let z = |dr: isize, dc: isize| -> f64 {
                    let r = row as isize + dr;
                    let c = col as isize + dc;
                    if r < 0 || c < 0 || r as usize >= rows || c as usize >= cols {
                        return e;
                    }
                    let v = unsafe { dem.get_unchecked(r as usize, c as usize) };
                    if valid(v) { v } else { e }
                };

                let (a, b, c) = (z(-1, -1), z(-1, 0), z(-1, 1));
                let (d, f) = (z(0, -1), z(0, 1));
                let (g, h, i) = (z(1, -1), z(1, 0), z(1, 1));

                let dz_dx = ((c + 2.0 * f + i) - (a + 2.0 * d + g)) / eight_cell_size;
                let dz_dy = ((g + 2.0 * h + i) - (a + 2.0 * b + c)) / eight_cell_size;

                *out = (dz_dx * dz_dx + dz_dy * dz_dy).sqrt().atan().to_degrees();
            }

            row_data
        })
        .collect();

    let mut output = dem.with_same_meta::<f64>(rows, cols);
    output.set_nodata(Some(f64::NAN));
    *output.data_mut() = Array2::from_shape_vec((rows, cols), output_data)
        .map_err(|e| Error::Other(e.to_string()))?;

    Ok(output)
}
