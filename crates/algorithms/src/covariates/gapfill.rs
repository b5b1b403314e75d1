//! Gap-filling of hydraulic conductivity
//!
//! Missing cells are first marked with a sentinel, then replaced by the
//! median of the non-sentinel cells in a square window. Cells whose whole
//! window is sentinel get the global median of the valid cells and are
//! counted as fallback cells.

use crate::maybe_rayon::*;
use crate::statistics::focal::median_in_place;
use floodmap_core::raster::{offset_cell, Neighborhood, Raster};
use floodmap_core::{Error, Result};
use ndarray::Array2;
use serde::Serialize;
use tracing::{debug, warn};

/// Parameters for gap-filling
#[derive(Debug, Clone)]
pub struct GapFillParams {
    /// Marker for missing cells; must not collide with any valid value
    pub sentinel: f64,
    /// Square window radius in pixels of the raster being filled
    pub radius: usize,
}

impl Default for GapFillParams {
    fn default() -> Self {
        Self {
            sentinel: 1000.0,
            radius: 45,
        }
    }
}

#[derive(Debug, Clone, Default, Serialize)]
pub struct GapFillReport {
    pub radius_px: usize,
    /// Cells that had no native value
    pub flagged_pixels: usize,
    pub filled_by_neighborhood: usize,
    /// Cells filled with the global median because their window was empty
    pub fallback_pixels: usize,
    pub fallback_value: Option<f64>,
}

/// Replace missing (NaN, no-data or sentinel) cells.
///
/// Running it on an already filled raster changes nothing.
pub fn gap_fill(raster: &Raster<f64>, params: &GapFillParams) -> Result<(Raster<f64>, GapFillReport)> {
    if params.radius == 0 {
        return Err(Error::invalid_param("gap_fill_radius_px", 0, "must be >= 1"));
    }
    let sentinel = params.sentinel;
    let (rows, cols) = raster.shape();
    let src = raster.clone().normalize_nodata();

    let is_missing = |v: f64| v.is_nan() || v == sentinel;

    let flagged_pixels = src.data().iter().filter(|v| is_missing(**v)).count();
    let mut report = GapFillReport {
        radius_px: params.radius,
        flagged_pixels,
        ..Default::default()
    };
    if flagged_pixels == 0 {
        return Ok((src, report));
    }

    let offsets = Neighborhood::Square(params.radius).offsets();
    let filled: Vec<(f64, bool)> = (0..rows)
        .into_par_iter()
        .flat_map(|row| {
            let mut row_data = Vec::with_capacity(cols);
            let mut window: Vec<f64> = Vec::new();
            for col in 0..cols {
                let v = unsafe { src.get_unchecked(row, col) };
                if !is_missing(v) {
                    row_data.push((v, false));
                    continue;
                }
                window.clear();
                for &(dr, dc) in &offsets {
                    if let Some((r, c)) = offset_cell(row, col, dr, dc, rows, cols) {
                        let n = unsafe { src.get_unchecked(r, c) };
                        if !is_missing(n) {
                            window.push(n);
                        }
                    }
                }
                if window.is_empty() {
                    row_data.push((sentinel, true));
                } else {
                    row_data.push((median_in_place(&mut window), false));
                }
            }
            row_data
        })
        .collect();

    let unresolved = filled.iter().filter(|(_, left)| *left).count();
    report.filled_by_neighborhood = flagged_pixels - unresolved;

    let mut data: Vec<f64> = filled.iter().map(|(v, _)| *v).collect();
    if unresolved > 0 {
        let mut valid: Vec<f64> = src.data().iter().copied().filter(|v| !is_missing(*v)).collect();
        if valid.is_empty() {
            return Err(Error::InsufficientSamples {
                stage: "gap-fill soil_hydraulic_conductivity",
                class: 0,
                found: 0,
                required: 1,
            });
        }
        let global = median_in_place(&mut valid);
        for (v, (_, left)) in data.iter_mut().zip(&filled) {
            if *left {
                *v = global;
            }
        }
        report.fallback_pixels = unresolved;
        report.fallback_value = Some(global);
        warn!(
            pixels = unresolved,
            value = global,
            "gap-fill window empty, using global median"
        );
    }
    debug!(
        flagged = report.flagged_pixels,
        filled = report.filled_by_neighborhood,
        "gap-fill done"
    );

    let mut out = src.with_same_meta::<f64>(rows, cols);
    out.set_nodata(Some(f64::NAN));
    *out.data_mut() = Array2::from_shape_vec((rows, cols), data)
        .map_err(|e| Error::Other(e.to_string()))?;
    Ok((out, report))
}

/// Reject a sentinel that collides with a valid value of the layer.
pub fn check_sentinel(raster: &Raster<f64>, sentinel: f64) -> Result<()> {
    if raster.data().iter().any(|v| *v == sentinel && !raster.is_nodata(*v)) {
        return Err(Error::invalid_param(
            "gap_fill_sentinel",
            sentinel,
            "collides with a valid soil_hydraulic_conductivity value",
        ));
    }
    Ok(())
}
