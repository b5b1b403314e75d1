//! Resampling onto a target grid
//!
//! Every input layer is brought onto the canonical [`GridSpec`] before it
//! enters a feature stack. Only same-CRS resampling happens here; a layer in
//! a different CRS is rejected and must be reprojected by the raster store.

use crate::crs::ensure_equivalent;
use crate::error::Result;
use crate::raster::{GridSpec, Raster};
use serde::{Deserialize, Serialize};

/// Interpolation used when sampling a source raster at target cell centers
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ResampleMethod {
    /// Value of the containing source cell (categorical layers)
    #[default]
    Nearest,
    /// Distance-weighted mean of the four surrounding source cell centers
    Bilinear,
}

/// Resample a raster onto `grid`.
///
/// Target cells outside the source extent, or whose contributing source
/// cells are all NaN, become NaN. For bilinear sampling NaN neighbors are
/// dropped and the remaining weights renormalised, so a valid pixel next to
/// a masked one keeps a value.
pub fn resample(
    layer: &str,
    src: &Raster<f64>,
    grid: &GridSpec,
    method: ResampleMethod,
) -> Result<Raster<f64>> {
    ensure_equivalent(layer, &grid.crs, src.crs())?;

    if GridSpec::of(src).is_some_and(|g| g == *grid) {
        return Ok(src.clone());
    }

    let src = src.clone().normalize_nodata();
    let (src_rows, src_cols) = src.shape();
    let mut data = Vec::with_capacity(grid.len());

    for row in 0..grid.rows {
        for col in 0..grid.cols {
            let (x, y) = grid.cell_center(row, col);
            let (fc, fr) = src.geo_to_pixel(x, y);
            let v = match method {
                ResampleMethod::Nearest => sample_nearest(&src, fr, fc, src_rows, src_cols),
                ResampleMethod::Bilinear => sample_bilinear(&src, fr, fc, src_rows, src_cols),
            };
            data.push(v);
        }
    }

    let mut out = grid.raster(f64::NAN);
    *out.data_mut() = ndarray::Array2::from_shape_vec(grid.shape(), data)
        .map_err(|e| crate::Error::Other(e.to_string()))?;
    out.set_nodata(Some(f64::NAN));
    Ok(out)
}

fn sample_nearest(src: &Raster<f64>, fr: f64, fc: f64, rows: usize, cols: usize) -> f64 {
    if !(fr >= 0.0 && fc >= 0.0) {
        return f64::NAN;
    }
    let (r, c) = (fr.floor() as usize, fc.floor() as usize);
    if r >= rows || c >= cols {
        return f64::NAN;
    }
    unsafe { src.get_unchecked(r, c) }
}

fn sample_bilinear(src: &Raster<f64>, fr: f64, fc: f64, rows: usize, cols: usize) -> f64 {
    if !(fr >= 0.0 && fc >= 0.0) || fr >= rows as f64 || fc >= cols as f64 {
        return f64::NAN;
    }
    // Shift to cell-center coordinates
    let r = (fr - 0.5).max(0.0);
    let c = (fc - 0.5).max(0.0);
    let r0 = (r.floor() as usize).min(rows - 1);
    let c0 = (c.floor() as usize).min(cols - 1);
    let r1 = (r0 + 1).min(rows - 1);
    let c1 = (c0 + 1).min(cols - 1);
    let tr = r - r0 as f64;
    let tc = c - c0 as f64;

    let corners = [
        (r0, c0, (1.0 - tr) * (1.0 - tc)),
        (r0, c1, (1.0 - tr) * tc),
        (r1, c0, tr * (1.0 - tc)),
        (r1, c1, tr * tc),
    ];

    let mut sum = 0.0;
    let mut wsum = 0.0;
    for (rr, cc, w) in corners {
        let v = unsafe { src.get_unchecked(rr, cc) };
        if v.is_finite() && w > 0.0 {
            sum += v * w;
            wsum += w;
        }
    }

    if wsum > 0.0 {
        sum / wsum
    } else {
        // Exactly on a NaN cell center with zero-weight valid neighbors
        let v = unsafe { src.get_unchecked(r0, c0) };
        if v.is_finite() { v } else { f64::NAN }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::crs::CRS;
    use crate::raster::GeoTransform;
    use approx::assert_relative_eq;

    fn coarse() -> Raster<f64> {
        // 2x2 cells of 20 m, values 0, 10 / 20, 30
        let mut r = Raster::from_vec(vec![0.0, 10.0, 20.0, 30.0], 2, 2).unwrap();
        r.set_transform(GeoTransform::new(0.0, 40.0, 20.0, -20.0));
        r.set_crs(Some(CRS::from_epsg(31983)));
        r
    }

    #[test]
    fn test_nearest_upsample() {
        let grid = GridSpec::from_bounds((0.0, 0.0, 40.0, 40.0), 10.0, CRS::from_epsg(31983)).unwrap();
        let out = resample("ksat", &coarse(), &grid, ResampleMethod::Nearest).unwrap();
        assert_eq!(out.shape(), (4, 4));
        assert_eq!(out.get(0, 0).unwrap(), 0.0);
        assert_eq!(out.get(0, 3).unwrap(), 10.0);
        assert_eq!(out.get(3, 0).unwrap(), 20.0);
    }

    #[test]
    fn test_bilinear_is_between_neighbors() {
        let grid = GridSpec::from_bounds((0.0, 0.0, 40.0, 40.0), 10.0, CRS::from_epsg(31983)).unwrap();
        let out = resample("ksat", &coarse(), &grid, ResampleMethod::Bilinear).unwrap();
        let v = out.get(1, 1).unwrap();
        assert!(v > 0.0 && v < 30.0, "got {v}");
        assert_relative_eq!(out.get(0, 0).unwrap(), 0.0, epsilon = 1e-9);
    }

    #[test]
    fn test_crs_mismatch_rejected() {
        let grid = GridSpec::from_bounds((0.0, 0.0, 40.0, 40.0), 10.0, CRS::wgs84()).unwrap();
        assert!(resample("ksat", &coarse(), &grid, ResampleMethod::Nearest).is_err());
    }

    #[test]
    fn test_outside_extent_is_nan() {
        let grid = GridSpec::from_bounds((40.0, 0.0, 80.0, 40.0), 10.0, CRS::from_epsg(31983)).unwrap();
        let out = resample("ksat", &coarse(), &grid, ResampleMethod::Nearest).unwrap();
        assert!(out.get(0, 0).unwrap().is_nan());
    }
}
