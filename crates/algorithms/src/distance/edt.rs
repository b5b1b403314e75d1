//! Exact Euclidean distance transform with a search-radius cutoff
//!
//! Two 1-D passes of the lower-envelope algorithm of Felzenszwalb &
//! Huttenlocher (2012), first down each column then along each row. The
//! result is exact to the nearest target cell center; distances above the
//! cutoff are clamped to the cutoff and counted.

use crate::maybe_rayon::*;
use floodmap_core::raster::{Raster, RasterElement};
use floodmap_core::{Algorithm, Error, Result};
use ndarray::Array2;
use serde::Serialize;

/// Large finite stand-in for "no target", keeps the envelope arithmetic finite
const FAR: f64 = 1e20;

/// Parameters for the distance transform
#[derive(Debug, Clone)]
pub struct DistanceParams {
    /// Distances beyond this (CRS units) are clamped
    pub max_distance: f64,
}

impl Default for DistanceParams {
    fn default() -> Self {
        Self { max_distance: 2500.0 }
    }
}

/// Distance raster plus how many cells hit the cutoff
#[derive(Debug, Clone)]
pub struct DistanceResult {
    pub distance: Raster<f64>,
    pub report: DistanceReport,
}

#[derive(Debug, Clone, Default, Serialize)]
pub struct DistanceReport {
    pub max_distance: f64,
    pub target_pixels: usize,
    /// Cells farther than `max_distance` from every target
    pub clamped_pixels: usize,
}

/// Euclidean distance algorithm
#[derive(Debug, Clone, Default)]
pub struct EuclideanDistance;

impl Algorithm for EuclideanDistance {
    type Input = Raster<u8>;
    type Output = DistanceResult;
    type Params = DistanceParams;
    type Error = Error;

    fn name(&self) -> &'static str {
        "Euclidean Distance"
    }

    fn description(&self) -> &'static str {
        "Distance to the nearest non-zero cell, clamped at a search radius"
    }

    fn execute(&self, input: Self::Input, params: Self::Params) -> Result<Self::Output> {
        euclidean_distance(&input, params)
    }
}

/// Distance from every cell to the nearest target (non-zero) cell.
///
/// A grid with no target at all is entirely clamped.
pub fn euclidean_distance(targets: &Raster<u8>, params: DistanceParams) -> Result<DistanceResult> {
    if !(params.max_distance > 0.0) {
        return Err(Error::invalid_param(
            "distance_search_radius_m",
            params.max_distance,
            "must be positive",
        ));
    }
    let (rows, cols) = targets.shape();
    let cell = targets.cell_size();
    let nodata = targets.nodata();
    let is_target = |v: u8| v != 0 && !v.is_nodata(nodata);

    let target_pixels = targets.data().iter().filter(|v| is_target(**v)).count();

    // Column pass: squared distance in pixels along each column
    let columns: Vec<Vec<f64>> = (0..cols)
        .into_par_iter()
        .map(|col| {
            let f: Vec<f64> = (0..rows)
                .map(|row| {
                    let v = unsafe { targets.get_unchecked(row, col) };
                    if is_target(v) { 0.0 } else { FAR }
                })
                .collect();
            envelope_1d(&f)
        })
        .collect();

    // Row pass over the column result
    let squared: Vec<f64> = (0..rows)
        .into_par_iter()
        .flat_map(|row| {
            let f: Vec<f64> = (0..cols).map(|col| columns[col][row]).collect();
            envelope_1d(&f)
        })
        .collect();

    let max_sq_px = (params.max_distance / cell).powi(2);
    let clamped_pixels = squared.iter().filter(|d2| **d2 > max_sq_px).count();
    let output_data: Vec<f64> = squared
        .into_iter()
        .map(|d2| {
            if d2 > max_sq_px {
                params.max_distance
            } else {
                d2.sqrt() * cell
            }
        })
        .collect();

    let mut distance = targets.with_same_meta::<f64>(rows, cols);
    distance.set_nodata(Some(f64::NAN));
    *distance.data_mut() = Array2::from_shape_vec((rows, cols), output_data)
        .map_err(|e| Error::Other(e.to_string()))?;

    Ok(DistanceResult {
        distance,
        report: DistanceReport {
            max_distance: params.max_distance,
            target_pixels,
            clamped_pixels,
        },
    })
}

/// Cells within `distance` of any non-zero cell of `mask` (mask included).
pub fn buffer_mask(mask: &Raster<u8>, distance: f64) -> Result<Raster<u8>> {
    if distance <= 0.0 {
        let nodata = mask.nodata();
        return Ok(mask.map(None, |v| u8::from(v != 0 && !v.is_nodata(nodata))));
    }
    // Search slightly past the buffer so in-buffer cells are never clamped
    let result = euclidean_distance(
        mask,
        DistanceParams {
            max_distance: distance + mask.cell_size(),
        },
    )?;
    Ok(result
        .distance
        .map(None, |d| u8::from(d <= distance + 1e-9)))
}

/// Squared distance transform of a sampled function, in index units.
fn envelope_1d(f: &[f64]) -> Vec<f64> {
    let n = f.len();
    let mut d = vec![FAR; n];
    if n == 0 {
        return d;
    }
    let mut v = vec![0usize; n];
    let mut z = vec![0.0f64; n + 1];
    let mut k = 0usize;
    z[0] = f64::NEG_INFINITY;
    z[1] = f64::INFINITY;

    let sq = |i: usize| (i * i) as f64;
    let intersect = |q: usize, p: usize| ((f[q] + sq(q)) - (f[p] + sq(p))) / (2.0 * (q - p) as f64);
    for q in 1..n {
        let mut s = intersect(q, v[k]);
        while k > 0 && s <= z[k] {
            k -= 1;
            s = intersect(q, v[k]);
        }
        k += 1;
        v[k] = q;
        z[k] = s;
        z[k + 1] = f64::INFINITY;
    }

    k = 0;
    for (q, out) in d.iter_mut().enumerate() {
        while z[k + 1] < q as f64 {
            k += 1;
        }
        let p = v[k];
        let diff = q as f64 - p as f64;
        *out = (diff * diff + f[p]).min(FAR);
    }
    d
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;
    use floodmap_core::GeoTransform;

    fn grid(rows: usize, cols: usize, cell: f64) -> Raster<u8> {
        let mut r = Raster::new(rows, cols);
        r.set_transform(GeoTransform::new(0.0, rows as f64 * cell, cell, -cell));
        r
    }

    fn brute_force(t: &Raster<u8>, row: usize, col: usize) -> f64 {
        let mut best = f64::INFINITY;
        for r in 0..t.rows() {
            for c in 0..t.cols() {
                if t.get(r, c).unwrap() != 0 {
                    let d = ((r as f64 - row as f64).powi(2) + (c as f64 - col as f64).powi(2)).sqrt();
                    best = best.min(d);
                }
            }
        }
        best * t.cell_size()
    }

    #[test]
    fn test_matches_brute_force() {
        let mut t = grid(17, 23, 10.0);
        for (r, c) in [(0, 0), (5, 12), (16, 3), (9, 22)] {
            t.set(r, c, 1).unwrap();
        }
        let out = euclidean_distance(&t, DistanceParams { max_distance: 1e6 }).unwrap();
        for r in 0..17 {
            for c in 0..23 {
                assert_relative_eq!(
                    out.distance.get(r, c).unwrap(),
                    brute_force(&t, r, c),
                    epsilon = 1e-9
                );
            }
        }
        assert_eq!(out.report.clamped_pixels, 0);
        assert_eq!(out.report.target_pixels, 4);
    }

    #[test]
    fn test_clamped_beyond_radius() {
        let mut t = grid(1, 50, 10.0);
        t.set(0, 0, 1).unwrap();
        let out = euclidean_distance(&t, DistanceParams { max_distance: 100.0 }).unwrap();
        assert_relative_eq!(out.distance.get(0, 5).unwrap(), 50.0);
        assert_relative_eq!(out.distance.get(0, 10).unwrap(), 100.0);
        assert_relative_eq!(out.distance.get(0, 40).unwrap(), 100.0);
        assert_eq!(out.report.clamped_pixels, 50 - 11);
    }

    #[test]
    fn test_no_targets_all_clamped() {
        let t = grid(4, 4, 10.0);
        let out = euclidean_distance(&t, DistanceParams { max_distance: 30.0 }).unwrap();
        assert_eq!(out.report.clamped_pixels, 16);
        assert_relative_eq!(out.distance.get(2, 2).unwrap(), 30.0);
    }

    #[test]
    fn test_buffer_mask() {
        let mut t = grid(11, 11, 10.0);
        t.set(5, 5, 1).unwrap();
        let b = buffer_mask(&t, 20.0).unwrap();
        assert_eq!(b.get(5, 7).unwrap(), 1);
        assert_eq!(b.get(5, 8).unwrap(), 0);
        // diagonal 2*sqrt(2)*10 > 20
        assert_eq!(b.get(7, 7).unwrap(), 0);
        assert_eq!(b.get(6, 6).unwrap(), 1);
    }
}
