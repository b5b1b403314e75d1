//! Reductions of a band over a mask zone
//!
//! The pipeline only ever reduces over one binary zone at a time (risk
//! buffer, urban risk sectors, hotspots), so zones are 0/1 masks rather
//! than labelled rasters.

use floodmap_core::raster::{GridSpec, Raster, RasterElement};
use floodmap_core::{Error, Result};
use serde::Serialize;

/// Summary of a band inside a zone
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct ZonalResult {
    pub count: usize,
    pub min: f64,
    pub max: f64,
    pub mean: f64,
}

fn check_shape<A: RasterElement, B: RasterElement>(a: &Raster<A>, b: &Raster<B>) -> Result<()> {
    let (er, ec) = a.shape();
    let (ar, ac) = b.shape();
    if (er, ec) != (ar, ac) {
        return Err(Error::SizeMismatch { er, ec, ar, ac });
    }
    Ok(())
}

/// Valid band values where `zone` is non-zero, row-major.
pub fn zone_values(values: &Raster<f64>, zone: &Raster<u8>) -> Result<Vec<f64>> {
    check_shape(values, zone)?;
    let nodata = zone.nodata();
    Ok(values
        .data()
        .iter()
        .zip(zone.data().iter())
        .filter(|(v, z)| **z != 0 && !z.is_nodata(nodata) && v.is_finite())
        .map(|(v, _)| *v)
        .collect())
}

/// Count, min, max and mean of a band inside the zone, `None` when the
/// zone holds no valid value.
pub fn zonal_summary(values: &Raster<f64>, zone: &Raster<u8>) -> Result<Option<ZonalResult>> {
    let vals = zone_values(values, zone)?;
    if vals.is_empty() {
        return Ok(None);
    }
    let (min, max, sum) = vals.iter().fold(
        (f64::INFINITY, f64::NEG_INFINITY, 0.0),
        |(lo, hi, s), v| (lo.min(*v), hi.max(*v), s + v),
    );
    Ok(Some(ZonalResult {
        count: vals.len(),
        min,
        max,
        mean: sum / vals.len() as f64,
    }))
}

/// True area in m² of the non-zero cells of a mask.
pub fn zone_area_m2(zone: &Raster<u8>, grid: &GridSpec) -> Result<f64> {
    grid.ensure_matches("zone", zone)?;
    let nodata = zone.nodata();
    let mut area = 0.0;
    for (row, lane) in zone.data().outer_iter().enumerate() {
        let n = lane.iter().filter(|z| **z != 0 && !z.is_nodata(nodata)).count();
        area += n as f64 * grid.pixel_area_m2(row);
    }
    Ok(area)
}

/// Cell-wise AND of two masks.
pub fn mask_and(a: &Raster<u8>, b: &Raster<u8>) -> Result<Raster<u8>> {
    check_shape(a, b)?;
    let (na, nb) = (a.nodata(), b.nodata());
    let data: Vec<u8> = a
        .data()
        .iter()
        .zip(b.data().iter())
        .map(|(x, y)| u8::from(*x != 0 && !x.is_nodata(na) && *y != 0 && !y.is_nodata(nb)))
        .collect();
    a.derive(data, None)
}

/// Cells of a categorical band equal to `class`.
pub fn class_mask(values: &Raster<f64>, class: u8) -> Raster<u8> {
    let target = f64::from(class);
    values.map(None, |v| u8::from(v == target))
}

#[cfg(test)]
mod tests {
    use super::*;
    use floodmap_core::CRS;

    fn grid() -> GridSpec {
        GridSpec::from_bounds((0.0, 0.0, 30.0, 30.0), 10.0, CRS::from_epsg(31983)).unwrap()
    }

    #[test]
    fn test_zonal_summary() {
        let g = grid();
        let mut v = g.raster(0.0);
        for (i, x) in v.data_mut().iter_mut().enumerate() {
            *x = i as f64;
        }
        v.set(0, 0, f64::NAN).unwrap();
        let mut z = g.raster(0u8);
        z.set(0, 0, 1).unwrap();
        z.set(1, 1, 1).unwrap();
        z.set(2, 2, 1).unwrap();

        let s = zonal_summary(&v, &z).unwrap().unwrap();
        assert_eq!(s.count, 2);
        assert_eq!((s.min, s.max), (4.0, 8.0));
        assert_eq!(s.mean, 6.0);
        assert_eq!(zone_area_m2(&z, &g).unwrap(), 300.0);
    }

    #[test]
    fn test_empty_zone() {
        let g = grid();
        assert!(zonal_summary(&g.raster(1.0), &g.raster(0u8)).unwrap().is_none());
    }

    #[test]
    fn test_mask_ops() {
        let g = grid();
        let mut lc = g.raster(3.0);
        lc.set(0, 1, 24.0).unwrap();
        lc.set(2, 2, 24.0).unwrap();
        let urban = class_mask(&lc, 24);
        let mut flood = g.raster(0u8);
        flood.set(0, 1, 1).unwrap();
        flood.set(1, 1, 1).unwrap();
        let both = mask_and(&urban, &flood).unwrap();
        assert_eq!(both.data().iter().filter(|v| **v == 1).count(), 1);
        assert_eq!(both.get(0, 1).unwrap(), 1);
    }
}
