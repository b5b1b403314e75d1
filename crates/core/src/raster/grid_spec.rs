//! Canonical pixel grid shared by every layer of a feature stack

use crate::crs::CRS;
use crate::error::{Error, Result};
use crate::raster::{GeoTransform, Raster, RasterElement};
use serde::{Deserialize, Serialize};

/// A pixel grid: shape, georeferencing and CRS.
///
/// Two layers are co-registered iff their grids compare equal: identical
/// shape, bit-identical transform and equivalent CRS.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GridSpec {
    pub rows: usize,
    pub cols: usize,
    pub transform: GeoTransform,
    pub crs: CRS,
}

impl GridSpec {
    pub fn new(rows: usize, cols: usize, transform: GeoTransform, crs: CRS) -> Result<Self> {
        if rows == 0 || cols == 0 {
            return Err(Error::InvalidDimensions {
                width: cols,
                height: rows,
            });
        }
        Ok(Self {
            rows,
            cols,
            transform,
            crs,
        })
    }

    /// Grid covering `bounds` at `resolution` (CRS units per pixel).
    pub fn from_bounds(bounds: (f64, f64, f64, f64), resolution: f64, crs: CRS) -> Result<Self> {
        let (min_x, min_y, max_x, max_y) = bounds;
        if !(resolution > 0.0) {
            return Err(Error::invalid_param(
                "target_resolution_m",
                resolution,
                "must be positive",
            ));
        }
        if !(max_x > min_x && max_y > min_y) {
            return Err(Error::EmptyGeometry {
                what: format!("study extent {:?}", bounds),
            });
        }
        let (transform, rows, cols) = GeoTransform::for_bounds(bounds, resolution);
        Self::new(rows, cols, transform, crs)
    }

    /// Grid described by an existing raster, if it carries a CRS.
    pub fn of<T: RasterElement>(raster: &Raster<T>) -> Option<Self> {
        raster.crs().map(|crs| Self {
            rows: raster.rows(),
            cols: raster.cols(),
            transform: *raster.transform(),
            crs: crs.clone(),
        })
    }

    pub fn shape(&self) -> (usize, usize) {
        (self.rows, self.cols)
    }

    pub fn len(&self) -> usize {
        self.rows * self.cols
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn resolution(&self) -> f64 {
        self.transform.cell_size()
    }

    pub fn bounds(&self) -> (f64, f64, f64, f64) {
        self.transform.bounds(self.cols, self.rows)
    }

    /// True area in m² of a cell in `row`.
    pub fn pixel_area_m2(&self, row: usize) -> f64 {
        self.transform.pixel_area_m2(row, self.crs.is_geographic())
    }

    pub fn cell_center(&self, row: usize, col: usize) -> (f64, f64) {
        self.transform.pixel_to_geo(col, row)
    }

    pub fn cell_at(&self, x: f64, y: f64) -> Option<(usize, usize)> {
        self.transform.cell_at(x, y, self.rows, self.cols)
    }

    /// Whether a bounding box overlaps this grid's extent.
    pub fn intersects(&self, other: (f64, f64, f64, f64)) -> bool {
        let (a0, b0, a1, b1) = self.bounds();
        let (c0, d0, c1, d1) = other;
        a0 < c1 && a1 > c0 && b0 < d1 && b1 > d0
    }

    /// A raster on this grid filled with `value`.
    pub fn raster<T: RasterElement>(&self, value: T) -> Raster<T> {
        let mut r = Raster::filled(self.rows, self.cols, value);
        r.set_transform(self.transform);
        r.set_crs(Some(self.crs.clone()));
        r
    }

    /// Whether `raster` is co-registered with this grid.
    pub fn matches<T: RasterElement>(&self, raster: &Raster<T>) -> bool {
        raster.shape() == self.shape()
            && *raster.transform() == self.transform
            && raster.crs().is_some_and(|c| c.is_equivalent(&self.crs))
    }

    /// Like [`matches`](Self::matches) but returns a descriptive error.
    pub fn ensure_matches<T: RasterElement>(&self, layer: &str, raster: &Raster<T>) -> Result<()> {
        if raster.shape() != self.shape() {
            return Err(Error::GridMismatch {
                layer: layer.to_string(),
                reason: format!("shape {:?} != {:?}", raster.shape(), self.shape()),
            });
        }
        if *raster.transform() != self.transform {
            return Err(Error::GridMismatch {
                layer: layer.to_string(),
                reason: format!("transform {:?} != {:?}", raster.transform(), self.transform),
            });
        }
        match raster.crs() {
            Some(c) if c.is_equivalent(&self.crs) => Ok(()),
            other => Err(Error::CrsMismatch {
                layer: layer.to_string(),
                expected: self.crs.identifier(),
                found: other.map_or_else(|| "none".to_string(), |c| c.identifier()),
            }),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_from_bounds() {
        let g = GridSpec::from_bounds((0.0, 0.0, 1000.0, 500.0), 10.0, CRS::from_epsg(31983)).unwrap();
        assert_eq!(g.shape(), (50, 100));
        assert_eq!(g.pixel_area_m2(0), 100.0);
        assert_eq!(g.cell_at(5.0, 495.0), Some((0, 0)));
    }

    #[test]
    fn test_empty_extent_rejected() {
        let r = GridSpec::from_bounds((0.0, 0.0, 0.0, 10.0), 10.0, CRS::from_epsg(31983));
        assert!(matches!(r, Err(Error::EmptyGeometry { .. })));
    }

    #[test]
    fn test_matches() {
        let g = GridSpec::from_bounds((0.0, 0.0, 100.0, 100.0), 10.0, CRS::from_epsg(31983)).unwrap();
        let r: Raster<f64> = g.raster(0.0);
        assert!(g.matches(&r));

        let mut shifted = r.clone();
        shifted.set_transform(GeoTransform::new(5.0, 100.0, 10.0, -10.0));
        assert!(!g.matches(&shifted));
        assert!(g.ensure_matches("shifted", &shifted).is_err());
    }
}
