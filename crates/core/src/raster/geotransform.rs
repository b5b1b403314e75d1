//! Affine geotransformation for north-up rasters

use serde::{Deserialize, Serialize};

/// Mean metres per degree of latitude on the WGS84 ellipsoid.
const METERS_PER_DEGREE_LAT: f64 = 110_574.0;
/// Metres per degree of longitude at the equator.
const METERS_PER_DEGREE_LON: f64 = 111_320.0;

/// Georeferencing for a north-up raster.
///
/// ```text
/// x = origin_x + col * pixel_width
/// y = origin_y + row * pixel_height
/// ```
///
/// `pixel_height` is negative for the usual top-down row order. Rotated
/// grids are not supported; every layer is resampled onto a north-up grid
/// before it enters a stack.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct GeoTransform {
    /// X coordinate of the upper-left corner
    pub origin_x: f64,
    /// Y coordinate of the upper-left corner
    pub origin_y: f64,
    /// Pixel width (cell size in X direction)
    pub pixel_width: f64,
    /// Pixel height (cell size in Y direction, usually negative)
    pub pixel_height: f64,
}

impl GeoTransform {
    pub fn new(origin_x: f64, origin_y: f64, pixel_width: f64, pixel_height: f64) -> Self {
        Self {
            origin_x,
            origin_y,
            pixel_width,
            pixel_height,
        }
    }

    /// Transform for a grid covering `(min_x, min_y, max_x, max_y)` with
    /// square cells of `resolution`. The origin is snapped down/up to a
    /// multiple of the resolution so grids built from overlapping extents
    /// share pixel boundaries.
    pub fn for_bounds(bounds: (f64, f64, f64, f64), resolution: f64) -> (Self, usize, usize) {
        let (min_x, min_y, max_x, max_y) = bounds;
        let x0 = (min_x / resolution).floor() * resolution;
        let y0 = (max_y / resolution).ceil() * resolution;
        let cols = ((max_x - x0) / resolution).ceil().max(1.0) as usize;
        let rows = ((y0 - min_y) / resolution).ceil().max(1.0) as usize;
        (Self::new(x0, y0, resolution, -resolution), rows, cols)
    }

    /// Geographic coordinates of the pixel center
    pub fn pixel_to_geo(&self, col: usize, row: usize) -> (f64, f64) {
        (
            self.origin_x + (col as f64 + 0.5) * self.pixel_width,
            self.origin_y + (row as f64 + 0.5) * self.pixel_height,
        )
    }

    /// Geographic coordinates of the pixel's upper-left corner
    pub fn pixel_to_geo_corner(&self, col: usize, row: usize) -> (f64, f64) {
        (
            self.origin_x + col as f64 * self.pixel_width,
            self.origin_y + row as f64 * self.pixel_height,
        )
    }

    /// Fractional pixel coordinates `(col, row)`; floor for the cell index.
    pub fn geo_to_pixel(&self, x: f64, y: f64) -> (f64, f64) {
        if self.pixel_width.abs() < 1e-12 || self.pixel_height.abs() < 1e-12 {
            return (f64::NAN, f64::NAN);
        }
        (
            (x - self.origin_x) / self.pixel_width,
            (y - self.origin_y) / self.pixel_height,
        )
    }

    /// Cell index containing `(x, y)`, if it lies inside a `rows × cols` grid.
    pub fn cell_at(&self, x: f64, y: f64, rows: usize, cols: usize) -> Option<(usize, usize)> {
        let (c, r) = self.geo_to_pixel(x, y);
        if !c.is_finite() || !r.is_finite() || c < 0.0 || r < 0.0 {
            return None;
        }
        let (r, c) = (r.floor() as usize, c.floor() as usize);
        (r < rows && c < cols).then_some((r, c))
    }

    /// Cell size (square pixels)
    pub fn cell_size(&self) -> f64 {
        self.pixel_width.abs()
    }

    /// Planar area of one cell in squared CRS units.
    pub fn cell_area(&self) -> f64 {
        (self.pixel_width * self.pixel_height).abs()
    }

    /// True area in m² of a cell in the given row.
    ///
    /// For projected grids this is the planar cell area. For geographic
    /// grids the longitudinal extent shrinks with the cosine of the row's
    /// center latitude.
    pub fn pixel_area_m2(&self, row: usize, geographic: bool) -> f64 {
        if !geographic {
            return self.cell_area();
        }
        let lat = self.origin_y + (row as f64 + 0.5) * self.pixel_height;
        let w = self.pixel_width.abs() * METERS_PER_DEGREE_LON * lat.to_radians().cos();
        let h = self.pixel_height.abs() * METERS_PER_DEGREE_LAT;
        w * h
    }

    /// Bounding box `(min_x, min_y, max_x, max_y)` of a grid
    pub fn bounds(&self, cols: usize, rows: usize) -> (f64, f64, f64, f64) {
        let (x0, y0) = self.pixel_to_geo_corner(0, 0);
        let (x1, y1) = self.pixel_to_geo_corner(cols, rows);
        (x0.min(x1), y0.min(y1), x0.max(x1), y0.max(y1))
    }
}

impl Default for GeoTransform {
    fn default() -> Self {
        Self::new(0.0, 0.0, 1.0, -1.0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    #[test]
    fn test_pixel_to_geo_roundtrip() {
        let gt = GeoTransform::new(100.0, 200.0, 10.0, -10.0);

        let (x, y) = gt.pixel_to_geo(5, 10);
        let (col, row) = gt.geo_to_pixel(x, y);

        assert_relative_eq!(col, 5.5, epsilon = 1e-10);
        assert_relative_eq!(row, 10.5, epsilon = 1e-10);
        assert_eq!(gt.cell_at(x, y, 20, 20), Some((10, 5)));
        assert_eq!(gt.cell_at(x, y, 5, 5), None);
    }

    #[test]
    fn test_for_bounds_snaps_origin() {
        let (gt, rows, cols) = GeoTransform::for_bounds((103.0, 51.0, 197.0, 149.0), 10.0);
        assert_relative_eq!(gt.origin_x, 100.0);
        assert_relative_eq!(gt.origin_y, 150.0);
        assert_eq!((rows, cols), (10, 10));
    }

    #[test]
    fn test_pixel_area() {
        let gt = GeoTransform::new(0.0, 0.0, 10.0, -10.0);
        assert_relative_eq!(gt.pixel_area_m2(3, false), 100.0);

        // ~10 m cells at the equator in degrees
        let geo = GeoTransform::new(-47.0, 0.0, 1e-4, -1e-4);
        let a = geo.pixel_area_m2(0, true);
        assert!((a - 123.1).abs() < 1.0, "got {a}");
    }
}
