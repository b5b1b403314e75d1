//! Paint vector geometries onto a pixel grid

use crate::maybe_rayon::*;
use floodmap_core::raster::{GridSpec, Raster};
use floodmap_core::{Error, Result};
use geo::{BoundingRect, Coord, EuclideanDistance, Intersects, Line, LineString, Point, Polygon, Rect};
use ndarray::Array2;

/// Burn polygons into a 0/1 mask: a cell is 1 when its center lies in (or
/// on the boundary of) any polygon.
pub fn rasterize_polygons(polygons: &[Polygon<f64>], grid: &GridSpec) -> Result<Raster<u8>> {
    let boxes: Vec<(Rect<f64>, &Polygon<f64>)> = polygons
        .iter()
        .filter_map(|p| p.bounding_rect().map(|r| (r, p)))
        .collect();

    let (rows, cols) = grid.shape();
    let data: Vec<u8> = (0..rows)
        .into_par_iter()
        .flat_map(|row| {
            let mut row_data = vec![0u8; cols];
            let (_, y) = grid.cell_center(row, 0);
            for (bbox, poly) in &boxes {
                if y < bbox.min().y || y > bbox.max().y {
                    continue;
                }
                let (c0, c1) = col_span(grid, bbox.min().x, bbox.max().x);
                for (col, out) in row_data.iter_mut().enumerate().take(c1).skip(c0) {
                    if *out == 1 {
                        continue;
                    }
                    let (x, _) = grid.cell_center(row, col);
                    if poly.intersects(&Point::new(x, y)) {
                        *out = 1;
                    }
                }
            }
            row_data
        })
        .collect();

    to_raster(grid, data)
}

/// Burn lines into a 0/1 mask. A cell is 1 when the line crosses it or its
/// center lies within `buffer` of the line, so a zero buffer still yields a
/// connected trace.
pub fn rasterize_lines(lines: &[LineString<f64>], grid: &GridSpec, buffer: f64) -> Result<Raster<u8>> {
    if !(buffer >= 0.0) {
        return Err(Error::invalid_param("drainage_buffer_m", buffer, "must be >= 0"));
    }

    let segments: Vec<(Rect<f64>, Line<f64>)> = lines
        .iter()
        .flat_map(|l| l.lines())
        .map(|seg| {
            let r = seg.bounding_rect();
            let grown = Rect::new(
                Coord { x: r.min().x - buffer, y: r.min().y - buffer },
                Coord { x: r.max().x + buffer, y: r.max().y + buffer },
            );
            (grown, seg)
        })
        .collect();

    let (rows, cols) = grid.shape();
    let half = grid.resolution() / 2.0;

    let data: Vec<u8> = (0..rows)
        .into_par_iter()
        .flat_map(|row| {
            let mut row_data = vec![0u8; cols];
            let (_, y) = grid.cell_center(row, 0);
            for (bbox, seg) in &segments {
                if y + half < bbox.min().y || y - half > bbox.max().y {
                    continue;
                }
                let (c0, c1) = col_span(grid, bbox.min().x - half, bbox.max().x + half);
                for (col, out) in row_data.iter_mut().enumerate().take(c1).skip(c0) {
                    if *out == 1 {
                        continue;
                    }
                    let (x, _) = grid.cell_center(row, col);
                    let cell = Rect::new(
                        Coord { x: x - half, y: y - half },
                        Coord { x: x + half, y: y + half },
                    );
                    let center = Point::new(x, y);
                    if cell.intersects(seg) || center.euclidean_distance(seg) <= buffer {
                        *out = 1;
                    }
                }
            }
            row_data
        })
        .collect();

    to_raster(grid, data)
}

/// Half-open column range whose centers may fall inside `[x0, x1]`.
fn col_span(grid: &GridSpec, x0: f64, x1: f64) -> (usize, usize) {
    let t = &grid.transform;
    let c0 = ((x0 - t.origin_x) / t.pixel_width).floor().max(0.0) as usize;
    let c1 = (((x1 - t.origin_x) / t.pixel_width).ceil().max(0.0) as usize + 1).min(grid.cols);
    (c0.min(grid.cols), c1)
}

fn to_raster(grid: &GridSpec, data: Vec<u8>) -> Result<Raster<u8>> {
    let mut out = grid.raster(0u8);
    *out.data_mut() = Array2::from_shape_vec(grid.shape(), data)
        .map_err(|e| Error::Other(e.to_string()))?;
    Ok(out)
}

#[cfg(test)]
mod tests {
    use super::*;
    use floodmap_core::CRS;
    use geo::polygon;

    fn grid() -> GridSpec {
        GridSpec::from_bounds((0.0, 0.0, 100.0, 100.0), 10.0, CRS::from_epsg(31983)).unwrap()
    }

    #[test]
    fn test_square_polygon() {
        let sq = polygon![(x: 20.0, y: 20.0), (x: 60.0, y: 20.0), (x: 60.0, y: 60.0), (x: 20.0, y: 60.0)];
        let mask = rasterize_polygons(&[sq], &grid()).unwrap();
        // 4x4 cells with centers 25..55
        assert_eq!(mask.data().iter().filter(|v| **v == 1).count(), 16);
        assert_eq!(mask.get(5, 2).unwrap(), 1);
        assert_eq!(mask.get(5, 6).unwrap(), 0);
    }

    #[test]
    fn test_line_trace_is_connected() {
        // Horizontal river along y = 50 (a cell boundary)
        let river = LineString::from(vec![(0.0, 50.0), (100.0, 50.0)]);
        let mask = rasterize_lines(&[river], &grid(), 0.0).unwrap();
        for col in 0..10 {
            assert_eq!(mask.get(4, col).unwrap(), 1);
        }
        assert_eq!(mask.get(2, 0).unwrap(), 0);
    }

    #[test]
    fn test_line_buffer() {
        let river = LineString::from(vec![(0.0, 55.0), (100.0, 55.0)]);
        let mask = rasterize_lines(&[river], &grid(), 10.0).unwrap();
        // centers at y = 65, 55, 45 are within 10 m
        assert_eq!(mask.get(3, 5).unwrap(), 1);
        assert_eq!(mask.get(4, 5).unwrap(), 1);
        assert_eq!(mask.get(5, 5).unwrap(), 1);
        assert_eq!(mask.get(6, 5).unwrap(), 0);
        assert!(rasterize_lines(&[], &grid(), -1.0).is_err());
    }
}
