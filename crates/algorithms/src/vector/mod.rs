//! Vector to raster conversion
//!
//! Polygons and drainage lines are painted onto the stack grid; buffers,
//! unions and intersections are then carried out as raster masks.

mod rasterize;

pub use rasterize::{rasterize_lines, rasterize_polygons};
