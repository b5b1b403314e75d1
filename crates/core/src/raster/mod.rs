//! Raster data structures and operations

mod element;
mod geotransform;
mod grid;
mod grid_spec;
mod neighborhood;
mod resample;

pub use element::RasterElement;
pub use geotransform::GeoTransform;
pub use grid::Raster;
pub use grid_spec::GridSpec;
pub use neighborhood::{offset_cell, Connectivity, Neighborhood};
pub use resample::{resample, ResampleMethod};
