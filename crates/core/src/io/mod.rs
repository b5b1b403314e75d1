//! I/O operations for reading and writing geospatial data

mod native;
mod table;

pub use native::{read_geotiff, write_geotiff};
pub use table::{
    read_samples, write_records, write_samples, CLASS_COLUMN, REFINED_CLASS_COLUMN,
};
