//! Statistical analysis algorithms for raster data
//!
//! - **focal**: Moving window mean, median and mode
//! - **zonal**: Reductions over binary zones, mask algebra
//! - **describe**: Descriptive statistics, percentiles and histogram

pub mod describe;
pub mod focal;
pub mod zonal;

pub use describe::{describe, percentile_sorted, DescriptiveStats, Histogram};
pub use focal::{focal_mean, focal_mode, focal_statistics, Focal, FocalParams, FocalStatistic};
pub use zonal::{class_mask, mask_and, zonal_summary, zone_area_m2, zone_values, ZonalResult};
