//! Proximity analysis: distance to targets and raster buffers

mod edt;

pub use edt::{buffer_mask, euclidean_distance, DistanceParams, DistanceReport, DistanceResult, EuclideanDistance};
