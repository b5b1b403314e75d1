//! Terrain analysis algorithms
//!
//! - Slope: rate of change of elevation (Horn, degrees)

mod slope;

pub use slope::{slope, Slope, SlopeParams};
