//! # floodmap core
//!
//! Core types, traits and I/O for urban flood susceptibility mapping.
//!
//! This crate provides:
//! - `Raster<T>`: Generic raster grid type
//! - `GridSpec`: the canonical pixel grid every stacked layer shares
//! - `FeatureStack`: ordered, co-registered covariate bands
//! - `SampleTable`: pixel samples exchanged as CSV
//! - `RasterStore` / `VectorStore`: layer access by id
//! - Algorithm traits for consistent API

pub mod crs;
pub mod error;
pub mod io;
pub mod raster;
pub mod sample;
pub mod stack;
pub mod store;
pub mod vector;

pub use crs::CRS;
pub use error::{Error, Result};
pub use raster::{GeoTransform, GridSpec, Raster, RasterElement};
pub use sample::{SamplePoint, SampleTable};
pub use stack::FeatureStack;

/// Prelude for convenient imports
pub mod prelude {
    pub use crate::crs::CRS;
    pub use crate::error::{Error, Result};
    pub use crate::raster::{Connectivity, GeoTransform, GridSpec, Neighborhood, Raster, RasterElement};
    pub use crate::sample::{SamplePoint, SampleTable};
    pub use crate::stack::FeatureStack;
    pub use crate::store::{RasterStore, VectorStore};
    pub use crate::Algorithm;
}

/// Core trait for the pipeline's raster algorithms.
///
/// Algorithms are pure functions that transform input data according to parameters.
pub trait Algorithm {
    /// Input type for the algorithm
    type Input;
    /// Output type for the algorithm
    type Output;
    /// Parameters controlling algorithm behavior
    type Params: Default;
    /// Error type for algorithm execution
    type Error: std::error::Error;

    /// Returns the algorithm name
    fn name(&self) -> &'static str;

    /// Returns a description of what the algorithm does
    fn description(&self) -> &'static str;

    /// Execute the algorithm
    fn execute(&self, input: Self::Input, params: Self::Params) -> std::result::Result<Self::Output, Self::Error>;

    /// Execute with default parameters
    fn execute_default(&self, input: Self::Input) -> std::result::Result<Self::Output, Self::Error> {
        self.execute(input, Self::Params::default())
    }
}
