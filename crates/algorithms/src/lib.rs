//! # floodmap algorithms
//!
//! Stages of the urban flood susceptibility pipeline and the raster kernels
//! they are built from.
//!
//! ## Stages
//!
//! - **covariates**: co-registered feature stack (slope, gap-filled Ksat,
//!   drainage distance, class band)
//! - **sampling**: seeded stratified label sampling
//! - **classification**: PU refinement, HAND slicer, x-means, random forest
//! - **hotspots**: urban connected components filtered by area
//! - **susceptibility**: importance-weighted index, slices, validation
//! - **pipeline**: all of the above in order
//!
//! ## Kernels
//!
//! - **terrain**: slope
//! - **distance**: bounded Euclidean distance transform
//! - **vector**: polygon and line rasterisation
//! - **statistics**: focal, zonal and descriptive statistics

pub mod classification;
pub mod config;
pub mod covariates;
pub mod distance;
pub mod hotspots;
pub(crate) mod maybe_rayon;
pub mod pipeline;
pub mod sampling;
pub mod statistics;
pub mod susceptibility;
pub mod terrain;
pub mod vector;

/// Prelude for convenient imports
pub mod prelude {
    pub use crate::classification::{
        cluster_classify, hand_slice, refine_labels, rf_classify, ClassifiedRaster, ErrorMatrix, FeatureWeights,
        Method, PuThreshold, RandomForest,
    };
    pub use crate::config::{Contribution, PipelineConfig};
    pub use crate::covariates::{band, build_feature_stack, load_inputs, CovariateInputs};
    pub use crate::distance::{euclidean_distance, DistanceParams};
    pub use crate::hotspots::{extract_hotspots, urban_mask, Hotspot, HotspotParams, HotspotSet};
    pub use crate::pipeline::{run, run_pipeline, to_f64, write_outputs, PipelineRun, RunReport};
    pub use crate::sampling::{sample_labels, SamplingParams};
    pub use crate::statistics::{describe, focal_mean, focal_mode, DescriptiveStats};
    pub use crate::susceptibility::{
        susceptibility_index, validate_hotspots, SusceptibilityParams, SusceptibilitySurface,
    };
    pub use crate::terrain::{slope, SlopeParams};
    pub use floodmap_core::prelude::*;
}
