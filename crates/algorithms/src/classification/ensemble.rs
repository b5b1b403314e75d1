//! The three flood classifiers run over the feature stack
//!
//! - HAND slicer: `0 <= hand <= h`, no training.
//! - Cluster: x-means on the sampled covariates, one cluster mapped to flood.
//! - Random forest: trained on the refined labels with a seeded split.
//!
//! Cluster and forest outputs are cleaned with a majority filter.

use super::forest::{ForestParams, RandomForest};
use super::metrics::ErrorMatrix;
use super::split::{SplitSummary, TrainingSet};
use super::weights::FeatureWeights;
use super::xmeans::{KScore, XMeans, XMeansParams};
use crate::config::PipelineConfig;
use crate::covariates::band;
use crate::maybe_rayon::*;
use crate::statistics::focal_mode;
use floodmap_core::raster::{Neighborhood, Raster};
use floodmap_core::sample::FLOOD;
use floodmap_core::{Error, FeatureStack, Result, SampleTable};
use ndarray::Array2;
use serde::Serialize;
use tracing::{info, warn};

/// No-data value of classification rasters
pub const CLASS_NODATA: u8 = 255;

/// Which classifier produced a raster, with its parameters
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "method", rename_all = "snake_case")]
pub enum Method {
    Hand { threshold_m: f64 },
    Cluster { k: usize, flood_cluster: usize },
    RandomForest { trees: usize },
    /// Binary flood raster produced outside the pipeline
    External { name: String },
}

impl Method {
    /// Short name used in output layer ids
    pub fn name(&self) -> String {
        match self {
            Method::Hand { threshold_m } => format!("hand_{threshold_m}"),
            Method::Cluster { .. } => "cluster".into(),
            Method::RandomForest { .. } => "rf".into(),
            Method::External { name } => name.clone(),
        }
    }
}

/// Binary flood raster: 1 flood-prone, 0 not, [`CLASS_NODATA`] masked.
#[derive(Debug, Clone)]
pub struct ClassifiedRaster {
    pub method: Method,
    /// Majority filter radius applied, if any
    pub smoothing_radius: Option<usize>,
    pub raster: Raster<u8>,
}

impl ClassifiedRaster {
    pub fn flood_pixels(&self) -> usize {
        self.raster.data().iter().filter(|v| **v == 1).count()
    }

    /// Majority-filter the raster; masked neighbours count as 0 and masked
    /// cells stay masked. A radius of 0 leaves the raster untouched.
    pub fn smoothed(self, radius: usize) -> Result<Self> {
        if radius == 0 {
            return Ok(Self {
                smoothing_radius: None,
                ..self
            });
        }
        let raster = focal_mode(&self.raster, Neighborhood::Square(radius))?;
        Ok(Self {
            smoothing_radius: Some(radius),
            raster,
            ..self
        })
    }
}

/// Apply `f` to every pixel's feature vector over `bands`. Pixels with a
/// missing covariate become [`CLASS_NODATA`].
fn classify_pixels<F>(stack: &FeatureStack, bands: &[&Raster<f64>], f: F) -> Result<Raster<u8>>
where
    F: Fn(&[f64]) -> u8 + Sync,
{
    let (rows, cols) = stack.grid().shape();
    let data: Vec<u8> = (0..rows)
        .into_par_iter()
        .flat_map(|row| {
            let mut row_data = vec![CLASS_NODATA; cols];
            for (col, out) in row_data.iter_mut().enumerate() {
                if let Some(features) = FeatureStack::pixel_features(bands, row, col) {
                    *out = f(&features);
                }
            }
            row_data
        })
        .collect();

    let mut out = stack.grid().raster(CLASS_NODATA);
    *out.data_mut() = Array2::from_shape_vec((rows, cols), data)
        .map_err(|e| Error::Other(e.to_string()))?;
    out.set_nodata(Some(CLASS_NODATA));
    Ok(out)
}

// HAND slicer

/// Flood-prone where `0 <= HAND <= threshold`.
pub fn hand_slice(stack: &FeatureStack, threshold_m: f64) -> Result<ClassifiedRaster> {
    if !(threshold_m >= 0.0) {
        return Err(Error::invalid_param("hand_thresholds_m", threshold_m, "must be >= 0"));
    }
    let hand = stack.band(band::HAND)?;
    let raster = classify_pixels(stack, &[hand], |v| u8::from(v[0] >= 0.0 && v[0] <= threshold_m))?;
    Ok(ClassifiedRaster {
        method: Method::Hand { threshold_m },
        smoothing_radius: None,
        raster,
    })
}

// Cluster then select

/// How the flood cluster is chosen
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum FloodClusterRule {
    /// Cluster of the pixel containing this point (grid CRS units)
    ReferencePoint { x: f64, y: f64 },
    /// Cluster holding the most positive training samples
    MostPositives,
}

#[derive(Debug, Clone)]
pub struct ClusterParams {
    pub bands: Vec<String>,
    pub xmeans: XMeansParams,
    pub rule: FloodClusterRule,
    /// The flood cluster must cover at least this many pixels
    pub min_support_px: usize,
    pub smoothing_radius: usize,
}

impl ClusterParams {
    pub fn from_config(cfg: &PipelineConfig) -> Self {
        Self {
            bands: cfg.cluster_bands.clone(),
            xmeans: XMeansParams {
                k_min: cfg.cluster_k_min,
                k_max: cfg.cluster_k_max,
                max_iterations: cfg.cluster_max_iterations,
                seed: cfg.cluster_seed,
            },
            rule: match cfg.cluster_reference_point {
                Some([x, y]) => FloodClusterRule::ReferencePoint { x, y },
                None => FloodClusterRule::MostPositives,
            },
            min_support_px: cfg.cluster_min_support_px,
            smoothing_radius: cfg.smoothing_radius_px,
        }
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct ClusterReport {
    pub k: usize,
    pub bic: Vec<KScore>,
    pub flood_cluster: usize,
    /// Pixels assigned to the flood cluster before smoothing
    pub support_px: usize,
    pub cluster_sizes: Vec<usize>,
}

/// Cluster the stack and map one cluster to flood.
pub fn cluster_classify(
    stack: &FeatureStack,
    samples: &SampleTable,
    params: &ClusterParams,
) -> Result<(ClassifiedRaster, ClusterReport)> {
    let table = samples.project(&params.bands)?;
    let x: Vec<Vec<f64>> = table.points.iter().map(|p| p.features.clone()).collect();
    let model = XMeans::fit(&x, &params.xmeans)?;
    let k = model.k();
    info!(k, samples = x.len(), "x-means fitted");

    let bands = stack.select(&params.bands)?;
    let ids = classify_pixels(stack, &bands, |f| model.predict(f) as u8)?;

    let mut cluster_sizes = vec![0usize; k];
    for v in ids.data().iter().filter(|v| **v != CLASS_NODATA) {
        cluster_sizes[*v as usize] += 1;
    }

    let flood_cluster = match params.rule {
        FloodClusterRule::ReferencePoint { x, y } => {
            let (row, col) = stack.grid().cell_at(x, y).ok_or_else(|| Error::AmbiguousCluster {
                x,
                y,
                reason: "reference point is outside the study grid".into(),
            })?;
            let id = ids.get(row, col)?;
            if id == CLASS_NODATA {
                return Err(Error::AmbiguousCluster {
                    x,
                    y,
                    reason: "reference pixel has a missing covariate".into(),
                });
            }
            id as usize
        }
        FloodClusterRule::MostPositives => {
            let mut votes = vec![0usize; k];
            for p in table.with_label(FLOOD) {
                votes[model.predict(&p.features)] += 1;
            }
            let (best, n) = votes
                .iter()
                .enumerate()
                .max_by_key(|(i, n)| (**n, std::cmp::Reverse(*i)))
                .map(|(i, n)| (i, *n))
                .unwrap_or((0, 0));
            if n == 0 {
                return Err(Error::InsufficientSamples {
                    stage: "cluster selection",
                    class: FLOOD,
                    found: 0,
                    required: 1,
                });
            }
            best
        }
    };

    let support_px = cluster_sizes[flood_cluster];
    if support_px < params.min_support_px {
        let (x, y) = match params.rule {
            FloodClusterRule::ReferencePoint { x, y } => (x, y),
            FloodClusterRule::MostPositives => (f64::NAN, f64::NAN),
        };
        return Err(Error::AmbiguousCluster {
            x,
            y,
            reason: format!(
                "cluster {flood_cluster} covers {support_px} px, below cluster_min_support_px = {}",
                params.min_support_px
            ),
        });
    }

    let flood = ids.map(Some(CLASS_NODATA), |v| match v {
        CLASS_NODATA => CLASS_NODATA,
        v => u8::from(v as usize == flood_cluster),
    });
    let classified = ClassifiedRaster {
        method: Method::Cluster { k, flood_cluster },
        smoothing_radius: None,
        raster: flood,
    }
    .smoothed(params.smoothing_radius)?;

    info!(flood_cluster, support_px, "flood cluster selected");
    Ok((
        classified,
        ClusterReport {
            k,
            bic: model.bic.clone(),
            flood_cluster,
            support_px,
            cluster_sizes,
        },
    ))
}

// Random forest

#[derive(Debug, Clone)]
pub struct RfParams {
    pub bands: Vec<String>,
    pub forest: ForestParams,
    pub split_ratio: f64,
    pub split_seed: u64,
    pub smoothing_radius: usize,
}

impl RfParams {
    pub fn from_config(cfg: &PipelineConfig) -> Self {
        Self {
            bands: cfg.rf_bands.clone(),
            forest: ForestParams {
                n_trees: cfg.rf_trees,
                max_depth: cfg.rf_max_depth,
                min_samples_split: cfg.rf_min_samples_split,
                min_per_class: cfg.rf_min_per_class,
                bag_fraction: cfg.rf_bag_fraction,
                features_per_split: None,
                seed: cfg.rf_seed,
            },
            split_ratio: cfg.split_ratio,
            split_seed: cfg.split_seed,
            smoothing_radius: cfg.smoothing_radius_px,
        }
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct RfReport {
    pub split: SplitSummary,
    /// Resubstitution accuracy on the training rows
    pub training: ErrorMatrix,
    /// Held-out accuracy; `None` when the split left no test rows
    pub test: Option<ErrorMatrix>,
    pub weights: FeatureWeights,
}

fn matrix_of(model: &RandomForest, table: &SampleTable) -> ErrorMatrix {
    ErrorMatrix::from_pairs(table.points.iter().map(|p| (p.label, model.predict(&p.features))))
}

/// Train the forest on refined labels and classify the stack.
pub fn rf_classify(
    stack: &FeatureStack,
    refined: &SampleTable,
    params: &RfParams,
) -> Result<(ClassifiedRaster, RandomForest, RfReport)> {
    let table = refined.project(&params.bands)?;
    let split = TrainingSet::split(&table, params.split_ratio, params.split_seed)?;
    let x: Vec<Vec<f64>> = split.train.points.iter().map(|p| p.features.clone()).collect();
    let y: Vec<u8> = split.train.points.iter().map(|p| p.label).collect();
    let model = RandomForest::fit(&x, &y, &params.forest)?;

    let training = matrix_of(&model, &split.train);
    let test = if split.test.is_empty() {
        warn!("split left no test rows, skipping held-out accuracy");
        None
    } else {
        Some(matrix_of(&model, &split.test))
    };
    let weights = FeatureWeights::from_importances(&params.bands, model.feature_importances())?;
    info!(
        train = split.train.len(),
        test = split.test.len(),
        train_accuracy = training.overall_accuracy,
        test_accuracy = test.as_ref().map(|m| m.overall_accuracy),
        "random forest evaluated"
    );

    let bands = stack.select(&params.bands)?;
    let raster = classify_pixels(stack, &bands, |f| model.predict(f))?;
    let classified = ClassifiedRaster {
        method: Method::RandomForest {
            trees: params.forest.n_trees,
        },
        smoothing_radius: None,
        raster,
    }
    .smoothed(params.smoothing_radius)?;

    let report = RfReport {
        split: split.summary(),
        training,
        test,
        weights,
    };
    Ok((classified, model, report))
}
