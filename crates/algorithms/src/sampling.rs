//! Stratified sampling of the class band
//!
//! Draws a fixed number of points from the positive pool (class 1) and the
//! unlabeled pool (class 0). Cells outside the risk buffer carry no class and
//! are never drawn; nor are cells with a missing covariate.

use crate::config::PipelineConfig;
use crate::covariates::band;
use floodmap_core::sample::{FLOOD, NON_FLOOD};
use floodmap_core::{Error, FeatureStack, Result, SamplePoint, SampleTable};
use rand::seq::index;
use rand::SeedableRng;
use rand_chacha::ChaCha8Rng;
use serde::Serialize;
use tracing::{info, warn};

/// Parameters for label sampling
#[derive(Debug, Clone)]
pub struct SamplingParams {
    pub positive: usize,
    pub unlabeled: usize,
    pub seed: u64,
    /// Covariate bands written as feature columns
    pub covariates: Vec<String>,
}

impl Default for SamplingParams {
    fn default() -> Self {
        Self {
            positive: 4_000,
            unlabeled: 39_000,
            seed: 42,
            covariates: default_covariates(),
        }
    }
}

impl SamplingParams {
    pub fn from_config(cfg: &PipelineConfig) -> Self {
        Self {
            positive: cfg.samples_positive,
            unlabeled: cfg.samples_unlabeled,
            seed: cfg.sample_seed,
            covariates: default_covariates(),
        }
    }
}

/// Every stack band except the class band
pub fn default_covariates() -> Vec<String> {
    band::ORDER
        .iter()
        .filter(|b| **b != band::CLASS)
        .map(|b| b.to_string())
        .collect()
}

#[derive(Debug, Clone, Default, Serialize)]
pub struct SamplingReport {
    pub requested_positive: usize,
    pub available_positive: usize,
    pub realized_positive: usize,
    pub requested_unlabeled: usize,
    pub available_unlabeled: usize,
    pub realized_unlabeled: usize,
    /// Set when either pool held fewer cells than requested
    pub shortfall: bool,
}

/// Draw the stratified sample.
pub fn sample_labels(stack: &FeatureStack, params: &SamplingParams) -> Result<(SampleTable, SamplingReport)> {
    let class = stack.band(band::CLASS)?;
    let covariates = stack.select(&params.covariates)?;
    let grid = stack.grid();

    let mut pools: [Vec<(usize, usize, Vec<f64>)>; 2] = [Vec::new(), Vec::new()];
    for row in 0..grid.rows {
        for col in 0..grid.cols {
            let c = unsafe { class.get_unchecked(row, col) };
            let label = if c == f64::from(FLOOD) {
                FLOOD
            } else if c == f64::from(NON_FLOOD) {
                NON_FLOOD
            } else {
                continue;
            };
            if let Some(features) = FeatureStack::pixel_features(&covariates, row, col) {
                pools[label as usize].push((row, col, features));
            }
        }
    }

    let mut rng = ChaCha8Rng::seed_from_u64(params.seed);
    let mut table = SampleTable::new(params.covariates.clone());
    let mut report = SamplingReport {
        requested_positive: params.positive,
        requested_unlabeled: params.unlabeled,
        available_positive: pools[FLOOD as usize].len(),
        available_unlabeled: pools[NON_FLOOD as usize].len(),
        ..Default::default()
    };

    for (label, requested) in [(NON_FLOOD, params.unlabeled), (FLOOD, params.positive)] {
        let pool = &pools[label as usize];
        let amount = requested.min(pool.len());
        if amount < requested {
            warn!(
                class = label,
                requested,
                available = pool.len(),
                "not enough cells for the requested sample, taking all"
            );
            report.shortfall = true;
        }
        let mut picked = index::sample(&mut rng, pool.len(), amount).into_vec();
        picked.sort_unstable();
        for i in picked {
            let (row, col, features) = &pool[i];
            let (x, y) = grid.cell_center(*row, *col);
            table.push(SamplePoint {
                x,
                y,
                row: *row,
                col: *col,
                features: features.clone(),
                label,
            })?;
        }
        match label {
            FLOOD => report.realized_positive = amount,
            _ => report.realized_unlabeled = amount,
        }
    }

    if report.realized_positive == 0 {
        return Err(Error::InsufficientSamples {
            stage: "label sampling",
            class: FLOOD,
            found: 0,
            required: 1,
        });
    }

    info!(
        positive = report.realized_positive,
        unlabeled = report.realized_unlabeled,
        seed = params.seed,
        "labels sampled"
    );
    Ok((table, report))
}
