//! Positive-unlabeled label refinement (spy technique)
//!
//! 1. Optionally oversample the positives with SMOTE.
//! 2. Move a seeded fraction of the real positives ("spies") into the
//!    unlabeled pool.
//! 3. Fit naive Bayes on positives vs unlabeled + spies.
//! 4. Derive a threshold from the spy scores.
//! 5. Unlabeled points scoring below it become confident negatives; the
//!    rest are dropped from the table.
//!
//! Positives are never relabeled.

use super::naive_bayes::GaussianNb;
use super::smote::smote;
use crate::config::PipelineConfig;
use crate::statistics::percentile_sorted;
use floodmap_core::sample::{FLOOD, NON_FLOOD};
use floodmap_core::{Error, Result, SampleTable};
use rand::seq::index;
use rand::SeedableRng;
use rand_chacha::ChaCha8Rng;
use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

/// How the spy-score threshold is derived
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(tag = "policy", rename_all = "snake_case")]
pub enum PuThreshold {
    /// `mean - k * std` of the spy scores
    MeanMinusStd {
        #[serde(default = "default_k")]
        k: f64,
    },
    /// The `p`-th percentile of the spy scores
    Percentile { p: f64 },
}

fn default_k() -> f64 {
    1.0
}

impl Default for PuThreshold {
    fn default() -> Self {
        PuThreshold::MeanMinusStd { k: default_k() }
    }
}

impl PuThreshold {
    pub fn validate(&self) -> Result<()> {
        match *self {
            PuThreshold::MeanMinusStd { k } if !(k >= 0.0 && k.is_finite()) => Err(Error::invalid_param(
                "pu_threshold_policy.k",
                k,
                "must be a finite value >= 0",
            )),
            PuThreshold::Percentile { p } if !(0.0..=100.0).contains(&p) => Err(Error::invalid_param(
                "pu_threshold_policy.p",
                p,
                "must be in [0, 100]",
            )),
            _ => Ok(()),
        }
    }

    /// Threshold over a set of spy scores.
    pub fn threshold(&self, spy_scores: &[f64]) -> f64 {
        match *self {
            PuThreshold::MeanMinusStd { k } => {
                let (mean, std) = mean_std(spy_scores);
                mean - k * std
            }
            PuThreshold::Percentile { p } => {
                let mut sorted = spy_scores.to_vec();
                sorted.sort_by(|a, b| a.total_cmp(b));
                percentile_sorted(&sorted, p)
            }
        }
    }
}

fn mean_std(v: &[f64]) -> (f64, f64) {
    if v.is_empty() {
        return (f64::NAN, f64::NAN);
    }
    let n = v.len() as f64;
    let mean = v.iter().sum::<f64>() / n;
    let var = v.iter().map(|x| (x - mean) * (x - mean)).sum::<f64>() / n;
    (mean, var.sqrt())
}

/// Parameters for PU refinement
#[derive(Debug, Clone)]
pub struct PuParams {
    pub spy_fraction: f64,
    pub threshold: PuThreshold,
    pub seed: u64,
    pub oversample: bool,
    pub smote_k: usize,
    /// Positives are topped up to this fraction of the unlabeled count
    pub smote_target_ratio: f64,
}

impl Default for PuParams {
    fn default() -> Self {
        Self {
            spy_fraction: 0.15,
            threshold: PuThreshold::default(),
            seed: 42,
            oversample: true,
            smote_k: 5,
            smote_target_ratio: 1.0,
        }
    }
}

impl PuParams {
    pub fn from_config(cfg: &PipelineConfig) -> Self {
        Self {
            spy_fraction: cfg.spy_fraction,
            threshold: cfg.pu_threshold_policy,
            seed: cfg.pu_seed,
            oversample: cfg.oversample,
            smote_k: cfg.smote_k,
            smote_target_ratio: cfg.smote_target_ratio,
        }
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct PuReport {
    pub positives: usize,
    pub unlabeled: usize,
    pub spies: usize,
    pub synthetic_positives: usize,
    pub spy_score_mean: f64,
    pub spy_score_std: f64,
    pub threshold: f64,
    pub confident_negatives: usize,
    /// Unlabeled points left out of the refined table
    pub still_unlabeled: usize,
}

/// Refine a sampled table into confident positives and confident negatives.
///
/// The output keeps the input's row order; dropped rows are simply absent.
pub fn refine_labels(table: &SampleTable, params: &PuParams) -> Result<(SampleTable, PuReport)> {
    if !(params.spy_fraction > 0.0 && params.spy_fraction < 1.0) {
        return Err(Error::invalid_param("spy_fraction", params.spy_fraction, "must be in (0, 1)"));
    }
    params.threshold.validate()?;

    let positive_rows: Vec<usize> = (0..table.len()).filter(|i| table.points[*i].label == FLOOD).collect();
    let unlabeled_rows: Vec<usize> = (0..table.len()).filter(|i| table.points[*i].label == NON_FLOOD).collect();
    if positive_rows.len() < 2 {
        return Err(Error::InsufficientSamples {
            stage: "PU refinement",
            class: FLOOD,
            found: positive_rows.len(),
            required: 2,
        });
    }
    if unlabeled_rows.is_empty() {
        return Err(Error::InsufficientSamples {
            stage: "PU refinement",
            class: NON_FLOOD,
            found: 0,
            required: 1,
        });
    }

    let mut rng = ChaCha8Rng::seed_from_u64(params.seed);

    let n_spies = ((params.spy_fraction * positive_rows.len() as f64).round() as usize)
        .clamp(1, positive_rows.len() - 1);
    let mut is_spy = vec![false; positive_rows.len()];
    for i in index::sample(&mut rng, positive_rows.len(), n_spies) {
        is_spy[i] = true;
    }

    let mut train_x: Vec<Vec<f64>> = Vec::with_capacity(table.len());
    let mut train_y: Vec<u8> = Vec::with_capacity(table.len());
    let mut spies: Vec<&[f64]> = Vec::with_capacity(n_spies);
    let mut kept_positives: Vec<Vec<f64>> = Vec::new();
    for (k, &row) in positive_rows.iter().enumerate() {
        let f = &table.points[row].features;
        if is_spy[k] {
            spies.push(f);
        } else {
            kept_positives.push(f.clone());
        }
    }

    let target = (params.smote_target_ratio * unlabeled_rows.len() as f64).round() as usize;
    let synthetic = if params.oversample && target > kept_positives.len() {
        if kept_positives.len() < 2 {
            warn!(positives = kept_positives.len(), "too few positives to oversample, skipping SMOTE");
            Vec::new()
        } else {
            smote(&kept_positives, target - kept_positives.len(), params.smote_k, &mut rng)?
        }
    } else {
        Vec::new()
    };
    let synthetic_positives = synthetic.len();

    for f in kept_positives.into_iter().chain(synthetic) {
        train_x.push(f);
        train_y.push(FLOOD);
    }
    for &row in &unlabeled_rows {
        train_x.push(table.points[row].features.clone());
        train_y.push(NON_FLOOD);
    }
    for f in &spies {
        train_x.push(f.to_vec());
        train_y.push(NON_FLOOD);
    }
    debug!(
        positives = positive_rows.len() - n_spies,
        synthetic = synthetic_positives,
        spies = n_spies,
        "fitting spy classifier"
    );

    let model = GaussianNb::fit(&train_x, &train_y)?;
    let spy_scores: Vec<f64> = spies.iter().map(|f| model.predict_proba(f)).collect();
    let (spy_score_mean, spy_score_std) = mean_std(&spy_scores);
    let threshold = params.threshold.threshold(&spy_scores);

    let mut keep = vec![false; table.len()];
    for &row in &positive_rows {
        keep[row] = true;
    }
    let mut confident_negatives = 0;
    for &row in &unlabeled_rows {
        if model.predict_proba(&table.points[row].features) < threshold {
            keep[row] = true;
            confident_negatives += 1;
        }
    }

    let mut refined = SampleTable::new(table.columns.clone());
    for (point, _) in table.points.iter().zip(&keep).filter(|(_, k)| **k) {
        refined.push(point.clone())?;
    }

    let report = PuReport {
        positives: positive_rows.len(),
        unlabeled: unlabeled_rows.len(),
        spies: n_spies,
        synthetic_positives,
        spy_score_mean,
        spy_score_std,
        threshold,
        confident_negatives,
        still_unlabeled: unlabeled_rows.len() - confident_negatives,
    };
    info!(
        threshold = report.threshold,
        confident_negatives = report.confident_negatives,
        still_unlabeled = report.still_unlabeled,
        "PU refinement done"
    );
    Ok((refined, report))
}

#[cfg(test)]
mod tests {
    use super::*;
    use floodmap_core::SamplePoint;

    fn point(i: usize, features: Vec<f64>, label: u8) -> SamplePoint {
        SamplePoint {
            x: i as f64,
            y: 0.0,
            row: 0,
            col: i,
            features,
            label,
        }
    }

    fn table() -> SampleTable {
        let mut t = SampleTable::new(vec!["a".into(), "b".into()]);
        let mut i = 0;
        for k in 0..40 {
            let j = (k % 7) as f64 * 0.2;
            t.push(point(i, vec![10.0 + j, 10.0 - j], FLOOD)).unwrap();
            i += 1;
        }
        for k in 0..60 {
            let f = if k < 45 {
                let j = (k % 9) as f64 * 0.2;
                vec![0.0 + j, 1.0 - j]
            } else {
                // hidden positives drawn like the labeled ones
                let j = (k % 7) as f64 * 0.2;
                vec![10.0 + j, 10.0 - j]
            };
            t.push(point(i, f, NON_FLOOD)).unwrap();
            i += 1;
        }
        t
    }

    #[test]
    fn test_positives_untouched() {
        let t = table();
        let (refined, report) = refine_labels(&t, &PuParams::default()).unwrap();
        assert_eq!(refined.count_label(FLOOD), 40);
        assert_eq!(report.positives, 40);
        assert_eq!(report.spies, 6);
        for p in refined.with_label(FLOOD) {
            assert!(t.points.contains(p));
        }
    }

    #[test]
    fn test_hidden_positives_excluded() {
        let (refined, report) = refine_labels(&table(), &PuParams::default()).unwrap();
        let true_negatives = refined.with_label(NON_FLOOD).filter(|p| p.features[0] < 5.0).count();
        assert_eq!(true_negatives, 45);
        assert!(report.still_unlabeled > 0);
        assert_eq!(report.confident_negatives + report.still_unlabeled, 60);
    }

    #[test]
    fn test_deterministic() {
        let t = table();
        let params = PuParams {
            threshold: PuThreshold::Percentile { p: 5.0 },
            ..Default::default()
        };
        let (a, ra) = refine_labels(&t, &params).unwrap();
        let (b, rb) = refine_labels(&t, &params).unwrap();
        assert_eq!(a, b);
        assert_eq!(ra.threshold, rb.threshold);
    }

    #[test]
    fn test_threshold_policies() {
        let scores = [0.5, 0.7, 0.9];
        let t = PuThreshold::default().threshold(&scores);
        assert!((t - (0.7 - (0.08f64 / 3.0).sqrt())).abs() < 1e-12);
        assert_eq!(PuThreshold::Percentile { p: 50.0 }.threshold(&scores), 0.7);
        assert!(PuThreshold::Percentile { p: 120.0 }.validate().is_err());
    }

    #[test]
    fn test_needs_positives() {
        let mut t = SampleTable::new(vec!["a".into()]);
        t.push(point(0, vec![1.0], FLOOD)).unwrap();
        t.push(point(1, vec![2.0], NON_FLOOD)).unwrap();
        assert!(matches!(
            refine_labels(&t, &PuParams::default()),
            Err(Error::InsufficientSamples { class: 1, .. })
        ));
    }

    #[test]
    fn test_serde_tag() {
        let p: PuThreshold = serde_json::from_str(r#"{"policy": "mean_minus_std"}"#).unwrap();
        assert_eq!(p, PuThreshold::MeanMinusStd { k: 1.0 });
    }
}
