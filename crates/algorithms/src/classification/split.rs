//! Seeded train/test partition of a labeled table

use floodmap_core::sample::{FLOOD, NON_FLOOD};
use floodmap_core::{Error, Result, SampleTable};
use rand::{Rng, SeedableRng};
use rand_chacha::ChaCha8Rng;
use serde::Serialize;

/// Labeled samples split into training and held-out test rows.
#[derive(Debug, Clone)]
pub struct TrainingSet {
    pub train: SampleTable,
    pub test: SampleTable,
    pub ratio: f64,
    pub seed: u64,
}

/// Row counts per partition and class
#[derive(Debug, Clone, Serialize)]
pub struct SplitSummary {
    pub ratio: f64,
    pub seed: u64,
    pub train_positive: usize,
    pub train_negative: usize,
    pub test_positive: usize,
    pub test_negative: usize,
}

impl TrainingSet {
    /// Draw one uniform number per row, in row order; rows with `u < ratio`
    /// train, the rest test.
    pub fn split(table: &SampleTable, ratio: f64, seed: u64) -> Result<Self> {
        if !(ratio > 0.0 && ratio < 1.0) {
            return Err(Error::invalid_param("split_ratio", ratio, "must be in (0, 1)"));
        }
        let mut rng = ChaCha8Rng::seed_from_u64(seed);
        let mut train = SampleTable::new(table.columns.clone());
        let mut test = SampleTable::new(table.columns.clone());
        for p in &table.points {
            let u: f64 = rng.r#gen();
            if u < ratio {
                train.push(p.clone())?;
            } else {
                test.push(p.clone())?;
            }
        }
        Ok(Self {
            train,
            test,
            ratio,
            seed,
        })
    }

    pub fn summary(&self) -> SplitSummary {
        SplitSummary {
            ratio: self.ratio,
            seed: self.seed,
            train_positive: self.train.count_label(FLOOD),
            train_negative: self.train.count_label(NON_FLOOD),
            test_positive: self.test.count_label(FLOOD),
            test_negative: self.test.count_label(NON_FLOOD),
        }
    }
}
