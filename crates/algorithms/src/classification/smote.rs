//! SMOTE: synthetic minority oversampling
//!
//! Each synthetic point lies on the segment between a random minority point
//! and one of its k nearest minority neighbours. Only minority (positive)
//! points are ever produced.

use crate::maybe_rayon::*;
use floodmap_core::sample::FLOOD;
use floodmap_core::{Error, Result};
use rand::Rng;

fn squared_distance(a: &[f64], b: &[f64]) -> f64 {
    a.iter().zip(b).map(|(x, y)| (x - y) * (x - y)).sum()
}

/// Indices of the `k` nearest other points for every point.
fn nearest_neighbors(points: &[Vec<f64>], k: usize) -> Vec<Vec<usize>> {
    points
        .par_iter()
        .enumerate()
        .map(|(i, p)| {
            let mut d: Vec<(f64, usize)> = points
                .iter()
                .enumerate()
                .filter(|(j, _)| *j != i)
                .map(|(j, q)| (squared_distance(p, q), j))
                .collect();
            let k = k.min(d.len());
            if k < d.len() {
                d.select_nth_unstable_by(k, |a, b| a.0.total_cmp(&b.0).then(a.1.cmp(&b.1)));
            }
            let mut nn: Vec<(f64, usize)> = d[..k].to_vec();
            nn.sort_by(|a, b| a.0.total_cmp(&b.0).then(a.1.cmp(&b.1)));
            nn.into_iter().map(|(_, j)| j).collect()
        })
        .collect()
}

/// Generate `n_new` synthetic points from `minority`.
///
/// The draw sequence depends only on `rng`, so a seeded generator gives the
/// same points on every run.
pub fn smote<R: Rng>(minority: &[Vec<f64>], n_new: usize, k: usize, rng: &mut R) -> Result<Vec<Vec<f64>>> {
    if n_new == 0 {
        return Ok(Vec::new());
    }
    if k == 0 {
        return Err(Error::invalid_param("smote_k", 0, "must be >= 1"));
    }
    if minority.len() < 2 {
        return Err(Error::InsufficientSamples {
            stage: "SMOTE oversampling",
            class: FLOOD,
            found: minority.len(),
            required: 2,
        });
    }

    let neighbors = nearest_neighbors(minority, k);
    let mut out = Vec::with_capacity(n_new);
    for _ in 0..n_new {
        let i = rng.gen_range(0..minority.len());
        let nn = &neighbors[i];
        let j = nn[rng.gen_range(0..nn.len())];
        let gap: f64 = rng.r#gen();
        let a = &minority[i];
        let b = &minority[j];
        out.push(a.iter().zip(b).map(|(x, y)| x + gap * (y - x)).collect());
    }
    Ok(out)
}
