//! X-means: k-means with the number of clusters picked by BIC
//!
//! Features are z-scored, then k-means (k-means++ seeding, Lloyd updates) is
//! run for every k in `k_min..=k_max` and the k with the highest Bayesian
//! information criterion under the identical spherical Gaussian model of
//! Pelleg & Moore (2000) is kept.

use crate::maybe_rayon::*;
use floodmap_core::{Error, Result};
use rand::{Rng, SeedableRng};
use rand_chacha::ChaCha8Rng;
use serde::Serialize;
use tracing::debug;

/// Parameters for X-means clustering
#[derive(Debug, Clone)]
pub struct XMeansParams {
    pub k_min: usize,
    pub k_max: usize,
    pub max_iterations: usize,
    pub seed: u64,
}

impl Default for XMeansParams {
    fn default() -> Self {
        Self {
            k_min: 2,
            k_max: 10,
            max_iterations: 50,
            seed: 42,
        }
    }
}

/// A fitted clustering model
#[derive(Debug, Clone)]
pub struct XMeans {
    centroids: Vec<Vec<f64>>,
    mean: Vec<f64>,
    scale: Vec<f64>,
    /// BIC of every k tried
    pub bic: Vec<KScore>,
}

#[derive(Debug, Clone, Copy, Serialize)]
pub struct KScore {
    pub k: usize,
    pub bic: f64,
    pub iterations: usize,
}

fn sq_dist(a: &[f64], b: &[f64]) -> f64 {
    a.iter().zip(b).map(|(x, y)| (x - y) * (x - y)).sum()
}

fn nearest(centroids: &[Vec<f64>], p: &[f64]) -> (usize, f64) {
    let mut best = (0, f64::INFINITY);
    for (k, c) in centroids.iter().enumerate() {
        let d = sq_dist(c, p);
        if d < best.1 {
            best = (k, d);
        }
    }
    best
}

fn kmeans_pp<R: Rng>(points: &[Vec<f64>], k: usize, rng: &mut R) -> Vec<Vec<f64>> {
    let mut centroids = vec![points[rng.gen_range(0..points.len())].clone()];
    let mut d2: Vec<f64> = points.iter().map(|p| sq_dist(p, &centroids[0])).collect();
    while centroids.len() < k {
        let total: f64 = d2.iter().sum();
        let next = if total > 0.0 {
            let mut target = rng.r#gen::<f64>() * total;
            let mut chosen = points.len() - 1;
            for (i, d) in d2.iter().enumerate() {
                if target < *d {
                    chosen = i;
                    break;
                }
                target -= d;
            }
            chosen
        } else {
            rng.gen_range(0..points.len())
        };
        let c = points[next].clone();
        for (d, p) in d2.iter_mut().zip(points) {
            *d = d.min(sq_dist(p, &c));
        }
        centroids.push(c);
    }
    centroids
}

/// Lloyd iterations; returns centroids, labels and iterations used.
fn lloyd(points: &[Vec<f64>], mut centroids: Vec<Vec<f64>>, max_iterations: usize) -> (Vec<Vec<f64>>, Vec<usize>, usize) {
    let dims = points[0].len();
    let mut labels = vec![usize::MAX; points.len()];
    let mut iterations = 0;
    for _ in 0..max_iterations {
        iterations += 1;
        let new_labels: Vec<usize> = points.par_iter().map(|p| nearest(&centroids, p).0).collect();
        let changed = new_labels != labels;
        labels = new_labels;
        if !changed {
            break;
        }
        let mut sums = vec![vec![0.0; dims]; centroids.len()];
        let mut counts = vec![0usize; centroids.len()];
        for (p, &l) in points.iter().zip(&labels) {
            counts[l] += 1;
            for (s, v) in sums[l].iter_mut().zip(p) {
                *s += v;
            }
        }
        for (k, c) in centroids.iter_mut().enumerate() {
            // empty clusters keep their centroid
            if counts[k] > 0 {
                for (cv, s) in c.iter_mut().zip(&sums[k]) {
                    *cv = s / counts[k] as f64;
                }
            }
        }
    }
    (centroids, labels, iterations)
}

/// BIC of a hard clustering under a shared spherical Gaussian.
fn bic(points: &[Vec<f64>], centroids: &[Vec<f64>], labels: &[usize]) -> f64 {
    let r = points.len() as f64;
    let m = points[0].len() as f64;
    let k = centroids.len() as f64;
    if r <= k {
        return f64::NEG_INFINITY;
    }
    let sse: f64 = points.iter().zip(labels).map(|(p, l)| sq_dist(p, &centroids[*l])).sum();
    let variance = (sse / (m * (r - k))).max(1e-12);

    let mut counts = vec![0usize; centroids.len()];
    for l in labels {
        counts[*l] += 1;
    }
    let mut log_likelihood = 0.0;
    for &rn in counts.iter().filter(|c| **c > 0) {
        let rn = rn as f64;
        log_likelihood += rn * rn.ln() - rn * r.ln()
            - rn / 2.0 * (2.0 * std::f64::consts::PI).ln()
            - rn * m / 2.0 * variance.ln()
            - (rn - k) / 2.0;
    }
    let params = (k - 1.0) + m * k + 1.0;
    log_likelihood - params / 2.0 * r.ln()
}

impl XMeans {
    pub fn fit(x: &[Vec<f64>], params: &XMeansParams) -> Result<Self> {
        if params.k_min < 2 || params.k_min > params.k_max {
            return Err(Error::invalid_param(
                "cluster_k_min",
                format!("{}..={}", params.k_min, params.k_max),
                "need 2 <= k_min <= k_max",
            ));
        }
        if x.len() <= params.k_min {
            return Err(Error::InsufficientSamples {
                stage: "x-means clustering",
                class: 0,
                found: x.len(),
                required: params.k_min + 1,
            });
        }
        let dims = x[0].len();
        if dims == 0 || x.iter().any(|r| r.len() != dims) {
            return Err(Error::Algorithm("x-means: ragged or empty feature rows".into()));
        }

        let n = x.len() as f64;
        let mean: Vec<f64> = (0..dims).map(|d| x.iter().map(|r| r[d]).sum::<f64>() / n).collect();
        let scale: Vec<f64> = (0..dims)
            .map(|d| {
                let var = x.iter().map(|r| (r[d] - mean[d]).powi(2)).sum::<f64>() / n;
                if var > 0.0 { var.sqrt() } else { 1.0 }
            })
            .collect();
        let z: Vec<Vec<f64>> = x
            .iter()
            .map(|r| r.iter().zip(&mean).zip(&scale).map(|((v, m), s)| (v - m) / s).collect())
            .collect();

        let mut best: Option<(f64, Vec<Vec<f64>>)> = None;
        let mut scores = Vec::new();
        for k in params.k_min..=params.k_max.min(x.len() - 1) {
            let mut rng = ChaCha8Rng::seed_from_u64(params.seed.wrapping_add(k as u64));
            let init = kmeans_pp(&z, k, &mut rng);
            let (centroids, labels, iterations) = lloyd(&z, init, params.max_iterations.max(1));
            let score = bic(&z, &centroids, &labels);
            debug!(k, bic = score, iterations, "x-means candidate");
            scores.push(KScore {
                k,
                bic: score,
                iterations,
            });
            if best.as_ref().is_none_or(|(b, _)| score > *b) {
                best = Some((score, centroids));
            }
        }
        let (_, centroids) = best.ok_or_else(|| Error::Algorithm("x-means: no candidate k".into()))?;

        Ok(Self {
            centroids,
            mean,
            scale,
            bic: scores,
        })
    }

    pub fn k(&self) -> usize {
        self.centroids.len()
    }

    /// Cluster id of a raw (unscaled) feature vector.
    pub fn predict(&self, x: &[f64]) -> usize {
        let z: Vec<f64> = x
            .iter()
            .zip(&self.mean)
            .zip(&self.scale)
            .map(|((v, m), s)| (v - m) / s)
            .collect();
        nearest(&self.centroids, &z).0
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn blobs(centers: &[(f64, f64)], per: usize) -> Vec<Vec<f64>> {
        let mut out = Vec::new();
        for (i, (cx, cy)) in centers.iter().enumerate() {
            for j in 0..per {
                let a = (j * 7 + i) as f64 * 0.61;
                let r = (j % 5) as f64 * 0.08;
                out.push(vec![cx + r * a.cos(), cy + r * a.sin()]);
            }
        }
        out
    }

    #[test]
    fn test_picks_three_clusters() {
        let x = blobs(&[(0.0, 0.0), (10.0, 0.0), (0.0, 10.0)], 40);
        let m = XMeans::fit(&x, &XMeansParams::default()).unwrap();
        assert_eq!(m.k(), 3);
        assert_ne!(m.predict(&[0.0, 0.0]), m.predict(&[10.0, 0.0]));
        assert_eq!(m.predict(&[0.1, 0.1]), m.predict(&[0.0, 0.0]));
        assert_eq!(m.bic.len(), 9);
    }

    #[test]
    fn test_seeded() {
        let x = blobs(&[(0.0, 0.0), (5.0, 5.0)], 30);
        let a = XMeans::fit(&x, &XMeansParams::default()).unwrap();
        let b = XMeans::fit(&x, &XMeansParams::default()).unwrap();
        assert_eq!(a.k(), b.k());
        assert_eq!(a.predict(&[5.0, 5.0]), b.predict(&[5.0, 5.0]));
    }

    #[test]
    fn test_too_few_points() {
        let x = vec![vec![1.0], vec![2.0]];
        assert!(XMeans::fit(&x, &XMeansParams::default()).is_err());
    }
}
