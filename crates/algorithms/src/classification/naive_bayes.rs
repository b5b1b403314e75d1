//! Gaussian naive Bayes for two classes
//!
//! Used by the PU refiner to score unlabeled points. Each feature is modelled
//! per class as an independent normal distribution:
//!
//! `log P(c|x) = log P(c) + Σ_i [ -0.5 ln(2πσ²_ci) - (x_i - μ_ci)² / (2σ²_ci) ] + const`

use floodmap_core::{Error, Result};

/// Portion of the largest feature variance added to every variance
const VAR_SMOOTHING: f64 = 1e-9;

/// A fitted two-class Gaussian naive Bayes model
#[derive(Debug, Clone)]
pub struct GaussianNb {
    log_priors: [f64; 2],
    means: [Vec<f64>; 2],
    variances: [Vec<f64>; 2],
}

impl GaussianNb {
    /// Fit on feature rows `x` with labels `y` in {0, 1}.
    pub fn fit(x: &[Vec<f64>], y: &[u8]) -> Result<Self> {
        if x.len() != y.len() {
            return Err(Error::Algorithm(format!(
                "naive Bayes: {} rows but {} labels",
                x.len(),
                y.len()
            )));
        }
        let width = x.first().map_or(0, Vec::len);
        if width == 0 {
            return Err(Error::Algorithm("naive Bayes: no features".into()));
        }

        let mut counts = [0usize; 2];
        let mut sums = [vec![0.0; width], vec![0.0; width]];
        for (row, &label) in x.iter().zip(y) {
            if label > 1 {
                return Err(Error::invalid_param("label", label, "naive Bayes labels must be 0 or 1"));
            }
            let c = label as usize;
            counts[c] += 1;
            for (s, v) in sums[c].iter_mut().zip(row) {
                *s += v;
            }
        }
        for (class, &n) in counts.iter().enumerate() {
            if n == 0 {
                return Err(Error::InsufficientSamples {
                    stage: "naive Bayes",
                    class: class as u8,
                    found: 0,
                    required: 1,
                });
            }
        }

        let means = [0, 1].map(|c| sums[c].iter().map(|s| s / counts[c] as f64).collect::<Vec<_>>());

        let mut variances = [vec![0.0; width], vec![0.0; width]];
        for (row, &label) in x.iter().zip(y) {
            let c = label as usize;
            for ((var, v), m) in variances[c].iter_mut().zip(row).zip(&means[c]) {
                let d = v - m;
                *var += d * d;
            }
        }
        let mut max_var = 0.0_f64;
        for c in 0..2 {
            for var in variances[c].iter_mut() {
                *var /= counts[c] as f64;
                max_var = max_var.max(*var);
            }
        }
        let epsilon = (VAR_SMOOTHING * max_var).max(f64::MIN_POSITIVE);
        for var in variances.iter_mut().flatten() {
            *var += epsilon;
        }

        let n = x.len() as f64;
        Ok(Self {
            log_priors: [(counts[0] as f64 / n).ln(), (counts[1] as f64 / n).ln()],
            means,
            variances,
        })
    }

    pub fn n_features(&self) -> usize {
        self.means[0].len()
    }

    /// Posterior probability of class 1.
    pub fn predict_proba(&self, x: &[f64]) -> f64 {
        let mut log_post = self.log_priors;
        for (c, lp) in log_post.iter_mut().enumerate() {
            for ((v, m), var) in x.iter().zip(&self.means[c]).zip(&self.variances[c]) {
                let d = v - m;
                *lp += -0.5 * (2.0 * std::f64::consts::PI * var).ln() - d * d / (2.0 * var);
            }
        }
        // log-sum-exp
        let max = log_post[0].max(log_post[1]);
        let e0 = (log_post[0] - max).exp();
        let e1 = (log_post[1] - max).exp();
        e1 / (e0 + e1)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn data() -> (Vec<Vec<f64>>, Vec<u8>) {
        let mut x = Vec::new();
        let mut y = Vec::new();
        for i in 0..20 {
            let jitter = (i % 5) as f64 * 0.1;
            x.push(vec![0.0 + jitter, 1.0 - jitter]);
            y.push(0);
            x.push(vec![5.0 + jitter, 6.0 - jitter]);
            y.push(1);
        }
        (x, y)
    }

    #[test]
    fn test_separates_classes() {
        let (x, y) = data();
        let nb = GaussianNb::fit(&x, &y).unwrap();
        assert_eq!(nb.n_features(), 2);
        assert!(nb.predict_proba(&[5.1, 5.9]) > 0.99);
        assert!(nb.predict_proba(&[0.1, 0.9]) < 0.01);
        let mid = nb.predict_proba(&[2.7, 3.3]);
        assert!(mid > 0.0 && mid < 1.0);
    }

    #[test]
    fn test_constant_feature_does_not_blow_up() {
        let x = vec![vec![1.0, 0.0], vec![1.0, 0.1], vec![1.0, 5.0], vec![1.0, 5.1]];
        let y = vec![0, 0, 1, 1];
        let nb = GaussianNb::fit(&x, &y).unwrap();
        let p = nb.predict_proba(&[1.0, 5.0]);
        assert!(p.is_finite() && p > 0.5);
    }

    #[test]
    fn test_missing_class() {
        let x = vec![vec![1.0], vec![2.0]];
        assert!(matches!(
            GaussianNb::fit(&x, &[0, 0]),
            Err(Error::InsufficientSamples { class: 1, .. })
        ));
    }
}
