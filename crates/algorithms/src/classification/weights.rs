//! Covariate weights derived from forest importances

use floodmap_core::{Error, Result};
use serde::{Deserialize, Serialize};
use tracing::warn;

/// Non-negative per-covariate weights summing to 1.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FeatureWeights {
    entries: Vec<(String, f64)>,
}

impl FeatureWeights {
    /// Normalise raw importances. All-zero importances (a forest that never
    /// split) fall back to equal weights.
    pub fn from_importances<S: AsRef<str>>(names: &[S], importances: &[f64]) -> Result<Self> {
        if names.len() != importances.len() || names.is_empty() {
            return Err(Error::Algorithm(format!(
                "{} covariate names for {} importances",
                names.len(),
                importances.len()
            )));
        }
        if let Some(v) = importances.iter().find(|v| !(**v >= 0.0 && v.is_finite())) {
            return Err(Error::invalid_param("importances", v, "must be finite and >= 0"));
        }
        let sum: f64 = importances.iter().sum();
        let entries = if sum > 0.0 {
            names
                .iter()
                .zip(importances)
                .map(|(n, v)| (n.as_ref().to_string(), v / sum))
                .collect()
        } else {
            warn!("all importances are zero, using equal weights");
            let w = 1.0 / names.len() as f64;
            names.iter().map(|n| (n.as_ref().to_string(), w)).collect()
        };
        Ok(Self { entries })
    }

    pub fn get(&self, name: &str) -> Option<f64> {
        self.entries.iter().find(|(n, _)| n == name).map(|(_, w)| *w)
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, f64)> {
        self.entries.iter().map(|(n, w)| (n.as_str(), *w))
    }

    pub fn names(&self) -> Vec<&str> {
        self.entries.iter().map(|(n, _)| n.as_str()).collect()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn sum(&self) -> f64 {
        self.entries.iter().map(|(_, w)| w).sum()
    }
}
