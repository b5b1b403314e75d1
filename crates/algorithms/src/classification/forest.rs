//! Random forest of CART trees for binary labels
//!
//! Each tree sees a seeded subsample of the rows (`bag_fraction`, without
//! replacement; a full bootstrap with replacement when the fraction is 1)
//! and tries `sqrt(n_features)` random features per split. Splits minimise
//! weighted Gini impurity; feature importance is the total impurity decrease
//! per feature across the forest, normalised to sum to 1.

use crate::maybe_rayon::*;
use floodmap_core::sample::{FLOOD, NON_FLOOD};
use floodmap_core::{Error, Result};
use rand::seq::index;
use rand::{Rng, SeedableRng};
use rand_chacha::ChaCha8Rng;
use tracing::debug;

/// Parameters for random forest training
#[derive(Debug, Clone)]
pub struct ForestParams {
    pub n_trees: usize,
    pub max_depth: Option<usize>,
    pub min_samples_split: usize,
    /// Training fails when a class has fewer rows than this
    pub min_per_class: usize,
    pub bag_fraction: f64,
    /// Features tried per split; `None` for `sqrt(n_features)`
    pub features_per_split: Option<usize>,
    pub seed: u64,
}

impl Default for ForestParams {
    fn default() -> Self {
        Self {
            n_trees: 100,
            max_depth: None,
            min_samples_split: 2,
            min_per_class: 2,
            bag_fraction: 0.5,
            features_per_split: None,
            seed: 42,
        }
    }
}

#[derive(Debug, Clone)]
enum Node {
    Leaf {
        /// Fraction of class-1 rows that reached the leaf
        p_flood: f64,
    },
    Split {
        feature: usize,
        threshold: f64,
        left: Box<Node>,
        right: Box<Node>,
    },
}

impl Node {
    fn predict(&self, x: &[f64]) -> f64 {
        let mut node = self;
        loop {
            match node {
                Node::Leaf { p_flood } => return *p_flood,
                Node::Split {
                    feature,
                    threshold,
                    left,
                    right,
                } => {
                    node = if x[*feature] <= *threshold { left } else { right };
                }
            }
        }
    }

    fn depth(&self) -> usize {
        match self {
            Node::Leaf { .. } => 0,
            Node::Split { left, right, .. } => 1 + left.depth().max(right.depth()),
        }
    }
}

/// A trained forest
#[derive(Debug, Clone)]
pub struct RandomForest {
    trees: Vec<Node>,
    n_features: usize,
    importances: Vec<f64>,
}

fn gini(n0: usize, n1: usize) -> f64 {
    let n = (n0 + n1) as f64;
    if n == 0.0 {
        return 0.0;
    }
    let p0 = n0 as f64 / n;
    let p1 = n1 as f64 / n;
    1.0 - p0 * p0 - p1 * p1
}

struct TreeBuilder<'a> {
    x: &'a [Vec<f64>],
    y: &'a [u8],
    params: &'a ForestParams,
    mtry: usize,
    rng: ChaCha8Rng,
    importances: Vec<f64>,
}

impl TreeBuilder<'_> {
    fn build(&mut self, rows: Vec<usize>, depth: usize) -> Node {
        let n1 = rows.iter().filter(|i| self.y[**i] == FLOOD).count();
        let n0 = rows.len() - n1;
        let leaf = Node::Leaf {
            p_flood: n1 as f64 / rows.len().max(1) as f64,
        };
        if n0 == 0
            || n1 == 0
            || rows.len() < self.params.min_samples_split
            || self.params.max_depth.is_some_and(|d| depth >= d)
        {
            return leaf;
        }

        let n_features = self.x[0].len();
        let features = index::sample(&mut self.rng, n_features, self.mtry).into_vec();
        let Some((feature, threshold, decrease)) = self.best_split(&rows, &features, n0, n1) else {
            return leaf;
        };
        self.importances[feature] += decrease;

        let (left, right): (Vec<usize>, Vec<usize>) = rows.into_iter().partition(|i| self.x[*i][feature] <= threshold);
        Node::Split {
            feature,
            threshold,
            left: Box::new(self.build(left, depth + 1)),
            right: Box::new(self.build(right, depth + 1)),
        }
    }

    /// Best `(feature, threshold, weighted impurity decrease)`.
    fn best_split(&self, rows: &[usize], features: &[usize], n0: usize, n1: usize) -> Option<(usize, f64, f64)> {
        let n = rows.len() as f64;
        let parent = n * gini(n0, n1);
        let mut best: Option<(usize, f64, f64)> = None;
        let mut column: Vec<(f64, u8)> = Vec::with_capacity(rows.len());

        for &f in features {
            column.clear();
            column.extend(rows.iter().map(|i| (self.x[*i][f], self.y[*i])));
            column.sort_by(|a, b| a.0.total_cmp(&b.0));

            let (mut l0, mut l1) = (0usize, 0usize);
            for k in 0..column.len() - 1 {
                if column[k].1 == FLOOD {
                    l1 += 1;
                } else {
                    l0 += 1;
                }
                if column[k].0 == column[k + 1].0 {
                    continue;
                }
                let (r0, r1) = (n0 - l0, n1 - l1);
                let child = (l0 + l1) as f64 * gini(l0, l1) + (r0 + r1) as f64 * gini(r0, r1);
                let decrease = parent - child;
                if decrease > 1e-12 && best.is_none_or(|(_, _, d)| decrease > d) {
                    best = Some((f, (column[k].0 + column[k + 1].0) / 2.0, decrease));
                }
            }
        }
        best
    }
}

impl RandomForest {
    /// Train on feature rows `x` with labels `y` in {0, 1}.
    pub fn fit(x: &[Vec<f64>], y: &[u8], params: &ForestParams) -> Result<Self> {
        if params.n_trees == 0 {
            return Err(Error::invalid_param("rf_trees", 0, "must be >= 1"));
        }
        if !(params.bag_fraction > 0.0 && params.bag_fraction <= 1.0) {
            return Err(Error::invalid_param("rf_bag_fraction", params.bag_fraction, "must be in (0, 1]"));
        }
        if x.len() != y.len() {
            return Err(Error::Algorithm(format!("random forest: {} rows but {} labels", x.len(), y.len())));
        }
        for class in [NON_FLOOD, FLOOD] {
            let found = y.iter().filter(|l| **l == class).count();
            if found < params.min_per_class {
                return Err(Error::InsufficientSamples {
                    stage: "random forest training",
                    class,
                    found,
                    required: params.min_per_class,
                });
            }
        }
        let n_features = x[0].len();
        if n_features == 0 || x.iter().any(|r| r.len() != n_features) {
            return Err(Error::Algorithm("random forest: ragged or empty feature rows".into()));
        }

        let mtry = params
            .features_per_split
            .unwrap_or_else(|| (n_features as f64).sqrt().floor() as usize)
            .clamp(1, n_features);
        let n = x.len();
        let bag = ((params.bag_fraction * n as f64).round() as usize).clamp(1, n);

        let grown: Vec<(Node, Vec<f64>)> = (0..params.n_trees)
            .into_par_iter()
            .map(|t| {
                let mut rng = ChaCha8Rng::seed_from_u64(params.seed.wrapping_add(t as u64));
                let rows: Vec<usize> = if bag == n {
                    (0..n).map(|_| rng.gen_range(0..n)).collect()
                } else {
                    index::sample(&mut rng, n, bag).into_vec()
                };
                let mut builder = TreeBuilder {
                    x,
                    y,
                    params,
                    mtry,
                    rng,
                    importances: vec![0.0; n_features],
                };
                let root = builder.build(rows, 0);
                (root, builder.importances)
            })
            .collect();

        let mut importances = vec![0.0; n_features];
        let mut trees = Vec::with_capacity(grown.len());
        for (tree, imp) in grown {
            for (total, v) in importances.iter_mut().zip(imp) {
                *total += v;
            }
            trees.push(tree);
        }
        let sum: f64 = importances.iter().sum();
        if sum > 0.0 {
            importances.iter_mut().for_each(|v| *v /= sum);
        }

        debug!(
            trees = trees.len(),
            mtry,
            bag,
            max_depth = trees.iter().map(Node::depth).max().unwrap_or(0),
            "random forest trained"
        );
        Ok(Self {
            trees,
            n_features,
            importances,
        })
    }

    pub fn n_features(&self) -> usize {
        self.n_features
    }

    /// Mean of the trees' leaf class-1 fractions.
    pub fn predict_proba(&self, x: &[f64]) -> f64 {
        self.trees.iter().map(|t| t.predict(x)).sum::<f64>() / self.trees.len() as f64
    }

    /// Majority vote of the trees; ties go to non-flood.
    pub fn predict(&self, x: &[f64]) -> u8 {
        let votes = self.trees.iter().filter(|t| t.predict(x) > 0.5).count();
        u8::from(2 * votes > self.trees.len())
    }

    /// Mean decrease in Gini impurity per feature, summing to 1 (all zero
    /// when no split was ever made).
    pub fn feature_importances(&self) -> &[f64] {
        &self.importances
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    /// Label depends only on feature 0; feature 1 is noise.
    fn data() -> (Vec<Vec<f64>>, Vec<u8>) {
        let mut x = Vec::new();
        let mut y = Vec::new();
        for i in 0..200 {
            let a = i as f64 / 10.0;
            let noise = ((i * 37) % 11) as f64;
            x.push(vec![a, noise]);
            y.push(u8::from(a > 10.0));
        }
        (x, y)
    }

    #[test]
    fn test_learns_threshold() {
        let (x, y) = data();
        let rf = RandomForest::fit(&x, &y, &ForestParams { n_trees: 20, ..Default::default() }).unwrap();
        assert_eq!(rf.predict(&[2.0, 5.0]), 0);
        assert_eq!(rf.predict(&[18.0, 5.0]), 1);
        assert!(rf.predict_proba(&[18.0, 5.0]) > 0.9);
    }

    #[test]
    fn test_importances_normalized_and_informative() {
        let (x, y) = data();
        let rf = RandomForest::fit(&x, &y, &ForestParams { n_trees: 30, ..Default::default() }).unwrap();
        let imp = rf.feature_importances();
        assert!((imp.iter().sum::<f64>() - 1.0).abs() < 1e-9);
        assert!(imp[0] > imp[1]);
    }

    #[test]
    fn test_seeded() {
        let (x, y) = data();
        let p = ForestParams { n_trees: 5, ..Default::default() };
        let a = RandomForest::fit(&x, &y, &p).unwrap();
        let b = RandomForest::fit(&x, &y, &p).unwrap();
        assert_eq!(a.feature_importances(), b.feature_importances());
    }

    #[test]
    fn test_insufficient_class() {
        let x = vec![vec![0.0], vec![1.0], vec![2.0]];
        let y = vec![0, 0, 1];
        match RandomForest::fit(&x, &y, &ForestParams::default()) {
            Err(Error::InsufficientSamples { class, found, required, .. }) => {
                assert_eq!((class, found, required), (1, 1, 2));
            }
            other => panic!("unexpected {other:?}"),
        }
    }

    #[test]
    fn test_gini() {
        assert_eq!(gini(5, 5), 0.5);
        assert_eq!(gini(4, 0), 0.0);
    }
}
