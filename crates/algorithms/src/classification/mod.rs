//! Label refinement and flood classification
//!
//! - **PU refinement**: spy technique over SMOTE-oversampled positives,
//!   scored with Gaussian naive Bayes
//! - **HAND slicer**: height-above-drainage threshold rule
//! - **X-means**: k-means with BIC-selected k, one cluster mapped to flood
//! - **Random forest**: CART ensemble with Gini importances
//! - **Accuracy**: error matrices with kappa, producer's and consumer's accuracy

mod ensemble;
mod forest;
mod metrics;
mod naive_bayes;
mod pu;
mod smote;
mod split;
mod weights;
mod xmeans;

pub use ensemble::{
    cluster_classify, hand_slice, rf_classify, ClassifiedRaster, ClusterParams, ClusterReport, FloodClusterRule,
    Method, RfParams, RfReport, CLASS_NODATA,
};
pub use forest::{ForestParams, RandomForest};
pub use metrics::ErrorMatrix;
pub use naive_bayes::GaussianNb;
pub use pu::{refine_labels, PuParams, PuReport, PuThreshold};
pub use smote::smote;
pub use split::{SplitSummary, TrainingSet};
pub use weights::FeatureWeights;
pub use xmeans::{KScore, XMeans, XMeansParams};
