//! Pipeline configuration
//!
//! Every tunable of the pipeline lives here and is passed explicitly into
//! each stage. Loaded from JSON by the CLI; missing fields take defaults.

use crate::covariates::band;
use crate::classification::PuThreshold;
use floodmap_core::raster::Connectivity;
use floodmap_core::{Error, Result, CRS};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// How a normalised covariate enters the susceptibility sum
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Contribution {
    /// Higher value, higher susceptibility
    Direct,
    /// Higher value, lower susceptibility: contributes `1 - norm`
    Inverse,
}

/// Store ids of the input layers
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct LayerIds {
    pub elevation: String,
    pub ksat: String,
    pub twi: String,
    pub hand: String,
    pub landcover: String,
    /// Line collections painted as drainage targets (unioned)
    pub drainage: Vec<String>,
    /// Polygon collection of mapped risk areas
    pub risk_areas: String,
    /// Optional polygon collection bounding the study area
    pub study_area: Option<String>,
}

impl Default for LayerIds {
    fn default() -> Self {
        Self {
            elevation: "elevation".into(),
            ksat: "ksat".into(),
            twi: "twi".into(),
            hand: "hand".into(),
            landcover: "landcover".into(),
            drainage: vec!["rivers".into(), "streams".into()],
            risk_areas: "risk_areas".into(),
            study_area: None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PipelineConfig {
    pub layers: LayerIds,
    /// Explicit study extent `[min_x, min_y, max_x, max_y]`; used when no
    /// study-area layer is configured
    pub study_bounds: Option<[f64; 4]>,
    /// Prefix of every layer id written by the pipeline
    pub output_prefix: String,

    // Grid
    pub target_resolution_m: f64,
    pub target_crs_epsg: u32,

    // Covariates
    pub elevation_nodata: f64,
    pub distance_search_radius_m: f64,
    pub drainage_buffer_m: f64,
    pub ksat_scale: f64,
    pub gap_fill_sentinel: f64,
    pub gap_fill_radius_px: usize,

    // Labels
    pub risk_attribute: String,
    pub risk_value: String,
    pub risk_buffer_m: f64,
    pub urban_class: u8,
    pub samples_unlabeled: usize,
    pub samples_positive: usize,
    pub sample_seed: u64,

    // PU refinement
    pub spy_fraction: f64,
    pub pu_threshold_policy: PuThreshold,
    pub pu_seed: u64,
    pub oversample: bool,
    pub smote_k: usize,
    /// Positives are oversampled up to this fraction of the unlabeled count
    pub smote_target_ratio: f64,

    // HAND slicer
    pub hand_thresholds_m: Vec<f64>,

    // Clusterer
    pub cluster_bands: Vec<String>,
    pub cluster_k_min: usize,
    pub cluster_k_max: usize,
    pub cluster_max_iterations: usize,
    pub cluster_seed: u64,
    /// Point known to lie in a flood-prone area, in grid CRS units
    pub cluster_reference_point: Option<[f64; 2]>,
    pub cluster_min_support_px: usize,

    // Random forest
    pub rf_bands: Vec<String>,
    pub rf_trees: usize,
    pub rf_max_depth: Option<usize>,
    pub rf_min_samples_split: usize,
    pub rf_min_per_class: usize,
    pub rf_bag_fraction: f64,
    pub rf_seed: u64,
    pub split_ratio: f64,
    pub split_seed: u64,

    // Post-processing and hotspots
    pub smoothing_radius_px: usize,
    pub connectivity: Connectivity,
    pub max_component_px: usize,
    pub min_hotspot_area_m2: f64,

    // Susceptibility
    pub contributions: BTreeMap<String, Contribution>,
    /// Threshold levels in percent, rendered in this order
    pub slice_levels: Vec<u8>,
    pub extra_percentiles: Vec<f64>,
    pub histogram_bins: usize,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        let contributions = [
            (band::SLOPE, Contribution::Inverse),
            (band::ELEVATION, Contribution::Inverse),
            (band::DISTANCE, Contribution::Inverse),
            (band::KSAT, Contribution::Inverse),
            (band::HAND, Contribution::Inverse),
            (band::TWI, Contribution::Direct),
        ]
        .into_iter()
        .map(|(k, v)| (k.to_string(), v))
        .collect();

        Self {
            layers: LayerIds::default(),
            study_bounds: None,
            output_prefix: "outputs".into(),
            target_resolution_m: 10.0,
            target_crs_epsg: 31983,
            elevation_nodata: -9999.0,
            distance_search_radius_m: 2500.0,
            drainage_buffer_m: 10.0,
            ksat_scale: 0.0001,
            gap_fill_sentinel: 1000.0,
            gap_fill_radius_px: 45,
            risk_attribute: "tipolo_g1".into(),
            risk_value: "Inundação".into(),
            risk_buffer_m: 200.0,
            urban_class: 24,
            samples_unlabeled: 39_000,
            samples_positive: 4_000,
            sample_seed: 42,
            spy_fraction: 0.15,
            pu_threshold_policy: PuThreshold::default(),
            pu_seed: 42,
            oversample: true,
            smote_k: 5,
            smote_target_ratio: 1.0,
            hand_thresholds_m: vec![3.0, 4.0, 5.0],
            cluster_bands: [band::ELEVATION, band::DISTANCE, band::SLOPE, band::HAND]
                .map(String::from)
                .to_vec(),
            cluster_k_min: 2,
            cluster_k_max: 10,
            cluster_max_iterations: 50,
            cluster_seed: 42,
            cluster_reference_point: None,
            cluster_min_support_px: 1,
            rf_bands: [
                band::ELEVATION,
                band::DISTANCE,
                band::SLOPE,
                band::KSAT,
                band::HAND,
                band::TWI,
            ]
            .map(String::from)
            .to_vec(),
            rf_trees: 100,
            rf_max_depth: None,
            rf_min_samples_split: 2,
            rf_min_per_class: 2,
            rf_bag_fraction: 0.5,
            rf_seed: 42,
            split_ratio: 0.8,
            split_seed: 42,
            smoothing_radius_px: 1,
            connectivity: Connectivity::Four,
            max_component_px: 1024,
            min_hotspot_area_m2: 3000.0,
            contributions,
            slice_levels: (75..=99).rev().collect(),
            extra_percentiles: Vec::new(),
            histogram_bins: 20,
        }
    }
}

impl PipelineConfig {
    pub fn from_json(text: &str) -> Result<Self> {
        let cfg: Self = serde_json::from_str(text)?;
        cfg.validate()?;
        Ok(cfg)
    }

    pub fn target_crs(&self) -> CRS {
        CRS::from_epsg(self.target_crs_epsg)
    }

    /// Store id for an output layer
    pub fn output_id(&self, name: &str) -> String {
        if self.output_prefix.is_empty() {
            name.to_string()
        } else {
            format!("{}/{}", self.output_prefix, name)
        }
    }

    /// Check every option against its precondition.
    pub fn validate(&self) -> Result<()> {
        positive("target_resolution_m", self.target_resolution_m)?;
        positive("distance_search_radius_m", self.distance_search_radius_m)?;
        non_negative("drainage_buffer_m", self.drainage_buffer_m)?;
        positive("ksat_scale", self.ksat_scale)?;
        positive("risk_buffer_m", self.risk_buffer_m)?;
        non_negative("min_hotspot_area_m2", self.min_hotspot_area_m2)?;
        unit_interval("spy_fraction", self.spy_fraction)?;
        unit_interval("split_ratio", self.split_ratio)?;
        if !(self.rf_bag_fraction > 0.0 && self.rf_bag_fraction <= 1.0) {
            return Err(Error::invalid_param("rf_bag_fraction", self.rf_bag_fraction, "must be in (0, 1]"));
        }
        positive("smote_target_ratio", self.smote_target_ratio)?;
        self.pu_threshold_policy.validate()?;

        if self.layers.study_area.is_none() && self.study_bounds.is_none() {
            return Err(Error::invalid_param(
                "study_bounds",
                "none",
                "either layers.study_area or study_bounds is required",
            ));
        }
        if let Some([x0, y0, x1, y1]) = self.study_bounds
            && !(x1 > x0 && y1 > y0)
        {
            return Err(Error::invalid_param(
                "study_bounds",
                format!("{:?}", self.study_bounds),
                "max must exceed min",
            ));
        }
        if self.hand_thresholds_m.is_empty() {
            return Err(Error::invalid_param("hand_thresholds_m", "[]", "at least one threshold"));
        }
        if let Some(h) = self.hand_thresholds_m.iter().find(|h| !(**h >= 0.0)) {
            return Err(Error::invalid_param("hand_thresholds_m", h, "thresholds must be >= 0"));
        }
        if self.cluster_k_min < 2 {
            return Err(Error::invalid_param("cluster_k_min", self.cluster_k_min, "must be >= 2"));
        }
        if self.cluster_k_min > self.cluster_k_max {
            return Err(Error::invalid_param(
                "cluster_k_max",
                self.cluster_k_max,
                format!("must be >= cluster_k_min ({})", self.cluster_k_min),
            ));
        }
        // cluster ids are written to u8 rasters alongside the 255 no-data code
        if self.cluster_k_max > 254 {
            return Err(Error::invalid_param("cluster_k_max", self.cluster_k_max, "must be <= 254"));
        }
        if self.rf_trees == 0 {
            return Err(Error::invalid_param("rf_trees", 0, "must be >= 1"));
        }
        if self.rf_min_per_class == 0 {
            return Err(Error::invalid_param("rf_min_per_class", 0, "must be >= 1"));
        }
        if self.smote_k == 0 {
            return Err(Error::invalid_param("smote_k", 0, "must be >= 1"));
        }
        if self.max_component_px == 0 {
            return Err(Error::invalid_param("max_component_px", 0, "must be >= 1"));
        }
        if self.samples_positive == 0 || self.samples_unlabeled == 0 {
            return Err(Error::invalid_param(
                "samples_positive",
                format!("{}:{}", self.samples_positive, self.samples_unlabeled),
                "both class sample counts must be positive",
            ));
        }
        if self.rf_bands.is_empty() {
            return Err(Error::invalid_param("rf_bands", "[]", "at least one band"));
        }
        if self.cluster_bands.is_empty() {
            return Err(Error::invalid_param("cluster_bands", "[]", "at least one band"));
        }
        if let Some(b) = self.rf_bands.iter().find(|b| !self.contributions.contains_key(*b)) {
            return Err(Error::invalid_param(
                "contributions",
                b,
                "every RF band needs a contribution direction",
            ));
        }
        if let Some(l) = self.slice_levels.iter().find(|l| !(1..=100).contains(*l)) {
            return Err(Error::invalid_param("slice_levels", l, "levels are percentages in 1..=100"));
        }
        if let Some(p) = self.extra_percentiles.iter().find(|p| !(0.0..=100.0).contains(*p)) {
            return Err(Error::invalid_param("extra_percentiles", p, "must be in [0, 100]"));
        }
        if self.histogram_bins == 0 {
            return Err(Error::invalid_param("histogram_bins", 0, "must be >= 1"));
        }
        Ok(())
    }
}

fn positive(name: &'static str, v: f64) -> Result<()> {
    if v > 0.0 && v.is_finite() {
        Ok(())
    } else {
        Err(Error::invalid_param(name, v, "must be positive"))
    }
}

fn non_negative(name: &'static str, v: f64) -> Result<()> {
    if v >= 0.0 && v.is_finite() {
        Ok(())
    } else {
        Err(Error::invalid_param(name, v, "must be >= 0"))
    }
}

fn unit_interval(name: &'static str, v: f64) -> Result<()> {
    if v > 0.0 && v < 1.0 {
        Ok(())
    } else {
        Err(Error::invalid_param(name, v, "must be in (0, 1)"))
    }
}
