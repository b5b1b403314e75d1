//! End-to-end run: inputs to hotspots, susceptibility and validation
//!
//! Every stage is computed before anything is written, so a failing stage
//! leaves the store untouched.

use crate::classification::{
    cluster_classify, hand_slice, refine_labels, rf_classify, ClassifiedRaster, ClusterParams, ClusterReport,
    FeatureWeights, PuParams, PuReport, RfParams, RfReport,
};
use crate::config::PipelineConfig;
use crate::covariates::{band, build_feature_stack, load_inputs, CovariateReport};
use crate::hotspots::{extract_hotspots, urban_mask, HotspotParams, HotspotReport, HotspotSet};
use crate::sampling::{sample_labels, SamplingParams, SamplingReport};
use crate::susceptibility::{
    risk_sectors, susceptibility_index, validate_hotspots, SusceptibilityParams, SusceptibilityReport,
    SusceptibilitySurface, ThresholdSlice, ValidationReport,
};
use floodmap_core::raster::{Raster, RasterElement, ResampleMethod};
use floodmap_core::store::{RasterStore, VectorStore, WriteOptions};
use floodmap_core::{FeatureStack, Result, SampleTable};
use serde::Serialize;
use tracing::info;

/// Flood pixel count of one HAND slice
#[derive(Debug, Clone, Serialize)]
pub struct HandReport {
    pub threshold_m: f64,
    pub flood_pixels: usize,
}

/// Everything a run decided, serialised as the run report
#[derive(Debug, Clone, Serialize)]
pub struct RunReport {
    pub config: PipelineConfig,
    pub covariates: CovariateReport,
    pub sampling: SamplingReport,
    pub pu: PuReport,
    pub hand: Vec<HandReport>,
    pub cluster: ClusterReport,
    pub random_forest: RfReport,
    pub hotspots: Vec<HotspotReport>,
    pub susceptibility: SusceptibilityReport,
    pub validation: ValidationReport,
    /// Store ids written, in write order
    pub written: Vec<String>,
}

/// In-memory products of a run
#[derive(Debug, Clone)]
pub struct PipelineRun {
    /// Covariates plus one band per classifier, sealed
    pub stack: FeatureStack,
    pub samples: SampleTable,
    pub refined: SampleTable,
    /// HAND slices, cluster, random forest
    pub classified: Vec<ClassifiedRaster>,
    /// Same order as `classified`
    pub hotspots: Vec<HotspotSet>,
    pub weights: FeatureWeights,
    pub surface: SusceptibilitySurface,
    /// Surface restricted to the random forest hotspots
    pub surface_rf_hotspots: Raster<f64>,
    pub slices: Vec<ThresholdSlice>,
    pub report: RunReport,
}

/// Run every stage over the layers in `store`. Nothing is written.
pub fn run<S>(store: &S, cfg: &PipelineConfig) -> Result<PipelineRun>
where
    S: RasterStore + VectorStore,
{
    cfg.validate()?;

    let inputs = load_inputs(store, cfg)?;
    let (mut stack, covariates) = build_feature_stack(&inputs, cfg)?;
    info!(bands = stack.len(), "feature stack built");

    let (samples, sampling) = sample_labels(&stack, &SamplingParams::from_config(cfg))?;
    let (refined, pu) = refine_labels(&samples, &PuParams::from_config(cfg))?;

    let mut classified = Vec::new();
    let mut hand = Vec::new();
    for &h in &cfg.hand_thresholds_m {
        let c = hand_slice(&stack, h)?;
        hand.push(HandReport {
            threshold_m: h,
            flood_pixels: c.flood_pixels(),
        });
        classified.push(c);
    }
    let (cluster_raster, cluster) = cluster_classify(&stack, &refined, &ClusterParams::from_config(cfg))?;
    classified.push(cluster_raster);
    let (rf_raster, _model, random_forest) = rf_classify(&stack, &refined, &RfParams::from_config(cfg))?;
    let weights = random_forest.weights.clone();
    classified.push(rf_raster);

    let urban = urban_mask(&stack, cfg.urban_class)?;
    let hotspot_params = HotspotParams::from_config(cfg);
    let hotspots = classified
        .iter()
        .map(|c| extract_hotspots(c, &urban, stack.grid(), &hotspot_params))
        .collect::<Result<Vec<_>>>()?;

    let susceptibility_params = SusceptibilityParams::from_config(cfg);
    let (surface, susceptibility) = susceptibility_index(&stack, &weights, cfg.urban_class, &susceptibility_params)?;
    let slices = surface.threshold_slices(&cfg.slice_levels, cfg.smoothing_radius_px)?;

    let sectors = risk_sectors(&stack, cfg.urban_class)?;
    let validation = validate_hotspots(&hotspots, &sectors, stack.grid())?;
    let rf_hotspots = hotspots
        .last()
        .map(|h| h.mask.clone())
        .unwrap_or_else(|| stack.grid().raster(0u8));
    let surface_rf_hotspots = surface.masked_by(&rf_hotspots)?;

    for c in &classified {
        stack.append(c.method.name(), to_f64(&c.raster))?;
    }
    stack.seal();

    let report = RunReport {
        config: cfg.clone(),
        covariates,
        sampling,
        pu,
        hand,
        cluster,
        random_forest,
        hotspots: hotspots.iter().map(|h| h.report.clone()).collect(),
        susceptibility,
        validation,
        written: Vec::new(),
    };

    Ok(PipelineRun {
        stack,
        samples,
        refined,
        classified,
        hotspots,
        weights,
        surface,
        surface_rf_hotspots,
        slices,
        report,
    })
}

/// Widen a mask or label raster for the store; nodata becomes NaN.
pub fn to_f64<T: RasterElement + Into<f64>>(raster: &Raster<T>) -> Raster<f64> {
    let nodata = raster.nodata();
    raster.map(Some(f64::NAN), |v| if v.is_nodata(nodata) { f64::NAN } else { v.into() })
}

/// Write the raster products of a run; returns the ids written.
pub fn write_outputs<S: RasterStore>(store: &mut S, run: &PipelineRun, cfg: &PipelineConfig) -> Result<Vec<String>> {
    let continuous = WriteOptions {
        crs: Some(cfg.target_crs()),
        method: ResampleMethod::Bilinear,
        ..Default::default()
    };
    let categorical = WriteOptions {
        method: ResampleMethod::Nearest,
        ..continuous.clone()
    };

    let mut written = Vec::new();
    let mut put = |id: String, raster: &Raster<f64>, opts: &WriteOptions| -> Result<()> {
        store.write(&id, raster, opts)?;
        written.push(id);
        Ok(())
    };

    for (name, raster) in run.stack.iter() {
        // classifier bands appended after the covariates are categorical too
        let is_continuous = band::ORDER.contains(&name) && name != band::LANDCOVER && name != band::CLASS;
        let opts = if is_continuous { &continuous } else { &categorical };
        put(cfg.output_id(&format!("stack/{name}")), raster, opts)?;
    }
    for (c, h) in run.classified.iter().zip(&run.hotspots) {
        let name = c.method.name();
        put(cfg.output_id(&format!("hotspots/{name}")), &to_f64(&h.mask), &categorical)?;
        put(cfg.output_id(&format!("hotspot_labels/{name}")), &to_f64(&h.labels), &categorical)?;
    }
    put(cfg.output_id("susceptibility"), run.surface.raster(), &continuous)?;
    put(cfg.output_id("susceptibility_rf_hotspots"), &run.surface_rf_hotspots, &continuous)?;

    info!(layers = written.len(), "outputs written");
    Ok(written)
}

/// Run the pipeline and write its rasters to `store`.
pub fn run_pipeline<S>(store: &mut S, cfg: &PipelineConfig) -> Result<PipelineRun>
where
    S: RasterStore + VectorStore,
{
    let mut run = run(store, cfg)?;
    run.report.written = write_outputs(store, &run, cfg)?;
    Ok(run)
}
