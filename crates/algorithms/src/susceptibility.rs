//! Susceptibility index and validation against mapped risk areas
//!
//! The surface is the importance-weighted sum of covariates min/max
//! normalised over a reference region (risk buffer, urban, below the highest
//! elevation in the buffer). Each covariate enters directly or as
//! `1 - norm`. The sum is smoothed with a 3x3 mean.

use crate::classification::FeatureWeights;
use crate::config::{Contribution, PipelineConfig};
use crate::covariates::band;
use crate::hotspots::{urban_mask, HotspotSet};
use crate::maybe_rayon::*;
use crate::statistics::{describe, focal_mean, mask_and, zonal_summary, zone_area_m2, DescriptiveStats};
use floodmap_core::raster::{GridSpec, Raster};
use floodmap_core::{Error, FeatureStack, Result};
use ndarray::Array2;
use serde::Serialize;
use std::collections::BTreeMap;
use tracing::{debug, info, warn};

const M2_PER_HA: f64 = 10_000.0;

/// Parameters for the susceptibility surface
#[derive(Debug, Clone)]
pub struct SusceptibilityParams {
    pub contributions: BTreeMap<String, Contribution>,
    /// Mean-filter radius; 0 disables smoothing
    pub smoothing_radius: usize,
    pub extra_percentiles: Vec<f64>,
    pub histogram_bins: usize,
}

impl Default for SusceptibilityParams {
    fn default() -> Self {
        let cfg = PipelineConfig::default();
        Self::from_config(&cfg)
    }
}

impl SusceptibilityParams {
    pub fn from_config(cfg: &PipelineConfig) -> Self {
        Self {
            contributions: cfg.contributions.clone(),
            smoothing_radius: cfg.smoothing_radius_px,
            extra_percentiles: cfg.extra_percentiles.clone(),
            histogram_bins: cfg.histogram_bins,
        }
    }
}

/// How one covariate was normalised
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct BandNormalization {
    pub band: String,
    pub contribution: Contribution,
    pub weight: f64,
    pub min: f64,
    pub max: f64,
    /// Constant (or empty) over the reference region; contributes 0
    pub non_normalizable: bool,
}

#[derive(Debug, Clone, Serialize)]
pub struct SusceptibilityReport {
    pub reference_pixels: usize,
    pub reference_max_elevation: f64,
    pub bands: Vec<BandNormalization>,
    /// Sum of the weights that actually contributed
    pub effective_weight: f64,
    pub statistics: DescriptiveStats,
}

/// Continuous susceptibility in [0, 1]; NaN where a covariate is missing.
#[derive(Debug, Clone)]
pub struct SusceptibilitySurface {
    raster: Raster<f64>,
}

impl SusceptibilitySurface {
    pub fn raster(&self) -> &Raster<f64> {
        &self.raster
    }

    /// Binary slice `value >= level / 100`, smoothed with the surface's
    /// mean filter radius. The surface itself is not touched.
    pub fn threshold_slice(&self, level: u8, smoothing_radius: usize) -> Result<ThresholdSlice> {
        if !(1..=100).contains(&level) {
            return Err(Error::invalid_param("slice_levels", level, "levels are percentages in 1..=100"));
        }
        let cut = f64::from(level) / 100.0;
        let binary = self
            .raster
            .map(Some(f64::NAN), |v| if v.is_nan() { f64::NAN } else if v >= cut { 1.0 } else { 0.0 });
        let raster = if smoothing_radius > 0 {
            focal_mean(&binary, smoothing_radius)?
        } else {
            binary
        };
        Ok(ThresholdSlice { level, raster })
    }

    /// Slices in the given level order.
    pub fn threshold_slices(&self, levels: &[u8], smoothing_radius: usize) -> Result<Vec<ThresholdSlice>> {
        levels.iter().map(|l| self.threshold_slice(*l, smoothing_radius)).collect()
    }

    /// Surface restricted to the non-zero cells of `mask`.
    pub fn masked_by(&self, mask: &Raster<u8>) -> Result<Raster<f64>> {
        let (er, ec) = self.raster.shape();
        let (ar, ac) = mask.shape();
        if (er, ec) != (ar, ac) {
            return Err(Error::SizeMismatch { er, ec, ar, ac });
        }
        let nodata = mask.nodata();
        let data: Vec<f64> = self
            .raster
            .data()
            .iter()
            .zip(mask.data().iter())
            .map(|(v, m)| if *m != 0 && Some(*m) != nodata { *v } else { f64::NAN })
            .collect();
        self.raster.derive(data, Some(f64::NAN))
    }
}

/// One threshold slice of the surface
#[derive(Debug, Clone)]
pub struct ThresholdSlice {
    pub level: u8,
    pub raster: Raster<f64>,
}

/// Cells inside the labelled risk buffer (class 0 or 1).
pub fn risk_buffer(stack: &FeatureStack) -> Result<Raster<u8>> {
    Ok(stack.band(band::CLASS)?.map(None, |v| u8::from(!v.is_nan())))
}

/// Urban cells inside mapped risk polygons (class 1).
pub fn risk_sectors(stack: &FeatureStack, urban_class: u8) -> Result<Raster<u8>> {
    let inside = stack.band(band::CLASS)?.map(None, |v| u8::from(v == 1.0));
    mask_and(&inside, &urban_mask(stack, urban_class)?)
}

/// Normalisation region: risk buffer, urban, and elevation no higher than
/// the highest elevation found inside the buffer.
pub fn reference_region(stack: &FeatureStack, urban_class: u8) -> Result<(Raster<u8>, f64)> {
    let buffer = risk_buffer(stack)?;
    let elevation = stack.band(band::ELEVATION)?;
    let max_elevation = zonal_summary(elevation, &buffer)?
        .map(|s| s.max)
        .ok_or_else(|| Error::EmptyGeometry {
            what: "risk buffer (no valid elevation)".into(),
        })?;
    let low = elevation.map(None, |v| u8::from(v <= max_elevation));
    let region = mask_and(&mask_and(&buffer, &urban_mask(stack, urban_class)?)?, &low)?;
    if !region.data().iter().any(|v| *v == 1) {
        return Err(Error::EmptyGeometry {
            what: "susceptibility reference region (risk buffer x urban)".into(),
        });
    }
    Ok((region, max_elevation))
}

/// Build the susceptibility surface from `weights` over `stack`.
pub fn build_susceptibility(
    stack: &FeatureStack,
    weights: &FeatureWeights,
    region: &Raster<u8>,
    params: &SusceptibilityParams,
) -> Result<(SusceptibilitySurface, Vec<BandNormalization>)> {
    let grid = stack.grid();
    grid.ensure_matches("reference region", region)?;

    let mut norms = Vec::with_capacity(weights.len());
    let mut bands = Vec::with_capacity(weights.len());
    for (name, weight) in weights.iter() {
        let contribution = *params.contributions.get(name).ok_or_else(|| {
            Error::invalid_param("contributions", name, "no contribution direction for this covariate")
        })?;
        let raster = stack.band(name)?;
        let summary = zonal_summary(raster, region)?;
        let (min, max) = summary.map_or((f64::NAN, f64::NAN), |s| (s.min, s.max));
        let non_normalizable = !(max > min);
        if non_normalizable {
            let err = Error::NonNormalizable {
                band: name.to_string(),
                value: min,
            };
            warn!(band = name, "{err}; contributes 0");
        }
        debug!(band = name, weight, min, max, ?contribution, "normalisation");
        norms.push(BandNormalization {
            band: name.to_string(),
            contribution,
            weight,
            min,
            max,
            non_normalizable,
        });
        bands.push(raster);
    }

    let (rows, cols) = grid.shape();
    let output_data: Vec<f64> = (0..rows)
        .into_par_iter()
        .flat_map(|row| {
            let mut row_data = vec![f64::NAN; cols];
            'cell: for (col, out) in row_data.iter_mut().enumerate() {
                let mut sum = 0.0;
                for (raster, n) in bands.iter().zip(&norms) {
                    let v = unsafe { raster.get_unchecked(row, col) };
                    if v.is_nan() {
                        continue 'cell;
                    }
                    if n.non_normalizable {
                        continue;
                    }
                    let norm = ((v - n.min) / (n.max - n.min)).clamp(0.0, 1.0);
                    let term = match n.contribution {
                        Contribution::Direct => norm,
                        Contribution::Inverse => 1.0 - norm,
                    };
                    sum += n.weight * term;
                }
                *out = sum.clamp(0.0, 1.0);
            }
            row_data
        })
        .collect();

    let mut raw = grid.raster(f64::NAN);
    raw.set_nodata(Some(f64::NAN));
    *raw.data_mut() = Array2::from_shape_vec((rows, cols), output_data).map_err(|e| Error::Other(e.to_string()))?;

    let raster = if params.smoothing_radius > 0 {
        focal_mean(&raw, params.smoothing_radius)?
    } else {
        raw
    };
    Ok((SusceptibilitySurface { raster }, norms))
}

/// Reference region, surface and statistics in one call.
pub fn susceptibility_index(
    stack: &FeatureStack,
    weights: &FeatureWeights,
    urban_class: u8,
    params: &SusceptibilityParams,
) -> Result<(SusceptibilitySurface, SusceptibilityReport)> {
    let (region, reference_max_elevation) = reference_region(stack, urban_class)?;
    let reference_pixels = region.data().iter().filter(|v| **v == 1).count();
    let (surface, bands) = build_susceptibility(stack, weights, &region, params)?;
    let statistics = describe(surface.raster(), &params.extra_percentiles, params.histogram_bins)?;
    let effective_weight = bands.iter().filter(|b| !b.non_normalizable).map(|b| b.weight).sum();

    info!(
        reference_pixels,
        mean = statistics.mean,
        median = statistics.median,
        effective_weight,
        "susceptibility surface built"
    );
    Ok((
        surface,
        SusceptibilityReport {
            reference_pixels,
            reference_max_elevation,
            bands,
            effective_weight,
            statistics,
        },
    ))
}

/// Hotspot coverage of the urban risk sectors for one method
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Coverage {
    pub method: String,
    pub hotspot_area_ha: f64,
    pub overlap_area_ha: f64,
    /// Overlap as a percentage of the reference area
    pub coverage_pct: f64,
}

#[derive(Debug, Clone, Serialize)]
pub struct ValidationReport {
    pub reference_area_ha: f64,
    pub methods: Vec<Coverage>,
}

/// Share of the urban risk sectors covered by each hotspot set.
pub fn validate_hotspots(sets: &[HotspotSet], sectors: &Raster<u8>, grid: &GridSpec) -> Result<ValidationReport> {
    let reference_area_ha = zone_area_m2(sectors, grid)? / M2_PER_HA;
    if reference_area_ha <= 0.0 {
        return Err(Error::EmptyGeometry {
            what: "urban risk sectors".into(),
        });
    }
    let mut methods = Vec::with_capacity(sets.len());
    for set in sets {
        let overlap = mask_and(&set.mask, sectors)?;
        let overlap_area_ha = zone_area_m2(&overlap, grid)? / M2_PER_HA;
        let coverage = Coverage {
            method: set.report.method.clone(),
            hotspot_area_ha: set.report.kept_area_m2 / M2_PER_HA,
            overlap_area_ha,
            coverage_pct: overlap_area_ha / reference_area_ha * 100.0,
        };
        info!(
            method = %coverage.method,
            overlap_ha = coverage.overlap_area_ha,
            coverage_pct = coverage.coverage_pct,
            "risk sector coverage"
        );
        methods.push(coverage);
    }
    Ok(ValidationReport {
        reference_area_ha,
        methods,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::classification::{ClassifiedRaster, Method};
    use crate::hotspots::{extract_hotspots, HotspotParams};
    use approx::assert_relative_eq;
    use floodmap_core::CRS;

    fn grid() -> GridSpec {
        GridSpec::from_bounds((0.0, 0.0, 100.0, 100.0), 10.0, CRS::from_epsg(31983)).unwrap()
    }

    /// 10x10 stack: ramps in elevation (by column) and twi (by row), a
    /// constant slope, all urban, class 1 in the left half and 0 elsewhere.
    fn stack() -> FeatureStack {
        let g = grid();
        let mut s = FeatureStack::new(g.clone());
        let mut elevation = g.raster(0.0);
        let mut twi = g.raster(0.0);
        let mut class = g.raster(0.0);
        for r in 0..10 {
            for c in 0..10 {
                elevation.set(r, c, c as f64).unwrap();
                twi.set(r, c, r as f64 * 2.0).unwrap();
                class.set(r, c, if c < 5 { 1.0 } else { 0.0 }).unwrap();
            }
        }
        s.append(band::ELEVATION, elevation).unwrap();
        s.append(band::SLOPE, g.raster(3.0)).unwrap();
        s.append(band::TWI, twi).unwrap();
        s.append(band::LANDCOVER, g.raster(24.0)).unwrap();
        s.append(band::CLASS, class).unwrap();
        s
    }

    fn params(radius: usize) -> SusceptibilityParams {
        SusceptibilityParams {
            smoothing_radius: radius,
            ..Default::default()
        }
    }

    #[test]
    fn test_weighted_combination() {
        let s = stack();
        let w = FeatureWeights::from_importances(&[band::ELEVATION, band::TWI], &[3.0, 1.0]).unwrap();
        let (region, _) = reference_region(&s, 24).unwrap();
        let (surface, norms) = build_susceptibility(&s, &w, &region, &params(0)).unwrap();
        assert!(norms.iter().all(|n| !n.non_normalizable));
        // elevation 3 of 0..9 inverse, twi 8 of 0..18 direct
        let expected = 0.75 * (1.0 - 3.0 / 9.0) + 0.25 * (8.0 / 18.0);
        assert_relative_eq!(surface.raster().get(4, 3).unwrap(), expected, epsilon = 1e-12);
    }

    #[test]
    fn test_constant_band_is_neutral() {
        let s = stack();
        let w = FeatureWeights::from_importances(&[band::SLOPE, band::TWI], &[1.0, 1.0]).unwrap();
        let (region, _) = reference_region(&s, 24).unwrap();
        let (surface, norms) = build_susceptibility(&s, &w, &region, &params(0)).unwrap();
        assert!(norms[0].non_normalizable);
        assert_relative_eq!(surface.raster().get(9, 0).unwrap(), 0.5, epsilon = 1e-12);
        assert!(surface.raster().data().iter().all(|v| v.is_finite()));
    }

    #[test]
    fn test_bounds_and_statistics() {
        let s = stack();
        let w = FeatureWeights::from_importances(&[band::ELEVATION, band::TWI], &[1.0, 2.0]).unwrap();
        let (surface, report) = susceptibility_index(&s, &w, 24, &params(1)).unwrap();
        assert!(surface.raster().data().iter().all(|v| (0.0..=1.0).contains(v)));
        assert_eq!(report.reference_pixels, 100);
        assert_eq!(report.statistics.count, 100);
        assert_relative_eq!(report.effective_weight, 1.0, epsilon = 1e-12);
    }

    #[test]
    fn test_missing_contribution_rejected() {
        let s = stack();
        let w = FeatureWeights::from_importances(&[band::LANDCOVER], &[1.0]).unwrap();
        let (region, _) = reference_region(&s, 24).unwrap();
        assert!(build_susceptibility(&s, &w, &region, &params(0)).is_err());
    }

    #[test]
    fn test_slices_descend() {
        let s = stack();
        let w = FeatureWeights::from_importances(&[band::TWI], &[1.0]).unwrap();
        let (surface, _) = susceptibility_index(&s, &w, 24, &params(0)).unwrap();
        let slices = surface.threshold_slices(&[99, 75], 0).unwrap();
        let count = |r: &Raster<f64>| r.data().iter().filter(|v| **v == 1.0).count();
        assert_eq!(slices[0].level, 99);
        // twi rows 0..9 normalised to k/9: >= 0.99 only row 9, >= 0.75 rows 7..9
        assert_eq!(count(&slices[0].raster), 10);
        assert_eq!(count(&slices[1].raster), 30);
        assert!(surface.threshold_slice(0, 1).is_err());
    }

    #[test]
    fn test_coverage() {
        let s = stack();
        let g = grid();
        let sectors = risk_sectors(&s, 24).unwrap();
        let mut flood = g.raster(0u8);
        for r in 0..10 {
            for c in 0..10 {
                if (2..8).contains(&c) {
                    flood.set(r, c, 1).unwrap();
                }
            }
        }
        let classified = ClassifiedRaster {
            method: Method::Hand { threshold_m: 3.0 },
            smoothing_radius: None,
            raster: flood,
        };
        let set = extract_hotspots(&classified, &urban_mask(&s, 24).unwrap(), &g, &HotspotParams::default()).unwrap();
        let report = validate_hotspots(&[set], &sectors, &g).unwrap();
        assert_relative_eq!(report.reference_area_ha, 0.5);
        assert_relative_eq!(report.methods[0].overlap_area_ha, 0.3);
        assert_relative_eq!(report.methods[0].coverage_pct, 60.0, epsilon = 1e-9);

        let masked = SusceptibilitySurface { raster: g.raster(0.4) }.masked_by(&sectors).unwrap();
        assert!(masked.get(0, 7).unwrap().is_nan());
        assert_eq!(masked.get(0, 1).unwrap(), 0.4);
    }
}
