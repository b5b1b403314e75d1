//! Covariate feature stack
//!
//! Brings every raw input onto one canonical grid and derives the terrain,
//! drainage-distance and class bands. Band order follows [`band::ORDER`].

mod gapfill;

pub use gapfill::{check_sentinel, gap_fill, GapFillParams, GapFillReport};

use crate::config::PipelineConfig;
use crate::distance::{buffer_mask, euclidean_distance, DistanceParams, DistanceReport};
use crate::terrain::{slope, SlopeParams};
use crate::vector::{rasterize_lines, rasterize_polygons};
use floodmap_core::raster::{resample, GridSpec, Raster, ResampleMethod};
use floodmap_core::store::{RasterStore, VectorStore};
use floodmap_core::vector::FeatureCollection;
use floodmap_core::{Error, FeatureStack, Result};
use serde::Serialize;
use std::collections::BTreeMap;
use tracing::{debug, info, warn};

/// Band names of the feature stack
pub mod band {
    pub const DISTANCE: &str = "distance";
    pub const ELEVATION: &str = "elevation";
    pub const SLOPE: &str = "slope";
    pub const KSAT: &str = "soil_hydraulic_conductivity";
    pub const HAND: &str = "hand";
    pub const TWI: &str = "twi";
    pub const LANDCOVER: &str = "landcover";
    /// 1 inside risk polygons, 0 in the surrounding buffer, NaN elsewhere
    pub const CLASS: &str = "class";

    pub const ORDER: [&str; 8] = [DISTANCE, ELEVATION, SLOPE, KSAT, HAND, TWI, LANDCOVER, CLASS];
}

/// Raw layers as loaded from the stores, before alignment
#[derive(Debug, Clone)]
pub struct CovariateInputs {
    pub elevation: Raster<f64>,
    pub ksat: Raster<f64>,
    pub twi: Raster<f64>,
    pub hand: Raster<f64>,
    pub landcover: Raster<f64>,
    /// Union of every configured drainage collection
    pub drainage: FeatureCollection,
    /// Risk polygons already filtered on the hazard attribute
    pub risk_areas: FeatureCollection,
    pub study_area: Option<FeatureCollection>,
}

/// Flags and counts from building the stack
#[derive(Debug, Clone, Serialize)]
pub struct CovariateReport {
    pub grid: GridSpec,
    pub elevation_masked_pixels: usize,
    pub gap_fill: GapFillReport,
    pub distance: DistanceReport,
    pub class_positive_pixels: usize,
    pub class_unlabeled_pixels: usize,
    /// NaN cells per band inside the study area
    pub missing_pixels: BTreeMap<String, usize>,
}

/// Load and reproject every input named in `cfg.layers`.
pub fn load_inputs<S>(store: &S, cfg: &PipelineConfig) -> Result<CovariateInputs>
where
    S: RasterStore + VectorStore,
{
    let crs = cfg.target_crs();
    let ids = &cfg.layers;
    let raster = |id: &str| -> Result<Raster<f64>> {
        debug!(layer = id, "loading raster");
        store.reproject(id, store.load(id)?, &crs)
    };

    let mut drainage = FeatureCollection::new(Vec::new(), Some(crs.clone()));
    for id in &ids.drainage {
        drainage = drainage.union(store.load_features(id)?);
    }

    let risk_areas = store
        .load_features(&ids.risk_areas)?
        .filter_eq(&cfg.risk_attribute, cfg.risk_value.as_str());
    info!(
        polygons = risk_areas.len(),
        attribute = %cfg.risk_attribute,
        value = %cfg.risk_value,
        "risk areas selected"
    );

    let study_area = match &ids.study_area {
        Some(id) => Some(store.load_features(id)?),
        None => None,
    };

    Ok(CovariateInputs {
        elevation: raster(&ids.elevation)?,
        ksat: raster(&ids.ksat)?,
        twi: raster(&ids.twi)?,
        hand: raster(&ids.hand)?,
        landcover: raster(&ids.landcover)?,
        drainage,
        risk_areas,
        study_area,
    })
}

/// Canonical grid of the study extent at the target resolution.
pub fn study_grid(inputs: &CovariateInputs, cfg: &PipelineConfig) -> Result<GridSpec> {
    let bounds = match (&inputs.study_area, cfg.study_bounds) {
        (Some(area), _) => area.bounds().ok_or_else(|| Error::EmptyGeometry {
            what: "study area".into(),
        })?,
        (None, Some([x0, y0, x1, y1])) => (x0, y0, x1, y1),
        (None, None) => {
            return Err(Error::invalid_param(
                "study_bounds",
                "none",
                "either layers.study_area or study_bounds is required",
            ));
        }
    };
    GridSpec::from_bounds(bounds, cfg.target_resolution_m, cfg.target_crs())
}

/// Build the co-registered covariate stack.
///
/// The returned stack is not sealed; later stages may append bands.
pub fn build_feature_stack(
    inputs: &CovariateInputs,
    cfg: &PipelineConfig,
) -> Result<(FeatureStack, CovariateReport)> {
    let grid = study_grid(inputs, cfg)?;
    info!(rows = grid.rows, cols = grid.cols, res = grid.resolution(), "study grid");

    for (name, layer) in [
        (band::ELEVATION, &inputs.elevation),
        (band::KSAT, &inputs.ksat),
        (band::TWI, &inputs.twi),
        (band::HAND, &inputs.hand),
        (band::LANDCOVER, &inputs.landcover),
    ] {
        if !grid.intersects(layer.bounds()) {
            return Err(Error::ExtentOutsideStudyArea { layer: name.into() });
        }
    }
    let risk_polygons = inputs.risk_areas.polygons();
    if risk_polygons.is_empty() {
        return Err(Error::EmptyGeometry {
            what: format!("risk areas ({} = {})", cfg.risk_attribute, cfg.risk_value),
        });
    }
    for (name, fc) in [("drainage", &inputs.drainage), ("risk_areas", &inputs.risk_areas)] {
        match fc.bounds() {
            Some(b) if grid.intersects(b) => {}
            Some(_) => return Err(Error::ExtentOutsideStudyArea { layer: name.into() }),
            None => return Err(Error::EmptyGeometry { what: name.into() }),
        }
    }

    // Elevation: mask the source's own nodata and the configured sentinel,
    // then bring onto the grid
    let sentinel = cfg.elevation_nodata;
    let elevation_src = inputs
        .elevation
        .clone()
        .normalize_nodata()
        .map(Some(f64::NAN), |v| if v == sentinel { f64::NAN } else { v });
    let elevation = resample(band::ELEVATION, &elevation_src, &grid, ResampleMethod::Bilinear)?;
    let elevation_masked_pixels = elevation.data().iter().filter(|v| v.is_nan()).count();

    let slope_band = slope(&elevation, SlopeParams::default())?;

    let (ksat, gap_fill_report) = hydraulic_conductivity(&inputs.ksat, &grid, cfg)?;

    let hand = resample(band::HAND, &inputs.hand, &grid, ResampleMethod::Bilinear)?;
    let twi = resample(band::TWI, &inputs.twi, &grid, ResampleMethod::Bilinear)?;
    let landcover = resample(band::LANDCOVER, &inputs.landcover, &grid, ResampleMethod::Nearest)?;

    let targets = rasterize_lines(&inputs.drainage.lines(), &grid, cfg.drainage_buffer_m)?;
    let distance = euclidean_distance(
        &targets,
        DistanceParams {
            max_distance: cfg.distance_search_radius_m,
        },
    )?;
    if distance.report.clamped_pixels > 0 {
        warn!(
            pixels = distance.report.clamped_pixels,
            radius = cfg.distance_search_radius_m,
            "drainage distance clamped at search radius"
        );
    }

    let inside = rasterize_polygons(&risk_polygons, &grid)?;
    let buffer = buffer_mask(&inside, cfg.risk_buffer_m)?;
    let class_values: Vec<f64> = inside
        .data()
        .iter()
        .zip(buffer.data().iter())
        .map(|(i, b)| match (*i, *b) {
            (1, _) => 1.0,
            (_, 1) => 0.0,
            _ => f64::NAN,
        })
        .collect();
    let class = grid.raster(f64::NAN).derive(class_values, Some(f64::NAN))?;

    let mut bands = vec![
        (band::DISTANCE, distance.distance),
        (band::ELEVATION, elevation),
        (band::SLOPE, slope_band),
        (band::KSAT, ksat),
        (band::HAND, hand),
        (band::TWI, twi),
        (band::LANDCOVER, landcover),
        (band::CLASS, class),
    ];

    let study_mask = match &inputs.study_area {
        Some(area) => Some(rasterize_polygons(&area.polygons(), &grid)?),
        None => None,
    };
    if let Some(mask) = &study_mask {
        for (_, raster) in bands.iter_mut() {
            for (v, m) in raster.data_mut().iter_mut().zip(mask.data().iter()) {
                if *m == 0 {
                    *v = f64::NAN;
                }
            }
        }
    }

    let mut missing_pixels = BTreeMap::new();
    for (name, raster) in &bands {
        if *name == band::CLASS {
            continue;
        }
        let n = match &study_mask {
            Some(mask) => raster
                .data()
                .iter()
                .zip(mask.data().iter())
                .filter(|(v, m)| v.is_nan() && **m != 0)
                .count(),
            None => raster.data().iter().filter(|v| v.is_nan()).count(),
        };
        if n > 0 {
            warn!(band = *name, pixels = n, "band has missing cells inside the study area");
        }
        missing_pixels.insert(name.to_string(), n);
    }

    let class_band = &bands[7].1;
    let class_positive_pixels = class_band.data().iter().filter(|v| **v == 1.0).count();
    let class_unlabeled_pixels = class_band.data().iter().filter(|v| **v == 0.0).count();

    let mut stack = FeatureStack::new(grid.clone());
    for (name, raster) in bands {
        stack.append(name, raster)?;
    }
    info!(
        bands = stack.len(),
        positive = class_positive_pixels,
        unlabeled = class_unlabeled_pixels,
        "feature stack built"
    );

    Ok((
        stack,
        CovariateReport {
            grid,
            elevation_masked_pixels,
            gap_fill: gap_fill_report,
            distance: distance.report,
            class_positive_pixels,
            class_unlabeled_pixels,
            missing_pixels,
        },
    ))
}

/// Scale, gap-fill on the native grid, then bilinear onto the target grid.
///
/// The window radius is given in target pixels and converted to native
/// pixels so the window keeps its ground size.
fn hydraulic_conductivity(
    src: &Raster<f64>,
    grid: &GridSpec,
    cfg: &PipelineConfig,
) -> Result<(Raster<f64>, GapFillReport)> {
    let nodata = src.nodata();
    let scale = cfg.ksat_scale;
    let mut scaled = src.map(Some(f64::NAN), |v| {
        if v.is_nan() || nodata.is_some_and(|nd| v == nd) {
            f64::NAN
        } else {
            v * scale
        }
    });
    check_sentinel(&scaled, cfg.gap_fill_sentinel)?;
    scaled.set_nodata(Some(f64::NAN));

    let native = src.cell_size();
    let radius = if native > 0.0 {
        ((cfg.gap_fill_radius_px as f64 * grid.resolution() / native).round() as usize).max(1)
    } else {
        cfg.gap_fill_radius_px
    };
    let (filled, report) = gap_fill(
        &scaled,
        &GapFillParams {
            sentinel: cfg.gap_fill_sentinel,
            radius,
        },
    )?;
    let aligned = resample(band::KSAT, &filled, grid, ResampleMethod::Bilinear)?;
    Ok((aligned, report))
}

#[cfg(test)]
mod tests {
    use super::*;
    use floodmap_core::vector::Feature;
    use floodmap_core::CRS;
    use geo::{polygon, Geometry, LineString};

    fn crs() -> CRS {
        CRS::from_epsg(31983)
    }

    fn layer(value: f64) -> Raster<f64> {
        GridSpec::from_bounds((0.0, 0.0, 200.0, 200.0), 10.0, crs())
            .unwrap()
            .raster(value)
    }

    fn inputs() -> CovariateInputs {
        let mut elevation = layer(0.0);
        for row in 0..20 {
            for col in 0..20 {
                elevation.set(row, col, (20 - row) as f64).unwrap();
            }
        }
        elevation.set(0, 0, -9999.0).unwrap();
        let mut ksat = layer(20_000.0);
        ksat.set(5, 5, f64::NAN).unwrap();

        let river = Feature::new(Geometry::LineString(LineString::from(vec![(0.0, 100.0), (200.0, 100.0)])));
        let risk = Feature::new(Geometry::Polygon(polygon![
            (x: 40.0, y: 40.0), (x: 80.0, y: 40.0), (x: 80.0, y: 80.0), (x: 40.0, y: 80.0)
        ]))
        .with_property("tipolo_g1", "Inundação");

        CovariateInputs {
            elevation,
            ksat,
            twi: layer(8.0),
            hand: layer(2.0),
            landcover: layer(24.0),
            drainage: FeatureCollection::new(vec![river], Some(crs())),
            risk_areas: FeatureCollection::new(vec![risk], Some(crs())),
            study_area: None,
        }
    }

    fn cfg() -> PipelineConfig {
        PipelineConfig {
            study_bounds: Some([0.0, 0.0, 200.0, 200.0]),
            risk_buffer_m: 20.0,
            gap_fill_radius_px: 1,
            ..Default::default()
        }
    }

    #[test]
    fn test_stack_order_and_alignment() {
        let (stack, report) = build_feature_stack(&inputs(), &cfg()).unwrap();
        assert_eq!(stack.names(), band::ORDER.to_vec());
        for (_, b) in stack.iter() {
            assert!(stack.grid().matches(b));
        }
        assert_eq!(report.elevation_masked_pixels, 1);
        assert_eq!(report.gap_fill.flagged_pixels, 1);
        assert_eq!(report.gap_fill.fallback_pixels, 0);
    }

    #[test]
    fn test_elevation_masks_tagged_nodata_and_sentinel() {
        let mut inp = inputs();
        inp.elevation.set(3, 3, -32768.0).unwrap();
        inp.elevation.set_nodata(Some(-32768.0));
        let (stack, report) = build_feature_stack(&inp, &cfg()).unwrap();
        let elevation = stack.band(band::ELEVATION).unwrap();
        assert!(elevation.get(0, 0).unwrap().is_nan());
        assert!(elevation.get(3, 3).unwrap().is_nan());
        assert!(elevation.get(10, 10).unwrap().is_finite());
        assert_eq!(report.elevation_masked_pixels, 2);
    }

    #[test]
    fn test_ksat_scaled() {
        let (stack, _) = build_feature_stack(&inputs(), &cfg()).unwrap();
        let k = stack.band(band::KSAT).unwrap();
        assert!((k.get(5, 5).unwrap() - 2.0).abs() < 1e-9);
        assert!((k.get(10, 10).unwrap() - 2.0).abs() < 1e-9);
    }

    #[test]
    fn test_class_band() {
        let (stack, report) = build_feature_stack(&inputs(), &cfg()).unwrap();
        let class = stack.band(band::CLASS).unwrap();
        // polygon covers cells rows 12..16, cols 4..8
        assert_eq!(class.get(13, 5).unwrap(), 1.0);
        assert_eq!(class.get(13, 2).unwrap(), 0.0);
        assert!(class.get(0, 19).unwrap().is_nan());
        assert_eq!(report.class_positive_pixels, 16);
        assert!(report.class_unlabeled_pixels > 0);
    }

    #[test]
    fn test_distance_zero_on_river() {
        let (stack, _) = build_feature_stack(&inputs(), &cfg()).unwrap();
        let d = stack.band(band::DISTANCE).unwrap();
        assert_eq!(d.get(9, 3).unwrap(), 0.0);
        assert!(d.get(0, 3).unwrap() > 0.0);
    }

    #[test]
    fn test_layer_outside_study_area() {
        let mut inp = inputs();
        let mut far = GridSpec::from_bounds((5000.0, 5000.0, 5200.0, 5200.0), 10.0, crs())
            .unwrap()
            .raster(1.0);
        far.set_nodata(None);
        inp.twi = far;
        match build_feature_stack(&inp, &cfg()) {
            Err(Error::ExtentOutsideStudyArea { layer }) => assert_eq!(layer, band::TWI),
            other => panic!("unexpected {other:?}"),
        }
    }

    #[test]
    fn test_no_risk_polygons() {
        let mut inp = inputs();
        inp.risk_areas = FeatureCollection::new(vec![], Some(crs()));
        assert!(matches!(
            build_feature_stack(&inp, &cfg()),
            Err(Error::EmptyGeometry { .. })
        ));
    }

    #[test]
    fn test_study_area_mask() {
        let mut inp = inputs();
        let area = Feature::new(Geometry::Polygon(polygon![
            (x: 0.0, y: 0.0), (x: 200.0, y: 0.0), (x: 200.0, y: 150.0), (x: 0.0, y: 150.0)
        ]));
        inp.study_area = Some(FeatureCollection::new(vec![area], Some(crs())));
        let (stack, _) = build_feature_stack(&inp, &cfg()).unwrap();
        assert_eq!(stack.grid().rows, 15);
        assert!(stack.band(band::TWI).unwrap().get(0, 0).unwrap().is_finite());
    }
}
