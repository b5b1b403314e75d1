//! End-to-end scenarios on small synthetic inputs.

mod common;

use approx::assert_relative_eq;
use floodmap_algorithms::classification::{refine_labels, ClassifiedRaster, FeatureWeights, Method, PuParams};
use floodmap_algorithms::config::PipelineConfig;
use floodmap_algorithms::covariates::{band, build_feature_stack, CovariateInputs};
use floodmap_algorithms::hotspots::{extract_hotspots, HotspotParams};
use floodmap_algorithms::susceptibility::{build_susceptibility, SusceptibilityParams};
use floodmap_core::raster::GridSpec;
use floodmap_core::vector::{Feature, FeatureCollection};
use floodmap_core::{FeatureStack, SamplePoint, SampleTable};
use geo::{polygon, Geometry, LineString};
use rand::{Rng, SeedableRng};
use rand_chacha::ChaCha8Rng;

// ---------------------------------------------------------------------------
// A: distance to a river on a 100x100 grid with a circular hill
// ---------------------------------------------------------------------------

#[test]
fn scenario_a_river_distance() {
    let res = 50.0;
    let grid = GridSpec::from_bounds((0.0, 0.0, 5000.0, 5000.0), res, common::crs()).unwrap();
    let mut elevation = grid.raster(10.0);
    for row in 0..100 {
        for col in 0..100 {
            let (x, y) = grid.cell_center(row, col);
            let d = ((x - 2500.0).powi(2) + (y - 1500.0).powi(2)).sqrt();
            elevation.set(row, col, 10.0 + 100.0 * (1.0 - d / 1000.0).max(0.0)).unwrap();
        }
    }
    // center line of row 20
    let river_y = 5000.0 - 20.5 * res;
    let river = Feature::new(Geometry::LineString(LineString::from(vec![(0.0, river_y), (5000.0, river_y)])));
    let risk = Feature::new(Geometry::Polygon(polygon![
        (x: 1000.0, y: 3800.0), (x: 1500.0, y: 3800.0), (x: 1500.0, y: 4100.0), (x: 1000.0, y: 4100.0)
    ]))
    .with_property("tipolo_g1", "Inundação");

    let inputs = CovariateInputs {
        elevation,
        ksat: grid.raster(20_000.0),
        twi: grid.raster(8.0),
        hand: grid.raster(3.0),
        landcover: grid.raster(24.0),
        drainage: FeatureCollection::new(vec![river], Some(common::crs())),
        risk_areas: FeatureCollection::new(vec![risk], Some(common::crs())),
        study_area: None,
    };
    let cfg = PipelineConfig {
        study_bounds: Some([0.0, 0.0, 5000.0, 5000.0]),
        target_resolution_m: res,
        drainage_buffer_m: 0.0,
        gap_fill_radius_px: 2,
        ..Default::default()
    };
    let (stack, report) = build_feature_stack(&inputs, &cfg).unwrap();
    let distance = stack.band(band::DISTANCE).unwrap();

    for col in [0, 37, 99] {
        assert_eq!(distance.get(20, col).unwrap(), 0.0);
        let mut previous = 0.0;
        for row in 21..100 {
            let d = distance.get(row, col).unwrap();
            assert!(d >= previous, "row {row}: {d} < {previous}");
            previous = d;
            let expected = ((row - 20) as f64 * res).min(2500.0);
            assert_relative_eq!(d, expected, epsilon = 1e-9);
        }
        for row in 0..20 {
            assert_relative_eq!(distance.get(row, col).unwrap(), (20 - row) as f64 * res, epsilon = 1e-9);
        }
    }
    // rows 71..=99 lie beyond the 2500 m search radius
    assert_eq!(report.distance.clamped_pixels, 29 * 100);
    assert_eq!(report.distance.max_distance, 2500.0);

    let slope = stack.band(band::SLOPE).unwrap();
    assert_relative_eq!(slope.get(90, 90).unwrap(), 0.0, epsilon = 1e-9);
    // flank of the hill, 500 m south of its top
    let (row, col) = grid.cell_at(2525.0, 1025.0).unwrap();
    assert!(slope.get(row, col).unwrap() > 1.0);
}

// ---------------------------------------------------------------------------
// B: PU refinement recovers the true negatives
// ---------------------------------------------------------------------------

fn gaussian(rng: &mut ChaCha8Rng, mean: f64) -> f64 {
    let u1: f64 = rng.r#gen::<f64>().max(1e-12);
    let u2: f64 = rng.r#gen();
    mean + (-2.0 * u1.ln()).sqrt() * (2.0 * std::f64::consts::PI * u2).cos()
}

/// 1000 labelled positives; 1000 unlabeled of which 300 are hidden
/// positives and 700 true negatives. `col` marks the source (0 = P,
/// 1 = U) and `row` marks the true class inside U (1 = negative).
fn pu_table() -> SampleTable {
    let mut rng = ChaCha8Rng::seed_from_u64(7);
    let mut table = SampleTable::new(vec!["a".into(), "b".into()]);
    let push = |table: &mut SampleTable, mean: f64, label: u8, row: usize, col: usize, rng: &mut ChaCha8Rng| {
        let features = vec![gaussian(rng, mean), gaussian(rng, mean)];
        table
            .push(SamplePoint {
                x: table.len() as f64,
                y: 0.0,
                row,
                col,
                features,
                label,
            })
            .unwrap();
    };
    for _ in 0..1000 {
        push(&mut table, 3.0, 1, 0, 0, &mut rng);
    }
    for i in 0..1000 {
        if i % 10 < 3 {
            push(&mut table, 3.0, 0, 0, 1, &mut rng);
        } else {
            push(&mut table, -3.0, 0, 1, 1, &mut rng);
        }
    }
    table
}

#[test]
fn scenario_b_pu_recovers_negatives() {
    let table = pu_table();
    let (refined, report) = refine_labels(&table, &PuParams::default()).unwrap();

    let recovered = refined
        .points
        .iter()
        .filter(|p| p.col == 1 && p.row == 1 && p.label == 0)
        .count();
    assert!(recovered as f64 / 700.0 > 0.9, "recovered {recovered} of 700");

    // positives are never relabelled
    let positives: Vec<_> = refined.points.iter().filter(|p| p.col == 0).collect();
    assert_eq!(positives.len(), 1000);
    assert!(positives.iter().all(|p| p.label == 1));

    assert_eq!(report.spies, 150);
    assert_eq!(report.confident_negatives + report.still_unlabeled, 1000);
}

// ---------------------------------------------------------------------------
// C: area filter keeps only the large blob
// ---------------------------------------------------------------------------

#[test]
fn scenario_c_hotspot_area_filter() {
    let grid = GridSpec::from_bounds((0.0, 0.0, 300.0, 300.0), 10.0, common::crs()).unwrap();
    let mut flood = grid.raster(0u8);
    // 4 x 5 = 20 px = 2000 m²
    for row in 2..6 {
        for col in 2..7 {
            flood.set(row, col, 1).unwrap();
        }
    }
    // 5 x 10 = 50 px = 5000 m²
    for row in 15..20 {
        for col in 10..20 {
            flood.set(row, col, 1).unwrap();
        }
    }
    let classified = ClassifiedRaster {
        method: Method::RandomForest { trees: 100 },
        smoothing_radius: Some(1),
        raster: flood,
    };
    let params = HotspotParams {
        min_area_m2: 3000.0,
        ..Default::default()
    };
    let set = extract_hotspots(&classified, &grid.raster(1u8), &grid, &params).unwrap();

    assert_eq!(set.report.components, 2);
    assert_eq!(set.hotspots.len(), 1);
    assert_relative_eq!(set.hotspots[0].area_m2, 5000.0);
    assert_eq!(set.hotspots[0].bbox, [15, 10, 19, 19]);
    assert_eq!(set.mask.get(3, 3).unwrap(), 0);
    assert_eq!(set.mask.get(17, 12).unwrap(), 1);
}

// ---------------------------------------------------------------------------
// D: weighted combination at a sample pixel
// ---------------------------------------------------------------------------

#[test]
fn scenario_d_weighted_combination() {
    let grid = GridSpec::from_bounds((0.0, 0.0, 100.0, 100.0), 10.0, common::crs()).unwrap();
    let ramp = |f: &dyn Fn(usize, usize) -> f64| {
        let mut r = grid.raster(0.0);
        for row in 0..10 {
            for col in 0..10 {
                r.set(row, col, f(row, col)).unwrap();
            }
        }
        r
    };
    let mut stack = FeatureStack::new(grid.clone());
    // elevation 10..=100 by column, twi 0..=9 by row, hand (row + col) 0..=18
    stack.append(band::ELEVATION, ramp(&|_, c| 10.0 * (c + 1) as f64)).unwrap();
    stack.append(band::TWI, ramp(&|r, _| r as f64)).unwrap();
    stack.append(band::HAND, ramp(&|r, c| (r + c) as f64)).unwrap();

    let weights = FeatureWeights::from_importances(&[band::ELEVATION, band::TWI, band::HAND], &[0.06, 0.03, 0.03]).unwrap();
    assert_relative_eq!(weights.sum(), 1.0, epsilon = 1e-6);

    let params = SusceptibilityParams {
        smoothing_radius: 0,
        ..Default::default()
    };
    let (surface, norms) = build_susceptibility(&stack, &weights, &grid.raster(1u8), &params).unwrap();
    assert_eq!(norms.len(), 3);

    // pixel (row 3, col 6): elevation 70, twi 3, hand 9
    let expected = 0.5 * (1.0 - (70.0 - 10.0) / 90.0) + 0.25 * (3.0 / 9.0) + 0.25 * (1.0 - 9.0 / 18.0);
    assert_relative_eq!(surface.raster().get(3, 6).unwrap(), expected, epsilon = 1e-12);

    // the 3x3 mean of a linear field leaves interior cells unchanged
    let smoothed = build_susceptibility(&stack, &weights, &grid.raster(1u8), &SusceptibilityParams::default())
        .unwrap()
        .0;
    assert_relative_eq!(smoothed.raster().get(3, 6).unwrap(), expected, epsilon = 1e-12);
}
