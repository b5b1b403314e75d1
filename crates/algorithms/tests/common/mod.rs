//! Synthetic study area shared by the integration tests.
//!
//! 60x60 cells at 10 m. A river runs west-east at y = 300; terrain rises
//! away from it in a V. The mapped risk polygon hugs the river in the
//! middle of the area. Everything is urban except a strip along the north
//! edge.

#![allow(dead_code)]

use floodmap_algorithms::config::PipelineConfig;
use floodmap_core::raster::{GridSpec, Raster};
use floodmap_core::store::MemoryStore;
use floodmap_core::vector::{Feature, FeatureCollection};
use floodmap_core::CRS;
use geo::{polygon, Geometry, LineString};

pub const SIZE: usize = 60;
pub const RES: f64 = 10.0;
pub const RIVER_Y: f64 = 300.0;

pub fn crs() -> CRS {
    CRS::from_epsg(31983)
}

pub fn grid() -> GridSpec {
    let extent = SIZE as f64 * RES;
    GridSpec::from_bounds((0.0, 0.0, extent, extent), RES, crs()).unwrap()
}

/// Distance of a row's center from the river, in rows.
fn rows_from_river(row: usize) -> f64 {
    let (_, y) = grid().cell_center(row, 0);
    (y - RIVER_Y).abs() / RES
}

fn surface(f: impl Fn(usize, usize) -> f64) -> Raster<f64> {
    let mut r = grid().raster(0.0);
    for row in 0..SIZE {
        for col in 0..SIZE {
            r.set(row, col, f(row, col)).unwrap();
        }
    }
    r
}

pub fn elevation() -> Raster<f64> {
    surface(|row, col| 2.0 + 0.5 * rows_from_river(row) + 0.01 * col as f64)
}

pub fn hand() -> Raster<f64> {
    surface(|row, _| 0.5 * rows_from_river(row))
}

pub fn twi() -> Raster<f64> {
    surface(|row, col| 12.0 - 0.3 * rows_from_river(row) + 0.001 * col as f64)
}

/// Raw conductivity with a few holes to gap-fill
pub fn ksat() -> Raster<f64> {
    let mut r = surface(|row, col| 20_000.0 + 400.0 * rows_from_river(row) + 10.0 * col as f64);
    for (row, col) in [(5, 5), (40, 12), (41, 12), (29, 50)] {
        r.set(row, col, f64::NAN).unwrap();
    }
    r
}

pub fn landcover() -> Raster<f64> {
    surface(|row, _| if row < 4 { 3.0 } else { 24.0 })
}

pub fn rivers() -> FeatureCollection {
    let river = Feature::new(Geometry::LineString(LineString::from(vec![
        (0.0, RIVER_Y),
        (SIZE as f64 * RES, RIVER_Y),
    ])));
    FeatureCollection::new(vec![river], Some(crs()))
}

pub fn risk_areas() -> FeatureCollection {
    let flood = Feature::new(Geometry::Polygon(polygon![
        (x: 100.0, y: 240.0), (x: 400.0, y: 240.0), (x: 400.0, y: 360.0), (x: 100.0, y: 360.0)
    ]))
    .with_property("tipolo_g1", "Inundação");
    let landslide = Feature::new(Geometry::Polygon(polygon![
        (x: 450.0, y: 500.0), (x: 550.0, y: 500.0), (x: 550.0, y: 580.0), (x: 450.0, y: 580.0)
    ]))
    .with_property("tipolo_g1", "Deslizamento");
    FeatureCollection::new(vec![flood, landslide], Some(crs()))
}

pub fn store() -> MemoryStore {
    let mut store = MemoryStore::new();
    store.insert_raster("elevation", elevation());
    store.insert_raster("ksat", ksat());
    store.insert_raster("twi", twi());
    store.insert_raster("hand", hand());
    store.insert_raster("landcover", landcover());
    store.insert_features("rivers", rivers());
    store.insert_features("risk_areas", risk_areas());
    store
}

/// Small-sample configuration for the synthetic area
pub fn config() -> PipelineConfig {
    let mut cfg = PipelineConfig {
        study_bounds: Some([0.0, 0.0, SIZE as f64 * RES, SIZE as f64 * RES]),
        risk_buffer_m: 100.0,
        gap_fill_radius_px: 2,
        samples_positive: 80,
        samples_unlabeled: 400,
        rf_trees: 20,
        ..Default::default()
    };
    cfg.layers.drainage = vec!["rivers".into()];
    cfg
}
