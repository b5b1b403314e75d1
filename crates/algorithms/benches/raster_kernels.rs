//! Benchmarks for the hot raster kernels of the pipeline

use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion};
use floodmap_algorithms::classification::{ClassifiedRaster, Method};
use floodmap_algorithms::distance::{euclidean_distance, DistanceParams};
use floodmap_algorithms::hotspots::{extract_hotspots, HotspotParams};
use floodmap_algorithms::statistics::focal_mode;
use floodmap_core::raster::{GridSpec, Neighborhood, Raster};
use floodmap_core::CRS;

fn grid(size: usize) -> GridSpec {
    let extent = size as f64 * 10.0;
    GridSpec::from_bounds((0.0, 0.0, extent, extent), 10.0, CRS::from_epsg(31983)).unwrap()
}

/// Speckled binary mask with some connected structure
fn create_mask(size: usize) -> Raster<u8> {
    let mut r = grid(size).raster(0u8);
    for row in 0..size {
        for col in 0..size {
            let v = (row * 7 + col * 13) % 29;
            r.set(row, col, u8::from(v < 9)).unwrap();
        }
    }
    r
}

/// Sparse drainage-like targets: one line every 64 rows
fn create_targets(size: usize) -> Raster<u8> {
    let mut r = grid(size).raster(0u8);
    for row in (0..size).step_by(64) {
        for col in 0..size {
            r.set(row, col, 1).unwrap();
        }
    }
    r
}

fn bench_distance(c: &mut Criterion) {
    let mut group = c.benchmark_group("kernels/euclidean_distance");
    let params = DistanceParams { max_distance: 2500.0 };
    for size in [256, 512, 1024, 2048] {
        let targets = create_targets(size);
        group.bench_with_input(BenchmarkId::from_parameter(size), &size, |b, _| {
            b.iter(|| euclidean_distance(black_box(&targets), params.clone()).unwrap())
        });
    }
    group.finish();
}

fn bench_focal_mode(c: &mut Criterion) {
    let mut group = c.benchmark_group("kernels/focal_mode");
    for size in [256, 512, 1024, 2048] {
        let mask = create_mask(size);
        group.bench_with_input(BenchmarkId::from_parameter(size), &size, |b, _| {
            b.iter(|| focal_mode(black_box(&mask), Neighborhood::Square(1)).unwrap())
        });
    }
    group.finish();
}

fn bench_hotspots(c: &mut Criterion) {
    let mut group = c.benchmark_group("kernels/connected_components");
    let params = HotspotParams {
        min_area_m2: 0.0,
        ..Default::default()
    };
    for size in [256, 512, 1024] {
        let g = grid(size);
        let classified = ClassifiedRaster {
            method: Method::RandomForest { trees: 100 },
            smoothing_radius: None,
            raster: create_mask(size),
        };
        let urban = g.raster(1u8);
        group.bench_with_input(BenchmarkId::from_parameter(size), &size, |b, _| {
            b.iter(|| extract_hotspots(black_box(&classified), &urban, &g, &params).unwrap())
        });
    }
    group.finish();
}

criterion_group!(benches, bench_distance, bench_focal_mode, bench_hotspots);
criterion_main!(benches);
