//! Split Detection Benchmarks
//!
//! The heuristic path serves interactive requests and should stay well under
//! a frame budget on a typical 2000px scan.
//!
//! Run with: `cargo bench --bench split_detection`

use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion};
use std::time::Duration;

use amnesia_spread::split::{
    profile_columns, FeatureExtractor, GrayRaster, HeuristicDetector, ProfileParams, SplitCoefficients,
    SplitModel,
};

/// Synthetic spread: two text blocks with a dark gutter at the center
fn synthetic_spread(width: u32, height: u32) -> GrayRaster {
    let gutter_start = width / 2 - width / 100;
    let gutter_end = width / 2 + width / 100;
    GrayRaster::from_fn(width, height, |x, y| {
        if (gutter_start..gutter_end).contains(&x) {
            30
        } else if (y / 6) % 3 == 0 && x % 11 != 0 && x > width / 20 && x < width - width / 20 {
            60
        } else {
            235
        }
    })
}

fn bench_heuristic(c: &mut Criterion) {
    let mut group = c.benchmark_group("heuristic");
    group.measurement_time(Duration::from_secs(10));

    let detector = HeuristicDetector::default();
    for &width in &[1000u32, 2400, 4000] {
        let raster = synthetic_spread(width, width * 2 / 3);
        group.bench_with_input(BenchmarkId::new("detect", width), &raster, |b, raster| {
            b.iter(|| detector.detect(black_box(raster)))
        });
    }

    group.finish();
}

fn bench_profiling(c: &mut Criterion) {
    let raster = synthetic_spread(2400, 1600);
    c.bench_function("profile_columns_2400", |b| {
        b.iter(|| profile_columns(black_box(&raster), ProfileParams::default()))
    });
}

fn bench_features(c: &mut Criterion) {
    let mut group = c.benchmark_group("features");
    group.measurement_time(Duration::from_secs(10));
    group.sample_size(30);

    let raster = synthetic_spread(2400, 1600);
    let full = FeatureExtractor::default();
    let reduced = FeatureExtractor::new(Some(1000));

    group.bench_function("extract_full_resolution", |b| {
        b.iter(|| full.extract(black_box(&raster), None))
    });
    group.bench_function("extract_max_width_1000", |b| {
        b.iter(|| reduced.extract(black_box(&raster), None))
    });

    let features = full.extract(&raster, None).expect("synthetic spread is analyzable");
    let model = SplitModel {
        coefficients: SplitCoefficients::with_bias(500.0),
        trained_at: chrono::Utc::now(),
        training_size: 0,
        validation_mse: 0.0,
    };
    group.bench_function("predict", |b| b.iter(|| model.predict(black_box(&features))));

    group.finish();
}

criterion_group!(benches, bench_heuristic, bench_profiling, bench_features);
criterion_main!(benches);
