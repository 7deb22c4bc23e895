//! Benchmarks for the aggregation, scoring, and clustering pipeline.

use std::collections::HashMap;

use criterion::{black_box, criterion_group, criterion_main, Criterion};

use presence_core::{FeatureVector, ManifestEntry, MetricCatalog, RawSeries};
use presence_engine::aggregate::Aggregator;
use presence_engine::calibrate::{self, SearchOptions};
use presence_engine::persona::{FeatureSpec, FitOptions, PersonaModel};
use presence_engine::score;

fn create_series(metric: &str, duration: f64, fps: usize) -> RawSeries {
    let mut series = RawSeries::new(metric, duration);
    let n = (duration * fps as f64) as usize;
    for i in 0..n {
        let t = i as f64 / fps as f64;
        series.push(t, 1.5 + (t * 0.37).sin() * 0.4);
    }
    series
}

fn benchmark_aggregation(c: &mut Criterion) {
    let catalog = MetricCatalog::default();
    let def = catalog.get("head_stability").unwrap();
    let agg = Aggregator::for_metric(def);

    let five_min = create_series("head_stability", 300.0, 25);
    let one_min = create_series("head_stability", 60.0, 25);

    c.bench_function("aggregate_5min_25fps", |b| {
        b.iter(|| agg.video_aggregate(black_box(&five_min)))
    });

    c.bench_function("aggregate_1min_25fps", |b| {
        b.iter(|| agg.windows(black_box(&one_min)))
    });
}

fn benchmark_scoring(c: &mut Criterion) {
    let catalog = MetricCatalog::default();

    c.bench_function("score_full_catalog", |b| {
        b.iter(|| {
            for def in catalog.metrics() {
                black_box(score::score_metric(def, black_box(1.1)));
            }
        })
    });
}

fn benchmark_calibration(c: &mut Criterion) {
    let catalog = MetricCatalog::default();
    let labels = ["rigid", "stable", "optimal", "high", "distracting"];

    let mut manifest = Vec::new();
    let mut aggregates = HashMap::new();
    for i in 0..60 {
        let video_id = format!("v{i:03}");
        let aggregate = 0.2 + i as f64 * 0.06;
        let label = labels[catalog
            .get("head_stability")
            .unwrap()
            .bucket_index_for(aggregate)];
        manifest.push(ManifestEntry::new(&video_id, "head_stability", label));
        aggregates.insert(video_id, aggregate);
    }

    c.bench_function("calibration_search_60_videos", |b| {
        b.iter(|| {
            calibrate::search(
                black_box(&catalog),
                "head_stability",
                black_box(&manifest),
                black_box(&aggregates),
                &SearchOptions::default(),
            )
        })
    });
}

fn benchmark_clustering(c: &mut Criterion) {
    let spec = FeatureSpec::default();
    let vectors: Vec<FeatureVector> = (0..100)
        .map(|i| {
            let base = (i % 4) as f64 * 2.0;
            let values = (0..spec.dim())
                .map(|j| base + (i as f64 * 0.13 + j as f64 * 0.71).sin() * 0.3)
                .collect();
            FeatureVector::new(format!("v{i:03}"), values)
        })
        .collect();
    let opts = FitOptions {
        restarts: 10,
        ..FitOptions::default()
    };

    c.bench_function("persona_fit_100_videos", |b| {
        b.iter(|| PersonaModel::fit(black_box(&spec), black_box(&vectors), &opts))
    });
}

criterion_group!(
    benches,
    benchmark_aggregation,
    benchmark_scoring,
    benchmark_calibration,
    benchmark_clustering
);
criterion_main!(benches);
