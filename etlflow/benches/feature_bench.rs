//! Benchmarks for feature engineering.

use chrono::NaiveDate;
use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion};
use etlflow::core::{Observation, Row};
use etlflow::datasets::DatasetKind;
use etlflow::load::batch_ranges;

fn readings(n: usize) -> Vec<Row> {
    let day = NaiveDate::from_ymd_opt(2024, 5, 1).unwrap_or_default();
    (0..n)
        .map(|i| {
            let level = (i % 97) as f64;
            let obs = Observation::at(day.and_hms_opt((i % 24) as u32, 0, 0))
                .with_metric("pm10", Some(level * 1.5))
                .with_metric("pm2_5", Some(level))
                .with_metric("carbon_monoxide", Some(level * 10.0))
                .with_metric("nitrogen_dioxide", Some(level / 2.0))
                .with_metric("sulphur_dioxide", Some(level / 4.0))
                .with_metric("ozone", if i % 11 == 0 { None } else { Some(level * 0.8) })
                .with_metric("uv_index", Some(3.0));
            Row::from_observation(["Delhi", "Mumbai", "Kolkata"][i % 3], &obs)
        })
        .collect()
}

fn feature_benchmark(c: &mut Criterion) {
    let profile = DatasetKind::AirQuality.profile();
    let mut group = c.benchmark_group("air_quality_features");
    for n in [100, 1_000, 10_000] {
        let rows = readings(n);
        group.bench_with_input(BenchmarkId::new("engineer", n), &rows, |b, rows| {
            b.iter(|| black_box(profile.engine.engineer(rows.clone())));
        });
        let engineered = profile.engine.engineer(rows);
        group.bench_with_input(BenchmarkId::new("project", n), &engineered, |b, rows| {
            b.iter(|| black_box(profile.schema.project_all(rows)));
        });
    }
    group.finish();

    c.bench_function("batch_ranges_10k", |b| {
        b.iter(|| black_box(batch_ranges(black_box(10_000), black_box(200))));
    });
}

criterion_group!(benches, feature_benchmark);
criterion_main!(benches);
