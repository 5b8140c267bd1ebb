use chrono::{Duration, NaiveDate};
use criterion::{black_box, criterion_group, criterion_main, Criterion};
use epi_forecast::{
    features::{FeatureBuilder, FeatureConfig},
    forecast::ForecastEngine,
    model::{GradientBoostingConfig, GradientBoostingRegressor, Regressor},
    series::TimeSeries,
    types::Target,
};

fn synthetic_series(days: usize) -> TimeSeries {
    let start = NaiveDate::from_ymd_opt(2020, 3, 1).unwrap();
    let dates = (0..days).map(|i| start + Duration::days(i as i64)).collect();
    let cases = (0..days)
        .map(|i| 500.0 + 200.0 * ((i as f64) / 20.0).sin() + (i % 7) as f64 * 15.0)
        .collect();
    TimeSeries::new(dates)
        .unwrap()
        .with_values("new_cases", cases)
        .unwrap()
        .with_values("new_deaths", (0..days).map(|i| (i % 11) as f64).collect())
        .unwrap()
        .with_values("population", vec![67_000_000.0; days])
        .unwrap()
}

fn benchmark_feature_build(c: &mut Criterion) {
    let series = synthetic_series(730);
    let config = FeatureConfig::default();

    c.bench_function("feature_build_730_days", |b| {
        b.iter(|| {
            FeatureBuilder::build(black_box(&series), Target::NewCases, &config).unwrap()
        });
    });
}

fn benchmark_training(c: &mut Criterion) {
    let series = synthetic_series(365);
    let table =
        FeatureBuilder::build(&series, Target::NewCases, &FeatureConfig::default()).unwrap();
    let regressor = GradientBoostingRegressor::new(GradientBoostingConfig {
        n_estimators: 100,
        early_stopping_rounds: None,
        ..GradientBoostingConfig::default()
    })
    .unwrap();

    c.bench_function("gbm_fit_100_trees", |b| {
        b.iter(|| {
            regressor
                .fit(black_box(table.rows()), black_box(table.targets()), None)
                .unwrap()
        });
    });
}

fn benchmark_rollout(c: &mut Criterion) {
    let series = synthetic_series(365);
    let table =
        FeatureBuilder::build(&series, Target::NewCases, &FeatureConfig::default()).unwrap();
    let model = GradientBoostingRegressor::new(GradientBoostingConfig {
        n_estimators: 100,
        early_stopping_rounds: None,
        ..GradientBoostingConfig::default()
    })
    .unwrap()
    .fit(table.rows(), table.targets(), None)
    .unwrap();

    c.bench_function("rollout_30_days", |b| {
        b.iter(|| {
            ForecastEngine::rollout(
                black_box(&table),
                Target::NewCases,
                table.schema(),
                &model,
                30,
                30,
            )
            .unwrap()
        });
    });
}

criterion_group!(
    benches,
    benchmark_feature_build,
    benchmark_training,
    benchmark_rollout
);
criterion_main!(benches);
