//! Integration tests for the file and database sources feeding a full run

use chrono::{Duration, NaiveDate};
use epi_forecast::data::{CsvSource, DataSource};
use epi_forecast::model::GradientBoostingConfig;
use epi_forecast::pipeline::{ForecastPipeline, RunConfig};
use epi_forecast::types::Target;
use std::fmt::Write as _;
use std::fs;
use tempfile::TempDir;

fn start() -> NaiveDate {
    NaiveDate::from_ymd_opt(2021, 1, 1).unwrap()
}

fn cases(i: usize) -> f64 {
    200.0 + (i % 7) as f64 * 12.0 + i as f64
}

fn deaths(i: usize) -> f64 {
    (3 + i % 4) as f64
}

fn quick_config(dir: &TempDir, region: &str) -> RunConfig {
    RunConfig {
        region: region.to_string(),
        days_ahead: 4,
        training: GradientBoostingConfig {
            n_estimators: 30,
            max_depth: 3,
            ..GradientBoostingConfig::default()
        },
        model_dir: dir.path().join("models"),
        output_dir: dir.path().join("out"),
        ..RunConfig::default()
    }
}

fn write_csv(dir: &TempDir, days: usize) -> std::path::PathBuf {
    let mut body = String::from("region,date,new_cases,new_deaths,population\n");
    for region in ["France", "Italy"] {
        for i in 0..days {
            let date = start() + Duration::days(i as i64);
            // A blank cell is a missing value
            let death = if i == 3 { String::new() } else { deaths(i).to_string() };
            writeln!(body, "{},{},{},{},67000000", region, date, cases(i), death).unwrap();
        }
    }
    let path = dir.path().join("daily.csv");
    fs::write(&path, body).unwrap();
    path
}

#[test]
fn test_csv_source_loads_one_region() {
    let dir = TempDir::new().unwrap();
    let source = CsvSource::new(write_csv(&dir, 50));

    let series = source.load("Italy", &Target::defaults()).unwrap();
    assert_eq!(series.len(), 50);
    assert_eq!(series.first_date(), Some(start()));
    assert_eq!(series.column("new_deaths").unwrap()[3], None);
    assert_eq!(series.column("new_cases").unwrap()[10], Some(cases(10)));
    assert!(series.has_column("population"));
}

#[test]
fn test_csv_source_drives_pipeline() {
    let dir = TempDir::new().unwrap();
    let source = CsvSource::new(write_csv(&dir, 100));

    let summary = ForecastPipeline::new(quick_config(&dir, "France"))
        .unwrap()
        .run(&source)
        .unwrap();

    assert_eq!(summary.succeeded(), 2);
    let forecast = summary.forecast(Target::NewDeaths).unwrap();
    assert_eq!(forecast.len(), 4);
    assert_eq!(
        forecast.dates()[0],
        start() + Duration::days(100)
    );

    let combined = fs::read_to_string(summary.combined.unwrap()).unwrap();
    assert_eq!(
        combined.lines().next().unwrap(),
        "date,predicted_new_cases,predicted_new_deaths"
    );
    assert_eq!(combined.lines().count(), 5);
}

#[test]
fn test_csv_source_missing_file() {
    let dir = TempDir::new().unwrap();
    let source = CsvSource::new(dir.path().join("absent.csv"));
    assert!(source.load("France", &Target::defaults()).is_err());
}

#[cfg(feature = "rusqlite-support")]
mod sqlite {
    use super::*;
    use epi_forecast::data::SqliteSource;

    fn seeded(days: usize) -> SqliteSource {
        let source = SqliteSource::open_in_memory().unwrap();
        for i in 0..days {
            let date = start() + Duration::days(i as i64);
            source
                .insert(
                    "Spain",
                    date,
                    &[
                        ("new_cases", Some(cases(i))),
                        ("new_deaths", Some(deaths(i))),
                        ("population", Some(47_000_000.0)),
                    ],
                )
                .unwrap();
        }
        source
    }

    #[test]
    fn test_sqlite_source_drives_pipeline() {
        let dir = TempDir::new().unwrap();
        let source = seeded(90);

        let summary = ForecastPipeline::new(quick_config(&dir, "Spain"))
            .unwrap()
            .run(&source)
            .unwrap();

        assert_eq!(summary.succeeded(), 2);
        assert!(dir.path().join("models/Spain_new_cases_model.json").exists());
        assert!(dir.path().join("out/Spain_new_deaths_predictions.csv").exists());
    }

    #[test]
    fn test_sqlite_file_round_trip() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("counts.db");
        {
            let source = SqliteSource::open(&path).unwrap();
            source.create_schema().unwrap();
            source
                .insert("Spain", start(), &[("new_cases", Some(5.0))])
                .unwrap();
        }

        let reopened = SqliteSource::open(&path).unwrap();
        assert_eq!(reopened.regions().unwrap(), vec!["Spain".to_string()]);
        let series = reopened.load("Spain", &[Target::NewCases]).unwrap();
        assert_eq!(series.len(), 1);
        assert_eq!(series.column("new_cases").unwrap()[0], Some(5.0));
    }

    #[test]
    fn test_sqlite_unknown_region_aborts_run() {
        let dir = TempDir::new().unwrap();
        let source = seeded(40);
        let result = ForecastPipeline::new(quick_config(&dir, "Portugal"))
            .unwrap()
            .run(&source);
        assert!(result.is_err());
    }
}
