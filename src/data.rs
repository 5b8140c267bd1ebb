//! Historical daily count sources

pub mod csv_source;
#[cfg(feature = "rusqlite-support")]
pub mod sqlite;

pub use csv_source::{CsvFormat, CsvSource};
#[cfg(feature = "rusqlite-support")]
pub use sqlite::SqliteSource;

use crate::error::{ForecastError, Result};
use crate::series::TimeSeries;
use crate::types::{Target, POPULATION_COLUMN};
use hashbrown::HashMap;

/// Provider of one region's daily series
pub trait DataSource {
    /// Load the region's series with whichever of `targets` exist, plus `population` when
    /// available. Absent target columns are not an error; an unknown region is.
    fn load(&self, region: &str, targets: &[Target]) -> Result<TimeSeries>;

    fn name(&self) -> &str;
}

/// Names of the columns a source should try to read for `targets`
pub(crate) fn wanted_columns(targets: &[Target]) -> Vec<&'static str> {
    let mut columns: Vec<&'static str> = Vec::new();
    for target in targets {
        if !columns.contains(&target.column()) {
            columns.push(target.column());
        }
    }
    // Per-capita features cover every metric column that exists
    for target in Target::ALL {
        if !columns.contains(&target.column()) {
            columns.push(target.column());
        }
    }
    columns.push(POPULATION_COLUMN);
    columns
}

/// Series held in memory, keyed by region
#[derive(Debug, Clone, Default)]
pub struct InMemorySource {
    regions: HashMap<String, TimeSeries>,
}

impl InMemorySource {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_region(mut self, region: impl Into<String>, series: TimeSeries) -> Self {
        self.insert(region, series);
        self
    }

    pub fn insert(&mut self, region: impl Into<String>, series: TimeSeries) {
        self.regions.insert(region.into(), series);
    }

    pub fn regions(&self) -> Vec<&str> {
        let mut names: Vec<&str> = self.regions.keys().map(|k| k.as_str()).collect();
        names.sort_unstable();
        names
    }
}

impl DataSource for InMemorySource {
    fn load(&self, region: &str, _targets: &[Target]) -> Result<TimeSeries> {
        self.regions
            .get(region)
            .cloned()
            .ok_or_else(|| {
                ForecastError::DataError(format!(
                    "No data for region '{}' (available: {})",
                    region,
                    self.regions().join(", ")
                ))
            })
    }

    fn name(&self) -> &str {
        "memory"
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::NaiveDate;

    #[test]
    fn test_in_memory_source() {
        let dates = vec![NaiveDate::from_ymd_opt(2023, 1, 1).unwrap()];
        let series = TimeSeries::new(dates)
            .unwrap()
            .with_values("new_cases", vec![1.0])
            .unwrap();
        let source = InMemorySource::new().with_region("France", series.clone());

        assert_eq!(source.load("France", &Target::defaults()).unwrap(), series);
        match source.load("Spain", &Target::defaults()) {
            Err(ForecastError::DataError(msg)) => assert!(msg.ends_with("(available: France)")),
            other => panic!("Expected DataError, got {:?}", other),
        }
        assert_eq!(source.regions(), vec!["France"]);
    }

    #[test]
    fn test_wanted_columns() {
        let columns = wanted_columns(&[Target::NewDeaths]);
        assert_eq!(columns[0], "new_deaths");
        assert_eq!(columns.len(), 4);
        assert_eq!(*columns.last().unwrap(), "population");
    }
}
