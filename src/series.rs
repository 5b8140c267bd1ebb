//! Daily time series of epidemiological counts

use crate::error::{ForecastError, Result};
use crate::types::Date;
use chrono::Duration;
use std::collections::BTreeMap;

/// A column of daily values; `None` marks a missing or non-numeric cell
pub type Column = Vec<Option<f64>>;

/// Ordered daily observations, one row per date
#[derive(Debug, Clone, PartialEq)]
pub struct TimeSeries {
    dates: Vec<Date>,
    columns: BTreeMap<String, Column>,
}

impl TimeSeries {
    /// Create a series over the given dates with no columns yet.
    ///
    /// Dates must be strictly increasing. Gaps are accepted and logged.
    pub fn new(dates: Vec<Date>) -> Result<Self> {
        for pair in dates.windows(2) {
            if pair[1] <= pair[0] {
                return Err(ForecastError::DataError(format!(
                    "Dates must be strictly increasing: {} followed by {}",
                    pair[0], pair[1]
                )));
            }
        }

        let series = Self {
            dates,
            columns: BTreeMap::new(),
        };

        let gaps = series.gaps();
        if !gaps.is_empty() {
            log::warn!(
                "Series has {} calendar gap(s), first after {}",
                gaps.len(),
                gaps[0].0
            );
        }

        Ok(series)
    }

    /// Builder-style column insertion
    pub fn with_column(mut self, name: impl Into<String>, values: Column) -> Result<Self> {
        self.insert_column(name, values)?;
        Ok(self)
    }

    /// Builder-style insertion of a fully populated column
    pub fn with_values(self, name: impl Into<String>, values: Vec<f64>) -> Result<Self> {
        self.with_column(name, values.into_iter().map(Some).collect())
    }

    /// Insert or replace a column
    pub fn insert_column(&mut self, name: impl Into<String>, values: Column) -> Result<()> {
        let name = name.into();
        if values.len() != self.dates.len() {
            return Err(ForecastError::DataError(format!(
                "Column '{}' has {} values for {} dates",
                name,
                values.len(),
                self.dates.len()
            )));
        }
        self.columns.insert(name, values);
        Ok(())
    }

    /// Remove a column, returning its values if it existed
    pub fn remove_column(&mut self, name: &str) -> Option<Column> {
        self.columns.remove(name)
    }

    /// Get a column by name
    pub fn column(&self, name: &str) -> Option<&[Option<f64>]> {
        self.columns.get(name).map(|c| c.as_slice())
    }

    /// Get a column or fail with `MissingColumn`
    pub fn require_column(&self, name: &str) -> Result<&[Option<f64>]> {
        self.column(name)
            .ok_or_else(|| ForecastError::MissingColumn(name.to_string()))
    }

    pub fn has_column(&self, name: &str) -> bool {
        self.columns.contains_key(name)
    }

    pub fn dates(&self) -> &[Date] {
        &self.dates
    }

    pub fn len(&self) -> usize {
        self.dates.len()
    }

    pub fn is_empty(&self) -> bool {
        self.dates.is_empty()
    }

    pub fn first_date(&self) -> Option<Date> {
        self.dates.first().copied()
    }

    pub fn last_date(&self) -> Option<Date> {
        self.dates.last().copied()
    }

    /// Consecutive date pairs that are more than one day apart
    pub fn gaps(&self) -> Vec<(Date, Date)> {
        self.dates
            .windows(2)
            .filter(|pair| pair[1] - pair[0] > Duration::days(1))
            .map(|pair| (pair[0], pair[1]))
            .collect()
    }
}

/// Accumulates loosely ordered cells and produces a validated series
#[derive(Debug, Default)]
pub struct SeriesBuilder {
    rows: BTreeMap<Date, BTreeMap<String, Option<f64>>>,
    columns: Vec<String>,
}

impl SeriesBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    /// Declare a column so it exists even if every cell is missing
    pub fn declare_column(&mut self, name: &str) {
        if !self.columns.iter().any(|c| c == name) {
            self.columns.push(name.to_string());
        }
    }

    /// Record one cell. A second value for the same date and column is a data error.
    pub fn add(&mut self, date: Date, column: &str, value: Option<f64>) -> Result<()> {
        self.declare_column(column);
        let row = self.rows.entry(date).or_default();
        if row.insert(column.to_string(), value).is_some() {
            return Err(ForecastError::DataError(format!(
                "Duplicate value for '{}' on {}",
                column, date
            )));
        }
        Ok(())
    }

    /// Number of distinct dates recorded so far
    pub fn row_count(&self) -> usize {
        self.rows.len()
    }

    /// Sort by date and assemble the series
    pub fn finish(self) -> Result<TimeSeries> {
        let dates: Vec<Date> = self.rows.keys().copied().collect();
        let mut series = TimeSeries::new(dates)?;

        for name in &self.columns {
            let values = self
                .rows
                .values()
                .map(|row| row.get(name).copied().flatten())
                .collect();
            series.insert_column(name.clone(), values)?;
        }

        Ok(series)
    }
}

/// Lenient numeric coercion: anything unparsable or non-finite becomes missing
pub fn coerce_numeric(raw: &str) -> Option<f64> {
    raw.trim()
        .parse::<f64>()
        .ok()
        .filter(|value| value.is_finite())
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::NaiveDate;

    fn day(d: u32) -> Date {
        NaiveDate::from_ymd_opt(2023, 1, d).unwrap()
    }

    #[test]
    fn test_series_rejects_unordered_dates() {
        assert!(TimeSeries::new(vec![day(2), day(1)]).is_err());
        assert!(TimeSeries::new(vec![day(1), day(1)]).is_err());
        assert!(TimeSeries::new(vec![day(1), day(2)]).is_ok());
    }

    #[test]
    fn test_column_length_validation() {
        let series = TimeSeries::new(vec![day(1), day(2)]).unwrap();
        assert!(series.clone().with_values("new_cases", vec![1.0]).is_err());
        let series = series.with_values("new_cases", vec![1.0, 2.0]).unwrap();
        assert_eq!(series.column("new_cases").unwrap(), &[Some(1.0), Some(2.0)]);
    }

    #[test]
    fn test_require_column_reports_missing() {
        let series = TimeSeries::new(vec![day(1)]).unwrap();
        match series.require_column("new_deaths") {
            Err(ForecastError::MissingColumn(name)) => assert_eq!(name, "new_deaths"),
            other => panic!("Expected MissingColumn, got {:?}", other),
        }
    }

    #[test]
    fn test_gaps_detected() {
        let series = TimeSeries::new(vec![day(1), day(2), day(5)]).unwrap();
        assert_eq!(series.gaps(), vec![(day(2), day(5))]);
    }

    #[test]
    fn test_builder_sorts_and_fills_missing() {
        let mut builder = SeriesBuilder::new();
        builder.add(day(3), "new_cases", Some(3.0)).unwrap();
        builder.add(day(1), "new_cases", Some(1.0)).unwrap();
        builder.add(day(1), "population", Some(1000.0)).unwrap();
        builder.declare_column("new_deaths");

        let series = builder.finish().unwrap();
        assert_eq!(series.dates(), &[day(1), day(3)]);
        assert_eq!(series.column("population").unwrap(), &[Some(1000.0), None]);
        assert_eq!(series.column("new_deaths").unwrap(), &[None, None]);
    }

    #[test]
    fn test_builder_rejects_duplicates() {
        let mut builder = SeriesBuilder::new();
        builder.add(day(1), "new_cases", Some(1.0)).unwrap();
        assert!(builder.add(day(1), "new_cases", Some(2.0)).is_err());
    }

    #[test]
    fn test_coerce_numeric() {
        assert_eq!(coerce_numeric(" 12.5 "), Some(12.5));
        assert_eq!(coerce_numeric("n/a"), None);
        assert_eq!(coerce_numeric(""), None);
        assert_eq!(coerce_numeric("NaN"), None);
        assert_eq!(coerce_numeric("inf"), None);
    }
}
