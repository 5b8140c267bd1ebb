//! Daily counts from a CSV file

use super::{wanted_columns, DataSource};
use crate::error::{ForecastError, Result};
use crate::series::{coerce_numeric, SeriesBuilder, TimeSeries};
use crate::types::Target;
use chrono::NaiveDate;
use csv::ReaderBuilder;
use std::path::{Path, PathBuf};

/// CSV layout
#[derive(Debug, Clone)]
pub struct CsvFormat {
    pub date_column: String,
    /// Rows are filtered on this column when the file has it
    pub region_column: String,
    /// Date format string (e.g., "%Y-%m-%d")
    pub date_format: String,
    pub delimiter: u8,
}

impl Default for CsvFormat {
    fn default() -> Self {
        Self {
            date_column: "date".to_string(),
            region_column: "region".to_string(),
            date_format: "%Y-%m-%d".to_string(),
            delimiter: b',',
        }
    }
}

/// CSV file with a `date` column, an optional `region` column and metric columns
pub struct CsvSource {
    path: PathBuf,
    format: CsvFormat,
}

impl CsvSource {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            format: CsvFormat::default(),
        }
    }

    pub fn with_format(path: impl Into<PathBuf>, format: CsvFormat) -> Self {
        Self {
            path: path.into(),
            format,
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    fn find_column(headers: &csv::StringRecord, name: &str) -> Option<usize> {
        headers.iter().position(|h| h.trim().eq_ignore_ascii_case(name))
    }
}

impl DataSource for CsvSource {
    fn load(&self, region: &str, targets: &[Target]) -> Result<TimeSeries> {
        let mut rdr = ReaderBuilder::new()
            .delimiter(self.format.delimiter)
            .has_headers(true)
            .from_path(&self.path)
            .map_err(|e| {
                ForecastError::DataError(format!("Failed to open CSV {:?}: {}", self.path, e))
            })?;

        let headers = rdr.headers()?.clone();
        let date_idx = Self::find_column(&headers, &self.format.date_column).ok_or_else(|| {
            ForecastError::MissingColumn(self.format.date_column.clone())
        })?;
        let region_idx = Self::find_column(&headers, &self.format.region_column);

        let columns: Vec<(&str, usize)> = wanted_columns(targets)
            .into_iter()
            .filter_map(|name| Self::find_column(&headers, name).map(|idx| (name, idx)))
            .collect();
        if columns.is_empty() {
            return Err(ForecastError::DataError(format!(
                "{:?} has no metric columns",
                self.path
            )));
        }

        let mut builder = SeriesBuilder::new();
        for (name, _) in &columns {
            builder.declare_column(name);
        }

        for result in rdr.records() {
            let record = result?;

            if let Some(idx) = region_idx {
                if record.get(idx).map(str::trim) != Some(region) {
                    continue;
                }
            }

            let raw_date = record
                .get(date_idx)
                .ok_or_else(|| ForecastError::DataError("Missing date".to_string()))?
                .trim();
            let date = NaiveDate::parse_from_str(raw_date, &self.format.date_format).map_err(
                |_| ForecastError::DataError(format!("Invalid date format: {}", raw_date)),
            )?;

            for (name, idx) in &columns {
                let value = record.get(*idx).and_then(coerce_numeric);
                builder.add(date, name, value)?;
            }
        }

        if builder.row_count() == 0 {
            return Err(ForecastError::DataError(format!(
                "No rows for region '{}' in {:?}",
                region, self.path
            )));
        }

        let series = builder.finish()?;
        log::info!(
            "Loaded {} days for {} from {:?}",
            series.len(),
            region,
            self.path
        );
        Ok(series)
    }

    fn name(&self) -> &str {
        "csv"
    }
}
