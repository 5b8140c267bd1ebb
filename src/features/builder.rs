//! Turns a raw daily series into a supervised-learning table

use super::calendar::CalendarFeatures;
use super::rolling::RollingMean;
use super::schema::{
    FeatureColumn, FeatureSchema, MAX_ROLLING_WINDOW, PER_CAPITA_SCALE, ROLLING_WINDOWS,
};
use crate::error::{ForecastError, Result};
use crate::series::TimeSeries;
use crate::types::{Date, Target, POPULATION_COLUMN};
use serde::{Deserialize, Serialize};

/// Which feature groups to generate and how many lags
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct FeatureConfig {
    pub look_back: usize,
    pub use_lags: bool,
    pub use_rolling: bool,
    pub use_calendar: bool,
}

impl Default for FeatureConfig {
    fn default() -> Self {
        Self {
            look_back: 30,
            use_lags: true,
            use_rolling: true,
            use_calendar: true,
        }
    }
}

impl FeatureConfig {
    /// All groups enabled with the given number of lags
    pub fn with_look_back(look_back: usize) -> Self {
        Self {
            look_back,
            ..Self::default()
        }
    }

    pub fn validate(&self) -> Result<()> {
        if self.use_lags && self.look_back == 0 {
            return Err(ForecastError::InvalidParameter(
                "look_back must be at least 1 when lag features are enabled".to_string(),
            ));
        }
        Ok(())
    }

    /// Index of the first row that can carry a complete feature set
    pub fn warmup_rows(&self) -> usize {
        let lag_warmup = if self.use_lags { self.look_back } else { 0 };
        let rolling_warmup = if self.use_rolling {
            MAX_ROLLING_WINDOW - 1
        } else {
            0
        };
        lag_warmup.max(rolling_warmup)
    }

    /// Every column name this configuration may generate, enabled or not
    fn reserved_names(&self) -> Vec<String> {
        let mut names: Vec<String> = (1..=self.look_back)
            .map(|k| FeatureColumn::Lag(k).name())
            .collect();
        names.extend(ROLLING_WINDOWS.iter().map(|&w| FeatureColumn::RollingMean(w).name()));
        names.extend(
            [
                FeatureColumn::DayOfWeek,
                FeatureColumn::DayOfMonth,
                FeatureColumn::Month,
            ]
            .iter()
            .map(|c| c.name()),
        );
        names.extend(Target::ALL.iter().map(|&t| FeatureColumn::PerCapita(t).name()));
        names
    }
}

/// Feature rows that passed the completeness check, aligned with their schema
#[derive(Debug, Clone, PartialEq)]
pub struct FeatureTable {
    target: Target,
    config: FeatureConfig,
    schema: FeatureSchema,
    dates: Vec<Date>,
    targets: Vec<f64>,
    rows: Vec<Vec<f64>>,
    history: Vec<f64>,
}

impl FeatureTable {
    pub fn target(&self) -> Target {
        self.target
    }

    pub fn config(&self) -> &FeatureConfig {
        &self.config
    }

    pub fn schema(&self) -> &FeatureSchema {
        &self.schema
    }

    pub fn dates(&self) -> &[Date] {
        &self.dates
    }

    /// Target value of every retained row
    pub fn targets(&self) -> &[f64] {
        &self.targets
    }

    /// Feature matrix, one row per retained date
    pub fn rows(&self) -> &[Vec<f64>] {
        &self.rows
    }

    pub fn len(&self) -> usize {
        self.rows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    pub fn last_date(&self) -> Option<Date> {
        self.dates.last().copied()
    }

    pub fn last_row(&self) -> Option<&[f64]> {
        self.rows.last().map(|r| r.as_slice())
    }

    /// Value of one feature on one row
    pub fn value(&self, row: usize, column: &FeatureColumn) -> Option<f64> {
        let idx = self.schema.index_of(column)?;
        self.rows.get(row).map(|r| r[idx])
    }

    /// Whole feature column, if present
    pub fn column(&self, column: &FeatureColumn) -> Option<Vec<f64>> {
        let idx = self.schema.index_of(column)?;
        Some(self.rows.iter().map(|r| r[idx]).collect())
    }

    /// Raw target values ending at the last retained row (at most 30, oldest first)
    pub fn history(&self) -> &[f64] {
        &self.history
    }
}

/// Stateless feature construction
pub struct FeatureBuilder;

impl FeatureBuilder {
    /// Build the feature table for `target`.
    ///
    /// Existing columns that collide with generated feature names are dropped before
    /// generation, so building from an already featured series regenerates instead of
    /// accumulating.
    pub fn build(series: &TimeSeries, target: Target, config: &FeatureConfig) -> Result<FeatureTable> {
        config.validate()?;

        let mut working = series.clone();
        for name in config.reserved_names() {
            if working.remove_column(&name).is_some() {
                log::debug!("Dropped stale feature column '{}'", name);
            }
        }

        let target_values = working.require_column(target.column())?.to_vec();
        let population = working.column(POPULATION_COLUMN).map(|p| p.to_vec());

        let mut columns = Vec::new();
        let mut values: Vec<Vec<Option<f64>>> = Vec::new();

        if config.use_lags {
            for k in 1..=config.look_back {
                columns.push(FeatureColumn::Lag(k));
                values.push(Self::lagged(&target_values, k));
            }
        }

        if config.use_rolling {
            for &window in ROLLING_WINDOWS.iter() {
                columns.push(FeatureColumn::RollingMean(window));
                values.push(RollingMean::compute(window, &target_values)?);
            }
        }

        if config.use_calendar {
            let calendar: Vec<CalendarFeatures> = working
                .dates()
                .iter()
                .map(|&d| CalendarFeatures::from_date(d))
                .collect();
            columns.push(FeatureColumn::DayOfWeek);
            values.push(calendar.iter().map(|c| Some(c.day_of_week as f64)).collect());
            columns.push(FeatureColumn::DayOfMonth);
            values.push(calendar.iter().map(|c| Some(c.day_of_month as f64)).collect());
            columns.push(FeatureColumn::Month);
            values.push(calendar.iter().map(|c| Some(c.month as f64)).collect());
        }

        if let Some(population) = &population {
            for metric in Target::ALL {
                if let Some(counts) = working.column(metric.column()) {
                    columns.push(FeatureColumn::PerCapita(metric));
                    values.push(
                        counts
                            .iter()
                            .zip(population.iter())
                            .map(|(&count, &pop)| Some(per_capita(count, pop)))
                            .collect(),
                    );
                }
            }
        }

        let schema = FeatureSchema::new(columns)?;

        let mut dates = Vec::new();
        let mut targets = Vec::new();
        let mut rows = Vec::new();
        let mut last_idx = None;

        for (i, date) in working.dates().iter().enumerate() {
            let Some(y) = target_values[i] else {
                continue;
            };
            let row: Option<Vec<f64>> = values.iter().map(|column| column[i]).collect();
            if let Some(row) = row {
                dates.push(*date);
                targets.push(y);
                rows.push(row);
                last_idx = Some(i);
            }
        }

        let history = match last_idx {
            Some(idx) => {
                let start = (idx + 1).saturating_sub(MAX_ROLLING_WINDOW);
                target_values[start..=idx].iter().filter_map(|v| *v).collect()
            }
            None => Vec::new(),
        };

        log::debug!(
            "Built {} feature rows for {} from {} observations ({} features)",
            rows.len(),
            target,
            series.len(),
            schema.len()
        );

        Ok(FeatureTable {
            target,
            config: *config,
            schema,
            dates,
            targets,
            rows,
            history,
        })
    }

    fn lagged(values: &[Option<f64>], k: usize) -> Vec<Option<f64>> {
        (0..values.len())
            .map(|i| if i >= k { values[i - k] } else { None })
            .collect()
    }
}

/// Count per 100k inhabitants; anything unresolvable is 0
pub fn per_capita(count: Option<f64>, population: Option<f64>) -> f64 {
    match (count, population) {
        (Some(count), Some(population)) if population != 0.0 => {
            let ratio = count / (population / PER_CAPITA_SCALE);
            if ratio.is_finite() {
                ratio
            } else {
                0.0
            }
        }
        _ => 0.0,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;
    use chrono::{Duration, NaiveDate};

    fn series(len: usize, with_population: bool) -> TimeSeries {
        let start = NaiveDate::from_ymd_opt(2023, 1, 1).unwrap();
        let dates = (0..len).map(|i| start + Duration::days(i as i64)).collect();
        let mut series = TimeSeries::new(dates)
            .unwrap()
            .with_values("new_cases", (1..=len).map(|v| v as f64).collect())
            .unwrap()
            .with_values("new_deaths", vec![0.0; len])
            .unwrap();
        if with_population {
            series = series.with_values("population", vec![1000.0; len]).unwrap();
        }
        series
    }

    #[test]
    fn test_lag_values() {
        let config = FeatureConfig {
            look_back: 2,
            use_lags: true,
            use_rolling: false,
            use_calendar: false,
        };
        let table = FeatureBuilder::build(&series(5, false), Target::NewCases, &config).unwrap();
        assert_eq!(table.len(), 3);
        assert_eq!(table.targets(), &[3.0, 4.0, 5.0]);
        assert_eq!(table.column(&FeatureColumn::Lag(1)).unwrap(), vec![2.0, 3.0, 4.0]);
        assert_eq!(table.column(&FeatureColumn::Lag(2)).unwrap(), vec![1.0, 2.0, 3.0]);
    }

    #[test]
    fn test_short_series_gives_empty_table() {
        // Rolling-30 cannot be filled from 5 rows
        let table = FeatureBuilder::build(
            &series(5, true),
            Target::NewCases,
            &FeatureConfig::with_look_back(2),
        )
        .unwrap();
        assert!(table.is_empty());
        assert!(table.history().is_empty());
        assert!(table.schema().contains(&FeatureColumn::Lag(1)));
        assert!(table.schema().contains(&FeatureColumn::RollingMean(7)));
    }

    #[test]
    fn test_rolling_means_inclusive_window() {
        let table = FeatureBuilder::build(
            &series(40, false),
            Target::NewCases,
            &FeatureConfig::with_look_back(5),
        )
        .unwrap();
        // First retained row is the 30th observation (value 30)
        assert_eq!(table.targets()[0], 30.0);
        assert_relative_eq!(table.value(0, &FeatureColumn::RollingMean(7)).unwrap(), 27.0);
        assert_relative_eq!(table.value(0, &FeatureColumn::RollingMean(30)).unwrap(), 15.5);
    }

    #[test]
    fn test_per_capita_coercion() {
        assert_relative_eq!(per_capita(Some(5.0), Some(1000.0)), 500.0);
        assert_eq!(per_capita(Some(5.0), Some(0.0)), 0.0);
        assert_eq!(per_capita(None, Some(1000.0)), 0.0);
        assert_eq!(per_capita(Some(5.0), None), 0.0);
    }

    #[test]
    fn test_zero_look_back_rejected() {
        let config = FeatureConfig::with_look_back(0);
        let result = FeatureBuilder::build(&series(40, false), Target::NewCases, &config);
        assert!(matches!(result, Err(ForecastError::InvalidParameter(_))));
    }

    #[test]
    fn test_history_is_capped() {
        let table = FeatureBuilder::build(
            &series(60, false),
            Target::NewCases,
            &FeatureConfig::with_look_back(5),
        )
        .unwrap();
        assert_eq!(table.history().len(), MAX_ROLLING_WINDOW);
        assert_eq!(*table.history().last().unwrap(), 60.0);
        assert_eq!(table.history()[0], 31.0);
    }

    #[test]
    fn test_warmup_rows() {
        assert_eq!(FeatureConfig::with_look_back(5).warmup_rows(), 29);
        assert_eq!(FeatureConfig::with_look_back(45).warmup_rows(), 45);
        let config = FeatureConfig {
            look_back: 3,
            use_lags: true,
            use_rolling: false,
            use_calendar: true,
        };
        assert_eq!(config.warmup_rows(), 3);
    }
}
