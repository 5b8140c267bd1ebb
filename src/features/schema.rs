//! Typed feature schema shared by the builder, the trainer and the forecaster

use crate::error::{ForecastError, Result};
use crate::types::Target;
use serde::{Deserialize, Serialize};
use std::fmt;

/// Fixed trailing windows for rolling means
pub const ROLLING_WINDOWS: [usize; 2] = [7, 30];

/// Longest rolling window; also the length of carried target history
pub const MAX_ROLLING_WINDOW: usize = 30;

/// Per-capita features are expressed per this many inhabitants
pub const PER_CAPITA_SCALE: f64 = 100_000.0;

/// Feature families that can be switched on and off together
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum FeatureGroup {
    Lags,
    Rolling,
    Calendar,
    PerCapita,
}

/// One model input column
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum FeatureColumn {
    /// Target value `k` rows earlier
    Lag(usize),
    /// Trailing mean over a window ending at the current row
    RollingMean(usize),
    DayOfWeek,
    DayOfMonth,
    Month,
    /// Metric per 100k inhabitants
    PerCapita(Target),
}

impl FeatureColumn {
    /// Column name as written in tables and reports
    pub fn name(&self) -> String {
        match self {
            FeatureColumn::Lag(k) => format!("lag_{}", k),
            FeatureColumn::RollingMean(w) => format!("rolling_{}_mean", w),
            FeatureColumn::DayOfWeek => "day_of_week".to_string(),
            FeatureColumn::DayOfMonth => "day_of_month".to_string(),
            FeatureColumn::Month => "month".to_string(),
            FeatureColumn::PerCapita(target) => format!("{}_per_100k", target.stem()),
        }
    }

    pub fn group(&self) -> FeatureGroup {
        match self {
            FeatureColumn::Lag(_) => FeatureGroup::Lags,
            FeatureColumn::RollingMean(_) => FeatureGroup::Rolling,
            FeatureColumn::DayOfWeek | FeatureColumn::DayOfMonth | FeatureColumn::Month => {
                FeatureGroup::Calendar
            }
            FeatureColumn::PerCapita(_) => FeatureGroup::PerCapita,
        }
    }
}

impl fmt::Display for FeatureColumn {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.name())
    }
}

/// Ordered set of feature columns; the single source of truth for model inputs
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct FeatureSchema {
    columns: Vec<FeatureColumn>,
}

impl FeatureSchema {
    /// Create a schema, rejecting duplicate columns
    pub fn new(columns: Vec<FeatureColumn>) -> Result<Self> {
        for (i, column) in columns.iter().enumerate() {
            if columns[..i].contains(column) {
                return Err(ForecastError::InvalidParameter(format!(
                    "Duplicate feature column: {}",
                    column
                )));
            }
        }
        Ok(Self { columns })
    }

    pub fn columns(&self) -> &[FeatureColumn] {
        &self.columns
    }

    pub fn len(&self) -> usize {
        self.columns.len()
    }

    pub fn is_empty(&self) -> bool {
        self.columns.is_empty()
    }

    pub fn names(&self) -> Vec<String> {
        self.columns.iter().map(|c| c.name()).collect()
    }

    pub fn index_of(&self, column: &FeatureColumn) -> Option<usize> {
        self.columns.iter().position(|c| c == column)
    }

    pub fn contains(&self, column: &FeatureColumn) -> bool {
        self.index_of(column).is_some()
    }

    pub fn has_group(&self, group: FeatureGroup) -> bool {
        self.columns.iter().any(|c| c.group() == group)
    }

    /// Positions in `self` of every column of `requested`, in `requested` order.
    ///
    /// Fails with `SchemaMismatch` if any requested column is absent.
    pub fn projection(&self, requested: &FeatureSchema) -> Result<Vec<usize>> {
        requested
            .columns
            .iter()
            .map(|column| {
                self.index_of(column).ok_or_else(|| {
                    ForecastError::SchemaMismatch(format!(
                        "feature '{}' is not present in the table (available: {})",
                        column,
                        self.names().join(", ")
                    ))
                })
            })
            .collect()
    }
}
