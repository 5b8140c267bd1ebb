//! Recursive multi-step forecasting
//!
//! The engine seeds a [`FeatureState`] from the last row of a feature table and rolls it
//! forward one day at a time. Every step predicts from the current state and derives a new
//! state from the prediction; states are never mutated in place.
//!
//! Lags form a shift register driven by the chain of predictions, rolling means are
//! recomputed from the carried target history, calendar columns are recomputed from the new
//! date and per-capita columns are carried unchanged. Prediction error compounds over the
//! horizon.

use crate::error::{ForecastError, Result};
use crate::features::{
    trailing_mean, CalendarFeatures, FeatureColumn, FeatureSchema, FeatureTable,
    MAX_ROLLING_WINDOW,
};
use crate::model::Predictor;
use crate::types::{Date, ForecastRow, Target};

/// Feature values for one date during a rollout
#[derive(Debug, Clone, PartialEq)]
pub struct FeatureState {
    date: Date,
    schema: FeatureSchema,
    values: Vec<f64>,
    history: Vec<f64>,
}

impl FeatureState {
    pub fn new(date: Date, schema: FeatureSchema, values: Vec<f64>, history: Vec<f64>) -> Result<Self> {
        if values.len() != schema.len() {
            return Err(ForecastError::SchemaMismatch(format!(
                "{} values for a schema of {} columns",
                values.len(),
                schema.len()
            )));
        }
        Ok(Self {
            date,
            schema,
            values,
            history,
        })
    }

    /// Last row of `table` with its raw target history
    pub fn from_table(table: &FeatureTable) -> Result<Self> {
        match (table.last_date(), table.last_row()) {
            (Some(date), Some(row)) => Self::new(
                date,
                table.schema().clone(),
                row.to_vec(),
                table.history().to_vec(),
            ),
            _ => Err(ForecastError::EmptyHistory),
        }
    }

    pub fn date(&self) -> Date {
        self.date
    }

    pub fn schema(&self) -> &FeatureSchema {
        &self.schema
    }

    pub fn values(&self) -> &[f64] {
        &self.values
    }

    pub fn value(&self, column: &FeatureColumn) -> Option<f64> {
        self.schema.index_of(column).map(|i| self.values[i])
    }

    /// Recent target values, oldest first, at most 30
    pub fn history(&self) -> &[f64] {
        &self.history
    }

    /// State for `next_date` after `prediction` has been made
    pub fn advance(&self, prediction: f64, next_date: Date, look_back: usize) -> FeatureState {
        let mut values = self.values.clone();
        let calendar = CalendarFeatures::from_date(next_date);

        for (i, column) in self.schema.columns().iter().enumerate() {
            match *column {
                FeatureColumn::Lag(1) => values[i] = prediction,
                FeatureColumn::Lag(k) if k <= look_back => {
                    if let Some(previous) = self.value(&FeatureColumn::Lag(k - 1)) {
                        values[i] = previous;
                    }
                }
                FeatureColumn::Lag(_) => {}
                FeatureColumn::RollingMean(window) => {
                    values[i] = trailing_mean(&self.history, window, prediction);
                }
                FeatureColumn::DayOfWeek => values[i] = calendar.day_of_week as f64,
                FeatureColumn::DayOfMonth => values[i] = calendar.day_of_month as f64,
                FeatureColumn::Month => values[i] = calendar.month as f64,
                FeatureColumn::PerCapita(_) => {}
            }
        }

        let mut history = self.history.clone();
        history.push(prediction);
        if history.len() > MAX_ROLLING_WINDOW {
            history.drain(..history.len() - MAX_ROLLING_WINDOW);
        }

        FeatureState {
            date: next_date,
            schema: self.schema.clone(),
            values,
            history,
        }
    }
}

/// Predicted values for one target, one row per day
#[derive(Debug, Clone, PartialEq)]
pub struct Forecast {
    pub target: Target,
    pub rows: Vec<ForecastRow>,
}

impl Forecast {
    pub fn len(&self) -> usize {
        self.rows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    pub fn dates(&self) -> Vec<Date> {
        self.rows.iter().map(|r| r.date).collect()
    }

    pub fn values(&self) -> Vec<f64> {
        self.rows.iter().map(|r| r.predicted_value).collect()
    }

    /// Copy with negative predictions raised to zero
    pub fn clipped(&self) -> Forecast {
        Forecast {
            target: self.target,
            rows: self.rows.iter().map(ForecastRow::clipped).collect(),
        }
    }
}

/// Rolls a single-step model forward over a feature state
pub struct ForecastEngine<'a> {
    model: &'a dyn Predictor,
    inputs: Vec<usize>,
    look_back: usize,
}

impl<'a> ForecastEngine<'a> {
    /// Bind `model` to a table schema.
    ///
    /// `feature_names` is the model's input schema; every column in it must exist in
    /// `table_schema` and its width must match what the model expects.
    pub fn new(
        model: &'a dyn Predictor,
        table_schema: &FeatureSchema,
        feature_names: &FeatureSchema,
        look_back: usize,
    ) -> Result<Self> {
        let inputs = table_schema.projection(feature_names)?;
        if inputs.len() != model.n_features() {
            return Err(ForecastError::SchemaMismatch(format!(
                "model expects {} features but {} were named",
                model.n_features(),
                inputs.len()
            )));
        }
        Ok(Self {
            model,
            inputs,
            look_back,
        })
    }

    pub fn seed(&self, table: &FeatureTable) -> Result<FeatureState> {
        FeatureState::from_table(table)
    }

    /// Predict the day after `state` and derive the following state
    pub fn step(&self, state: &FeatureState) -> Result<(ForecastRow, FeatureState)> {
        let date = state.date().succ_opt().ok_or_else(|| {
            ForecastError::InvalidParameter(format!("Cannot advance past {}", state.date()))
        })?;

        let features: Vec<f64> = self.inputs.iter().map(|&i| state.values[i]).collect();
        let prediction = self.model.predict_one(&features)?;

        Ok((
            ForecastRow::new(date, prediction),
            state.advance(prediction, date, self.look_back),
        ))
    }

    /// Run `days_ahead` steps from `seed`
    pub fn run(&self, seed: FeatureState, days_ahead: usize) -> Result<Vec<ForecastRow>> {
        let mut rows = Vec::with_capacity(days_ahead);
        let mut state = seed;
        for _ in 0..days_ahead {
            let (row, next) = self.step(&state)?;
            rows.push(row);
            state = next;
        }
        Ok(rows)
    }

    /// Forecast `days_ahead` days after the last row of `table`
    pub fn rollout(
        table: &FeatureTable,
        target: Target,
        feature_names: &FeatureSchema,
        model: &dyn Predictor,
        days_ahead: usize,
        look_back: usize,
    ) -> Result<Forecast> {
        if table.target() != target {
            return Err(ForecastError::SchemaMismatch(format!(
                "feature table was built for {}, not {}",
                table.target(),
                target
            )));
        }

        let engine = ForecastEngine::new(model, table.schema(), feature_names, look_back)?;
        let seed = engine.seed(table)?;
        let rows = engine.run(seed, days_ahead)?;

        log::debug!(
            "Rolled {} forward {} days from {:?}",
            target,
            rows.len(),
            table.last_date()
        );

        Ok(Forecast { target, rows })
    }
}
