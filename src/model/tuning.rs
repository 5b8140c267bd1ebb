//! Small grid search for boosting hyper-parameters

use super::gbm::{GradientBoostingConfig, GradientBoostingRegressor};
use super::metrics::{chronological_split, root_mean_squared_error};
use super::{Predictor, Regressor};
use crate::error::{ForecastError, Result};
use serde::{Deserialize, Serialize};

/// Candidate values; every combination is evaluated
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct TuningGrid {
    pub learning_rates: Vec<f64>,
    pub max_depths: Vec<usize>,
    pub subsamples: Vec<f64>,
    /// Fraction of the training rows held back for scoring candidates
    pub validation_fraction: f64,
}

impl Default for TuningGrid {
    fn default() -> Self {
        Self {
            learning_rates: vec![0.03, 0.05, 0.1],
            max_depths: vec![3, 4, 6],
            subsamples: vec![0.8, 0.9],
            validation_fraction: 0.2,
        }
    }
}

impl TuningGrid {
    /// Every candidate configuration derived from `base`
    pub fn candidates(&self, base: &GradientBoostingConfig) -> Vec<GradientBoostingConfig> {
        let mut out = Vec::new();
        for &learning_rate in &self.learning_rates {
            for &max_depth in &self.max_depths {
                for &subsample in &self.subsamples {
                    out.push(GradientBoostingConfig {
                        learning_rate,
                        max_depth,
                        subsample,
                        ..*base
                    });
                }
            }
        }
        out
    }
}

/// Winning configuration and its validation score
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct TuningOutcome {
    pub config: GradientBoostingConfig,
    pub validation_rmse: f64,
    pub candidates_evaluated: usize,
}

/// Pick the candidate with the lowest RMSE on the chronologically last slice of `x`/`y`
pub fn tune(
    grid: &TuningGrid,
    base: &GradientBoostingConfig,
    x: &[Vec<f64>],
    y: &[f64],
) -> Result<TuningOutcome> {
    let split = chronological_split(x.len(), grid.validation_fraction)?;
    let (fit_x, val_x) = x.split_at(split);
    let (fit_y, val_y) = y.split_at(split);

    let mut best: Option<TuningOutcome> = None;
    let mut evaluated = 0;

    for candidate in grid.candidates(base) {
        let regressor = match GradientBoostingRegressor::new(candidate) {
            Ok(regressor) => regressor,
            Err(e) => {
                log::warn!("Skipping invalid candidate {:?}: {}", candidate, e);
                continue;
            }
        };
        let model = regressor.fit(fit_x, fit_y, Some((val_x, val_y)))?;
        let score = root_mean_squared_error(val_y, &model.predict(val_x)?);
        evaluated += 1;

        log::debug!(
            "lr={} depth={} subsample={} -> validation RMSE {:.4}",
            candidate.learning_rate,
            candidate.max_depth,
            candidate.subsample,
            score
        );

        if best.map_or(true, |b| score < b.validation_rmse) {
            best = Some(TuningOutcome {
                config: candidate,
                validation_rmse: score,
                candidates_evaluated: 0,
            });
        }
    }

    let mut outcome = best.ok_or_else(|| {
        ForecastError::InvalidParameter("Tuning grid has no valid candidates".to_string())
    })?;
    outcome.candidates_evaluated = evaluated;

    log::info!(
        "Tuning picked lr={} depth={} subsample={} (validation RMSE {:.4}, {} candidates)",
        outcome.config.learning_rate,
        outcome.config.max_depth,
        outcome.config.subsample,
        outcome.validation_rmse,
        evaluated
    );

    Ok(outcome)
}
