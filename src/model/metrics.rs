//! Hold-out evaluation metrics and chronological splitting

use crate::error::{ForecastError, Result};
use serde::{Deserialize, Serialize};
use statrs::statistics::{Data, Distribution};
use std::fmt;

/// Default fraction of rows held out for evaluation
pub const DEFAULT_TEST_SIZE: f64 = 0.2;

/// Regression quality on the held-out slice
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ModelMetrics {
    /// Mean Absolute Error
    pub mae: f64,
    /// Root Mean Squared Error
    pub rmse: f64,
    /// Coefficient of determination
    pub r2: f64,
    pub train_rows: usize,
    pub test_rows: usize,
}

impl ModelMetrics {
    /// Score predictions against actual values
    pub fn evaluate(actual: &[f64], predicted: &[f64], train_rows: usize) -> Result<Self> {
        if actual.len() != predicted.len() || actual.is_empty() {
            return Err(ForecastError::InvalidParameter(
                "Actual and predicted values must have the same non-zero length".to_string(),
            ));
        }

        Ok(Self {
            mae: mean_absolute_error(actual, predicted),
            rmse: root_mean_squared_error(actual, predicted),
            r2: r2_score(actual, predicted),
            train_rows,
            test_rows: actual.len(),
        })
    }

    /// `key: value` pairs in report order
    pub fn entries(&self) -> Vec<(&'static str, String)> {
        vec![
            ("MAE", self.mae.to_string()),
            ("RMSE", self.rmse.to_string()),
            ("R2", self.r2.to_string()),
            ("train_rows", self.train_rows.to_string()),
            ("test_rows", self.test_rows.to_string()),
        ]
    }
}

impl fmt::Display for ModelMetrics {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "MAE: {:.2}, RMSE: {:.2}, R2: {:.2}",
            self.mae, self.rmse, self.r2
        )
    }
}

pub fn mean_absolute_error(actual: &[f64], predicted: &[f64]) -> f64 {
    let errors: Vec<f64> = actual
        .iter()
        .zip(predicted.iter())
        .map(|(a, p)| (a - p).abs())
        .collect();
    Data::new(errors).mean().unwrap_or(0.0)
}

pub fn root_mean_squared_error(actual: &[f64], predicted: &[f64]) -> f64 {
    let squared: Vec<f64> = actual
        .iter()
        .zip(predicted.iter())
        .map(|(a, p)| (a - p).powi(2))
        .collect();
    Data::new(squared).mean().unwrap_or(0.0).sqrt()
}

/// R² score; a constant target scores 1.0 when predicted exactly and 0.0 otherwise
pub fn r2_score(actual: &[f64], predicted: &[f64]) -> f64 {
    let mean = Data::new(actual.to_vec()).mean().unwrap_or(0.0);
    let ss_res: f64 = actual
        .iter()
        .zip(predicted.iter())
        .map(|(a, p)| (a - p).powi(2))
        .sum();
    let ss_tot: f64 = actual.iter().map(|a| (a - mean).powi(2)).sum();

    if ss_tot == 0.0 {
        if ss_res == 0.0 {
            1.0
        } else {
            0.0
        }
    } else {
        1.0 - ss_res / ss_tot
    }
}

/// Number of leading rows used for training when the last `ceil(n * test_size)` rows are
/// held out. Order is preserved; nothing is shuffled.
pub fn chronological_split(n: usize, test_size: f64) -> Result<usize> {
    if !(test_size > 0.0 && test_size < 1.0) {
        return Err(ForecastError::InvalidParameter(format!(
            "test_size must be in (0, 1), got {}",
            test_size
        )));
    }

    let test_rows = (n as f64 * test_size).ceil() as usize;
    let train_rows = n.saturating_sub(test_rows);
    if n == 0 || train_rows == 0 {
        return Err(ForecastError::InsufficientHistory {
            available: n,
            required: 2,
        });
    }

    Ok(train_rows)
}
