//! Trailing-window means

use crate::error::{ForecastError, Result};
use std::collections::VecDeque;

/// Rolling mean over a fixed window of possibly missing values.
///
/// The mean is only defined once the window is full and contains no missing value.
#[derive(Debug, Clone)]
pub struct RollingMean {
    window: usize,
    values: VecDeque<Option<f64>>,
}

impl RollingMean {
    /// Create a rolling mean with the given window size
    pub fn new(window: usize) -> Result<Self> {
        if window == 0 {
            return Err(ForecastError::InvalidParameter(
                "Window size must be greater than 0".to_string(),
            ));
        }
        Ok(Self {
            window,
            values: VecDeque::with_capacity(window),
        })
    }

    /// Push a value and return the mean of the current window
    pub fn update(&mut self, value: Option<f64>) -> Option<f64> {
        self.values.push_back(value);

        if self.values.len() > self.window {
            self.values.pop_front();
        }

        self.current()
    }

    /// Current mean, if the window is full and complete
    pub fn current(&self) -> Option<f64> {
        if self.values.len() < self.window {
            return None;
        }
        let mut sum = 0.0;
        for value in &self.values {
            sum += (*value)?;
        }
        Some(sum / self.window as f64)
    }

    /// Rolling means for a whole column
    pub fn compute(window: usize, values: &[Option<f64>]) -> Result<Vec<Option<f64>>> {
        let mut rolling = Self::new(window)?;
        Ok(values.iter().map(|&v| rolling.update(v)).collect())
    }
}

/// Mean of the last `window - 1` values of `history` followed by `next`.
///
/// With fewer carried values than `window - 1`, the mean covers what is available.
pub fn trailing_mean(history: &[f64], window: usize, next: f64) -> f64 {
    let carried = window.saturating_sub(1).min(history.len());
    let tail = &history[history.len() - carried..];
    (tail.iter().sum::<f64>() + next) / (carried + 1) as f64
}
