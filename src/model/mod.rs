//! Single-step regressors, trained-model bookkeeping and persistence

pub mod gbm;
pub mod manager;
pub mod metrics;
pub mod store;
pub mod tuning;

pub use gbm::{GradientBoostedTrees, GradientBoostingConfig, GradientBoostingRegressor};
pub use manager::ModelManager;
pub use metrics::{chronological_split, ModelMetrics, DEFAULT_TEST_SIZE};
pub use store::{ModelStore, ModelSummary};
pub use tuning::{TuningGrid, TuningOutcome};

use crate::error::Result;
use crate::features::{FeatureConfig, FeatureSchema};
use crate::types::ModelKey;
use chrono::{DateTime, Utc};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use std::fmt::Debug;

/// A fitted model that maps one feature row to one value
pub trait Predictor {
    /// Width of the feature rows this model accepts
    fn n_features(&self) -> usize;

    fn predict_one(&self, features: &[f64]) -> Result<f64>;

    fn predict(&self, rows: &[Vec<f64>]) -> Result<Vec<f64>> {
        rows.iter().map(|row| self.predict_one(row)).collect()
    }
}

/// Learner producing a [`Predictor`]
pub trait Regressor {
    type Model: Predictor + Serialize + DeserializeOwned + Clone + Debug;

    /// Fit on `x`/`y`; `eval` is an optional held-out set used for early stopping
    fn fit(
        &self,
        x: &[Vec<f64>],
        y: &[f64],
        eval: Option<(&[Vec<f64>], &[f64])>,
    ) -> Result<Self::Model>;

    fn name(&self) -> &str;
}

/// A fitted regressor together with everything needed to reuse it
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TrainedModel<M> {
    pub key: ModelKey,
    /// Input columns, in the order the model expects them
    pub schema: FeatureSchema,
    pub feature_config: FeatureConfig,
    /// Hold-out metrics from the training run
    pub metrics: Option<ModelMetrics>,
    pub trained_at: DateTime<Utc>,
    pub model: M,
}

impl<M: Predictor> Predictor for TrainedModel<M> {
    fn n_features(&self) -> usize {
        self.model.n_features()
    }

    fn predict_one(&self, features: &[f64]) -> Result<f64> {
        self.model.predict_one(features)
    }
}
