//! Per-(region, target) model ownership: training, persistence and rollout

use super::gbm::{GradientBoostedTrees, GradientBoostingConfig, GradientBoostingRegressor};
use super::metrics::{chronological_split, ModelMetrics, DEFAULT_TEST_SIZE};
use super::store::ModelStore;
use super::tuning::{tune, TuningGrid, TuningOutcome};
use super::{Predictor, Regressor, TrainedModel};
use crate::error::{ForecastError, Result};
use crate::features::FeatureTable;
use crate::forecast::{Forecast, ForecastEngine};
use crate::types::ModelKey;
use chrono::Utc;
use hashbrown::hash_map::Entry;
use hashbrown::HashMap;
use std::path::PathBuf;

/// Owns the trained models of a run
pub struct ModelManager<R: Regressor = GradientBoostingRegressor> {
    regressor: R,
    store: ModelStore,
    models: HashMap<ModelKey, TrainedModel<R::Model>>,
    test_size: f64,
}

impl<R: Regressor> ModelManager<R> {
    pub fn new(regressor: R, store: ModelStore) -> Self {
        Self {
            regressor,
            store,
            models: HashMap::new(),
            test_size: DEFAULT_TEST_SIZE,
        }
    }

    /// Fraction of rows held out for evaluation, in (0, 1)
    pub fn with_test_size(mut self, test_size: f64) -> Result<Self> {
        if !(test_size > 0.0 && test_size < 1.0) {
            return Err(ForecastError::InvalidParameter(format!(
                "test_size must be in (0, 1), got {}",
                test_size
            )));
        }
        self.test_size = test_size;
        Ok(self)
    }

    pub fn regressor(&self) -> &R {
        &self.regressor
    }

    pub fn store(&self) -> &ModelStore {
        &self.store
    }

    pub fn test_size(&self) -> f64 {
        self.test_size
    }

    /// In-memory model for `key`
    pub fn get(&self, key: &ModelKey) -> Option<&TrainedModel<R::Model>> {
        self.models.get(key)
    }

    pub fn contains(&self, key: &ModelKey) -> bool {
        self.models.contains_key(key)
    }

    pub fn len(&self) -> usize {
        self.models.len()
    }

    pub fn is_empty(&self) -> bool {
        self.models.is_empty()
    }

    /// Train on `table`, holding out the chronologically last rows for evaluation
    pub fn train(
        &mut self,
        table: &FeatureTable,
        key: &ModelKey,
    ) -> Result<(&TrainedModel<R::Model>, ModelMetrics)> {
        let (trained, metrics) = Self::fit_model(&self.regressor, table, key, self.test_size)?;
        Ok((self.insert(trained), metrics))
    }

    /// Persist the in-memory model for `key`
    pub fn save(&self, key: &ModelKey) -> Result<PathBuf> {
        let model = self
            .models
            .get(key)
            .ok_or_else(|| ForecastError::ModelNotFound(key.to_string()))?;
        self.store.save(model)
    }

    /// Load the stored model for `key` into memory; `Ok(None)` when nothing is stored
    pub fn load(&mut self, key: &ModelKey) -> Result<Option<&TrainedModel<R::Model>>> {
        match self.store.load::<R::Model>(key)? {
            Some(model) => {
                self.models.insert(key.clone(), model);
                Ok(self.models.get(key))
            }
            None => Ok(None),
        }
    }

    /// Model for `key` from memory, then from the store, then by training and saving.
    ///
    /// A stored model whose inputs are not all present in `table` is retrained.
    pub fn get_or_train(
        &mut self,
        table: &FeatureTable,
        key: &ModelKey,
    ) -> Result<&TrainedModel<R::Model>> {
        if !self.models.contains_key(key) {
            match self.store.load::<R::Model>(key)? {
                Some(model) if table.schema().projection(&model.schema).is_ok() => {
                    self.models.insert(key.clone(), model);
                }
                loaded => {
                    if loaded.is_some() {
                        log::warn!(
                            "Stored model {} does not match the current features, retraining",
                            key
                        );
                    }
                    self.train(table, key)?;
                    self.save(key)?;
                }
            }
        }

        self.models
            .get(key)
            .ok_or_else(|| ForecastError::ModelNotFound(key.to_string()))
    }

    /// Roll the in-memory model for `key` forward over `table`
    pub fn forecast(
        &self,
        table: &FeatureTable,
        key: &ModelKey,
        days_ahead: usize,
    ) -> Result<Forecast> {
        let model = self
            .models
            .get(key)
            .ok_or_else(|| ForecastError::ModelNotFound(key.to_string()))?;

        ForecastEngine::rollout(
            table,
            key.target,
            &model.schema,
            model,
            days_ahead,
            model.feature_config.look_back,
        )
    }

    /// `get_or_train` followed by `forecast`
    pub fn predict_future(
        &mut self,
        table: &FeatureTable,
        key: &ModelKey,
        days_ahead: usize,
    ) -> Result<Forecast> {
        self.get_or_train(table, key)?;
        self.forecast(table, key, days_ahead)
    }

    fn fit_model(
        regressor: &R,
        table: &FeatureTable,
        key: &ModelKey,
        test_size: f64,
    ) -> Result<(TrainedModel<R::Model>, ModelMetrics)> {
        if key.target != table.target() {
            return Err(ForecastError::InvalidParameter(format!(
                "feature table was built for {}, not {}",
                table.target(),
                key.target
            )));
        }

        let train_rows = chronological_split(table.len(), test_size)?;
        let (train_x, test_x) = table.rows().split_at(train_rows);
        let (train_y, test_y) = table.targets().split_at(train_rows);

        log::info!(
            "Training {} model for {} on {} rows ({} held out)",
            regressor.name(),
            key,
            train_rows,
            test_y.len()
        );

        let model = regressor
            .fit(train_x, train_y, Some((test_x, test_y)))
            .map_err(|e| match e {
                ForecastError::TrainingError(_) => e,
                other => ForecastError::TrainingError(other.to_string()),
            })?;

        let predicted = model.predict(test_x)?;
        let metrics = ModelMetrics::evaluate(test_y, &predicted, train_rows)?;
        log::info!("Model {} metrics: {}", key, metrics);

        let trained = TrainedModel {
            key: key.clone(),
            schema: table.schema().clone(),
            feature_config: *table.config(),
            metrics: Some(metrics),
            trained_at: Utc::now(),
            model,
        };
        Ok((trained, metrics))
    }

    fn insert(&mut self, trained: TrainedModel<R::Model>) -> &TrainedModel<R::Model> {
        let slot = match self.models.entry(trained.key.clone()) {
            Entry::Occupied(mut occupied) => {
                occupied.insert(trained);
                occupied.into_mut()
            }
            Entry::Vacant(vacant) => vacant.insert(trained),
        };
        &*slot
    }
}

impl ModelManager<GradientBoostingRegressor> {
    pub fn with_default_regressor(store: ModelStore) -> Self {
        Self::new(GradientBoostingRegressor::default(), store)
    }

    /// Grid-search boosting parameters on the training rows, then train with the winner.
    ///
    /// The manager's own regressor is left unchanged.
    pub fn train_tuned(
        &mut self,
        table: &FeatureTable,
        key: &ModelKey,
        grid: &TuningGrid,
    ) -> Result<(&TrainedModel<GradientBoostedTrees>, ModelMetrics, TuningOutcome)> {
        let train_rows = chronological_split(table.len(), self.test_size)?;
        let base: GradientBoostingConfig = *self.regressor.config();
        let outcome = tune(
            grid,
            &base,
            &table.rows()[..train_rows],
            &table.targets()[..train_rows],
        )?;

        let tuned = GradientBoostingRegressor::new(outcome.config)?;
        let (trained, metrics) = Self::fit_model(&tuned, table, key, self.test_size)?;
        Ok((self.insert(trained), metrics, outcome))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::features::{FeatureBuilder, FeatureConfig};
    use crate::series::TimeSeries;
    use crate::types::Target;
    use approx::assert_relative_eq;
    use chrono::{Duration, NaiveDate};
    use tempfile::TempDir;

    fn quick_regressor() -> GradientBoostingRegressor {
        GradientBoostingRegressor::new(GradientBoostingConfig {
            n_estimators: 20,
            max_depth: 3,
            ..GradientBoostingConfig::default()
        })
        .unwrap()
    }

    fn table(len: usize, target: Target) -> FeatureTable {
        let start = NaiveDate::from_ymd_opt(2023, 1, 1).unwrap();
        let dates = (0..len).map(|i| start + Duration::days(i as i64)).collect();
        let series = TimeSeries::new(dates)
            .unwrap()
            .with_values("new_cases", (0..len).map(|v| (v % 10) as f64 * 3.0).collect())
            .unwrap()
            .with_values("new_deaths", (0..len).map(|v| (v % 4) as f64).collect())
            .unwrap();
        FeatureBuilder::build(&series, target, &FeatureConfig::with_look_back(7)).unwrap()
    }

    #[test]
    fn test_train_reports_holdout_metrics() {
        let dir = TempDir::new().unwrap();
        let mut manager = ModelManager::new(quick_regressor(), ModelStore::new(dir.path()));
        let table = table(80, Target::NewCases);
        let key = ModelKey::new("France", Target::NewCases);

        let (model, metrics) = manager.train(&table, &key).unwrap();
        assert_eq!(model.schema, *table.schema());
        // 51 rows: ceil(10.2) = 11 held out
        assert_eq!(metrics.test_rows, 11);
        assert_eq!(metrics.train_rows, 40);
        assert!(metrics.rmse.is_finite());
        assert!(manager.contains(&key));
    }

    #[test]
    fn test_train_empty_table_fails() {
        let dir = TempDir::new().unwrap();
        let mut manager = ModelManager::new(quick_regressor(), ModelStore::new(dir.path()));
        let table = table(20, Target::NewCases);
        let result = manager.train(&table, &ModelKey::new("France", Target::NewCases));
        assert!(matches!(
            result,
            Err(ForecastError::InsufficientHistory { available: 0, .. })
        ));
    }

    #[test]
    fn test_load_untrained_is_none() {
        let dir = TempDir::new().unwrap();
        let mut manager = ModelManager::with_default_regressor(ModelStore::new(dir.path()));
        let loaded = manager
            .load(&ModelKey::new("France", Target::NewDeaths))
            .unwrap();
        assert!(loaded.is_none());
    }

    #[test]
    fn test_save_requires_model() {
        let dir = TempDir::new().unwrap();
        let manager = ModelManager::with_default_regressor(ModelStore::new(dir.path()));
        let result = manager.save(&ModelKey::new("France", Target::NewCases));
        assert!(matches!(result, Err(ForecastError::ModelNotFound(_))));
    }

    #[test]
    fn test_save_then_load_in_new_manager() {
        let dir = TempDir::new().unwrap();
        let table = table(80, Target::NewCases);
        let key = ModelKey::new("France", Target::NewCases);

        let mut first = ModelManager::new(quick_regressor(), ModelStore::new(dir.path()));
        first.train(&table, &key).unwrap();
        first.save(&key).unwrap();
        let expected = first.forecast(&table, &key, 5).unwrap();

        let mut second = ModelManager::new(quick_regressor(), ModelStore::new(dir.path()));
        assert!(second.load(&key).unwrap().is_some());
        let restored = second.forecast(&table, &key, 5).unwrap();
        assert_eq!(expected.dates(), restored.dates());
        for (a, b) in expected.values().iter().zip(restored.values()) {
            assert_relative_eq!(*a, b, epsilon = 1e-9);
        }
    }

    #[test]
    fn test_forecast_without_model() {
        let dir = TempDir::new().unwrap();
        let manager = ModelManager::with_default_regressor(ModelStore::new(dir.path()));
        let table = table(80, Target::NewCases);
        let result = manager.forecast(&table, &ModelKey::new("France", Target::NewCases), 3);
        assert!(matches!(result, Err(ForecastError::ModelNotFound(_))));
    }

    #[test]
    fn test_predict_future_trains_and_saves() {
        let dir = TempDir::new().unwrap();
        let mut manager = ModelManager::new(quick_regressor(), ModelStore::new(dir.path()));
        let table = table(80, Target::NewDeaths);
        let key = ModelKey::new("Spain", Target::NewDeaths);

        let forecast = manager.predict_future(&table, &key, 4).unwrap();
        assert_eq!(forecast.len(), 4);
        assert!(manager.store().exists(&key));
    }

    #[test]
    fn test_target_mismatch_rejected() {
        let dir = TempDir::new().unwrap();
        let mut manager = ModelManager::new(quick_regressor(), ModelStore::new(dir.path()));
        let table = table(80, Target::NewCases);
        let result = manager.train(&table, &ModelKey::new("France", Target::NewDeaths));
        assert!(matches!(result, Err(ForecastError::InvalidParameter(_))));
    }

    #[test]
    fn test_train_tuned() {
        let dir = TempDir::new().unwrap();
        let mut manager = ModelManager::new(quick_regressor(), ModelStore::new(dir.path()));
        let table = table(80, Target::NewCases);
        let key = ModelKey::new("France", Target::NewCases);
        let grid = TuningGrid {
            learning_rates: vec![0.1],
            max_depths: vec![2, 3],
            subsamples: vec![1.0],
            validation_fraction: 0.2,
        };

        let (_, metrics, outcome) = manager.train_tuned(&table, &key, &grid).unwrap();
        assert_eq!(outcome.candidates_evaluated, 2);
        assert_eq!(outcome.config.n_estimators, 20);
        assert!(metrics.mae.is_finite());
        assert_eq!(manager.regressor().config().learning_rate, 0.05);
    }

    #[test]
    fn test_invalid_test_size() {
        let dir = TempDir::new().unwrap();
        let manager = ModelManager::with_default_regressor(ModelStore::new(dir.path()));
        assert!(manager.with_test_size(1.0).is_err());
    }
}
