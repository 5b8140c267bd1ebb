//! End-to-end forecasting run for one region
//!
//! For each requested target the pipeline builds features, trains or loads a model, rolls
//! it forward, clips negative predictions and writes the reports. A failing target is
//! recorded in the [`RunSummary`] and the run moves on; only a failure to load the source
//! data aborts the run.

use crate::data::DataSource;
use crate::error::{ForecastError, Result};
use crate::features::{FeatureBuilder, FeatureConfig, FeatureTable};
use crate::forecast::Forecast;
use crate::model::{
    GradientBoostingConfig, GradientBoostingRegressor, ModelManager, ModelMetrics, ModelStore,
    TuningGrid, DEFAULT_TEST_SIZE,
};
use crate::report::Reporter;
use crate::series::TimeSeries;
use crate::types::{ModelKey, Target};
use std::path::PathBuf;

/// Everything a run needs to know
#[derive(Debug, Clone)]
pub struct RunConfig {
    pub region: String,
    pub days_ahead: usize,
    pub targets: Vec<Target>,
    pub features: FeatureConfig,
    /// Train fresh models; when false, stored models are reused where possible
    pub retrain: bool,
    /// Grid-search boosting parameters before training
    pub tune: bool,
    pub tuning_grid: TuningGrid,
    pub training: GradientBoostingConfig,
    pub test_size: f64,
    pub model_dir: PathBuf,
    pub output_dir: PathBuf,
}

impl Default for RunConfig {
    fn default() -> Self {
        Self {
            region: "France".to_string(),
            days_ahead: 7,
            targets: Target::defaults(),
            features: FeatureConfig::default(),
            retrain: true,
            tune: false,
            tuning_grid: TuningGrid::default(),
            training: GradientBoostingConfig::default(),
            test_size: DEFAULT_TEST_SIZE,
            model_dir: PathBuf::from("models"),
            output_dir: PathBuf::from("visualization"),
        }
    }
}

impl RunConfig {
    pub fn validate(&self) -> Result<()> {
        if self.region.trim().is_empty() {
            return Err(ForecastError::ConfigError("region must not be empty".to_string()));
        }
        if self.targets.is_empty() {
            return Err(ForecastError::ConfigError(
                "at least one target is required".to_string(),
            ));
        }
        self.features.validate()?;
        self.training.validate()?;
        Ok(())
    }
}

/// What happened to one target
#[derive(Debug, Clone)]
pub enum TargetOutcome {
    Forecasted {
        forecast: Forecast,
        /// Present when a model was trained during this run
        metrics: Option<ModelMetrics>,
        files: Vec<PathBuf>,
    },
    Skipped {
        reason: String,
    },
    Failed {
        error: String,
    },
}

#[derive(Debug, Clone)]
pub struct TargetReport {
    pub target: Target,
    pub outcome: TargetOutcome,
}

/// Result of a run across all requested targets
#[derive(Debug, Clone)]
pub struct RunSummary {
    pub region: String,
    pub reports: Vec<TargetReport>,
    pub combined: Option<PathBuf>,
}

impl RunSummary {
    pub fn forecast(&self, target: Target) -> Option<&Forecast> {
        self.reports.iter().find_map(|r| match &r.outcome {
            TargetOutcome::Forecasted { forecast, .. } if r.target == target => Some(forecast),
            _ => None,
        })
    }

    pub fn succeeded(&self) -> usize {
        self.reports
            .iter()
            .filter(|r| matches!(r.outcome, TargetOutcome::Forecasted { .. }))
            .count()
    }

    pub fn failed(&self) -> usize {
        self.reports
            .iter()
            .filter(|r| matches!(r.outcome, TargetOutcome::Failed { .. }))
            .count()
    }

    pub fn skipped(&self) -> usize {
        self.reports
            .iter()
            .filter(|r| matches!(r.outcome, TargetOutcome::Skipped { .. }))
            .count()
    }
}

pub struct ForecastPipeline {
    config: RunConfig,
    reporter: Reporter,
}

impl ForecastPipeline {
    pub fn new(config: RunConfig) -> Result<Self> {
        config.validate()?;
        let reporter = Reporter::new(config.output_dir.clone());
        Ok(Self { config, reporter })
    }

    pub fn config(&self) -> &RunConfig {
        &self.config
    }

    /// Load the region from `source` and process every target
    pub fn run(&self, source: &dyn DataSource) -> Result<RunSummary> {
        let region = self.config.region.as_str();
        log::info!(
            "Forecasting {} days for {} from {} source",
            self.config.days_ahead,
            region,
            source.name()
        );

        let series = source.load(region, &self.config.targets)?;
        let mut manager = ModelManager::new(
            GradientBoostingRegressor::new(self.config.training)?,
            ModelStore::new(self.config.model_dir.clone()),
        )
        .with_test_size(self.config.test_size)?;

        let mut reports = Vec::with_capacity(self.config.targets.len());
        for &target in &self.config.targets {
            let outcome = match self.run_target(&series, target, &mut manager) {
                Ok(outcome) => outcome,
                Err(e) => {
                    log::error!("Forecast for {} failed: {}", target, e);
                    TargetOutcome::Failed {
                        error: e.to_string(),
                    }
                }
            };
            reports.push(TargetReport { target, outcome });
        }

        let mut summary = RunSummary {
            region: region.to_string(),
            reports,
            combined: None,
        };

        let combined = match (
            summary.forecast(Target::NewCases),
            summary.forecast(Target::NewDeaths),
        ) {
            (Some(cases), Some(deaths)) => {
                #[cfg(feature = "charts")]
                {
                    if let Err(e) = self.reporter.plot_combined(region, &[cases, deaths]) {
                        log::warn!("Could not render combined chart: {}", e);
                    }
                }
                match self.reporter.write_combined(region, &[cases, deaths]) {
                    Ok(path) => Some(path),
                    Err(e) => {
                        log::error!("Could not write combined forecast: {}", e);
                        None
                    }
                }
            }
            _ => None,
        };
        summary.combined = combined;

        log::info!(
            "Run for {} finished: {} forecasted, {} skipped, {} failed",
            region,
            summary.succeeded(),
            summary.skipped(),
            summary.failed()
        );
        Ok(summary)
    }

    fn run_target(
        &self,
        series: &TimeSeries,
        target: Target,
        manager: &mut ModelManager,
    ) -> Result<TargetOutcome> {
        if !series.has_column(target.column()) {
            log::warn!("Column {} absent, skipping", target);
            return Ok(TargetOutcome::Skipped {
                reason: format!("column {} is absent", target),
            });
        }

        let table = FeatureBuilder::build(series, target, &self.config.features)?;
        let key = ModelKey::new(self.config.region.clone(), target);

        let metrics = if self.config.retrain {
            Some(self.train(manager, &table, &key)?)
        } else {
            let stored = manager
                .load(&key)?
                .map(|model| table.schema().projection(&model.schema).is_ok());
            match stored {
                Some(true) => None,
                Some(false) => {
                    log::warn!("Stored model {} does not match the current features", key);
                    Some(self.train(manager, &table, &key)?)
                }
                None => {
                    log::info!("No stored model for {}, training a new one", key);
                    Some(self.train(manager, &table, &key)?)
                }
            }
        };

        let forecast = manager
            .forecast(&table, &key, self.config.days_ahead)?
            .clipped();

        let region = self.config.region.as_str();
        let mut files = vec![
            self.reporter.write_predictions(region, &forecast)?,
            self.reporter.write_plot_data(region, &table, &forecast)?,
        ];
        #[cfg(feature = "charts")]
        {
            match self.reporter.plot_predictions(region, &table, &forecast) {
                Ok(path) => files.push(path),
                Err(e) => log::warn!("Could not render forecast chart for {}: {}", target, e),
            }
        }

        if let Some(metrics) = &metrics {
            files.push(self.reporter.write_metrics(region, target, metrics)?);

            if !forecast.is_empty() && table.len() >= forecast.len() {
                let y_true = &table.targets()[table.len() - forecast.len()..];
                let y_pred = forecast.values();
                files.push(self.reporter.write_residuals(region, target, y_true, &y_pred)?);
                #[cfg(feature = "charts")]
                {
                    match self.reporter.plot_residuals(region, target, y_true, &y_pred) {
                        Ok(path) => files.push(path),
                        Err(e) => {
                            log::warn!("Could not render residual chart for {}: {}", target, e)
                        }
                    }
                }
            }
        }

        Ok(TargetOutcome::Forecasted {
            forecast,
            metrics,
            files,
        })
    }

    fn train(
        &self,
        manager: &mut ModelManager,
        table: &FeatureTable,
        key: &ModelKey,
    ) -> Result<ModelMetrics> {
        let metrics = if self.config.tune {
            manager.train_tuned(table, key, &self.config.tuning_grid)?.1
        } else {
            manager.train(table, key)?.1
        };
        manager.save(key)?;
        Ok(metrics)
    }
}
