//! # epi_forecast
//!
//! Short-horizon forecasting of daily epidemiological counts (new cases, new deaths,
//! optionally new recoveries) for one region.
//!
//! A daily [`TimeSeries`](series::TimeSeries) is turned into a supervised-learning table of
//! lag, rolling-mean, calendar and per-capita features. A gradient-boosted regressor is
//! trained per (region, target) and rolled forward recursively, one day at a time, feeding
//! each prediction back into the feature window.
//!
//! ## Example
//!
//! ```rust,no_run
//! use epi_forecast::prelude::*;
//!
//! fn main() -> Result<()> {
//!     let source = CsvSource::new("daily_counts.csv");
//!     let series = source.load("France", &Target::defaults())?;
//!
//!     let table = FeatureBuilder::build(&series, Target::NewCases, &FeatureConfig::default())?;
//!     let mut manager = ModelManager::with_default_regressor(ModelStore::new("models"));
//!     let key = ModelKey::new("France", Target::NewCases);
//!
//!     let forecast = manager.predict_future(&table, &key, 7)?.clipped();
//!     for row in &forecast.rows {
//!         println!("{}: {:.1}", row.date, row.predicted_value);
//!     }
//!     Ok(())
//! }
//! ```

pub mod data;
pub mod error;
pub mod features;
pub mod forecast;
pub mod model;
pub mod pipeline;
pub mod report;
pub mod series;
pub mod types;

pub mod prelude {
    //! Commonly used types and traits
    pub use crate::data::{CsvSource, DataSource, InMemorySource};
    #[cfg(feature = "rusqlite-support")]
    pub use crate::data::SqliteSource;
    pub use crate::error::{ForecastError, Result};
    pub use crate::features::{FeatureBuilder, FeatureColumn, FeatureConfig, FeatureSchema, FeatureTable};
    pub use crate::forecast::{FeatureState, Forecast, ForecastEngine};
    pub use crate::model::{
        GradientBoostingConfig, GradientBoostingRegressor, ModelManager, ModelMetrics,
        ModelStore, Predictor, Regressor, TrainedModel,
    };
    pub use crate::pipeline::{ForecastPipeline, RunConfig, RunSummary, TargetOutcome};
    pub use crate::report::Reporter;
    pub use crate::series::TimeSeries;
    pub use crate::types::*;
}
