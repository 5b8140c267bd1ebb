//! Feature construction for single-step regression
//!
//! A [`FeatureTable`] is derived from a [`TimeSeries`](crate::series::TimeSeries) for one
//! target. Its [`FeatureSchema`] travels with every trained model and is what the
//! forecaster uses to line up inputs; column membership is never inferred from names.

pub mod builder;
pub mod calendar;
pub mod rolling;
pub mod schema;

pub use builder::{per_capita, FeatureBuilder, FeatureConfig, FeatureTable};
pub use calendar::CalendarFeatures;
pub use rolling::{trailing_mean, RollingMean};
pub use schema::{
    FeatureColumn, FeatureGroup, FeatureSchema, MAX_ROLLING_WINDOW, PER_CAPITA_SCALE,
    ROLLING_WINDOWS,
};
