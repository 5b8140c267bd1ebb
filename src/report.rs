//! Metrics and forecast export

use crate::error::Result;
use crate::features::FeatureTable;
use crate::forecast::Forecast;
use crate::model::ModelMetrics;
use crate::types::{sanitize, Date, Target};
use csv::Writer;
use std::collections::BTreeMap;
use std::fs;
use std::io::Write;
use std::path::{Path, PathBuf};

#[cfg(feature = "charts")]
pub mod charts;

/// Writes run artifacts into one output directory
#[derive(Debug, Clone)]
pub struct Reporter {
    output_dir: PathBuf,
}

impl Reporter {
    pub fn new(output_dir: impl Into<PathBuf>) -> Self {
        Self {
            output_dir: output_dir.into(),
        }
    }

    pub fn output_dir(&self) -> &Path {
        &self.output_dir
    }

    fn path(&self, region: &str, suffix: &str) -> Result<PathBuf> {
        fs::create_dir_all(&self.output_dir)?;
        Ok(self
            .output_dir
            .join(format!("{}_{}", sanitize(region), suffix)))
    }

    /// `{region}_{target}_metrics.txt`, one `key: value` line per metric
    pub fn write_metrics(&self, region: &str, target: Target, metrics: &ModelMetrics) -> Result<PathBuf> {
        let path = self.path(region, &format!("{}_metrics.txt", target))?;
        let mut file = fs::File::create(&path)?;
        for (key, value) in metrics.entries() {
            writeln!(file, "{}: {}", key, value)?;
        }
        log::debug!("Wrote metrics to {:?}", path);
        Ok(path)
    }

    /// `{region}_{target}_predictions.csv` with columns `date,predicted_{target}`
    pub fn write_predictions(&self, region: &str, forecast: &Forecast) -> Result<PathBuf> {
        let path = self.path(region, &format!("{}_predictions.csv", forecast.target))?;
        let mut wtr = Writer::from_path(&path)?;
        wtr.write_record(["date".to_string(), format!("predicted_{}", forecast.target)])?;
        for row in &forecast.rows {
            wtr.write_record([row.date.to_string(), row.predicted_value.to_string()])?;
        }
        wtr.flush()?;
        log::debug!("Wrote {} predictions to {:?}", forecast.len(), path);
        Ok(path)
    }

    /// Historical values followed by the forecast, for charting
    pub fn write_plot_data(
        &self,
        region: &str,
        table: &FeatureTable,
        forecast: &Forecast,
    ) -> Result<PathBuf> {
        let target = forecast.target;
        let path = self.path(region, &format!("{}_predictions_plot.csv", target))?;
        let mut wtr = Writer::from_path(&path)?;
        wtr.write_record([
            "date".to_string(),
            format!("historical_{}", target),
            format!("predicted_{}", target),
        ])?;
        for (date, value) in table.dates().iter().zip(table.targets()) {
            wtr.write_record([date.to_string(), value.to_string(), String::new()])?;
        }
        for row in &forecast.rows {
            wtr.write_record([
                row.date.to_string(),
                String::new(),
                row.predicted_value.to_string(),
            ])?;
        }
        wtr.flush()?;
        Ok(path)
    }

    /// `y_true,y_pred,residual` rows; `residual = y_true - y_pred`
    pub fn write_residuals(
        &self,
        region: &str,
        target: Target,
        y_true: &[f64],
        y_pred: &[f64],
    ) -> Result<PathBuf> {
        let path = self.path(region, &format!("{}_residuals.csv", target))?;
        let mut wtr = Writer::from_path(&path)?;
        wtr.write_record(["y_true", "y_pred", "residual"])?;
        for (actual, predicted) in y_true.iter().zip(y_pred) {
            wtr.write_record([
                actual.to_string(),
                predicted.to_string(),
                (actual - predicted).to_string(),
            ])?;
        }
        wtr.flush()?;
        Ok(path)
    }

    /// `{region}_{target}_predictions.png`: history with the forecast appended
    #[cfg(feature = "charts")]
    pub fn plot_predictions(
        &self,
        region: &str,
        table: &FeatureTable,
        forecast: &Forecast,
    ) -> Result<PathBuf> {
        let path = self.path(region, &format!("{}_predictions.png", forecast.target))?;
        let history: Vec<(Date, f64)> = table
            .dates()
            .iter()
            .copied()
            .zip(table.targets().iter().copied())
            .collect();
        charts::plot_predictions(&path, region, &history, forecast)?;
        log::debug!("Rendered {:?}", path);
        Ok(path)
    }

    /// `{region}_{target}_residuals.png`
    #[cfg(feature = "charts")]
    pub fn plot_residuals(
        &self,
        region: &str,
        target: Target,
        y_true: &[f64],
        y_pred: &[f64],
    ) -> Result<PathBuf> {
        let path = self.path(region, &format!("{}_residuals.png", target))?;
        charts::plot_residuals(&path, region, target, y_true, y_pred)?;
        Ok(path)
    }

    /// `{region}_combined_predictions.png`
    #[cfg(feature = "charts")]
    pub fn plot_combined(&self, region: &str, forecasts: &[&Forecast]) -> Result<PathBuf> {
        let path = self.path(region, "combined_predictions.png")?;
        charts::plot_combined(&path, region, forecasts)?;
        Ok(path)
    }

    /// Forecasts of several targets side by side, joined on date
    pub fn write_combined(&self, region: &str, forecasts: &[&Forecast]) -> Result<PathBuf> {
        let path = self.path(region, "combined_predictions.csv")?;
        let mut by_date: BTreeMap<Date, Vec<Option<f64>>> = BTreeMap::new();
        for (i, forecast) in forecasts.iter().enumerate() {
            for row in &forecast.rows {
                by_date
                    .entry(row.date)
                    .or_insert_with(|| vec![None; forecasts.len()])[i] = Some(row.predicted_value);
            }
        }

        let mut wtr = Writer::from_path(&path)?;
        let mut header = vec!["date".to_string()];
        header.extend(forecasts.iter().map(|f| format!("predicted_{}", f.target)));
        wtr.write_record(&header)?;
        for (date, values) in by_date {
            let mut record = vec![date.to_string()];
            record.extend(values.iter().map(|v| v.map(|x| x.to_string()).unwrap_or_default()));
            wtr.write_record(&record)?;
        }
        wtr.flush()?;
        Ok(path)
    }
}
