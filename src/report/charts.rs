//! PNG charts rendered with plotters
//!
//! Text (titles, axis labels) is only drawn when plotters is built with a font backend; the
//! `charts-text` feature turns on its `ttf` support.

use crate::error::{ForecastError, Result};
use crate::forecast::Forecast;
use crate::types::{Date, Target};
use chrono::Duration;
use plotters::prelude::*;
use std::path::Path;

const SIZE: (u32, u32) = (1200, 600);

const SERIES_COLORS: [RGBColor; 4] = [BLUE, RED, GREEN, MAGENTA];

fn chart_err<E: std::fmt::Display>(e: E) -> ForecastError {
    ForecastError::ChartError(e.to_string())
}

/// Padded `(min, max)` of `values`, never empty
fn value_range<'a>(values: impl Iterator<Item = &'a f64>) -> (f64, f64) {
    let (lo, hi) = values.fold((f64::INFINITY, f64::NEG_INFINITY), |(lo, hi), &v| {
        (lo.min(v), hi.max(v))
    });
    if !lo.is_finite() || !hi.is_finite() {
        return (0.0, 1.0);
    }
    let pad = ((hi - lo) * 0.05).max(1e-6);
    if hi - lo < 1e-12 {
        (lo - 1.0, hi + 1.0)
    } else {
        (lo - pad, hi + pad)
    }
}

fn day_offset(origin: Date, date: Date) -> f64 {
    (date - origin).num_days() as f64
}

fn date_label(origin: Date, offset: f64) -> String {
    (origin + Duration::days(offset.round() as i64))
        .format("%Y-%m-%d")
        .to_string()
}

/// Historical target values followed by the forecast
pub fn plot_predictions(
    path: &Path,
    region: &str,
    history: &[(Date, f64)],
    forecast: &Forecast,
) -> Result<()> {
    let Some(origin) = history
        .first()
        .map(|(d, _)| *d)
        .or_else(|| forecast.rows.first().map(|r| r.date))
    else {
        return Err(ForecastError::ChartError("nothing to plot".to_string()));
    };
    let last = forecast
        .rows
        .last()
        .map(|r| r.date)
        .or_else(|| history.last().map(|(d, _)| *d))
        .unwrap_or(origin);
    let x_max = day_offset(origin, last).max(1.0);
    let (y_min, y_max) = value_range(
        history
            .iter()
            .map(|(_, v)| v)
            .chain(forecast.rows.iter().map(|r| &r.predicted_value)),
    );

    let root = BitMapBackend::new(path, SIZE).into_drawing_area();
    root.fill(&WHITE).map_err(chart_err)?;
    let mut chart = ChartBuilder::on(&root)
        .caption(
            format!("{} forecast for {}", forecast.target, region),
            ("sans-serif", 24),
        )
        .margin(10)
        .x_label_area_size(40)
        .y_label_area_size(60)
        .build_cartesian_2d(0.0..x_max, y_min..y_max)
        .map_err(chart_err)?;

    let label_dates = |x: &f64| date_label(origin, *x);
    chart
        .configure_mesh()
        .x_desc("Date")
        .y_desc(format!("{}", forecast.target))
        .x_label_formatter(&label_dates)
        .draw()
        .map_err(chart_err)?;

    chart
        .draw_series(LineSeries::new(
            history.iter().map(|(d, v)| (day_offset(origin, *d), *v)),
            &BLUE,
        ))
        .map_err(chart_err)?
        .label("Historical")
        .legend(|(x, y)| PathElement::new(vec![(x, y), (x + 20, y)], &BLUE));

    // Joined to the last known value so the two lines connect
    let predicted = history
        .last()
        .map(|(d, v)| (day_offset(origin, *d), *v))
        .into_iter()
        .chain(
            forecast
                .rows
                .iter()
                .map(|r| (day_offset(origin, r.date), r.predicted_value)),
        );
    chart
        .draw_series(LineSeries::new(predicted, RED.stroke_width(2)))
        .map_err(chart_err)?
        .label("Forecast")
        .legend(|(x, y)| PathElement::new(vec![(x, y), (x + 20, y)], &RED));

    chart
        .configure_series_labels()
        .background_style(WHITE.mix(0.8))
        .border_style(BLACK)
        .draw()
        .map_err(chart_err)?;
    root.present().map_err(chart_err)?;
    Ok(())
}

/// Residuals `y_true - y_pred` against predicted values, with the zero line
pub fn plot_residuals(
    path: &Path,
    region: &str,
    target: Target,
    y_true: &[f64],
    y_pred: &[f64],
) -> Result<()> {
    let points: Vec<(f64, f64)> = y_true
        .iter()
        .zip(y_pred)
        .map(|(actual, predicted)| (*predicted, actual - predicted))
        .collect();
    if points.is_empty() {
        return Err(ForecastError::ChartError("no residuals to plot".to_string()));
    }
    let (x_min, x_max) = value_range(points.iter().map(|(x, _)| x));
    let (y_min, y_max) = value_range(points.iter().map(|(_, y)| y).chain(std::iter::once(&0.0)));

    let root = BitMapBackend::new(path, (1000, 500)).into_drawing_area();
    root.fill(&WHITE).map_err(chart_err)?;
    let mut chart = ChartBuilder::on(&root)
        .caption(
            format!("Residuals for {} ({})", region, target),
            ("sans-serif", 22),
        )
        .margin(10)
        .x_label_area_size(40)
        .y_label_area_size(60)
        .build_cartesian_2d(x_min..x_max, y_min..y_max)
        .map_err(chart_err)?;

    chart
        .configure_mesh()
        .x_desc("Predicted")
        .y_desc("Residual (y_true - y_pred)")
        .draw()
        .map_err(chart_err)?;

    chart
        .draw_series(
            points
                .iter()
                .map(|&point| Circle::new(point, 4, BLUE.mix(0.5).filled())),
        )
        .map_err(chart_err)?;
    chart
        .draw_series(LineSeries::new(vec![(x_min, 0.0), (x_max, 0.0)], &RED))
        .map_err(chart_err)?;

    root.present().map_err(chart_err)?;
    Ok(())
}

/// Several targets' forecasts on one chart
pub fn plot_combined(path: &Path, region: &str, forecasts: &[&Forecast]) -> Result<()> {
    let Some(origin) = forecasts
        .iter()
        .filter_map(|f| f.rows.first().map(|r| r.date))
        .min()
    else {
        return Err(ForecastError::ChartError("no forecasts to plot".to_string()));
    };
    let last = forecasts
        .iter()
        .filter_map(|f| f.rows.last().map(|r| r.date))
        .max()
        .unwrap_or(origin);
    let x_max = day_offset(origin, last).max(1.0);
    let (y_min, y_max) = value_range(
        forecasts
            .iter()
            .flat_map(|f| f.rows.iter().map(|r| &r.predicted_value)),
    );

    let root = BitMapBackend::new(path, SIZE).into_drawing_area();
    root.fill(&WHITE).map_err(chart_err)?;
    let mut chart = ChartBuilder::on(&root)
        .caption(format!("Combined forecast for {}", region), ("sans-serif", 24))
        .margin(10)
        .x_label_area_size(40)
        .y_label_area_size(60)
        .build_cartesian_2d(0.0..x_max, y_min..y_max)
        .map_err(chart_err)?;

    let label_dates = |x: &f64| date_label(origin, *x);
    chart
        .configure_mesh()
        .x_desc("Date")
        .y_desc("Predicted count")
        .x_label_formatter(&label_dates)
        .draw()
        .map_err(chart_err)?;

    for (i, forecast) in forecasts.iter().enumerate() {
        let color = SERIES_COLORS[i % SERIES_COLORS.len()];
        chart
            .draw_series(LineSeries::new(
                forecast
                    .rows
                    .iter()
                    .map(|r| (day_offset(origin, r.date), r.predicted_value)),
                color.stroke_width(2),
            ))
            .map_err(chart_err)?
            .label(forecast.target.to_string())
            .legend(move |(x, y)| PathElement::new(vec![(x, y), (x + 20, y)], &color));
    }

    chart
        .configure_series_labels()
        .background_style(WHITE.mix(0.8))
        .border_style(BLACK)
        .draw()
        .map_err(chart_err)?;
    root.present().map_err(chart_err)?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::ForecastRow;
    use chrono::NaiveDate;
    use tempfile::TempDir;

    fn start() -> Date {
        NaiveDate::from_ymd_opt(2023, 3, 1).unwrap()
    }

    fn forecast(target: Target, offset: i64, values: &[f64]) -> Forecast {
        Forecast {
            target,
            rows: values
                .iter()
                .enumerate()
                .map(|(i, &v)| ForecastRow::new(start() + Duration::days(offset + i as i64), v))
                .collect(),
        }
    }

    fn is_png(path: &Path) -> bool {
        let bytes = std::fs::read(path).unwrap();
        bytes.starts_with(&[0x89, b'P', b'N', b'G'])
    }

    #[test]
    fn test_value_range_padding() {
        assert_eq!(value_range([5.0, 5.0].iter()), (4.0, 6.0));
        assert_eq!(value_range(std::iter::empty()), (0.0, 1.0));
        let (lo, hi) = value_range([0.0, 10.0].iter());
        assert!(lo < 0.0 && hi > 10.0);
    }

    #[test]
    fn test_plot_predictions_writes_png() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("chart.png");
        let history: Vec<(Date, f64)> = (0..20)
            .map(|i| (start() + Duration::days(i), 10.0 + i as f64))
            .collect();
        plot_predictions(
            &path,
            "France",
            &history,
            &forecast(Target::NewCases, 20, &[30.0, 31.0, 29.5]),
        )
        .unwrap();
        assert!(is_png(&path));
    }

    #[test]
    fn test_plot_residuals_writes_png() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("residuals.png");
        plot_residuals(&path, "France", Target::NewDeaths, &[3.0, 4.0, 5.0], &[2.5, 4.5, 5.0])
            .unwrap();
        assert!(is_png(&path));

        let empty = plot_residuals(&path, "France", Target::NewDeaths, &[], &[]);
        assert!(matches!(empty, Err(ForecastError::ChartError(_))));
    }

    #[test]
    fn test_plot_combined_writes_png() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("combined.png");
        let cases = forecast(Target::NewCases, 0, &[100.0, 110.0]);
        let deaths = forecast(Target::NewDeaths, 0, &[2.0, 3.0]);
        plot_combined(&path, "France", &[&cases, &deaths]).unwrap();
        assert!(is_png(&path));
        assert!(plot_combined(&path, "France", &[]).is_err());
    }
}
