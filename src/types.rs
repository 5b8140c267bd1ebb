//! Core types and constants

use crate::error::ForecastError;
use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Calendar date of a daily observation
pub type Date = NaiveDate;

/// Name of the optional population column
pub const POPULATION_COLUMN: &str = "population";

/// Epidemiological metric that can be forecast
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Target {
    NewCases,
    NewDeaths,
    NewRecovered,
}

impl Target {
    /// All supported targets, in processing order
    pub const ALL: [Target; 3] = [Target::NewCases, Target::NewDeaths, Target::NewRecovered];

    /// Column name of this metric in a time series
    pub fn column(&self) -> &'static str {
        match self {
            Target::NewCases => "new_cases",
            Target::NewDeaths => "new_deaths",
            Target::NewRecovered => "new_recovered",
        }
    }

    /// Short metric stem used in derived column names (`cases_per_100k`)
    pub fn stem(&self) -> &'static str {
        match self {
            Target::NewCases => "cases",
            Target::NewDeaths => "deaths",
            Target::NewRecovered => "recovered",
        }
    }

    /// Targets processed when none are requested explicitly
    pub fn defaults() -> Vec<Target> {
        vec![Target::NewCases, Target::NewDeaths]
    }
}

impl fmt::Display for Target {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.column())
    }
}

impl FromStr for Target {
    type Err = ForecastError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "new_cases" | "cases" => Ok(Target::NewCases),
            "new_deaths" | "deaths" => Ok(Target::NewDeaths),
            "new_recovered" | "recovered" => Ok(Target::NewRecovered),
            other => Err(ForecastError::ParseError(format!("Unknown target: {}", other))),
        }
    }
}

/// Identity of a trained model: one region, one target
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ModelKey {
    pub region: String,
    pub target: Target,
}

impl ModelKey {
    pub fn new(region: impl Into<String>, target: Target) -> Self {
        Self {
            region: region.into(),
            target,
        }
    }

    /// File-system safe stem, `{region}_{target}`
    pub fn file_stem(&self) -> String {
        format!("{}_{}", sanitize(&self.region), self.target)
    }
}

impl fmt::Display for ModelKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.region, self.target)
    }
}

/// File-name encoding of a region.
///
/// `[A-Za-z0-9_-]` pass through; every other UTF-8 byte becomes `%XX`. Since `%` itself is
/// escaped, distinct names never share an encoding.
pub fn sanitize(name: &str) -> String {
    let mut encoded = String::with_capacity(name.len());
    for byte in name.bytes() {
        if byte.is_ascii_alphanumeric() || byte == b'_' || byte == b'-' {
            encoded.push(byte as char);
        } else {
            encoded.push_str(&format!("%{:02X}", byte));
        }
    }
    encoded
}

/// One forecast day
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ForecastRow {
    pub date: Date,
    pub predicted_value: f64,
}

impl ForecastRow {
    pub fn new(date: Date, predicted_value: f64) -> Self {
        Self {
            date,
            predicted_value,
        }
    }

    /// Copy of this row with negative predictions raised to zero
    pub fn clipped(&self) -> Self {
        Self {
            date: self.date,
            predicted_value: self.predicted_value.max(0.0),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_target_parsing() {
        assert_eq!("new_cases".parse::<Target>().unwrap(), Target::NewCases);
        assert_eq!("Deaths".parse::<Target>().unwrap(), Target::NewDeaths);
        assert_eq!(" new_recovered ".parse::<Target>().unwrap(), Target::NewRecovered);
        assert!("hospitalized".parse::<Target>().is_err());
    }

    #[test]
    fn test_target_display_matches_column() {
        for target in Target::ALL {
            assert_eq!(target.to_string(), target.column());
        }
    }

    #[test]
    fn test_model_key_file_stem() {
        let key = ModelKey::new("United States", Target::NewDeaths);
        assert_eq!(key.file_stem(), "United%20States_new_deaths");

        let key = ModelKey::new("../etc", Target::NewCases);
        assert_eq!(key.file_stem(), "%2E%2E%2Fetc_new_cases");
    }

    #[test]
    fn test_sanitize_keeps_distinct_regions_apart() {
        let regions = ["New York", "New_York", "New%20York", "New/York", "Côte d'Ivoire"];
        let encoded: Vec<String> = regions.iter().map(|r| sanitize(r)).collect();
        for (i, a) in encoded.iter().enumerate() {
            for b in &encoded[i + 1..] {
                assert_ne!(a, b);
            }
        }
        assert_eq!(sanitize("Bosnia-Herzegovina_2"), "Bosnia-Herzegovina_2");
        assert!(encoded.iter().all(|e| !e.contains('/') && !e.contains(' ')));
    }

    #[test]
    fn test_forecast_row_clipping() {
        let date = NaiveDate::from_ymd_opt(2023, 1, 1).unwrap();
        assert_eq!(ForecastRow::new(date, -3.5).clipped().predicted_value, 0.0);
        assert_eq!(ForecastRow::new(date, 2.0).clipped().predicted_value, 2.0);
    }
}
