//! Daily counts from a SQLite table

use super::{wanted_columns, DataSource};
use crate::error::{ForecastError, Result};
use crate::series::{coerce_numeric, SeriesBuilder, TimeSeries};
use crate::types::{Date, Target};
use chrono::NaiveDate;
use num_traits::ToPrimitive;
use rusqlite::types::Value;
use rusqlite::{params_from_iter, Connection};
use std::path::Path;

/// Default table holding one row per (region, date)
pub const DEFAULT_TABLE: &str = "daily_counts";

/// SQLite-backed source; metric columns may be absent from the table
pub struct SqliteSource {
    conn: Connection,
    table: String,
}

impl SqliteSource {
    /// Open an existing database file
    pub fn open(db_path: &Path) -> Result<Self> {
        let conn = Connection::open(db_path)
            .map_err(|e| ForecastError::DataError(format!("Failed to open database: {}", e)))?;
        Ok(Self {
            conn,
            table: DEFAULT_TABLE.to_string(),
        })
    }

    /// In-memory database with the default schema (for testing)
    pub fn open_in_memory() -> Result<Self> {
        let conn = Connection::open_in_memory().map_err(|e| {
            ForecastError::DataError(format!("Failed to create in-memory database: {}", e))
        })?;
        let source = Self {
            conn,
            table: DEFAULT_TABLE.to_string(),
        };
        source.create_schema()?;
        Ok(source)
    }

    /// Read from `table` instead of `daily_counts`
    pub fn with_table(mut self, table: &str) -> Result<Self> {
        validate_identifier(table)?;
        self.table = table.to_string();
        Ok(self)
    }

    pub fn conn(&self) -> &Connection {
        &self.conn
    }

    /// Create the default table if missing
    pub fn create_schema(&self) -> Result<()> {
        self.conn.execute(
            &format!(
                "CREATE TABLE IF NOT EXISTS {} (
                    region TEXT NOT NULL,
                    date TEXT NOT NULL,
                    new_cases REAL,
                    new_deaths REAL,
                    new_recovered REAL,
                    population REAL
                )",
                self.table
            ),
            [],
        )?;
        self.conn.execute(
            &format!(
                "CREATE INDEX IF NOT EXISTS idx_{0}_region_date ON {0}(region, date)",
                self.table
            ),
            [],
        )?;
        Ok(())
    }

    /// Insert one day of counts; columns not named are left NULL
    pub fn insert(&self, region: &str, date: Date, values: &[(&str, Option<f64>)]) -> Result<()> {
        let mut columns = vec!["region".to_string(), "date".to_string()];
        let mut params: Vec<Value> = vec![
            Value::Text(region.to_string()),
            Value::Text(date.format("%Y-%m-%d").to_string()),
        ];
        for (name, value) in values {
            validate_identifier(name)?;
            columns.push(name.to_string());
            params.push(value.map_or(Value::Null, Value::Real));
        }

        let placeholders: Vec<String> = (1..=columns.len()).map(|i| format!("?{}", i)).collect();
        let sql = format!(
            "INSERT INTO {} ({}) VALUES ({})",
            self.table,
            columns.join(", "),
            placeholders.join(", ")
        );
        self.conn.execute(&sql, params_from_iter(params))?;
        Ok(())
    }

    /// Column names of the source table
    pub fn available_columns(&self) -> Result<Vec<String>> {
        let mut stmt = self
            .conn
            .prepare(&format!("PRAGMA table_info({})", self.table))?;
        let columns = stmt
            .query_map([], |row| row.get::<_, String>(1))?
            .collect::<std::result::Result<Vec<_>, _>>()?;
        Ok(columns)
    }

    /// Distinct regions present in the table
    pub fn regions(&self) -> Result<Vec<String>> {
        let mut stmt = self.conn.prepare(&format!(
            "SELECT DISTINCT region FROM {} ORDER BY region",
            self.table
        ))?;
        let regions = stmt
            .query_map([], |row| row.get::<_, String>(0))?
            .collect::<std::result::Result<Vec<_>, _>>()?;
        Ok(regions)
    }
}

impl DataSource for SqliteSource {
    fn load(&self, region: &str, targets: &[Target]) -> Result<TimeSeries> {
        let available = self.available_columns()?;
        if available.is_empty() {
            return Err(ForecastError::DataError(format!(
                "Table '{}' does not exist",
                self.table
            )));
        }
        for required in ["region", "date"] {
            if !available.iter().any(|c| c == required) {
                return Err(ForecastError::MissingColumn(required.to_string()));
            }
        }

        let columns: Vec<&str> = wanted_columns(targets)
            .into_iter()
            .filter(|name| available.iter().any(|c| c == name))
            .collect();
        if columns.is_empty() {
            return Err(ForecastError::DataError(format!(
                "Table '{}' has no metric columns",
                self.table
            )));
        }

        let select = std::iter::once("date")
            .chain(columns.iter().copied())
            .collect::<Vec<_>>()
            .join(", ");
        let sql = format!(
            "SELECT {} FROM {} WHERE region = ?1 ORDER BY date",
            select, self.table
        );

        let mut builder = SeriesBuilder::new();
        for name in &columns {
            builder.declare_column(name);
        }

        let mut stmt = self.conn.prepare(&sql)?;
        let mut rows = stmt.query([region])?;
        while let Some(row) = rows.next()? {
            let date = parse_date(row.get::<_, Value>(0)?)?;
            for (i, name) in columns.iter().enumerate() {
                builder.add(date, name, coerce_value(row.get::<_, Value>(i + 1)?))?;
            }
        }

        if builder.row_count() == 0 {
            return Err(ForecastError::DataError(format!(
                "No data for region '{}' in table '{}'",
                region, self.table
            )));
        }

        let series = builder.finish()?;
        log::info!(
            "Loaded {} days for {} from table '{}' (columns: {})",
            series.len(),
            region,
            self.table,
            columns.join(", ")
        );
        Ok(series)
    }

    fn name(&self) -> &str {
        "sqlite"
    }
}

/// Numeric view of a SQLite cell; anything non-numeric is missing
fn coerce_value(value: Value) -> Option<f64> {
    match value {
        Value::Integer(i) => i.to_f64(),
        Value::Real(f) if f.is_finite() => Some(f),
        Value::Text(s) => coerce_numeric(&s),
        _ => None,
    }
}

fn parse_date(value: Value) -> Result<Date> {
    let raw = match value {
        Value::Text(s) => s,
        other => {
            return Err(ForecastError::DataError(format!(
                "Unsupported date cell: {:?}",
                other
            )))
        }
    };
    // Accept both plain dates and timestamps
    let day = raw.get(..10).unwrap_or(&raw);
    NaiveDate::parse_from_str(day, "%Y-%m-%d")
        .map_err(|_| ForecastError::DataError(format!("Invalid date: {}", raw)))
}

fn validate_identifier(name: &str) -> Result<()> {
    let valid = !name.is_empty()
        && name
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || c == '_')
        && !name.starts_with(|c: char| c.is_ascii_digit());
    if valid {
        Ok(())
    } else {
        Err(ForecastError::InvalidParameter(format!(
            "Invalid SQL identifier: {}",
            name
        )))
    }
}
