//! Error types for epi_forecast

use thiserror::Error;

/// Main error type for epi_forecast
#[derive(Error, Debug)]
pub enum ForecastError {
    #[error("Missing column: {0}")]
    MissingColumn(String),

    #[error("Insufficient history: {available} usable rows, at least {required} required")]
    InsufficientHistory { available: usize, required: usize },

    #[error("Model not found: {0}")]
    ModelNotFound(String),

    #[error("Schema mismatch: {0}")]
    SchemaMismatch(String),

    #[error("Empty history: cannot seed a forecast from a table with no rows")]
    EmptyHistory,

    #[error("Invalid parameter: {0}")]
    InvalidParameter(String),

    #[error("Training error: {0}")]
    TrainingError(String),

    #[error("Data error: {0}")]
    DataError(String),

    #[error("Configuration error: {0}")]
    ConfigError(String),

    #[error("Parse error: {0}")]
    ParseError(String),

    #[error("Chart error: {0}")]
    ChartError(String),

    #[cfg(feature = "rusqlite-support")]
    #[error("Database error: {0}")]
    DatabaseError(#[from] rusqlite::Error),

    #[error("IO error: {0}")]
    IoError(#[from] std::io::Error),

    #[error("Serialization error: {0}")]
    SerdeError(#[from] serde_json::Error),

    #[error("CSV error: {0}")]
    CsvError(#[from] csv::Error),
}

/// Result type alias for epi_forecast operations
pub type Result<T> = std::result::Result<T, ForecastError>;
