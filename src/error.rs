//! Error types for wear-collapse

use thiserror::Error;

/// Errors that can occur while collapsing a participant's epochs.
///
/// Insufficient data, below-threshold variables and degenerate regressions are
/// not errors: they surface as a dummy route, an absent value and a NaN value
/// respectively.
#[derive(Debug, Error)]
pub enum CollapseError {
    #[error("Missing input for participant {id}: {path}")]
    MissingInput { id: String, path: String },

    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    #[error("CSV error: {0}")]
    Csv(#[from] csv::Error),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Invalid JSON: {0}")]
    Json(#[from] serde_json::Error),

    #[error("Missing required column: {0}")]
    MissingColumn(String),

    #[error("Parse error: {0}")]
    ParseError(String),

    #[error("Invalid time resolution: {0}")]
    InvalidTimeResolution(String),
}

impl CollapseError {
    /// Short machine-readable code used in run reports
    pub fn code(&self) -> &'static str {
        match self {
            CollapseError::MissingInput { .. } => "MISSING_INPUT",
            CollapseError::InvalidConfig(_) => "INVALID_CONFIG",
            CollapseError::Csv(_) => "CSV_ERROR",
            CollapseError::Io(_) => "IO_ERROR",
            CollapseError::Json(_) => "JSON_ERROR",
            CollapseError::MissingColumn(_) => "MISSING_COLUMN",
            CollapseError::ParseError(_) => "PARSE_ERROR",
            CollapseError::InvalidTimeResolution(_) => "INVALID_TIME_RESOLUTION",
        }
    }
}
