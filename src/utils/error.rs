use std::path::PathBuf;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum CondensateError {
    #[error("Serial error: {0}")]
    SerialError(String),

    #[error("Parse error: {0}")]
    ParseError(String),

    #[error("Settings error: {0}")]
    SettingsError(String),

    #[error("Unknown setting: [{section}] {key}")]
    UnknownSetting { section: String, key: String },

    #[error("Invalid value '{value}' for [{section}] {key}: expected {expected}")]
    InvalidSettingValue {
        section: String,
        key: String,
        value: String,
        expected: &'static str,
    },

    #[error("No writable log directory (tried: {})", display_paths(.attempted))]
    NoWritableDirectory { attempted: Vec<PathBuf> },

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("CSV error: {0}")]
    Csv(#[from] csv::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("INI error: {0}")]
    Ini(#[from] ini::Error),

    #[error("Database error: {0}")]
    DatabaseError(String),

    #[error("Service not available: {0}")]
    ServiceNotAvailable(String),

    #[error("Lock acquisition failed")]
    LockError,

    #[error("Timeout occurred")]
    Timeout,
}

fn display_paths(paths: &[PathBuf]) -> String {
    paths
        .iter()
        .map(|p| p.display().to_string())
        .collect::<Vec<_>>()
        .join(", ")
}

impl From<serialport::Error> for CondensateError {
    fn from(err: serialport::Error) -> Self {
        CondensateError::SerialError(err.to_string())
    }
}

#[cfg(feature = "sqlite")]
impl From<sqlx::Error> for CondensateError {
    fn from(err: sqlx::Error) -> Self {
        CondensateError::DatabaseError(err.to_string())
    }
}

impl From<tokio::time::error::Elapsed> for CondensateError {
    fn from(_: tokio::time::error::Elapsed) -> Self {
        CondensateError::Timeout
    }
}

impl From<tokio::task::JoinError> for CondensateError {
    fn from(err: tokio::task::JoinError) -> Self {
        CondensateError::ServiceNotAvailable(format!("background task failed: {}", err))
    }
}

pub type Result<T> = std::result::Result<T, CondensateError>;
