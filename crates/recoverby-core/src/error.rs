// crates/recoverby-core/src/error.rs

use std::path::PathBuf;

use thiserror::Error;

#[derive(Error, Debug)]
pub enum RecoveryError {
    #[error("File I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Polars operation failed: {0}")]
    Polars(#[from] polars::error::PolarsError),

    #[error("Settings file is invalid: {0}")]
    Settings(#[from] toml::de::Error),

    #[error("{variable} variable not present in {}", path.display())]
    MissingVariable { variable: String, path: PathBuf },

    #[error("unsupported dataset format for {}", path.display())]
    UnsupportedFormat { path: PathBuf },

    #[error("time variable {variable} has unsupported type {dtype}")]
    UnsupportedTimeType { variable: String, dtype: String },

    #[error("sensor variable {variable} is not numeric ({dtype})")]
    NonNumericSensor { variable: String, dtype: String },

    #[error("invalid timestamp {value:?}; expected an ISO-8601 date or date-time")]
    InvalidTimestamp { value: String },

    #[error("invalid selection window: {0}")]
    InvalidWindow(String),

    #[error("invalid setting: {0}")]
    InvalidSetting(String),

    #[error("No data to fit in {}", path.display())]
    EmptyAfterCleaning { path: PathBuf },

    #[error("cannot fit a line to {samples} sample(s) without a time spread")]
    DegenerateFit { samples: usize },
}

pub type Result<T> = std::result::Result<T, RecoveryError>;
