//! Error types for the glucose statistics core

use thiserror::Error;

use crate::units::GlucoseUnit;

#[derive(Error, Debug)]
pub enum DexStatsError {
    #[error("Reading source unavailable after {attempts} attempts: {last_error}")]
    SourceUnavailable { attempts: u32, last_error: String },

    #[error("No readings to compute statistics from")]
    InsufficientData,

    #[error("Statistics undefined: {0}")]
    DegenerateStatistics(&'static str),

    #[error("Invalid thresholds: low {low} must be below high {high} ({unit:?})")]
    InvalidThresholds { unit: GlucoseUnit, low: f64, high: f64 },

    #[error("Invalid glucose reading: {0} mg/dL")]
    InvalidReading(f64),

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON serialization error: {0}")]
    Json(#[from] serde_json::Error),
}
