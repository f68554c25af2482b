//! Error types for configuration and operator input parsing.
//!
//! Nothing in the running engine is fatal: timing races are no-ops and
//! disabled tasks ignore input. Errors only surface where a caller hands us
//! something we cannot interpret.

use std::path::PathBuf;

#[derive(Debug, thiserror::Error)]
pub enum BatteryError {
    #[error("events per minute must be positive, got {0}")]
    InvalidEventRate(f64),

    #[error("difficulty must be within 0..=10, got {0}")]
    InvalidDifficulty(f64),

    #[error("jitter range is invalid: min {min}, max {max}")]
    InvalidJitter { min: f64, max: f64 },

    #[error("{0} must be a positive period in ms")]
    InvalidPeriod(&'static str),

    #[error("{field} is out of range: {value}")]
    InvalidParameter { field: &'static str, value: f64 },

    #[error("unknown indicator '{0}'")]
    UnknownIndicator(String),

    #[error("unknown radio '{0}'")]
    UnknownRadio(String),

    #[error("invalid frequency '{0}'")]
    InvalidFrequency(String),

    #[error("unknown pump {0}")]
    UnknownPump(u8),

    #[error("unknown tank '{0}'")]
    UnknownTank(String),

    #[error("message catalog has no {0} messages")]
    EmptyCatalog(&'static str),

    #[error("failed to read config {path}: {source}")]
    ConfigIo {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("config parse error: {0}")]
    ConfigParse(#[from] serde_json::Error),
}
