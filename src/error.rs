//! Error types for the admission gate.

use std::time::Duration;
use thiserror::Error;

/// Rejected limiter settings.
///
/// Raised once while constructing a limiter. A process that hits one of
/// these should refuse to start.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ConfigurationError {
    /// Bucket duration must be positive
    #[error("bucket duration must be greater than zero")]
    ZeroBucketDuration,

    /// Window duration must be positive
    #[error("window duration must be greater than zero")]
    ZeroWindowDuration,

    /// The window has to be split into a whole number of buckets
    #[error("window duration {window:?} is not an exact multiple of bucket duration {bucket:?}")]
    UnevenWindow { window: Duration, bucket: Duration },

    /// At least one request per window must be admissible
    #[error("max threshold must be greater than zero")]
    ZeroThreshold,

    /// Bucket ring would be larger than the supported maximum
    #[error("window would need {count} buckets, at most {max} are supported")]
    TooManyBuckets { count: u128, max: usize },
}

/// Main error type for gate operations.
#[derive(Error, Debug)]
pub enum GateError {
    /// Invalid limiter settings
    #[error("Configuration error: {0}")]
    Configuration(#[from] ConfigurationError),

    /// Settings could not be loaded or parsed
    #[error("Config loading error: {0}")]
    Config(String),

    /// Log sink could not be set up
    #[error("Logging setup error: {0}")]
    Logging(String),

    /// I/O errors
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

impl From<config::ConfigError> for GateError {
    fn from(err: config::ConfigError) -> Self {
        GateError::Config(err.to_string())
    }
}

/// Result type alias for gate operations.
pub type Result<T> = std::result::Result<T, GateError>;
