//! Configuration management for the admission gate.
//!
//! Settings are layered: built-in defaults, then an optional file, then
//! environment variables such as `WINDOWGATE_LIMITER__MAX_THRESHOLD=100`.

use config::{Config, Environment, File, FileFormat};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::error::Result;
use crate::ratelimit::WindowSettings;

/// Prefix for environment overrides.
const ENV_PREFIX: &str = "WINDOWGATE";

/// Main configuration for the gate.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct GateConfig {
    /// Limiter configuration
    #[serde(default)]
    pub limiter: LimiterConfig,

    /// Logging configuration
    #[serde(default)]
    pub logging: LoggingConfig,
}

/// Limiter configuration.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LimiterConfig {
    /// Seconds covered by one bucket
    #[serde(default = "default_bucket_secs")]
    pub bucket_secs: u64,

    /// Seconds covered by the whole window
    #[serde(default = "default_window_secs")]
    pub window_secs: u64,

    /// Requests admitted per window
    #[serde(default = "default_max_threshold")]
    pub max_threshold: u64,
}

impl Default for LimiterConfig {
    fn default() -> Self {
        Self {
            bucket_secs: default_bucket_secs(),
            window_secs: default_window_secs(),
            max_threshold: default_max_threshold(),
        }
    }
}

impl LimiterConfig {
    /// Convert to window settings. Validation happens when the limiter is built.
    pub fn settings(&self) -> WindowSettings {
        WindowSettings::new(
            Duration::from_secs(self.bucket_secs),
            Duration::from_secs(self.window_secs),
            self.max_threshold,
        )
    }
}

fn default_bucket_secs() -> u64 {
    10
}

fn default_window_secs() -> u64 {
    60
}

fn default_max_threshold() -> u64 {
    10
}

/// Logging configuration.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LoggingConfig {
    /// Default level filter, overridden by `RUST_LOG`
    #[serde(default = "default_log_level")]
    pub level: String,

    /// Emit JSON lines instead of human-readable output
    #[serde(default)]
    pub json: bool,

    /// Also write logs to this file, rotated daily
    #[serde(default)]
    pub file: Option<PathBuf>,

    /// Rotated log files to keep
    #[serde(default = "default_max_log_files")]
    pub max_files: usize,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
            json: false,
            file: None,
            max_files: default_max_log_files(),
        }
    }
}

fn default_log_level() -> String {
    "info".to_string()
}

fn default_max_log_files() -> usize {
    5
}

impl GateConfig {
    /// Load configuration from an optional file plus the environment.
    pub fn load(path: Option<&Path>) -> Result<Self> {
        let mut builder = Config::builder();
        if let Some(path) = path {
            builder = builder.add_source(File::from(path));
        }

        let config = builder.add_source(env_source()).build()?;
        Ok(config.try_deserialize()?)
    }

    /// Load configuration from an in-memory document.
    pub fn from_document(contents: &str, format: FileFormat) -> Result<Self> {
        let config = Config::builder()
            .add_source(File::from_str(contents, format))
            .build()?;
        Ok(config.try_deserialize()?)
    }
}

fn env_source() -> Environment {
    Environment::with_prefix(ENV_PREFIX)
        .prefix_separator("_")
        .separator("__")
        .try_parsing(true)
}
