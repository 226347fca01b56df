//! Tracing subscriber setup.
//!
//! Logs go to stdout and, when `logging.file` is set, to a daily-rotated
//! file written from a background thread.

use std::path::Path;
use tracing_appender::non_blocking::WorkerGuard;
use tracing_appender::rolling::{RollingFileAppender, Rotation};
use tracing_subscriber::prelude::*;
use tracing_subscriber::{fmt, EnvFilter};

use crate::config::LoggingConfig;
use crate::error::{GateError, Result};

/// Build the level filter: `RUST_LOG` wins, otherwise the configured level.
pub fn env_filter(config: &LoggingConfig) -> EnvFilter {
    EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(&config.level))
}

/// Rolling appender for `path`, keeping at most `max_files` rotated files.
pub fn file_appender(path: &Path, max_files: usize) -> Result<RollingFileAppender> {
    let dir = match path.parent() {
        Some(parent) if !parent.as_os_str().is_empty() => parent,
        _ => Path::new("."),
    };
    let prefix = path
        .file_name()
        .ok_or_else(|| GateError::Logging(format!("log file path {} has no file name", path.display())))?
        .to_string_lossy()
        .into_owned();

    std::fs::create_dir_all(dir)?;

    RollingFileAppender::builder()
        .rotation(Rotation::DAILY)
        .filename_prefix(prefix)
        .max_log_files(max_files.max(1))
        .build(dir)
        .map_err(|e| GateError::Logging(e.to_string()))
}

/// Install the global tracing subscriber.
///
/// Keep the returned guard alive for the life of the process; dropping it
/// flushes and stops the file writer. Calling this more than once keeps
/// the first subscriber.
pub fn init(config: &LoggingConfig) -> Result<Option<WorkerGuard>> {
    let (file_writer, guard) = match &config.file {
        Some(path) => {
            let appender = file_appender(path, config.max_files)?;
            let (writer, guard) = tracing_appender::non_blocking(appender);
            (Some(writer), Some(guard))
        }
        None => (None, None),
    };

    let json = config.json;
    let stdout_plain = (!json).then(|| fmt::layer().with_target(false).with_thread_ids(true));
    let stdout_json = json.then(|| fmt::layer().json().with_target(false).with_thread_ids(true));
    let file_plain = file_writer.clone().filter(|_| !json).map(|writer| {
        fmt::layer()
            .with_writer(writer)
            .with_ansi(false)
            .with_thread_ids(true)
    });
    let file_json = file_writer
        .filter(|_| json)
        .map(|writer| fmt::layer().json().with_writer(writer).with_thread_ids(true));

    let result = tracing_subscriber::registry()
        .with(env_filter(config))
        .with(stdout_plain)
        .with(stdout_json)
        .with(file_plain)
        .with(file_json)
        .try_init();

    if let Err(e) = result {
        tracing::debug!(error = %e, "Tracing subscriber already installed");
    }

    Ok(guard)
}
