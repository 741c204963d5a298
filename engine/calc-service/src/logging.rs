//! Logging and tracing setup

use anyhow::{Context, Result};
use std::path::Path;
use tracing_appender::non_blocking::WorkerGuard;
use tracing_subscriber::{fmt, layer::SubscriberExt, prelude::*, util::SubscriberInitExt, EnvFilter};

use crate::config::LoggingConfig;

/// Initialize logging and tracing
///
/// Console output follows `config.format`. When `config.file` is set, JSON
/// lines are also written to that file through a non-blocking writer; the
/// returned guard must be held until exit so buffered lines are flushed.
/// `RUST_LOG` takes precedence over `config.level`.
pub fn initialize_logging(config: &LoggingConfig) -> Result<Option<WorkerGuard>> {
    // Set up environment filter
    let env_filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(&config.level));

    // Set up console layer based on format
    let console_layer = match config.format.as_str() {
        "json" => fmt::layer().json().with_target(true).with_thread_ids(true).boxed(),
        _ => fmt::layer()
            .with_target(false)
            .with_thread_ids(true)
            .with_file(true)
            .with_line_number(true)
            .with_ansi(true)
            .boxed(),
    };

    // Set up JSON file layer
    let (file_layer, guard) = match &config.file {
        Some(path) => {
            let (writer, guard) = tracing_appender::non_blocking(file_appender(path)?);
            let layer = fmt::layer()
                .json()
                .with_target(true)
                .with_current_span(false)
                .with_ansi(false)
                .with_writer(writer);
            (Some(layer), Some(guard))
        }
        None => (None, None),
    };

    // Initialize the subscriber
    tracing_subscriber::registry()
        .with(env_filter)
        .with(console_layer)
        .with(file_layer)
        .try_init()
        .context("Failed to install tracing subscriber")?;

    Ok(guard)
}

fn file_appender(path: &Path) -> Result<tracing_appender::rolling::RollingFileAppender> {
    let directory = match path.parent() {
        Some(dir) if !dir.as_os_str().is_empty() => dir.to_path_buf(),
        _ => Path::new(".").to_path_buf(),
    };
    let file_name = path
        .file_name()
        .with_context(|| format!("Log file path has no file name: {:?}", path))?;

    std::fs::create_dir_all(&directory)
        .with_context(|| format!("Failed to create log directory: {:?}", directory))?;

    Ok(tracing_appender::rolling::never(directory, file_name))
}
