//! Calc Exchange Production Service Library
//!
//! This library provides the core functionality for the calculation service,
//! including configuration management, component initialization, metrics and
//! graceful shutdown handling.

use anyhow::{Context, Result};
use std::path::Path;

pub mod config;
pub mod logging;
pub mod monitoring;
pub mod service;
pub mod signals;

pub use config::ServiceConfig;
pub use logging::initialize_logging;
pub use service::{RunningServer, ServiceState};
pub use signals::{setup_signal_handlers, wait_for_shutdown};

/// Load configuration from files and environment variables
pub fn load_configuration(path: Option<&Path>) -> Result<ServiceConfig> {
    config::load_config(path).context("Failed to load service configuration")
}
