//! Service configuration management
//!
//! Configuration is layered: built-in defaults, then an optional TOML file,
//! then `CALC_*` environment variables. The result is validated before use.

use anyhow::{anyhow, Context, Result};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::str::FromStr;
use std::time::Duration;

use calc_gateway::{EvaluatorConfig, GatewayConfig, HubConfig, ServerConfig};
use history_ledger::LedgerConfig;

/// Environment variable naming the configuration file
pub const CONFIG_ENV_VAR: &str = "CALC_CONFIG";

/// Main service configuration
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct ServiceConfig {
    /// HTTP server configuration
    pub server: ServerConfig,

    /// Subscriber registry configuration
    pub hub: HubConfig,

    /// Evaluator process configuration
    pub evaluator: EvaluatorConfig,

    /// History ledger configuration
    pub ledger: LedgerConfig,

    /// Service-level configuration
    pub service: ServiceSettings,

    /// Logging configuration
    pub logging: LoggingConfig,

    /// Metrics configuration
    pub metrics: MetricsConfig,
}

/// Service-level settings
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct ServiceSettings {
    /// Time allowed for open connections to drain on shutdown, in seconds
    pub shutdown_timeout_secs: u64,
}

/// Logging configuration
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct LoggingConfig {
    /// Log level (trace, debug, info, warn, error)
    pub level: String,

    /// Console log format (json, pretty)
    pub format: String,

    /// JSON log file written alongside the console output
    pub file: Option<PathBuf>,
}

/// Metrics configuration
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct MetricsConfig {
    /// Enable the Prometheus exporter
    pub enabled: bool,

    /// Host the exporter binds to
    pub host: String,

    /// Metrics export port
    pub port: u16,
}

impl Default for ServiceSettings {
    fn default() -> Self {
        Self { shutdown_timeout_secs: 10 }
    }
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self { level: "info".to_string(), format: "pretty".to_string(), file: None }
    }
}

impl Default for MetricsConfig {
    fn default() -> Self {
        Self { enabled: true, host: "0.0.0.0".to_string(), port: 9090 }
    }
}

impl ServiceSettings {
    pub fn shutdown_timeout(&self) -> Duration {
        Duration::from_secs(self.shutdown_timeout_secs)
    }
}

impl ServiceConfig {
    /// Gateway view of the configuration
    pub fn gateway_config(&self) -> GatewayConfig {
        GatewayConfig {
            server: self.server.clone(),
            hub: self.hub.clone(),
            evaluator: self.evaluator.clone(),
        }
    }

    /// Load configuration from a TOML file
    pub fn load_from_file(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read configuration file: {:?}", path))?;
        toml::from_str(&content)
            .with_context(|| format!("Failed to parse configuration file: {:?}", path))
    }

    /// Save configuration to a TOML file
    pub fn save_to_file(&self, path: &Path) -> Result<()> {
        let content = toml::to_string_pretty(self).context("Failed to serialize configuration")?;
        std::fs::write(path, content)
            .with_context(|| format!("Failed to write configuration file: {:?}", path))
    }
}

/// Load configuration from files and environment variables
///
/// `path` takes precedence over `CALC_CONFIG`. A named file that does not
/// exist is an error.
pub fn load_config(path: Option<&Path>) -> Result<ServiceConfig> {
    let config_file = path.map(Path::to_path_buf).or_else(|| std::env::var_os(CONFIG_ENV_VAR).map(PathBuf::from));

    let mut config = match &config_file {
        Some(file) => {
            tracing::debug!("Loading configuration from file: {:?}", file);
            ServiceConfig::load_from_file(file)?
        }
        None => ServiceConfig::default(),
    };

    // Override with environment variables
    apply_env_overrides(&mut config, |key| std::env::var(key).ok())?;

    // Validate configuration
    validate_config(&config)?;

    Ok(config)
}

fn parse_var<T>(key: &str, value: &str) -> Result<T>
where
    T: FromStr,
    T::Err: std::fmt::Display,
{
    value.parse().map_err(|e| anyhow!("Invalid value for {key}: {value:?} ({e})"))
}

/// Apply `CALC_*` overrides using `lookup` to read variables
pub fn apply_env_overrides<F>(config: &mut ServiceConfig, lookup: F) -> Result<()>
where
    F: Fn(&str) -> Option<String>,
{
    if let Some(host) = lookup("CALC_HOST") {
        config.server.host = host;
    }

    if let Some(port) = lookup("CALC_PORT") {
        config.server.port = parse_var("CALC_PORT", &port)?;
    }

    if let Some(interval) = lookup("CALC_HEARTBEAT_INTERVAL") {
        config.server.heartbeat_interval = parse_var("CALC_HEARTBEAT_INTERVAL", &interval)?;
    }

    if let Some(max) = lookup("CALC_MAX_SUBSCRIBERS") {
        config.hub.max_subscribers = parse_var("CALC_MAX_SUBSCRIBERS", &max)?;
    }

    if let Some(program) = lookup("CALC_EVALUATOR") {
        config.evaluator.program = program;
    }

    if let Some(timeout) = lookup("CALC_EVALUATOR_TIMEOUT_MS") {
        config.evaluator.timeout_ms = parse_var("CALC_EVALUATOR_TIMEOUT_MS", &timeout)?;
    }

    if let Some(data_dir) = lookup("CALC_DATA_DIR") {
        config.ledger.data_dir = PathBuf::from(data_dir);
    }

    if let Some(fsync) = lookup("CALC_FSYNC") {
        config.ledger.fsync_every_write = parse_var("CALC_FSYNC", &fsync)?;
    }

    if let Some(level) = lookup("CALC_LOG_LEVEL") {
        config.logging.level = level;
    }

    if let Some(format) = lookup("CALC_LOG_FORMAT") {
        config.logging.format = format;
    }

    if let Some(file) = lookup("CALC_LOG_FILE") {
        config.logging.file = Some(PathBuf::from(file));
    }

    if let Some(enabled) = lookup("CALC_METRICS_ENABLED") {
        config.metrics.enabled = parse_var("CALC_METRICS_ENABLED", &enabled)?;
    }

    if let Some(port) = lookup("CALC_METRICS_PORT") {
        config.metrics.port = parse_var("CALC_METRICS_PORT", &port)?;
    }

    Ok(())
}

/// Validate configuration
pub fn validate_config(config: &ServiceConfig) -> Result<()> {
    config.gateway_config().validate().context("Invalid gateway configuration")?;

    config.ledger.validate().map_err(|e| anyhow!("Invalid ledger configuration: {e}"))?;

    // Validate log level
    match config.logging.level.as_str() {
        "trace" | "debug" | "info" | "warn" | "error" => {}
        _ => return Err(anyhow!("Invalid log level: {}", config.logging.level)),
    }

    // Validate log format
    match config.logging.format.as_str() {
        "json" | "pretty" => {}
        _ => return Err(anyhow!("Invalid log format: {}", config.logging.format)),
    }

    // Validate metrics port
    if config.metrics.enabled && config.metrics.port == 0 {
        return Err(anyhow!("Invalid metrics port: {}", config.metrics.port));
    }

    Ok(())
}
