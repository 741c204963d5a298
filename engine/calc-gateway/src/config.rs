//! Configuration for the CalcGateway

use crate::error::{GatewayError, GatewayResult};
use serde::{Deserialize, Serialize};
use std::net::SocketAddr;
use std::path::Path;
use std::time::Duration;

/// Main configuration for the CalcGateway
#[derive(Debug, Clone, Serialize, Deserialize, Default, PartialEq)]
#[serde(default)]
pub struct GatewayConfig {
    /// Server configuration
    pub server: ServerConfig,

    /// Subscriber registry configuration
    pub hub: HubConfig,

    /// Evaluator process configuration
    pub evaluator: EvaluatorConfig,
}

/// Server configuration
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct ServerConfig {
    /// Host to bind to
    pub host: String,

    /// Port to bind to
    pub port: u16,

    /// WebSocket ping interval in seconds
    pub heartbeat_interval: u64,
}

/// Subscriber registry configuration
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct HubConfig {
    /// Maximum number of live subscribers
    pub max_subscribers: usize,

    /// Events buffered per subscriber before it is dropped as too slow
    pub channel_capacity: usize,
}

/// Evaluator process configuration
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct EvaluatorConfig {
    /// Program to launch for each evaluation
    pub program: String,

    /// Arguments passed before the float flag
    pub args: Vec<String>,

    /// Argument appended in float mode
    pub float_flag: String,

    /// Per-evaluation timeout in milliseconds
    pub timeout_ms: u64,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: "0.0.0.0".to_string(),
            port: crate::DEFAULT_PORT,
            heartbeat_interval: crate::DEFAULT_HEARTBEAT_INTERVAL,
        }
    }
}

impl Default for HubConfig {
    fn default() -> Self {
        Self {
            max_subscribers: crate::DEFAULT_MAX_SUBSCRIBERS,
            channel_capacity: crate::DEFAULT_CHANNEL_CAPACITY,
        }
    }
}

impl Default for EvaluatorConfig {
    fn default() -> Self {
        Self {
            program: "calc-evaluator".to_string(),
            args: Vec::new(),
            float_flag: "--float".to_string(),
            timeout_ms: 5000,
        }
    }
}

impl EvaluatorConfig {
    pub fn timeout(&self) -> Duration {
        Duration::from_millis(self.timeout_ms)
    }
}

impl ServerConfig {
    pub fn heartbeat(&self) -> Duration {
        Duration::from_secs(self.heartbeat_interval)
    }
}

impl GatewayConfig {
    /// Get the server address
    pub fn server_addr(&self) -> GatewayResult<SocketAddr> {
        format!("{}:{}", self.server.host, self.server.port)
            .parse()
            .map_err(|e| GatewayError::config(format!("Invalid server address: {e}")))
    }

    /// Load configuration from file
    pub fn load_from_file(path: impl AsRef<Path>) -> GatewayResult<Self> {
        let content = std::fs::read_to_string(path)?;
        let config: GatewayConfig = toml::from_str(&content)?;
        Ok(config)
    }

    /// Save configuration to file
    pub fn save_to_file(&self, path: impl AsRef<Path>) -> GatewayResult<()> {
        let content = toml::to_string_pretty(self)?;
        std::fs::write(path, content)?;
        Ok(())
    }

    /// Validate the configuration
    pub fn validate(&self) -> GatewayResult<()> {
        self.server_addr()?;

        if self.server.heartbeat_interval == 0 {
            return Err(GatewayError::config("heartbeat_interval must be greater than 0"));
        }
        if self.hub.max_subscribers == 0 {
            return Err(GatewayError::config("max_subscribers must be greater than 0"));
        }
        if self.hub.channel_capacity == 0 {
            return Err(GatewayError::config("channel_capacity must be greater than 0"));
        }
        if self.evaluator.program.trim().is_empty() {
            return Err(GatewayError::config("evaluator program cannot be empty"));
        }
        if self.evaluator.timeout_ms == 0 {
            return Err(GatewayError::config("evaluator timeout_ms must be greater than 0"));
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_defaults() {
        let config = GatewayConfig::default();
        assert_eq!(config.server_addr().unwrap().port(), 8000);
        assert_eq!(config.evaluator.float_flag, "--float");
        assert_eq!(config.evaluator.timeout(), Duration::from_secs(5));
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_save_and_load_round_trip() {
        let temp_dir = TempDir::new().unwrap();
        let path = temp_dir.path().join("gateway.toml");

        let mut config = GatewayConfig::default();
        config.server.port = 9100;
        config.evaluator.program = "/usr/local/bin/calc-evaluator".to_string();
        config.save_to_file(&path).unwrap();

        assert_eq!(GatewayConfig::load_from_file(&path).unwrap(), config);
    }

    #[test]
    fn test_partial_file_uses_defaults() {
        let config: GatewayConfig = toml::from_str("[server]\nport = 8123\n").unwrap();
        assert_eq!(config.server.port, 8123);
        assert_eq!(config.server.host, "0.0.0.0");
        assert_eq!(config.hub, HubConfig::default());
    }

    #[test]
    fn test_validation_failures() {
        let mut config = GatewayConfig::default();
        config.hub.channel_capacity = 0;
        assert!(matches!(config.validate(), Err(GatewayError::Config(_))));

        let mut config = GatewayConfig::default();
        config.server.host = "not a host".to_string();
        assert!(config.validate().is_err());

        let mut config = GatewayConfig::default();
        config.evaluator.program = " ".to_string();
        assert!(config.validate().is_err());
    }
}
