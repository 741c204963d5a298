//! Configuration for the history ledger

use serde::{Deserialize, Serialize};
use std::path::PathBuf;

/// Configuration for the on-disk history store
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct LedgerConfig {
    /// Base directory for history files
    pub data_dir: PathBuf,

    /// Name of the history file inside `data_dir`
    pub file_name: String,

    /// Whether to fsync on every append (for maximum durability)
    pub fsync_every_write: bool,
}

impl Default for LedgerConfig {
    fn default() -> Self {
        Self {
            data_dir: PathBuf::from("./data"),
            file_name: "history.jsonl".to_string(),
            fsync_every_write: true,
        }
    }
}

impl LedgerConfig {
    /// Create a new configuration with custom data directory
    pub fn new(data_dir: impl Into<PathBuf>) -> Self {
        Self { data_dir: data_dir.into(), ..Default::default() }
    }

    /// Get the history file path
    pub fn history_path(&self) -> PathBuf {
        self.data_dir.join(&self.file_name)
    }

    /// Validate the configuration
    pub fn validate(&self) -> Result<(), String> {
        if self.file_name.trim().is_empty() {
            return Err("Ledger file_name must not be empty".to_string());
        }

        if self.file_name.contains(['/', '\\']) {
            return Err(format!("Ledger file_name must be a plain file name: {}", self.file_name));
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_history_path() {
        let config = LedgerConfig::new("/tmp/calc");
        assert_eq!(config.history_path(), PathBuf::from("/tmp/calc/history.jsonl"));
        assert!(config.fsync_every_write);
    }

    #[test]
    fn test_validate_rejects_bad_file_names() {
        let mut config = LedgerConfig::default();
        assert!(config.validate().is_ok());

        config.file_name = "  ".to_string();
        assert!(config.validate().is_err());

        config.file_name = "nested/history.jsonl".to_string();
        assert!(config.validate().is_err());
    }
}
