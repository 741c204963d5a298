//! Subscriber configuration

use crate::error::{SubscriberError, SubscriberResult};
use serde::{Deserialize, Serialize};
use std::time::Duration;
use url::Url;

/// Configuration for a [`crate::ReconnectingSubscriber`]
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct SubscriberConfig {
    /// Feed endpoint (`ws://` or `wss://`)
    pub url: String,

    /// Fixed delay between a disconnect and the next attempt, in milliseconds
    pub reconnect_delay_ms: u64,

    /// Upper bound on a single connect attempt, in milliseconds
    pub connect_timeout_ms: u64,
}

impl Default for SubscriberConfig {
    fn default() -> Self {
        Self {
            url: "ws://127.0.0.1:8000/ws".to_string(),
            reconnect_delay_ms: 2000,
            connect_timeout_ms: 5000,
        }
    }
}

impl SubscriberConfig {
    pub fn new(url: impl Into<String>) -> Self {
        Self { url: url.into(), ..Self::default() }
    }

    pub fn reconnect_delay(&self) -> Duration {
        Duration::from_millis(self.reconnect_delay_ms)
    }

    pub fn connect_timeout(&self) -> Duration {
        Duration::from_millis(self.connect_timeout_ms)
    }

    /// Check the URL and timings, returning the parsed URL
    pub fn validate(&self) -> SubscriberResult<Url> {
        let url = Url::parse(&self.url)
            .map_err(|e| SubscriberError::InvalidUrl(format!("{}: {e}", self.url)))?;

        match url.scheme() {
            "ws" | "wss" => {}
            other => {
                return Err(SubscriberError::InvalidUrl(format!(
                    "unsupported scheme '{other}' in {}",
                    self.url
                )));
            }
        }

        if self.connect_timeout_ms == 0 {
            return Err(SubscriberError::Config("connect_timeout_ms must be greater than 0".into()));
        }

        Ok(url)
    }
}
