//! Error types for the history subscriber

use thiserror::Error;
use tokio_tungstenite::tungstenite;

/// Errors raised when starting a subscriber
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum SubscriberError {
    #[error("Invalid feed URL: {0}")]
    InvalidUrl(String),

    #[error("Configuration error: {0}")]
    Config(String),
}

pub type SubscriberResult<T> = Result<T, SubscriberError>;

/// Why a connection attempt or an established connection failed
///
/// Reported to the owner as an event; the subscriber keeps reconnecting.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ConnectionFailure {
    #[error("feed unreachable: {0}")]
    Unreachable(String),

    #[error("connect attempt timed out")]
    Timeout,

    #[error("protocol error: {0}")]
    ProtocolError(String),

    #[error("connection lost: {0}")]
    Disconnected(String),
}

impl From<tungstenite::Error> for ConnectionFailure {
    fn from(err: tungstenite::Error) -> Self {
        match err {
            tungstenite::Error::Io(e) => ConnectionFailure::Unreachable(e.to_string()),
            tungstenite::Error::ConnectionClosed | tungstenite::Error::AlreadyClosed => {
                ConnectionFailure::Disconnected(err.to_string())
            }
            other => ConnectionFailure::ProtocolError(other.to_string()),
        }
    }
}
