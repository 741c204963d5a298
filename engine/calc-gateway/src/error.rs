//! Error types for the CalcGateway

use thiserror::Error;
use tokio::sync::mpsc::error::TrySendError;

/// Errors that can occur while configuring or running the CalcGateway
#[derive(Error, Debug)]
pub enum GatewayError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("Config parse error: {0}")]
    ConfigParse(#[from] toml::de::Error),

    #[error("Config write error: {0}")]
    ConfigWrite(#[from] toml::ser::Error),

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Bind error: {0}")]
    Bind(String),

    #[error("Ledger error: {0}")]
    Ledger(#[from] history_ledger::LedgerError),
}

impl GatewayError {
    pub fn config(msg: impl Into<String>) -> Self {
        GatewayError::Config(msg.into())
    }
}

/// Result type for CalcGateway operations
pub type GatewayResult<T> = Result<T, GatewayError>;

/// Rejected request payloads
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ValidationError {
    #[error("unsupported content type: {0}")]
    UnsupportedContentType(String),

    #[error("request body is empty")]
    EmptyBody,

    #[error("malformed payload: {0}")]
    MalformedPayload(String),
}

/// Evaluator failures
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum EvaluationFailure {
    /// The evaluator ran and reported an error
    #[error("{0}")]
    NonZeroExit(String),

    /// The evaluator could not be started
    #[error("{0}")]
    LaunchFailure(String),

    #[error("evaluator timeout")]
    Timeout,
}

/// Subscription refusals
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum HubError {
    #[error("channel is already subscribed")]
    AlreadySubscribed,

    #[error("subscriber capacity of {0} reached")]
    CapacityExceeded(usize),

    #[error("subscriber channel closed before the snapshot was delivered")]
    ChannelClosed,
}

/// Why an event could not be handed to a subscriber
#[derive(Error, Debug, Clone, Copy, PartialEq, Eq)]
pub enum DeliveryFailure {
    #[error("subscriber queue is full")]
    Full,

    #[error("subscriber channel is closed")]
    Closed,
}

impl<T> From<TrySendError<T>> for DeliveryFailure {
    fn from(err: TrySendError<T>) -> Self {
        match err {
            TrySendError::Full(_) => DeliveryFailure::Full,
            TrySendError::Closed(_) => DeliveryFailure::Closed,
        }
    }
}

/// Response category reported to clients
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorCategory {
    Validation,
    Evaluation,
    Storage,
}

impl ErrorCategory {
    pub fn as_str(self) -> &'static str {
        match self {
            ErrorCategory::Validation => "validation",
            ErrorCategory::Evaluation => "evaluation",
            ErrorCategory::Storage => "storage",
        }
    }
}

/// Failure of a single calculation submission
#[derive(Error, Debug)]
pub enum CalcError {
    #[error(transparent)]
    Validation(#[from] ValidationError),

    #[error(transparent)]
    Evaluation(#[from] EvaluationFailure),

    #[error("failed to store result: {0}")]
    Storage(String),
}

impl CalcError {
    pub fn category(&self) -> ErrorCategory {
        match self {
            CalcError::Validation(_) => ErrorCategory::Validation,
            CalcError::Evaluation(_) => ErrorCategory::Evaluation,
            CalcError::Storage(_) => ErrorCategory::Storage,
        }
    }
}

impl From<history_ledger::LedgerError> for CalcError {
    fn from(err: history_ledger::LedgerError) -> Self {
        CalcError::Storage(err.to_string())
    }
}
