//! CalcGateway - HTTP submission and WebSocket history feed
//!
//! This crate provides the external interface of the calculation service:
//! request validation, evaluation through an isolated evaluator process,
//! durable append to the history ledger and real-time fan-out of new records
//! to WebSocket subscribers.

pub mod config;
pub mod error;
pub mod evaluator;
pub mod gateway;
pub mod hub;
pub mod rest_api;
pub mod validator;
pub mod websocket_handler;

#[cfg(test)]
mod test_support;

pub use config::{EvaluatorConfig, GatewayConfig, HubConfig, ServerConfig};
pub use error::{
    CalcError, DeliveryFailure, ErrorCategory, EvaluationFailure, GatewayError, GatewayResult,
    HubError, ValidationError,
};
pub use evaluator::{
    EvaluationResult, Evaluator, FnEvaluator, ProcessEvaluator, ScriptedEvaluator,
};
pub use gateway::CalcGateway;
pub use hub::{BroadcastHub, Subscriber, SubscriberId};

/// Version of the CalcGateway API
pub const VERSION: &str = "0.1.0";

/// Default HTTP port
pub const DEFAULT_PORT: u16 = 8000;

/// Default maximum live subscribers
pub const DEFAULT_MAX_SUBSCRIBERS: usize = 1024;

/// Default WebSocket ping interval in seconds
pub const DEFAULT_HEARTBEAT_INTERVAL: u64 = 30;

/// Default per-subscriber queue length
pub const DEFAULT_CHANNEL_CAPACITY: usize = 256;
