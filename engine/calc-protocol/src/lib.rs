//! Calc Protocol - shared data model for the calculation exchange
//!
//! Types used by the gateway, the history ledger and subscribers:
//! evaluation modes, requests, persisted records, snapshots and the
//! JSON messages exchanged over the live history feed.

pub mod messages;
pub mod types;

pub use messages::{HistoryMessage, RecordMessage, WireMessage};
pub use types::{BroadcastEvent, CalculationRecord, CalculationRequest, Mode, Snapshot};

/// Version of the wire protocol
pub const PROTOCOL_VERSION: &str = "0.1.0";
