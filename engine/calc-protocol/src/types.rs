//! Core data model

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Numeric semantics used by the evaluator
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Mode {
    /// Integer arithmetic with truncating division
    #[default]
    Integer,
    /// Floating-point arithmetic
    Float,
}

impl Mode {
    /// `Float` iff float mode was explicitly requested
    pub fn from_float_flag(float_requested: bool) -> Self {
        if float_requested {
            Mode::Float
        } else {
            Mode::Integer
        }
    }

    pub fn is_float(self) -> bool {
        matches!(self, Mode::Float)
    }
}

impl std::fmt::Display for Mode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Mode::Integer => write!(f, "integer"),
            Mode::Float => write!(f, "float"),
        }
    }
}

/// A validated calculation request
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CalculationRequest {
    /// Expression text, never empty
    pub expression: String,

    /// Requested evaluation mode
    pub mode: Mode,
}

impl CalculationRequest {
    pub fn new(expression: impl Into<String>, mode: Mode) -> Self {
        Self { expression: expression.into(), mode }
    }
}

/// One persisted evaluation outcome
///
/// Records are immutable once created. `sequence` starts at 1 and defines the
/// global order of the history.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CalculationRecord {
    /// Position in the global order
    pub sequence: u64,

    /// Expression as submitted
    pub expression: String,

    /// Evaluator output
    pub result: String,

    /// Mode the expression was evaluated in
    pub mode: Mode,

    /// Creation time
    pub created_at: DateTime<Utc>,
}

/// Ordered view of every record at a point in time
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Snapshot {
    records: Vec<CalculationRecord>,
}

impl Snapshot {
    /// Build a snapshot from records already ordered by sequence
    pub fn new(records: Vec<CalculationRecord>) -> Self {
        debug_assert!(records.windows(2).all(|w| w[0].sequence < w[1].sequence));
        Self { records }
    }

    /// Highest sequence contained in the snapshot (0 when empty)
    pub fn last_sequence(&self) -> u64 {
        self.records.last().map(|r| r.sequence).unwrap_or(0)
    }

    pub fn records(&self) -> &[CalculationRecord] {
        &self.records
    }

    pub fn into_records(self) -> Vec<CalculationRecord> {
        self.records
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }
}

/// Event delivered to a live subscriber
#[derive(Debug, Clone, PartialEq)]
pub enum BroadcastEvent {
    /// Full history, always the first event of a subscription
    Snapshot(Snapshot),

    /// A single record created after the snapshot
    Update(CalculationRecord),
}
