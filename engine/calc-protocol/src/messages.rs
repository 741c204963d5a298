//! Message types for the live history feed
//!
//! The first message on a feed is `{"history": [...]}`; every later message is
//! a single record object.

use crate::types::{BroadcastEvent, CalculationRecord, Mode};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Wire form of a single record
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RecordMessage {
    /// Position in the global order (0 when the sender did not include it)
    #[serde(default)]
    pub sequence: u64,

    /// Expression as submitted
    pub expression: String,

    /// Evaluator output
    pub result: String,

    /// Whether the expression was evaluated in float mode
    pub float_mode: bool,

    /// Creation time
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub timestamp: Option<DateTime<Utc>>,
}

/// Wire form of a full history snapshot
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HistoryMessage {
    /// Records ordered by sequence
    pub history: Vec<RecordMessage>,
}

/// Any message that can appear on the feed
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum WireMessage {
    History(HistoryMessage),
    Record(RecordMessage),
}

impl WireMessage {
    /// Parse a text frame
    pub fn parse(text: &str) -> Result<Self, serde_json::Error> {
        serde_json::from_str(text)
    }

    /// Encode as a text frame
    pub fn to_json(&self) -> Result<String, serde_json::Error> {
        serde_json::to_string(self)
    }
}

impl From<&CalculationRecord> for RecordMessage {
    fn from(record: &CalculationRecord) -> Self {
        Self {
            sequence: record.sequence,
            expression: record.expression.clone(),
            result: record.result.clone(),
            float_mode: record.mode.is_float(),
            timestamp: Some(record.created_at),
        }
    }
}

impl RecordMessage {
    pub fn mode(&self) -> Mode {
        Mode::from_float_flag(self.float_mode)
    }
}

impl HistoryMessage {
    pub fn from_records(records: &[CalculationRecord]) -> Self {
        Self { history: records.iter().map(RecordMessage::from).collect() }
    }
}

impl From<&BroadcastEvent> for WireMessage {
    fn from(event: &BroadcastEvent) -> Self {
        match event {
            BroadcastEvent::Snapshot(snapshot) => {
                WireMessage::History(HistoryMessage::from_records(snapshot.records()))
            }
            BroadcastEvent::Update(record) => WireMessage::Record(RecordMessage::from(record)),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::Snapshot;

    fn record(sequence: u64, mode: Mode) -> CalculationRecord {
        CalculationRecord {
            sequence,
            expression: "3 / 2".to_string(),
            result: if mode.is_float() { "1.5".to_string() } else { "1".to_string() },
            mode,
            created_at: Utc::now(),
        }
    }

    #[test]
    fn test_snapshot_event_encodes_history_object() {
        let event = BroadcastEvent::Snapshot(Snapshot::new(vec![record(1, Mode::Integer)]));
        let json = WireMessage::from(&event).to_json().unwrap();
        let value: serde_json::Value = serde_json::from_str(&json).unwrap();

        let history = value.get("history").and_then(|h| h.as_array()).unwrap();
        assert_eq!(history.len(), 1);
        assert_eq!(history[0]["expression"], "3 / 2");
        assert_eq!(history[0]["float_mode"], false);
        assert_eq!(history[0]["sequence"], 1);
    }

    #[test]
    fn test_update_event_encodes_flat_record() {
        let event = BroadcastEvent::Update(record(4, Mode::Float));
        let json = WireMessage::from(&event).to_json().unwrap();
        let value: serde_json::Value = serde_json::from_str(&json).unwrap();

        assert!(value.get("history").is_none());
        assert_eq!(value["result"], "1.5");
        assert_eq!(value["float_mode"], true);
        assert!(value.get("timestamp").is_some());
    }

    #[test]
    fn test_parse_distinguishes_history_and_record() {
        let history = WireMessage::parse(r#"{"history": []}"#).unwrap();
        assert!(matches!(history, WireMessage::History(ref h) if h.history.is_empty()));

        // Records without sequence or timestamp are still accepted
        let update =
            WireMessage::parse(r#"{"expression": "1 + 1", "result": "2", "float_mode": false}"#)
                .unwrap();
        match update {
            WireMessage::Record(record) => {
                assert_eq!(record.sequence, 0);
                assert_eq!(record.timestamp, None);
                assert_eq!(record.mode(), Mode::Integer);
            }
            other => panic!("Expected record, got {other:?}"),
        }
    }

    #[test]
    fn test_parse_rejects_malformed() {
        assert!(WireMessage::parse("not json").is_err());
        assert!(WireMessage::parse(r#"{"expression": "1"}"#).is_err());
    }
}
