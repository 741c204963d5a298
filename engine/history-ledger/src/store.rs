//! History store trait and the in-memory implementation

use crate::error::Result;
use calc_protocol::CalculationRecord;
use parking_lot::Mutex;
use std::sync::Arc;

/// Abstract trait for durable history storage
///
/// A store is append-only and keyed by record sequence. `load` returns records
/// in insertion order.
pub trait HistoryStore: Send {
    /// Persist a single record. The record is durable once this returns.
    fn append(&mut self, record: &CalculationRecord) -> Result<()>;

    /// Load every persisted record in insertion order
    fn load(&self) -> Result<Vec<CalculationRecord>>;

    /// Flush any buffered writes
    fn flush(&mut self) -> Result<()>;

    /// Short name used in logs
    fn describe(&self) -> String;
}

/// In-memory history store (for testing and ephemeral runs)
///
/// Clones share the same underlying records, so a clone handed to a second
/// ledger behaves like reopening the same storage.
#[derive(Clone, Default)]
pub struct InMemoryHistoryStore {
    records: Arc<Mutex<Vec<CalculationRecord>>>,
}

impl InMemoryHistoryStore {
    /// Create an empty in-memory store
    pub fn new() -> Self {
        Self::default()
    }

    /// Create a store pre-populated with records
    pub fn with_records(records: Vec<CalculationRecord>) -> Self {
        Self { records: Arc::new(Mutex::new(records)) }
    }

    /// Number of stored records
    pub fn len(&self) -> usize {
        self.records.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.lock().is_empty()
    }
}

impl HistoryStore for InMemoryHistoryStore {
    fn append(&mut self, record: &CalculationRecord) -> Result<()> {
        self.records.lock().push(record.clone());
        Ok(())
    }

    fn load(&self) -> Result<Vec<CalculationRecord>> {
        Ok(self.records.lock().clone())
    }

    fn flush(&mut self) -> Result<()> {
        Ok(())
    }

    fn describe(&self) -> String {
        "in-memory".to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use calc_protocol::Mode;

    #[test]
    fn test_clones_share_records() {
        let mut store = InMemoryHistoryStore::new();
        let reader = store.clone();

        let record = CalculationRecord {
            sequence: 1,
            expression: "2 * 3".to_string(),
            result: "6".to_string(),
            mode: Mode::Integer,
            created_at: chrono::Utc::now(),
        };
        store.append(&record).unwrap();

        assert_eq!(reader.len(), 1);
        assert_eq!(reader.load().unwrap(), vec![record]);
    }
}
