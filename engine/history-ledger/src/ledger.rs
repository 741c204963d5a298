//! Synchronous ledger over a history store
//!
//! The ledger owns the sequence counter and an in-memory copy of the history.
//! Every operation runs under one mutex, so a snapshot taken concurrently with
//! an append sees either the state before or after it.

use crate::config::LedgerConfig;
use crate::error::{LedgerError, Result};
use crate::jsonl::JsonlHistoryStore;
use crate::store::{HistoryStore, InMemoryHistoryStore};
use calc_protocol::{CalculationRecord, CalculationRequest, Snapshot};
use chrono::Utc;
use parking_lot::Mutex;

/// Totally ordered, durable history of calculation records
pub struct HistoryLedger {
    state: Mutex<LedgerState>,
}

struct LedgerState {
    store: Box<dyn HistoryStore>,
    records: Vec<CalculationRecord>,
}

impl LedgerState {
    fn last_sequence(&self) -> u64 {
        self.records.last().map(|r| r.sequence).unwrap_or(0)
    }

    /// Index of the first record with a sequence greater than `sequence`
    fn index_after(&self, sequence: u64) -> usize {
        self.records.partition_point(|r| r.sequence <= sequence)
    }
}

impl HistoryLedger {
    /// Open a ledger over `store`, loading every persisted record
    pub fn open(store: impl HistoryStore + 'static) -> Result<Self> {
        let records = store.load()?;

        if let Some(pair) = records.windows(2).find(|w| w[0].sequence >= w[1].sequence) {
            return Err(LedgerError::corruption(format!(
                "history sequence not strictly increasing: {} followed by {}",
                pair[0].sequence, pair[1].sequence
            )));
        }

        tracing::info!(
            "History ledger opened on {} with {} records (last sequence {})",
            store.describe(),
            records.len(),
            records.last().map(|r| r.sequence).unwrap_or(0)
        );

        Ok(Self { state: Mutex::new(LedgerState { store: Box::new(store), records }) })
    }

    /// Open a ledger backed by the JSON-lines file described by `config`
    pub fn open_local(config: LedgerConfig) -> Result<Self> {
        Self::open(JsonlHistoryStore::open(config)?)
    }

    /// Create an empty ledger that keeps records in memory only
    pub fn in_memory() -> Self {
        Self {
            state: Mutex::new(LedgerState {
                store: Box::new(InMemoryHistoryStore::new()),
                records: Vec::new(),
            }),
        }
    }

    /// Append the outcome of a successful evaluation
    ///
    /// The next sequence is assigned and the record persisted before this
    /// returns. If the store rejects the record the sequence is not consumed.
    pub fn append(
        &self,
        request: &CalculationRequest,
        result: impl Into<String>,
    ) -> Result<CalculationRecord> {
        let mut state = self.state.lock();

        let record = CalculationRecord {
            sequence: state.last_sequence() + 1,
            expression: request.expression.clone(),
            result: result.into(),
            mode: request.mode,
            created_at: Utc::now(),
        };

        state.store.append(&record)?;
        state.records.push(record.clone());

        tracing::debug!("Appended record {} ({})", record.sequence, record.expression);

        Ok(record)
    }

    /// Every record appended before this call, ordered by sequence
    pub fn snapshot(&self) -> Snapshot {
        Snapshot::new(self.state.lock().records.clone())
    }

    /// Records with a sequence greater than `sequence`
    pub fn records_after(&self, sequence: u64) -> Vec<CalculationRecord> {
        let state = self.state.lock();
        let start = state.index_after(sequence);
        state.records[start..].to_vec()
    }

    /// Records with `after < sequence <= up_to`
    pub fn records_between(&self, after: u64, up_to: u64) -> Vec<CalculationRecord> {
        if up_to <= after {
            return Vec::new();
        }

        let state = self.state.lock();
        let start = state.index_after(after);
        let end = state.index_after(up_to);
        state.records[start..end].to_vec()
    }

    /// Highest assigned sequence (0 when empty)
    pub fn last_sequence(&self) -> u64 {
        self.state.lock().last_sequence()
    }

    pub fn len(&self) -> usize {
        self.state.lock().records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.state.lock().records.is_empty()
    }

    /// Flush the underlying store
    pub fn flush(&self) -> Result<()> {
        self.state.lock().store.flush()
    }
}
