//! Helpers shared by the gateway's unit tests

use calc_protocol::{CalculationRecord, CalculationRequest, Mode};
use history_ledger::{HistoryLedger, HistoryStore};
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;
use std::thread::JoinHandle;
use std::time::Duration;

/// Store whose next append can be made to sleep, like a slow fsync
struct StallingStore {
    stall_ms: Arc<AtomicU64>,
    entered: Arc<AtomicBool>,
}

impl HistoryStore for StallingStore {
    fn append(&mut self, _record: &CalculationRecord) -> history_ledger::Result<()> {
        let stall_ms = self.stall_ms.swap(0, Ordering::SeqCst);
        if stall_ms > 0 {
            self.entered.store(true, Ordering::SeqCst);
            std::thread::sleep(Duration::from_millis(stall_ms));
        }
        Ok(())
    }

    fn load(&self) -> history_ledger::Result<Vec<CalculationRecord>> {
        Ok(Vec::new())
    }

    fn flush(&mut self) -> history_ledger::Result<()> {
        Ok(())
    }

    fn describe(&self) -> String {
        "stalling".to_string()
    }
}

/// Ledger that can be held locked by an in-flight append
pub(crate) struct StallingLedger {
    pub ledger: Arc<HistoryLedger>,
    stall_ms: Arc<AtomicU64>,
    entered: Arc<AtomicBool>,
}

impl StallingLedger {
    pub fn new() -> Self {
        let stall_ms = Arc::new(AtomicU64::new(0));
        let entered = Arc::new(AtomicBool::new(false));
        let store = StallingStore { stall_ms: stall_ms.clone(), entered: entered.clone() };
        let ledger = Arc::new(HistoryLedger::open(store).unwrap());
        Self { ledger, stall_ms, entered }
    }

    /// Start an append on another thread that holds the ledger for `stall`
    ///
    /// Returns once the append is inside the store.
    pub fn stall_append(&self, stall: Duration) -> JoinHandle<()> {
        self.entered.store(false, Ordering::SeqCst);
        self.stall_ms.store(stall.as_millis() as u64, Ordering::SeqCst);

        let ledger = self.ledger.clone();
        let handle = std::thread::spawn(move || {
            ledger.append(&CalculationRequest::new("0 + 0", Mode::Integer), "0").unwrap();
        });

        while !self.entered.load(Ordering::SeqCst) {
            std::thread::yield_now();
        }
        handle
    }
}
