//! # History Ledger
//!
//! Durable, totally ordered history of calculation records.
//!
//! ## Architecture
//!
//! - **HistoryStore**: trait for append-only storage backends
//! - **JsonlHistoryStore**: local file store, one JSON record per line
//! - **InMemoryHistoryStore**: ephemeral store for tests
//! - **HistoryLedger**: synchronous façade assigning sequence numbers
//!
//! ## Usage
//!
//! ```rust
//! use calc_protocol::{CalculationRequest, Mode};
//! use history_ledger::{HistoryLedger, LedgerConfig};
//! use tempfile::TempDir;
//!
//! fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let temp_dir = TempDir::new()?;
//!     let ledger = HistoryLedger::open_local(LedgerConfig::new(temp_dir.path()))?;
//!
//!     let request = CalculationRequest::new("3 + 2", Mode::Integer);
//!     let record = ledger.append(&request, "5")?;
//!     assert_eq!(record.sequence, 1);
//!     assert_eq!(ledger.snapshot().len(), 1);
//!
//!     Ok(())
//! }
//! ```

pub mod config;
pub mod error;
pub mod jsonl;
pub mod ledger;
pub mod store;

pub use config::LedgerConfig;
pub use error::{LedgerError, Result};
pub use jsonl::JsonlHistoryStore;
pub use ledger::HistoryLedger;
pub use store::{HistoryStore, InMemoryHistoryStore};
