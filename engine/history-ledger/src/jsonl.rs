//! Append-only JSON-lines history file
//!
//! Every record is written as one JSON object per line before the append is
//! acknowledged. On open, a torn final line left behind by a crash mid-write is
//! cut off so later appends start on a clean line.
//!
//! A failed append is rolled back by truncating the file to its length before
//! the write. If the rollback itself fails the store refuses further appends
//! until it is reopened.

use crate::config::LedgerConfig;
use crate::error::{LedgerError, Result};
use crate::store::HistoryStore;
use calc_protocol::CalculationRecord;
use std::fs::{File, OpenOptions};
use std::io::Write;
use std::path::{Path, PathBuf};

/// File-backed history store
pub struct JsonlHistoryStore {
    config: LedgerConfig,
    path: PathBuf,
    file: File,
    /// Length of the file after the last acknowledged append
    committed_len: u64,
    /// Set when a failed append could not be rolled back
    failed: bool,
    #[cfg(test)]
    faults: faults::Faults,
}

/// Result of scanning a history file
struct ScanOutcome {
    records: Vec<CalculationRecord>,
    /// Byte length of the well-formed prefix
    valid_len: u64,
    /// Whether the last complete record is missing its trailing newline
    missing_newline: bool,
}

impl JsonlHistoryStore {
    /// Open (or create) the history file described by `config`
    pub fn open(config: LedgerConfig) -> Result<Self> {
        config.validate().map_err(LedgerError::config)?;
        std::fs::create_dir_all(&config.data_dir)?;

        let path = config.history_path();
        Self::repair_tail(&path)?;

        let file = OpenOptions::new().create(true).append(true).open(&path)?;
        let committed_len = file.metadata()?.len();

        tracing::info!("History file opened at {:?} ({} bytes)", path, committed_len);

        Ok(Self {
            config,
            path,
            file,
            committed_len,
            failed: false,
            #[cfg(test)]
            faults: faults::Faults::default(),
        })
    }

    /// Path of the history file
    pub fn path(&self) -> &Path {
        &self.path
    }

    fn repair_tail(path: &Path) -> Result<()> {
        if !path.exists() {
            return Ok(());
        }

        let content = std::fs::read_to_string(path)?;
        let outcome = Self::scan(&content)?;
        let file_len = content.len() as u64;

        if outcome.valid_len < file_len {
            tracing::warn!(
                "Truncating torn history tail in {:?} ({} bytes dropped)",
                path,
                file_len - outcome.valid_len
            );
            let file = OpenOptions::new().write(true).open(path)?;
            file.set_len(outcome.valid_len)?;
            file.sync_all()?;
        } else if outcome.missing_newline {
            let mut file = OpenOptions::new().append(true).open(path)?;
            file.write_all(b"\n")?;
            file.sync_all()?;
        }

        Ok(())
    }

    /// Write one serialized line and make it durable
    fn write_line(&mut self, line: &[u8]) -> std::io::Result<()> {
        #[cfg(test)]
        if let Some(e) = self.faults.before_write(&mut self.file, line) {
            return Err(e);
        }

        self.file.write_all(line)?;

        if self.config.fsync_every_write {
            #[cfg(test)]
            if let Some(e) = self.faults.before_sync() {
                return Err(e);
            }

            self.file.sync_data()?;
        }

        Ok(())
    }

    /// Cut the file back to the last acknowledged append
    fn roll_back(&mut self) -> std::io::Result<()> {
        #[cfg(test)]
        if let Some(e) = self.faults.before_truncate() {
            return Err(e);
        }

        self.file.set_len(self.committed_len)?;
        self.file.sync_all()
    }

    fn scan(content: &str) -> Result<ScanOutcome> {
        let mut records = Vec::new();
        let mut offset = 0u64;
        let mut missing_newline = false;

        for (index, line) in content.split_inclusive('\n').enumerate() {
            let terminated = line.ends_with('\n');
            let body = line.trim();

            if body.is_empty() {
                offset += line.len() as u64;
                continue;
            }

            match serde_json::from_str::<CalculationRecord>(body) {
                Ok(record) => {
                    records.push(record);
                    offset += line.len() as u64;
                    missing_newline = !terminated;
                }
                // Only an unterminated final line can be a torn write
                Err(_) if !terminated => {
                    return Ok(ScanOutcome { records, valid_len: offset, missing_newline: false });
                }
                Err(e) => {
                    return Err(LedgerError::corruption(format!(
                        "line {} of history file is not a record: {e}",
                        index + 1
                    )));
                }
            }
        }

        Ok(ScanOutcome { records, valid_len: offset, missing_newline })
    }
}

impl HistoryStore for JsonlHistoryStore {
    fn append(&mut self, record: &CalculationRecord) -> Result<()> {
        if self.failed {
            return Err(LedgerError::corruption(format!(
                "{:?} may hold an unacknowledged record; reopen the ledger",
                self.path
            )));
        }

        let mut line = serde_json::to_vec(record)?;
        line.push(b'\n');

        if let Err(e) = self.write_line(&line) {
            match self.roll_back() {
                Ok(()) => {
                    tracing::warn!(
                        "Append of record {} failed and was rolled back: {}",
                        record.sequence,
                        e
                    );
                }
                Err(rollback) => {
                    self.failed = true;
                    tracing::error!(
                        "Append of record {} failed ({}) and could not be rolled back ({}); refusing further appends",
                        record.sequence,
                        e,
                        rollback
                    );
                }
            }
            return Err(e.into());
        }

        self.committed_len += line.len() as u64;
        Ok(())
    }

    fn load(&self) -> Result<Vec<CalculationRecord>> {
        if !self.path.exists() {
            return Ok(Vec::new());
        }

        let content = std::fs::read_to_string(&self.path)?;
        Ok(Self::scan(&content)?.records)
    }

    fn flush(&mut self) -> Result<()> {
        self.file.sync_all()?;
        Ok(())
    }

    fn describe(&self) -> String {
        format!("jsonl:{}", self.path.display())
    }
}

#[cfg(test)]
impl JsonlHistoryStore {
    /// Make the next append fail at `fault`, optionally failing its rollback too
    pub(crate) fn inject_fault(&mut self, fault: faults::Fault, fail_rollback: bool) {
        self.faults = faults::Faults::new(fault, fail_rollback);
    }
}
