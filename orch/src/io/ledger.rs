//! Append-only run ledger (`<run_dir>/ledger.jsonl`).
//!
//! Every append opens the file, writes one line and closes it again; no handle
//! is held between calls. There is no locking: one pipeline owns one ledger.

use std::fs::{self, OpenOptions};
use std::io::Write;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use chrono::{SubsecRound, Utc};
use tracing::debug;

use crate::core::record::{LedgerEntry, LedgerRecord};

#[derive(Debug, Clone)]
pub struct Ledger {
    path: PathBuf,
}

impl Ledger {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Stamp `record` with the current UTC time and append it as one line.
    ///
    /// The returned entry equals what [`Ledger::entries`] reads back (timestamps are
    /// stored with microsecond precision).
    pub fn append(&self, record: LedgerRecord) -> Result<LedgerEntry> {
        let entry = LedgerEntry {
            ts: Utc::now().trunc_subsecs(6),
            record,
        };
        let mut line = entry.to_json_line()?;
        line.push('\n');

        if let Some(parent) = self.path.parent() {
            fs::create_dir_all(parent)
                .with_context(|| format!("create ledger dir {}", parent.display()))?;
        }
        let mut file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(&self.path)
            .with_context(|| format!("open ledger {}", self.path.display()))?;
        file.write_all(line.as_bytes())
            .with_context(|| format!("append ledger {}", self.path.display()))?;

        debug!(step = %entry.record.step(), "ledger record appended");
        Ok(entry)
    }

    /// Read every record back in append order. A missing file is an empty ledger.
    pub fn entries(&self) -> Result<Vec<LedgerEntry>> {
        if !self.path.exists() {
            return Ok(Vec::new());
        }
        let contents = fs::read_to_string(&self.path)
            .with_context(|| format!("read ledger {}", self.path.display()))?;
        contents
            .lines()
            .enumerate()
            .filter(|(_, line)| !line.trim().is_empty())
            .map(|(idx, line)| {
                LedgerEntry::from_json_line(line)
                    .with_context(|| format!("{}:{}", self.path.display(), idx + 1))
            })
            .collect()
    }

    /// Whether any `VERIFY` record carries `ok: true`.
    pub fn has_passing_verify(&self) -> Result<bool> {
        Ok(self
            .entries()?
            .iter()
            .any(|entry| entry.record.is_passing_verify()))
    }
}
