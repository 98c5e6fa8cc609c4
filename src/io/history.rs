//! Append-only CSV log of publish events.
//!
//! Meant to be easy to open in a spreadsheet next to the source sheet.

use std::fs::OpenOptions;
use std::path::{Path, PathBuf};
use std::sync::Mutex;

use serde::Serialize;
use tracing::warn;

use crate::domain::BalanceEvent;
use crate::error::AppError;

#[derive(Debug, Serialize)]
struct HistoryRow<'a> {
    timestamp: &'a str,
    feed: &'a str,
    value: f64,
    formatted: &'a str,
    source: &'a str,
}

/// Shared between feeds; appends are serialized by the lock.
pub struct HistoryLog {
    path: PathBuf,
    lock: Mutex<()>,
}

impl HistoryLog {
    pub fn new(path: PathBuf) -> Self {
        Self {
            path,
            lock: Mutex::new(()),
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Append one event; failures are logged, never propagated.
    pub fn record(&self, event: &BalanceEvent) {
        if let Err(err) = self.append(event) {
            warn!(path = %self.path.display(), error = %err, "history row not written");
        }
    }

    pub fn append(&self, event: &BalanceEvent) -> Result<(), AppError> {
        let _guard = self.lock.lock().unwrap_or_else(|poisoned| poisoned.into_inner());

        let file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(&self.path)
            .map_err(|e| AppError::new(4, format!("Failed to open history CSV '{}': {e}", self.path.display())))?;
        let is_new = file
            .metadata()
            .map(|m| m.len() == 0)
            .map_err(|e| AppError::new(4, format!("Failed to stat history CSV: {e}")))?;

        let mut writer = csv::WriterBuilder::new().has_headers(is_new).from_writer(file);
        writer
            .serialize(HistoryRow {
                timestamp: &event.timestamp,
                feed: &event.feed,
                value: event.value.value(),
                formatted: &event.formatted_text,
                source: event.source.label(),
            })
            .map_err(|e| AppError::new(4, format!("Failed to write history row: {e}")))?;
        writer
            .flush()
            .map_err(|e| AppError::new(4, format!("Failed to flush history CSV: {e}")))?;
        Ok(())
    }
}
