//! Read/write the last-known-good snapshot JSON.
//!
//! Layout:
//!
//! ```json
//! { "success": true, "feed": "kas",
//!   "data": { "numeric": 1300000.0, "formatted": "Rp 1.300.000" },
//!   "timestamp": "2025-01-01T00:00:00Z", "timestamp_unix": 1735689600 }
//! ```
//!
//! `data.raw` (the sheet's own text) is read when present but never written:
//! values are normalized before they reach the engine.

use std::fs::{self, File};
use std::path::{Path, PathBuf};
use std::time::Duration;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tracing::warn;

use crate::domain::{Balance, BalanceEvent, ValueSource};
use crate::engine::BalanceSubscriber;
use crate::error::AppError;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BalanceSnapshot {
    pub success: bool,
    #[serde(default)]
    pub feed: String,
    pub data: SnapshotData,
    pub timestamp: String,
    pub timestamp_unix: i64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SnapshotData {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub raw: Option<String>,
    pub numeric: f64,
    pub formatted: String,
}

impl BalanceSnapshot {
    pub fn from_event(event: &BalanceEvent) -> Self {
        let timestamp_unix = DateTime::parse_from_rfc3339(&event.timestamp)
            .map(|t| t.timestamp())
            .unwrap_or_else(|_| Utc::now().timestamp());
        Self {
            success: true,
            feed: event.feed.clone(),
            data: SnapshotData {
                raw: None,
                numeric: event.value.value(),
                formatted: event.formatted_text.clone(),
            },
            timestamp: event.timestamp.clone(),
            timestamp_unix,
        }
    }

    /// Turn the snapshot into a seed event, unless it is unusable or older
    /// than `max_age`.
    pub fn to_seed_event(&self, max_age: Duration, now: DateTime<Utc>) -> Option<BalanceEvent> {
        if !self.success {
            return None;
        }
        let age = now.timestamp() - self.timestamp_unix;
        if age < 0 || age as u64 > max_age.as_secs() {
            return None;
        }
        let value = Balance::new(self.data.numeric)?;
        Some(BalanceEvent {
            feed: self.feed.clone(),
            value,
            formatted_text: self.data.formatted.clone(),
            timestamp: self.timestamp.clone(),
            source: ValueSource::Snapshot,
        })
    }
}

/// Write atomically: temp file in the same directory, then rename.
pub fn write_snapshot(path: &Path, snapshot: &BalanceSnapshot) -> Result<(), AppError> {
    let tmp = path.with_extension("json.tmp");
    let file = File::create(&tmp)
        .map_err(|e| AppError::new(4, format!("Failed to create snapshot '{}': {e}", tmp.display())))?;
    serde_json::to_writer_pretty(file, snapshot)
        .map_err(|e| AppError::new(4, format!("Failed to write snapshot JSON: {e}")))?;
    fs::rename(&tmp, path)
        .map_err(|e| AppError::new(4, format!("Failed to move snapshot into '{}': {e}", path.display())))?;
    Ok(())
}

/// Read a snapshot; a missing file is `Ok(None)`.
pub fn read_snapshot(path: &Path) -> Result<Option<BalanceSnapshot>, AppError> {
    let file = match File::open(path) {
        Ok(f) => f,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(None),
        Err(e) => {
            return Err(AppError::new(
                2,
                format!("Failed to open snapshot '{}': {e}", path.display()),
            ));
        }
    };
    let snapshot: BalanceSnapshot =
        serde_json::from_reader(file).map_err(|e| AppError::new(2, format!("Invalid snapshot JSON: {e}")))?;
    Ok(Some(snapshot))
}

/// Snapshot location for one feed. With several feeds each gets its own file
/// (`balance.json` -> `balance-<feed>.json`).
pub fn snapshot_path_for(base: &Path, feed: &str, feed_count: usize) -> PathBuf {
    if feed_count <= 1 {
        return base.to_path_buf();
    }
    let stem = base.file_stem().and_then(|s| s.to_str()).unwrap_or("balance");
    let ext = base.extension().and_then(|s| s.to_str()).unwrap_or("json");
    base.with_file_name(format!("{stem}-{feed}.{ext}"))
}

/// Persists every published event.
pub struct SnapshotWriter {
    path: PathBuf,
}

impl SnapshotWriter {
    pub fn new(path: PathBuf) -> Self {
        Self { path }
    }
}

impl BalanceSubscriber for SnapshotWriter {
    fn on_balance_published(&self, event: &BalanceEvent) {
        if let Err(err) = write_snapshot(&self.path, &BalanceSnapshot::from_event(event)) {
            warn!(path = %self.path.display(), error = %err, "snapshot not written");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn event(ts: &str) -> BalanceEvent {
        BalanceEvent {
            feed: "kas".to_string(),
            value: Balance::new(1_300_000.0).unwrap(),
            formatted_text: "Rp 1.300.000".to_string(),
            timestamp: ts.to_string(),
            source: ValueSource::Converged,
        }
    }

    #[test]
    fn write_then_read() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("balance.json");

        let writer = SnapshotWriter::new(path.clone());
        writer.on_balance_published(&event("2025-01-01T00:00:00Z"));

        let snap = read_snapshot(&path).unwrap().unwrap();
        assert!(snap.success);
        assert_eq!(snap.data.numeric, 1_300_000.0);
        assert_eq!(snap.data.formatted, "Rp 1.300.000");
        assert_eq!(snap.timestamp_unix, 1_735_689_600);
        assert!(!path.with_extension("json.tmp").exists());
    }

    #[test]
    fn raw_text_is_optional() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("balance.json");
        write_snapshot(&path, &BalanceSnapshot::from_event(&event("2025-01-01T00:00:00Z"))).unwrap();
        assert!(!fs::read_to_string(&path).unwrap().contains("\"raw\""));

        let legacy = r#"{"success":true,"data":{"raw":"Rp1.300.000","numeric":1300000,"formatted":"Rp 1.300.000"},
            "timestamp":"2025-01-01T00:00:00Z","timestamp_unix":1735689600}"#;
        fs::write(&path, legacy).unwrap();
        let snap = read_snapshot(&path).unwrap().unwrap();
        assert_eq!(snap.data.raw.as_deref(), Some("Rp1.300.000"));
        assert_eq!(snap.feed, "");
    }

    #[test]
    fn missing_file_is_none() {
        let dir = tempfile::tempdir().unwrap();
        assert!(read_snapshot(&dir.path().join("nope.json")).unwrap().is_none());
    }

    #[test]
    fn garbage_is_an_error() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("bad.json");
        fs::write(&path, "{not json").unwrap();
        assert_eq!(read_snapshot(&path).unwrap_err().exit_code(), 2);
    }

    #[test]
    fn seed_respects_age_and_success() {
        let snap = BalanceSnapshot::from_event(&event("2025-01-01T00:00:00Z"));
        let now = DateTime::parse_from_rfc3339("2025-01-01T01:00:00Z").unwrap().with_timezone(&Utc);

        let seed = snap.to_seed_event(Duration::from_secs(7200), now).unwrap();
        assert_eq!(seed.source, ValueSource::Snapshot);
        assert_eq!(seed.value.value(), 1_300_000.0);

        assert!(snap.to_seed_event(Duration::from_secs(60), now).is_none());

        let mut failed = snap.clone();
        failed.success = false;
        assert!(failed.to_seed_event(Duration::from_secs(7200), now).is_none());

        let mut negative = snap;
        negative.data.numeric = -1.0;
        assert!(negative.to_seed_event(Duration::from_secs(7200), now).is_none());
    }

    #[test]
    fn per_feed_paths() {
        let base = Path::new("/tmp/balance.json");
        assert_eq!(snapshot_path_for(base, "kas", 1), PathBuf::from("/tmp/balance.json"));
        assert_eq!(snapshot_path_for(base, "kas", 2), PathBuf::from("/tmp/balance-kas.json"));
    }
}
