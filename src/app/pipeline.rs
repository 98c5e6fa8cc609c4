//! Engine wiring shared by the dashboard, `watch` and `once`.
//!
//! Keeping this in one place avoids duplicating the setup:
//! feed config -> fetcher -> engine -> snapshot seed -> subscribers
//!
//! The front-ends can then focus on presentation.

use std::sync::Arc;

use chrono::Utc;
use tracing::{info, warn};

use crate::data::build_fetcher;
use crate::domain::{BalanceEvent, MonitorConfig};
use crate::engine::Engine;
use crate::error::AppError;
use crate::io::{HistoryLog, SnapshotWriter, read_snapshot, snapshot_path_for};
use crate::report::format_event_line;

/// One engine per configured feed, seeded and subscribed.
///
/// `echo_events` prints every publish to stdout (headless mode).
pub fn build_engines(config: &MonitorConfig, echo_events: bool) -> Result<Vec<Engine>, AppError> {
    let history = config
        .history_path
        .clone()
        .map(|path| Arc::new(HistoryLog::new(path)));

    let mut engines = Vec::with_capacity(config.feeds.len());
    for feed in &config.feeds {
        let fetcher = build_fetcher(feed)?;
        let mut engine = Engine::new(feed.name.clone(), fetcher, config.engine.clone());

        if let Some(base) = &config.snapshot_path {
            let path = snapshot_path_for(base, &feed.name, config.feeds.len());
            seed_from_snapshot(&mut engine, &path, config);
            engine.on_balance_published(SnapshotWriter::new(path));
        }

        if let Some(log) = &history {
            let log = Arc::clone(log);
            engine.on_balance_published(move |event: &BalanceEvent| log.record(event));
        }

        if echo_events {
            let bands = config.bands;
            engine.on_balance_published(move |event: &BalanceEvent| {
                println!("{}", format_event_line(event, &bands));
            });
        }

        engines.push(engine);
    }
    Ok(engines)
}

/// A missing, stale or broken snapshot only means starting empty.
fn seed_from_snapshot(engine: &mut Engine, path: &std::path::Path, config: &MonitorConfig) {
    let snapshot = match read_snapshot(path) {
        Ok(Some(snapshot)) => snapshot,
        Ok(None) => return,
        Err(err) => {
            warn!(feed = engine.feed(), path = %path.display(), error = %err, "ignoring unreadable snapshot");
            return;
        }
    };

    match snapshot.to_seed_event(config.snapshot_max_age, Utc::now()) {
        Some(mut event) => {
            event.feed = engine.feed().to_string();
            info!(
                feed = engine.feed(),
                value = event.value.value(),
                timestamp = %event.timestamp,
                "seeded from snapshot"
            );
            engine.seed(event);
        }
        None => info!(
            feed = engine.feed(),
            timestamp = %snapshot.timestamp,
            "snapshot too old or unusable, starting empty"
        ),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    use crate::domain::{
        Balance, BandThresholds, EngineConfig, FeedConfig, FeedKind, ValueSource,
    };
    use crate::io::{BalanceSnapshot, write_snapshot};

    fn config(dir: &std::path::Path) -> MonitorConfig {
        MonitorConfig {
            feeds: vec![FeedConfig {
                name: "kas".to_string(),
                kind: FeedKind::Simulated,
                column: None,
                timeout: Duration::from_secs(10),
            }],
            engine: EngineConfig::default(),
            interval: Duration::from_secs(15),
            bands: BandThresholds::default(),
            snapshot_path: Some(dir.join("balance.json")),
            snapshot_max_age: Duration::from_secs(3600),
            history_path: Some(dir.join("history.csv")),
        }
    }

    fn snapshot_at(timestamp: chrono::DateTime<Utc>) -> BalanceSnapshot {
        BalanceSnapshot::from_event(&BalanceEvent {
            feed: "old-name".to_string(),
            value: Balance::new(750_000.0).unwrap(),
            formatted_text: "Rp 750.000".to_string(),
            timestamp: timestamp.to_rfc3339(),
            source: ValueSource::Converged,
        })
    }

    #[test]
    fn fresh_snapshot_seeds_the_engine() {
        let dir = tempfile::tempdir().unwrap();
        let config = config(dir.path());
        let snapshot = snapshot_at(Utc::now() - chrono::Duration::minutes(5));
        write_snapshot(config.snapshot_path.as_deref().unwrap(), &snapshot).unwrap();

        let engines = build_engines(&config, false).unwrap();
        let seeded = engines[0].published().unwrap();
        assert_eq!(seeded.source, ValueSource::Snapshot);
        assert_eq!(seeded.feed, "kas");
        assert_eq!(seeded.value.value(), 750_000.0);
    }

    #[test]
    fn stale_snapshot_is_ignored() {
        let dir = tempfile::tempdir().unwrap();
        let config = config(dir.path());
        let snapshot = snapshot_at(Utc::now() - chrono::Duration::hours(3));
        write_snapshot(config.snapshot_path.as_deref().unwrap(), &snapshot).unwrap();

        let engines = build_engines(&config, false).unwrap();
        assert!(engines[0].published().is_none());
    }

    #[test]
    fn corrupt_snapshot_does_not_block_startup() {
        let dir = tempfile::tempdir().unwrap();
        let config = config(dir.path());
        std::fs::write(config.snapshot_path.as_deref().unwrap(), "garbage").unwrap();
        assert!(build_engines(&config, false).unwrap()[0].published().is_none());
    }
}
