//! Command-line parsing for the balance monitor.
//!
//! Parsing stays here; turning flags into validated config lives in `app`.

use std::path::PathBuf;

use clap::{Args, Parser, Subcommand};

use crate::domain::LogFormat;

/// Top-level CLI.
#[derive(Debug, Parser)]
#[command(
    name = "bw",
    version,
    about = "Treasury balance monitor with stable-value voting over a noisy sheet feed"
)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Command,
}

/// CLI subcommands.
#[derive(Debug, Subcommand)]
pub enum Command {
    /// Launch the terminal dashboard (default).
    Tui(WatchArgs),
    /// Run headless and log every published balance.
    Watch(WatchArgs),
    /// Run a single update cycle per feed and print the cycle report.
    Once(WatchArgs),
    /// Normalize a raw cell text offline and show how it would be displayed.
    Parse(ParseArgs),
    /// Print a persisted snapshot file.
    Snapshot(SnapshotArgs),
}

/// Feed, engine and output options shared by `tui`, `watch` and `once`.
#[derive(Debug, Args, Clone)]
pub struct WatchArgs {
    /// Feed to poll, as `NAME=URL` or a bare URL. Repeatable.
    ///
    /// Falls back to `BALANCE_FEED_URL` (also read from `.env`).
    #[arg(short = 'f', long = "feed", value_name = "NAME=URL")]
    pub feeds: Vec<String>,

    /// Use the built-in simulated feed instead of HTTP.
    #[arg(long)]
    pub simulate: bool,

    /// CSV field (0-based) of the first record holding the balance.
    #[arg(long)]
    pub column: Option<usize>,

    /// Per-request timeout, in seconds.
    #[arg(long, default_value_t = 10.0)]
    pub timeout: f64,

    /// Seconds between scheduled update cycles.
    #[arg(short = 'i', long, default_value_t = 15.0)]
    pub interval: f64,

    /// Samples per stability round.
    #[arg(long, default_value_t = 3)]
    pub samples: u32,

    /// Seconds between samples of one round.
    #[arg(long, default_value_t = 1.5)]
    pub sample_delay: f64,

    /// Seconds between a failed round and the next.
    #[arg(long, default_value_t = 2.0)]
    pub retry_delay: f64,

    /// Rounds per cycle before the single fallback read.
    #[arg(long, default_value_t = 5)]
    pub max_attempts: u32,

    /// Relative change (0.5 = 50%) that needs confirmation before publishing.
    #[arg(long, default_value_t = 0.5)]
    pub change_threshold: f64,

    /// Seconds a held large change waits for confirmation.
    #[arg(long, default_value_t = 60.0)]
    pub confirm_window: f64,

    /// Consecutive empty cycles that drop a held candidate.
    #[arg(long = "failure-reset", default_value_t = 3)]
    pub failure_reset: u32,

    /// Balances below this are shown as low (red).
    #[arg(long, default_value_t = 500_000.0)]
    pub low_below: f64,

    /// Balances above this are shown as healthy (teal).
    #[arg(long, default_value_t = 1_000_000.0)]
    pub high_above: f64,

    /// Last-known-good snapshot JSON, written on every publish.
    #[arg(long, value_name = "JSON")]
    pub snapshot: Option<PathBuf>,

    /// Ignore snapshots older than this many hours at startup.
    #[arg(long, default_value_t = 24.0)]
    pub snapshot_max_age: f64,

    /// Append every publish to this CSV.
    #[arg(long, value_name = "CSV")]
    pub history: Option<PathBuf>,

    /// Write logs to this file (the dashboard otherwise discards them).
    #[arg(long, value_name = "PATH")]
    pub log_file: Option<PathBuf>,

    #[arg(long, value_enum, default_value_t = LogFormat::Compact)]
    pub log_format: LogFormat,
}

#[derive(Debug, Args)]
pub struct ParseArgs {
    /// Raw cell text, e.g. "Rp 1.300.000".
    pub raw: String,

    #[arg(long, default_value_t = 500_000.0)]
    pub low_below: f64,

    #[arg(long, default_value_t = 1_000_000.0)]
    pub high_above: f64,
}

#[derive(Debug, Args)]
pub struct SnapshotArgs {
    /// Snapshot JSON written by `--snapshot`.
    pub path: PathBuf,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn watch_flags_parse() {
        let cli = Cli::parse_from([
            "bw",
            "watch",
            "--feed",
            "kas=https://example.test/sheet.csv",
            "--feed",
            "https://example.test/other.csv",
            "--samples",
            "4",
            "--change-threshold",
            "0.3",
            "--failure-reset",
            "2",
        ]);
        let Command::Watch(args) = cli.command else {
            panic!("expected watch");
        };
        assert_eq!(args.feeds.len(), 2);
        assert_eq!(args.samples, 4);
        assert_eq!(args.change_threshold, 0.3);
        assert_eq!(args.failure_reset, 2);
        assert_eq!(args.interval, 15.0);
        assert_eq!(args.log_format, LogFormat::Compact);
    }

    #[test]
    fn parse_takes_positional_text() {
        let cli = Cli::parse_from(["bw", "parse", "Rp 1.300.000"]);
        let Command::Parse(args) = cli.command else {
            panic!("expected parse");
        };
        assert_eq!(args.raw, "Rp 1.300.000");
    }
}
