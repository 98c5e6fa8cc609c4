//! Top-level application orchestration.
//!
//! `src/main.rs` is intentionally tiny; this module is the "real main" that:
//! - parses CLI arguments
//! - validates them into a `MonitorConfig`
//! - sets up logging and the tokio runtime
//! - dispatches to the dashboard, headless watcher, or one-shot commands

use std::time::Duration;

use clap::Parser;
use tracing::info;

use crate::cli::{Command, ParseArgs, SnapshotArgs, WatchArgs};
use crate::domain::{BandThresholds, EngineConfig, FeedConfig, FeedKind, MonitorConfig, StatusLevel, ThemeBand};
use crate::engine::CycleOutcome;
use crate::error::AppError;
use crate::logging::LogTarget;
use crate::monitor::Monitor;

pub mod pipeline;

/// Environment variable naming the default feed URL.
pub const FEED_URL_ENV: &str = "BALANCE_FEED_URL";

/// Entry point for the `bw` binary.
pub fn run() -> Result<(), AppError> {
    // `bw` and `bw --simulate` behave like `bw tui ...`.
    let argv = rewrite_args(std::env::args().collect());
    let cli = crate::cli::Cli::parse_from(argv);

    match cli.command {
        Command::Tui(args) => handle_tui(args),
        Command::Watch(args) => handle_watch(args),
        Command::Once(args) => handle_once(args),
        Command::Parse(args) => handle_parse(args),
        Command::Snapshot(args) => handle_snapshot(args),
    }
}

fn runtime() -> Result<tokio::runtime::Runtime, AppError> {
    tokio::runtime::Builder::new_multi_thread()
        .enable_all()
        .build()
        .map_err(|e| AppError::new(4, format!("Failed to start async runtime: {e}")))
}

fn handle_tui(args: WatchArgs) -> Result<(), AppError> {
    let config = monitor_config_from_args(&args, default_feed_url())?;
    let target = match &args.log_file {
        Some(path) => LogTarget::File(path.clone()),
        None => LogTarget::Discard,
    };
    crate::logging::init(&target, args.log_format)?;

    let runtime = runtime()?;
    let monitor = {
        let _enter = runtime.enter();
        let engines = pipeline::build_engines(&config, false)?;
        Monitor::start(engines, config.interval)
    };

    // The dashboard loop blocks this thread; feed tasks run on the workers.
    let result = crate::tui::run(&monitor, &config);
    runtime.block_on(monitor.shutdown());
    result
}

fn handle_watch(args: WatchArgs) -> Result<(), AppError> {
    let config = monitor_config_from_args(&args, default_feed_url())?;
    crate::logging::init(&log_target(&args), args.log_format)?;

    runtime()?.block_on(watch(&config))
}

async fn watch(config: &MonitorConfig) -> Result<(), AppError> {
    let engines = pipeline::build_engines(config, true)?;
    let monitor = Monitor::start(engines, config.interval);
    info!(feeds = config.feeds.len(), "watching, press Ctrl-C to stop");

    let signal = tokio::signal::ctrl_c().await;
    monitor.shutdown().await;
    signal.map_err(|e| AppError::new(4, format!("Failed to listen for Ctrl-C: {e}")))
}

fn handle_once(args: WatchArgs) -> Result<(), AppError> {
    let config = monitor_config_from_args(&args, default_feed_url())?;
    crate::logging::init(&log_target(&args), args.log_format)?;

    runtime()?.block_on(once(&config))
}

/// One cycle per feed. Fails only when a feed ends with no value at all.
async fn once(config: &MonitorConfig) -> Result<(), AppError> {
    let engines = pipeline::build_engines(config, false)?;
    let mut failure = None;

    for mut engine in engines {
        let report = engine.run_cycle().await;
        println!("{}", crate::report::format_cycle_report(&report));
        match engine.published() {
            Some(event) => println!("{}", crate::report::format_event_line(&event, &config.bands)),
            None => {
                if let CycleOutcome::Exhausted(err) = report.outcome {
                    failure = Some(err);
                }
            }
        }
    }

    match failure {
        Some(err) => Err(err.into()),
        None => Ok(()),
    }
}

fn handle_parse(args: ParseArgs) -> Result<(), AppError> {
    let bands = bands_from(args.low_below, args.high_above)?;
    let balance = crate::data::normalize(&args.raw)
        .map_err(|e| AppError::new(2, format!("'{}' rejected ({}): {e}", args.raw, e.kind())))?;
    let band = ThemeBand::for_balance(balance, &bands);

    println!("value:     {}", balance.value());
    println!("formatted: {}", crate::report::format_rupiah(balance));
    println!("compact:   {}", crate::report::format_compact(balance));
    println!("band:      {}", band.theme_name());
    println!("status:    {}", StatusLevel::for_balance(balance).label());
    Ok(())
}

fn handle_snapshot(args: SnapshotArgs) -> Result<(), AppError> {
    let snapshot = crate::io::read_snapshot(&args.path)?
        .ok_or_else(|| AppError::new(2, format!("No snapshot at '{}'", args.path.display())))?;

    let age = chrono::Utc::now().timestamp() - snapshot.timestamp_unix;
    println!("feed:      {}", snapshot.feed);
    println!("success:   {}", snapshot.success);
    println!("value:     {}", snapshot.data.numeric);
    println!("formatted: {}", snapshot.data.formatted);
    println!("timestamp: {} ({}h {}m ago)", snapshot.timestamp, age / 3600, (age % 3600) / 60);
    Ok(())
}

fn log_target(args: &WatchArgs) -> LogTarget {
    match &args.log_file {
        Some(path) => LogTarget::File(path.clone()),
        None => LogTarget::Stderr,
    }
}

fn default_feed_url() -> Option<String> {
    dotenvy::dotenv().ok();
    std::env::var(FEED_URL_ENV).ok().filter(|s| !s.trim().is_empty())
}

/// Validate CLI flags into a `MonitorConfig`.
///
/// `env_url` is the feed used when no `--feed` is given.
pub fn monitor_config_from_args(args: &WatchArgs, env_url: Option<String>) -> Result<MonitorConfig, AppError> {
    let timeout = seconds("--timeout", args.timeout, false)?;
    let feeds = feeds_from_args(args, env_url, timeout)?;

    if args.samples == 0 {
        return Err(AppError::new(2, "--samples must be at least 1."));
    }
    if args.max_attempts == 0 {
        return Err(AppError::new(2, "--max-attempts must be at least 1."));
    }
    if args.failure_reset == 0 {
        return Err(AppError::new(2, "--failure-reset must be at least 1."));
    }
    if !args.change_threshold.is_finite() || args.change_threshold <= 0.0 {
        return Err(AppError::new(2, "--change-threshold must be a positive number."));
    }

    let engine = EngineConfig {
        sample_count: args.samples,
        sample_delay: seconds("--sample-delay", args.sample_delay, true)?,
        retry_delay: seconds("--retry-delay", args.retry_delay, true)?,
        max_attempts: args.max_attempts,
        change_threshold: args.change_threshold,
        confirm_window: seconds("--confirm-window", args.confirm_window, true)?,
        failure_reset_threshold: args.failure_reset,
    };

    Ok(MonitorConfig {
        feeds,
        engine,
        interval: seconds("--interval", args.interval, false)?,
        bands: bands_from(args.low_below, args.high_above)?,
        snapshot_path: args.snapshot.clone(),
        snapshot_max_age: seconds("--snapshot-max-age", args.snapshot_max_age * 3600.0, true)?,
        history_path: args.history.clone(),
    })
}

fn feeds_from_args(args: &WatchArgs, env_url: Option<String>, timeout: Duration) -> Result<Vec<FeedConfig>, AppError> {
    let mut specs = Vec::new();
    let count = args.feeds.len();
    for (i, raw) in args.feeds.iter().enumerate() {
        specs.push(parse_feed_spec(raw, i, count)?);
    }
    if specs.is_empty() {
        if args.simulate {
            specs.push(("demo".to_string(), String::new()));
        } else if let Some(url) = env_url {
            specs.push(parse_feed_spec(&url, 0, 1)?);
        } else {
            return Err(AppError::new(
                2,
                format!("No feed configured: pass --feed NAME=URL, set {FEED_URL_ENV} (or .env), or use --simulate."),
            ));
        }
    }

    let mut feeds: Vec<FeedConfig> = Vec::with_capacity(specs.len());
    for (name, url) in specs {
        if feeds.iter().any(|f| f.name == name) {
            return Err(AppError::new(2, format!("Duplicate feed name '{name}'.")));
        }
        let kind = if args.simulate {
            FeedKind::Simulated
        } else {
            FeedKind::Http { url }
        };
        feeds.push(FeedConfig {
            name,
            kind,
            column: args.column,
            timeout,
        });
    }
    Ok(feeds)
}

/// `NAME=URL` or a bare `http(s)://` URL. Bare URLs are named `feed`
/// (or `feedN` when several are given).
fn parse_feed_spec(raw: &str, index: usize, count: usize) -> Result<(String, String), AppError> {
    let raw = raw.trim();
    let is_url = |s: &str| s.starts_with("http://") || s.starts_with("https://");

    let (name, url) = if is_url(raw) {
        let name = if count > 1 {
            format!("feed{}", index + 1)
        } else {
            "feed".to_string()
        };
        (name, raw.to_string())
    } else {
        let (name, url) = raw
            .split_once('=')
            .ok_or_else(|| AppError::new(2, format!("Invalid feed '{raw}': expected NAME=URL.")))?;
        (name.trim().to_string(), url.trim().to_string())
    };

    if name.is_empty() || !name.chars().all(|c| c.is_ascii_alphanumeric() || c == '-' || c == '_') {
        return Err(AppError::new(
            2,
            format!("Invalid feed name '{name}': use letters, digits, '-' or '_'."),
        ));
    }
    if !is_url(&url) {
        return Err(AppError::new(2, format!("Invalid feed URL '{url}': expected http(s)://.")));
    }
    Ok((name, url))
}

/// Longest accepted delay, interval, window or snapshot age.
const MAX_DURATION: Duration = Duration::from_secs(365 * 24 * 3600);

fn seconds(flag: &str, value: f64, allow_zero: bool) -> Result<Duration, AppError> {
    let ok = value.is_finite() && (value > 0.0 || (allow_zero && value == 0.0));
    if !ok {
        let rule = if allow_zero { "zero or more" } else { "greater than zero" };
        return Err(AppError::new(2, format!("{flag} must be {rule} (got {value}).")));
    }
    match Duration::try_from_secs_f64(value) {
        Ok(duration) if duration <= MAX_DURATION => Ok(duration),
        _ => Err(AppError::new(2, format!("{flag} must be at most one year."))),
    }
}

fn bands_from(low_below: f64, high_above: f64) -> Result<BandThresholds, AppError> {
    if !low_below.is_finite() || !high_above.is_finite() || low_below < 0.0 || low_below > high_above {
        return Err(AppError::new(
            2,
            format!("Invalid bands: need 0 <= --low-below ({low_below}) <= --high-above ({high_above})."),
        ));
    }
    Ok(BandThresholds {
        low_below,
        high_above,
    })
}

/// Rewrite argv so `bw` defaults to `bw tui`.
///
/// Rules:
/// - `bw`                      -> `bw tui`
/// - `bw --simulate ...`       -> `bw tui --simulate ...`
/// - `bw --help/--version/-h`  -> unchanged (show top-level help/version)
fn rewrite_args(mut argv: Vec<String>) -> Vec<String> {
    let Some(arg1) = argv.get(1).cloned() else {
        argv.push("tui".to_string());
        return argv;
    };

    let is_top_level_help_or_version = matches!(
        arg1.as_str(),
        "-h" | "--help" | "-V" | "--version" | "help"
    );
    if is_top_level_help_or_version {
        return argv;
    }

    let is_subcommand = matches!(arg1.as_str(), "tui" | "watch" | "once" | "parse" | "snapshot");
    if is_subcommand {
        return argv;
    }

    // If the first token is a flag, treat it as "tui flags".
    if arg1.starts_with('-') {
        argv.insert(1, "tui".to_string());
        return argv;
    }

    argv
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cli::Cli;

    fn watch_args(extra: &[&str]) -> WatchArgs {
        let mut argv = vec!["bw", "watch"];
        argv.extend_from_slice(extra);
        match Cli::parse_from(argv).command {
            Command::Watch(args) => args,
            _ => unreachable!(),
        }
    }

    fn argv(items: &[&str]) -> Vec<String> {
        items.iter().map(|s| s.to_string()).collect()
    }

    #[test]
    fn bare_invocation_defaults_to_tui() {
        assert_eq!(rewrite_args(argv(&["bw"])), argv(&["bw", "tui"]));
        assert_eq!(
            rewrite_args(argv(&["bw", "--simulate"])),
            argv(&["bw", "tui", "--simulate"])
        );
        assert_eq!(rewrite_args(argv(&["bw", "--help"])), argv(&["bw", "--help"]));
        assert_eq!(rewrite_args(argv(&["bw", "once", "-f", "x"])), argv(&["bw", "once", "-f", "x"]));
    }

    #[test]
    fn defaults_match_engine_defaults() {
        let config = monitor_config_from_args(&watch_args(&["--simulate"]), None).unwrap();
        assert_eq!(config.engine, EngineConfig::default());
        assert_eq!(config.interval, Duration::from_secs(15));
        assert_eq!(config.bands, BandThresholds::default());
        assert_eq!(config.snapshot_max_age, Duration::from_secs(24 * 3600));
        assert_eq!(config.feeds.len(), 1);
        assert_eq!(config.feeds[0].kind, FeedKind::Simulated);
    }

    #[test]
    fn feeds_from_flags_and_env() {
        let args = watch_args(&[
            "--feed",
            "kas=https://docs.example.test/pub?output=csv",
            "--feed",
            "dapur=https://docs.example.test/other?output=csv",
        ]);
        let config = monitor_config_from_args(&args, None).unwrap();
        let names: Vec<&str> = config.feeds.iter().map(|f| f.name.as_str()).collect();
        assert_eq!(names, ["kas", "dapur"]);
        assert_eq!(
            config.feeds[0].kind,
            FeedKind::Http {
                url: "https://docs.example.test/pub?output=csv".to_string()
            }
        );

        let from_env = monitor_config_from_args(&watch_args(&[]), Some("https://x.test/a.csv".to_string())).unwrap();
        assert_eq!(from_env.feeds[0].name, "feed");
    }

    #[test]
    fn missing_feed_is_a_config_error() {
        let err = monitor_config_from_args(&watch_args(&[]), None).unwrap_err();
        assert_eq!(err.exit_code(), 2);
    }

    #[test]
    fn invalid_values_are_rejected() {
        let cases: &[&[&str]] = &[
            &["--simulate", "--samples", "0"],
            &["--simulate", "--max-attempts", "0"],
            &["--simulate", "--interval", "0"],
            &["--simulate", "--change-threshold", "0"],
            &["--simulate", "--interval", "1e30"],
            &["--simulate", "--sample-delay", "1e30"],
            &["--simulate", "--retry-delay", "1e17"],
            &["--simulate", "--confirm-window", "1e30"],
            &["--simulate", "--timeout", "1e30"],
            &["--simulate", "--snapshot-max-age", "1e30"],
            &["--simulate", "--low-below", "2000000"],
            &["--feed", "kas=ftp://nope"],
            &["--feed", "no-equals-sign"],
            &["--feed", "a=https://x.test", "--feed", "a=https://y.test"],
        ];
        for case in cases {
            let err = monitor_config_from_args(&watch_args(case), None).unwrap_err();
            assert_eq!(err.exit_code(), 2, "{case:?}");
        }
    }

    #[test]
    fn bare_urls_are_numbered_when_several() {
        assert_eq!(parse_feed_spec("https://a.test", 1, 2).unwrap().0, "feed2");
        assert_eq!(parse_feed_spec("https://a.test", 0, 1).unwrap().0, "feed");
    }
}
