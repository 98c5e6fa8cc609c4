//! Tracing subscriber setup.
//!
//! `RUST_LOG` wins when set; otherwise `balance_watch=info`.

use std::fs::OpenOptions;
use std::path::PathBuf;
use std::sync::Mutex;

use tracing_subscriber::fmt::writer::BoxMakeWriter;
use tracing_subscriber::{EnvFilter, layer::SubscriberExt, util::SubscriberInitExt};

use crate::domain::LogFormat;
use crate::error::AppError;

const DEFAULT_FILTER: &str = "balance_watch=info";

/// Where log lines go.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LogTarget {
    Stderr,
    File(PathBuf),
    /// The dashboard owns the terminal, so logs without a file are dropped.
    Discard,
}

impl LogTarget {
    fn ansi(&self) -> bool {
        matches!(self, LogTarget::Stderr)
    }

    fn make_writer(&self) -> Result<BoxMakeWriter, AppError> {
        Ok(match self {
            LogTarget::Stderr => BoxMakeWriter::new(std::io::stderr),
            LogTarget::Discard => BoxMakeWriter::new(std::io::sink),
            LogTarget::File(path) => {
                let file = OpenOptions::new()
                    .create(true)
                    .append(true)
                    .open(path)
                    .map_err(|e| AppError::new(2, format!("Failed to open log file '{}': {e}", path.display())))?;
                BoxMakeWriter::new(Mutex::new(file))
            }
        })
    }
}

pub fn env_filter() -> EnvFilter {
    EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(DEFAULT_FILTER))
}

/// Install the global subscriber. A second call is a no-op.
pub fn init(target: &LogTarget, format: LogFormat) -> Result<(), AppError> {
    let writer = target.make_writer()?;
    let ansi = target.ansi();
    let registry = tracing_subscriber::registry().with(env_filter());

    // Already initialized (tests, repeated calls) is fine.
    let _ = match format {
        LogFormat::Pretty => registry
            .with(tracing_subscriber::fmt::layer().with_writer(writer).with_ansi(ansi))
            .try_init(),
        LogFormat::Compact => registry
            .with(
                tracing_subscriber::fmt::layer()
                    .compact()
                    .with_target(false)
                    .with_writer(writer)
                    .with_ansi(ansi),
            )
            .try_init(),
    };
    Ok(())
}
