//! Error types.
//!
//! - `FetchError`: why a single read produced no value
//! - `CycleError`: why an update cycle produced no consensus
//! - `AppError`: binary-level error carrying a process exit code

use thiserror::Error;

/// Failure of one Fetcher read.
///
/// None of these are fatal: the engine turns them into "no sample".
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum FetchError {
    /// The sheet itself reports a formula error (e.g. `#REF!`).
    #[error("data source reported {0}")]
    DataSource(String),

    #[error("empty data")]
    EmptyData,

    /// Unparseable or implausible numeric text (including negatives).
    #[error("cannot parse '{0}' as a balance")]
    Parse(String),

    /// Transport failure, timeout, or non-success HTTP status.
    #[error("network error: {0}")]
    Network(String),
}

impl FetchError {
    /// Short label used in logs and round records.
    pub fn kind(&self) -> &'static str {
        match self {
            FetchError::DataSource(_) => "data_source",
            FetchError::EmptyData => "empty_data",
            FetchError::Parse(_) => "parse",
            FetchError::Network(_) => "network",
        }
    }
}

/// Engine-level failures.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum CycleError {
    /// The samples of one round disagreed.
    #[error("no consensus among {} samples", samples.len())]
    NoConsensus { samples: Vec<f64> },

    /// Every round was used without consensus and the fallback read failed too.
    #[error("exhausted after {attempts} rounds")]
    Exhausted { attempts: u32 },
}

#[derive(Clone)]
pub struct AppError {
    exit_code: u8,
    message: String,
}

impl AppError {
    pub fn new(exit_code: u8, message: impl Into<String>) -> Self {
        Self {
            exit_code,
            message: message.into(),
        }
    }

    pub fn exit_code(&self) -> u8 {
        self.exit_code
    }
}

impl std::fmt::Display for AppError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.message)
    }
}

impl std::fmt::Debug for AppError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AppError")
            .field("exit_code", &self.exit_code)
            .field("message", &self.message)
            .finish()
    }
}

impl std::error::Error for AppError {}

impl From<FetchError> for AppError {
    fn from(err: FetchError) -> Self {
        AppError::new(4, err.to_string())
    }
}

impl From<CycleError> for AppError {
    fn from(err: CycleError) -> Self {
        AppError::new(4, err.to_string())
    }
}
