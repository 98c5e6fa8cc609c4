//! Shared domain types.
//!
//! These types are intentionally kept small and serializable so they can be:
//!
//! - passed between the engine and its subscribers
//! - persisted in the snapshot / history files
//! - rendered by the dashboard

use std::path::PathBuf;
use std::time::Duration;

use clap::ValueEnum;
use serde::{Deserialize, Serialize};

/// A normalized, non-negative, finite balance.
///
/// Only `data::normalize` and the snapshot loader create these; anything that
/// failed parsing never becomes a `Balance`.
#[derive(Debug, Clone, Copy, PartialEq, PartialOrd, Serialize, Deserialize)]
#[serde(try_from = "f64", into = "f64")]
pub struct Balance(f64);

impl Balance {
    pub fn new(value: f64) -> Option<Self> {
        if !value.is_finite() || value < 0.0 {
            return None;
        }
        // Fold -0.0 into 0.0 so bit comparison is meaningful.
        if value == 0.0 {
            return Some(Self(0.0));
        }
        Some(Self(value))
    }

    pub fn value(self) -> f64 {
        self.0
    }

    /// Exact agreement, as required by the voting rule.
    pub fn same_as(self, other: Balance) -> bool {
        self.0.to_bits() == other.0.to_bits()
    }

    /// Relative distance from `base`, as a fraction (0.5 = 50%).
    ///
    /// A zero base makes any non-zero candidate infinitely far away.
    pub fn relative_change_from(self, base: Balance) -> f64 {
        if base.0 == 0.0 {
            return if self.0 == 0.0 { 0.0 } else { f64::INFINITY };
        }
        (self.0 - base.0).abs() / base.0
    }
}

impl TryFrom<f64> for Balance {
    type Error = String;

    fn try_from(value: f64) -> Result<Self, Self::Error> {
        Balance::new(value).ok_or_else(|| format!("invalid balance {value}"))
    }
}

impl From<Balance> for f64 {
    fn from(b: Balance) -> f64 {
        b.0
    }
}

/// Where a published value came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ValueSource {
    /// All samples of a round agreed.
    Converged,
    /// Best-effort single read after every round disagreed.
    Fallback,
    /// Loaded from the persisted snapshot at startup.
    Snapshot,
}

impl ValueSource {
    pub fn label(self) -> &'static str {
        match self {
            ValueSource::Converged => "converged",
            ValueSource::Fallback => "fallback",
            ValueSource::Snapshot => "snapshot",
        }
    }
}

/// The downstream publish signal.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BalanceEvent {
    pub feed: String,
    pub value: Balance,
    pub formatted_text: String,
    /// RFC 3339, UTC.
    pub timestamp: String,
    pub source: ValueSource,
}

/// Visual theme bands for the display.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ThemeBand {
    Low,
    Medium,
    High,
}

impl ThemeBand {
    pub fn for_balance(balance: Balance, thresholds: &BandThresholds) -> Self {
        let v = balance.value();
        if v < thresholds.low_below {
            ThemeBand::Low
        } else if v <= thresholds.high_above {
            ThemeBand::Medium
        } else {
            ThemeBand::High
        }
    }

    /// Theme name of the band.
    pub fn theme_name(self) -> &'static str {
        match self {
            ThemeBand::Low => "red",
            ThemeBand::Medium => "yellow-orange",
            ThemeBand::High => "teal",
        }
    }
}

/// Status label shown under the balance. Its cut-offs are fixed and differ
/// from the theme bands.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StatusLevel {
    /// Below 50 000.
    Low,
    /// Below 500 000.
    Moderate,
    Healthy,
}

impl StatusLevel {
    pub fn for_balance(balance: Balance) -> Self {
        let v = balance.value();
        if v < 50_000.0 {
            StatusLevel::Low
        } else if v < 500_000.0 {
            StatusLevel::Moderate
        } else {
            StatusLevel::Healthy
        }
    }

    pub fn label(self) -> &'static str {
        match self {
            StatusLevel::Low => "Low balance",
            StatusLevel::Moderate => "Moderate balance",
            StatusLevel::Healthy => "Healthy balance",
        }
    }
}

/// Band boundaries: `< low_below` is low, `> high_above` is high.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct BandThresholds {
    pub low_below: f64,
    pub high_above: f64,
}

impl Default for BandThresholds {
    fn default() -> Self {
        Self {
            low_below: 500_000.0,
            high_above: 1_000_000.0,
        }
    }
}

/// Tunables of the stability convergence engine.
#[derive(Debug, Clone, PartialEq)]
pub struct EngineConfig {
    /// Samples collected per round.
    pub sample_count: u32,
    pub sample_delay: Duration,
    /// Pause between a failed round and the next one.
    pub retry_delay: Duration,
    /// Total rounds per cycle before falling back to a single read.
    pub max_attempts: u32,
    /// Relative change (0.5 = 50%) above which a candidate needs confirmation.
    pub change_threshold: f64,
    /// How long a held candidate waits for a confirming convergence.
    pub confirm_window: Duration,
    /// Consecutive empty cycles after which pending guard state is dropped.
    pub failure_reset_threshold: u32,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            sample_count: 3,
            sample_delay: Duration::from_millis(1500),
            retry_delay: Duration::from_secs(2),
            max_attempts: 5,
            change_threshold: 0.5,
            confirm_window: Duration::from_secs(60),
            failure_reset_threshold: 3,
        }
    }
}

/// One upstream feed.
#[derive(Debug, Clone, PartialEq)]
pub struct FeedConfig {
    pub name: String,
    pub kind: FeedKind,
    /// CSV field to read from the first record; `None` reads the whole body.
    pub column: Option<usize>,
    pub timeout: Duration,
}

#[derive(Debug, Clone, PartialEq)]
pub enum FeedKind {
    Http { url: String },
    /// Random readings, for demos and offline testing of the display.
    Simulated,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum LogFormat {
    Pretty,
    Compact,
}

/// Fully resolved monitor configuration.
#[derive(Debug, Clone)]
pub struct MonitorConfig {
    pub feeds: Vec<FeedConfig>,
    pub engine: EngineConfig,
    pub interval: Duration,
    pub bands: BandThresholds,
    pub snapshot_path: Option<PathBuf>,
    pub snapshot_max_age: Duration,
    pub history_path: Option<PathBuf>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn balance_rejects_negative_and_non_finite() {
        assert!(Balance::new(-1.0).is_none());
        assert!(Balance::new(f64::NAN).is_none());
        assert!(Balance::new(f64::INFINITY).is_none());
        assert!(Balance::new(0.0).is_some());
    }

    #[test]
    fn negative_zero_folds_to_zero() {
        let a = Balance::new(-0.0).unwrap();
        let b = Balance::new(0.0).unwrap();
        assert!(a.same_as(b));
    }

    #[test]
    fn relative_change_handles_zero_base() {
        let zero = Balance::new(0.0).unwrap();
        let one = Balance::new(1.0).unwrap();
        assert_eq!(one.relative_change_from(zero), f64::INFINITY);
        assert_eq!(zero.relative_change_from(zero), 0.0);
        let base = Balance::new(1_000_000.0).unwrap();
        let half = Balance::new(500_000.0).unwrap();
        assert!((half.relative_change_from(base) - 0.5).abs() < 1e-12);
    }

    #[test]
    fn theme_band_boundaries() {
        let t = BandThresholds::default();
        let band = |v: f64| ThemeBand::for_balance(Balance::new(v).unwrap(), &t);
        assert_eq!(band(499_999.0), ThemeBand::Low);
        assert_eq!(band(500_000.0), ThemeBand::Medium);
        assert_eq!(band(1_000_000.0), ThemeBand::Medium);
        assert_eq!(band(1_000_001.0), ThemeBand::High);
    }

    #[test]
    fn status_level_has_its_own_cut_offs() {
        let level = |v: f64| StatusLevel::for_balance(Balance::new(v).unwrap());
        let t = BandThresholds::default();
        let band = |v: f64| ThemeBand::for_balance(Balance::new(v).unwrap(), &t);
        assert_eq!(level(49_999.0), StatusLevel::Low);
        assert_eq!(level(50_000.0), StatusLevel::Moderate);
        assert_eq!(level(200_000.0), StatusLevel::Moderate);
        assert_eq!(level(500_000.0), StatusLevel::Healthy);
        // Red theme band, moderate label.
        assert_eq!(level(499_999.0).label(), "Moderate balance");
        assert_eq!(band(1_000_001.0).theme_name(), "teal");
    }

    #[test]
    fn balance_deserialization_rejects_negative() {
        assert!(serde_json::from_str::<Balance>("-5.0").is_err());
        let b: Balance = serde_json::from_str("1300000.0").unwrap();
        assert_eq!(b.value(), 1_300_000.0);
    }
}
