//! Domain types used throughout the pipeline.
//!
//! This module defines:
//!
//! - the normalized value type (`Balance`) and the publish event (`BalanceEvent`)
//! - display banding (`ThemeBand`, `BandThresholds`)
//! - resolved configuration (`EngineConfig`, `FeedConfig`, `MonitorConfig`)

pub mod types;

pub use types::*;
