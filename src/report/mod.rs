//! Terminal-facing text: balance formatting, event lines and cycle summaries.

pub mod format;

pub use format::*;
