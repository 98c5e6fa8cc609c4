//! Input/output helpers.
//!
//! - last-known-good snapshot JSON (`snapshot`)
//! - publish history CSV (`history`)

pub mod history;
pub mod snapshot;

pub use history::*;
pub use snapshot::*;
