//! Upstream data: one-shot feed reads and text-to-number normalization.

pub mod feed;
pub mod normalize;

pub use feed::{Fetcher, HttpFeed, SimulatedFeed, build_fetcher};
pub use normalize::normalize;
