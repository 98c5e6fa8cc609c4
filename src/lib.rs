//! `balance-watch` library crate.
//!
//! The binary (`bw`) is a thin wrapper around this library so that:
//!
//! - the convergence engine is testable without spawning processes
//! - feeds, formatting and persistence are reusable by other front-ends

pub mod app;
pub mod cli;
pub mod data;
pub mod debug;
pub mod domain;
pub mod engine;
pub mod error;
pub mod io;
pub mod logging;
pub mod monitor;
pub mod report;
pub mod tui;
