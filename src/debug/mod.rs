//! Debug bundle writer for inspecting one feed's engine state.

use std::fs::{File, create_dir_all};
use std::io::Write;
use std::path::{Path, PathBuf};

use chrono::Local;

use crate::domain::EngineConfig;
use crate::engine::EngineState;
use crate::error::AppError;
use crate::report::{format_cycle_report, format_rupiah};

/// Write the bundle under `./debug/`.
pub fn write_debug_bundle(state: &EngineState, config: &EngineConfig) -> Result<PathBuf, AppError> {
    write_debug_bundle_in(Path::new("debug"), state, config)
}

pub fn write_debug_bundle_in(dir: &Path, state: &EngineState, config: &EngineConfig) -> Result<PathBuf, AppError> {
    create_dir_all(dir).map_err(|e| AppError::new(4, format!("Failed to create debug dir: {e}")))?;

    let ts = Local::now().format("%Y%m%d_%H%M%S");
    let path = dir.join(format!("bw_debug_{}_{ts}.md", state.feed));

    let mut file = File::create(&path)
        .map_err(|e| AppError::new(4, format!("Failed to create debug file: {e}")))?;
    file.write_all(render_debug_bundle(state, config).as_bytes())
        .map_err(|e| AppError::new(4, format!("Failed to write debug: {e}")))?;

    Ok(path)
}

pub fn render_debug_bundle(state: &EngineState, config: &EngineConfig) -> String {
    let mut out = String::new();

    out.push_str("# bw debug bundle\n");
    out.push_str(&format!("- generated: {}\n", Local::now().to_rfc3339()));
    out.push_str(&format!("- feed: {}\n", state.feed));
    out.push_str(&format!(
        "- rounds: {} samples, {:.1}s apart, {:.1}s retry delay, {} max\n",
        config.sample_count,
        config.sample_delay.as_secs_f64(),
        config.retry_delay.as_secs_f64(),
        config.max_attempts
    ));
    out.push_str(&format!(
        "- guard: threshold={:.1}%, confirm_window={}s, failure_reset={}\n",
        config.change_threshold * 100.0,
        config.confirm_window.as_secs(),
        config.failure_reset_threshold
    ));

    out.push_str("\n## Published\n");
    match &state.published {
        Some(event) => {
            out.push_str("| value | formatted | timestamp | source |\n");
            out.push_str("| - | - | - | - |\n");
            out.push_str(&format!(
                "| {} | {} | {} | {} |\n",
                event.value.value(),
                event.formatted_text,
                event.timestamp,
                event.source.label()
            ));
        }
        None => out.push_str("(nothing published yet)\n"),
    }

    out.push_str("\n## Guard\n");
    match &state.pending {
        Some(p) => out.push_str(&format!(
            "- pending: {} ({:.1}% change), first seen {:.1}s ago\n",
            format_rupiah(p.value),
            p.change * 100.0,
            p.first_seen.elapsed().as_secs_f64()
        )),
        None => out.push_str("- pending: none\n"),
    }
    out.push_str(&format!("- consecutive_failures: {}\n", state.consecutive_failures));

    out.push_str("\n## Last cycle\n");
    match &state.last_report {
        Some(report) => {
            out.push_str("```text\n");
            out.push_str(&format_cycle_report(report));
            out.push_str("```\n");
        }
        None => out.push_str("(no cycle has run yet)\n"),
    }

    out
}
