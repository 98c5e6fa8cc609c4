//! Formatting helpers: balances, events, and cycle summaries.
//!
//! We keep formatting code in one place so:
//! - the engine stays free of presentation concerns
//! - output changes are localized

use crate::domain::{Balance, BalanceEvent, BandThresholds, StatusLevel, ThemeBand};
use crate::engine::{ConvergenceResult, CycleOutcome, CycleReport};

/// Rupiah text in id-ID style: `Rp 1.234.567`, `Rp 1.234,56`.
///
/// Non-integers keep two decimals. Feeding the output back through
/// `data::normalize` yields the value again (to two decimals).
pub fn format_rupiah(balance: Balance) -> String {
    let fixed = format!("{:.2}", balance.value());
    let (int_part, frac_part) = fixed.split_once('.').unwrap_or((fixed.as_str(), "00"));
    let grouped = group_thousands(int_part, '.');
    if frac_part == "00" {
        format!("Rp {grouped}")
    } else {
        format!("Rp {grouped},{frac_part}")
    }
}

/// Short display form: millions as `1,300 Jt`, smaller values fully grouped.
pub fn format_compact(balance: Balance) -> String {
    let v = balance.value();
    if v >= 1_000_000.0 {
        let juta = format!("{:.3}", v / 1_000_000.0);
        format!("{} Jt", juta.replacen('.', ",", 1))
    } else {
        group_thousands(&format!("{:.0}", v), '.')
    }
}

fn group_thousands(digits: &str, sep: char) -> String {
    let len = digits.len();
    let mut out = String::with_capacity(len + len / 3);
    for (i, c) in digits.chars().enumerate() {
        if i > 0 && (len - i) % 3 == 0 {
            out.push(sep);
        }
        out.push(c);
    }
    out
}

/// One-line description of a publish event (used by `watch`).
pub fn format_event_line(event: &BalanceEvent, bands: &BandThresholds) -> String {
    let band = ThemeBand::for_balance(event.value, bands);
    format!(
        "{} [{}] {} ({}, theme={}, {})",
        event.timestamp,
        event.feed,
        event.formatted_text,
        StatusLevel::for_balance(event.value).label(),
        band.theme_name(),
        event.source.label(),
    )
}

pub fn format_outcome(outcome: &CycleOutcome) -> String {
    match outcome {
        CycleOutcome::Published {
            value,
            source,
            confirmed,
        } => {
            let mut s = format!("published {} ({})", format_rupiah(*value), source.label());
            if *confirmed {
                s.push_str(", confirmed large change");
            }
            s
        }
        CycleOutcome::Unchanged { value } => format!("unchanged at {}", format_rupiah(*value)),
        CycleOutcome::Held { candidate, change } => format!(
            "holding {} ({:.1}% change) until confirmed",
            format_rupiah(*candidate),
            change * 100.0
        ),
        CycleOutcome::Rejected { candidate, change } => format!(
            "ignored uncorroborated {} ({:.1}% change)",
            format_rupiah(*candidate),
            change * 100.0
        ),
        CycleOutcome::Exhausted(err) => format!("{err}, keeping last known value"),
        CycleOutcome::Cancelled => "cancelled".to_string(),
    }
}

/// Multi-line summary of one cycle (used by `once` and the debug bundle).
pub fn format_cycle_report(report: &CycleReport) -> String {
    let mut out = String::new();

    out.push_str(&format!("=== bw - cycle report [{}] ===\n", report.feed));
    out.push_str(&format!(
        "Started: {} | elapsed: {:.1}s | rounds: {}\n",
        report.started_at.to_rfc3339(),
        report.elapsed.as_secs_f64(),
        report.rounds.len()
    ));

    for round in &report.rounds {
        let samples: Vec<String> = round.samples.iter().map(|s| format_rupiah(*s)).collect();
        let verdict = match &round.result {
            ConvergenceResult::Stable(_) => "stable",
            ConvergenceResult::Unstable(_) => "disagree",
            ConvergenceResult::Empty => "no data",
        };
        out.push_str(&format!(
            "  round {}: [{}] failed={} -> {verdict}\n",
            round.attempt,
            samples.join(", "),
            round.failures.len()
        ));
        for failure in &round.failures {
            out.push_str(&format!("    - {failure}\n"));
        }
    }

    if let Some(fallback) = &report.fallback {
        match fallback {
            Ok(v) => out.push_str(&format!("  fallback read: {}\n", format_rupiah(*v))),
            Err(e) => out.push_str(&format!("  fallback read failed: {e}\n")),
        }
    }

    out.push_str(&format!("Outcome: {}\n", format_outcome(&report.outcome)));
    out
}
