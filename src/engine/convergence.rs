//! Per-round consensus rule.
//!
//! A round is unanimous or it is nothing: partial majorities are treated as
//! disagreement because the feed's cache has not settled yet.

use crate::domain::Balance;
use crate::error::{CycleError, FetchError};

/// Outcome of evaluating one round of samples.
#[derive(Debug, Clone, PartialEq)]
pub enum ConvergenceResult {
    /// Every successful sample was bit-equal.
    Stable(Balance),
    /// Samples disagreed.
    Unstable(Vec<Balance>),
    /// No sample succeeded.
    Empty,
}

impl ConvergenceResult {
    pub fn stable_value(&self) -> Option<Balance> {
        match self {
            ConvergenceResult::Stable(v) => Some(*v),
            _ => None,
        }
    }

    /// The round-level error, if the round did not converge.
    pub fn error(&self) -> Option<CycleError> {
        match self {
            ConvergenceResult::Stable(_) => None,
            ConvergenceResult::Unstable(samples) => Some(CycleError::NoConsensus {
                samples: samples.iter().map(|b| b.value()).collect(),
            }),
            ConvergenceResult::Empty => Some(CycleError::NoConsensus { samples: Vec::new() }),
        }
    }
}

/// Reduce a round's successful samples.
pub fn evaluate(samples: &[Balance]) -> ConvergenceResult {
    let Some(first) = samples.first() else {
        return ConvergenceResult::Empty;
    };
    if samples.iter().all(|s| s.same_as(*first)) {
        ConvergenceResult::Stable(*first)
    } else {
        ConvergenceResult::Unstable(samples.to_vec())
    }
}

/// What happened in one sampling round.
#[derive(Debug, Clone, PartialEq)]
pub struct RoundRecord {
    /// 1-based round number within the cycle.
    pub attempt: u32,
    pub samples: Vec<Balance>,
    pub failures: Vec<FetchError>,
    pub result: ConvergenceResult,
}

#[cfg(test)]
mod tests {
    use super::*;

    fn b(v: f64) -> Balance {
        Balance::new(v).unwrap()
    }

    #[test]
    fn unanimous_samples_are_stable() {
        let r = evaluate(&[b(1_300_000.0), b(1_300_000.0), b(1_300_000.0)]);
        assert_eq!(r, ConvergenceResult::Stable(b(1_300_000.0)));
        assert!(r.error().is_none());
    }

    #[test]
    fn majority_is_not_enough() {
        let r = evaluate(&[b(1_300_000.0), b(613_000.0), b(1_300_000.0)]);
        assert!(matches!(r, ConvergenceResult::Unstable(ref s) if s.len() == 3));
        assert_eq!(
            r.error(),
            Some(CycleError::NoConsensus {
                samples: vec![1_300_000.0, 613_000.0, 1_300_000.0]
            })
        );
    }

    #[test]
    fn single_surviving_sample_counts_as_stable() {
        // Failed samples are omitted, so one good read in a round is unanimous.
        assert_eq!(evaluate(&[b(42.0)]), ConvergenceResult::Stable(b(42.0)));
    }

    #[test]
    fn no_samples_is_empty() {
        assert_eq!(evaluate(&[]), ConvergenceResult::Empty);
        assert!(ConvergenceResult::Empty.error().is_some());
    }

    #[test]
    fn nearly_equal_values_disagree() {
        let r = evaluate(&[b(0.1 + 0.2), b(0.3)]);
        assert!(matches!(r, ConvergenceResult::Unstable(_)));
    }
}
