//! Magnitude-change guard.
//!
//! A freshly converged value that jumps far away from the published one is
//! held until a later, independent convergence lands on the same value within
//! the confirmation window. Transient corruption (a `0`, a misplaced decimal)
//! therefore never reaches the display on its own.
//!
//! Only converged candidates take part in confirmation. A lone fallback read
//! that jumps too far is rejected and leaves any pending candidate untouched.

use std::time::Duration;

use tokio::time::Instant;

use crate::domain::{Balance, ValueSource};

/// A large jump waiting for confirmation.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct PendingCandidate {
    pub value: Balance,
    pub first_seen: Instant,
    /// Relative change against the value published when first seen.
    pub change: f64,
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub enum GuardDecision {
    /// Publish the candidate. `confirmed` is set when it cleared a held jump.
    Commit { confirmed: bool },
    /// Keep the current value; the candidate is now pending.
    Hold { change: f64, replaced: bool },
    /// Keep the current value; an uncorroborated jump is discarded.
    Reject { change: f64 },
}

#[derive(Debug, Clone)]
pub struct MagnitudeGuard {
    threshold: f64,
    window: Duration,
    pending: Option<PendingCandidate>,
}

impl MagnitudeGuard {
    pub fn new(threshold: f64, window: Duration) -> Self {
        Self {
            threshold,
            window,
            pending: None,
        }
    }

    pub fn pending(&self) -> Option<&PendingCandidate> {
        self.pending.as_ref()
    }

    /// Drop the pending candidate if its window has elapsed.
    pub fn expire(&mut self, now: Instant) -> Option<PendingCandidate> {
        let expired = self
            .pending
            .as_ref()
            .is_some_and(|p| now.saturating_duration_since(p.first_seen) > self.window);
        if expired { self.pending.take() } else { None }
    }

    pub fn reset(&mut self) -> Option<PendingCandidate> {
        self.pending.take()
    }

    /// Decide whether `candidate` may replace `current`.
    pub fn check(
        &mut self,
        candidate: Balance,
        source: ValueSource,
        current: Option<Balance>,
        now: Instant,
    ) -> GuardDecision {
        self.expire(now);

        let Some(current) = current else {
            self.pending = None;
            return GuardDecision::Commit { confirmed: false };
        };

        let change = candidate.relative_change_from(current);
        if change <= self.threshold {
            // The feed came back to a plausible value; any held jump was noise.
            self.pending = None;
            return GuardDecision::Commit { confirmed: false };
        }

        if source != ValueSource::Converged {
            return GuardDecision::Reject { change };
        }

        match self.pending {
            Some(p) if p.value.same_as(candidate) => {
                self.pending = None;
                GuardDecision::Commit { confirmed: true }
            }
            _ => {
                let replaced = self.pending.is_some();
                self.pending = Some(PendingCandidate {
                    value: candidate,
                    first_seen: now,
                    change,
                });
                GuardDecision::Hold { change, replaced }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn b(v: f64) -> Balance {
        Balance::new(v).unwrap()
    }

    const C: ValueSource = ValueSource::Converged;

    fn guard() -> MagnitudeGuard {
        MagnitudeGuard::new(0.5, Duration::from_secs(60))
    }

    #[test]
    fn first_value_commits_immediately() {
        let mut g = guard();
        let now = Instant::now();
        assert_eq!(g.check(b(100.0), C, None, now), GuardDecision::Commit { confirmed: false });
    }

    #[test]
    fn small_changes_commit() {
        let mut g = guard();
        let now = Instant::now();
        assert_eq!(
            g.check(b(1_400_000.0), C, Some(b(1_300_000.0)), now),
            GuardDecision::Commit { confirmed: false }
        );
        // Exactly at the threshold still commits.
        assert_eq!(
            g.check(b(150.0), C, Some(b(100.0)), now),
            GuardDecision::Commit { confirmed: false }
        );
    }

    #[test]
    fn large_jump_needs_second_sighting() {
        let mut g = guard();
        let t0 = Instant::now();
        let current = Some(b(1_300_000.0));
        assert!(matches!(
            g.check(b(130_000.0), C, current, t0),
            GuardDecision::Hold { replaced: false, .. }
        ));
        assert!(g.pending().is_some());
        assert_eq!(
            g.check(b(130_000.0), C, current, t0 + Duration::from_secs(30)),
            GuardDecision::Commit { confirmed: true }
        );
        assert!(g.pending().is_none());
    }

    #[test]
    fn confirmation_after_window_rearms() {
        let mut g = guard();
        let t0 = Instant::now();
        let current = Some(b(1_300_000.0));
        g.check(b(0.0), C, current, t0);
        let late = t0 + Duration::from_secs(61);
        assert!(matches!(
            g.check(b(0.0), C, current, late),
            GuardDecision::Hold { replaced: false, .. }
        ));
        assert_eq!(g.pending().map(|p| p.first_seen), Some(late));
    }

    #[test]
    fn different_jump_replaces_pending() {
        let mut g = guard();
        let t0 = Instant::now();
        let current = Some(b(1_000.0));
        g.check(b(5_000.0), C, current, t0);
        assert!(matches!(
            g.check(b(9_000.0), C, current, t0),
            GuardDecision::Hold { replaced: true, .. }
        ));
        assert_eq!(g.pending().map(|p| p.value), Some(b(9_000.0)));
    }

    #[test]
    fn plausible_value_discards_pending() {
        let mut g = guard();
        let t0 = Instant::now();
        let current = Some(b(1_000.0));
        g.check(b(10.0), C, current, t0);
        g.check(b(1_000.0), C, current, t0);
        assert!(g.pending().is_none());
    }

    #[test]
    fn zero_base_treats_any_value_as_jump() {
        let mut g = guard();
        let t0 = Instant::now();
        assert!(matches!(g.check(b(1.0), C, Some(b(0.0)), t0), GuardDecision::Hold { .. }));
    }

    #[test]
    fn expire_only_after_window() {
        let mut g = guard();
        let t0 = Instant::now();
        g.check(b(10.0), C, Some(b(1_000.0)), t0);
        assert!(g.expire(t0 + Duration::from_secs(60)).is_none());
        assert!(g.expire(t0 + Duration::from_secs(61)).is_some());
        assert!(g.pending().is_none());
    }

    #[test]
    fn fallback_jump_neither_confirms_nor_replaces() {
        let mut g = guard();
        let t0 = Instant::now();
        let current = Some(b(1_300_000.0));
        g.check(b(130_000.0), C, current, t0);

        let later = t0 + Duration::from_secs(10);
        assert!(matches!(
            g.check(b(130_000.0), ValueSource::Fallback, current, later),
            GuardDecision::Reject { .. }
        ));
        assert!(matches!(
            g.check(b(7.0), ValueSource::Fallback, current, later),
            GuardDecision::Reject { .. }
        ));
        assert_eq!(g.pending().map(|p| (p.value, p.first_seen)), Some((b(130_000.0), t0)));
    }

    #[test]
    fn plausible_fallback_commits() {
        let mut g = guard();
        let t0 = Instant::now();
        assert_eq!(
            g.check(b(1_250_000.0), ValueSource::Fallback, Some(b(1_300_000.0)), t0),
            GuardDecision::Commit { confirmed: false }
        );
        assert_eq!(
            g.check(b(10.0), ValueSource::Fallback, None, t0),
            GuardDecision::Commit { confirmed: false }
        );
    }
}
