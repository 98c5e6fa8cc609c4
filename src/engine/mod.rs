//! Stability convergence engine.
//!
//! One `Engine` owns everything about one feed: its fetcher, the published
//! value, the magnitude guard and the failure counter. `run_cycle` takes
//! `&mut self`, so cycles of the same engine can never interleave.
//!
//! Cycle state machine:
//!
//! ```text
//! Sampling -> Evaluating -> Stable ------------------------------> guard -> publish
//!                 |
//!                 +-> Retrying (retry_delay) -> Sampling   (while rounds remain)
//!                 |
//!                 +-> Exhausted -> single fallback read --ok--> guard -> publish
//!                                                      \--err-> keep last value
//! ```
//!
//! The guard only lets a converged value confirm a held jump; a fallback read
//! beyond the change threshold is rejected.

use std::time::Duration;

use chrono::{DateTime, Utc};
use tokio::sync::watch;
use tokio::time::{Instant, sleep_until};
use tracing::{debug, info, warn};

use crate::data::feed::Fetcher;
use crate::domain::{Balance, BalanceEvent, EngineConfig, ValueSource};
use crate::error::{CycleError, FetchError};

pub mod convergence;
pub mod guard;
pub mod publish;

pub use convergence::{ConvergenceResult, RoundRecord, evaluate};
pub use guard::{GuardDecision, MagnitudeGuard, PendingCandidate};
pub use publish::{BalanceSubscriber, Publisher};

/// What the engine is doing right now (drives the "retrying/offline" display).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EngineStatus {
    Idle,
    Sampling { attempt: u32 },
    /// `disagreed` is false when the round produced no readings at all.
    Retrying { attempt: u32, disagreed: bool },
    Offline { consecutive_failures: u32 },
}

/// How a cycle ended.
#[derive(Debug, Clone, PartialEq)]
pub enum CycleOutcome {
    /// A new value replaced the published one.
    Published {
        value: Balance,
        source: ValueSource,
        /// The value cleared a held large jump.
        confirmed: bool,
    },
    /// The candidate equals what is already published.
    Unchanged { value: Balance },
    /// A large jump is waiting for confirmation.
    Held { candidate: Balance, change: f64 },
    /// A fallback read jumped too far to publish without a convergence.
    Rejected { candidate: Balance, change: f64 },
    /// No value at all this cycle; the published value is kept.
    Exhausted(CycleError),
    /// Shutdown arrived during a delay.
    Cancelled,
}

#[derive(Debug, Clone, PartialEq)]
pub struct CycleReport {
    pub feed: String,
    pub started_at: DateTime<Utc>,
    pub elapsed: Duration,
    pub rounds: Vec<RoundRecord>,
    /// Set when every round failed and the single best-effort read was tried.
    pub fallback: Option<Result<Balance, FetchError>>,
    pub outcome: CycleOutcome,
}

/// Read-only view of the engine for diagnostics.
#[derive(Debug, Clone)]
pub struct EngineState {
    pub feed: String,
    pub published: Option<BalanceEvent>,
    pub pending: Option<PendingCandidate>,
    pub consecutive_failures: u32,
    pub last_report: Option<CycleReport>,
}

/// Upper bound on a single delay; keeps the deadline representable.
const MAX_PAUSE: Duration = Duration::from_secs(365 * 24 * 3600);

#[derive(Debug)]
struct Cancelled;

pub struct Engine {
    feed: String,
    fetcher: Box<dyn Fetcher>,
    config: EngineConfig,
    publisher: Publisher,
    guard: MagnitudeGuard,
    consecutive_failures: u32,
    status: watch::Sender<EngineStatus>,
    shutdown: Option<watch::Receiver<bool>>,
    last_report: Option<CycleReport>,
}

impl Engine {
    pub fn new(feed: impl Into<String>, fetcher: Box<dyn Fetcher>, config: EngineConfig) -> Self {
        let feed = feed.into();
        let (status, _) = watch::channel(EngineStatus::Idle);
        Self {
            publisher: Publisher::new(feed.clone()),
            guard: MagnitudeGuard::new(config.change_threshold, config.confirm_window),
            feed,
            fetcher,
            config,
            consecutive_failures: 0,
            status,
            shutdown: None,
            last_report: None,
        }
    }

    /// Delays select on this signal; `true` cancels the running cycle.
    pub fn with_shutdown(mut self, shutdown: watch::Receiver<bool>) -> Self {
        self.shutdown = Some(shutdown);
        self
    }

    pub fn feed(&self) -> &str {
        &self.feed
    }

    pub fn on_balance_published(&mut self, subscriber: impl BalanceSubscriber + 'static) {
        self.publisher.on_balance_published(subscriber);
    }

    pub fn published(&self) -> Option<BalanceEvent> {
        self.publisher.latest()
    }

    pub fn subscribe_published(&self) -> watch::Receiver<Option<BalanceEvent>> {
        self.publisher.subscribe_latest()
    }

    pub fn subscribe_status(&self) -> watch::Receiver<EngineStatus> {
        self.status.subscribe()
    }

    /// Start from a last-known-good value (e.g. the persisted snapshot).
    pub fn seed(&mut self, event: BalanceEvent) {
        self.publisher.seed(event);
    }

    pub fn state(&self) -> EngineState {
        EngineState {
            feed: self.feed.clone(),
            published: self.publisher.latest(),
            pending: self.guard.pending().copied(),
            consecutive_failures: self.consecutive_failures,
            last_report: self.last_report.clone(),
        }
    }

    /// Run one update cycle to completion (or until shutdown).
    pub async fn run_cycle(&mut self) -> CycleReport {
        let started_at = Utc::now();
        let clock = Instant::now();

        if let Some(expired) = self.guard.expire(clock) {
            info!(
                feed = %self.feed,
                candidate = expired.value.value(),
                "pending candidate expired unconfirmed"
            );
        }

        let mut rounds = Vec::new();
        let mut fallback = None;
        let outcome = match self.converge(&mut rounds, &mut fallback).await {
            Err(Cancelled) => CycleOutcome::Cancelled,
            Ok(Some((value, source))) => self.commit(value, source),
            Ok(None) => self.record_failure(rounds.len() as u32),
        };

        let status = match outcome {
            CycleOutcome::Exhausted(_) => EngineStatus::Offline {
                consecutive_failures: self.consecutive_failures,
            },
            _ => EngineStatus::Idle,
        };
        self.status.send_replace(status);

        let report = CycleReport {
            feed: self.feed.clone(),
            started_at,
            elapsed: clock.elapsed(),
            rounds,
            fallback,
            outcome,
        };
        self.last_report = Some(report.clone());
        report
    }

    /// Rounds until a stable value, or the fallback read once rounds run out.
    async fn converge(
        &mut self,
        rounds: &mut Vec<RoundRecord>,
        fallback: &mut Option<Result<Balance, FetchError>>,
    ) -> Result<Option<(Balance, ValueSource)>, Cancelled> {
        let max_attempts = self.config.max_attempts.max(1);

        for attempt in 1..=max_attempts {
            self.status.send_replace(EngineStatus::Sampling { attempt });
            let record = self.sample_round(attempt).await?;
            let stable = record.result.stable_value();
            let disagreed = matches!(record.result, ConvergenceResult::Unstable(_));

            match &record.result {
                ConvergenceResult::Stable(v) => {
                    debug!(feed = %self.feed, attempt, value = v.value(), "round converged");
                }
                ConvergenceResult::Unstable(_) => {
                    info!(feed = %self.feed, attempt, error = ?record.result.error(), "round disagreed");
                }
                ConvergenceResult::Empty => {
                    warn!(feed = %self.feed, attempt, "round produced no readings");
                }
            }
            rounds.push(record);

            if let Some(value) = stable {
                return Ok(Some((value, ValueSource::Converged)));
            }
            if attempt < max_attempts {
                self.status.send_replace(EngineStatus::Retrying { attempt, disagreed });
                self.pause(self.config.retry_delay).await?;
            }
        }

        warn!(feed = %self.feed, rounds = max_attempts, "no consensus, trying a single read");
        let read = self.fetcher.fetch().await;
        *fallback = Some(read.clone());
        match read {
            Ok(value) => Ok(Some((value, ValueSource::Fallback))),
            Err(err) => {
                warn!(feed = %self.feed, error = %err, "fallback read failed");
                Ok(None)
            }
        }
    }

    async fn sample_round(&mut self, attempt: u32) -> Result<RoundRecord, Cancelled> {
        let mut samples = Vec::new();
        let mut failures = Vec::new();

        for i in 0..self.config.sample_count {
            if i > 0 {
                self.pause(self.config.sample_delay).await?;
            }
            match self.fetcher.fetch().await {
                Ok(value) => samples.push(value),
                Err(err) => {
                    debug!(feed = %self.feed, attempt, sample = i + 1, kind = err.kind(), error = %err, "sample failed");
                    failures.push(err);
                }
            }
        }

        let result = evaluate(&samples);
        Ok(RoundRecord {
            attempt,
            samples,
            failures,
            result,
        })
    }

    fn commit(&mut self, value: Balance, source: ValueSource) -> CycleOutcome {
        self.consecutive_failures = 0;
        let current = self.publisher.current_value();

        match self.guard.check(value, source, current, Instant::now()) {
            GuardDecision::Hold { change, replaced } => {
                info!(
                    feed = %self.feed,
                    candidate = value.value(),
                    change_pct = change * 100.0,
                    replaced,
                    "large change held for confirmation"
                );
                CycleOutcome::Held {
                    candidate: value,
                    change,
                }
            }
            GuardDecision::Reject { change } => {
                warn!(
                    feed = %self.feed,
                    candidate = value.value(),
                    change_pct = change * 100.0,
                    "large change from a single read ignored"
                );
                CycleOutcome::Rejected {
                    candidate: value,
                    change,
                }
            }
            GuardDecision::Commit { confirmed } => {
                if current.is_some_and(|c| c.same_as(value)) {
                    debug!(feed = %self.feed, value = value.value(), "value unchanged");
                    return CycleOutcome::Unchanged { value };
                }
                let event = self.publisher.publish(value, source);
                info!(
                    feed = %self.feed,
                    value = value.value(),
                    formatted = %event.formatted_text,
                    source = source.label(),
                    confirmed,
                    "balance published"
                );
                CycleOutcome::Published {
                    value,
                    source,
                    confirmed,
                }
            }
        }
    }

    fn record_failure(&mut self, attempts: u32) -> CycleOutcome {
        self.consecutive_failures += 1;
        if self.consecutive_failures >= self.config.failure_reset_threshold.max(1) {
            if let Some(dropped) = self.guard.reset() {
                info!(
                    feed = %self.feed,
                    failures = self.consecutive_failures,
                    candidate = dropped.value.value(),
                    "dropping pending candidate after repeated failures"
                );
            }
        }
        warn!(
            feed = %self.feed,
            failures = self.consecutive_failures,
            "cycle produced no value, keeping last known balance"
        );
        CycleOutcome::Exhausted(CycleError::Exhausted { attempts })
    }

    /// Sleep, unless shutdown is signalled first.
    async fn pause(&mut self, duration: Duration) -> Result<(), Cancelled> {
        let deadline = Instant::now() + duration.min(MAX_PAUSE);
        let Some(shutdown) = self.shutdown.as_mut() else {
            sleep_until(deadline).await;
            return Ok(());
        };
        if *shutdown.borrow() {
            return Err(Cancelled);
        }

        let signalled = tokio::select! {
            _ = sleep_until(deadline) => return Ok(()),
            res = shutdown.wait_for(|stop| *stop) => res.is_ok(),
        };
        if signalled {
            return Err(Cancelled);
        }
        // The sender is gone, so nobody can signal shutdown any more.
        sleep_until(deadline).await;
        Ok(())
    }
}
