//! Scheduler: one task per feed, each driving its own `Engine`.
//!
//! The periodic tick and manual refresh share one loop per feed, so cycles of
//! a feed never overlap. A refresh asked for while a cycle is running is
//! dropped, not queued.

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

use tokio::sync::{mpsc, watch};
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;
use tracing::{debug, info, warn};

use crate::domain::BalanceEvent;
use crate::engine::{CycleOutcome, Engine, EngineState, EngineStatus};
use crate::report::format_outcome;

/// Read side of one running feed, cheap to clone.
#[derive(Clone)]
pub struct FeedHandle {
    name: String,
    latest: watch::Receiver<Option<BalanceEvent>>,
    status: watch::Receiver<EngineStatus>,
    state: watch::Receiver<EngineState>,
    refresh: mpsc::Sender<()>,
    busy: Arc<AtomicBool>,
}

impl FeedHandle {
    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn current(&self) -> Option<BalanceEvent> {
        self.latest.borrow().clone()
    }

    pub fn status(&self) -> EngineStatus {
        *self.status.borrow()
    }

    /// Engine state as of the last finished cycle.
    pub fn state(&self) -> EngineState {
        self.state.borrow().clone()
    }

    pub fn subscribe_latest(&self) -> watch::Receiver<Option<BalanceEvent>> {
        self.latest.clone()
    }

    pub fn subscribe_status(&self) -> watch::Receiver<EngineStatus> {
        self.status.clone()
    }

    pub fn subscribe_state(&self) -> watch::Receiver<EngineState> {
        self.state.clone()
    }

    pub fn is_busy(&self) -> bool {
        self.busy.load(Ordering::SeqCst)
    }

    /// Ask for an immediate cycle. Returns `false` when the request was
    /// dropped (a cycle is running or one is already queued).
    pub fn refresh(&self) -> bool {
        if self.is_busy() {
            debug!(feed = %self.name, "refresh dropped, cycle in progress");
            return false;
        }
        self.refresh.try_send(()).is_ok()
    }
}

pub struct Monitor {
    feeds: Vec<FeedHandle>,
    shutdown: watch::Sender<bool>,
    tasks: Vec<JoinHandle<()>>,
}

impl Monitor {
    /// Spawn one task per engine. The first cycle starts right away.
    pub fn start(engines: Vec<Engine>, interval: Duration) -> Self {
        let (shutdown, shutdown_rx) = watch::channel(false);
        let mut feeds = Vec::with_capacity(engines.len());
        let mut tasks = Vec::with_capacity(engines.len());

        for engine in engines {
            let engine = engine.with_shutdown(shutdown_rx.clone());
            let (refresh_tx, refresh_rx) = mpsc::channel(1);
            let (state_tx, state_rx) = watch::channel(engine.state());
            let busy = Arc::new(AtomicBool::new(false));

            feeds.push(FeedHandle {
                name: engine.feed().to_string(),
                latest: engine.subscribe_published(),
                status: engine.subscribe_status(),
                state: state_rx,
                refresh: refresh_tx,
                busy: busy.clone(),
            });

            let task = FeedTask {
                engine,
                interval,
                refresh: refresh_rx,
                busy,
                state: state_tx,
                shutdown: shutdown_rx.clone(),
            };
            tasks.push(tokio::spawn(task.run()));
        }

        Self {
            feeds,
            shutdown,
            tasks,
        }
    }

    pub fn feeds(&self) -> &[FeedHandle] {
        &self.feeds
    }

    pub fn feed(&self, name: &str) -> Option<&FeedHandle> {
        self.feeds.iter().find(|f| f.name == name)
    }

    /// Cancel running delays and wait for every feed task to stop.
    pub async fn shutdown(self) {
        self.shutdown.send_replace(true);
        for task in self.tasks {
            if let Err(err) = task.await {
                warn!(error = %err, "feed task ended abnormally");
            }
        }
        info!("monitor stopped");
    }
}

struct FeedTask {
    engine: Engine,
    interval: Duration,
    refresh: mpsc::Receiver<()>,
    busy: Arc<AtomicBool>,
    state: watch::Sender<EngineState>,
    shutdown: watch::Receiver<bool>,
}

impl FeedTask {
    async fn run(mut self) {
        let feed = self.engine.feed().to_string();
        info!(feed = %feed, interval_secs = self.interval.as_secs_f64(), "feed task started");

        let mut ticker = tokio::time::interval(self.interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);

        loop {
            let manual = tokio::select! {
                biased;
                // Only `true` is ever sent; a dropped sender also means stop.
                _ = self.shutdown.changed() => break,
                _ = ticker.tick() => false,
                Some(()) = self.refresh.recv() => true,
            };

            self.busy.store(true, Ordering::SeqCst);
            let report = self.engine.run_cycle().await;
            // Anything that slipped in while the cycle ran is stale.
            while self.refresh.try_recv().is_ok() {}
            self.busy.store(false, Ordering::SeqCst);

            self.state.send_replace(self.engine.state());
            debug!(
                feed = %feed,
                manual,
                elapsed_ms = report.elapsed.as_millis() as u64,
                outcome = %format_outcome(&report.outcome),
                "cycle finished"
            );
            if report.outcome == CycleOutcome::Cancelled {
                break;
            }
        }

        info!(feed = %feed, "feed task stopped");
    }
}
