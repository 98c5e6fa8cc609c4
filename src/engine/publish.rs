//! PublishedBalance and its subscribers.
//!
//! The engine is the only writer. Readers either register a callback
//! (`on_balance_published`) or hold a `watch` receiver for the latest event;
//! the value is replaced whole, so a reader never sees a partial update.

use chrono::{SecondsFormat, Utc};
use tokio::sync::watch;

use crate::domain::{Balance, BalanceEvent, ValueSource};
use crate::report::format_rupiah;

/// Observer of publish events.
pub trait BalanceSubscriber: Send + Sync {
    fn on_balance_published(&self, event: &BalanceEvent);
}

impl<F> BalanceSubscriber for F
where
    F: Fn(&BalanceEvent) + Send + Sync,
{
    fn on_balance_published(&self, event: &BalanceEvent) {
        self(event)
    }
}

pub struct Publisher {
    feed: String,
    latest: watch::Sender<Option<BalanceEvent>>,
    subscribers: Vec<Box<dyn BalanceSubscriber>>,
}

impl Publisher {
    pub fn new(feed: impl Into<String>) -> Self {
        let (latest, _) = watch::channel(None);
        Self {
            feed: feed.into(),
            latest,
            subscribers: Vec::new(),
        }
    }

    pub fn on_balance_published(&mut self, subscriber: impl BalanceSubscriber + 'static) {
        self.subscribers.push(Box::new(subscriber));
    }

    pub fn latest(&self) -> Option<BalanceEvent> {
        self.latest.borrow().clone()
    }

    pub fn current_value(&self) -> Option<Balance> {
        self.latest.borrow().as_ref().map(|e| e.value)
    }

    pub fn subscribe_latest(&self) -> watch::Receiver<Option<BalanceEvent>> {
        self.latest.subscribe()
    }

    /// Install a last-known-good value without notifying callbacks.
    ///
    /// Watch receivers still see it, so a display can show it immediately.
    pub fn seed(&mut self, event: BalanceEvent) {
        self.latest.send_replace(Some(event));
    }

    pub(crate) fn publish(&mut self, value: Balance, source: ValueSource) -> BalanceEvent {
        let event = BalanceEvent {
            feed: self.feed.clone(),
            value,
            formatted_text: format_rupiah(value),
            timestamp: Utc::now().to_rfc3339_opts(SecondsFormat::Secs, true),
            source,
        };
        self.latest.send_replace(Some(event.clone()));
        for subscriber in &self.subscribers {
            subscriber.on_balance_published(&event);
        }
        event
    }
}
