//! Synchronous in-process event bus.
//!
//! Handlers run on the publishing thread, in subscription order. A failing
//! or panicking handler is logged and never reaches the publisher.

use chrono::{DateTime, Utc};
use dashmap::DashMap;
use serde::Serialize;
use std::fmt;
use std::panic::{self, AssertUnwindSafe};
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use strum_macros::{AsRefStr, Display, EnumString};
use uuid::Uuid;

type Handler = dyn Fn(&Event) -> anyhow::Result<()> + Send + Sync;

/// An immutable notification.
#[derive(Debug, Clone, Serialize)]
pub struct Event {
    pub id: Uuid,
    pub kind: String,
    pub payload: serde_json::Value,
    pub timestamp: DateTime<Utc>,
}

impl Event {
    pub fn new(kind: impl Into<String>, payload: serde_json::Value) -> Self {
        Self {
            id: Uuid::new_v4(),
            kind: kind.into(),
            payload,
            timestamp: Utc::now(),
        }
    }

    /// Event whose payload is `data` serialized to JSON.
    pub fn from_data<T: Serialize>(kind: impl Into<String>, data: &T) -> serde_json::Result<Self> {
        Ok(Self::new(kind, serde_json::to_value(data)?))
    }
}

/// Event kinds published by the container itself.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Display, EnumString, AsRefStr)]
pub enum ContainerEvent {
    /// Startup finished; every eager singleton is ready.
    #[strum(serialize = "container.refreshed")]
    Refreshed,
    /// Shutdown began; destroy hooks run next.
    #[strum(serialize = "container.closed")]
    Closed,
}

/// Which events a subscription receives.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum EventFilter {
    Kind(String),
    Any,
}

impl EventFilter {
    pub fn kind(kind: impl Into<String>) -> Self {
        Self::Kind(kind.into())
    }

    pub fn matches(&self, event: &Event) -> bool {
        match self {
            Self::Kind(kind) => *kind == event.kind,
            Self::Any => true,
        }
    }
}

impl From<ContainerEvent> for EventFilter {
    fn from(kind: ContainerEvent) -> Self {
        Self::Kind(kind.to_string())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct SubscriptionId(Uuid);

impl fmt::Display for SubscriptionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.0.fmt(f)
    }
}

#[derive(Clone)]
struct Subscription {
    id: SubscriptionId,
    seq: u64,
    handler: Arc<Handler>,
}

/// A simple in-memory event bus.
///
/// Cloning is cheap; clones share subscriptions.
#[derive(Clone)]
pub struct EventBus {
    subscriptions: Arc<DashMap<EventFilter, Vec<Subscription>>>,
    next_seq: Arc<AtomicU64>,
}

impl Default for EventBus {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Debug for EventBus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("EventBus")
            .field("subscribers", &self.subscriber_count())
            .finish()
    }
}

impl EventBus {
    pub fn new() -> Self {
        Self {
            subscriptions: Arc::new(DashMap::new()),
            next_seq: Arc::new(AtomicU64::new(0)),
        }
    }

    /// Register `handler` for events matching `filter`.
    pub fn subscribe<F>(&self, filter: impl Into<EventFilter>, handler: F) -> SubscriptionId
    where
        F: Fn(&Event) -> anyhow::Result<()> + Send + Sync + 'static,
    {
        let id = SubscriptionId(Uuid::new_v4());
        let subscription = Subscription {
            id,
            seq: self.next_seq.fetch_add(1, Ordering::SeqCst),
            handler: Arc::new(handler),
        };
        self.subscriptions
            .entry(filter.into())
            .or_default()
            .push(subscription);
        id
    }

    /// Returns `false` if the subscription was already gone.
    pub fn unsubscribe(&self, id: SubscriptionId) -> bool {
        let mut removed = false;
        for mut entry in self.subscriptions.iter_mut() {
            let before = entry.len();
            entry.retain(|s| s.id != id);
            removed |= entry.len() != before;
        }
        removed
    }

    /// Invoke every matching handler, returning how many ran.
    ///
    /// Handler failures are logged; they neither stop the fan-out nor
    /// propagate to the caller.
    pub fn publish(&self, event: &Event) -> usize {
        let mut targets: Vec<Subscription> = Vec::new();
        if let Some(list) = self.subscriptions.get(&EventFilter::Kind(event.kind.clone())) {
            targets.extend(list.iter().cloned());
        }
        if let Some(list) = self.subscriptions.get(&EventFilter::Any) {
            targets.extend(list.iter().cloned());
        }
        // Snapshot released before handlers run, so they may (un)subscribe.
        targets.sort_by_key(|s| s.seq);

        tracing::debug!("Publishing '{}' to {} handlers", event.kind, targets.len());
        for subscription in &targets {
            match panic::catch_unwind(AssertUnwindSafe(|| (subscription.handler)(event))) {
                Ok(Ok(())) => {}
                Ok(Err(e)) => tracing::error!(
                    "Handler {} failed on '{}': {:#}",
                    subscription.id,
                    event.kind,
                    e
                ),
                Err(_) => tracing::error!(
                    "Handler {} panicked on '{}'",
                    subscription.id,
                    event.kind
                ),
            }
        }
        targets.len()
    }

    pub fn subscriber_count(&self) -> usize {
        self.subscriptions.iter().map(|e| e.len()).sum()
    }
}
