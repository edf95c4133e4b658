//! Event sources
//!
//! A source delivers events from its own background context to every
//! registered callback. The pipeline registers exactly one callback.
//!
//! Lifecycle of a source as driven by the pipeline:
//!
//! ```text
//! subscribe ──► connect ──► (events) ──► disconnect ──► unsubscribe
//! ```

pub mod mock;

pub use mock::{create_script, replay_script, MockMode, MockSource, ScriptedEvent};

use crate::event::Event;
use std::collections::BTreeMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, PoisonError};

/// Callback invoked by a source for every emitted event
pub type EventCallback = Arc<dyn Fn(Event) + Send + Sync>;

/// Handle returned by [`Source::subscribe`], used to unsubscribe again
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct SubscriptionId(u64);

// Source errors
#[derive(Debug, thiserror::Error)]
pub enum SourceError {
    #[error("Failed to connect source {source_id}: {reason}")]
    ConnectionFailed { source_id: String, reason: String },

    #[error("Failed to disconnect source {source_id}: {reason}")]
    DisconnectFailed { source_id: String, reason: String },

    #[error("Source worker error: {0}")]
    WorkerError(String),
}

/// External signal producer.
///
/// After `connect` returns, events may be delivered at any time until
/// `disconnect` returns. Timestamps of delivered command events must not
/// decrease. `disconnect` must stop the delivery context before returning.
pub trait Source: Send + Sync {
    fn source_id(&self) -> &str;

    fn is_connected(&self) -> bool;

    fn connect(&self) -> Result<(), SourceError>;

    fn disconnect(&self) -> Result<(), SourceError>;

    fn subscribe(&self, callback: EventCallback) -> SubscriptionId;

    /// Returns `false` if `id` was not registered.
    fn unsubscribe(&self, id: SubscriptionId) -> bool;
}

/// Subscriber bookkeeping shared by source implementations.
#[derive(Default)]
pub struct SubscriberSet {
    next_id: AtomicU64,
    callbacks: Mutex<BTreeMap<SubscriptionId, EventCallback>>,
}

impl SubscriberSet {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn subscribe(&self, callback: EventCallback) -> SubscriptionId {
        let id = SubscriptionId(self.next_id.fetch_add(1, Ordering::Relaxed));
        self.callbacks
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .insert(id, callback);
        id
    }

    pub fn unsubscribe(&self, id: SubscriptionId) -> bool {
        self.callbacks
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .remove(&id)
            .is_some()
    }

    pub fn len(&self) -> usize {
        self.callbacks
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Delivers `event` to every subscriber in registration order.
    ///
    /// The callback list is snapshotted first, so callbacks may subscribe or
    /// unsubscribe without deadlocking.
    pub fn emit(&self, event: Event) {
        let callbacks: Vec<EventCallback> = self
            .callbacks
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .values()
            .cloned()
            .collect();

        let Some((last, rest)) = callbacks.split_last() else {
            return;
        };
        for callback in rest {
            callback(event.clone());
        }
        last(event);
    }
}

impl std::fmt::Debug for SubscriberSet {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SubscriberSet")
            .field("subscribers", &self.len())
            .finish()
    }
}
