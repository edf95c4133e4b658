//! Start transaction for the pipeline
//!
//! Starting acquires resources in a fixed order. Each step consumes the previous
//! state, so a half-started pipeline can only be finished or rolled back.
//!
//! ```text
//! Pending ──► PublishersStarted ──► Subscribed ──► Connected
//!                   │                    │
//!                   └──── rollback ◄─────┘
//! ```

use super::dispatch::Shared;
use super::error::{PipelineError, PipelineFault};
use super::{start_publisher, stop_publisher, PublisherId};
use crate::event::Event;
use crate::source::{Source, SubscriptionId};
use statum::{machine, state};
use std::sync::atomic::Ordering;
use std::sync::{Arc, Weak};
use tracing::{debug, error, info, warn};

#[state]
#[derive(Debug, Clone)]
pub enum StartupState {
    Pending,
    PublishersStarted,
    Subscribed,
    Connected,
}

#[machine]
pub struct Startup<S: StartupState> {
    source: Arc<dyn Source>,
    shared: Arc<Shared>,
    started: Vec<PublisherId>,
    subscription: Option<SubscriptionId>,
}

impl<S: StartupState> Startup<S> {
    /// Undoes every step taken so far, in reverse order
    fn rollback(self) {
        warn!("Rolling back pipeline start");
        self.shared.accepting.store(false, Ordering::SeqCst);

        if let Some(id) = self.subscription {
            self.source.unsubscribe(id);
        }

        let faults: Vec<PipelineFault> = self
            .shared
            .lock()
            .publishers
            .iter()
            .rev()
            .filter(|slot| self.started.contains(&slot.id))
            .filter_map(|slot| stop_publisher(slot.publisher.as_ref()).err())
            .collect();
        for fault in &faults {
            self.shared.report(fault);
        }
    }
}

impl Startup<Pending> {
    pub fn begin(source: Arc<dyn Source>, shared: Arc<Shared>) -> Self {
        debug!("Starting pipeline on source {}", source.source_id());
        Self::new(source, shared, Vec::new(), None)
    }

    /// Resets counters and processor state, then starts every publisher
    pub fn start_publishers(mut self) -> Result<Startup<PublishersStarted>, PipelineError> {
        let failure = {
            let mut dispatch = self.shared.lock();
            dispatch.reset();

            let mut failure = None;
            for slot in &dispatch.publishers {
                match start_publisher(slot.publisher.as_ref()) {
                    Ok(()) => {
                        debug!("Publisher {} started", slot.publisher.name());
                        self.started.push(slot.id);
                    }
                    Err(e) => {
                        failure = Some(e);
                        break;
                    }
                }
            }
            failure
        };

        match failure {
            Some(e) => {
                self.rollback();
                Err(e)
            }
            None => Ok(self.transition()),
        }
    }
}

impl Startup<PublishersStarted> {
    /// Registers the dispatch callback and opens the pipeline for events
    pub fn subscribe(mut self) -> Startup<Subscribed> {
        self.shared.accepting.store(true, Ordering::SeqCst);

        let shared: Weak<Shared> = Arc::downgrade(&self.shared);
        let id = self.source.subscribe(Arc::new(move |event: Event| {
            if let Some(shared) = shared.upgrade() {
                shared.handle(event);
            }
        }));
        debug!("Subscribed to source as {:?}", id);

        self.subscription = Some(id);
        self.transition()
    }
}

impl Startup<Subscribed> {
    pub fn connect(self) -> Result<Startup<Connected>, PipelineError> {
        match self.source.connect() {
            Ok(()) => Ok(self.transition()),
            Err(e) => {
                error!("Source {} failed to connect: {}", self.source.source_id(), e);
                self.rollback();
                Err(PipelineError::SourceConnect(e))
            }
        }
    }
}

impl Startup<Connected> {
    /// Completes the transaction and hands back the subscription to release on stop
    pub fn finish(self) -> Option<SubscriptionId> {
        info!("Pipeline started on source {}", self.source.source_id());
        self.subscription
    }
}
