//! Pipeline orchestrator
//!
//! Owns one source, an ordered processor chain and a set of publishers, and
//! drives their lifecycle.
//!
//! # Architecture
//!
//! ```text
//! Source ──callback──► [Processor 1] ──► ... ──► [Processor N] ──┬──► Publisher A
//!                                                                └──► Publisher B
//! ```
//!
//! Events are processed synchronously on the thread that delivered them. A
//! single dispatch lock guards both the chain traversal with its fan-out and
//! every list mutation, so events are handled strictly in arrival order and
//! reconfiguration never races a dispatch. A slow publisher therefore slows
//! down the source's delivery loop.
//!
//! Lifecycle calls (`start`, `stop`, adding or removing publishers) are
//! serialized by a separate lock that is never held by the dispatch path, so
//! `stop` can wait for the source's worker to finish without deadlocking.

mod dispatch;
pub mod error;
mod startup;
pub mod stats;

pub use error::{DispatchError, PipelineError, PipelineFault};
pub use stats::{PublisherStatistics, Statistics};

use crate::event::Event;
use crate::processor::Processor;
use crate::publisher::{Publisher, PublisherError};
use crate::source::{Source, SubscriptionId};
use dispatch::{panic_message, PublisherSlot, Shared, Stage};
use startup::{Pending, Startup};
use std::fmt;
use std::panic::{self, AssertUnwindSafe};
use std::sync::atomic::Ordering;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use tracing::{debug, error, info, warn};

/// Observer for non-fatal failures, called after the failing dispatch completes
pub type ErrorHook = Arc<dyn Fn(&PipelineFault) + Send + Sync>;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct StageId(u64);

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct PublisherId(u64);

impl fmt::Display for StageId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "stage-{}", self.0)
    }
}

impl fmt::Display for PublisherId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "publisher-{}", self.0)
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum PipelineState {
    #[default]
    Created,
    Started,
    Stopped,
}

/// What happened to a single event
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Outcome {
    /// Arrived while the pipeline was not running
    Ignored,
    /// Filtered out or failed inside the processor chain
    Dropped,
    /// Reached the fan-out; carries the number of publishers that accepted it
    Dispatched(usize),
}

#[derive(Default)]
struct Lifecycle {
    state: PipelineState,
    subscription: Option<SubscriptionId>,
}

pub struct Pipeline {
    source: Arc<dyn Source>,
    shared: Arc<Shared>,
    lifecycle: Mutex<Lifecycle>,
}

impl Pipeline {
    pub fn new(source: Arc<dyn Source>) -> Self {
        Self {
            source,
            shared: Arc::new(Shared::default()),
            lifecycle: Mutex::new(Lifecycle::default()),
        }
    }

    fn lifecycle(&self) -> MutexGuard<'_, Lifecycle> {
        self.lifecycle.lock().unwrap_or_else(PoisonError::into_inner)
    }

    pub fn source(&self) -> &Arc<dyn Source> {
        &self.source
    }

    pub fn state(&self) -> PipelineState {
        self.lifecycle().state
    }

    pub fn is_running(&self) -> bool {
        self.state() == PipelineState::Started
    }

    /// Starts publishers, subscribes to the source and connects it.
    ///
    /// A failing publisher or source connection aborts the start and stops every
    /// publisher that was already started.
    pub fn start(&self) -> Result<(), PipelineError> {
        let mut lifecycle = self.lifecycle();
        if lifecycle.state == PipelineState::Started {
            return Err(PipelineError::AlreadyStarted);
        }

        info!("Starting pipeline");
        let subscription = Startup::<Pending>::begin(self.source.clone(), self.shared.clone())
            .start_publishers()?
            .subscribe()
            .connect()?
            .finish();

        lifecycle.subscription = subscription;
        lifecycle.state = PipelineState::Started;
        Ok(())
    }

    /// Disconnects the source, unsubscribes and stops every publisher.
    ///
    /// Failures are logged and reported through the error hook; stopping always
    /// completes. A no-op when the pipeline is not running.
    pub fn stop(&self) -> Result<(), PipelineError> {
        let mut lifecycle = self.lifecycle();
        if lifecycle.state != PipelineState::Started {
            debug!("Pipeline not running, nothing to stop");
            return Ok(());
        }

        info!("Stopping pipeline");
        if let Err(e) = self.source.disconnect() {
            error!("Source {} failed to disconnect: {}", self.source.source_id(), e);
            self.shared.report(&PipelineFault::SourceDisconnect(e));
        }
        if let Some(id) = lifecycle.subscription.take() {
            self.source.unsubscribe(id);
        }
        self.shared.accepting.store(false, Ordering::SeqCst);

        let faults: Vec<PipelineFault> = {
            let mut dispatch = self.shared.lock();
            let faults = dispatch
                .publishers
                .iter()
                .filter_map(|slot| stop_publisher(slot.publisher.as_ref()).err())
                .collect();
            dispatch.reset_processors();
            faults
        };
        for fault in &faults {
            self.shared.report(fault);
        }

        lifecycle.state = PipelineState::Stopped;
        info!("Pipeline stopped: {}", self.shared.lock().snapshot());
        Ok(())
    }

    /// Dispatches an event as if the source had delivered it
    pub fn inject(&self, event: Event) -> Result<Outcome, PipelineError> {
        if !self.shared.is_accepting() {
            return Err(PipelineError::NotStarted);
        }
        match self.shared.handle(event) {
            Outcome::Ignored => Err(PipelineError::NotStarted),
            outcome => Ok(outcome),
        }
    }

    /// Appends a processor to the end of the chain
    pub fn add_processor(&self, processor: Box<dyn Processor>) -> StageId {
        let mut dispatch = self.shared.lock();
        let id = StageId(dispatch.next_id());
        debug!("Adding processor {} as {}", processor.name(), id);
        dispatch.stages.push(Stage { id, processor });
        id
    }

    pub fn remove_processor(&self, id: StageId) -> bool {
        let mut dispatch = self.shared.lock();
        let before = dispatch.stages.len();
        dispatch.stages.retain(|stage| stage.id != id);
        before != dispatch.stages.len()
    }

    /// Adds a publisher, starting it right away when the pipeline is running
    pub fn add_publisher(&self, publisher: Box<dyn Publisher>) -> Result<PublisherId, PipelineError> {
        let lifecycle = self.lifecycle();
        if lifecycle.state == PipelineState::Started {
            start_publisher(publisher.as_ref())?;
        }

        let mut dispatch = self.shared.lock();
        let id = PublisherId(dispatch.next_id());
        debug!("Adding publisher {} as {}", publisher.name(), id);
        let stats = PublisherStatistics::new(publisher.name());
        dispatch.publishers.push(PublisherSlot {
            id,
            publisher,
            stats,
        });
        Ok(id)
    }

    /// Removes a publisher, stopping it when the pipeline is running
    pub fn remove_publisher(&self, id: PublisherId) -> bool {
        let lifecycle = self.lifecycle();
        let slot = {
            let mut dispatch = self.shared.lock();
            match dispatch.publishers.iter().position(|slot| slot.id == id) {
                Some(index) => dispatch.publishers.remove(index),
                None => return false,
            }
        };

        if lifecycle.state == PipelineState::Started {
            if let Err(fault) = stop_publisher(slot.publisher.as_ref()) {
                self.shared.report(&fault);
            }
        }
        true
    }

    pub fn processor_names(&self) -> Vec<String> {
        self.shared
            .lock()
            .stages
            .iter()
            .map(|stage| stage.processor.name().to_string())
            .collect()
    }

    pub fn publisher_names(&self) -> Vec<String> {
        self.shared
            .lock()
            .publishers
            .iter()
            .map(|slot| slot.publisher.name().to_string())
            .collect()
    }

    /// Snapshot of the counters of the current run
    pub fn statistics(&self) -> Statistics {
        self.shared.lock().snapshot()
    }

    pub fn set_error_hook<F>(&self, hook: F)
    where
        F: Fn(&PipelineFault) + Send + Sync + 'static,
    {
        self.shared.set_error_hook(Some(Arc::new(hook)));
    }

    pub fn clear_error_hook(&self) {
        self.shared.set_error_hook(None);
    }
}

impl Drop for Pipeline {
    fn drop(&mut self) {
        if let Err(e) = self.stop() {
            warn!("Failed to stop pipeline on drop: {}", e);
        }
    }
}

fn start_publisher(publisher: &dyn Publisher) -> Result<(), PipelineError> {
    panic::catch_unwind(AssertUnwindSafe(|| publisher.start()))
        .unwrap_or_else(|payload| Err(PublisherError::Panicked(panic_message(payload.as_ref()))))
        .map_err(|source| {
            error!("Publisher {} failed to start: {}", publisher.name(), source);
            PipelineError::PublisherStart {
                publisher: publisher.name().to_string(),
                source,
            }
        })
}

fn stop_publisher(publisher: &dyn Publisher) -> Result<(), PipelineFault> {
    panic::catch_unwind(AssertUnwindSafe(|| publisher.stop()))
        .unwrap_or_else(|payload| Err(PublisherError::Panicked(panic_message(payload.as_ref()))))
        .map_err(|source| {
            error!("Publisher {} failed to stop: {}", publisher.name(), source);
            PipelineFault::PublisherStop {
                publisher: publisher.name().to_string(),
                source,
            }
        })
}
