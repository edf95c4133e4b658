//! Chain traversal and publisher fan-out shared between the pipeline and its source callback

use super::error::{DispatchError, PipelineFault};
use super::stats::{PublisherStatistics, Statistics};
use super::{ErrorHook, Outcome, PublisherId, StageId};
use crate::event::Event;
use crate::processor::{Processor, ProcessorError};
use crate::publisher::{Publisher, PublisherError};
use std::any::Any;
use std::panic::{self, AssertUnwindSafe};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Mutex, MutexGuard, PoisonError, RwLock};
use tracing::{debug, error, warn};

pub struct Stage {
    pub id: StageId,
    pub processor: Box<dyn Processor>,
}

pub struct PublisherSlot {
    pub id: PublisherId,
    pub publisher: Box<dyn Publisher>,
    pub stats: PublisherStatistics,
}

/// Everything one dispatch touches. Guarded by a single mutex so list mutation
/// never interleaves with a traversal.
#[derive(Default)]
pub struct Dispatch {
    pub stages: Vec<Stage>,
    pub publishers: Vec<PublisherSlot>,
    pub stats: Statistics,
    next_id: u64,
}

impl Dispatch {
    pub fn next_id(&mut self) -> u64 {
        self.next_id += 1;
        self.next_id
    }

    pub fn reset(&mut self) {
        self.stats.reset();
        for slot in &mut self.publishers {
            slot.stats.reset();
        }
        self.reset_processors();
    }

    pub fn reset_processors(&mut self) {
        for stage in &mut self.stages {
            if let Err(payload) = panic::catch_unwind(AssertUnwindSafe(|| stage.processor.reset())) {
                error!(
                    "Processor {} panicked during reset: {}",
                    stage.processor.name(),
                    panic_message(payload.as_ref())
                );
            }
        }
    }

    pub fn snapshot(&self) -> Statistics {
        let mut stats = self.stats.clone();
        stats.publishers = self.publishers.iter().map(|s| s.stats.clone()).collect();
        stats
    }

    fn run(&mut self, event: Event, faults: &mut Vec<PipelineFault>) -> Outcome {
        self.stats.received += 1;

        let mut current = event;
        for stage in &mut self.stages {
            let result = panic::catch_unwind(AssertUnwindSafe(|| stage.processor.process(current)))
                .unwrap_or_else(|payload| {
                    Err(ProcessorError::ProcessingFailed(format!(
                        "panicked: {}",
                        panic_message(payload.as_ref())
                    )))
                });

            match result {
                Ok(Some(next)) => current = next,
                Ok(None) => {
                    debug!("Event dropped by {}", stage.processor.name());
                    self.stats.dropped += 1;
                    return Outcome::Dropped;
                }
                Err(e) => {
                    error!("Processor {} failed, dropping event: {}", stage.processor.name(), e);
                    self.stats.dropped += 1;
                    self.stats.processor_errors += 1;
                    faults.push(PipelineFault::Processor {
                        processor: stage.processor.name().to_string(),
                        source: e,
                    });
                    return Outcome::Dropped;
                }
            }
        }

        self.stats.processed += 1;
        debug!("Dispatching {}", current);

        let mut delivered = 0;
        for slot in &mut self.publishers {
            let ready = match panic::catch_unwind(AssertUnwindSafe(|| slot.publisher.is_ready())) {
                Ok(ready) => ready,
                Err(payload) => {
                    let failure = DispatchError {
                        publisher: slot.publisher.name().to_string(),
                        source: PublisherError::Panicked(panic_message(payload.as_ref())),
                    };
                    error!("Readiness check failed: {}", failure);
                    faults.push(failure.into());
                    false
                }
            };
            if !ready {
                slot.stats.skipped_not_ready += 1;
                continue;
            }

            slot.stats.dispatched += 1;
            let result = panic::catch_unwind(AssertUnwindSafe(|| slot.publisher.publish(&current)))
                .unwrap_or_else(|payload| {
                    Err(PublisherError::Panicked(panic_message(payload.as_ref())))
                });

            match result {
                Ok(()) => delivered += 1,
                Err(e) => {
                    slot.stats.failed += 1;
                    let failure = DispatchError {
                        publisher: slot.publisher.name().to_string(),
                        source: e,
                    };
                    error!("{}", failure);
                    faults.push(failure.into());
                }
            }
        }

        Outcome::Dispatched(delivered)
    }
}

/// State reachable from the source callback
#[derive(Default)]
pub struct Shared {
    pub accepting: AtomicBool,
    dispatch: Mutex<Dispatch>,
    error_hook: RwLock<Option<ErrorHook>>,
}

impl Shared {
    pub fn lock(&self) -> MutexGuard<'_, Dispatch> {
        self.dispatch.lock().unwrap_or_else(PoisonError::into_inner)
    }

    pub fn is_accepting(&self) -> bool {
        self.accepting.load(Ordering::SeqCst)
    }

    pub fn set_error_hook(&self, hook: Option<ErrorHook>) {
        *self.error_hook.write().unwrap_or_else(PoisonError::into_inner) = hook;
    }

    /// Runs one event through the chain and the fan-out.
    ///
    /// Faults are reported after the dispatch lock is released, so the hook may
    /// query the pipeline.
    pub fn handle(&self, event: Event) -> Outcome {
        let mut faults = Vec::new();
        let outcome = {
            let mut dispatch = self.lock();
            if !self.is_accepting() {
                debug!("Pipeline not running, ignoring {}", event.kind());
                return Outcome::Ignored;
            }
            dispatch.run(event, &mut faults)
        };

        for fault in &faults {
            self.report(fault);
        }
        outcome
    }

    pub fn report(&self, fault: &PipelineFault) {
        let hook = self
            .error_hook
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .clone();
        if let Some(hook) = hook {
            if panic::catch_unwind(AssertUnwindSafe(|| hook(fault))).is_err() {
                warn!("Error hook panicked while reporting: {}", fault);
            }
        }
    }
}

pub fn panic_message(payload: &(dyn Any + Send)) -> String {
    if let Some(message) = payload.downcast_ref::<&str>() {
        (*message).to_string()
    } else if let Some(message) = payload.downcast_ref::<String>() {
        message.clone()
    } else {
        "unknown panic".to_string()
    }
}
