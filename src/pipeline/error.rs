use crate::processor::ProcessorError;
use crate::publisher::PublisherError;
use crate::source::SourceError;

/// Lifecycle errors surfaced to callers of the pipeline
#[derive(Debug, thiserror::Error)]
pub enum PipelineError {
    #[error("Pipeline already started")]
    AlreadyStarted,

    #[error("Pipeline not started")]
    NotStarted,

    #[error("Publisher {publisher} failed to start: {source}")]
    PublisherStart {
        publisher: String,
        source: PublisherError,
    },

    #[error("Source failed to connect: {0}")]
    SourceConnect(#[source] SourceError),
}

/// A single publisher's failure while publishing one event.
///
/// Never propagated to the source; the event still reaches the remaining publishers.
#[derive(Debug, thiserror::Error)]
#[error("Publisher {publisher} failed to publish: {source}")]
pub struct DispatchError {
    pub publisher: String,
    pub source: PublisherError,
}

/// Non-fatal failures reported through the error hook
#[derive(Debug, thiserror::Error)]
pub enum PipelineFault {
    #[error(transparent)]
    Dispatch(#[from] DispatchError),

    #[error("Processor {processor} failed: {source}")]
    Processor {
        processor: String,
        source: ProcessorError,
    },

    #[error("Publisher {publisher} failed to stop: {source}")]
    PublisherStop {
        publisher: String,
        source: PublisherError,
    },

    #[error("Source failed to disconnect: {0}")]
    SourceDisconnect(#[source] SourceError),
}
