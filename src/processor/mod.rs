//! Processor chain stages
//!
//! A stage receives one [`Event`] and either returns it (possibly transformed)
//! or returns `None` to drop it. The pipeline runs stages in order and stops at
//! the first one that drops.
//!
//! ```text
//! Event ──► Threshold ──► Debounce ──► Mapper ──► Publishers
//!              │              │
//!              ▼              ▼
//!           dropped        dropped
//! ```

pub mod debounce;
pub mod mapper;
pub mod threshold;

pub use debounce::{DebounceConfig, DebounceProcessor};
pub use mapper::{CommandMapper, MapperConfig};
pub use threshold::{ThresholdConfig, ThresholdProcessor};

use crate::event::Event;

// Processor errors
#[derive(Debug, Clone, thiserror::Error)]
pub enum ProcessorError {
    #[error("Invalid processor configuration: {0}")]
    InvalidConfig(String),

    #[error("Failed to process event: {0}")]
    ProcessingFailed(String),
}

/// A single filter or transform stage.
///
/// `process` runs on the source's delivery thread with the pipeline's dispatch
/// lock held, so implementations never see two events concurrently.
pub trait Processor: Send {
    /// Name used in logs and statistics
    fn name(&self) -> &str;

    /// Returns the (possibly new) event, `Ok(None)` to drop it, or an error,
    /// which drops the event and is reported by the pipeline.
    fn process(&mut self, event: Event) -> Result<Option<Event>, ProcessorError>;

    /// Clears all accumulated state.
    fn reset(&mut self);
}
