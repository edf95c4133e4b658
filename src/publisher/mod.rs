//! Output sinks for accepted events
//!
//! The pipeline fans every accepted event out to all publishers that report
//! themselves ready. The pipeline takes ownership of each boxed publisher and
//! calls it from whichever thread delivers the event, so lifecycle methods take
//! `&self` and keep their state behind interior mutability.
//!
//! | Publisher            | Effect                                          |
//! |----------------------|-------------------------------------------------|
//! | [`ConsolePublisher`] | formatted line per event on any `Write` sink    |
//! | [`LogPublisher`]     | structured `tracing` record per event           |
//! | [`ChannelPublisher`] | forwards events into a tokio mpsc channel       |
//! | [`MqttPublisher`]    | JSON message per command event on an MQTT topic |

pub mod channel;
pub mod console;
pub mod log;
pub mod mqtt;

pub use channel::ChannelPublisher;
pub use console::ConsolePublisher;
pub use log::LogPublisher;
pub use mqtt::{MqttPublisher, MqttPublisherConfig};

use crate::event::Event;

// Publisher errors
#[derive(Debug, thiserror::Error)]
pub enum PublisherError {
    #[error("Publisher {0} not started")]
    NotReady(String),

    #[error("Failed to start publisher: {0}")]
    StartFailed(String),

    #[error("Failed to stop publisher: {0}")]
    StopFailed(String),

    #[error("Failed to send event: {0}")]
    Send(String),

    #[error("Publisher panicked: {0}")]
    Panicked(String),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

/// Consumer of accepted events.
///
/// `publish` is only called while `is_ready` returns true and must not block
/// indefinitely: it runs on the source's delivery thread.
pub trait Publisher: Send + Sync {
    fn name(&self) -> &str;

    fn start(&self) -> Result<(), PublisherError>;

    /// Safe to call when not started.
    fn stop(&self) -> Result<(), PublisherError>;

    fn publish(&self, event: &Event) -> Result<(), PublisherError>;

    fn is_ready(&self) -> bool;
}
