//! Bridge from the synchronous dispatch path into async consumers

use crate::event::Event;
use crate::publisher::{Publisher, PublisherError};
use std::sync::atomic::{AtomicBool, Ordering};
use tokio::sync::mpsc;
use tracing::{debug, warn};

/// Forwards every event into a bounded tokio channel.
///
/// Uses `try_send`, so a full channel fails the dispatch instead of blocking
/// the source's delivery thread.
pub struct ChannelPublisher {
    name: String,
    sender: mpsc::Sender<Event>,
    ready: AtomicBool,
}

impl ChannelPublisher {
    pub fn new(name: impl Into<String>, sender: mpsc::Sender<Event>) -> Self {
        Self {
            name: name.into(),
            sender,
            ready: AtomicBool::new(false),
        }
    }

    /// Creates a publisher together with the receiving end of its channel
    pub fn with_capacity(name: impl Into<String>, capacity: usize) -> (Self, mpsc::Receiver<Event>) {
        let (sender, receiver) = mpsc::channel(capacity);
        (Self::new(name, sender), receiver)
    }
}

impl Publisher for ChannelPublisher {
    fn name(&self) -> &str {
        &self.name
    }

    fn start(&self) -> Result<(), PublisherError> {
        if self.sender.is_closed() {
            return Err(PublisherError::StartFailed(format!(
                "Channel of publisher {} is closed",
                self.name
            )));
        }
        self.ready.store(true, Ordering::SeqCst);
        debug!("Channel publisher {} started", self.name);
        Ok(())
    }

    fn stop(&self) -> Result<(), PublisherError> {
        self.ready.store(false, Ordering::SeqCst);
        Ok(())
    }

    fn publish(&self, event: &Event) -> Result<(), PublisherError> {
        match self.sender.try_send(event.clone()) {
            Ok(_) => Ok(()),
            Err(e) => {
                warn!("Channel publisher {} failed to send: {}", self.name, e);
                Err(PublisherError::Send(e.to_string()))
            }
        }
    }

    fn is_ready(&self) -> bool {
        self.ready.load(Ordering::SeqCst) && !self.sender.is_closed()
    }
}
