//! Publisher that turns events into structured tracing records

use crate::event::Event;
use crate::publisher::{Publisher, PublisherError};
use std::sync::atomic::{AtomicBool, Ordering};
use tracing::info;

#[derive(Debug, Default)]
pub struct LogPublisher {
    ready: AtomicBool,
}

impl LogPublisher {
    pub fn new() -> Self {
        Self::default()
    }
}

impl Publisher for LogPublisher {
    fn name(&self) -> &str {
        "log"
    }

    fn start(&self) -> Result<(), PublisherError> {
        self.ready.store(true, Ordering::SeqCst);
        info!("Log publisher started");
        Ok(())
    }

    fn stop(&self) -> Result<(), PublisherError> {
        if self.ready.swap(false, Ordering::SeqCst) {
            info!("Log publisher stopped");
        }
        Ok(())
    }

    fn publish(&self, event: &Event) -> Result<(), PublisherError> {
        if !self.is_ready() {
            return Err(PublisherError::NotReady(self.name().to_string()));
        }
        match event {
            Event::Command(command) => info!(
                command = %command.command(),
                power = command.power(),
                source_id = command.source_id(),
                action = command.action().unwrap_or("-"),
                "Mental command"
            ),
            Event::Connection(connection) => info!(
                connected = connection.connected,
                message = connection.message.as_deref().unwrap_or(""),
                "Source connection changed"
            ),
        }
        Ok(())
    }

    fn is_ready(&self) -> bool {
        self.ready.load(Ordering::SeqCst)
    }
}
