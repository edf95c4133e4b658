//! Counters collected while events flow through the pipeline
//!
//! All counters start at zero on every `start()` and only grow until the next
//! one. After each dispatch `received == processed + dropped` holds.

use serde::Serialize;
use std::fmt;

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct PublisherStatistics {
    pub name: String,
    /// `publish` calls made, successful or not
    pub dispatched: u64,
    pub failed: u64,
    pub skipped_not_ready: u64,
}

impl PublisherStatistics {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            ..Default::default()
        }
    }

    pub(crate) fn reset(&mut self) {
        self.dispatched = 0;
        self.failed = 0;
        self.skipped_not_ready = 0;
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct Statistics {
    pub received: u64,
    pub processed: u64,
    pub dropped: u64,
    /// Drops caused by a failing or panicking processor, included in `dropped`
    pub processor_errors: u64,
    pub publishers: Vec<PublisherStatistics>,
}

impl Statistics {
    pub fn publisher(&self, name: &str) -> Option<&PublisherStatistics> {
        self.publishers.iter().find(|p| p.name == name)
    }

    pub fn total_dispatched(&self) -> u64 {
        self.publishers.iter().map(|p| p.dispatched).sum()
    }

    pub fn total_failed(&self) -> u64 {
        self.publishers.iter().map(|p| p.failed).sum()
    }

    pub(crate) fn reset(&mut self) {
        *self = Self::default();
    }
}

impl fmt::Display for Statistics {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "received={} processed={} dropped={} processor_errors={}",
            self.received, self.processed, self.dropped, self.processor_errors
        )?;
        for publisher in &self.publishers {
            write!(
                f,
                " [{}: dispatched={} failed={} skipped={}]",
                publisher.name, publisher.dispatched, publisher.failed, publisher.skipped_not_ready
            )?;
        }
        Ok(())
    }
}
