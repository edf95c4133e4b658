//! Command to action annotation

use crate::event::{Command, Event};
use crate::processor::{Processor, ProcessorError};
use std::collections::HashMap;
use tracing::debug;

/// Lookup table from command to an opaque action string (usually a key name).
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct MapperConfig {
    pub mapping: HashMap<Command, String>,
}

impl MapperConfig {
    pub fn new(mapping: HashMap<Command, String>) -> Self {
        Self { mapping }
    }

    pub fn action_for(&self, command: Command) -> Option<&str> {
        self.mapping.get(&command).map(String::as_str)
    }
}

/// Attaches the mapped action to command events. Never drops anything:
/// unmapped commands and connection events pass through as they came in.
#[derive(Debug, Clone, Default)]
pub struct CommandMapper {
    config: MapperConfig,
}

impl CommandMapper {
    pub fn new(config: MapperConfig) -> Self {
        Self { config }
    }

    pub fn config(&self) -> &MapperConfig {
        &self.config
    }
}

impl Processor for CommandMapper {
    fn name(&self) -> &str {
        "mapper"
    }

    fn process(&mut self, event: Event) -> Result<Option<Event>, ProcessorError> {
        let mapped = match &event {
            Event::Command(command_event) => self
                .config
                .action_for(command_event.command())
                .map(|action| {
                    debug!("Mapped {} to action {}", command_event.command(), action);
                    Event::Command(command_event.with_action(action))
                }),
            Event::Connection(_) => None,
        };

        Ok(Some(mapped.unwrap_or(event)))
    }

    fn reset(&mut self) {}
}
