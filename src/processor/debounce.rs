//! Cooldown filter keyed by command identity
//!
//! Repeated detections of the same gesture arrive as a burst of identical
//! commands. Only the first one in a burst survives: a command is dropped if it
//! arrives less than `cooldown` after the last *accepted* occurrence of the same
//! command. Dropped events never move the anchor.
//!
//! Elapsed time is measured between event timestamps, not wall-clock time, so
//! the filter behaves the same for live and replayed input.

use crate::event::{Command, Event, Timestamp};
use crate::processor::{Processor, ProcessorError};
use std::collections::HashMap;
use std::time::Duration;
use tracing::debug;

#[derive(Debug, Clone, PartialEq)]
pub struct DebounceConfig {
    /// Cooldown for commands without an override
    pub cooldown: Duration,

    /// Per-command overrides
    pub per_command: HashMap<Command, Duration>,
}

impl Default for DebounceConfig {
    fn default() -> Self {
        Self {
            cooldown: Duration::from_millis(300),
            per_command: HashMap::new(),
        }
    }
}

impl DebounceConfig {
    pub fn new(cooldown: Duration) -> Self {
        Self {
            cooldown,
            per_command: HashMap::new(),
        }
    }

    pub fn with_override(mut self, command: Command, cooldown: Duration) -> Self {
        self.per_command.insert(command, cooldown);
        self
    }

    pub fn cooldown_for(&self, command: Command) -> Duration {
        self.per_command
            .get(&command)
            .copied()
            .unwrap_or(self.cooldown)
    }
}

#[derive(Debug, Clone, Default)]
pub struct DebounceProcessor {
    config: DebounceConfig,
    last_accepted: HashMap<Command, Timestamp>,
}

impl DebounceProcessor {
    pub fn new(config: DebounceConfig) -> Self {
        Self {
            config,
            last_accepted: HashMap::new(),
        }
    }

    pub fn config(&self) -> &DebounceConfig {
        &self.config
    }

    /// Timestamp of the last accepted occurrence of `command`, if any
    pub fn last_accepted(&self, command: Command) -> Option<Timestamp> {
        self.last_accepted.get(&command).copied()
    }
}

impl Processor for DebounceProcessor {
    fn name(&self) -> &str {
        "debounce"
    }

    fn process(&mut self, event: Event) -> Result<Option<Event>, ProcessorError> {
        let Event::Command(command_event) = &event else {
            return Ok(Some(event));
        };

        let command = command_event.command();
        let now = command_event.timestamp();

        if let Some(last) = self.last_accepted.get(&command) {
            let elapsed = now.saturating_sub(*last);
            let cooldown = self.config.cooldown_for(command);
            if elapsed < cooldown {
                debug!(
                    "Debounced {}: {:?} since last accepted, cooldown {:?}",
                    command, elapsed, cooldown
                );
                return Ok(None);
            }
        }

        self.last_accepted.insert(command, now);
        Ok(Some(event))
    }

    fn reset(&mut self) {
        debug!(
            "Clearing debounce state for {} commands",
            self.last_accepted.len()
        );
        self.last_accepted.clear();
    }
}
