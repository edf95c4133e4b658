//! Confidence floor per command

use crate::event::{Command, Event};
use crate::processor::{Processor, ProcessorError};
use std::collections::HashMap;
use tracing::debug;

/// Per-command power floors with a fallback for unlisted commands.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ThresholdConfig {
    thresholds: HashMap<Command, f32>,
    default_threshold: f32,
}

impl ThresholdConfig {
    pub fn new(
        thresholds: HashMap<Command, f32>,
        default_threshold: f32,
    ) -> Result<Self, ProcessorError> {
        check_floor("default", default_threshold)?;
        for (command, threshold) in &thresholds {
            check_floor(command.name(), *threshold)?;
        }

        Ok(Self {
            thresholds,
            default_threshold,
        })
    }

    pub fn threshold_for(&self, command: Command) -> f32 {
        self.thresholds
            .get(&command)
            .copied()
            .unwrap_or(self.default_threshold)
    }

    pub fn default_threshold(&self) -> f32 {
        self.default_threshold
    }
}

fn check_floor(name: &str, value: f32) -> Result<(), ProcessorError> {
    if (0.0..=1.0).contains(&value) {
        Ok(())
    } else {
        Err(ProcessorError::InvalidConfig(format!(
            "Threshold for '{}' must be between 0.0 and 1.0, got {}",
            name, value
        )))
    }
}

/// Drops command events whose power is below the floor for their command.
/// A power equal to the floor passes.
#[derive(Debug, Clone)]
pub struct ThresholdProcessor {
    config: ThresholdConfig,
}

impl ThresholdProcessor {
    pub fn new(config: ThresholdConfig) -> Self {
        Self { config }
    }

    pub fn config(&self) -> &ThresholdConfig {
        &self.config
    }
}

impl Processor for ThresholdProcessor {
    fn name(&self) -> &str {
        "threshold"
    }

    fn process(&mut self, event: Event) -> Result<Option<Event>, ProcessorError> {
        let Event::Command(command_event) = &event else {
            return Ok(Some(event));
        };

        let floor = self.config.threshold_for(command_event.command());
        if command_event.power() >= floor {
            Ok(Some(event))
        } else {
            debug!(
                "Dropping {} with power {:.3} below threshold {:.3}",
                command_event.command(),
                command_event.power(),
                floor
            );
            Ok(None)
        }
    }

    fn reset(&mut self) {}
}
