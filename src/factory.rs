//! Assembles a ready-to-start pipeline from configuration

use crate::config::{BridgeConfig, ConfigError, PublisherConfig, SourceKind};
use crate::pipeline::{Pipeline, PipelineError};
use crate::processor::{CommandMapper, DebounceProcessor, Processor, ThresholdProcessor};
use crate::publisher::{ConsolePublisher, LogPublisher, MqttPublisher, Publisher};
use crate::source::{MockSource, Source};
use std::sync::Arc;
use tracing::info;

#[derive(Debug, thiserror::Error)]
pub enum BuildError {
    #[error(transparent)]
    Config(#[from] ConfigError),

    #[error(transparent)]
    Pipeline(#[from] PipelineError),
}

pub fn build_source(config: &BridgeConfig) -> Result<Arc<dyn Source>, ConfigError> {
    match config.source.kind {
        SourceKind::Mock => Ok(Arc::new(MockSource::new(
            config.source.source_id.clone(),
            config.mock_mode()?,
        ))),
    }
}

/// Threshold, Debounce and Mapper, in that order
pub fn build_processors(config: &BridgeConfig) -> Result<Vec<Box<dyn Processor>>, ConfigError> {
    Ok(vec![
        Box::new(ThresholdProcessor::new(config.threshold_config()?)),
        Box::new(DebounceProcessor::new(config.debounce_config()?)),
        Box::new(CommandMapper::new(config.mapper_config()?)),
    ])
}

pub fn build_publisher(config: &PublisherConfig) -> Box<dyn Publisher> {
    match config {
        PublisherConfig::Console { prefix, timestamps } => {
            let mut publisher = ConsolePublisher::stdout().with_timestamp(*timestamps);
            if let Some(prefix) = prefix {
                publisher = publisher.with_prefix(prefix.clone());
            }
            Box::new(publisher)
        }
        PublisherConfig::Log => Box::new(LogPublisher::new()),
        PublisherConfig::Mqtt(mqtt) => Box::new(MqttPublisher::new(mqtt.clone())),
    }
}

pub fn build_pipeline(config: &BridgeConfig) -> Result<Pipeline, BuildError> {
    config.validate()?;

    let pipeline = Pipeline::new(build_source(config)?);
    for processor in build_processors(config)? {
        pipeline.add_processor(processor);
    }
    for publisher in &config.publishers {
        pipeline.add_publisher(build_publisher(publisher))?;
    }

    info!(
        "Built pipeline: source={} processors={:?} publishers={:?}",
        pipeline.source().source_id(),
        pipeline.processor_names(),
        pipeline.publisher_names()
    );
    Ok(pipeline)
}
