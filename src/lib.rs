//! Event pipeline for brain-computer-interface mental commands
//!
//! A [`Source`](source::Source) delivers events, a chain of
//! [`Processor`](processor::Processor)s filters and annotates them, and the
//! [`Pipeline`](pipeline::Pipeline) fans accepted events out to every ready
//! [`Publisher`](publisher::Publisher).

pub mod config;
pub mod event;
pub mod factory;
pub mod pipeline;
pub mod processor;
pub mod publisher;
pub mod source;

pub use config::BridgeConfig;
pub use event::{Command, CommandEvent, ConnectionEvent, Event, Timestamp};
pub use pipeline::{Outcome, Pipeline, PipelineError, PipelineState, Statistics};
