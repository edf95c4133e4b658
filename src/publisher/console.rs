//! Line-oriented publisher for debugging sessions

use crate::event::Event;
use crate::publisher::{Publisher, PublisherError};
use chrono::Local;
use std::io::{self, Stdout, Write};
use std::sync::{Mutex, PoisonError};
use tracing::debug;

struct ConsoleState<W> {
    writer: W,
    ready: bool,
    event_count: u64,
}

/// Writes one formatted line per event, e.g.
/// `[12:30:01.250] BCI CommandEvent: left power=0.85 source=mock t=1.250s action=A`.
///
/// [`with_format`](Self::with_format) replaces the event part of the line with
/// a template. It may use the placeholders `{timestamp}`, `{event_type}` and
/// `{event}`; the prefix is still prepended.
pub struct ConsolePublisher<W: Write + Send = Stdout> {
    prefix: Option<String>,
    include_timestamp: bool,
    format: Option<String>,
    state: Mutex<ConsoleState<W>>,
}

impl ConsolePublisher<Stdout> {
    pub fn stdout() -> Self {
        Self::new(io::stdout())
    }
}

impl<W: Write + Send> ConsolePublisher<W> {
    pub fn new(writer: W) -> Self {
        Self {
            prefix: None,
            include_timestamp: true,
            format: None,
            state: Mutex::new(ConsoleState {
                writer,
                ready: false,
                event_count: 0,
            }),
        }
    }

    pub fn with_prefix(mut self, prefix: impl Into<String>) -> Self {
        self.prefix = Some(prefix.into());
        self
    }

    pub fn with_timestamp(mut self, include_timestamp: bool) -> Self {
        self.include_timestamp = include_timestamp;
        self
    }

    pub fn with_format(mut self, format: impl Into<String>) -> Self {
        self.format = Some(format.into());
        self
    }

    /// Events published since the last `start`
    pub fn event_count(&self) -> u64 {
        self.lock().event_count
    }

    /// Consumes the publisher and returns the underlying writer
    pub fn into_writer(self) -> W {
        self.state
            .into_inner()
            .unwrap_or_else(PoisonError::into_inner)
            .writer
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, ConsoleState<W>> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn format_line(&self, message: &str) -> String {
        let mut line = String::new();
        if self.include_timestamp {
            line.push_str(&format!("[{}] ", clock()));
        }
        line.push_str(&self.prefixed(message));
        line
    }

    fn prefixed(&self, message: &str) -> String {
        match &self.prefix {
            Some(prefix) => format!("{} {}", prefix, message),
            None => message.to_string(),
        }
    }

    fn format_event(&self, event: &Event) -> String {
        match &self.format {
            Some(template) => {
                let rendered = template
                    .replace("{timestamp}", &clock())
                    .replace("{event_type}", event.kind())
                    .replace("{event}", &event.to_string());
                self.prefixed(&rendered)
            }
            None => self.format_line(&format!("{}: {}", event.kind(), event)),
        }
    }
}

fn clock() -> String {
    Local::now().format("%H:%M:%S%.3f").to_string()
}

impl<W: Write + Send> Publisher for ConsolePublisher<W> {
    fn name(&self) -> &str {
        "console"
    }

    fn start(&self) -> Result<(), PublisherError> {
        let line = self.format_line("Console publisher started");
        let mut state = self.lock();
        writeln!(state.writer, "{}", line)?;
        state.ready = true;
        state.event_count = 0;
        Ok(())
    }

    fn stop(&self) -> Result<(), PublisherError> {
        let mut state = self.lock();
        if !state.ready {
            return Ok(());
        }
        state.ready = false;
        let line = self.format_line(&format!(
            "Console publisher stopped (published {} events)",
            state.event_count
        ));
        writeln!(state.writer, "{}", line)?;
        state.writer.flush()?;
        debug!("Console publisher flushed");
        Ok(())
    }

    fn publish(&self, event: &Event) -> Result<(), PublisherError> {
        let line = self.format_event(event);
        let mut state = self.lock();
        if !state.ready {
            return Err(PublisherError::NotReady(self.name().to_string()));
        }
        writeln!(state.writer, "{}", line)?;
        state.event_count += 1;
        Ok(())
    }

    fn is_ready(&self) -> bool {
        self.lock().ready
    }
}
