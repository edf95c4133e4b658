//! Synthetic source for development, demos and tests
//!
//! Generates mental-command events without any headset attached. Three modes:
//!
//! - [`MockMode::Random`] - random commands at a fixed interval
//! - [`MockMode::Scripted`] - plays back a fixed sequence, optionally looping;
//!   [`MockSource::replay`] builds one from recorded events
//! - [`MockMode::Manual`] - emits only what the caller pushes via [`MockSource::emit`]
//!
//! Random and scripted modes run on a dedicated worker thread driving a
//! current-thread tokio runtime. `disconnect` cancels the worker and joins it,
//! so no event is delivered after `disconnect` returns.

use crate::event::{Command, CommandEvent, ConnectionEvent, Event, Timestamp};
use crate::source::{EventCallback, Source, SourceError, SubscriberSet, SubscriptionId};
use rand::seq::SliceRandom;
use rand::Rng;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, PoisonError};
use std::thread::{self, JoinHandle};
use std::time::Duration;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

/// One step of a scripted session: wait `delay`, then emit `command`.
#[derive(Debug, Clone, PartialEq)]
pub struct ScriptedEvent {
    pub delay: Duration,
    pub command: Command,
    pub power: f32,
}

impl ScriptedEvent {
    pub fn new(delay: Duration, command: Command, power: f32) -> Self {
        Self {
            delay,
            command,
            power,
        }
    }
}

/// Turns recorded events into a script that reproduces their spacing.
///
/// The first event plays immediately; each later one waits for the gap to its
/// predecessor divided by `speed_multiplier`. Out-of-order timestamps yield a
/// zero gap. A multiplier that is not a positive finite number falls back to
/// real time.
pub fn replay_script(events: &[CommandEvent], speed_multiplier: f64) -> Vec<ScriptedEvent> {
    let speed = if speed_multiplier.is_finite() && speed_multiplier > 0.0 {
        speed_multiplier
    } else {
        warn!("Invalid replay speed {}, replaying in real time", speed_multiplier);
        1.0
    };

    let mut previous: Option<Timestamp> = None;
    events
        .iter()
        .map(|event| {
            let gap = previous.map_or(Duration::ZERO, |prev| event.timestamp().saturating_sub(prev));
            previous = Some(event.timestamp());
            ScriptedEvent::new(gap.div_f64(speed), event.command(), event.power())
        })
        .collect()
}

/// Builds a script that emits `commands` `interval` apart, the first one immediately.
pub fn create_script(commands: &[Command], interval: Duration, power: f32) -> Vec<ScriptedEvent> {
    commands
        .iter()
        .enumerate()
        .map(|(i, command)| {
            let delay = if i == 0 { Duration::ZERO } else { interval };
            ScriptedEvent::new(delay, *command, power)
        })
        .collect()
}

#[derive(Debug, Clone, PartialEq)]
pub enum MockMode {
    Manual,
    Random {
        commands: Vec<Command>,
        interval: Duration,
        power_range: (f32, f32),
    },
    Scripted {
        script: Vec<ScriptedEvent>,
        looped: bool,
    },
}

impl MockMode {
    fn label(&self) -> &'static str {
        match self {
            MockMode::Manual => "manual",
            MockMode::Random { .. } => "random",
            MockMode::Scripted { .. } => "scripted",
        }
    }
}

// Everything the worker thread needs to deliver events
#[derive(Clone)]
struct Emitter {
    source_id: String,
    subscribers: Arc<SubscriberSet>,
    connected: Arc<AtomicBool>,
}

impl Emitter {
    fn emit(&self, event: Event) -> bool {
        if !self.connected.load(Ordering::SeqCst) {
            warn!("Cannot emit: MockSource {} not connected", self.source_id);
            return false;
        }
        self.subscribers.emit(event);
        true
    }

    fn emit_command(&self, command: Command, power: f32) -> bool {
        // Synthetic input is clamped rather than rejected
        let power = if power.is_nan() { 0.0 } else { power.clamp(0.0, 1.0) };
        match CommandEvent::new(Timestamp::now(), self.source_id.clone(), command, power) {
            Ok(event) => self.emit(event.into()),
            Err(e) => {
                error!("Failed to build mock event: {}", e);
                false
            }
        }
    }
}

struct Worker {
    token: CancellationToken,
    thread: JoinHandle<()>,
}

pub struct MockSource {
    mode: MockMode,
    emitter: Emitter,
    worker: Mutex<Option<Worker>>,
}

impl MockSource {
    pub fn new(source_id: impl Into<String>, mode: MockMode) -> Self {
        Self {
            mode,
            emitter: Emitter {
                source_id: source_id.into(),
                subscribers: Arc::new(SubscriberSet::new()),
                connected: Arc::new(AtomicBool::new(false)),
            },
            worker: Mutex::new(None),
        }
    }

    pub fn manual(source_id: impl Into<String>) -> Self {
        Self::new(source_id, MockMode::Manual)
    }

    pub fn scripted(source_id: impl Into<String>, script: Vec<ScriptedEvent>, looped: bool) -> Self {
        Self::new(source_id, MockMode::Scripted { script, looped })
    }

    /// Plays back recorded events once, preserving their relative timing.
    pub fn replay(source_id: impl Into<String>, events: &[CommandEvent], speed_multiplier: f64) -> Self {
        Self::scripted(source_id, replay_script(events, speed_multiplier), false)
    }

    pub fn mode(&self) -> &MockMode {
        &self.mode
    }

    /// Emits a command stamped with the current time. Power is clamped to `[0, 1]`.
    /// Returns `false` if the source is not connected.
    pub fn emit_command(&self, command: Command, power: f32) -> bool {
        self.emitter.emit_command(command, power)
    }

    /// Emits a prebuilt event on the caller's thread.
    /// Returns `false` if the source is not connected.
    pub fn emit(&self, event: Event) -> bool {
        self.emitter.emit(event)
    }

    fn spawn_worker(&self) -> Result<Option<Worker>, SourceError> {
        if self.mode == MockMode::Manual {
            return Ok(None);
        }

        let runtime = tokio::runtime::Builder::new_current_thread()
            .enable_time()
            .build()
            .map_err(|e| SourceError::ConnectionFailed {
                source_id: self.emitter.source_id.clone(),
                reason: format!("Failed to build worker runtime: {}", e),
            })?;

        let token = CancellationToken::new();
        let worker_token = token.clone();
        let mode = self.mode.clone();
        let emitter = self.emitter.clone();

        let thread = thread::Builder::new()
            .name(format!("mock-source-{}", self.emitter.source_id))
            .spawn(move || {
                debug!("Mock source worker started");
                runtime.block_on(run_worker(mode, emitter, worker_token));
                debug!("Mock source worker finished");
            })
            .map_err(|e| SourceError::ConnectionFailed {
                source_id: self.emitter.source_id.clone(),
                reason: format!("Failed to spawn worker thread: {}", e),
            })?;

        Ok(Some(Worker { token, thread }))
    }
}

async fn run_worker(mode: MockMode, emitter: Emitter, token: CancellationToken) {
    match mode {
        MockMode::Manual => token.cancelled().await,
        MockMode::Random {
            commands,
            interval,
            power_range,
        } => {
            let (low, high) = normalized_range(power_range);
            let mut rng = rand::thread_rng();
            loop {
                tokio::select! {
                    _ = token.cancelled() => break,
                    _ = tokio::time::sleep(interval) => {
                        let Some(command) = commands.choose(&mut rng).copied() else {
                            warn!("Random mode has no commands to choose from");
                            continue;
                        };
                        let power = rng.gen_range(low..=high);
                        emitter.emit_command(command, power);
                    }
                }
            }
        }
        MockMode::Scripted { script, looped } => {
            if script.is_empty() {
                warn!("Scripted mock source has an empty script");
                return;
            }
            'session: loop {
                for step in &script {
                    tokio::select! {
                        _ = token.cancelled() => break 'session,
                        _ = tokio::time::sleep(step.delay) => {
                            emitter.emit_command(step.command, step.power);
                        }
                    }
                }
                if !looped {
                    info!("Script completed");
                    break;
                }
            }
        }
    }
}

fn normalized_range((a, b): (f32, f32)) -> (f32, f32) {
    let a = a.clamp(0.0, 1.0);
    let b = b.clamp(0.0, 1.0);
    if a <= b {
        (a, b)
    } else {
        (b, a)
    }
}

impl Source for MockSource {
    fn source_id(&self) -> &str {
        &self.emitter.source_id
    }

    fn is_connected(&self) -> bool {
        self.emitter.connected.load(Ordering::SeqCst)
    }

    fn connect(&self) -> Result<(), SourceError> {
        let mut worker = self.worker.lock().unwrap_or_else(PoisonError::into_inner);
        if self.is_connected() {
            warn!("MockSource {} already connected", self.emitter.source_id);
            return Ok(());
        }

        info!(
            "MockSource {} connecting (mode: {})",
            self.emitter.source_id,
            self.mode.label()
        );
        self.emitter.connected.store(true, Ordering::SeqCst);
        self.emitter
            .emit(ConnectionEvent::connected("Mock source connected").into());

        match self.spawn_worker() {
            Ok(spawned) => {
                *worker = spawned;
                Ok(())
            }
            Err(e) => {
                self.emitter.connected.store(false, Ordering::SeqCst);
                Err(e)
            }
        }
    }

    fn disconnect(&self) -> Result<(), SourceError> {
        let mut worker = self.worker.lock().unwrap_or_else(PoisonError::into_inner);
        if !self.emitter.connected.swap(false, Ordering::SeqCst) {
            return Ok(());
        }

        info!("MockSource {} disconnecting", self.emitter.source_id);

        let mut result = Ok(());
        if let Some(Worker { token, thread }) = worker.take() {
            token.cancel();
            if thread.thread().id() == thread::current().id() {
                // Called from one of our own callbacks; the worker exits on its own
                debug!("Disconnect requested from worker thread, not joining");
            } else if thread.join().is_err() {
                error!("Mock source worker panicked");
                result = Err(SourceError::WorkerError(
                    "Mock source worker panicked".to_string(),
                ));
            }
        }

        self.emitter
            .subscribers
            .emit(ConnectionEvent::disconnected("Mock source disconnected").into());
        result
    }

    fn subscribe(&self, callback: EventCallback) -> SubscriptionId {
        self.emitter.subscribers.subscribe(callback)
    }

    fn unsubscribe(&self, id: SubscriptionId) -> bool {
        self.emitter.subscribers.unsubscribe(id)
    }
}

impl Drop for MockSource {
    fn drop(&mut self) {
        if self.is_connected() {
            if let Err(e) = self.disconnect() {
                warn!("Error disconnecting mock source on drop: {}", e);
            }
        }
    }
}
