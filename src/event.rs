//! Event model for classified headset signals
//!
//! Two kinds of events travel through the pipeline:
//!
//! 1. [`CommandEvent`] - a classified mental command with its power (confidence)
//! 2. [`ConnectionEvent`] - a connect/disconnect notification from the source
//!
//! Events are immutable values. Stages that annotate an event (the command mapper)
//! produce a new copy instead of mutating the one they received.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::hash::{Hash, Hasher};
use std::str::FromStr;
use std::sync::OnceLock;
use std::time::{Duration, Instant};

// Event construction errors
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum EventError {
    #[error("Power must be between 0.0 and 1.0, got {0}")]
    PowerOutOfRange(f32),

    #[error("Unknown mental command: '{name}'. Valid commands are: {valid}")]
    UnknownCommand { name: String, valid: String },
}

/// Recognized mental-command classes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Command {
    Neutral,
    Push,
    Pull,
    Lift,
    Drop,
    Left,
    Right,
    RotateLeft,
    RotateRight,
    Disappear,
}

impl Command {
    pub const ALL: [Command; 10] = [
        Command::Neutral,
        Command::Push,
        Command::Pull,
        Command::Lift,
        Command::Drop,
        Command::Left,
        Command::Right,
        Command::RotateLeft,
        Command::RotateRight,
        Command::Disappear,
    ];

    /// Lower-case name as used in configuration files
    pub fn name(&self) -> &'static str {
        match self {
            Command::Neutral => "neutral",
            Command::Push => "push",
            Command::Pull => "pull",
            Command::Lift => "lift",
            Command::Drop => "drop",
            Command::Left => "left",
            Command::Right => "right",
            Command::RotateLeft => "rotate_left",
            Command::RotateRight => "rotate_right",
            Command::Disappear => "disappear",
        }
    }

    /// Parses a command name case-insensitively. `-` and spaces count as `_`,
    /// so "Rotate-Left" and "rotate left" both resolve to [`Command::RotateLeft`].
    pub fn parse_name(name: &str) -> Result<Command, EventError> {
        let normalized = name.trim().to_lowercase().replace(['-', ' '], "_");
        Command::ALL
            .iter()
            .copied()
            .find(|command| command.name() == normalized)
            .ok_or_else(|| EventError::UnknownCommand {
                name: name.to_string(),
                valid: Command::ALL
                    .iter()
                    .map(Command::name)
                    .collect::<Vec<_>>()
                    .join(", "),
            })
    }
}

impl fmt::Display for Command {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.name())
    }
}

impl FromStr for Command {
    type Err = EventError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Command::parse_name(s)
    }
}

fn monotonic_origin() -> Instant {
    static ORIGIN: OnceLock<Instant> = OnceLock::new();
    *ORIGIN.get_or_init(Instant::now)
}

/// Monotonic point in time, measured from a process-wide origin.
///
/// Sources stamp events with [`Timestamp::now`]; tests and replays construct
/// timestamps directly with [`Timestamp::from_millis`] or [`Timestamp::from_secs_f64`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Default, Serialize, Deserialize)]
pub struct Timestamp(Duration);

impl Timestamp {
    pub fn now() -> Self {
        Self(monotonic_origin().elapsed())
    }

    pub const fn from_millis(millis: u64) -> Self {
        Self(Duration::from_millis(millis))
    }

    /// Negative or non-finite input collapses to the origin.
    pub fn from_secs_f64(secs: f64) -> Self {
        Self(Duration::try_from_secs_f64(secs).unwrap_or_default())
    }

    /// Time elapsed since `earlier`, zero if `earlier` lies in the future.
    pub fn saturating_sub(&self, earlier: Timestamp) -> Duration {
        self.0.saturating_sub(earlier.0)
    }
}

impl fmt::Display for Timestamp {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:.3}s", self.0.as_secs_f64())
    }
}

/// A classified mental command reported by a source.
#[derive(Debug, Clone, Serialize)]
pub struct CommandEvent {
    timestamp: Timestamp,
    source_id: String,
    command: Command,
    power: f32,
    action: Option<String>,
}

impl CommandEvent {
    /// Creates a command event, rejecting powers outside `[0.0, 1.0]` (and NaN).
    pub fn new(
        timestamp: Timestamp,
        source_id: impl Into<String>,
        command: Command,
        power: f32,
    ) -> Result<Self, EventError> {
        if !(0.0..=1.0).contains(&power) {
            return Err(EventError::PowerOutOfRange(power));
        }

        Ok(Self {
            timestamp,
            source_id: source_id.into(),
            command,
            power,
            action: None,
        })
    }

    pub fn timestamp(&self) -> Timestamp {
        self.timestamp
    }

    pub fn source_id(&self) -> &str {
        &self.source_id
    }

    pub fn command(&self) -> Command {
        self.command
    }

    pub fn power(&self) -> f32 {
        self.power
    }

    pub fn action(&self) -> Option<&str> {
        self.action.as_deref()
    }

    /// Returns a copy of this event with `action` set.
    pub fn with_action(&self, action: impl Into<String>) -> Self {
        Self {
            action: Some(action.into()),
            ..self.clone()
        }
    }
}

impl PartialEq for CommandEvent {
    fn eq(&self, other: &Self) -> bool {
        self.timestamp == other.timestamp
            && self.source_id == other.source_id
            && self.command == other.command
            && self.power.to_bits() == other.power.to_bits()
            && self.action == other.action
    }
}

// power is validated on construction, so it is never NaN
impl Eq for CommandEvent {}

impl Hash for CommandEvent {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.timestamp.hash(state);
        self.source_id.hash(state);
        self.command.hash(state);
        self.power.to_bits().hash(state);
        self.action.hash(state);
    }
}

/// Connection state change of a source. Informational only.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize)]
pub struct ConnectionEvent {
    pub connected: bool,
    pub message: Option<String>,
}

impl ConnectionEvent {
    pub fn connected(message: impl Into<String>) -> Self {
        Self {
            connected: true,
            message: Some(message.into()),
        }
    }

    pub fn disconnected(message: impl Into<String>) -> Self {
        Self {
            connected: false,
            message: Some(message.into()),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum Event {
    Command(CommandEvent),
    Connection(ConnectionEvent),
}

impl Event {
    pub fn kind(&self) -> &'static str {
        match self {
            Event::Command(_) => "CommandEvent",
            Event::Connection(_) => "ConnectionEvent",
        }
    }

    pub fn as_command(&self) -> Option<&CommandEvent> {
        match self {
            Event::Command(event) => Some(event),
            Event::Connection(_) => None,
        }
    }
}

impl From<CommandEvent> for Event {
    fn from(event: CommandEvent) -> Self {
        Event::Command(event)
    }
}

impl From<ConnectionEvent> for Event {
    fn from(event: ConnectionEvent) -> Self {
        Event::Connection(event)
    }
}

impl fmt::Display for Event {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Event::Command(event) => {
                write!(
                    f,
                    "{} power={:.2} source={} t={}",
                    event.command, event.power, event.source_id, event.timestamp
                )?;
                if let Some(action) = &event.action {
                    write!(f, " action={}", action)?;
                }
                Ok(())
            }
            Event::Connection(event) => {
                let state = if event.connected {
                    "connected"
                } else {
                    "disconnected"
                };
                match &event.message {
                    Some(message) => write!(f, "{} ({})", state, message),
                    None => write!(f, "{}", state),
                }
            }
        }
    }
}
