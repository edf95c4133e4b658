//! TOML configuration for the bridge binary
//!
//! Every section is optional; a missing file yields the defaults (mock source
//! in random mode, default floor 0.5, 300ms cooldown, one console publisher).
//!
//! The file is looked up in this order:
//! 1. the path given on the command line
//! 2. the `BCIBRIDGE_CONFIG` environment variable
//! 3. `<config dir>/bcibridge/config.toml`

use crate::event::{Command, EventError};
use crate::processor::{DebounceConfig, MapperConfig, ProcessorError, ThresholdConfig};
use crate::publisher::MqttPublisherConfig;
use crate::source::{MockMode, ScriptedEvent};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::ffi::OsString;
use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use std::str::FromStr;
use std::time::Duration;
use tracing::{debug, info};

pub const CONFIG_ENV_VAR: &str = "BCIBRIDGE_CONFIG";
const APP_DIR: &str = "bcibridge";
const CONFIG_FILE: &str = "config.toml";

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Failed to read config file {path}: {source}")]
    Read { path: PathBuf, source: io::Error },

    #[error("Failed to parse config: {0}")]
    Parse(#[from] toml::de::Error),

    #[error("Failed to serialize config: {0}")]
    Serialize(#[from] toml::ser::Error),

    #[error("Invalid configuration: {0}")]
    Invalid(String),

    #[error(transparent)]
    Command(#[from] EventError),

    #[error(transparent)]
    Processor(#[from] ProcessorError),
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SourceKind {
    #[default]
    Mock,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MockModeKind {
    Manual,
    #[default]
    Random,
    Scripted,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ScriptStep {
    pub command: String,
    #[serde(default = "default_script_power")]
    pub power: f32,
    #[serde(default)]
    pub delay_ms: u64,
}

fn default_script_power() -> f32 {
    0.8
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SourceConfig {
    pub kind: SourceKind,
    pub source_id: String,
    pub mode: MockModeKind,
    pub interval_ms: u64,
    pub commands: Vec<String>,
    pub power_min: f32,
    pub power_max: f32,
    pub script: Vec<ScriptStep>,
    pub looped: bool,
}

impl Default for SourceConfig {
    fn default() -> Self {
        Self {
            kind: SourceKind::Mock,
            source_id: "mock-source".to_string(),
            mode: MockModeKind::Random,
            interval_ms: 1000,
            commands: ["neutral", "push", "pull", "left", "right", "lift"]
                .iter()
                .map(|c| c.to_string())
                .collect(),
            power_min: 0.5,
            power_max: 1.0,
            script: Vec::new(),
            looped: false,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ThresholdSection {
    pub default_threshold: f32,
    pub commands: HashMap<String, f32>,
}

impl Default for ThresholdSection {
    fn default() -> Self {
        Self {
            default_threshold: 0.5,
            commands: HashMap::new(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct DebounceSection {
    pub cooldown_ms: u64,
    pub per_command_ms: HashMap<String, u64>,
}

impl Default for DebounceSection {
    fn default() -> Self {
        Self {
            cooldown_ms: 300,
            per_command_ms: HashMap::new(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum PublisherConfig {
    Console {
        #[serde(default)]
        prefix: Option<String>,
        #[serde(default = "default_true")]
        timestamps: bool,
    },
    Log,
    Mqtt(MqttPublisherConfig),
}

fn default_true() -> bool {
    true
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct BridgeConfig {
    pub log_level: String,
    pub source: SourceConfig,
    pub thresholds: ThresholdSection,
    pub debounce: DebounceSection,
    /// Command name to action, e.g. `left = "A"`
    pub mapping: HashMap<String, String>,
    pub publishers: Vec<PublisherConfig>,
}

impl Default for BridgeConfig {
    fn default() -> Self {
        Self {
            log_level: "info".to_string(),
            source: SourceConfig::default(),
            thresholds: ThresholdSection::default(),
            debounce: DebounceSection::default(),
            mapping: HashMap::new(),
            publishers: vec![PublisherConfig::Console {
                prefix: None,
                timestamps: true,
            }],
        }
    }
}

impl FromStr for BridgeConfig {
    type Err = ConfigError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let config: BridgeConfig = toml::from_str(s)?;
        config.validate()?;
        Ok(config)
    }
}

impl BridgeConfig {
    /// `<config dir>/bcibridge/config.toml`, when the platform has a config dir
    pub fn default_path() -> Option<PathBuf> {
        dirs::config_dir().map(|dir| dir.join(APP_DIR).join(CONFIG_FILE))
    }

    /// Loads the configuration following the lookup order, falling back to
    /// defaults when no file is found in the default location.
    pub fn load(explicit: Option<&Path>) -> Result<Self, ConfigError> {
        match resolve_path(explicit, std::env::var_os(CONFIG_ENV_VAR), Self::default_path()) {
            Some(path) => Self::load_from(&path),
            None => {
                info!("No config file found, using defaults");
                Ok(Self::default())
            }
        }
    }

    pub fn load_from(path: &Path) -> Result<Self, ConfigError> {
        debug!("Loading config from {}", path.display());
        let content = fs::read_to_string(path).map_err(|source| ConfigError::Read {
            path: path.to_path_buf(),
            source,
        })?;
        let config = content.parse()?;
        info!("Loaded config from {}", path.display());
        Ok(config)
    }

    pub fn to_toml(&self) -> Result<String, ConfigError> {
        Ok(toml::to_string_pretty(self)?)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        self.level()?;
        self.threshold_config()?;
        self.debounce_config()?;
        self.mapper_config()?;
        self.mock_mode()?;

        for publisher in &self.publishers {
            if let PublisherConfig::Mqtt(mqtt) = publisher {
                if mqtt.topic.trim().is_empty() {
                    return Err(ConfigError::Invalid("MQTT topic must not be empty".into()));
                }
                if mqtt.qos > 2 {
                    return Err(ConfigError::Invalid(format!(
                        "MQTT qos must be 0, 1 or 2, got {}",
                        mqtt.qos
                    )));
                }
            }
        }
        Ok(())
    }

    pub fn level(&self) -> Result<tracing::Level, ConfigError> {
        tracing::Level::from_str(self.log_level.trim())
            .map_err(|_| ConfigError::Invalid(format!("Unknown log level '{}'", self.log_level)))
    }

    pub fn threshold_config(&self) -> Result<ThresholdConfig, ConfigError> {
        let thresholds = self
            .thresholds
            .commands
            .iter()
            .map(|(name, floor)| Ok((Command::parse_name(name)?, *floor)))
            .collect::<Result<HashMap<_, _>, ConfigError>>()?;
        Ok(ThresholdConfig::new(
            thresholds,
            self.thresholds.default_threshold,
        )?)
    }

    pub fn debounce_config(&self) -> Result<DebounceConfig, ConfigError> {
        let mut config = DebounceConfig::new(Duration::from_millis(self.debounce.cooldown_ms));
        for (name, millis) in &self.debounce.per_command_ms {
            config = config.with_override(Command::parse_name(name)?, Duration::from_millis(*millis));
        }
        Ok(config)
    }

    pub fn mapper_config(&self) -> Result<MapperConfig, ConfigError> {
        let mapping = self
            .mapping
            .iter()
            .map(|(name, action)| Ok((Command::parse_name(name)?, action.clone())))
            .collect::<Result<HashMap<_, _>, ConfigError>>()?;
        Ok(MapperConfig::new(mapping))
    }

    pub fn mock_mode(&self) -> Result<MockMode, ConfigError> {
        let source = &self.source;
        match source.mode {
            MockModeKind::Manual => Ok(MockMode::Manual),
            MockModeKind::Random => {
                if source.interval_ms == 0 {
                    return Err(ConfigError::Invalid(
                        "Random source interval must be greater than zero".into(),
                    ));
                }
                let (low, high) = (source.power_min, source.power_max);
                if !(0.0..=1.0).contains(&low) || !(0.0..=1.0).contains(&high) || low > high {
                    return Err(ConfigError::Invalid(format!(
                        "Power range must lie within [0.0, 1.0] with min <= max, got {}..{}",
                        low, high
                    )));
                }
                let commands = source
                    .commands
                    .iter()
                    .map(|name| Command::parse_name(name))
                    .collect::<Result<Vec<_>, _>>()?;
                if commands.is_empty() {
                    return Err(ConfigError::Invalid(
                        "Random source needs at least one command".into(),
                    ));
                }
                Ok(MockMode::Random {
                    commands,
                    interval: Duration::from_millis(source.interval_ms),
                    power_range: (low, high),
                })
            }
            MockModeKind::Scripted => {
                let script = source
                    .script
                    .iter()
                    .map(|step| {
                        Ok(ScriptedEvent::new(
                            Duration::from_millis(step.delay_ms),
                            Command::parse_name(&step.command)?,
                            step.power,
                        ))
                    })
                    .collect::<Result<Vec<_>, ConfigError>>()?;
                if source.looped && script.iter().all(|step| step.delay.is_zero()) {
                    return Err(ConfigError::Invalid(
                        "A looped script needs at least one step with a delay".into(),
                    ));
                }
                Ok(MockMode::Scripted {
                    script,
                    looped: source.looped,
                })
            }
        }
    }
}

// An explicit or env-provided path must exist; the default location is optional.
fn resolve_path(
    explicit: Option<&Path>,
    env_value: Option<OsString>,
    default_path: Option<PathBuf>,
) -> Option<PathBuf> {
    if let Some(path) = explicit {
        return Some(path.to_path_buf());
    }
    if let Some(value) = env_value.filter(|v| !v.is_empty()) {
        return Some(PathBuf::from(value));
    }
    default_path.filter(|path| path.is_file())
}
