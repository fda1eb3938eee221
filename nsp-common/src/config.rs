//! Configuration loading and config file resolution
//!
//! The settings file is a small TOML document:
//!
//! ```toml
//! [devices]
//! device_id = "1 2 (3 4) 5"
//!
//! [reproduction]
//! audio_duration = ""      # seconds, or empty to use the file length
//! wait_duration = 0.5
//! sampling_rate = 44100    # optional, defaults to the slowest device
//! test_duration = 30
//!
//! [paths]
//! audio_library = "./audio"
//!
//! [logging]
//! level = "info"
//! ```
//!
//! # Graceful degradation
//!
//! A missing settings file is not an error: a warning is logged and built-in
//! defaults are used. A present but malformed file is an error, since playing
//! with half-read timing parameters would be worse than not playing at all.

use crate::time::try_seconds_to_duration;
use crate::{Error, Result};
use serde::{Deserialize, Deserializer, Serialize};
use std::path::{Path, PathBuf};
use tracing::{debug, info, warn};

/// Environment variable naming an explicit settings file
pub const CONFIG_ENV_VAR: &str = "NSPEAKERS_CONFIG";

/// Settings file looked up in the working directory
pub const LOCAL_CONFIG_FILE: &str = "config.toml";

/// Default gap between successive groups (seconds)
pub const DEFAULT_WAIT_SECONDS: f64 = 0.5;

/// Default length of the self-test routine (seconds)
pub const DEFAULT_TEST_SECONDS: f64 = 30.0;

/// Complete settings file
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct TomlConfig {
    #[serde(default)]
    pub devices: DevicesConfig,

    #[serde(default)]
    pub reproduction: ReproductionSettings,

    #[serde(default)]
    pub paths: PathsConfig,

    #[serde(default)]
    pub logging: LoggingConfig,
}

/// Output device selection
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct DevicesConfig {
    /// Group-plan expression, e.g. `"1 2 (3 4) 5"`
    #[serde(default)]
    pub device_id: String,
}

/// Reproduction timing
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ReproductionSettings {
    /// Playback length per signal in seconds; `None` plays each file to its end
    #[serde(
        default,
        deserialize_with = "deserialize_optional_seconds",
        skip_serializing_if = "Option::is_none"
    )]
    pub audio_duration: Option<f64>,

    /// Gap between successive groups in seconds
    #[serde(default = "default_wait_duration")]
    pub wait_duration: f64,

    /// Output rate override; `None` uses the minimum native rate of the devices
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub sampling_rate: Option<u32>,

    /// How long the self-test routine keeps cycling, in seconds
    #[serde(default = "default_test_duration")]
    pub test_duration: f64,
}

impl Default for ReproductionSettings {
    fn default() -> Self {
        Self {
            audio_duration: None,
            wait_duration: DEFAULT_WAIT_SECONDS,
            sampling_rate: None,
            test_duration: DEFAULT_TEST_SECONDS,
        }
    }
}

/// File system locations
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PathsConfig {
    /// Root folder browsed in custom mode; must contain `test/` for test mode
    #[serde(default = "default_audio_library")]
    pub audio_library: PathBuf,
}

impl Default for PathsConfig {
    fn default() -> Self {
        Self {
            audio_library: default_audio_library(),
        }
    }
}

/// Logging configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LoggingConfig {
    /// Log level (trace, debug, info, warn, error)
    #[serde(default = "default_log_level")]
    pub level: String,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
        }
    }
}

fn default_wait_duration() -> f64 {
    DEFAULT_WAIT_SECONDS
}

fn default_test_duration() -> f64 {
    DEFAULT_TEST_SECONDS
}

fn default_audio_library() -> PathBuf {
    PathBuf::from("./audio")
}

fn default_log_level() -> String {
    "info".to_string()
}

/// Accepts a number, a numeric string, or an empty string (meaning "unset").
fn deserialize_optional_seconds<'de, D>(deserializer: D) -> std::result::Result<Option<f64>, D::Error>
where
    D: Deserializer<'de>,
{
    #[derive(Deserialize)]
    #[serde(untagged)]
    enum Raw {
        Integer(i64),
        Float(f64),
        Text(String),
    }

    match Raw::deserialize(deserializer)? {
        Raw::Integer(value) => Ok(Some(value as f64)),
        Raw::Float(value) => Ok(Some(value)),
        Raw::Text(text) => {
            let trimmed = text.trim();
            if trimmed.is_empty() {
                Ok(None)
            } else {
                trimmed
                    .parse::<f64>()
                    .map(Some)
                    .map_err(|_| serde::de::Error::custom(format!("invalid duration '{}'", trimmed)))
            }
        }
    }
}

impl TomlConfig {
    /// Parse settings from TOML text and validate them.
    pub fn from_toml_str(content: &str, origin: &Path) -> Result<Self> {
        let config: TomlConfig = toml::from_str(content).map_err(|source| Error::ConfigParse {
            path: origin.to_path_buf(),
            source,
        })?;
        config.validate()?;
        Ok(config)
    }

    /// Load settings from a file that must exist.
    pub fn load(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)?;
        let config = Self::from_toml_str(&content, path)?;
        debug!("Loaded configuration from {}", path.display());
        Ok(config)
    }

    /// Load settings, falling back to defaults when the file does not exist.
    pub fn load_or_default(path: &Path) -> Result<Self> {
        if !path.exists() {
            warn!(
                "Configuration file {} not found, using built-in defaults",
                path.display()
            );
            return Ok(Self::default());
        }
        Self::load(path)
    }

    /// Check value ranges that serde cannot express.
    pub fn validate(&self) -> Result<()> {
        let repro = &self.reproduction;

        if let Some(duration) = repro.audio_duration {
            if duration <= 0.0 || try_seconds_to_duration(duration).is_none() {
                return Err(Error::Config(format!(
                    "audio_duration must be a positive number of seconds, got {}",
                    duration
                )));
            }
        }

        if try_seconds_to_duration(repro.wait_duration).is_none() {
            return Err(Error::Config(format!(
                "wait_duration must be zero or more seconds, got {}",
                repro.wait_duration
            )));
        }

        if repro.sampling_rate == Some(0) {
            return Err(Error::Config("sampling_rate must be greater than zero".to_string()));
        }

        if try_seconds_to_duration(repro.test_duration).is_none() {
            return Err(Error::Config(format!(
                "test_duration must be zero or more seconds, got {}",
                repro.test_duration
            )));
        }

        Ok(())
    }
}

/// Settings file resolution in priority order:
/// 1. Command-line argument (highest priority)
/// 2. `NSPEAKERS_CONFIG` environment variable
/// 3. `config.toml` in the working directory
/// 4. Platform config directory (`<config_dir>/nspeakers/config.toml`)
///
/// When none exists, the working-directory path is returned so that a later
/// save creates the file where the operator expects it.
pub fn resolve_config_path(cli_arg: Option<&Path>) -> PathBuf {
    if let Some(path) = cli_arg {
        return path.to_path_buf();
    }

    if let Ok(path) = std::env::var(CONFIG_ENV_VAR) {
        if !path.trim().is_empty() {
            return PathBuf::from(path);
        }
    }

    let local = PathBuf::from(LOCAL_CONFIG_FILE);
    if local.exists() {
        return local;
    }

    if let Some(user_config) = platform_config_file() {
        if user_config.exists() {
            return user_config;
        }
    }

    local
}

/// Platform-specific settings file location
fn platform_config_file() -> Option<PathBuf> {
    dirs::config_dir().map(|d| d.join("nspeakers").join(LOCAL_CONFIG_FILE))
}

/// Write settings atomically (temp file + rename).
///
/// Fields are written in the canonical layout, so comments in a hand-edited
/// file are not preserved.
pub fn write_toml_config(config: &TomlConfig, path: &Path) -> Result<()> {
    config.validate()?;

    let content = toml::to_string_pretty(config)
        .map_err(|e| Error::Config(format!("Failed to serialize configuration: {}", e)))?;

    if let Some(parent) = path.parent() {
        if !parent.as_os_str().is_empty() && !parent.exists() {
            std::fs::create_dir_all(parent)?;
        }
    }

    let mut temp_name = path.as_os_str().to_owned();
    temp_name.push(".tmp");
    let temp_path = PathBuf::from(temp_name);

    std::fs::write(&temp_path, content)?;
    if let Err(e) = std::fs::rename(&temp_path, path) {
        let _ = std::fs::remove_file(&temp_path);
        return Err(e.into());
    }

    info!("Configuration written to {}", path.display());
    Ok(())
}
