//! Configuration management for RouteScope
//!
//! These are the tool's own settings, not the Alertmanager configuration
//! being inspected. Sources, lowest precedence first: built-in defaults, the
//! settings file, `ROUTESCOPE__SECTION__KEY` environment variables.

use std::path::{Path, PathBuf};

use config::{Environment, File};
use directories::ProjectDirs;
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::error::Result;

/// Main settings struct
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Settings {
    /// Logging configuration
    pub logging: LoggingConfig,

    /// Configuration assembly (`render`) settings
    pub render: RenderConfig,

    /// Evaluation settings
    pub evaluation: EvaluationConfig,
}

impl Settings {
    /// Load settings from `path`, or from the default location when `None`.
    ///
    /// An explicit path must exist; the default file is optional.
    pub fn load(path: Option<&Path>) -> Result<Self> {
        let file = match path {
            Some(path) => File::from(path).required(true),
            None => match default_settings_path() {
                Some(default) => File::from(default).required(false),
                None => return Self::from_env(),
            },
        };

        let settings = config::Config::builder()
            .add_source(file)
            .add_source(env_source())
            .build()?
            .try_deserialize()?;
        debug!(?settings, "Loaded settings");
        Ok(settings)
    }

    fn from_env() -> Result<Self> {
        Ok(config::Config::builder()
            .add_source(env_source())
            .build()?
            .try_deserialize()?)
    }
}

fn env_source() -> Environment {
    Environment::with_prefix("ROUTESCOPE")
        .prefix_separator("__")
        .separator("__")
}

/// `<config dir>/routescope/config.toml` for the current platform
pub fn default_settings_path() -> Option<PathBuf> {
    ProjectDirs::from("dev", "routescope", "routescope")
        .map(|dirs| dirs.config_dir().join("config.toml"))
}

/// Logging configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    /// Log level
    pub level: String,
    /// Log format (json or pretty)
    pub format: String,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "warn".to_string(),
            format: "pretty".to_string(),
        }
    }
}

/// Configuration assembly settings
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RenderConfig {
    /// Base document inside the configuration directory
    pub base_file: String,
    /// Assembled output, written next to the base document
    pub output_file: String,
}

impl Default for RenderConfig {
    fn default() -> Self {
        Self {
            base_file: "base.yaml".to_string(),
            output_file: "alertmanager.yaml".to_string(),
        }
    }
}

/// Evaluation settings
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct EvaluationConfig {
    /// Receiver given to a root route that declares none
    pub default_receiver: Option<String>,
}
