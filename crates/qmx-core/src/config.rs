//! Configuration model.
//!
//! Settings are read from a TOML file and then overridden from the
//! environment. Every field has a default, so an empty file is valid.

use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

/// Configuration errors.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    /// The configuration file could not be read.
    #[error("Failed to read config {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// The configuration file is not valid TOML for [`Settings`].
    #[error("Failed to parse config: {0}")]
    Parse(#[from] toml::de::Error),

    /// An environment override holds a value of the wrong type.
    #[error("Invalid value for {var}: {value}")]
    InvalidEnv { var: &'static str, value: String },
}

/// Environment variable names.
pub mod env_vars {
    pub const LOG_LEVEL: &str = "QMX_LOG_LEVEL";
    pub const LOG_JSON: &str = "QMX_LOG_JSON";
    pub const PLUGIN_DIR: &str = "QMX_PLUGIN_DIR";
}

/// Default values.
pub mod defaults {
    pub const LOG_LEVEL: &str = "info";
    pub const JOIN_TIMEOUT_MS: u64 = 5000;
}

/// Top-level settings.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Settings {
    pub logging: LoggingConfig,
    pub plugins: PluginConfig,
    pub threads: ThreadConfig,
}

/// Logging settings.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    /// `EnvFilter` directive used when `RUST_LOG` is unset.
    pub level: String,
    /// Emit JSON lines instead of compact human output.
    pub json: bool,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: defaults::LOG_LEVEL.to_string(),
            json: false,
        }
    }
}

/// Plugin loading settings.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PluginConfig {
    /// Directory scanned by auto-load.
    pub directory: Option<PathBuf>,
    /// Modules registered before any plugin is loaded.
    pub modules: Vec<String>,
    /// Initialize the plugin system once loading is done.
    pub initialize: bool,
}

impl Default for PluginConfig {
    fn default() -> Self {
        Self {
            directory: None,
            modules: Vec::new(),
            initialize: true,
        }
    }
}

/// Thread group settings.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ThreadConfig {
    pub join_timeout_ms: u64,
}

impl Default for ThreadConfig {
    fn default() -> Self {
        Self {
            join_timeout_ms: defaults::JOIN_TIMEOUT_MS,
        }
    }
}

impl ThreadConfig {
    pub fn join_timeout(&self) -> std::time::Duration {
        std::time::Duration::from_millis(self.join_timeout_ms)
    }
}

impl Settings {
    /// Parse settings from a TOML string.
    pub fn from_toml_str(s: &str) -> Result<Self, ConfigError> {
        Ok(toml::from_str(s)?)
    }

    /// Load settings from a TOML file.
    pub fn load(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        let content = std::fs::read_to_string(path).map_err(|source| ConfigError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        let settings = Self::from_toml_str(&content)?;
        tracing::debug!(path = %path.display(), "Loaded configuration");
        Ok(settings)
    }

    /// Apply overrides from the process environment.
    pub fn apply_env(&mut self) -> Result<(), ConfigError> {
        self.apply_env_with(|var| std::env::var(var).ok())
    }

    /// Apply overrides using `lookup` to resolve variable names.
    pub fn apply_env_with<F>(&mut self, lookup: F) -> Result<(), ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        if let Some(level) = lookup(env_vars::LOG_LEVEL) {
            self.logging.level = level;
        }

        if let Some(value) = lookup(env_vars::LOG_JSON) {
            self.logging.json = match value.to_ascii_lowercase().as_str() {
                "1" | "true" | "yes" | "on" => true,
                "0" | "false" | "no" | "off" => false,
                _ => {
                    return Err(ConfigError::InvalidEnv {
                        var: env_vars::LOG_JSON,
                        value,
                    })
                }
            };
        }

        if let Some(dir) = lookup(env_vars::PLUGIN_DIR) {
            self.plugins.directory = Some(PathBuf::from(dir));
        }

        Ok(())
    }
}
