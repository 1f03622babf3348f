//! Configuration system for the sandpit interception bridge.
//!
//! Configuration is read from `~/.config/sandpit/config.yaml` (or the path in
//! `SANDPIT_CONFIG_PATH`). Every field has a default, so a missing file or a
//! partial file is always valid input.

pub mod defaults;
pub mod error;

use std::fs;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};

pub use error::ConfigError;

/// Environment variable overriding the config file location.
pub const CONFIG_PATH_ENV: &str = "SANDPIT_CONFIG_PATH";
/// Environment variable overriding `intercept.log_path`.
pub const LOG_PATH_ENV: &str = "SANDPIT_LOG_PATH";
/// Default config filename (relative to the config dir).
pub const CONFIG_FILENAME: &str = "config.yaml";

/// How the proxy wrapper is put in place inside a script context.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum InstallMode {
    /// Wrap the host object through the native object interface.
    #[default]
    Native,
    /// Generate a bootstrap script and have the frame execute it.
    Script,
}

/// Settings for the trap interception layer.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct InterceptConfig {
    /// Whether interception is installed at all (default: true)
    #[serde(default = "crate::defaults::bool_true")]
    pub enabled: bool,

    /// Global name of the native callable registered in every context
    #[serde(default = "crate::defaults::function_name")]
    pub function_name: String,

    /// Global name of the host object to wrap
    #[serde(default = "crate::defaults::target_object")]
    pub target_object: String,

    /// Append-only trap log
    #[serde(default = "crate::defaults::log_path")]
    pub log_path: PathBuf,

    /// Installation strategy
    #[serde(default)]
    pub mode: InstallMode,
}

impl Default for InterceptConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            function_name: defaults::function_name(),
            target_object: defaults::target_object(),
            log_path: defaults::log_path(),
            mode: InstallMode::default(),
        }
    }
}

/// Settings for the renderer/controller query bridge.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BridgeConfig {
    /// Script-visible name of the query function
    #[serde(default = "crate::defaults::query_function")]
    pub query_function: String,

    /// Script-visible name of the query cancel function
    #[serde(default = "crate::defaults::cancel_function")]
    pub cancel_function: String,
}

impl Default for BridgeConfig {
    fn default() -> Self {
        Self {
            query_function: defaults::query_function(),
            cancel_function: defaults::cancel_function(),
        }
    }
}

/// Top-level configuration.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub intercept: InterceptConfig,

    #[serde(default)]
    pub bridge: BridgeConfig,
}

impl Config {
    /// Load configuration from the default location.
    ///
    /// A missing file yields [`Config::default`]. Environment overrides are
    /// applied either way.
    pub fn load() -> Result<Self> {
        let path = Self::config_path();
        log::info!("Config path: {:?}", path);

        if path.exists() {
            return Self::load_from(&path);
        }
        log::info!("Config file not found at {:?}, using defaults", path);
        let mut config = Self::default();
        config.apply_env_overrides();
        config.validate()?;
        Ok(config)
    }

    /// Parse and validate a config file at an explicit path.
    ///
    /// Environment overrides are applied after parsing.
    pub fn load_from(path: &Path) -> Result<Self> {
        let contents = fs::read_to_string(path)
            .map_err(ConfigError::from)
            .with_context(|| format!("reading {}", path.display()))?;
        let mut config = Self::from_yaml(&contents)?;
        config.apply_env_overrides();
        config.validate()?;
        Ok(config)
    }

    /// Replace `intercept.log_path` with `SANDPIT_LOG_PATH` when it is set
    /// and non-empty.
    pub fn apply_env_overrides(&mut self) {
        if let Some(log_path) = std::env::var_os(LOG_PATH_ENV)
            && !log_path.is_empty()
        {
            log::debug!("{} overrides intercept.log_path", LOG_PATH_ENV);
            self.intercept.log_path = PathBuf::from(log_path);
        }
    }

    /// Parse and validate YAML text.
    pub fn from_yaml(contents: &str) -> Result<Self, ConfigError> {
        let config: Config = serde_yaml_ng::from_str(contents)?;
        config.validate()?;
        Ok(config)
    }

    /// Check the names that get interpolated into generated script.
    pub fn validate(&self) -> Result<(), ConfigError> {
        let names = [
            ("intercept.function_name", &self.intercept.function_name),
            ("intercept.target_object", &self.intercept.target_object),
            ("bridge.query_function", &self.bridge.query_function),
            ("bridge.cancel_function", &self.bridge.cancel_function),
        ];
        for (field, value) in names {
            if !is_script_identifier(value) {
                return Err(ConfigError::Validation(format!(
                    "{field} must be a plain script identifier, got {value:?}"
                )));
            }
        }
        if self.intercept.function_name == self.intercept.target_object {
            return Err(ConfigError::Validation(
                "intercept.function_name and intercept.target_object must differ".to_string(),
            ));
        }
        Ok(())
    }

    /// Write the configuration as YAML, creating parent directories.
    ///
    /// Writes to a temp file first and renames it into place.
    pub fn save_to(&self, path: &Path) -> Result<()> {
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)
                .with_context(|| format!("creating {}", parent.display()))?;
        }
        let yaml = serde_yaml_ng::to_string(self).map_err(ConfigError::from)?;
        let temp_path = path.with_extension("yaml.tmp");
        fs::write(&temp_path, yaml).map_err(ConfigError::from)?;
        fs::rename(&temp_path, path).map_err(ConfigError::from)?;
        Ok(())
    }

    /// Resolve the config file path.
    ///
    /// Checks `SANDPIT_CONFIG_PATH` first, then falls back to
    /// `<config_dir>/sandpit/config.yaml`.
    pub fn config_path() -> PathBuf {
        if let Ok(path) = std::env::var(CONFIG_PATH_ENV) {
            return PathBuf::from(path);
        }
        Self::config_dir().join(CONFIG_FILENAME)
    }

    /// Directory holding sandpit configuration.
    pub fn config_dir() -> PathBuf {
        dirs::config_dir()
            .unwrap_or_else(|| {
                // Last resort: ~/.config
                dirs::home_dir()
                    .unwrap_or_else(|| PathBuf::from("."))
                    .join(".config")
            })
            .join("sandpit")
    }
}

/// `true` when `name` can be used verbatim as a global identifier in script.
pub fn is_script_identifier(name: &str) -> bool {
    let mut chars = name.chars();
    match chars.next() {
        Some(c) if c.is_ascii_alphabetic() || c == '_' || c == '$' => {}
        _ => return false,
    }
    chars.all(|c| c.is_ascii_alphanumeric() || c == '_' || c == '$')
}
