//! System-wide configuration
//!
//! Stored as TOML at `<config_dir>/autosync/config.toml`. A missing file
//! means defaults; values are validated on load and before every save.

use anyhow::{Context, Result};
use dispatch::HubConfig;
use scheduler::DebounceConfig;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use thiserror::Error;

const APP_DIR: &str = "autosync";
const FILE_NAME: &str = "config.toml";

pub const LOG_LEVELS: [&str; 5] = ["trace", "debug", "info", "warn", "error"];
pub const MAX_DEBOUNCE_MS: u64 = 60_000;
pub const MAX_SIGNAL_CAPACITY: usize = 65_536;

/// Out-of-range configuration value
#[derive(Debug, Error, PartialEq, Eq)]
pub enum ConfigError {
    #[error("{key} must be between {min} and {max}, got {value}")]
    OutOfRange {
        key: &'static str,
        value: u64,
        min: u64,
        max: u64,
    },

    #[error("log.level must be one of trace, debug, info, warn, error, got '{0}'")]
    UnknownLevel(String),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct SignalsConfig {
    /// Buffered signals per subscriber
    pub capacity: usize,
}

impl Default for SignalsConfig {
    fn default() -> Self {
        Self { capacity: 256 }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct LogConfig {
    /// Default filter when RUST_LOG is unset
    pub level: String,
}

impl Default for LogConfig {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct SystemConfig {
    pub debounce: DebounceConfig,
    pub signals: SignalsConfig,
    pub log: LogConfig,
}

impl SystemConfig {
    pub fn validate(&self) -> Result<(), ConfigError> {
        check_range("debounce.continuous_ms", self.debounce.continuous_ms, 0, MAX_DEBOUNCE_MS)?;
        check_range("debounce.discrete_ms", self.debounce.discrete_ms, 0, MAX_DEBOUNCE_MS)?;
        check_range(
            "signals.capacity",
            self.signals.capacity as u64,
            1,
            MAX_SIGNAL_CAPACITY as u64,
        )?;
        if !LOG_LEVELS.contains(&self.log.level.as_str()) {
            return Err(ConfigError::UnknownLevel(self.log.level.clone()));
        }
        Ok(())
    }

    pub fn hub_config(&self) -> HubConfig {
        HubConfig {
            debounce: self.debounce,
            signal_capacity: self.signals.capacity,
        }
    }
}

fn check_range(key: &'static str, value: u64, min: u64, max: u64) -> Result<(), ConfigError> {
    if value < min || value > max {
        return Err(ConfigError::OutOfRange { key, value, min, max });
    }
    Ok(())
}

/// Where the system config lives, if the platform has a config dir
pub fn config_file_path() -> Option<PathBuf> {
    dirs::config_dir().map(|dir| dir.join(APP_DIR).join(FILE_NAME))
}

/// Load the system config, falling back to defaults
pub fn load() -> Result<SystemConfig> {
    match config_file_path() {
        Some(path) => load_from(&path),
        None => Ok(SystemConfig::default()),
    }
}

pub fn load_from(path: &Path) -> Result<SystemConfig> {
    if !path.exists() {
        return Ok(SystemConfig::default());
    }

    let contents = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read config file: {}", path.display()))?;
    let config: SystemConfig = toml::from_str(&contents)
        .with_context(|| format!("Failed to parse config file: {}", path.display()))?;
    config
        .validate()
        .with_context(|| format!("Invalid config file: {}", path.display()))?;

    Ok(config)
}

pub fn save(config: &SystemConfig) -> Result<()> {
    let path = config_file_path().context("Could not determine config directory")?;
    save_to(config, &path)
}

pub fn save_to(config: &SystemConfig, path: &Path) -> Result<()> {
    config.validate().context("Refusing to save invalid config")?;

    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent)
            .with_context(|| format!("Failed to create config directory: {}", parent.display()))?;
    }
    let contents = toml::to_string_pretty(config).context("Failed to serialize config")?;
    std::fs::write(path, contents)
        .with_context(|| format!("Failed to write config file: {}", path.display()))?;

    Ok(())
}

/// Write the default config if no file exists yet
pub fn init_if_missing() -> Result<PathBuf> {
    let path = config_file_path().context("Could not determine config directory")?;
    if !path.exists() {
        save_to(&SystemConfig::default(), &path)?;
    }
    Ok(path)
}

pub fn example_config() -> String {
    r#"# autosync system configuration
# Location: <config_dir>/autosync/config.toml

[debounce]
# Quiet period after the last keystroke before a save (0-60000)
continuous_ms = 300
# Delay for checkboxes, selects and other discrete controls (0-60000)
discrete_ms = 0

[signals]
# Signals buffered per subscriber before it starts lagging (1-65536)
capacity = 256

[log]
# Used when RUST_LOG is not set: trace, debug, info, warn, error
level = "info"
"#
    .to_string()
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_missing_file_yields_defaults() {
        let dir = TempDir::new().unwrap();
        let config = load_from(&dir.path().join("config.toml")).unwrap();
        assert_eq!(config, SystemConfig::default());
        assert_eq!(config.hub_config(), HubConfig::default());
    }

    #[test]
    fn test_save_then_load() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("nested").join("config.toml");

        let mut config = SystemConfig::default();
        config.debounce.continuous_ms = 750;
        config.log.level = "debug".to_string();
        save_to(&config, &path).unwrap();

        assert_eq!(load_from(&path).unwrap(), config);
    }

    #[test]
    fn test_partial_file_keeps_other_defaults() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("config.toml");
        std::fs::write(&path, "[debounce]\ncontinuous_ms = 500\n").unwrap();

        let config = load_from(&path).unwrap();
        assert_eq!(config.debounce.continuous_ms, 500);
        assert_eq!(config.debounce.discrete_ms, 0);
        assert_eq!(config.signals.capacity, 256);
    }

    #[test]
    fn test_validation_ranges() {
        let mut config = SystemConfig::default();
        config.debounce.continuous_ms = 60_001;
        assert!(matches!(
            config.validate(),
            Err(ConfigError::OutOfRange { key: "debounce.continuous_ms", .. })
        ));

        let mut config = SystemConfig::default();
        config.signals.capacity = 0;
        assert!(config.validate().is_err());

        let mut config = SystemConfig::default();
        config.log.level = "loud".to_string();
        assert_eq!(
            config.validate(),
            Err(ConfigError::UnknownLevel("loud".to_string()))
        );
    }

    #[test]
    fn test_invalid_file_is_rejected() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("config.toml");
        std::fs::write(&path, "[signals]\ncapacity = 0\n").unwrap();
        assert!(load_from(&path).is_err());
    }

    #[test]
    fn test_example_parses_to_defaults() {
        let config: SystemConfig = toml::from_str(&example_config()).unwrap();
        assert_eq!(config, SystemConfig::default());
    }
}
