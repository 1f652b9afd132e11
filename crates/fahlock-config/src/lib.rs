//! # fahlock-config
//!
//! Configuration management for fahlock.
//!
//! Loads configuration from:
//! 1. Built-in defaults
//! 2. `$XDG_CONFIG_HOME/fahlock/config.toml` (global), or an explicit file
//! 3. Environment variables (highest priority)
//!
//! Command-line flags are applied on top by the daemon.

pub mod logging;
pub mod testing;

use serde::{Deserialize, Serialize};
use std::net::{Ipv4Addr, SocketAddr, SocketAddrV4};
use std::path::{Path, PathBuf};
use tracing::debug;

pub use logging::{init_logging, LogLevel};

/// Port the Folding@Home client listens on for its command protocol.
pub const DEFAULT_CONTROL_PORT: u16 = 36330;

/// Default size of the helper line buffer.
pub const DEFAULT_BUFFER_CAPACITY: usize = 256;

pub const ENV_CONTROL_ADDR: &str = "FAHLOCK_CONTROL_ADDR";
pub const ENV_HELPER: &str = "FAHLOCK_HELPER";
pub const ENV_LOG: &str = "FAHLOCK_LOG";

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
    #[error("TOML parse error: {0}")]
    Toml(#[from] toml::de::Error),
    #[error("TOML serialize error: {0}")]
    TomlSer(#[from] toml::ser::Error),
    #[error("invalid configuration: {0}")]
    Invalid(String),
}

/// Main configuration structure
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    pub control: ControlConfig,
    pub helper: HelperConfig,
    pub actions: ActionsConfig,
    pub log: LogConfig,
}

impl Config {
    /// Load config from the global location, if it exists
    pub fn load() -> Result<Self, ConfigError> {
        Self::load_from(None)
    }

    /// Load config from `path`, or from the global location when `None`.
    ///
    /// An explicit path must exist; a missing global file just yields defaults.
    pub fn load_from(path: Option<&Path>) -> Result<Self, ConfigError> {
        let mut config = match path {
            Some(path) => {
                debug!("Loading config from {:?}", path);
                Self::from_toml_str(&std::fs::read_to_string(path)?)?
            }
            None => match Self::global_config_path() {
                Some(global_path) if global_path.exists() => {
                    debug!("Loading global config from {:?}", global_path);
                    Self::from_toml_str(&std::fs::read_to_string(&global_path)?)?
                }
                _ => Config::default(),
            },
        };

        config.apply_overrides(|key| std::env::var(key).ok())?;
        config.validate()?;

        Ok(config)
    }

    pub fn from_toml_str(contents: &str) -> Result<Self, ConfigError> {
        Ok(toml::from_str(contents)?)
    }

    /// Global config path: `~/.config/fahlock/config.toml` on Linux
    pub fn global_config_path() -> Option<PathBuf> {
        dirs::config_dir().map(|d| d.join("fahlock").join("config.toml"))
    }

    /// Apply environment-style overrides read through `lookup`
    pub fn apply_overrides<F>(&mut self, lookup: F) -> Result<(), ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        if let Some(addr) = lookup(ENV_CONTROL_ADDR) {
            self.control.address = addr.parse().map_err(|e| {
                ConfigError::Invalid(format!("{}={:?}: {}", ENV_CONTROL_ADDR, addr, e))
            })?;
        }
        if let Some(program) = lookup(ENV_HELPER) {
            self.helper.program = program;
        }
        if let Some(level) = lookup(ENV_LOG) {
            self.log.level = level
                .parse()
                .map_err(|e| ConfigError::Invalid(format!("{}: {}", ENV_LOG, e)))?;
        }
        Ok(())
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.helper.program.trim().is_empty() {
            return Err(ConfigError::Invalid("helper.program is empty".to_string()));
        }
        if self.helper.buffer_capacity < 2 {
            return Err(ConfigError::Invalid(format!(
                "helper.buffer_capacity must be at least 2, got {}",
                self.helper.buffer_capacity
            )));
        }
        Ok(())
    }

    /// Generate default config TOML string
    pub fn default_toml() -> Result<String, ConfigError> {
        Ok(toml::to_string_pretty(&Config::default())?)
    }
}

/// Folding@Home control connection
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ControlConfig {
    /// Address of the client's command socket
    pub address: SocketAddr,
    /// Slots to act on; empty means all of them
    pub slots: Vec<u32>,
}

impl Default for ControlConfig {
    fn default() -> Self {
        Self {
            address: SocketAddr::V4(SocketAddrV4::new(Ipv4Addr::LOCALHOST, DEFAULT_CONTROL_PORT)),
            slots: Vec::new(),
        }
    }
}

/// Screen saver helper process
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct HelperConfig {
    pub program: String,
    pub args: Vec<String>,
    /// Line buffer size in bytes; the longest accepted line is one less
    pub buffer_capacity: usize,
}

impl Default for HelperConfig {
    fn default() -> Self {
        Self {
            program: "xscreensaver-command".to_string(),
            args: vec!["-watch".to_string()],
            buffer_capacity: DEFAULT_BUFFER_CAPACITY,
        }
    }
}

/// What to tell the client when the screen saver changes state
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Action {
    Pause,
    Unpause,
    #[serde(rename = "none")]
    Ignore,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ActionsConfig {
    pub on_activate: Action,
    pub on_deactivate: Action,
}

impl Default for ActionsConfig {
    fn default() -> Self {
        Self {
            on_activate: Action::Pause,
            on_deactivate: Action::Ignore,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct LogConfig {
    pub level: LogLevel,
}

impl Default for LogConfig {
    fn default() -> Self {
        Self {
            level: LogLevel::Info,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    #[test]
    fn test_default_config() {
        let config = Config::default();
        assert_eq!(config.control.address.to_string(), "127.0.0.1:36330");
        assert!(config.control.slots.is_empty());
        assert_eq!(config.helper.program, "xscreensaver-command");
        assert_eq!(config.helper.args, vec!["-watch"]);
        assert_eq!(config.actions.on_activate, Action::Pause);
        assert_eq!(config.actions.on_deactivate, Action::Ignore);
        config.validate().unwrap();
    }

    #[test]
    fn test_default_toml_generation() {
        let toml_str = Config::default_toml().unwrap();
        assert!(toml_str.contains("[control]"));
        assert!(toml_str.contains("[helper]"));
        assert!(toml_str.contains("127.0.0.1:36330"));
        assert!(toml_str.contains("on_deactivate = \"none\""));
    }

    #[test]
    fn test_toml_roundtrip() {
        let config = Config::default();
        let toml_str = toml::to_string(&config).unwrap();
        let parsed: Config = toml::from_str(&toml_str).unwrap();
        assert_eq!(config, parsed);
    }

    #[test]
    fn test_partial_toml_keeps_defaults() {
        let config = Config::from_toml_str("[control]\nslots = [2, 0]\n").unwrap();
        assert_eq!(config.control.slots, vec![2, 0]);
        assert_eq!(config.control.address.port(), DEFAULT_CONTROL_PORT);
        assert_eq!(config.helper.buffer_capacity, DEFAULT_BUFFER_CAPACITY);
    }

    #[test]
    fn test_overrides() {
        let vars: HashMap<&str, &str> = [
            (ENV_CONTROL_ADDR, "127.0.0.1:4000"),
            (ENV_HELPER, "/usr/local/bin/watcher"),
            (ENV_LOG, "debug"),
        ]
        .into_iter()
        .collect();

        let mut config = Config::default();
        config
            .apply_overrides(|k| vars.get(k).map(|v| v.to_string()))
            .unwrap();
        assert_eq!(config.control.address.port(), 4000);
        assert_eq!(config.helper.program, "/usr/local/bin/watcher");
        assert_eq!(config.log.level, LogLevel::Debug);
    }

    #[test]
    fn test_bad_address_override() {
        let mut config = Config::default();
        let err = config
            .apply_overrides(|k| (k == ENV_CONTROL_ADDR).then(|| "localhost".to_string()))
            .unwrap_err();
        assert!(matches!(err, ConfigError::Invalid(_)));
    }

    #[test]
    fn test_validate_rejects_tiny_buffer() {
        let mut config = Config::default();
        config.helper.buffer_capacity = 1;
        assert!(config.validate().is_err());

        config.helper.buffer_capacity = 2;
        config.helper.program = "  ".to_string();
        assert!(config.validate().is_err());
    }
}
