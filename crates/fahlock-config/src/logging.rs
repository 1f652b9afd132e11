//! Structured logging utilities for fahlock components.
//!
//! Provides consistent logging with component prefixes and structured fields.
//!
//! # Usage
//!
//! ```ignore
//! use fahlock_config::log_control_debug;
//!
//! log_control_debug!("Command sent", command = "pause");
//! log_watch_info!("Screen saver state changed", active = true);
//! ```

use serde::{Deserialize, Serialize};
use std::str::FromStr;

/// Component identifiers for log filtering
pub struct Component;

impl Component {
    pub const REACTOR: &'static str = "REACTOR";
    pub const CONTROL: &'static str = "CONTROL";
    pub const WATCH: &'static str = "WATCH";
    pub const DAEMON: &'static str = "DAEMON";
}

/// Log levels for runtime configuration
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LogLevel {
    Error,
    Warn,
    Info,
    Debug,
    Trace,
}

impl LogLevel {
    /// Raise verbosity by `steps` levels, saturating at `Trace`
    pub fn raised(self, steps: u8) -> Self {
        const ORDER: [LogLevel; 5] = [
            LogLevel::Error,
            LogLevel::Warn,
            LogLevel::Info,
            LogLevel::Debug,
            LogLevel::Trace,
        ];
        let index = ORDER.iter().position(|l| *l == self).unwrap_or(0);
        ORDER[(index + steps as usize).min(ORDER.len() - 1)]
    }

    pub fn as_str(self) -> &'static str {
        match self {
            LogLevel::Error => "error",
            LogLevel::Warn => "warn",
            LogLevel::Info => "info",
            LogLevel::Debug => "debug",
            LogLevel::Trace => "trace",
        }
    }
}

impl FromStr for LogLevel {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "error" => Ok(LogLevel::Error),
            "warn" | "warning" => Ok(LogLevel::Warn),
            "info" => Ok(LogLevel::Info),
            "debug" => Ok(LogLevel::Debug),
            "trace" => Ok(LogLevel::Trace),
            other => Err(format!("unknown log level {:?}", other)),
        }
    }
}

// === REACTOR logging macros ===

#[macro_export]
macro_rules! log_reactor_warn {
    ($msg:literal $(, $key:ident = $value:expr)* $(,)?) => {
        tracing::warn!(component = "REACTOR", $($key = $value,)* $msg)
    };
}

#[macro_export]
macro_rules! log_reactor_debug {
    ($msg:literal $(, $key:ident = $value:expr)* $(,)?) => {
        tracing::debug!(component = "REACTOR", $($key = $value,)* $msg)
    };
}

// === CONTROL logging macros ===

#[macro_export]
macro_rules! log_control_warn {
    ($msg:literal $(, $key:ident = $value:expr)* $(,)?) => {
        tracing::warn!(component = "CONTROL", $($key = $value,)* $msg)
    };
}

#[macro_export]
macro_rules! log_control_info {
    ($msg:literal $(, $key:ident = $value:expr)* $(,)?) => {
        tracing::info!(component = "CONTROL", $($key = $value,)* $msg)
    };
}

#[macro_export]
macro_rules! log_control_debug {
    ($msg:literal $(, $key:ident = $value:expr)* $(,)?) => {
        tracing::debug!(component = "CONTROL", $($key = $value,)* $msg)
    };
}

// === WATCH logging macros ===

#[macro_export]
macro_rules! log_watch_warn {
    ($msg:literal $(, $key:ident = $value:expr)* $(,)?) => {
        tracing::warn!(component = "WATCH", $($key = $value,)* $msg)
    };
}

#[macro_export]
macro_rules! log_watch_info {
    ($msg:literal $(, $key:ident = $value:expr)* $(,)?) => {
        tracing::info!(component = "WATCH", $($key = $value,)* $msg)
    };
}

#[macro_export]
macro_rules! log_watch_debug {
    ($msg:literal $(, $key:ident = $value:expr)* $(,)?) => {
        tracing::debug!(component = "WATCH", $($key = $value,)* $msg)
    };
}

// === DAEMON logging macros ===

#[macro_export]
macro_rules! log_daemon_error {
    ($msg:literal $(, $key:ident = $value:expr)* $(,)?) => {
        tracing::error!(component = "DAEMON", $($key = $value,)* $msg)
    };
}

#[macro_export]
macro_rules! log_daemon_info {
    ($msg:literal $(, $key:ident = $value:expr)* $(,)?) => {
        tracing::info!(component = "DAEMON", $($key = $value,)* $msg)
    };
}

#[macro_export]
macro_rules! log_daemon_debug {
    ($msg:literal $(, $key:ident = $value:expr)* $(,)?) => {
        tracing::debug!(component = "DAEMON", $($key = $value,)* $msg)
    };
}

/// Initialize logging with the given level filter.
/// Call this once at application startup. `RUST_LOG` takes precedence.
pub fn init_logging(level: LogLevel) {
    use tracing_subscriber::EnvFilter;

    let env_filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(level.as_str()));

    tracing_subscriber::fmt()
        .with_env_filter(env_filter)
        .with_target(false)
        .with_writer(std::io::stderr)
        .init();
}
