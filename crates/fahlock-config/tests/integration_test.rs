//! Integration tests for fahlock-config
//!
//! These tests verify the full config loading pipeline with real file system operations.

use fahlock_config::testing::TestEnvironment;
use fahlock_config::{Action, Config, ConfigError, LogLevel};
use tempfile::tempdir;

/// Test config loading from an explicit file
#[test]
fn test_load_explicit_config_file() {
    let env = TestEnvironment::new().unwrap();
    let path = env
        .write_config(
            r#"
[control]
address = "127.0.0.1:40000"
slots = [3, 1]

[helper]
program = "gnome-screensaver-command"
args = ["--watch", "-v"]
buffer_capacity = 512

[actions]
on_activate = "unpause"
on_deactivate = "pause"

[log]
level = "trace"
"#,
        )
        .unwrap();

    let config = Config::load_from(Some(path.as_path())).unwrap();

    assert_eq!(config.control.address.port(), 40000);
    assert_eq!(config.control.slots, vec![3, 1]);
    assert_eq!(config.helper.program, "gnome-screensaver-command");
    assert_eq!(config.helper.args, vec!["--watch", "-v"]);
    assert_eq!(config.helper.buffer_capacity, 512);
    assert_eq!(config.actions.on_activate, Action::Unpause);
    assert_eq!(config.actions.on_deactivate, Action::Pause);
    assert_eq!(config.log.level, LogLevel::Trace);
}

/// A missing explicit config is an error, not silently defaulted
#[test]
fn test_missing_explicit_config_fails() {
    let temp = tempdir().unwrap();
    let err = Config::load_from(Some(temp.path().join("nope.toml").as_path())).unwrap_err();
    assert!(matches!(err, ConfigError::Io(_)));
}

/// Invalid values are caught when loading
#[test]
fn test_load_rejects_invalid_config() {
    let env = TestEnvironment::new().unwrap();
    let path = env
        .write_config("[helper]\nbuffer_capacity = 0\n")
        .unwrap();
    let err = Config::load_from(Some(path.as_path())).unwrap_err();
    assert!(matches!(err, ConfigError::Invalid(_)));

    let path = env.write_config("[actions]\non_activate = \"explode\"\n").unwrap();
    let err = Config::load_from(Some(path.as_path())).unwrap_err();
    assert!(matches!(err, ConfigError::Toml(_)));
}

/// Test complete config serialization/deserialization cycle through a file
#[test]
fn test_config_full_roundtrip_with_all_sections() {
    let temp = tempdir().unwrap();
    let config_path = temp.path().join("config.toml");
    std::fs::write(&config_path, Config::default_toml().unwrap()).unwrap();

    let contents = std::fs::read_to_string(&config_path).unwrap();
    let loaded: Config = toml::from_str(&contents).unwrap();

    assert_eq!(loaded, Config::default());
}

/// Test partial config with defaults filling in
#[test]
fn test_partial_config_defaults_applied() {
    let partial = r#"
[actions]
on_deactivate = "unpause"
"#;
    let config: Config = toml::from_str(partial).unwrap();

    assert_eq!(config.actions.on_deactivate, Action::Unpause);
    assert_eq!(config.actions.on_activate, Action::Pause);
    assert_eq!(config.helper.program, "xscreensaver-command");
    assert_eq!(config.log.level, LogLevel::Info);
}
