//! Unit tests for configuration resolution and graceful degradation
//!
//! Covers:
//! - Missing settings file → warning + defaults, never termination
//! - Priority order for the settings file location
//! - Malformed files are reported with their path
//!
//! Note: Uses serial_test to prevent races on NSPEAKERS_CONFIG.
//! Tests that manipulate the environment are marked with #[serial].

use nsp_common::config::{resolve_config_path, TomlConfig, CONFIG_ENV_VAR};
use nsp_common::Error;
use serial_test::serial;
use std::env;
use std::path::{Path, PathBuf};
use tempfile::TempDir;

#[test]
fn test_missing_file_yields_defaults() {
    let temp_dir = TempDir::new().unwrap();
    let missing = temp_dir.path().join("absent.toml");

    let config = TomlConfig::load_or_default(&missing).unwrap();
    assert_eq!(config, TomlConfig::default());
}

#[test]
fn test_load_requires_existing_file() {
    let temp_dir = TempDir::new().unwrap();
    let missing = temp_dir.path().join("absent.toml");

    let result = TomlConfig::load(&missing);
    assert!(matches!(result, Err(Error::Io(_))));
}

#[test]
fn test_malformed_file_reports_path() {
    let temp_dir = TempDir::new().unwrap();
    let path = temp_dir.path().join("broken.toml");
    std::fs::write(&path, "[reproduction\nwait_duration = ").unwrap();

    match TomlConfig::load_or_default(&path) {
        Err(Error::ConfigParse { path: reported, .. }) => assert_eq!(reported, path),
        other => panic!("Expected ConfigParse error, got {:?}", other),
    }
}

#[test]
fn test_load_existing_file() {
    let temp_dir = TempDir::new().unwrap();
    let path = temp_dir.path().join("config.toml");
    std::fs::write(
        &path,
        "[devices]\ndevice_id = \"(0 1) 2\"\n\n[reproduction]\nwait_duration = 0.25\n",
    )
    .unwrap();

    let config = TomlConfig::load(&path).unwrap();
    assert_eq!(config.devices.device_id, "(0 1) 2");
    assert_eq!(config.reproduction.wait_duration, 0.25);
    assert_eq!(config.reproduction.audio_duration, None);
}

#[test]
#[serial]
fn test_env_var_used_without_cli_arg() {
    env::set_var(CONFIG_ENV_VAR, "/tmp/nspeakers-env.toml");

    let path = resolve_config_path(None);
    assert_eq!(path, PathBuf::from("/tmp/nspeakers-env.toml"));

    env::remove_var(CONFIG_ENV_VAR);
}

#[test]
#[serial]
fn test_cli_arg_takes_precedence_over_env_var() {
    env::set_var(CONFIG_ENV_VAR, "/tmp/nspeakers-env.toml");

    let path = resolve_config_path(Some(Path::new("/tmp/nspeakers-cli.toml")));
    assert_eq!(path, PathBuf::from("/tmp/nspeakers-cli.toml"));

    env::remove_var(CONFIG_ENV_VAR);
}

#[test]
#[serial]
fn test_blank_env_var_is_ignored() {
    env::set_var(CONFIG_ENV_VAR, "   ");

    let path = resolve_config_path(None);
    assert_ne!(path, PathBuf::from("   "));

    env::remove_var(CONFIG_ENV_VAR);
}
