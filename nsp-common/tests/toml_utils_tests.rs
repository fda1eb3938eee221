//! Unit tests for TOML atomic write utilities
//!
//! - Atomic file operations (temp + rename)
//! - Round trip of every persisted field
//! - Invalid settings are never written

use nsp_common::config::{write_toml_config, TomlConfig};
use nsp_common::Error;
use std::path::PathBuf;
use tempfile::TempDir;

fn lab_config() -> TomlConfig {
    let mut config = TomlConfig::default();
    config.devices.device_id = "1 2 (3 4) 5".to_string();
    config.reproduction.audio_duration = Some(2.0);
    config.reproduction.wait_duration = 0.75;
    config.reproduction.sampling_rate = Some(44100);
    config.paths.audio_library = PathBuf::from("/lab/audio");
    config
}

#[test]
fn test_atomic_write_leaves_no_temp_file() {
    let temp_dir = TempDir::new().unwrap();
    let target = temp_dir.path().join("config.toml");

    write_toml_config(&lab_config(), &target).unwrap();

    assert!(target.exists());
    assert!(!temp_dir.path().join("config.toml.tmp").exists());
}

#[test]
fn test_written_file_loads_back() {
    let temp_dir = TempDir::new().unwrap();
    let target = temp_dir.path().join("config.toml");
    let config = lab_config();

    write_toml_config(&config, &target).unwrap();
    let loaded = TomlConfig::load(&target).unwrap();

    assert_eq!(loaded, config);
}

#[test]
fn test_unset_duration_survives_write() {
    let temp_dir = TempDir::new().unwrap();
    let target = temp_dir.path().join("config.toml");
    let mut config = lab_config();
    config.reproduction.audio_duration = None;
    config.reproduction.sampling_rate = None;

    write_toml_config(&config, &target).unwrap();
    let loaded = TomlConfig::load(&target).unwrap();

    assert_eq!(loaded.reproduction.audio_duration, None);
    assert_eq!(loaded.reproduction.sampling_rate, None);
}

#[test]
fn test_overwrite_replaces_device_plan() {
    let temp_dir = TempDir::new().unwrap();
    let target = temp_dir.path().join("config.toml");

    write_toml_config(&lab_config(), &target).unwrap();

    let mut updated = TomlConfig::load(&target).unwrap();
    updated.devices.device_id = "(0 1)".to_string();
    write_toml_config(&updated, &target).unwrap();

    let loaded = TomlConfig::load(&target).unwrap();
    assert_eq!(loaded.devices.device_id, "(0 1)");
    assert_eq!(loaded.reproduction.wait_duration, 0.75);
}

#[test]
fn test_creates_missing_parent_directory() {
    let temp_dir = TempDir::new().unwrap();
    let target = temp_dir.path().join("nested").join("config.toml");

    write_toml_config(&lab_config(), &target).unwrap();
    assert!(target.exists());
}

#[test]
fn test_invalid_config_not_written() {
    let temp_dir = TempDir::new().unwrap();
    let target = temp_dir.path().join("config.toml");
    let mut config = lab_config();
    config.reproduction.wait_duration = -1.0;

    let result = write_toml_config(&config, &target);
    assert!(matches!(result, Err(Error::Config(_))));
    assert!(!target.exists());
}
