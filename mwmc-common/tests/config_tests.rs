//! Tests for TOML bootstrap configuration loading

use mwmc_common::config::{ConfigOverrides, JitterSetting, TomlConfig};
use mwmc_common::Error;
use std::fs;
use std::path::PathBuf;
use tempfile::TempDir;

fn write_config(dir: &TempDir, text: &str) -> PathBuf {
    let path = dir.path().join("config.toml");
    fs::write(&path, text).unwrap();
    path
}

#[test]
fn test_load_full_config() {
    let dir = TempDir::new().unwrap();
    let path = write_config(
        &dir,
        r#"
rules_path = "rules.toml"
music_root = "music"

[connection]
host = "archipelago.gg"
port = 40000
slot = "Player1"

[reconnect]
initial_delay_ms = 500
max_delay_ms = 8000
factor = 3.0
stable_after_secs = 10
jitter = "equal"

[playback]
initial_volume = 0.5
queue_capacity = 64

[logging]
level = "debug"
"#,
    );

    let config = TomlConfig::load(&path, ConfigOverrides::default()).unwrap();

    assert_eq!(config.rules_path, dir.path().join("rules.toml"));
    assert_eq!(config.music_root, Some(dir.path().join("music")));
    assert_eq!(config.connection.address(), "archipelago.gg:40000");
    assert_eq!(config.connection.slot, "Player1");
    assert_eq!(config.reconnect.factor, 3.0);
    assert_eq!(config.reconnect.jitter, JitterSetting::Equal);
    assert_eq!(config.playback.initial_volume, 0.5);
    assert_eq!(config.playback.queue_capacity, 64);
    assert_eq!(config.logging.level, "debug");
}

#[test]
fn test_absolute_rules_path_kept() {
    let dir = TempDir::new().unwrap();
    let rules = dir.path().join("elsewhere").join("rules.toml");
    let path = write_config(&dir, &format!("rules_path = {:?}\n", rules));

    let config = TomlConfig::load(&path, ConfigOverrides::default()).unwrap();
    assert_eq!(config.rules_path, rules);
}

#[test]
fn test_cli_override_beats_file() {
    let dir = TempDir::new().unwrap();
    let path = write_config(&dir, "rules_path = \"rules.toml\"\n");

    let overrides = ConfigOverrides {
        rules_path: Some(PathBuf::from("/tmp/other.toml")),
        music_root: Some(PathBuf::from("/srv/music")),
        log_level: None,
    };
    let config = TomlConfig::load(&path, overrides).unwrap();

    assert_eq!(config.rules_path, PathBuf::from("/tmp/other.toml"));
    assert_eq!(config.music_root, Some(PathBuf::from("/srv/music")));
}

#[test]
fn test_missing_file_is_config_error() {
    let dir = TempDir::new().unwrap();
    let err = TomlConfig::load(&dir.path().join("absent.toml"), ConfigOverrides::default())
        .unwrap_err();
    assert!(matches!(err, Error::Config(_)));
    assert!(err.is_fatal());
}

#[test]
fn test_volume_out_of_range_rejected() {
    let dir = TempDir::new().unwrap();
    let path = write_config(
        &dir,
        "rules_path = \"rules.toml\"\n[playback]\ninitial_volume = 1.5\n",
    );
    assert!(TomlConfig::load(&path, ConfigOverrides::default()).is_err());
}
