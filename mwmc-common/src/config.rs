//! Bootstrap configuration
//!
//! Loaded once from a TOML file at startup and immutable afterwards.
//!
//! # Settings Sources Priority
//!
//! 1. Command-line arguments / environment (applied through [`ConfigOverrides`])
//! 2. TOML configuration file
//! 3. Built-in defaults (code constants)

use serde::Deserialize;
use std::path::{Path, PathBuf};
use std::time::Duration;
use tracing::info;

use crate::{Error, Result};

/// Configuration file name inside the platform config directory
pub const CONFIG_FILE_NAME: &str = "config.toml";

/// Application folder name inside platform directories
pub const APP_DIR_NAME: &str = "mwmc";

/// Bootstrap configuration loaded from TOML file
#[derive(Debug, Clone, Deserialize)]
pub struct TomlConfig {
    /// Path to the TrackRule table (relative paths resolve against the config file)
    pub rules_path: PathBuf,

    /// Folder prefixed onto relative track asset paths
    #[serde(default)]
    pub music_root: Option<PathBuf>,

    #[serde(default)]
    pub connection: ConnectionConfig,

    #[serde(default)]
    pub reconnect: ReconnectConfig,

    #[serde(default)]
    pub playback: PlaybackConfig,

    #[serde(default)]
    pub logging: LoggingConfig,
}

/// Multiworld server connection settings
///
/// Only identifies the session in logs for now; the network client that
/// would log in with them sits outside this crate.
#[derive(Debug, Clone, Deserialize)]
pub struct ConnectionConfig {
    #[serde(default = "default_host")]
    pub host: String,

    #[serde(default = "default_server_port")]
    pub port: u16,

    /// Slot (player) name
    #[serde(default)]
    pub slot: String,
}

impl Default for ConnectionConfig {
    fn default() -> Self {
        Self {
            host: default_host(),
            port: default_server_port(),
            slot: String::new(),
        }
    }
}

impl ConnectionConfig {
    pub fn address(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }
}

/// Jitter applied to reconnect delays
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum JitterSetting {
    #[default]
    None,
    Full,
    Equal,
}

/// Reconnect backoff settings
#[derive(Debug, Clone, Deserialize)]
pub struct ReconnectConfig {
    #[serde(default = "default_initial_delay_ms")]
    pub initial_delay_ms: u64,

    #[serde(default = "default_max_delay_ms")]
    pub max_delay_ms: u64,

    #[serde(default = "default_factor")]
    pub factor: f64,

    /// A connection that lasted this long resets the backoff
    #[serde(default = "default_stable_after_secs")]
    pub stable_after_secs: u64,

    #[serde(default)]
    pub jitter: JitterSetting,
}

impl Default for ReconnectConfig {
    fn default() -> Self {
        Self {
            initial_delay_ms: default_initial_delay_ms(),
            max_delay_ms: default_max_delay_ms(),
            factor: default_factor(),
            stable_after_secs: default_stable_after_secs(),
            jitter: JitterSetting::None,
        }
    }
}

impl ReconnectConfig {
    pub fn initial_delay(&self) -> Duration {
        Duration::from_millis(self.initial_delay_ms)
    }

    pub fn max_delay(&self) -> Duration {
        Duration::from_millis(self.max_delay_ms)
    }

    pub fn stable_after(&self) -> Duration {
        Duration::from_secs(self.stable_after_secs)
    }
}

/// Playback settings
#[derive(Debug, Clone, Deserialize)]
pub struct PlaybackConfig {
    /// Issued once as AdjustVolume when the controller first goes live
    #[serde(default = "default_initial_volume")]
    pub initial_volume: f32,

    /// Processing queue backlog that triggers a warning
    #[serde(default = "default_queue_capacity")]
    pub queue_capacity: usize,
}

impl Default for PlaybackConfig {
    fn default() -> Self {
        Self {
            initial_volume: default_initial_volume(),
            queue_capacity: default_queue_capacity(),
        }
    }
}

/// Logging configuration
#[derive(Debug, Clone, Deserialize)]
pub struct LoggingConfig {
    /// Log level (trace, debug, info, warn, error)
    #[serde(default = "default_log_level")]
    pub level: String,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
        }
    }
}

fn default_host() -> String {
    "localhost".to_string()
}

fn default_server_port() -> u16 {
    38281
}

fn default_initial_delay_ms() -> u64 {
    1000
}

fn default_max_delay_ms() -> u64 {
    30_000
}

fn default_factor() -> f64 {
    2.0
}

fn default_stable_after_secs() -> u64 {
    60
}

fn default_initial_volume() -> f32 {
    0.8
}

fn default_queue_capacity() -> usize {
    1024
}

fn default_log_level() -> String {
    "info".to_string()
}

/// Command-line configuration overrides
#[derive(Debug, Clone, Default)]
pub struct ConfigOverrides {
    pub rules_path: Option<PathBuf>,
    pub music_root: Option<PathBuf>,
    pub log_level: Option<String>,
}

impl TomlConfig {
    /// Parse configuration from TOML text
    ///
    /// Relative `rules_path`/`music_root` are left untouched; see [`TomlConfig::load`].
    pub fn from_toml_str(text: &str) -> Result<Self> {
        let config: TomlConfig = toml::from_str(text)
            .map_err(|e| Error::Config(format!("Failed to parse TOML: {}", e)))?;
        config.validate()?;
        Ok(config)
    }

    /// Built-in defaults around a rule table, for running without a config file
    pub fn with_rules(rules_path: PathBuf) -> Self {
        Self {
            rules_path,
            music_root: None,
            connection: ConnectionConfig::default(),
            reconnect: ReconnectConfig::default(),
            playback: PlaybackConfig::default(),
            logging: LoggingConfig::default(),
        }
    }

    /// Load configuration from a TOML file and apply CLI overrides
    ///
    /// # Errors
    ///
    /// Returns [`Error::Config`] if the file cannot be read or parsed, or if a
    /// value is out of range.
    pub fn load(path: &Path, overrides: ConfigOverrides) -> Result<Self> {
        let text = std::fs::read_to_string(path).map_err(|e| {
            Error::Config(format!("Failed to read config file {:?}: {}", path, e))
        })?;

        let mut config = Self::from_toml_str(&text)?;
        let base = path.parent().unwrap_or_else(|| Path::new("."));
        config.rules_path = resolve_relative(base, &config.rules_path);
        config.music_root = config.music_root.map(|root| resolve_relative(base, &root));
        config.apply_overrides(overrides);

        info!("Loaded TOML configuration from {:?}", path);
        Ok(config)
    }

    /// Apply command-line overrides (highest priority)
    pub fn apply_overrides(&mut self, overrides: ConfigOverrides) {
        if let Some(rules) = overrides.rules_path {
            self.rules_path = rules;
        }
        if let Some(root) = overrides.music_root {
            self.music_root = Some(root);
        }
        if let Some(level) = overrides.log_level {
            self.logging.level = level;
        }
    }

    fn validate(&self) -> Result<()> {
        let reconnect = &self.reconnect;
        if reconnect.initial_delay_ms == 0 {
            return Err(Error::Config(
                "reconnect.initial_delay_ms must be greater than zero".to_string(),
            ));
        }
        if reconnect.max_delay_ms < reconnect.initial_delay_ms {
            return Err(Error::Config(format!(
                "reconnect.max_delay_ms ({}) is below initial_delay_ms ({})",
                reconnect.max_delay_ms, reconnect.initial_delay_ms
            )));
        }
        if !reconnect.factor.is_finite() || reconnect.factor < 1.0 {
            return Err(Error::Config(format!(
                "reconnect.factor must be >= 1.0, got {}",
                reconnect.factor
            )));
        }
        if !(0.0..=1.0).contains(&self.playback.initial_volume) {
            return Err(Error::Config(format!(
                "playback.initial_volume must be within 0.0..=1.0, got {}",
                self.playback.initial_volume
            )));
        }
        if self.playback.queue_capacity == 0 {
            return Err(Error::Config(
                "playback.queue_capacity must be greater than zero".to_string(),
            ));
        }
        Ok(())
    }
}

fn resolve_relative(base: &Path, path: &Path) -> PathBuf {
    if path.is_relative() {
        base.join(path)
    } else {
        path.to_path_buf()
    }
}

/// Default configuration file location for the platform
///
/// `~/.config/mwmc/config.toml` on Linux, the platform equivalent elsewhere,
/// falling back to `./mwmc/config.toml`.
pub fn default_config_path() -> PathBuf {
    dirs::config_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join(APP_DIR_NAME)
        .join(CONFIG_FILE_NAME)
}
