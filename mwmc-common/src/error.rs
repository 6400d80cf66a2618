//! Common error types for MWMC

use thiserror::Error;

/// Common result type for MWMC operations
pub type Result<T> = std::result::Result<T, Error>;

/// Common error types shared by the companion crates
///
/// Duplicate events and connection loss are deliberately absent: the first is
/// dropped silently by the event bus, the second is a normal state transition.
#[derive(Error, Debug)]
pub enum Error {
    /// Malformed or unsupported configuration (fatal at startup)
    #[error("Configuration error: {0}")]
    Config(String),

    /// Malformed or unparseable raw session message
    #[error("Protocol error: {0}")]
    Protocol(String),

    /// I/O operation error (wraps std::io::Error)
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// TOML parse error
    #[error("TOML parse error: {0}")]
    TomlParse(#[from] toml::de::Error),

    /// JSON parse error
    #[error("JSON parse error: {0}")]
    Json(#[from] serde_json::Error),
}

impl Error {
    /// True for errors that must abort startup
    pub fn is_fatal(&self) -> bool {
        !matches!(self, Error::Protocol(_))
    }
}
