//! Error types for mwmc-player
//!
//! Only configuration errors are fatal. Playback and connection failures are
//! reported and absorbed by the component that observes them.

use mwmc_common::TrackId;
use thiserror::Error;

pub use mwmc_common::{Error, Result};

/// The audio sink could not execute an intent
#[derive(Error, Debug, Clone, PartialEq, Eq)]
#[error("playback failed{}: {reason}", .track.as_ref().map(|t| format!(" for {}", t)).unwrap_or_default())]
pub struct PlaybackFailure {
    /// Track the failed intent referred to, if any
    pub track: Option<TrackId>,
    pub reason: String,
}

impl PlaybackFailure {
    pub fn new(track: Option<TrackId>, reason: impl Into<String>) -> Self {
        Self {
            track,
            reason: reason.into(),
        }
    }

    pub fn missing_asset(track: &TrackId) -> Self {
        Self::new(Some(track.clone()), "track asset not found")
    }
}

/// A session connection attempt or an open session failed
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ConnectError {
    /// Server could not be reached or refused the handshake
    #[error("connection refused: {0}")]
    Refused(String),

    /// Established session dropped
    #[error("session lost: {0}")]
    Lost(String),

    /// Transport-level failure
    #[error("transport error: {0}")]
    Transport(String),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_playback_failure_display() {
        let failure = PlaybackFailure::missing_asset(&TrackId::from("forest"));
        assert_eq!(
            failure.to_string(),
            "playback failed for forest: track asset not found"
        );

        let failure = PlaybackFailure::new(None, "device busy");
        assert_eq!(failure.to_string(), "playback failed: device busy");
    }

    #[test]
    fn test_connect_error_display() {
        let err = ConnectError::Refused("bad password".to_string());
        assert_eq!(err.to_string(), "connection refused: bad password");
    }
}
