//! Playback intent vocabulary
//!
//! The commands the playback controller issues to the audio sink. Intents are
//! produced once and consumed once.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::time::Duration;

/// Identifier of a track in the catalog
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct TrackId(String);

impl TrackId {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl From<&str> for TrackId {
    fn from(id: &str) -> Self {
        Self(id.to_string())
    }
}

impl fmt::Display for TrackId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// How a playback change is applied
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum Transition {
    /// Cut over immediately
    #[default]
    Immediate,
    /// Fade the current track out while the next fades in
    Crossfade { duration_ms: u64 },
    /// Lower the current track for the duration without switching it
    Duck { duration_ms: u64 },
}

impl Transition {
    /// Duration of a timed transition, `None` for Immediate
    pub fn duration(&self) -> Option<Duration> {
        match self {
            Transition::Immediate => None,
            Transition::Crossfade { duration_ms } | Transition::Duck { duration_ms } => {
                Some(Duration::from_millis(*duration_ms))
            }
        }
    }

    pub fn is_duck(&self) -> bool {
        matches!(self, Transition::Duck { .. })
    }
}

impl fmt::Display for Transition {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Transition::Immediate => write!(f, "immediate"),
            Transition::Crossfade { duration_ms } => write!(f, "crossfade({}ms)", duration_ms),
            Transition::Duck { duration_ms } => write!(f, "duck({}ms)", duration_ms),
        }
    }
}

/// Output volume, clamped to 0.0..=1.0
#[derive(Debug, Clone, Copy, PartialEq, PartialOrd, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Volume(f32);

impl Volume {
    pub fn new(level: f32) -> Self {
        if level.is_nan() {
            return Self(0.0);
        }
        Self(level.clamp(0.0, 1.0))
    }

    pub fn level(&self) -> f32 {
        self.0
    }
}

impl Default for Volume {
    fn default() -> Self {
        Self(1.0)
    }
}

/// What the sink should do
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "action", rename_all = "snake_case")]
pub enum PlaybackAction {
    Play {
        track: TrackId,
        transition: Transition,
    },
    Stop {
        transition: Transition,
    },
    AdjustVolume {
        level: Volume,
    },
}

/// Command issued by the controller
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PlaybackIntent {
    /// Controller-local, strictly increasing
    pub id: u64,
    pub action: PlaybackAction,
    /// Sequence id of the event that caused the intent
    pub issued_at_sequence_id: u64,
}

impl PlaybackIntent {
    /// Transition carried by the action, if any
    pub fn transition(&self) -> Option<Transition> {
        match &self.action {
            PlaybackAction::Play { transition, .. } | PlaybackAction::Stop { transition } => {
                Some(*transition)
            }
            PlaybackAction::AdjustVolume { .. } => None,
        }
    }

    pub fn track(&self) -> Option<&TrackId> {
        match &self.action {
            PlaybackAction::Play { track, .. } => Some(track),
            _ => None,
        }
    }
}

impl fmt::Display for PlaybackIntent {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.action {
            PlaybackAction::Play { track, transition } => {
                write!(f, "#{} play {} via {}", self.id, track, transition)
            }
            PlaybackAction::Stop { transition } => write!(f, "#{} stop via {}", self.id, transition),
            PlaybackAction::AdjustVolume { level } => {
                write!(f, "#{} volume {:.2}", self.id, level.level())
            }
        }
    }
}
