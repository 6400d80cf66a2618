//! Music context: what the controller believes should be playing

use serde::{Deserialize, Serialize};

use crate::intent::TrackId;

/// Ordered musical intensity
///
/// Escalation (Calm → Alert → Boss → Victory) is automatic; moving back down
/// requires an explicit de-escalating trigger.
#[derive(
    Debug, Clone, Copy, Default, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize,
)]
#[serde(rename_all = "lowercase")]
pub enum IntensityLevel {
    #[default]
    Calm,
    Alert,
    Boss,
    Victory,
}

impl std::fmt::Display for IntensityLevel {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            IntensityLevel::Calm => write!(f, "calm"),
            IntensityLevel::Alert => write!(f, "alert"),
            IntensityLevel::Boss => write!(f, "boss"),
            IntensityLevel::Victory => write!(f, "victory"),
        }
    }
}

/// Single source of truth for "what should be playing"
///
/// Mutated only by the playback controller.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct MusicContext {
    /// `None` means the region is unknown
    pub current_region: Option<String>,
    pub intensity_level: IntensityLevel,
    pub active_track: Option<TrackId>,
}

impl MusicContext {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn region_or_unknown(&self) -> &str {
        self.current_region.as_deref().unwrap_or("unknown")
    }

    /// Reset region and intensity, keeping the track that is actually playing
    pub fn reset_keeping_track(&mut self) {
        let active = self.active_track.take();
        *self = Self {
            active_track: active,
            ..Self::default()
        };
    }
}
