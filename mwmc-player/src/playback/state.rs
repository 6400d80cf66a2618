//! Controller state types

use std::collections::BTreeMap;

use mwmc_common::{EventKind, GameEvent, IntensityLevel, MusicContext};
use serde::Serialize;

/// Lifecycle state of the playback controller
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum ControllerState {
    /// No session
    Idle,
    /// Connected, reacting normally
    Live,
    /// Connection lost; context is tracked but no intents are issued
    Frozen,
    /// Reconnected; re-deriving the context from the snapshot
    Resyncing,
}

impl std::fmt::Display for ControllerState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ControllerState::Idle => write!(f, "idle"),
            ControllerState::Live => write!(f, "live"),
            ControllerState::Frozen => write!(f, "frozen"),
            ControllerState::Resyncing => write!(f, "resyncing"),
        }
    }
}

/// Read-only view published after every processed input
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ControllerSnapshot {
    pub state: ControllerState,
    pub context: MusicContext,
    pub epoch: u64,
}

impl Default for ControllerSnapshot {
    fn default() -> Self {
        Self {
            state: ControllerState::Idle,
            context: MusicContext::new(),
            epoch: 0,
        }
    }
}

/// Context-defining events kept for replay on resync
///
/// Holds the latest region event plus, per intensity level, the latest event
/// that held the context at that level. A de-escalation drops the markers
/// above the new level, so a boss kill that was later left behind is not
/// replayed. Size is bounded by the number of intensity levels.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ResyncSnapshot {
    region: Option<GameEvent>,
    markers: BTreeMap<IntensityLevel, GameEvent>,
}

impl ResyncSnapshot {
    pub fn new() -> Self {
        Self::default()
    }

    /// Keep `event` as the current region; other kinds are ignored
    pub fn record_region(&mut self, event: &GameEvent) {
        if event.kind() == EventKind::RegionEntered {
            self.region = Some(event.clone());
        }
    }

    /// `event` now holds the context at `level`
    ///
    /// Markers above `level` are dropped: reaching `level` from above means a
    /// de-escalation superseded them.
    pub fn record_marker(&mut self, level: IntensityLevel, event: &GameEvent) {
        self.markers.retain(|held, _| *held <= level);
        self.markers.insert(level, event.clone());
    }

    /// Events in their original arrival order, each at most once
    pub fn replay_order(&self) -> Vec<&GameEvent> {
        let ordered: BTreeMap<(u64, u64), &GameEvent> = self
            .region
            .iter()
            .chain(self.markers.values())
            .map(|event| ((event.session_epoch, event.sequence_id), event))
            .collect();
        ordered.into_values().collect()
    }

    pub fn len(&self) -> usize {
        self.replay_order().len()
    }

    pub fn is_empty(&self) -> bool {
        self.region.is_none() && self.markers.is_empty()
    }
}
