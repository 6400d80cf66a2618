//! Session event types
//!
//! Everything the network boundary can tell the companion is expressed as a
//! [`GameEvent`]. Connectivity changes are ordinary events (`Connected`,
//! `Disconnected`) so the playback controller consumes a single, uniform input
//! stream.
//!
//! Raw messages arrive as [`RawSessionMessage`] and are normalized by the
//! session event bus; this module only defines the shapes.

mod connection_types;

pub use connection_types::{ConnectionState, ConnectionStatus};

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

use crate::Error;

/// Kind of a session event
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EventKind {
    ItemReceived,
    LocationChecked,
    RegionEntered,
    BossDefeated,
    Goaled,
    Died,
    Connected,
    Disconnected,
}

impl EventKind {
    pub const ALL: [EventKind; 8] = [
        EventKind::ItemReceived,
        EventKind::LocationChecked,
        EventKind::RegionEntered,
        EventKind::BossDefeated,
        EventKind::Goaled,
        EventKind::Died,
        EventKind::Connected,
        EventKind::Disconnected,
    ];

    /// Canonical snake_case name
    pub fn as_str(&self) -> &'static str {
        match self {
            EventKind::ItemReceived => "item_received",
            EventKind::LocationChecked => "location_checked",
            EventKind::RegionEntered => "region_entered",
            EventKind::BossDefeated => "boss_defeated",
            EventKind::Goaled => "goaled",
            EventKind::Died => "died",
            EventKind::Connected => "connected",
            EventKind::Disconnected => "disconnected",
        }
    }

    /// Connectivity events are produced by the connection supervisor, not the game
    pub fn is_connectivity(&self) -> bool {
        matches!(self, EventKind::Connected | EventKind::Disconnected)
    }

    /// Whether events of this kind carry a subject a rule predicate can match
    pub fn has_subject(&self) -> bool {
        !matches!(
            self,
            EventKind::Goaled | EventKind::Connected | EventKind::Disconnected
        )
    }
}

impl fmt::Display for EventKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for EventKind {
    type Err = Error;

    /// Accepts snake_case (`region_entered`) and PascalCase (`RegionEntered`)
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let folded: String = s
            .trim()
            .chars()
            .filter(|c| *c != '_' && *c != '-')
            .flat_map(char::to_lowercase)
            .collect();

        EventKind::ALL
            .into_iter()
            .find(|kind| kind.as_str().replace('_', "") == folded)
            .ok_or_else(|| Error::Protocol(format!("unknown event kind '{}'", s)))
    }
}

/// Kind-specific identifiers carried by a [`GameEvent`]
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum EventPayload {
    ItemReceived {
        /// Normalized item name
        item: String,
        /// Location the item was found at
        location: Option<String>,
        /// Sending player
        player: Option<String>,
    },
    LocationChecked {
        location: String,
    },
    RegionEntered {
        region: String,
    },
    BossDefeated {
        boss: String,
    },
    Goaled,
    Died {
        cause: Option<String>,
    },
    Connected,
    Disconnected,
}

impl EventPayload {
    pub fn kind(&self) -> EventKind {
        match self {
            EventPayload::ItemReceived { .. } => EventKind::ItemReceived,
            EventPayload::LocationChecked { .. } => EventKind::LocationChecked,
            EventPayload::RegionEntered { .. } => EventKind::RegionEntered,
            EventPayload::BossDefeated { .. } => EventKind::BossDefeated,
            EventPayload::Goaled => EventKind::Goaled,
            EventPayload::Died { .. } => EventKind::Died,
            EventPayload::Connected => EventKind::Connected,
            EventPayload::Disconnected => EventKind::Disconnected,
        }
    }

    /// Identifier rule predicates are matched against
    pub fn subject(&self) -> Option<&str> {
        match self {
            EventPayload::ItemReceived { item, .. } => Some(item),
            EventPayload::LocationChecked { location } => Some(location),
            EventPayload::RegionEntered { region } => Some(region),
            EventPayload::BossDefeated { boss } => Some(boss),
            EventPayload::Died { cause } => cause.as_deref(),
            EventPayload::Goaled | EventPayload::Connected | EventPayload::Disconnected => None,
        }
    }
}

/// Normalized session event
///
/// `sequence_id` is unique and increasing within one `session_epoch`.
/// Connectivity events carry the epoch's high-water sequence id.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct GameEvent {
    pub sequence_id: u64,
    pub session_epoch: u64,
    pub payload: EventPayload,
}

impl GameEvent {
    pub fn new(session_epoch: u64, sequence_id: u64, payload: EventPayload) -> Self {
        Self {
            sequence_id,
            session_epoch,
            payload,
        }
    }

    pub fn kind(&self) -> EventKind {
        self.payload.kind()
    }

    pub fn subject(&self) -> Option<&str> {
        self.payload.subject()
    }

    pub fn connected(session_epoch: u64) -> Self {
        Self::new(session_epoch, 0, EventPayload::Connected)
    }

    pub fn disconnected(session_epoch: u64, sequence_id: u64) -> Self {
        Self::new(session_epoch, sequence_id, EventPayload::Disconnected)
    }

    pub fn region_entered(session_epoch: u64, sequence_id: u64, region: &str) -> Self {
        Self::new(
            session_epoch,
            sequence_id,
            EventPayload::RegionEntered {
                region: region.to_string(),
            },
        )
    }

    pub fn item_received(session_epoch: u64, sequence_id: u64, item: &str) -> Self {
        Self::new(
            session_epoch,
            sequence_id,
            EventPayload::ItemReceived {
                item: normalize_item_name(item),
                location: None,
                player: None,
            },
        )
    }

    pub fn boss_defeated(session_epoch: u64, sequence_id: u64, boss: &str) -> Self {
        Self::new(
            session_epoch,
            sequence_id,
            EventPayload::BossDefeated {
                boss: boss.to_string(),
            },
        )
    }
}

impl fmt::Display for GameEvent {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.subject() {
            Some(subject) => write!(
                f,
                "{}({}) epoch={} seq={}",
                self.kind(),
                subject,
                self.session_epoch,
                self.sequence_id
            ),
            None => write!(
                f,
                "{} epoch={} seq={}",
                self.kind(),
                self.session_epoch,
                self.sequence_id
            ),
        }
    }
}

/// Raw message as delivered by the network client
///
/// Only `{kind, payload, sequence_id, epoch}` is required; framing is the
/// transport's concern.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RawSessionMessage {
    pub kind: String,
    #[serde(default)]
    pub payload: serde_json::Value,
    #[serde(default)]
    pub sequence_id: Option<i64>,
    #[serde(default)]
    pub epoch: u64,
}

impl RawSessionMessage {
    pub fn new(kind: impl Into<String>, payload: serde_json::Value, sequence_id: i64) -> Self {
        Self {
            kind: kind.into(),
            payload,
            sequence_id: Some(sequence_id),
            epoch: 0,
        }
    }

    pub fn connected(epoch: u64) -> Self {
        Self {
            kind: EventKind::Connected.as_str().to_string(),
            payload: serde_json::Value::Null,
            sequence_id: None,
            epoch,
        }
    }

    pub fn disconnected(epoch: u64) -> Self {
        Self {
            kind: EventKind::Disconnected.as_str().to_string(),
            payload: serde_json::Value::Null,
            sequence_id: None,
            epoch,
        }
    }

    pub fn with_epoch(mut self, epoch: u64) -> Self {
        self.epoch = epoch;
        self
    }
}

/// Normalize an item name for lookup
///
/// Album items arrive as `"<name> (Album)"`; the marker is dropped so the
/// item matches the same identifiers as its tracks.
pub fn normalize_item_name(raw: &str) -> String {
    let trimmed = raw.trim();
    match trimmed.strip_suffix("(Album)") {
        Some(stripped) => stripped.trim_end().to_string(),
        None => trimmed.to_string(),
    }
}
