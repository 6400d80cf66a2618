//! Session event bus
//!
//! Normalizes raw session messages into [`GameEvent`]s, dropping duplicates,
//! retransmissions and malformed input before anything reaches the controller.
//!
//! # Ordering
//!
//! Within an epoch the bus only emits events whose `sequence_id` is strictly
//! greater than the last one it emitted, so downstream consumers observe a
//! strictly increasing sequence. An epoch change (a `Connected` with a higher
//! epoch) is a hard reset: the high-water mark drops back to 0.
//!
//! `ingest` does no I/O and never blocks; it is safe to call from the network
//! client's delivery context.

use mwmc_common::events::{normalize_item_name, EventKind, EventPayload};
use mwmc_common::{Error, GameEvent, RawSessionMessage, Result};
use serde_json::Value;
use tracing::{debug, trace, warn};

/// Drop/accept counters
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct BusStats {
    pub accepted: u64,
    /// Retransmitted or out-of-order within the open epoch
    pub duplicates: u64,
    /// From an epoch other than the open one
    pub stale: u64,
    pub malformed: u64,
}

enum Verdict {
    Accept(GameEvent),
    Duplicate,
    Stale,
}

/// Per-epoch sequence filter and normalizer
#[derive(Debug, Default)]
pub struct SessionEventBus {
    /// Currently open epoch (`None` before the first Connected)
    epoch: Option<u64>,
    last_sequence_id: u64,
    /// Disconnected already emitted for the open epoch
    disconnected: bool,
    stats: BusStats,
}

impl SessionEventBus {
    pub fn new() -> Self {
        Self::default()
    }

    /// Normalize a raw message
    ///
    /// Returns `None` for duplicates (sequence_id ≤ last seen in the epoch),
    /// stale epochs and malformed messages.
    pub fn ingest(&mut self, raw: RawSessionMessage) -> Option<GameEvent> {
        match self.classify(&raw) {
            Ok(Verdict::Accept(event)) => {
                self.stats.accepted += 1;
                trace!("Accepted {}", event);
                Some(event)
            }
            Ok(Verdict::Duplicate) => {
                self.stats.duplicates += 1;
                debug!(
                    "Dropping duplicate {} seq={:?} epoch={} (last seen {})",
                    raw.kind, raw.sequence_id, raw.epoch, self.last_sequence_id
                );
                None
            }
            Ok(Verdict::Stale) => {
                self.stats.stale += 1;
                debug!(
                    "Dropping {} from epoch {} (open epoch {:?})",
                    raw.kind, raw.epoch, self.epoch
                );
                None
            }
            Err(e) => {
                self.stats.malformed += 1;
                warn!("Dropping malformed session message: {}", e);
                None
            }
        }
    }

    /// Parse one JSON-encoded raw message and ingest it
    pub fn ingest_json(&mut self, line: &str) -> Option<GameEvent> {
        match serde_json::from_str::<RawSessionMessage>(line) {
            Ok(raw) => self.ingest(raw),
            Err(e) => {
                self.stats.malformed += 1;
                warn!("Dropping unparseable session message: {}", e);
                None
            }
        }
    }

    pub fn current_epoch(&self) -> Option<u64> {
        self.epoch
    }

    pub fn last_sequence_id(&self) -> u64 {
        self.last_sequence_id
    }

    pub fn stats(&self) -> BusStats {
        self.stats
    }

    fn classify(&mut self, raw: &RawSessionMessage) -> Result<Verdict> {
        let kind: EventKind = raw.kind.parse()?;

        match kind {
            EventKind::Connected => Ok(self.open_epoch(raw.epoch)?),
            EventKind::Disconnected => Ok(self.close_epoch(raw.epoch)),
            _ => {
                let Some(open) = self.epoch.filter(|open| *open == raw.epoch) else {
                    return Ok(Verdict::Stale);
                };

                let sequence_id = match raw.sequence_id {
                    Some(seq) if seq > 0 => seq as u64,
                    other => {
                        return Err(Error::Protocol(format!(
                            "{} without a positive sequence_id ({:?})",
                            kind, other
                        )))
                    }
                };
                if sequence_id <= self.last_sequence_id {
                    return Ok(Verdict::Duplicate);
                }

                let payload = payload_from_raw(kind, &raw.payload)?;
                self.last_sequence_id = sequence_id;
                Ok(Verdict::Accept(GameEvent::new(open, sequence_id, payload)))
            }
        }
    }

    fn open_epoch(&mut self, epoch: u64) -> Result<Verdict> {
        if epoch == 0 {
            return Err(Error::Protocol("connected with epoch 0".to_string()));
        }
        match self.epoch {
            Some(open) if epoch < open => Ok(Verdict::Stale),
            Some(open) if epoch == open => Ok(Verdict::Duplicate),
            _ => {
                debug!(
                    "Opening epoch {} (previous {:?}, last seq {})",
                    epoch, self.epoch, self.last_sequence_id
                );
                self.epoch = Some(epoch);
                self.last_sequence_id = 0;
                self.disconnected = false;
                Ok(Verdict::Accept(GameEvent::connected(epoch)))
            }
        }
    }

    fn close_epoch(&mut self, epoch: u64) -> Verdict {
        match self.epoch {
            Some(open) if open == epoch && !self.disconnected => {
                self.disconnected = true;
                Verdict::Accept(GameEvent::disconnected(open, self.last_sequence_id))
            }
            Some(open) if open == epoch => Verdict::Duplicate,
            _ => Verdict::Stale,
        }
    }
}

/// Build the kind-specific payload
///
/// A bare JSON string is accepted as the subject for kinds that have one.
fn payload_from_raw(kind: EventKind, value: &Value) -> Result<EventPayload> {
    let payload = match kind {
        EventKind::ItemReceived => EventPayload::ItemReceived {
            item: normalize_item_name(&required_str(kind, value, "item")?),
            location: optional_str(value, "location"),
            player: optional_str(value, "player"),
        },
        EventKind::LocationChecked => EventPayload::LocationChecked {
            location: required_str(kind, value, "location")?,
        },
        EventKind::RegionEntered => EventPayload::RegionEntered {
            region: required_str(kind, value, "region")?,
        },
        EventKind::BossDefeated => EventPayload::BossDefeated {
            boss: required_str(kind, value, "boss")?,
        },
        EventKind::Goaled => EventPayload::Goaled,
        EventKind::Died => EventPayload::Died {
            cause: match value {
                Value::String(s) if !s.trim().is_empty() => Some(s.trim().to_string()),
                _ => optional_str(value, "cause"),
            },
        },
        EventKind::Connected => EventPayload::Connected,
        EventKind::Disconnected => EventPayload::Disconnected,
    };
    Ok(payload)
}

fn required_str(kind: EventKind, value: &Value, key: &str) -> Result<String> {
    let found = match value {
        Value::String(s) => Some(s.as_str()),
        Value::Object(map) => map.get(key).and_then(Value::as_str),
        _ => None,
    };
    match found.map(str::trim) {
        Some(s) if !s.is_empty() => Ok(s.to_string()),
        _ => Err(Error::Protocol(format!(
            "{} payload is missing '{}'",
            kind, key
        ))),
    }
}

fn optional_str(value: &Value, key: &str) -> Option<String> {
    value
        .get(key)
        .and_then(Value::as_str)
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(str::to_string)
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn region(seq: i64, name: &str, epoch: u64) -> RawSessionMessage {
        RawSessionMessage::new("region_entered", json!({ "region": name }), seq).with_epoch(epoch)
    }

    fn item(seq: i64, name: &str, epoch: u64) -> RawSessionMessage {
        RawSessionMessage::new("ItemReceived", json!({ "item": name }), seq).with_epoch(epoch)
    }

    #[test]
    fn test_increasing_sequence_emitted_once_in_order() {
        let mut bus = SessionEventBus::new();
        assert!(bus.ingest(RawSessionMessage::connected(1)).is_some());

        let emitted: Vec<u64> = (1..=20)
            .filter_map(|seq| bus.ingest(item(seq, "Sword", 1)))
            .map(|e| e.sequence_id)
            .collect();

        assert_eq!(emitted, (1..=20).collect::<Vec<u64>>());
        assert_eq!(bus.stats().accepted, 21);
        assert_eq!(bus.stats().duplicates, 0);
    }

    #[test]
    fn test_shuffled_arrival_never_regresses() {
        let mut bus = SessionEventBus::new();
        bus.ingest(RawSessionMessage::connected(1));

        let arrival = [3, 1, 2, 7, 5, 7, 8, 6, 10, 9, 3, 11];
        let emitted: Vec<u64> = arrival
            .iter()
            .filter_map(|seq| bus.ingest(item(*seq, "Key", 1)))
            .map(|e| e.sequence_id)
            .collect();

        assert_eq!(emitted, vec![3, 7, 8, 10, 11]);
        assert!(emitted.windows(2).all(|w| w[0] < w[1]));
        assert_eq!(bus.stats().duplicates, 7);
    }

    #[test]
    fn test_out_of_order_duplicate_dropped() {
        let mut bus = SessionEventBus::new();
        bus.ingest(RawSessionMessage::connected(1));

        assert!(bus.ingest(item(5, "Bow", 1)).is_some());
        assert!(bus.ingest(item(3, "Arrow", 1)).is_none());
        assert!(bus.ingest(item(5, "Bow", 1)).is_none());
        assert_eq!(bus.last_sequence_id(), 5);
    }

    #[test]
    fn test_new_epoch_resets_sequence() {
        let mut bus = SessionEventBus::new();
        bus.ingest(RawSessionMessage::connected(1));
        bus.ingest(region(40, "Forest", 1));

        let connected = bus.ingest(RawSessionMessage::connected(2)).unwrap();
        assert_eq!(connected.kind(), EventKind::Connected);
        assert_eq!(connected.session_epoch, 2);
        assert_eq!(bus.last_sequence_id(), 0);

        let event = bus.ingest(region(1, "Cave", 2)).unwrap();
        assert_eq!(event.sequence_id, 1);
        assert_eq!(event.session_epoch, 2);
    }

    #[test]
    fn test_stale_epoch_dropped() {
        let mut bus = SessionEventBus::new();
        bus.ingest(RawSessionMessage::connected(1));
        bus.ingest(RawSessionMessage::connected(2));

        assert!(bus.ingest(region(99, "Forest", 1)).is_none());
        assert!(bus.ingest(RawSessionMessage::connected(1)).is_none());
        assert!(bus.ingest(region(1, "Forest", 3)).is_none());
        assert_eq!(bus.stats().stale, 3);
    }

    #[test]
    fn test_events_before_first_connect_dropped() {
        let mut bus = SessionEventBus::new();
        assert!(bus.ingest(region(1, "Forest", 0)).is_none());
        assert_eq!(bus.current_epoch(), None);
    }

    #[test]
    fn test_repeated_connected_is_duplicate() {
        let mut bus = SessionEventBus::new();
        assert!(bus.ingest(RawSessionMessage::connected(1)).is_some());
        assert!(bus.ingest(RawSessionMessage::connected(1)).is_none());
        assert_eq!(bus.stats().duplicates, 1);
    }

    #[test]
    fn test_disconnected_once_per_epoch_and_events_after_it_accepted() {
        let mut bus = SessionEventBus::new();
        bus.ingest(RawSessionMessage::connected(1));
        bus.ingest(region(4, "Forest", 1));

        let disconnected = bus.ingest(RawSessionMessage::disconnected(1)).unwrap();
        assert_eq!(disconnected.kind(), EventKind::Disconnected);
        assert_eq!(disconnected.sequence_id, 4);
        assert!(bus.ingest(RawSessionMessage::disconnected(1)).is_none());

        let late = bus.ingest(region(5, "Cave", 1)).unwrap();
        assert_eq!(late.subject(), Some("Cave"));
    }

    #[test]
    fn test_malformed_messages_dropped() {
        let mut bus = SessionEventBus::new();
        bus.ingest(RawSessionMessage::connected(1));

        assert!(bus
            .ingest(RawSessionMessage::new("teleported", json!({}), 1).with_epoch(1))
            .is_none());
        assert!(bus
            .ingest(RawSessionMessage::new("region_entered", json!({}), 2).with_epoch(1))
            .is_none());
        assert!(bus
            .ingest(RawSessionMessage::new("goaled", Value::Null, 0).with_epoch(1))
            .is_none());
        assert!(bus.ingest(RawSessionMessage::connected(0)).is_none());
        assert_eq!(bus.stats().malformed, 4);

        // A malformed payload does not consume its sequence id
        assert!(bus.ingest(region(2, "Forest", 1)).is_some());
    }

    #[test]
    fn test_album_item_normalized() {
        let mut bus = SessionEventBus::new();
        bus.ingest(RawSessionMessage::connected(1));

        let event = bus.ingest(item(1, "Folklore (Album)", 1)).unwrap();
        assert_eq!(event.subject(), Some("Folklore"));
    }

    #[test]
    fn test_bare_string_payload_is_subject() {
        let mut bus = SessionEventBus::new();
        bus.ingest(RawSessionMessage::connected(1));

        let event = bus
            .ingest(RawSessionMessage::new("boss_defeated", json!("Dragon"), 1).with_epoch(1))
            .unwrap();
        assert_eq!(event.payload, EventPayload::BossDefeated { boss: "Dragon".to_string() });
    }

    #[test]
    fn test_item_payload_optional_fields() {
        let mut bus = SessionEventBus::new();
        bus.ingest(RawSessionMessage::connected(1));

        let raw = RawSessionMessage::new(
            "item_received",
            json!({ "item": "Lute", "location": "Shop", "player": "Ana" }),
            1,
        )
        .with_epoch(1);
        let event = bus.ingest(raw).unwrap();
        assert_eq!(
            event.payload,
            EventPayload::ItemReceived {
                item: "Lute".to_string(),
                location: Some("Shop".to_string()),
                player: Some("Ana".to_string()),
            }
        );
    }

    #[test]
    fn test_ingest_json_lines() {
        let mut bus = SessionEventBus::new();
        assert!(bus.ingest_json(r#"{"kind":"connected","epoch":1}"#).is_some());
        let event = bus
            .ingest_json(r#"{"kind":"died","payload":{"cause":"lava"},"sequence_id":1,"epoch":1}"#)
            .unwrap();
        assert_eq!(event.subject(), Some("lava"));
        assert!(bus.ingest_json("not json").is_none());
        assert_eq!(bus.stats().malformed, 1);
    }
}
