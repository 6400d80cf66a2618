//! Test helpers for mwmc-player integration tests
//!
//! - RecordingSink: AudioSink that records every call and can fail chosen tracks
//! - ScriptedConnector: SessionConnector whose sessions are opened, fed and
//!   dropped by the test
//! - Raw message builders

#![allow(dead_code)]

use std::collections::HashSet;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use futures::stream::{self, StreamExt};
use mwmc_common::{RawSessionMessage, TrackId, Transition, Volume};
use mwmc_player::connection::{SessionConnector, SessionStream};
use mwmc_player::{ConnectError, PlaybackFailure};
use serde_json::json;
use tokio::sync::mpsc;

// ================================================================================================
// RecordingSink
// ================================================================================================

#[derive(Debug, Clone, PartialEq)]
pub enum SinkCall {
    Play(TrackId, Transition),
    Stop(Transition),
    Volume(Volume),
}

impl SinkCall {
    pub fn play(track: &str, transition: Transition) -> Self {
        SinkCall::Play(TrackId::from(track), transition)
    }
}

#[derive(Default)]
pub struct RecordingSink {
    calls: Mutex<Vec<SinkCall>>,
    failing: Mutex<HashSet<TrackId>>,
}

impl RecordingSink {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    /// Make every future `play` of `track` fail
    pub fn fail_track(&self, track: &str) {
        self.failing.lock().unwrap().insert(TrackId::from(track));
    }

    pub fn calls(&self) -> Vec<SinkCall> {
        self.calls.lock().unwrap().clone()
    }

    /// Tracks passed to `play`, in order
    pub fn played(&self) -> Vec<String> {
        self.calls()
            .into_iter()
            .filter_map(|call| match call {
                SinkCall::Play(track, _) => Some(track.as_str().to_string()),
                _ => None,
            })
            .collect()
    }

    /// Wait (in paused test time) until at least `count` calls were recorded
    pub async fn wait_for_calls(&self, count: usize) -> Vec<SinkCall> {
        for _ in 0..1000 {
            let calls = self.calls();
            if calls.len() >= count {
                return calls;
            }
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
        panic!(
            "expected {} sink calls, got {:?}",
            count,
            self.calls()
        );
    }
}

#[async_trait]
impl mwmc_player::audio::AudioSink for RecordingSink {
    async fn play(&self, track: &TrackId, transition: Transition) -> Result<(), PlaybackFailure> {
        self.calls
            .lock()
            .unwrap()
            .push(SinkCall::Play(track.clone(), transition));
        if self.failing.lock().unwrap().contains(track) {
            return Err(PlaybackFailure::missing_asset(track));
        }
        Ok(())
    }

    async fn stop(&self, transition: Transition) -> Result<(), PlaybackFailure> {
        self.calls.lock().unwrap().push(SinkCall::Stop(transition));
        Ok(())
    }

    async fn set_volume(&self, level: Volume) -> Result<(), PlaybackFailure> {
        self.calls.lock().unwrap().push(SinkCall::Volume(level));
        Ok(())
    }
}

// ================================================================================================
// ScriptedConnector
// ================================================================================================

type SessionFeedRx = mpsc::UnboundedReceiver<RawSessionMessage>;

/// Connector whose `connect` waits for the test to open a session
pub struct ScriptedConnector {
    sessions: tokio::sync::Mutex<mpsc::UnboundedReceiver<SessionFeedRx>>,
}

/// Test side of a [`ScriptedConnector`]
pub struct SessionControl {
    sessions: mpsc::UnboundedSender<SessionFeedRx>,
}

/// One open session; dropping it ends the session
pub struct SessionFeed {
    tx: mpsc::UnboundedSender<RawSessionMessage>,
}

impl ScriptedConnector {
    pub fn new() -> (Arc<Self>, SessionControl) {
        let (tx, rx) = mpsc::unbounded_channel();
        (
            Arc::new(Self {
                sessions: tokio::sync::Mutex::new(rx),
            }),
            SessionControl { sessions: tx },
        )
    }
}

#[async_trait]
impl SessionConnector for ScriptedConnector {
    async fn connect(&self) -> Result<SessionStream, ConnectError> {
        let mut sessions = self.sessions.lock().await;
        let Some(feed) = sessions.recv().await else {
            return Err(ConnectError::Refused("no more sessions".to_string()));
        };
        let session = stream::unfold(feed, |mut feed| async move {
            feed.recv().await.map(|raw| (Ok(raw), feed))
        });
        Ok(session.boxed())
    }
}

impl SessionControl {
    /// Accept the next connection attempt
    pub fn open(&self) -> SessionFeed {
        let (tx, rx) = mpsc::unbounded_channel();
        self.sessions
            .send(rx)
            .expect("connector dropped before the session opened");
        SessionFeed { tx }
    }
}

impl SessionFeed {
    pub fn send(&self, raw: RawSessionMessage) {
        self.tx.send(raw).expect("session stream dropped");
    }

    pub fn region(&self, seq: i64, region: &str) {
        self.send(region_entered(seq, region));
    }

    pub fn item(&self, seq: i64, item: &str) {
        self.send(RawSessionMessage::new("item_received", json!({ "item": item }), seq));
    }

    pub fn boss(&self, seq: i64, boss: &str) {
        self.send(RawSessionMessage::new("boss_defeated", json!({ "boss": boss }), seq));
    }

    /// Drop the session from the server side
    pub fn close(self) {}
}

// ================================================================================================
// Raw message builders
// ================================================================================================

pub fn region_entered(seq: i64, region: &str) -> RawSessionMessage {
    RawSessionMessage::new("region_entered", json!({ "region": region }), seq)
}

pub fn item_received(seq: i64, item: &str) -> RawSessionMessage {
    RawSessionMessage::new("item_received", json!({ "item": item }), seq)
}

pub fn boss_defeated(seq: i64, boss: &str) -> RawSessionMessage {
    RawSessionMessage::new("boss_defeated", json!({ "boss": boss }), seq)
}

/// Rule table used across the scenario tests
pub const SCENARIO_RULES: &str = r#"
[tracks]
title = "title.ogg"
forest = "forest.ogg"
cave = "cave.ogg"
boss = "boss.ogg"
victory = { path = "victory.ogg", check_location = "Victory Song" }
jingle = "jingle.ogg"
lullaby = { path = "lullaby.ogg", requires = "Music Box (Album)" }

[[rule]]
trigger = "connected"
track = "title"

[[rule]]
trigger = "region_entered"
subject = "Forest"
track = "forest"
transition = { kind = "crossfade", duration_ms = 500 }

[[rule]]
trigger = "region_entered"
subject = "Cave"
track = "cave"
transition = { kind = "crossfade", duration_ms = 500 }

[[rule]]
trigger = "region_entered"
subject_prefix = "Boss"
track = "boss"
intensity = "boss"

[[rule]]
trigger = "boss_defeated"
track = "victory"
transition = { kind = "crossfade", duration_ms = 1000 }

[[rule]]
trigger = "item_received"
track = "jingle"
transition = { kind = "duck", duration_ms = 1500 }

[[rule]]
trigger = "region_entered"
subject = "Town"
track = "forest"
deescalate = true
priority = 5

[[rule]]
trigger = "region_entered"
subject = "Nursery"
track = "lullaby"
"#;
