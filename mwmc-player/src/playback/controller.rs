//! Playback controller - the event-driven state machine
//!
//! **Responsibilities:**
//! - Own the [`MusicContext`] (single writer, no locks)
//! - Turn normalized session events into [`PlaybackIntent`]s via the catalog
//! - Freeze on connection loss and resynchronize on reconnect
//! - Keep the received items that unlock gated tracks
//! - Track in-flight timed transitions so the same target is never issued twice
//!
//! # States
//!
//! ```text
//!          Connected               Disconnected
//!   Idle ───────────► Live ◄───────────────────┐ ────────────► Frozen
//!                      ▲                       │                 │
//!                      │      snapshot replay  │   Connected     │
//!                      └──────── Resyncing ◄───┴─────────────────┘
//!                                                (new epoch)
//!   any ──Shutdown──► Idle
//! ```
//!
//! `handle` never blocks and performs no I/O: intents are handed to the sink
//! worker through an unbounded channel. The context is updated *before* an
//! intent is handed over, so an audio-layer failure never causes the same
//! trigger to fire again.

use std::collections::HashSet;
use std::sync::Arc;

use mwmc_common::{
    EventKind, EventPayload, GameEvent, IntensityLevel, MusicContext, PlaybackAction,
    PlaybackIntent, TrackId, Transition, Volume,
};
use tokio::sync::mpsc;
use tracing::{debug, info, warn};

use super::events::{ControllerInput, LocationCheckRequest};
use super::state::{ControllerSnapshot, ControllerState, ResyncSnapshot};
use crate::catalog::{Cue, Resolution, TrackCatalog, UnlockSet};
use crate::error::PlaybackFailure;

/// Timed transition the sink has not reported complete yet
#[derive(Debug, Clone, PartialEq, Eq)]
struct InFlight {
    intent_id: u64,
    cue: Cue,
    transition: Transition,
}

/// Event-driven playback state machine
pub struct PlaybackController {
    catalog: Arc<TrackCatalog>,
    intents: mpsc::UnboundedSender<PlaybackIntent>,
    location_checks: Option<mpsc::UnboundedSender<LocationCheckRequest>>,

    state: ControllerState,
    context: MusicContext,
    snapshot: ResyncSnapshot,
    /// Items received so far; survives reconnects
    unlocks: UnlockSet,
    epoch: u64,
    last_sequence_id: u64,

    next_intent_id: u64,
    /// Play intent that set the current `active_track`
    last_play: Option<(u64, TrackId)>,
    in_flight: Option<InFlight>,

    /// Issued once, the first time the controller goes live
    initial_volume: Option<Volume>,
    /// Locations already reported in the current epoch
    checked_locations: HashSet<String>,
}

impl PlaybackController {
    pub fn new(catalog: Arc<TrackCatalog>, intents: mpsc::UnboundedSender<PlaybackIntent>) -> Self {
        Self {
            catalog,
            intents,
            location_checks: None,
            state: ControllerState::Idle,
            context: MusicContext::new(),
            snapshot: ResyncSnapshot::new(),
            unlocks: UnlockSet::new(),
            epoch: 0,
            last_sequence_id: 0,
            next_intent_id: 1,
            last_play: None,
            in_flight: None,
            initial_volume: None,
            checked_locations: HashSet::new(),
        }
    }

    /// Report location checks for finished tracks to `tx`
    pub fn with_location_checks(mut self, tx: mpsc::UnboundedSender<LocationCheckRequest>) -> Self {
        self.location_checks = Some(tx);
        self
    }

    /// Volume issued when the controller first goes live
    pub fn with_initial_volume(mut self, volume: Volume) -> Self {
        self.initial_volume = Some(volume);
        self
    }

    pub fn state(&self) -> ControllerState {
        self.state
    }

    pub fn context(&self) -> &MusicContext {
        &self.context
    }

    pub fn epoch(&self) -> u64 {
        self.epoch
    }

    pub fn unlocks(&self) -> &UnlockSet {
        &self.unlocks
    }

    pub fn snapshot(&self) -> ControllerSnapshot {
        ControllerSnapshot {
            state: self.state,
            context: self.context.clone(),
            epoch: self.epoch,
        }
    }

    /// True while a crossfade/duck the controller issued has not completed
    pub fn has_transition_in_flight(&self) -> bool {
        self.in_flight.is_some()
    }

    /// Process one queue input
    ///
    /// Returns `false` once the controller has shut down.
    pub fn process(&mut self, input: ControllerInput) -> bool {
        match input {
            ControllerInput::Event(event) => self.handle(event),
            ControllerInput::TransitionComplete { intent_id } => {
                self.on_transition_complete(intent_id)
            }
            ControllerInput::PlaybackFailed { intent_id, failure } => {
                self.on_playback_failed(intent_id, failure)
            }
            ControllerInput::TrackFinished { track } => self.on_track_finished(&track),
            ControllerInput::SetVolume(level) => self.set_volume(level),
            ControllerInput::Shutdown => {
                self.shutdown();
                return false;
            }
        }
        true
    }

    /// Handle one normalized session event
    pub fn handle(&mut self, event: GameEvent) {
        if event.session_epoch == self.epoch {
            self.last_sequence_id = self.last_sequence_id.max(event.sequence_id);
        }

        match (self.state, event.kind()) {
            (ControllerState::Idle, EventKind::Connected) => self.go_live(&event),
            (ControllerState::Idle, _) => {
                debug!("Idle: ignoring {}", event);
            }
            (_, EventKind::Connected) => {
                if event.session_epoch > self.epoch {
                    self.resync(&event);
                } else {
                    debug!("Ignoring connected for epoch {}", event.session_epoch);
                }
            }
            (ControllerState::Frozen, EventKind::Disconnected) => {
                debug!("Already frozen: {}", event);
            }
            (_, EventKind::Disconnected) => {
                info!(
                    "Connection lost in epoch {}; freezing on {}",
                    self.epoch,
                    self.context
                        .active_track
                        .as_ref()
                        .map(TrackId::as_str)
                        .unwrap_or("silence")
                );
                self.state = ControllerState::Frozen;
            }
            (ControllerState::Frozen, _) => self.track_silently(&event),
            (ControllerState::Live | ControllerState::Resyncing, _) => self.react(&event),
        }
    }

    /// Issue an AdjustVolume intent (any state except Idle)
    pub fn set_volume(&mut self, level: Volume) {
        if self.state == ControllerState::Idle {
            debug!("Idle: ignoring volume change to {:.2}", level.level());
            return;
        }
        self.issue(
            PlaybackAction::AdjustVolume { level },
            self.last_sequence_id,
        );
    }

    /// Stop playback, reset the context and return to Idle
    pub fn shutdown(&mut self) {
        if self.context.active_track.is_some() {
            self.issue(
                PlaybackAction::Stop {
                    transition: Transition::Immediate,
                },
                self.last_sequence_id,
            );
        }
        info!("Playback controller shutting down from {}", self.state);
        self.context = MusicContext::new();
        self.snapshot = ResyncSnapshot::new();
        self.unlocks.clear();
        self.last_play = None;
        self.in_flight = None;
        self.state = ControllerState::Idle;
    }

    // ========================================
    // State transitions
    // ========================================

    fn go_live(&mut self, connected: &GameEvent) {
        self.epoch = connected.session_epoch;
        self.last_sequence_id = connected.sequence_id;
        self.state = ControllerState::Live;
        info!("Session epoch {} live", self.epoch);

        if let Some(level) = self.initial_volume.take() {
            self.issue(PlaybackAction::AdjustVolume { level }, connected.sequence_id);
        }
        self.react(connected);
    }

    /// Rebuild the context for a new epoch and reconcile `active_track`
    ///
    /// The connected event and the snapshot are replayed through the catalog,
    /// in the order they originally arrived, without issuing anything; only the
    /// final target is dispatched, so a resync produces at most one intent.
    /// Received items are kept, so unlocked tracks stay playable.
    fn resync(&mut self, connected: &GameEvent) {
        let previous = self.state;
        self.state = ControllerState::Resyncing;
        self.epoch = connected.session_epoch;
        self.last_sequence_id = connected.sequence_id;
        self.checked_locations.clear();
        self.context.reset_keeping_track();
        info!(
            "Resyncing for epoch {} (was {}), replaying {} snapshot events",
            self.epoch,
            previous,
            self.snapshot.len()
        );

        let replay: Vec<GameEvent> = std::iter::once(connected.clone())
            .chain(self.snapshot.replay_order().into_iter().cloned())
            .collect();

        let mut target: Option<Resolution> = None;
        for event in &replay {
            self.update_region(event);
            if let Some(resolution) = self.catalog.resolve(event, &self.context, &self.unlocks) {
                self.apply_intensity(&resolution);
                // Ducked stingers are momentary, not part of the steady state
                if !resolution.transition.is_duck() {
                    target = Some(resolution);
                }
            }
        }

        if let Some(resolution) = target {
            self.dispatch(resolution, connected.sequence_id);
        }

        self.state = ControllerState::Live;
        info!(
            "Resync complete: region={} intensity={} track={}",
            self.context.region_or_unknown(),
            self.context.intensity_level,
            self.context
                .active_track
                .as_ref()
                .map(TrackId::as_str)
                .unwrap_or("none")
        );
    }

    // ========================================
    // Event reaction
    // ========================================

    fn react(&mut self, event: &GameEvent) {
        self.track_context(event);

        let Some(resolution) = self.catalog.resolve(event, &self.context, &self.unlocks) else {
            debug!("{} has no musical effect", event);
            return;
        };
        self.hold_intensity(event, &resolution);
        self.dispatch(resolution, event.sequence_id);
    }

    /// Frozen: bookkeeping only, nothing is issued
    fn track_silently(&mut self, event: &GameEvent) {
        self.track_context(event);
        if let Some(resolution) = self.catalog.resolve(event, &self.context, &self.unlocks) {
            self.hold_intensity(event, &resolution);
        }
        debug!("Frozen: tracked {} without playback", event);
    }

    /// Region and received items, applied before the event is resolved
    fn track_context(&mut self, event: &GameEvent) {
        self.snapshot.record_region(event);
        self.update_region(event);

        if let EventPayload::ItemReceived { item, .. } = &event.payload {
            if self.unlocks.receive(item) {
                debug!("Received '{}' ({} items held)", item, self.unlocks.len());
            }
        }
    }

    fn update_region(&mut self, event: &GameEvent) {
        if let EventPayload::RegionEntered { region } = &event.payload {
            self.context.current_region = Some(region.clone());
        }
    }

    fn hold_intensity(&mut self, event: &GameEvent, resolution: &Resolution) {
        if let Some(level) = self.apply_intensity(resolution) {
            self.snapshot.record_marker(level, event);
        }
    }

    /// Escalate freely; move down only for de-escalating rules
    ///
    /// Returns the level the context is now held at when the resolution set
    /// one.
    fn apply_intensity(&mut self, resolution: &Resolution) -> Option<IntensityLevel> {
        let level = resolution.intensity?;
        let current = self.context.intensity_level;
        if level > current || (level < current && resolution.deescalate) {
            info!("Intensity {} -> {}", current, level);
            self.context.intensity_level = level;
        }
        (self.context.intensity_level == level).then_some(level)
    }

    fn dispatch(&mut self, resolution: Resolution, sequence_id: u64) {
        let transition = resolution.transition;

        match resolution.cue {
            Cue::Play(track) if transition.is_duck() => {
                let cue = Cue::Play(track.clone());
                if self.in_flight.as_ref().is_some_and(|f| f.cue == cue) {
                    debug!("Stinger {} already in flight", track);
                    return;
                }
                let id = self.issue(PlaybackAction::Play { track, transition }, sequence_id);
                self.in_flight = Some(InFlight {
                    intent_id: id,
                    cue,
                    transition,
                });
            }
            Cue::Play(track) => {
                if self.context.active_track.as_ref() == Some(&track) {
                    debug!("{} already active", track);
                    return;
                }
                self.context.active_track = Some(track.clone());
                let id = self.issue(
                    PlaybackAction::Play {
                        track: track.clone(),
                        transition,
                    },
                    sequence_id,
                );
                self.last_play = Some((id, track.clone()));
                self.track_in_flight(id, Cue::Play(track), transition);
            }
            Cue::Stop => {
                if self.context.active_track.is_none() {
                    debug!("Nothing playing; stop is a no-op");
                    return;
                }
                self.context.active_track = None;
                self.last_play = None;
                let id = self.issue(PlaybackAction::Stop { transition }, sequence_id);
                self.track_in_flight(id, Cue::Stop, transition);
            }
        }
    }

    fn track_in_flight(&mut self, intent_id: u64, cue: Cue, transition: Transition) {
        self.in_flight = transition.duration().map(|_| InFlight {
            intent_id,
            cue,
            transition,
        });
    }

    fn issue(&mut self, action: PlaybackAction, sequence_id: u64) -> u64 {
        let id = self.next_intent_id;
        self.next_intent_id += 1;

        let intent = PlaybackIntent {
            id,
            action,
            issued_at_sequence_id: sequence_id,
        };
        info!("Issuing {}", intent);
        if self.intents.send(intent).is_err() {
            warn!("Audio sink worker is gone; intent #{} dropped", id);
        }
        id
    }

    // ========================================
    // Audio feedback
    // ========================================

    fn on_transition_complete(&mut self, intent_id: u64) {
        match &self.in_flight {
            Some(flight) if flight.intent_id == intent_id => {
                debug!("Transition {} for #{} complete", flight.transition, intent_id);
                self.in_flight = None;
            }
            _ => debug!("Completion for superseded intent #{}", intent_id),
        }
    }

    fn on_playback_failed(&mut self, intent_id: u64, failure: PlaybackFailure) {
        warn!("Intent #{}: {}", intent_id, failure);

        if self
            .in_flight
            .as_ref()
            .is_some_and(|f| f.intent_id == intent_id)
        {
            self.in_flight = None;
        }
        if self
            .last_play
            .as_ref()
            .is_some_and(|(id, _)| *id == intent_id)
        {
            self.last_play = None;
            self.context.active_track = None;
        }
    }

    fn on_track_finished(&mut self, track: &TrackId) {
        if self.state != ControllerState::Live {
            debug!("{} finished while {}; no check reported", track, self.state);
            return;
        }
        let Some(location) = self.catalog.check_location(track) else {
            return;
        };
        if !self.checked_locations.insert(location.to_string()) {
            return;
        }
        let Some(tx) = &self.location_checks else {
            return;
        };

        info!("{} finished; requesting check of '{}'", track, location);
        let request = LocationCheckRequest {
            location: location.to_string(),
            epoch: self.epoch,
        };
        if tx.send(request).is_err() {
            warn!("Location check receiver is gone");
        }
    }
}
