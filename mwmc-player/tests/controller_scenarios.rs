//! Session scenarios through the event bus and playback controller
//!
//! Drives `SessionEventBus` + `PlaybackController` synchronously, the way the
//! engine's ingress and controller tasks do, and inspects the issued intents.

mod helpers;

use std::sync::Arc;

use helpers::{boss_defeated, item_received, region_entered, SCENARIO_RULES};
use mwmc_common::{
    IntensityLevel, PlaybackAction, PlaybackIntent, RawSessionMessage, TrackId, Transition,
};
use mwmc_player::bus::SessionEventBus;
use mwmc_player::catalog::TrackCatalog;
use mwmc_player::playback::{
    ControllerInput, ControllerState, LocationCheckRequest, PlaybackController,
};
use mwmc_player::PlaybackFailure;
use tokio::sync::mpsc;

struct Pipeline {
    bus: SessionEventBus,
    controller: PlaybackController,
    intents: mpsc::UnboundedReceiver<PlaybackIntent>,
    checks: mpsc::UnboundedReceiver<LocationCheckRequest>,
}

impl Pipeline {
    fn new() -> Self {
        let catalog = Arc::new(TrackCatalog::from_toml_str(SCENARIO_RULES, None).unwrap());
        let (intent_tx, intents) = mpsc::unbounded_channel();
        let (check_tx, checks) = mpsc::unbounded_channel();
        Self {
            bus: SessionEventBus::new(),
            controller: PlaybackController::new(catalog, intent_tx).with_location_checks(check_tx),
            intents,
            checks,
        }
    }

    /// Raw message through the bus, then into the controller if accepted
    fn feed(&mut self, raw: RawSessionMessage) -> bool {
        match self.bus.ingest(raw) {
            Some(event) => {
                self.controller.handle(event);
                true
            }
            None => false,
        }
    }

    fn connect(&mut self, epoch: u64) {
        assert!(self.feed(RawSessionMessage::connected(epoch)));
    }

    fn disconnect(&mut self, epoch: u64) {
        assert!(self.feed(RawSessionMessage::disconnected(epoch)));
    }

    fn take_intents(&mut self) -> Vec<PlaybackIntent> {
        let mut out = Vec::new();
        while let Ok(intent) = self.intents.try_recv() {
            out.push(intent);
        }
        out
    }

    fn take_played(&mut self) -> Vec<String> {
        self.take_intents()
            .iter()
            .filter_map(|i| i.track().map(|t| t.as_str().to_string()))
            .collect()
    }

    fn active_track(&self) -> Option<&str> {
        self.controller
            .context()
            .active_track
            .as_ref()
            .map(TrackId::as_str)
    }
}

// ================================================================================================
// Scenarios
// ================================================================================================

#[test]
fn test_scenario_a_connect_then_region() {
    let mut p = Pipeline::new();
    p.connect(1);
    p.feed(region_entered(1, "Forest").with_epoch(1));

    assert_eq!(p.controller.state(), ControllerState::Live);
    assert_eq!(
        p.controller.context().current_region.as_deref(),
        Some("Forest")
    );
    assert_eq!(p.active_track(), Some("forest"));
    assert_eq!(p.take_played(), vec!["title", "forest"]);
}

#[test]
fn test_scenario_b_frozen_after_disconnect() {
    let mut p = Pipeline::new();
    p.connect(1);
    p.feed(region_entered(1, "Forest").with_epoch(1));
    p.take_intents();

    p.disconnect(1);
    assert_eq!(p.controller.state(), ControllerState::Frozen);

    // Late delivery from the same epoch is still accepted by the bus
    assert!(p.feed(region_entered(2, "Cave").with_epoch(1)));

    assert_eq!(p.controller.state(), ControllerState::Frozen);
    assert_eq!(p.controller.context().current_region.as_deref(), Some("Cave"));
    assert!(p.take_intents().is_empty());
    assert_eq!(p.active_track(), Some("forest"));
}

#[test]
fn test_scenario_c_resync_issues_one_intent() {
    let mut p = Pipeline::new();
    p.connect(1);
    p.feed(region_entered(1, "Forest").with_epoch(1));
    p.disconnect(1);
    p.feed(region_entered(2, "Cave").with_epoch(1));
    p.take_intents();

    p.connect(2);

    assert_eq!(p.controller.state(), ControllerState::Live);
    assert_eq!(p.controller.epoch(), 2);
    assert_eq!(p.controller.context().current_region.as_deref(), Some("Cave"));

    let intents = p.take_intents();
    assert_eq!(intents.len(), 1, "resync issued {:?}", intents);
    assert_eq!(
        intents[0].action,
        PlaybackAction::Play {
            track: TrackId::from("cave"),
            transition: Transition::Crossfade { duration_ms: 500 },
        }
    );
    assert_eq!(p.active_track(), Some("cave"));
}

#[test]
fn test_scenario_d_out_of_order_duplicate() {
    let mut p = Pipeline::new();
    p.connect(1);
    assert!(p.feed(item_received(5, "Sword").with_epoch(1)));
    assert!(!p.feed(item_received(3, "Shield").with_epoch(1)));

    assert_eq!(p.take_played(), vec!["title", "jingle"]);
    assert_eq!(p.bus.stats().duplicates, 1);
}

// ================================================================================================
// Properties
// ================================================================================================

#[test]
fn test_intensity_does_not_decay_without_deescalation() {
    let mut p = Pipeline::new();
    p.connect(1);
    p.feed(region_entered(1, "Forest").with_epoch(1));
    p.feed(boss_defeated(2, "Dragon").with_epoch(1));
    assert_eq!(
        p.controller.context().intensity_level,
        IntensityLevel::Victory
    );
    p.take_intents();

    // Calm-mapped stray region event: no candidate survives the gate
    p.feed(region_entered(3, "Cave").with_epoch(1));
    assert_eq!(
        p.controller.context().intensity_level,
        IntensityLevel::Victory
    );
    assert!(p.take_intents().is_empty());
    assert_eq!(p.controller.context().current_region.as_deref(), Some("Cave"));

    // Explicit de-escalating trigger
    p.feed(region_entered(4, "Town").with_epoch(1));
    assert_eq!(p.controller.context().intensity_level, IntensityLevel::Calm);
    assert_eq!(p.take_played(), vec!["forest"]);
}

#[test]
fn test_resync_after_deescalation_restores_calm_track() {
    let mut p = Pipeline::new();
    p.connect(1);
    p.feed(region_entered(1, "Forest").with_epoch(1));
    p.feed(boss_defeated(2, "Dragon").with_epoch(1));
    p.feed(region_entered(3, "Town").with_epoch(1));
    assert_eq!(p.take_played(), vec!["title", "forest", "victory", "forest"]);

    p.disconnect(1);
    p.connect(2);

    assert!(p.take_intents().is_empty());
    assert_eq!(p.controller.context().intensity_level, IntensityLevel::Calm);
    assert_eq!(p.active_track(), Some("forest"));
}

#[test]
fn test_escalation_through_boss_region() {
    let mut p = Pipeline::new();
    p.connect(1);
    p.feed(region_entered(1, "boss lair").with_epoch(1));
    assert_eq!(p.controller.context().intensity_level, IntensityLevel::Boss);
    assert_eq!(p.active_track(), Some("boss"));
}

#[test]
fn test_repeated_trigger_during_crossfade_is_noop() {
    let mut p = Pipeline::new();
    p.connect(1);
    p.feed(region_entered(1, "Forest").with_epoch(1));
    p.feed(region_entered(2, "Forest").with_epoch(1));
    let intents = p.take_intents();
    assert_eq!(intents.len(), 2);

    p.controller.process(ControllerInput::TransitionComplete {
        intent_id: intents[1].id,
    });
    p.feed(region_entered(3, "Forest").with_epoch(1));
    assert!(p.take_intents().is_empty());
}

#[test]
fn test_stale_epoch_events_never_reach_controller() {
    let mut p = Pipeline::new();
    p.connect(1);
    p.disconnect(1);
    p.connect(2);
    p.take_intents();

    assert!(!p.feed(region_entered(9, "Forest").with_epoch(1)));
    assert_eq!(p.bus.stats().stale, 1);
    assert!(p.take_intents().is_empty());
}

#[test]
fn test_playback_failure_keeps_controller_live() {
    let mut p = Pipeline::new();
    p.connect(1);
    p.feed(region_entered(1, "Cave").with_epoch(1));
    let cave = p.take_intents().pop().unwrap();

    p.controller.process(ControllerInput::PlaybackFailed {
        intent_id: cave.id,
        failure: PlaybackFailure::missing_asset(&TrackId::from("cave")),
    });

    assert_eq!(p.controller.state(), ControllerState::Live);
    assert_eq!(p.active_track(), None);
    assert_eq!(p.controller.context().current_region.as_deref(), Some("Cave"));

    p.feed(region_entered(2, "Forest").with_epoch(1));
    assert_eq!(p.take_played(), vec!["forest"]);
}

#[test]
fn test_track_finished_requests_location_check_once_per_epoch() {
    let mut p = Pipeline::new();
    p.connect(1);
    p.feed(boss_defeated(1, "Dragon").with_epoch(1));
    let victory = TrackId::from("victory");

    p.controller.process(ControllerInput::TrackFinished {
        track: victory.clone(),
    });
    p.controller.process(ControllerInput::TrackFinished {
        track: victory.clone(),
    });
    assert_eq!(
        p.checks.try_recv().unwrap(),
        LocationCheckRequest {
            location: "Victory Song".to_string(),
            epoch: 1,
        }
    );
    assert!(p.checks.try_recv().is_err());

    // Frozen: no checks
    p.disconnect(1);
    p.controller.process(ControllerInput::TrackFinished {
        track: victory.clone(),
    });
    assert!(p.checks.try_recv().is_err());

    // New epoch: reported again
    p.connect(2);
    p.controller
        .process(ControllerInput::TrackFinished { track: victory });
    assert_eq!(p.checks.try_recv().unwrap().epoch, 2);
}

#[test]
fn test_locked_track_needs_its_item() {
    let mut p = Pipeline::new();
    p.connect(1);
    p.feed(region_entered(1, "Nursery").with_epoch(1));
    assert_eq!(p.take_played(), vec!["title"]);

    p.feed(item_received(2, "Music Box (Album)").with_epoch(1));
    p.feed(region_entered(3, "Nursery").with_epoch(1));
    assert_eq!(p.take_played(), vec!["jingle", "lullaby"]);
    assert_eq!(p.active_track(), Some("lullaby"));
}

#[test]
fn test_tracks_without_check_location_report_nothing() {
    let mut p = Pipeline::new();
    p.connect(1);
    p.controller.process(ControllerInput::TrackFinished {
        track: TrackId::from("title"),
    });
    assert!(p.checks.try_recv().is_err());
}
