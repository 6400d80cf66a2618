//! Inputs of the single processing queue
//!
//! Everything that may change the music context (session events, audio
//! completions, operator commands) is serialized into one queue of
//! [`ControllerInput`] consumed by the playback controller.

use mwmc_common::{GameEvent, TrackId, Volume};

use crate::error::PlaybackFailure;

/// One unit of work for the playback controller
#[derive(Debug, Clone, PartialEq)]
pub enum ControllerInput {
    /// Normalized session event from the event bus
    Event(GameEvent),

    /// A timed transition (crossfade/duck) finished on the audio side
    TransitionComplete { intent_id: u64 },

    /// The audio sink could not execute an intent
    PlaybackFailed {
        intent_id: u64,
        failure: PlaybackFailure,
    },

    /// A track played through to its end once
    TrackFinished { track: TrackId },

    /// Operator volume change
    SetVolume(Volume),

    /// Stop playback and leave the session
    Shutdown,
}

/// Outbound request for the network client to report a location check
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LocationCheckRequest {
    pub location: String,
    /// Epoch the request was raised in
    pub epoch: u64,
}
