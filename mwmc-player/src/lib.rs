//! # MWMC Player Library (mwmc-player)
//!
//! Event-driven music controller for a multiworld randomizer session.
//!
//! **Purpose:** Normalize the session's event stream, map events to playback
//! intents through a rule table, and drive an audio sink while riding out
//! disconnects and reconnects without duplicate or lost cues.
//!
//! **Architecture:** network client → [`bus::SessionEventBus`] →
//! [`playback::PlaybackController`] → [`audio::AudioSink`], with the
//! [`connection::ConnectionSupervisor`] feeding connectivity changes into the
//! same stream. [`engine::Engine`] wires the tasks together.

pub mod audio;
pub mod bus;
pub mod catalog;
pub mod connection;
pub mod engine;
pub mod error;
pub mod playback;

pub use engine::{Engine, EngineHandle, EngineSettings};
pub use error::{ConnectError, Error, PlaybackFailure, Result};
