//! Playback controller and its processing-queue inputs

pub mod controller;
pub mod events;
pub mod state;

pub use controller::PlaybackController;
pub use events::{ControllerInput, LocationCheckRequest};
pub use state::{ControllerSnapshot, ControllerState, ResyncSnapshot};
