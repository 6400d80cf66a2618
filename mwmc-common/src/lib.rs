//! # MWMC Common Library
//!
//! Shared code for the multiworld music companion:
//! - Session event types (GameEvent, RawSessionMessage, ConnectionState)
//! - Music context and playback intent vocabulary
//! - Configuration loading
//! - Common error taxonomy

pub mod config;
pub mod context;
pub mod error;
pub mod events;
pub mod intent;

pub use context::{IntensityLevel, MusicContext};
pub use error::{Error, Result};
pub use events::{EventKind, EventPayload, GameEvent, RawSessionMessage};
pub use intent::{PlaybackAction, PlaybackIntent, TrackId, Transition, Volume};
