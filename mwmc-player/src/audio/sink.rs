//! AudioSink trait and the logging sink

use std::collections::BTreeMap;
use std::path::PathBuf;
use std::sync::Arc;

use async_trait::async_trait;
use mwmc_common::{TrackId, Transition, Volume};
use tracing::{info, warn};

use crate::catalog::{Cue, TrackCatalog};
use crate::error::PlaybackFailure;

/// Executes playback intents
///
/// Calls are made from a single worker task, in intent order. Implementations
/// return as soon as the action has started; timed transitions are tracked by
/// the worker.
#[async_trait]
pub trait AudioSink: Send + Sync {
    /// Start `track`, replacing (or for a duck, overlaying) the current one
    async fn play(&self, track: &TrackId, transition: Transition) -> Result<(), PlaybackFailure>;

    /// Stop the current track
    async fn stop(&self, transition: Transition) -> Result<(), PlaybackFailure>;

    async fn set_volume(&self, level: Volume) -> Result<(), PlaybackFailure>;
}

/// Sink that only logs what it would play
///
/// Used when no audio backend is attached. With a catalog it checks that the
/// track's asset exists on disk and fails the intent otherwise, the same way a
/// real backend would.
#[derive(Debug, Default)]
pub struct TracingSink {
    assets: Option<BTreeMap<TrackId, PathBuf>>,
}

impl TracingSink {
    pub fn new() -> Self {
        Self::default()
    }

    /// Validate asset paths against `catalog` before "playing"
    pub fn with_catalog(catalog: &Arc<TrackCatalog>) -> Self {
        let assets = catalog
            .rules()
            .iter()
            .filter_map(|rule| match &rule.cue {
                Cue::Play(track) => catalog
                    .asset(track)
                    .map(|asset| (track.clone(), asset.path.clone())),
                Cue::Stop => None,
            })
            .collect();
        Self {
            assets: Some(assets),
        }
    }
}

#[async_trait]
impl AudioSink for TracingSink {
    async fn play(&self, track: &TrackId, transition: Transition) -> Result<(), PlaybackFailure> {
        if let Some(assets) = &self.assets {
            match assets.get(track) {
                Some(path) if path.exists() => {
                    info!("▶ {} ({}) via {}", track, path.display(), transition);
                }
                Some(path) => {
                    warn!("Asset for {} not found at {}", track, path.display());
                    return Err(PlaybackFailure::missing_asset(track));
                }
                None => return Err(PlaybackFailure::missing_asset(track)),
            }
        } else {
            info!("▶ {} via {}", track, transition);
        }
        Ok(())
    }

    async fn stop(&self, transition: Transition) -> Result<(), PlaybackFailure> {
        info!("■ stop via {}", transition);
        Ok(())
    }

    async fn set_volume(&self, level: Volume) -> Result<(), PlaybackFailure> {
        info!("Volume {:.0}%", level.level() * 100.0);
        Ok(())
    }
}
