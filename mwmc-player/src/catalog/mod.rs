//! Track catalog
//!
//! Resolves game events to tracks through an immutable rule table.
//!
//! # Resolution
//!
//! Candidates are the rules whose trigger matches the event kind, whose payload
//! predicate (if any) matches the event subject, whose intensity is not
//! below the context's current intensity (unless the rule may de-escalate),
//! and whose track is not locked behind an item that has not been received.
//! Among candidates the winner is chosen by:
//! 1. highest `priority`
//! 2. a rule with a payload predicate over a wildcard rule
//! 3. earliest declaration
//!
//! [`TrackCatalog::resolve`] is a pure function of `(event, context, unlocks)`.

pub mod rules;
pub mod unlocks;

pub use rules::{default_intensity, Cue, PayloadPredicate, TrackAsset, TrackRule};
pub use unlocks::UnlockSet;

use mwmc_common::{Error, GameEvent, IntensityLevel, MusicContext, Result, TrackId, Transition};
use std::cmp::Reverse;
use std::collections::BTreeMap;
use std::path::Path;
use tracing::{debug, info};

use rules::RuleFile;

/// Outcome of a successful resolution
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Resolution {
    pub cue: Cue,
    pub transition: Transition,
    /// Intensity the context moves to (already gated against the context)
    pub intensity: Option<IntensityLevel>,
    pub deescalate: bool,
    /// Index of the winning rule in declaration order
    pub rule_index: usize,
}

impl Resolution {
    pub fn track(&self) -> Option<&TrackId> {
        match &self.cue {
            Cue::Play(track) => Some(track),
            Cue::Stop => None,
        }
    }
}

/// Immutable rule table plus the track assets it refers to
#[derive(Debug, Clone)]
pub struct TrackCatalog {
    rules: Vec<TrackRule>,
    tracks: BTreeMap<TrackId, TrackAsset>,
}

impl TrackCatalog {
    /// Build a catalog from rules and assets
    ///
    /// # Errors
    ///
    /// [`Error::Config`] when the rule table is empty or a rule plays a track
    /// that has no asset.
    pub fn new(rules: Vec<TrackRule>, tracks: BTreeMap<TrackId, TrackAsset>) -> Result<Self> {
        if rules.is_empty() {
            return Err(Error::Config("rule table contains no rules".to_string()));
        }
        for (index, rule) in rules.iter().enumerate() {
            if let Cue::Play(track) = &rule.cue {
                if !tracks.contains_key(track) {
                    return Err(Error::Config(format!(
                        "rule {} ({}) plays unknown track '{}'",
                        index, rule.trigger, track
                    )));
                }
            }
        }
        Ok(Self { rules, tracks })
    }

    /// Build a catalog whose tracks have no backing files
    ///
    /// Every played track gets a placeholder asset named after its id.
    pub fn from_rules(rules: Vec<TrackRule>) -> Result<Self> {
        let tracks = rules
            .iter()
            .filter_map(|rule| match &rule.cue {
                Cue::Play(track) => Some((track.clone(), TrackAsset::new(track.as_str()))),
                Cue::Stop => None,
            })
            .collect();
        Self::new(rules, tracks)
    }

    /// Parse a rule file; relative asset paths are joined onto `music_root`
    pub fn from_toml_str(text: &str, music_root: Option<&Path>) -> Result<Self> {
        let file: RuleFile = toml::from_str(text)
            .map_err(|e| Error::Config(format!("Failed to parse rule table: {}", e)))?;

        let tracks = file
            .tracks
            .into_iter()
            .map(|(id, entry)| {
                let asset = entry
                    .into_asset(music_root)
                    .map_err(|e| Error::Config(format!("track '{}': {}", id, e)))?;
                Ok::<_, Error>((TrackId::new(id), asset))
            })
            .collect::<Result<BTreeMap<_, _>>>()?;

        let rules = file
            .rules
            .into_iter()
            .enumerate()
            .map(|(index, spec)| {
                spec.into_rule()
                    .map_err(|e| Error::Config(format!("rule {}: {}", index, e)))
            })
            .collect::<Result<Vec<_>>>()?;

        Self::new(rules, tracks)
    }

    /// Load the rule table from a file (startup only)
    pub fn load(path: &Path, music_root: Option<&Path>) -> Result<Self> {
        let text = std::fs::read_to_string(path).map_err(|e| {
            Error::Config(format!("Failed to read rule table {:?}: {}", path, e))
        })?;
        let catalog = Self::from_toml_str(&text, music_root)?;
        info!(
            "Loaded {} track rules and {} tracks ({} locked) from {:?}",
            catalog.rules.len(),
            catalog.tracks.len(),
            catalog.tracks.values().filter(|a| a.is_locked()).count(),
            path
        );
        Ok(catalog)
    }

    /// Resolve an event against the rule table
    ///
    /// Returns `None` when no rule applies (the event has no musical effect).
    /// Rules playing a track whose required items are not all in `unlocks`
    /// are skipped, so a lower-ranked rule may win instead.
    pub fn resolve(
        &self,
        event: &GameEvent,
        context: &MusicContext,
        unlocks: &UnlockSet,
    ) -> Option<Resolution> {
        let kind = event.kind();
        let subject = event.subject();

        let (rule_index, rule) = self
            .rules
            .iter()
            .enumerate()
            .filter(|(_, rule)| rule.trigger == kind)
            .filter(|(_, rule)| match (&rule.predicate, subject) {
                (None, _) => true,
                (Some(predicate), Some(subject)) => predicate.matches(subject),
                (Some(_), None) => false,
            })
            .filter(|(_, rule)| match rule.effective_intensity() {
                Some(level) => level >= context.intensity_level || rule.deescalate,
                None => true,
            })
            .filter(|(_, rule)| self.is_playable(&rule.cue, unlocks))
            .max_by_key(|(index, rule)| (rule.priority, rule.is_specific(), Reverse(*index)))?;

        debug!("{} resolved by rule {} ({:?})", event, rule_index, rule.cue);
        Some(Resolution {
            cue: rule.cue.clone(),
            transition: rule.transition,
            intensity: rule.effective_intensity(),
            deescalate: rule.deescalate,
            rule_index,
        })
    }

    /// Stops are always allowed; a play needs its track's items received
    pub fn is_playable(&self, cue: &Cue, unlocks: &UnlockSet) -> bool {
        match cue {
            Cue::Play(track) => self
                .tracks
                .get(track)
                .is_some_and(|asset| unlocks.satisfies(&asset.requires)),
            Cue::Stop => true,
        }
    }

    pub fn rules(&self) -> &[TrackRule] {
        &self.rules
    }

    pub fn asset(&self, track: &TrackId) -> Option<&TrackAsset> {
        self.tracks.get(track)
    }

    /// Location to report when `track` finishes playing
    pub fn check_location(&self, track: &TrackId) -> Option<&str> {
        self.tracks.get(track)?.check_location.as_deref()
    }
}
