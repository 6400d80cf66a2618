//! TrackRule types and the declarative rule file
//!
//! Rule file layout (TOML):
//!
//! ```toml
//! [tracks]
//! forest = "regions/forest.ogg"
//! ending = { path = "ending.ogg", check_location = "Listen to the Ending" }
//! heat_waves = { path = "heat_waves.ogg", requires = ["Heat Waves", "Dreamland (Album)"] }
//!
//! [[rule]]
//! trigger = "region_entered"
//! subject = "Forest"
//! track = "forest"
//! transition = { kind = "crossfade", duration_ms = 2000 }
//! priority = 10
//! ```

use mwmc_common::events::{normalize_item_name, EventKind};
use mwmc_common::{IntensityLevel, TrackId, Transition};
use serde::Deserialize;
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use super::unlocks::unlock_key;

/// Optional payload predicate of a rule (case-insensitive)
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PayloadPredicate {
    Equals(String),
    AnyOf(Vec<String>),
    Prefix(String),
}

impl PayloadPredicate {
    pub fn matches(&self, subject: &str) -> bool {
        let subject = subject.trim().to_lowercase();
        match self {
            PayloadPredicate::Equals(expected) => subject == expected.to_lowercase(),
            PayloadPredicate::AnyOf(options) => {
                options.iter().any(|o| subject == o.to_lowercase())
            }
            PayloadPredicate::Prefix(prefix) => subject.starts_with(&prefix.to_lowercase()),
        }
    }
}

/// What a matching rule asks for
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Cue {
    Play(TrackId),
    Stop,
}

/// Declarative mapping from an event trigger to a playback change
#[derive(Debug, Clone, PartialEq)]
pub struct TrackRule {
    pub trigger: EventKind,
    pub predicate: Option<PayloadPredicate>,
    pub cue: Cue,
    pub transition: Transition,
    pub priority: i32,
    /// Explicit intensity; `None` falls back to the trigger's default
    pub intensity: Option<IntensityLevel>,
    /// Allows moving the context to a lower intensity
    pub deescalate: bool,
}

impl TrackRule {
    pub fn play(trigger: EventKind, track: &str) -> Self {
        Self {
            trigger,
            predicate: None,
            cue: Cue::Play(TrackId::from(track)),
            transition: Transition::Immediate,
            priority: 0,
            intensity: None,
            deescalate: false,
        }
    }

    pub fn stop(trigger: EventKind) -> Self {
        Self {
            cue: Cue::Stop,
            ..Self::play(trigger, "")
        }
    }

    pub fn with_subject(mut self, subject: &str) -> Self {
        self.predicate = Some(PayloadPredicate::Equals(subject.to_string()));
        self
    }

    pub fn with_predicate(mut self, predicate: PayloadPredicate) -> Self {
        self.predicate = Some(predicate);
        self
    }

    pub fn with_priority(mut self, priority: i32) -> Self {
        self.priority = priority;
        self
    }

    pub fn with_transition(mut self, transition: Transition) -> Self {
        self.transition = transition;
        self
    }

    pub fn with_intensity(mut self, intensity: IntensityLevel) -> Self {
        self.intensity = Some(intensity);
        self
    }

    pub fn deescalating(mut self) -> Self {
        self.deescalate = true;
        self
    }

    /// Intensity this rule moves the context to, if any
    pub fn effective_intensity(&self) -> Option<IntensityLevel> {
        self.intensity.or_else(|| default_intensity(self.trigger))
    }

    /// A rule with a payload predicate outranks a wildcard at equal priority
    pub fn is_specific(&self) -> bool {
        self.predicate.is_some()
    }
}

/// Intensity implied by a trigger kind when the rule does not set one
pub fn default_intensity(kind: EventKind) -> Option<IntensityLevel> {
    match kind {
        EventKind::RegionEntered => Some(IntensityLevel::Calm),
        EventKind::BossDefeated | EventKind::Goaled => Some(IntensityLevel::Victory),
        _ => None,
    }
}

/// Asset backing a track id
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TrackAsset {
    pub path: PathBuf,
    /// Location reported to the server when the track plays to its end
    pub check_location: Option<String>,
    /// Items that must all be received before the track may play
    pub requires: Vec<String>,
}

impl TrackAsset {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            check_location: None,
            requires: Vec::new(),
        }
    }

    pub fn with_check_location(mut self, location: &str) -> Self {
        self.check_location = Some(location.to_string());
        self
    }

    pub fn requiring(mut self, items: &[&str]) -> Self {
        self.requires = items.iter().map(|item| item.to_string()).collect();
        self
    }

    pub fn is_locked(&self) -> bool {
        !self.requires.is_empty()
    }
}

// ========================================
// File schema
// ========================================

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
pub(crate) struct RuleFile {
    #[serde(default)]
    pub tracks: BTreeMap<String, TrackEntry>,
    #[serde(default, rename = "rule")]
    pub rules: Vec<RuleSpec>,
}

#[derive(Debug, Deserialize)]
#[serde(untagged)]
pub(crate) enum TrackEntry {
    Path(PathBuf),
    Detailed(TrackDetail),
}

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
pub(crate) struct TrackDetail {
    path: PathBuf,
    #[serde(default)]
    check_location: Option<String>,
    #[serde(default)]
    requires: Option<Requires>,
}

/// `requires = "Item"` or `requires = ["Item", "Album (Album)"]`
#[derive(Debug, Deserialize)]
#[serde(untagged)]
pub(crate) enum Requires {
    One(String),
    All(Vec<String>),
}

impl Requires {
    fn into_vec(self) -> Vec<String> {
        match self {
            Requires::One(item) => vec![item],
            Requires::All(items) => items,
        }
    }
}

impl TrackEntry {
    /// Build the asset, joining relative paths onto `music_root`
    pub fn into_asset(self, music_root: Option<&Path>) -> Result<TrackAsset, String> {
        let (path, check_location, requires) = match self {
            TrackEntry::Path(path) => (path, None, Vec::new()),
            TrackEntry::Detailed(detail) => (
                detail.path,
                detail.check_location,
                detail.requires.map(Requires::into_vec).unwrap_or_default(),
            ),
        };

        if requires.iter().any(|item| unlock_key(item).is_empty()) {
            return Err("'requires' contains an empty item name".to_string());
        }
        if check_location
            .as_deref()
            .is_some_and(|location| location.trim().is_empty())
        {
            return Err("'check_location' must not be empty".to_string());
        }

        let path = match music_root {
            Some(root) if path.is_relative() => root.join(path),
            _ => path,
        };
        Ok(TrackAsset {
            path,
            check_location,
            requires,
        })
    }
}

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
pub(crate) struct RuleSpec {
    pub trigger: EventKind,
    #[serde(default)]
    pub subject: Option<String>,
    #[serde(default)]
    pub subjects: Option<Vec<String>>,
    #[serde(default)]
    pub subject_prefix: Option<String>,
    #[serde(default)]
    pub track: Option<String>,
    #[serde(default)]
    pub stop: bool,
    #[serde(default)]
    pub transition: Transition,
    #[serde(default)]
    pub priority: i32,
    #[serde(default)]
    pub intensity: Option<IntensityLevel>,
    #[serde(default)]
    pub deescalate: bool,
}

impl RuleSpec {
    /// Convert to a [`TrackRule`], reporting schema violations as text
    pub fn into_rule(self) -> Result<TrackRule, String> {
        let predicate = match (self.subject, self.subjects, self.subject_prefix) {
            (None, None, None) => None,
            (Some(subject), None, None) => Some(PayloadPredicate::Equals(normalize(&subject)?)),
            (None, Some(subjects), None) => {
                if subjects.is_empty() {
                    return Err("'subjects' must not be empty".to_string());
                }
                let normalized = subjects
                    .iter()
                    .map(|s| normalize(s))
                    .collect::<Result<Vec<_>, _>>()?;
                Some(PayloadPredicate::AnyOf(normalized))
            }
            (None, None, Some(prefix)) => Some(PayloadPredicate::Prefix(normalize(&prefix)?)),
            _ => {
                return Err(
                    "only one of 'subject', 'subjects', 'subject_prefix' may be set".to_string(),
                )
            }
        };
        if self.trigger == EventKind::Disconnected {
            return Err(
                "trigger 'disconnected' never resolves; playback freezes on disconnect".to_string(),
            );
        }
        if predicate.is_some() && !self.trigger.has_subject() {
            return Err(format!("trigger '{}' carries no subject to match", self.trigger));
        }

        let cue = match (self.track, self.stop) {
            (Some(track), false) if !track.trim().is_empty() => Cue::Play(TrackId::new(track)),
            (None, true) => Cue::Stop,
            _ => return Err("exactly one of 'track' or 'stop = true' is required".to_string()),
        };

        if let Some(duration) = self.transition.duration() {
            if duration.is_zero() {
                return Err(format!("{} needs a non-zero duration_ms", self.transition));
            }
        }
        if cue == Cue::Stop && self.transition.is_duck() {
            return Err("a stop rule cannot duck".to_string());
        }

        Ok(TrackRule {
            trigger: self.trigger,
            predicate,
            cue,
            transition: self.transition,
            priority: self.priority,
            intensity: self.intensity,
            deescalate: self.deescalate,
        })
    }
}

fn normalize(subject: &str) -> Result<String, String> {
    let normalized = normalize_item_name(subject);
    if normalized.is_empty() {
        Err("empty subject".to_string())
    } else {
        Ok(normalized)
    }
}
