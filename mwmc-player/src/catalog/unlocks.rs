//! Received-item bookkeeping for locked tracks
//!
//! A `[tracks]` entry may name the items it `requires`. Every listed item must
//! have been received before a rule may play the track. Names compare after
//! the same normalization as item events (trimmed, `(Album)` marker dropped,
//! case-insensitive), so `"Folklore (Album)"` and `"folklore"` are one key.

use std::collections::BTreeSet;

use mwmc_common::events::normalize_item_name;

/// Items received so far in the session
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct UnlockSet {
    items: BTreeSet<String>,
}

impl UnlockSet {
    pub fn new() -> Self {
        Self::default()
    }

    /// Record a received item; returns `true` if it was new
    pub fn receive(&mut self, item: &str) -> bool {
        let key = unlock_key(item);
        !key.is_empty() && self.items.insert(key)
    }

    pub fn contains(&self, item: &str) -> bool {
        self.items.contains(&unlock_key(item))
    }

    /// True when every item in `requires` has been received
    pub fn satisfies(&self, requires: &[String]) -> bool {
        requires.iter().all(|item| self.contains(item))
    }

    pub fn len(&self) -> usize {
        self.items.len()
    }

    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }

    pub fn clear(&mut self) {
        self.items.clear();
    }
}

/// Comparison key for item names
pub fn unlock_key(item: &str) -> String {
    normalize_item_name(item).to_lowercase()
}
