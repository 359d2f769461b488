//! Three-way classification of desired tabs against live tabs.
//!
//! Pure computation: no host calls, no storage. The engine turns a plan into pin and
//! create actions.

use crate::host::LiveTab;
use crate::normalize::{NormalizedKey, UrlNormalizer};
use crate::types::{sort_for_opening, TabConfig};
use serde::{Deserialize, Serialize};
use std::collections::HashSet;

/// How a desired tab relates to the live tabs.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum Classification {
    /// A pinned live tab already shows this key
    AlreadyOpen,
    /// Not visible yet, but decided by a run within the recent-decision window
    RecentlyHandled,
    /// Same key as an earlier entry in this run
    Duplicate,
    /// Open but not pinned
    NeedsPin,
    /// Not open anywhere in scope
    NeedsCreate,
}

impl Classification {
    /// Entries that need no action and count as already open or skipped.
    pub fn is_settled(self) -> bool {
        matches!(
            self,
            Classification::AlreadyOpen | Classification::RecentlyHandled | Classification::Duplicate
        )
    }
}

#[derive(Debug, Clone)]
pub struct PlannedEntry {
    pub tab: TabConfig,
    pub key: NormalizedKey,
    pub classification: Classification,
    /// Live tab matched for `AlreadyOpen` and `NeedsPin`
    pub live_tab: Option<LiveTab>,
}

/// Desired tabs in open order, each classified once.
#[derive(Debug, Clone, Default)]
pub struct ReconcilePlan {
    pub entries: Vec<PlannedEntry>,
}

impl ReconcilePlan {
    /// Classify `desired` against `live`.
    ///
    /// Disabled entries and entries outside `category` are dropped; the rest are
    /// sorted into open order. `recently_decided` is consulted only for keys with no
    /// live match.
    pub fn build<F>(
        desired: &[TabConfig],
        live: &[LiveTab],
        category: Option<&str>,
        normalizer: &UrlNormalizer,
        recently_decided: F,
    ) -> Self
    where
        F: Fn(&NormalizedKey) -> bool,
    {
        let mut selected: Vec<TabConfig> = desired
            .iter()
            .filter(|t| t.enabled)
            .filter(|t| category.map_or(true, |c| t.category == c))
            .cloned()
            .collect();
        sort_for_opening(&mut selected);

        let live_keys: Vec<(NormalizedKey, &LiveTab)> = live
            .iter()
            .map(|tab| (normalizer.normalize(&tab.url), tab))
            .collect();

        let mut resolved: HashSet<NormalizedKey> = HashSet::new();
        let mut entries = Vec::with_capacity(selected.len());

        for tab in selected {
            let key = normalizer.normalize(&tab.url);

            if !resolved.insert(key.clone()) {
                entries.push(PlannedEntry {
                    tab,
                    key,
                    classification: Classification::Duplicate,
                    live_tab: None,
                });
                continue;
            }

            let pinned = live_keys.iter().find(|(k, t)| *k == key && t.pinned);
            let unpinned = || live_keys.iter().find(|(k, t)| *k == key && !t.pinned);

            let (classification, live_tab) = if let Some((_, t)) = pinned {
                (Classification::AlreadyOpen, Some((*t).clone()))
            } else if let Some((_, t)) = unpinned() {
                (Classification::NeedsPin, Some((*t).clone()))
            } else if recently_decided(&key) {
                (Classification::RecentlyHandled, None)
            } else {
                (Classification::NeedsCreate, None)
            };

            entries.push(PlannedEntry {
                tab,
                key,
                classification,
                live_tab,
            });
        }

        Self { entries }
    }

    pub fn with_classification(
        &self,
        classification: Classification,
    ) -> impl Iterator<Item = &PlannedEntry> {
        self.entries
            .iter()
            .filter(move |e| e.classification == classification)
    }

    pub fn count(&self, classification: Classification) -> usize {
        self.with_classification(classification).count()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}
