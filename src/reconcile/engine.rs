//! Reconciliation engine
//!
//! Brings a window into the configured state: pins configured tabs that are open
//! but unpinned, opens the missing ones, and reports what happened per entry.

use crate::catalog::TabCatalog;
use crate::concurrency::{ConcurrencyGuard, OperationKind};
use crate::error::{ApiError, HostError};
use crate::host::{CreateTabRequest, LiveTab, TabHost, TabId, TabUpdate, WindowId};
use crate::normalize::{NormalizedKey, UrlNormalizer};
use crate::reconcile::plan::{Classification, PlannedEntry, ReconcilePlan};
use crate::types::TabConfig;
use chrono::Utc;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::time::Duration;
use tokio::time::sleep;
use tracing::{debug, info, warn};

/// Engine configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ReconcileConfig {
    /// Partition tag meaning "no partition"
    #[serde(default = "default_partition")]
    pub default_partition: String,

    /// Wait before pinning a tab that lives in a partition (milliseconds)
    #[serde(default = "default_partition_settle_delay_ms")]
    pub partition_settle_delay_ms: u64,

    /// Wait before checking the pin state of a tab created in a partition (milliseconds)
    #[serde(default = "default_partition_verify_delay_ms")]
    pub partition_verify_delay_ms: u64,

    /// Wait after a window opens before auto-opening tabs into it (milliseconds)
    #[serde(default = "default_auto_open_delay_ms")]
    pub auto_open_delay_ms: u64,

    /// Smallest window that still counts as a browsing window
    #[serde(default = "default_min_window_width")]
    pub min_window_width: u32,

    #[serde(default = "default_min_window_height")]
    pub min_window_height: u32,
}

fn default_partition() -> String {
    "firefox-default".to_string()
}

fn default_partition_settle_delay_ms() -> u64 {
    150
}

fn default_partition_verify_delay_ms() -> u64 {
    100
}

fn default_auto_open_delay_ms() -> u64 {
    100
}

fn default_min_window_width() -> u32 {
    400
}

fn default_min_window_height() -> u32 {
    300
}

impl Default for ReconcileConfig {
    fn default() -> Self {
        Self {
            default_partition: default_partition(),
            partition_settle_delay_ms: default_partition_settle_delay_ms(),
            partition_verify_delay_ms: default_partition_verify_delay_ms(),
            auto_open_delay_ms: default_auto_open_delay_ms(),
            min_window_width: default_min_window_width(),
            min_window_height: default_min_window_height(),
        }
    }
}

impl ReconcileConfig {
    pub fn validate(&self) -> Result<(), String> {
        if self.default_partition.trim().is_empty() {
            return Err("default_partition cannot be empty".to_string());
        }
        Ok(())
    }

    fn is_partitioned(&self, tag: Option<&str>) -> bool {
        tag.is_some_and(|t| !t.is_empty() && t != self.default_partition)
    }
}

/// What happened to one configured tab.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum EntryOutcome {
    AlreadyOpen,
    RecentlyHandled,
    Duplicate,
    Pinned,
    PinFailed,
    Opened,
    OpenFailed,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EntryResult {
    pub tab_id: String,
    pub url: String,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub title: String,
    pub normalized_key: NormalizedKey,
    pub outcome: EntryOutcome,
    /// Live tab pinned, matched or created
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub live_tab_id: Option<TabId>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl EntryResult {
    fn new(entry: &PlannedEntry, outcome: EntryOutcome) -> Self {
        Self {
            tab_id: entry.tab.id.clone(),
            url: entry.tab.url.clone(),
            title: entry.tab.title.clone(),
            normalized_key: entry.key.clone(),
            outcome,
            live_tab_id: entry.live_tab.as_ref().map(|t| t.id),
            error: None,
        }
    }

    fn with_live_tab(mut self, id: TabId) -> Self {
        self.live_tab_id = Some(id);
        self
    }

    fn with_error(mut self, error: &HostError) -> Self {
        self.error = Some(error.to_string());
        self
    }
}

/// Overall shape of a run, used to pick the user-facing message.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum ReconcileSummary {
    NoOp,
    AllAlreadyOpen,
    SomePinned,
    SomeOpened,
    Mixed,
}

impl ReconcileSummary {
    pub fn from_counts(opened: usize, pinned_now: usize, already_open: usize) -> Self {
        match (opened > 0, pinned_now > 0) {
            (true, true) => ReconcileSummary::Mixed,
            (true, false) => ReconcileSummary::SomeOpened,
            (false, true) => ReconcileSummary::SomePinned,
            (false, false) if already_open > 0 => ReconcileSummary::AllAlreadyOpen,
            (false, false) => ReconcileSummary::NoOp,
        }
    }
}

/// Outcome of one reconciliation run
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ReconcileResult {
    pub opened: usize,
    pub pinned_now: usize,
    pub already_open_or_skipped: usize,
    /// Create failures; pin failures only appear in `entries`
    pub failed: usize,
    pub entries: Vec<EntryResult>,
    pub summary: ReconcileSummary,
    pub last_opened_persisted: bool,
}

impl ReconcileResult {
    pub fn entries_with(&self, outcome: EntryOutcome) -> impl Iterator<Item = &EntryResult> {
        self.entries.iter().filter(move |e| e.outcome == outcome)
    }
}

/// Reconciliation engine
///
/// Shares the catalog, host and guard with the rest of the service; construct one per
/// process.
pub struct ReconcileEngine {
    catalog: Arc<TabCatalog>,
    host: Arc<dyn TabHost>,
    guard: ConcurrencyGuard,
    normalizer: UrlNormalizer,
    config: ReconcileConfig,
}

impl ReconcileEngine {
    pub fn new(
        catalog: Arc<TabCatalog>,
        host: Arc<dyn TabHost>,
        guard: ConcurrencyGuard,
        normalizer: UrlNormalizer,
        config: ReconcileConfig,
    ) -> Self {
        Self {
            catalog,
            host,
            guard,
            normalizer,
            config,
        }
    }

    pub fn config(&self) -> &ReconcileConfig {
        &self.config
    }

    pub fn guard(&self) -> &ConcurrencyGuard {
        &self.guard
    }

    /// Guarded run: lock, load configured tabs, query live tabs, reconcile.
    pub async fn run(
        &self,
        kind: OperationKind,
        category: Option<&str>,
        window: Option<WindowId>,
    ) -> Result<ReconcileResult, ApiError> {
        let _permit = self.guard.try_acquire(kind)?;

        let data = self.catalog.load().await?;
        match category {
            None => {
                if !data.tabs.iter().any(|t| t.enabled) {
                    return Err(ApiError::NoTabsConfigured);
                }
            }
            Some(category) => {
                let any_enabled = data
                    .tabs
                    .iter()
                    .any(|t| t.enabled && t.category == category);
                if !any_enabled {
                    let known = data.categories.iter().any(|c| c.id == category)
                        || data.tabs.iter().any(|t| t.category == category);
                    return Err(if known {
                        ApiError::NoTabsInCategory(category.to_string())
                    } else {
                        ApiError::NotFound(format!("Category not found: {category}"))
                    });
                }
            }
        }

        let live = self.host.query_tabs(window).await?;
        info!(
            operation = %kind,
            category = category.unwrap_or("*"),
            window = ?window,
            configured = data.tabs.len(),
            live = live.len(),
            "Starting reconciliation"
        );
        Ok(self.reconcile(&data.tabs, &live, category, window).await)
    }

    /// Classify and act. Per-entry failures are collected, never returned.
    pub async fn reconcile(
        &self,
        desired: &[TabConfig],
        live: &[LiveTab],
        category: Option<&str>,
        window: Option<WindowId>,
    ) -> ReconcileResult {
        self.guard.sweep();

        let plan = ReconcilePlan::build(desired, live, category, &self.normalizer, |key| {
            self.guard.is_recently_decided(key)
        });

        for entry in &plan.entries {
            match entry.classification {
                Classification::AlreadyOpen | Classification::NeedsCreate => {
                    self.guard.record_decision(&entry.key)
                }
                _ => {}
            }
        }

        debug!(
            already_open = plan.count(Classification::AlreadyOpen),
            recently_handled = plan.count(Classification::RecentlyHandled),
            duplicates = plan.count(Classification::Duplicate),
            needs_pin = plan.count(Classification::NeedsPin),
            needs_create = plan.count(Classification::NeedsCreate),
            "Reconciliation plan"
        );

        let mut entries: Vec<Option<EntryResult>> = vec![None; plan.entries.len()];

        for (index, entry) in plan.entries.iter().enumerate() {
            let outcome = match entry.classification {
                Classification::AlreadyOpen => EntryOutcome::AlreadyOpen,
                Classification::RecentlyHandled => EntryOutcome::RecentlyHandled,
                Classification::Duplicate => EntryOutcome::Duplicate,
                _ => continue,
            };
            entries[index] = Some(EntryResult::new(entry, outcome));
        }

        for (index, entry) in plan.entries.iter().enumerate() {
            if entry.classification == Classification::NeedsPin {
                entries[index] = Some(self.pin_existing(entry).await);
            }
        }

        for (index, entry) in plan.entries.iter().enumerate() {
            if entry.classification == Classification::NeedsCreate {
                entries[index] = Some(self.create_missing(entry, window).await);
            }
        }

        let entries: Vec<EntryResult> = entries.into_iter().flatten().collect();
        let opened = entries.iter().filter(|e| e.outcome == EntryOutcome::Opened).count();
        let pinned_now = entries.iter().filter(|e| e.outcome == EntryOutcome::Pinned).count();
        let failed = entries.iter().filter(|e| e.outcome == EntryOutcome::OpenFailed).count();
        let already_open_or_skipped = plan
            .entries
            .iter()
            .filter(|e| e.classification.is_settled())
            .count();

        let last_opened_persisted = match self.catalog.record_last_opened(Utc::now()).await {
            Ok(_) => true,
            Err(e) => {
                warn!(error = %e, "Could not persist lastOpened");
                false
            }
        };

        let summary = ReconcileSummary::from_counts(opened, pinned_now, already_open_or_skipped);
        info!(
            opened,
            pinned_now,
            already_open_or_skipped,
            failed,
            summary = ?summary,
            "Reconciliation finished"
        );

        ReconcileResult {
            opened,
            pinned_now,
            already_open_or_skipped,
            failed,
            entries,
            summary,
            last_opened_persisted,
        }
    }

    async fn pin_existing(&self, entry: &PlannedEntry) -> EntryResult {
        let Some(live_tab) = &entry.live_tab else {
            return EntryResult::new(entry, EntryOutcome::PinFailed)
                .with_error(&HostError::Failed("no live tab to pin".to_string()));
        };

        match self.pin_tab(live_tab.id).await {
            Ok(tab) => {
                debug!(tab_id = tab.id, url = %entry.tab.url, "Pinned existing tab");
                EntryResult::new(entry, EntryOutcome::Pinned)
            }
            Err(e) => {
                if e.is_permission() {
                    info!(tab_id = live_tab.id, url = %entry.tab.url, error = %e, "Pin not permitted");
                } else {
                    warn!(tab_id = live_tab.id, url = %entry.tab.url, error = %e, "Failed to pin existing tab");
                }
                EntryResult::new(entry, EntryOutcome::PinFailed).with_error(&e)
            }
        }
    }

    /// Pin a tab after confirming it still exists.
    async fn pin_tab(&self, id: TabId) -> Result<LiveTab, HostError> {
        let current = self.host.get_tab(id).await?;
        if self.config.is_partitioned(current.partition_tag.as_deref()) {
            debug!(tab_id = id, partition = ?current.partition_tag, "Waiting for partition to settle");
            sleep(Duration::from_millis(self.config.partition_settle_delay_ms)).await;
        }
        self.host.update_tab(id, TabUpdate::pin()).await
    }

    async fn create_missing(&self, entry: &PlannedEntry, window: Option<WindowId>) -> EntryResult {
        let partition_tag = entry
            .tab
            .partition_tag
            .clone()
            .filter(|t| self.config.is_partitioned(Some(t.as_str())));
        let partition_tag = match partition_tag {
            Some(tag) if !self.host.supports_partitions() => {
                warn!(partition = %tag, url = %entry.tab.url, "Partitions not supported, opening in default");
                None
            }
            other => other,
        };
        let partitioned = partition_tag.is_some();

        let request = CreateTabRequest {
            url: entry.tab.url.clone(),
            pinned: true,
            active: false,
            window_id: window,
            partition_tag,
        };

        match self.host.create_tab(request).await {
            Ok(tab) => {
                self.guard.record_decision(&entry.key);
                if partitioned {
                    self.verify_pinned(tab.id).await;
                }
                info!(tab_id = tab.id, url = %entry.tab.url, "Opened pinned tab");
                EntryResult::new(entry, EntryOutcome::Opened).with_live_tab(tab.id)
            }
            Err(e) => {
                self.guard.evict_decision(&entry.key);
                warn!(url = %entry.tab.url, error = %e, "Failed to open tab");
                EntryResult::new(entry, EntryOutcome::OpenFailed).with_error(&e)
            }
        }
    }

    /// Re-pin a freshly created partitioned tab that came up unpinned.
    async fn verify_pinned(&self, id: TabId) {
        sleep(Duration::from_millis(self.config.partition_verify_delay_ms)).await;
        match self.host.get_tab(id).await {
            Ok(tab) if !tab.pinned => {
                debug!(tab_id = id, "Re-pinning partitioned tab");
                if let Err(e) = self.host.update_tab(id, TabUpdate::pin()).await {
                    warn!(tab_id = id, error = %e, "Could not re-pin partitioned tab");
                }
            }
            Ok(_) => {}
            Err(e) => warn!(tab_id = id, error = %e, "Could not verify pin state"),
        }
    }

    /// Normalized key used for `url`.
    pub fn key_for(&self, url: &str) -> NormalizedKey {
        self.normalizer.normalize(url)
    }
}
