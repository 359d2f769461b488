//! Service API
//!
//! The operations behind the message protocol: guarded reconciliation runs, catalog
//! CRUD, auto-open on window creation, and data-change notifications.

use crate::catalog::TabCatalog;
use crate::concurrency::{ConcurrencyGuard, OperationKind};
use crate::config::TabpinConfig;
use crate::error::ApiError;
use crate::host::{TabHost, WindowId, WindowInfo};
use crate::normalize::UrlNormalizer;
use crate::reconcile::{ReconcileEngine, ReconcileResult};
use crate::store::{HealthReport, KeyValueBackend, ResilientStore, StorageUsage};
use crate::types::{Category, Settings, TabConfig, TabsData};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::broadcast;
use tokio::time::sleep;
use tracing::{debug, info, warn};

const CHANGE_CHANNEL_CAPACITY: usize = 64;

/// Snapshot broadcast after every successful mutation
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", content = "data", rename_all = "camelCase")]
pub enum DataChange {
    TabsChanged(Vec<TabConfig>),
    CategoriesChanged(Vec<Category>),
    SettingsChanged(Settings),
}

/// Storage diagnostics
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StorageHealth {
    pub health: HealthReport,
    pub usage: StorageUsage,
}

/// Service API
///
/// Owns the catalog and the reconciliation engine. Cheap to share behind an `Arc`.
pub struct TabPinApi {
    catalog: Arc<TabCatalog>,
    engine: Arc<ReconcileEngine>,
    changes: broadcast::Sender<DataChange>,
}

impl TabPinApi {
    pub fn new(catalog: Arc<TabCatalog>, engine: Arc<ReconcileEngine>) -> Self {
        let (changes, _) = broadcast::channel(CHANGE_CHANNEL_CAPACITY);
        Self {
            catalog,
            engine,
            changes,
        }
    }

    /// Wire a service from configuration over the given backend and host.
    pub fn from_config(
        backend: Arc<dyn KeyValueBackend>,
        host: Arc<dyn TabHost>,
        config: &TabpinConfig,
    ) -> Self {
        let store = ResilientStore::new(backend, config.store.clone());
        let catalog = Arc::new(TabCatalog::new(store));
        let engine = Arc::new(ReconcileEngine::new(
            Arc::clone(&catalog),
            host,
            ConcurrencyGuard::new(&config.guard),
            UrlNormalizer::new(config.normalizer.clone()),
            config.reconcile.clone(),
        ));
        Self::new(catalog, engine)
    }

    pub fn catalog(&self) -> &TabCatalog {
        &self.catalog
    }

    pub fn engine(&self) -> &ReconcileEngine {
        &self.engine
    }

    /// Receive a [`DataChange`] for every successful mutation from now on.
    pub fn subscribe(&self) -> broadcast::Receiver<DataChange> {
        self.changes.subscribe()
    }

    /// Open and pin every enabled configured tab.
    ///
    /// # Errors
    /// * `AlreadyInProgress` when another open-all run holds the lock
    /// * `NoTabsConfigured` when no enabled tab exists
    pub async fn open_all_tabs(&self, window: Option<WindowId>) -> Result<ReconcileResult, ApiError> {
        self.engine.run(OperationKind::All, None, window).await
    }

    /// Open and pin the enabled tabs of one category.
    pub async fn open_category_tabs(
        &self,
        category: &str,
        window: Option<WindowId>,
    ) -> Result<ReconcileResult, ApiError> {
        if category.trim().is_empty() {
            return Err(ApiError::Validation("categoryId is required".to_string()));
        }
        self.engine
            .run(OperationKind::Category, Some(category), window)
            .await
    }

    pub async fn get_tabs_data(&self) -> Result<TabsData, ApiError> {
        self.catalog.load().await
    }

    pub async fn save_tab(&self, tab: TabConfig) -> Result<TabConfig, ApiError> {
        let (saved, tabs) = self.catalog.save_tab(tab).await?;
        self.notify(DataChange::TabsChanged(tabs));
        Ok(saved)
    }

    pub async fn update_tab(&self, tab: TabConfig) -> Result<TabConfig, ApiError> {
        let (saved, tabs) = self.catalog.update_tab(tab).await?;
        self.notify(DataChange::TabsChanged(tabs));
        Ok(saved)
    }

    pub async fn delete_tab(&self, tab_id: &str) -> Result<(), ApiError> {
        let tabs = self.catalog.delete_tab(tab_id).await?;
        self.notify(DataChange::TabsChanged(tabs));
        Ok(())
    }

    pub async fn save_categories(&self, categories: Vec<Category>) -> Result<Vec<Category>, ApiError> {
        let saved = self.catalog.save_categories(categories).await?;
        self.notify(DataChange::CategoriesChanged(saved.clone()));
        Ok(saved)
    }

    pub async fn update_settings(&self, partial: &Map<String, Value>) -> Result<Settings, ApiError> {
        let merged = self.catalog.update_settings(partial).await?;
        self.notify(DataChange::SettingsChanged(merged.clone()));
        Ok(merged)
    }

    pub fn ping(&self) -> &'static str {
        "pong"
    }

    /// Seed storage with empty tabs, the default categories and default settings.
    pub async fn initialize_defaults(&self) -> Result<TabsData, ApiError> {
        let data = self.catalog.initialize_defaults().await?;
        self.notify_all(&data);
        Ok(data)
    }

    /// Wipe storage and reseed defaults.
    pub async fn reset(&self) -> Result<TabsData, ApiError> {
        let data = self.catalog.reset().await?;
        self.notify_all(&data);
        Ok(data)
    }

    pub async fn storage_health(&self) -> StorageHealth {
        let store = self.catalog.store();
        StorageHealth {
            health: store.health_check().await,
            usage: store.usage().await,
        }
    }

    /// Auto-open configured tabs into a freshly created window.
    ///
    /// Runs only when `autoOpenTabs` is set and the window is a regular browsing
    /// window. Never fails; problems are logged and `None` is returned.
    pub async fn handle_window_created(&self, window: &WindowInfo) -> Option<ReconcileResult> {
        let settings = match self.catalog.load().await {
            Ok(data) => data.settings,
            Err(e) => {
                warn!(window_id = window.id, error = %e, "Auto-open skipped, could not load settings");
                return None;
            }
        };
        if !settings.auto_open_tabs {
            return None;
        }

        let config = self.engine.config();
        if !window.is_normal_browser_window(config.min_window_width, config.min_window_height) {
            info!(
                window_id = window.id,
                kind = ?window.kind,
                state = ?window.state,
                width = ?window.width,
                height = ?window.height,
                "Auto-open skipped, not a normal browser window"
            );
            return None;
        }

        sleep(Duration::from_millis(config.auto_open_delay_ms)).await;
        info!(window_id = window.id, "Auto-opening tabs in new window");

        match self.open_all_tabs(Some(window.id)).await {
            Ok(result) => Some(result),
            Err(ApiError::NoTabsConfigured) => {
                debug!(window_id = window.id, "Auto-open found no tabs to open");
                None
            }
            Err(e) => {
                warn!(window_id = window.id, error = %e, "Auto-open failed");
                None
            }
        }
    }

    fn notify(&self, change: DataChange) {
        if self.changes.send(change).is_err() {
            debug!("Data change not delivered, no subscribers");
        }
    }

    fn notify_all(&self, data: &TabsData) {
        self.notify(DataChange::TabsChanged(data.tabs.clone()));
        self.notify(DataChange::CategoriesChanged(data.categories.clone()));
        self.notify(DataChange::SettingsChanged(data.settings.clone()));
    }
}
