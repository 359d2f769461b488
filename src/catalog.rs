//! Tab catalog
//!
//! Typed access to the three persisted keys on top of [`ResilientStore`]. Every
//! mutation loads the current collection, changes a copy and writes the whole
//! collection back while holding the catalog write lock.

use crate::error::{ApiError, StoreError};
use crate::normalize::is_valid_tab_url;
use crate::store::{ResilientStore, ValueMap};
use crate::types::{
    default_categories, generate_tab_id, Category, Settings, TabConfig, TabsData,
    CATEGORIES_KEY, FALLBACK_CATEGORY, PINNED_TABS_KEY, SETTINGS_KEY,
};
use chrono::{DateTime, Utc};
use serde_json::{Map, Value};
use tokio::sync::Mutex;
use tracing::{debug, info, warn};

/// Catalog over the persisted tabs, categories and settings.
pub struct TabCatalog {
    store: ResilientStore,
    write_lock: Mutex<()>,
}

/// Tabs as read from storage, plus whether load-time backfills changed anything.
///
/// Entries that do not deserialize are kept verbatim in `unparsed` and written
/// back after the typed tabs, so a rewrite never drops stored data.
struct LoadedTabs {
    tabs: Vec<TabConfig>,
    unparsed: Vec<Value>,
    migrated: bool,
}

/// Everything read from storage in one pass.
struct Snapshot {
    data: TabsData,
    unparsed: Vec<Value>,
    migrated: bool,
}

impl TabCatalog {
    pub fn new(store: ResilientStore) -> Self {
        Self {
            store,
            write_lock: Mutex::new(()),
        }
    }

    pub fn store(&self) -> &ResilientStore {
        &self.store
    }

    /// Read tabs, categories and settings, persisting any backfilled tab fields.
    pub async fn load(&self) -> Result<TabsData, ApiError> {
        let Snapshot {
            data,
            unparsed,
            migrated,
        } = self.read().await?;
        if migrated {
            let _guard = self.write_lock.lock().await;
            self.write_tabs(&data.tabs, &unparsed).await?;
            info!(tabs = data.tabs.len(), "Backfilled missing tab fields");
        }
        Ok(data)
    }

    /// Insert or update a tab by id, shallow-merging over an existing entry.
    pub async fn save_tab(&self, tab: TabConfig) -> Result<(TabConfig, Vec<TabConfig>), ApiError> {
        if tab.url.trim().is_empty() || !is_valid_tab_url(&tab.url) {
            return Err(ApiError::Validation(format!("Invalid URL: {}", tab.url)));
        }

        let _guard = self.write_lock.lock().await;
        let snapshot = self.read().await?;
        let mut tabs = snapshot.data.tabs;

        let mut tab = tab;
        if tab.id.trim().is_empty() {
            tab.id = generate_tab_id();
        }

        let saved = match tabs.iter().position(|t| t.id == tab.id) {
            Some(index) => {
                let merged = merge_tab(&tabs[index], &tab)?;
                tabs[index] = merged.clone();
                merged
            }
            None => {
                if tab.category.trim().is_empty() {
                    tab.category = snapshot
                        .data
                        .categories
                        .first()
                        .map(|c| c.id.clone())
                        .unwrap_or_else(|| FALLBACK_CATEGORY.to_string());
                }
                if tab.date_added.is_none() {
                    tab.date_added = Some(Utc::now());
                }
                tabs.push(tab.clone());
                tab
            }
        };

        self.write_tabs(&tabs, &snapshot.unparsed).await?;
        info!(tab_id = %saved.id, tab = %saved.label(), "Tab saved");
        Ok((saved, tabs))
    }

    /// Same as [`TabCatalog::save_tab`].
    pub async fn update_tab(&self, tab: TabConfig) -> Result<(TabConfig, Vec<TabConfig>), ApiError> {
        self.save_tab(tab).await
    }

    /// Remove a tab by id. Unreadable stored entries carrying that id go too.
    pub async fn delete_tab(&self, tab_id: &str) -> Result<Vec<TabConfig>, ApiError> {
        let _guard = self.write_lock.lock().await;
        let Snapshot {
            data, mut unparsed, ..
        } = self.read().await?;
        let mut tabs = data.tabs;
        let before = tabs.len() + unparsed.len();
        tabs.retain(|t| t.id != tab_id);
        unparsed.retain(|raw| raw.get("id").and_then(Value::as_str) != Some(tab_id));
        if tabs.len() + unparsed.len() == before {
            return Err(ApiError::NotFound(format!("Tab not found: {tab_id}")));
        }
        self.write_tabs(&tabs, &unparsed).await?;
        info!(tab_id, "Tab deleted");
        Ok(tabs)
    }

    /// Replace the category list. Tabs keep their category ids.
    pub async fn save_categories(&self, categories: Vec<Category>) -> Result<Vec<Category>, ApiError> {
        for category in &categories {
            if category.id.trim().is_empty()
                || category.name.trim().is_empty()
                || category.icon.trim().is_empty()
            {
                return Err(ApiError::Validation(format!(
                    "Invalid category data: id, name and icon are required (got id '{}')",
                    category.id
                )));
            }
        }

        let _guard = self.write_lock.lock().await;
        self.write(CATEGORIES_KEY, serde_json::to_value(&categories).map_err(StoreError::from)?)
            .await?;
        info!(count = categories.len(), "Categories saved");
        Ok(categories)
    }

    /// Shallow-merge `partial` into the stored settings.
    pub async fn update_settings(&self, partial: &Map<String, Value>) -> Result<Settings, ApiError> {
        let _guard = self.write_lock.lock().await;
        let current = self.read_settings().await?;
        let merged = current
            .merged_with(partial)
            .map_err(|e| ApiError::Validation(format!("Invalid settings: {e}")))?;
        self.write_settings(&merged).await?;
        debug!(keys = ?partial.keys().collect::<Vec<_>>(), "Settings updated");
        Ok(merged)
    }

    /// Stamp `settings.lastOpened`.
    pub async fn record_last_opened(&self, at: DateTime<Utc>) -> Result<Settings, ApiError> {
        let _guard = self.write_lock.lock().await;
        let mut settings = self.read_settings().await?;
        settings.last_opened = Some(at);
        self.write_settings(&settings).await?;
        Ok(settings)
    }

    /// Write empty tabs, the default categories and default settings.
    pub async fn initialize_defaults(&self) -> Result<TabsData, ApiError> {
        let _guard = self.write_lock.lock().await;
        let data = TabsData {
            tabs: Vec::new(),
            categories: default_categories(),
            settings: Settings::default(),
        };
        let mut items = ValueMap::new();
        items.insert(PINNED_TABS_KEY.to_string(), Value::Array(Vec::new()));
        items.insert(
            CATEGORIES_KEY.to_string(),
            serde_json::to_value(&data.categories).map_err(StoreError::from)?,
        );
        items.insert(
            SETTINGS_KEY.to_string(),
            serde_json::to_value(&data.settings).map_err(StoreError::from)?,
        );
        self.store.set(items).await?;
        info!("Default data initialized");
        Ok(data)
    }

    /// Wipe storage and start over from defaults.
    pub async fn reset(&self) -> Result<TabsData, ApiError> {
        self.store.clear().await?;
        self.initialize_defaults().await
    }

    async fn read(&self) -> Result<Snapshot, ApiError> {
        let raw = self
            .store
            .get(&[PINNED_TABS_KEY, CATEGORIES_KEY, SETTINGS_KEY])
            .await?;

        let LoadedTabs {
            tabs,
            unparsed,
            migrated,
        } = migrate_tabs(raw.get(PINNED_TABS_KEY));

        let categories = match raw.get(CATEGORIES_KEY) {
            Some(Value::Null) | None => default_categories(),
            Some(value) => serde_json::from_value(value.clone()).map_err(StoreError::from)?,
        };

        let settings = parse_settings(raw.get(SETTINGS_KEY))?;

        Ok(Snapshot {
            data: TabsData {
                tabs,
                categories,
                settings,
            },
            unparsed,
            migrated,
        })
    }

    async fn read_settings(&self) -> Result<Settings, ApiError> {
        let raw = self.store.get(&[SETTINGS_KEY]).await?;
        parse_settings(raw.get(SETTINGS_KEY))
    }

    async fn write_tabs(&self, tabs: &[TabConfig], unparsed: &[Value]) -> Result<(), ApiError> {
        let mut entries = Vec::with_capacity(tabs.len() + unparsed.len());
        for tab in tabs {
            entries.push(serde_json::to_value(tab).map_err(StoreError::from)?);
        }
        entries.extend(unparsed.iter().cloned());
        self.write(PINNED_TABS_KEY, Value::Array(entries)).await
    }

    async fn write_settings(&self, settings: &Settings) -> Result<(), ApiError> {
        let value = serde_json::to_value(settings).map_err(StoreError::from)?;
        self.write(SETTINGS_KEY, value).await
    }

    async fn write(&self, key: &str, value: Value) -> Result<(), ApiError> {
        let mut items = ValueMap::new();
        items.insert(key.to_string(), value);
        self.store.set(items).await?;
        Ok(())
    }
}

fn parse_settings(value: Option<&Value>) -> Result<Settings, ApiError> {
    match value {
        Some(Value::Null) | None => Ok(Settings::default()),
        Some(value) => Ok(serde_json::from_value(value.clone()).map_err(StoreError::from)?),
    }
}

/// Backfill `id`, `enabled` and `dateAdded` on stored tab objects.
///
/// Entries that still do not deserialize are left out of `tabs` with a warning and
/// kept untouched in `unparsed`.
fn migrate_tabs(value: Option<&Value>) -> LoadedTabs {
    let Some(Value::Array(items)) = value else {
        return LoadedTabs {
            tabs: Vec::new(),
            unparsed: Vec::new(),
            migrated: false,
        };
    };

    let now = Utc::now();
    let mut migrated = false;
    let mut tabs = Vec::with_capacity(items.len());
    let mut unparsed = Vec::new();
    for item in items {
        let Value::Object(fields) = item else {
            warn!(entry = %item, "Skipping non-object tab entry");
            unparsed.push(item.clone());
            continue;
        };
        let mut fields = fields.clone();
        let mut backfilled = false;

        let missing_id = fields
            .get("id")
            .and_then(Value::as_str)
            .map_or(true, |id| id.is_empty());
        if missing_id {
            fields.insert("id".to_string(), Value::String(generate_tab_id()));
            backfilled = true;
        }
        if !fields.get("enabled").is_some_and(Value::is_boolean) {
            fields.insert("enabled".to_string(), Value::Bool(true));
            backfilled = true;
        }
        let missing_date = match fields.get("dateAdded") {
            None | Some(Value::Null) => true,
            Some(Value::String(s)) => s.is_empty(),
            Some(_) => false,
        };
        if missing_date {
            fields.insert("dateAdded".to_string(), Value::String(now.to_rfc3339()));
            backfilled = true;
        }

        match serde_json::from_value::<TabConfig>(Value::Object(fields)) {
            Ok(tab) => {
                migrated |= backfilled;
                tabs.push(tab);
            }
            Err(e) => {
                warn!(error = %e, "Skipping malformed tab entry");
                unparsed.push(item.clone());
            }
        }
    }
    LoadedTabs {
        tabs,
        unparsed,
        migrated,
    }
}

/// Overlay the serialized fields of `update` onto `existing`.
///
/// Empty `title` and `category` in the update mean "not given" and keep the stored
/// values.
fn merge_tab(existing: &TabConfig, update: &TabConfig) -> Result<TabConfig, StoreError> {
    let mut base = match serde_json::to_value(existing)? {
        Value::Object(map) => map,
        _ => Map::new(),
    };
    if let Value::Object(mut overlay) = serde_json::to_value(update)? {
        for field in ["title", "category"] {
            if overlay.get(field).and_then(Value::as_str) == Some("") {
                overlay.remove(field);
            }
        }
        base.extend(overlay);
    }
    Ok(serde_json::from_value(Value::Object(base))?)
}
