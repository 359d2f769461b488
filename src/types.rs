//! Persisted data model: tab configurations, categories and settings.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::cmp::Ordering;

/// Storage key holding the configured tabs.
pub const PINNED_TABS_KEY: &str = "pinnedTabs";
/// Storage key holding the category list.
pub const CATEGORIES_KEY: &str = "categories";
/// Storage key holding the settings singleton.
pub const SETTINGS_KEY: &str = "settings";

/// Category used when a tab is saved without one and no categories exist.
pub const FALLBACK_CATEGORY: &str = "work";

/// A configured tab the user wants open and pinned.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TabConfig {
    #[serde(default)]
    pub id: String,
    pub url: String,
    #[serde(default)]
    pub title: String,
    #[serde(default)]
    pub category: String,
    #[serde(default = "default_enabled")]
    pub enabled: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub order: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub date_added: Option<DateTime<Utc>>,
    #[serde(
        default,
        alias = "cookieStoreId",
        skip_serializing_if = "Option::is_none"
    )]
    pub partition_tag: Option<String>,
}

fn default_enabled() -> bool {
    true
}

impl TabConfig {
    /// Minimal config for a URL; id and timestamps are filled in on save.
    pub fn new(url: impl Into<String>) -> Self {
        Self {
            id: String::new(),
            url: url.into(),
            title: String::new(),
            category: String::new(),
            enabled: true,
            order: None,
            date_added: None,
            partition_tag: None,
        }
    }

    pub fn with_order(mut self, order: f64) -> Self {
        self.order = Some(order);
        self
    }

    pub fn with_category(mut self, category: impl Into<String>) -> Self {
        self.category = category.into();
        self
    }

    pub fn with_date_added(mut self, date_added: DateTime<Utc>) -> Self {
        self.date_added = Some(date_added);
        self
    }

    pub fn with_partition_tag(mut self, tag: impl Into<String>) -> Self {
        self.partition_tag = Some(tag.into());
        self
    }

    /// Label used in logs and CLI output.
    pub fn label(&self) -> &str {
        if self.title.is_empty() {
            &self.url
        } else {
            &self.title
        }
    }
}

/// Generate a fresh, never-reused tab identifier.
pub fn generate_tab_id() -> String {
    format!("tab_{}", uuid::Uuid::new_v4().simple())
}

/// Open order for desired tabs.
///
/// Entries with an `order` come first, ascending. Equal or absent orders fall back to
/// `date_added` ascending, with a missing date sorting before any date. Remaining
/// ties compare equal so a stable sort keeps list order.
pub fn compare_open_order(a: &TabConfig, b: &TabConfig) -> Ordering {
    let by_order = match (a.order, b.order) {
        (Some(x), Some(y)) => x.total_cmp(&y),
        (Some(_), None) => Ordering::Less,
        (None, Some(_)) => Ordering::Greater,
        (None, None) => Ordering::Equal,
    };
    by_order.then_with(|| a.date_added.cmp(&b.date_added))
}

/// Stable sort into open order.
pub fn sort_for_opening(tabs: &mut [TabConfig]) {
    tabs.sort_by(compare_open_order);
}

/// A named group of tabs.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Category {
    pub id: String,
    pub name: String,
    pub icon: String,
}

impl Category {
    pub fn new(id: impl Into<String>, name: impl Into<String>, icon: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            name: name.into(),
            icon: icon.into(),
        }
    }
}

/// Categories seeded on first install or when none are stored.
pub fn default_categories() -> Vec<Category> {
    vec![
        Category::new("work", "Work", "💼"),
        Category::new("personal", "Personal", "👤"),
        Category::new("development", "Development", "💻"),
        Category::new("social", "Social", "🌐"),
        Category::new("tools", "Tools", "🔧"),
        Category::new("entertainment", "Entertainment", "🎮"),
    ]
}

/// Settings singleton. Unknown keys are kept as feature flags.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Settings {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub last_opened: Option<DateTime<Utc>>,
    #[serde(default)]
    pub auto_open_tabs: bool,
    #[serde(flatten)]
    pub flags: Map<String, Value>,
}

impl Settings {
    /// Shallow-merge a partial settings object into these settings.
    pub fn merged_with(&self, partial: &Map<String, Value>) -> Result<Settings, serde_json::Error> {
        let mut current = match serde_json::to_value(self)? {
            Value::Object(map) => map,
            _ => Map::new(),
        };
        for (key, value) in partial {
            current.insert(key.clone(), value.clone());
        }
        serde_json::from_value(Value::Object(current))
    }
}

/// Everything the popup and options pages need in one read.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TabsData {
    pub tabs: Vec<TabConfig>,
    pub categories: Vec<Category>,
    pub settings: Settings,
}
