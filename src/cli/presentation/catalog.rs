//! Tab, category and settings listings.

use crate::types::{Category, Settings, TabConfig};
use comfy_table::Table;
use owo_colors::OwoColorize;

pub fn format_tabs_text(tabs: &[TabConfig], categories: &[Category]) -> String {
    if tabs.is_empty() {
        return "No tabs configured.".to_string();
    }
    let mut table = Table::new();
    table.load_preset(comfy_table::presets::UTF8_FULL);
    table.set_header(vec!["ID", "Title", "URL", "Category", "Order", "Enabled"]);
    for tab in tabs {
        let category = categories
            .iter()
            .find(|c| c.id == tab.category)
            .map(|c| format!("{} {}", c.icon, c.name))
            .unwrap_or_else(|| tab.category.clone());
        let order = tab
            .order
            .map(|o| o.to_string())
            .unwrap_or_else(|| "-".to_string());
        let enabled = if tab.enabled {
            format!("{}", "yes".green())
        } else {
            format!("{}", "no".dimmed())
        };
        table.add_row(vec![
            tab.id.clone(),
            tab.title.clone(),
            tab.url.clone(),
            category,
            order,
            enabled,
        ]);
    }
    table.to_string()
}

pub fn format_categories_text(categories: &[Category]) -> String {
    if categories.is_empty() {
        return "No categories.".to_string();
    }
    let mut table = Table::new();
    table.load_preset(comfy_table::presets::UTF8_FULL);
    table.set_header(vec!["ID", "Name", "Icon"]);
    for category in categories {
        table.add_row(vec![&category.id, &category.name, &category.icon]);
    }
    table.to_string()
}

pub fn format_settings_text(settings: &Settings) -> String {
    let last_opened = settings
        .last_opened
        .map(|t| t.to_rfc3339())
        .unwrap_or_else(|| "never".to_string());
    let mut lines = vec![
        format!("autoOpenTabs: {}", settings.auto_open_tabs),
        format!("lastOpened: {}", last_opened),
    ];
    for (key, value) in &settings.flags {
        lines.push(format!("{}: {}", key, value));
    }
    lines.join("\n")
}
