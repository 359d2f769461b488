//! Storage health output.

use crate::api::StorageHealth;
use crate::cli::presentation::shared::format_section_heading;
use comfy_table::Table;
use owo_colors::OwoColorize;

pub fn format_health_text(health: &StorageHealth) -> String {
    let status = if health.health.healthy {
        format!("{}", "healthy".green())
    } else {
        format!("{}", "unhealthy".red())
    };

    let mut table = Table::new();
    table.load_preset(comfy_table::presets::UTF8_FULL);
    table.set_header(vec!["Check", "Value"]);
    table.add_row(vec!["Status".to_string(), status]);
    table.add_row(vec![
        "Response time".to_string(),
        format!("{} ms", health.health.response_time_millis),
    ]);
    table.add_row(vec![
        "Cached entries".to_string(),
        health.health.cache_size.to_string(),
    ]);
    table.add_row(vec![
        "Pending operations".to_string(),
        health.health.pending_operations.to_string(),
    ]);
    table.add_row(vec![
        "Storage used".to_string(),
        health.usage.human_readable.clone(),
    ]);
    if let Some(error) = &health.health.error {
        table.add_row(vec!["Error".to_string(), error.clone()]);
    }

    format!("{}\n{}", format_section_heading("Storage Health"), table)
}
