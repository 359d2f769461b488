//! CLI presentation: text and json formatters per command family.

mod catalog;
mod health;
mod reconcile;
mod shared;

pub use catalog::{format_categories_text, format_settings_text, format_tabs_text};
pub use health::format_health_text;
pub use reconcile::{format_reconcile_text, summary_message};
pub use shared::{format_json, format_section_heading};
