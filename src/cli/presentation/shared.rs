//! Shared presentation helpers.

use crate::error::ApiError;
use owo_colors::OwoColorize;
use serde::Serialize;

/// Pretty JSON for `--format json`.
pub fn format_json<T: Serialize>(value: &T) -> Result<String, ApiError> {
    serde_json::to_string_pretty(value)
        .map_err(|e| ApiError::ConfigError(format!("Failed to render JSON output: {}", e)))
}

/// Format a section heading with bold/underline.
pub fn format_section_heading(title: &str) -> String {
    format!("{}", title.bold().underline())
}
