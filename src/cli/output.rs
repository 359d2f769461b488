//! CLI output: error mapping from domain errors to stable CLI surface.

use crate::error::ApiError;

/// Map service errors to a string for CLI output.
pub fn map_error(e: &ApiError) -> String {
    match e {
        ApiError::NoTabsConfigured => {
            format!("{}\nAdd one with: tabpin tabs add <url>", e)
        }
        ApiError::Store(inner) if inner.is_critical() => {
            format!("{}\nStorage needs attention; retrying will not help", e)
        }
        _ => e.to_string(),
    }
}
