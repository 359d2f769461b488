//! Error types for the tabpin reconciliation system.

use crate::concurrency::OperationKind;
use std::time::Duration;
use thiserror::Error;

/// Storage-related errors
///
/// Cloneable so that coalesced in-flight requests can hand the same failure to every
/// waiting caller.
#[derive(Debug, Clone, Error, PartialEq)]
pub enum StoreError {
    #[error("Storage quota exceeded: {0}")]
    QuotaExceeded(String),

    #[error("Storage permission denied: {0}")]
    PermissionDenied(String),

    #[error("Storage unavailable: {0}")]
    Unavailable(String),

    #[error("Storage operation timed out after {0:?}")]
    Timeout(Duration),

    #[error("Storage backend error: {0}")]
    Backend(String),

    #[error("Storage {operation} failed after {attempts} attempts: {last}")]
    RetriesExhausted {
        operation: String,
        attempts: u32,
        last: Box<StoreError>,
    },

    #[error("Serialization error: {0}")]
    Serialization(String),
}

impl StoreError {
    /// Classify a raw backend message by the keywords the host store uses.
    pub fn classify(message: impl Into<String>) -> Self {
        let message = message.into();
        let lower = message.to_lowercase();
        if lower.contains("quota") {
            StoreError::QuotaExceeded(message)
        } else if lower.contains("permission") {
            StoreError::PermissionDenied(message)
        } else if lower.contains("unavailable") || lower.contains("disabled") {
            StoreError::Unavailable(message)
        } else {
            StoreError::Backend(message)
        }
    }

    /// Critical errors are never retried.
    pub fn is_critical(&self) -> bool {
        matches!(
            self,
            StoreError::QuotaExceeded(_)
                | StoreError::PermissionDenied(_)
                | StoreError::Unavailable(_)
                | StoreError::Serialization(_)
        )
    }
}

impl From<serde_json::Error> for StoreError {
    fn from(err: serde_json::Error) -> Self {
        StoreError::Serialization(err.to_string())
    }
}

/// Errors reported by the tab host (the browser side of the system)
#[derive(Debug, Clone, Error, PartialEq)]
pub enum HostError {
    #[error("Missing host permission: {0}")]
    PermissionDenied(String),

    #[error("Tab ID {0} is no longer valid or accessible")]
    InvalidTab(u64),

    #[error("Tab operation failed: {0}")]
    Failed(String),
}

impl HostError {
    pub fn is_permission(&self) -> bool {
        matches!(self, HostError::PermissionDenied(_))
    }
}

/// Service-level errors
#[derive(Debug, Error)]
pub enum ApiError {
    #[error("Invalid input: {0}")]
    Validation(String),

    #[error("Not found: {0}")]
    NotFound(String),

    #[error("Permission denied: {0}")]
    Permission(String),

    #[error("A {0} run is already in progress, try again shortly")]
    AlreadyInProgress(OperationKind),

    #[error("No tabs configured")]
    NoTabsConfigured,

    #[error("No tabs in category '{0}'")]
    NoTabsInCategory(String),

    #[error("Storage error: {0}")]
    Store(#[from] StoreError),

    #[error("Host error: {0}")]
    Host(HostError),

    #[error("Configuration error: {0}")]
    ConfigError(String),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

impl ApiError {
    /// Stable tag carried across the message boundary as `errorKind`.
    pub fn kind(&self) -> &'static str {
        match self {
            ApiError::Validation(_) => "validation",
            ApiError::NotFound(_) => "notFound",
            ApiError::Permission(_) => "permission",
            ApiError::AlreadyInProgress(_) => "alreadyInProgress",
            ApiError::NoTabsConfigured => "noTabsConfigured",
            ApiError::NoTabsInCategory(_) => "noTabsInCategory",
            ApiError::Store(e) if e.is_critical() => "criticalStore",
            ApiError::Store(_) => "transientStore",
            ApiError::Host(_) => "host",
            ApiError::ConfigError(_) => "config",
            ApiError::Io(_) => "io",
        }
    }
}

impl From<HostError> for ApiError {
    fn from(err: HostError) -> Self {
        match err {
            HostError::PermissionDenied(msg) => ApiError::Permission(msg),
            other => ApiError::Host(other),
        }
    }
}

impl From<config::ConfigError> for ApiError {
    fn from(err: config::ConfigError) -> Self {
        ApiError::ConfigError(err.to_string())
    }
}
