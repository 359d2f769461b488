//! Configuration System
//!
//! Layered configuration: built-in defaults, the global config file, an explicit
//! config file, then `TABPIN__SECTION__KEY` environment variables. Every section has
//! serde defaults so partial files are fine.

use crate::concurrency::GuardConfig;
use crate::error::ApiError;
use crate::logging::LoggingConfig;
use crate::normalize::NormalizerConfig;
use crate::reconcile::ReconcileConfig;
use crate::store::StoreConfig;
use directories::ProjectDirs;
use serde::{Deserialize, Serialize};
use std::path::PathBuf;

mod facade;
mod merge;
mod sources;

pub use facade::ConfigLoader;

/// Root configuration structure
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct TabpinConfig {
    /// Resilient store tuning
    #[serde(default)]
    pub store: StoreConfig,

    /// Concurrency guard tuning
    #[serde(default)]
    pub guard: GuardConfig,

    /// URL normalization rules
    #[serde(default)]
    pub normalizer: NormalizerConfig,

    /// Reconciliation behavior
    #[serde(default)]
    pub reconcile: ReconcileConfig,

    /// Where data lives
    #[serde(default)]
    pub storage: StorageConfig,

    /// Logging configuration
    #[serde(default)]
    pub logging: LoggingConfig,
}

/// Storage locations
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct StorageConfig {
    /// Directory of the sled database; defaults to the platform data directory
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub data_dir: Option<PathBuf>,
}

impl StorageConfig {
    /// Resolved database directory.
    pub fn store_path(&self) -> PathBuf {
        match &self.data_dir {
            Some(dir) => dir.clone(),
            None => ProjectDirs::from("", "", "tabpin")
                .map(|dirs| dirs.data_dir().join("store"))
                .unwrap_or_else(|| PathBuf::from(".tabpin/store")),
        }
    }

    pub fn validate(&self) -> Result<(), String> {
        if let Some(dir) = &self.data_dir {
            if dir.as_os_str().is_empty() {
                return Err("data_dir cannot be empty".to_string());
            }
        }
        Ok(())
    }
}

/// Configuration validation errors
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ValidationError {
    pub section: &'static str,
    pub message: String,
}

impl std::fmt::Display for ValidationError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "[{}] {}", self.section, self.message)
    }
}

impl std::error::Error for ValidationError {}

impl TabpinConfig {
    /// Validate the entire configuration, collecting every problem.
    pub fn validate(&self) -> Result<(), Vec<ValidationError>> {
        let checks: [(&'static str, Result<(), String>); 6] = [
            ("store", self.store.validate()),
            ("guard", self.guard.validate()),
            ("normalizer", self.normalizer.validate()),
            ("reconcile", self.reconcile.validate()),
            ("storage", self.storage.validate()),
            ("logging", self.logging.validate()),
        ];

        let errors: Vec<ValidationError> = checks
            .into_iter()
            .filter_map(|(section, result)| {
                result.err().map(|message| ValidationError { section, message })
            })
            .collect();

        if errors.is_empty() {
            Ok(())
        } else {
            Err(errors)
        }
    }

    /// Validate, folding every problem into one [`ApiError::ConfigError`].
    pub fn ensure_valid(&self) -> Result<(), ApiError> {
        self.validate().map_err(|errors| {
            let messages: Vec<String> = errors.iter().map(|e| e.to_string()).collect();
            ApiError::ConfigError(format!(
                "Configuration validation failed:\n{}",
                messages.join("\n")
            ))
        })
    }

    /// Effective configuration as TOML.
    pub fn to_toml(&self) -> Result<String, ApiError> {
        toml::to_string_pretty(self)
            .map_err(|e| ApiError::ConfigError(format!("Failed to render configuration: {}", e)))
    }
}
