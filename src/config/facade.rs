//! Config loading facade

use super::merge::merge_policy;
use super::sources::{env, explicit_file, global_file};
use super::TabpinConfig;
use config::ConfigError;
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use tracing::debug;

/// Loads [`TabpinConfig`] from its layered sources.
pub struct ConfigLoader;

impl ConfigLoader {
    /// Defaults, global file, optional explicit file, process environment.
    pub fn load(explicit: Option<&Path>) -> Result<TabpinConfig, ConfigError> {
        Self::load_with_env(explicit, None)
    }

    /// Like [`ConfigLoader::load`], reading environment overrides from `vars` when
    /// given instead of the process environment.
    pub fn load_with_env(
        explicit: Option<&Path>,
        vars: Option<HashMap<String, String>>,
    ) -> Result<TabpinConfig, ConfigError> {
        let mut builder = merge_policy::builder_with_defaults()?;
        builder = global_file::add_to_builder(builder);
        if let Some(path) = explicit {
            debug!(config_path = %path.display(), "Using explicit configuration file");
            builder = explicit_file::add_to_builder(builder, path)?;
        }
        builder = env::add_to_builder(builder, vars);
        builder.build()?.try_deserialize()
    }

    /// Only the given file on top of the defaults.
    pub fn load_from_file(path: &Path) -> Result<TabpinConfig, ConfigError> {
        let builder = merge_policy::builder_with_defaults()?;
        explicit_file::add_to_builder(builder, path)?
            .build()?
            .try_deserialize()
    }

    pub fn global_config_path() -> Option<PathBuf> {
        global_file::global_config_path()
    }
}
