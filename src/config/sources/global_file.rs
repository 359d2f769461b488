//! Global config file source: $XDG_CONFIG_HOME/tabpin/config.toml or ~/.config/tabpin/config.toml

use config::builder::DefaultState;
use config::ConfigBuilder;
use config::File;
use std::path::PathBuf;
use tracing::debug;

/// Path to global config file.
pub fn global_config_path() -> Option<PathBuf> {
    let base = match std::env::var("XDG_CONFIG_HOME") {
        Ok(dir) if !dir.is_empty() => PathBuf::from(dir),
        _ => PathBuf::from(std::env::var("HOME").ok()?).join(".config"),
    };
    Some(base.join("tabpin").join("config.toml"))
}

/// Add global config file source to builder if it exists.
pub fn add_to_builder(builder: ConfigBuilder<DefaultState>) -> ConfigBuilder<DefaultState> {
    let Some(path) = global_config_path() else {
        return builder;
    };
    if !path.exists() {
        debug!(config_path = %path.display(), "No global configuration file");
        return builder;
    }
    let canonical = path.canonicalize().unwrap_or(path);
    debug!(config_path = %canonical.display(), "Using global configuration file");
    builder.add_source(File::from(canonical).required(false))
}
