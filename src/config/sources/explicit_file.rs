//! Explicit config file source: the file named with `--config`.

use config::builder::DefaultState;
use config::ConfigBuilder;
use config::ConfigError;
use config::File;
use config::FileFormat;
use std::path::Path;

/// Add the explicit config file to builder. A missing file is an error.
pub fn add_to_builder(
    builder: ConfigBuilder<DefaultState>,
    path: &Path,
) -> Result<ConfigBuilder<DefaultState>, ConfigError> {
    if !path.exists() {
        return Err(ConfigError::NotFound(path.display().to_string()));
    }
    Ok(builder.add_source(File::from(path).format(FileFormat::Toml).required(true)))
}
