//! Merge rules: defaults, override order, conflict handling.
//!
//! Later sources override earlier ones key by key; tables merge, scalars and lists
//! replace.

use config::builder::DefaultState;
use config::Config;
use config::ConfigBuilder;
use config::ConfigError;

/// Create a Config builder with merge policy defaults applied.
///
/// Only the values other sources most often override are seeded here; everything
/// else falls back to the serde defaults of each section.
pub fn builder_with_defaults() -> Result<ConfigBuilder<DefaultState>, ConfigError> {
    Config::builder()
        .set_default("store.throttle_ms", 50)?
        .set_default("store.cache_ttl_ms", 5000)?
        .set_default("store.timeout_ms", 10_000)?
        .set_default("guard.recent_decision_ttl_ms", 2000)?
        .set_default("logging.level", "info")?
        .set_default("logging.output", "stderr")
}
