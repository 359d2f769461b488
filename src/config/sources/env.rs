//! Environment source: `TABPIN__SECTION__KEY=value`.
//!
//! List-valued normalizer keys take comma-separated values.

use config::builder::DefaultState;
use config::ConfigBuilder;
use config::Environment;
use std::collections::HashMap;

pub const ENV_PREFIX: &str = "TABPIN";

const LIST_KEYS: &[&str] = &[
    "normalizer.auth_redirect_hosts",
    "normalizer.redirect_params",
    "normalizer.sensitive_hosts",
    "normalizer.kept_query_params",
];

/// Build the environment source, reading `vars` instead of the process
/// environment when given.
pub fn environment(vars: Option<HashMap<String, String>>) -> Environment {
    let mut env = Environment::with_prefix(ENV_PREFIX)
        .prefix_separator("__")
        .separator("__")
        .try_parsing(true)
        .list_separator(",");
    for key in LIST_KEYS {
        env = env.with_list_parse_key(key);
    }
    env.source(vars)
}

pub fn add_to_builder(
    builder: ConfigBuilder<DefaultState>,
    vars: Option<HashMap<String, String>>,
) -> ConfigBuilder<DefaultState> {
    builder.add_source(environment(vars))
}
