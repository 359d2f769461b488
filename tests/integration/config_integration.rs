//! Integration tests for the configuration system

use std::collections::HashMap;
use tabpin::config::{ConfigLoader, TabpinConfig};
use tempfile::TempDir;

fn vars(pairs: &[(&str, &str)]) -> Option<HashMap<String, String>> {
    Some(
        pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect(),
    )
}

#[test]
fn test_explicit_file_overrides_defaults() {
    let temp_dir = TempDir::new().unwrap();
    let config_file = temp_dir.path().join("tabpin.toml");
    std::fs::write(
        &config_file,
        r#"
[store]
throttle_ms = 10
max_attempts = 5

[guard]
recent_decision_ttl_ms = 3000

[normalizer]
sensitive_hosts = ["sheets.example.com"]

[reconcile]
default_partition = "none"
"#,
    )
    .unwrap();

    let config = ConfigLoader::load_with_env(Some(&config_file), vars(&[])).unwrap();
    assert!(config.validate().is_ok());
    assert_eq!(config.store.throttle_ms, 10);
    assert_eq!(config.store.max_attempts, 5);
    assert_eq!(config.store.cache_ttl_ms, 5000);
    assert_eq!(config.guard.recent_decision_ttl_ms, 3000);
    assert_eq!(config.normalizer.sensitive_hosts, vec!["sheets.example.com"]);
    assert_eq!(config.normalizer.login_path_marker, "ServiceLogin");
    assert_eq!(config.reconcile.default_partition, "none");
    assert_eq!(config.reconcile.partition_settle_delay_ms, 150);
}

#[test]
fn test_environment_overrides_file() {
    let temp_dir = TempDir::new().unwrap();
    let config_file = temp_dir.path().join("tabpin.toml");
    std::fs::write(&config_file, "[store]\nthrottle_ms = 10\n").unwrap();

    let config = ConfigLoader::load_with_env(
        Some(&config_file),
        vars(&[
            ("TABPIN__STORE__THROTTLE_MS", "75"),
            ("TABPIN__LOGGING__FORMAT", "json"),
            ("TABPIN__NORMALIZER__KEPT_QUERY_PARAMS", "id,tab"),
        ]),
    )
    .unwrap();
    assert_eq!(config.store.throttle_ms, 75);
    assert_eq!(config.logging.format, "json");
    assert_eq!(config.normalizer.kept_query_params, vec!["id", "tab"]);
}

#[test]
fn test_missing_explicit_file_is_an_error() {
    let temp_dir = TempDir::new().unwrap();
    let missing = temp_dir.path().join("absent.toml");
    assert!(ConfigLoader::load_with_env(Some(&missing), vars(&[])).is_err());
}

#[test]
fn test_invalid_values_fail_validation() {
    let temp_dir = TempDir::new().unwrap();
    let config_file = temp_dir.path().join("tabpin.toml");
    std::fs::write(
        &config_file,
        "[store]\ninitial_retry_delay_ms = 9000\n\n[logging]\nlevel = \"chatty\"\n",
    )
    .unwrap();

    let config = ConfigLoader::load_from_file(&config_file).unwrap();
    let errors = config.validate().unwrap_err();
    let sections: Vec<_> = errors.iter().map(|e| e.section).collect();
    assert_eq!(sections, vec!["store", "logging"]);
    assert!(config.ensure_valid().is_err());
}

#[test]
fn test_rendered_config_loads_back() {
    let temp_dir = TempDir::new().unwrap();
    let config_file = temp_dir.path().join("rendered.toml");
    let mut original = TabpinConfig::default();
    original.store.timeout_ms = 2500;
    std::fs::write(&config_file, original.to_toml().unwrap()).unwrap();

    let loaded = ConfigLoader::load_from_file(&config_file).unwrap();
    assert_eq!(loaded.store.timeout_ms, 2500);
    assert_eq!(loaded.logging, original.logging);
}
