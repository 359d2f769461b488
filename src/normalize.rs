//! URL normalization
//!
//! Maps raw tab URLs to the canonical keys used to decide whether a configured tab is
//! already open. Normalization never fails: anything that does not parse is compared
//! by its lowercased raw text.

use percent_encoding::percent_decode_str;
use serde::{Deserialize, Serialize};
use std::fmt;
use url::form_urlencoded;
use url::Url;

/// Canonical comparison key for a URL. Derived per run, never persisted.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct NormalizedKey(String);

impl NormalizedKey {
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for NormalizedKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for NormalizedKey {
    fn from(value: &str) -> Self {
        NormalizedKey(value.to_lowercase())
    }
}

/// Normalizer rules
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NormalizerConfig {
    /// Hosts that serve login pages redirecting to another service
    #[serde(default = "default_auth_redirect_hosts")]
    pub auth_redirect_hosts: Vec<String>,

    /// Path fragment identifying a login page on an auth-redirect host
    #[serde(default = "default_login_path_marker")]
    pub login_path_marker: String,

    /// Query parameters carrying the post-login destination
    #[serde(default = "default_redirect_params")]
    pub redirect_params: Vec<String>,

    /// Hosts whose query string identifies distinct resources
    #[serde(default = "default_sensitive_hosts")]
    pub sensitive_hosts: Vec<String>,

    /// Query parameters kept for all other hosts
    #[serde(default = "default_kept_query_params")]
    pub kept_query_params: Vec<String>,
}

fn default_auth_redirect_hosts() -> Vec<String> {
    vec!["accounts.google.com".to_string()]
}

fn default_login_path_marker() -> String {
    "ServiceLogin".to_string()
}

fn default_redirect_params() -> Vec<String> {
    vec!["continue".to_string()]
}

fn default_sensitive_hosts() -> Vec<String> {
    vec!["drive.google.com".to_string(), "docs.google.com".to_string()]
}

fn default_kept_query_params() -> Vec<String> {
    ["view", "mode", "hl", "id", "q", "query", "page"]
        .iter()
        .map(|p| p.to_string())
        .collect()
}

impl Default for NormalizerConfig {
    fn default() -> Self {
        Self {
            auth_redirect_hosts: default_auth_redirect_hosts(),
            login_path_marker: default_login_path_marker(),
            redirect_params: default_redirect_params(),
            sensitive_hosts: default_sensitive_hosts(),
            kept_query_params: default_kept_query_params(),
        }
    }
}

impl NormalizerConfig {
    pub fn validate(&self) -> Result<(), String> {
        if self.login_path_marker.is_empty() && !self.auth_redirect_hosts.is_empty() {
            return Err("login_path_marker cannot be empty when auth_redirect_hosts is set".to_string());
        }
        if self.kept_query_params.iter().any(|p| p.is_empty()) {
            return Err("kept_query_params cannot contain empty names".to_string());
        }
        Ok(())
    }
}

/// Stateless URL normalizer
#[derive(Debug, Clone, Default)]
pub struct UrlNormalizer {
    config: NormalizerConfig,
}

impl UrlNormalizer {
    pub fn new(config: NormalizerConfig) -> Self {
        Self { config }
    }

    pub fn config(&self) -> &NormalizerConfig {
        &self.config
    }

    /// Normalize a raw URL into its comparison key.
    pub fn normalize(&self, raw: &str) -> NormalizedKey {
        NormalizedKey(self.normalize_string(raw))
    }

    fn normalize_string(&self, raw: &str) -> String {
        let Ok(url) = Url::parse(raw) else {
            return raw.to_lowercase();
        };
        let Some(host) = url.host_str() else {
            return raw.to_lowercase();
        };
        if !url.origin().is_tuple() {
            return raw.to_lowercase();
        }

        if self.is_auth_redirect(host, url.path()) {
            return self.redirect_target(&url, host);
        }

        if self.is_sensitive_host(host) {
            let mut key = origin_and_path(&url, false);
            if let Some(query) = url.query() {
                key.push('?');
                key.push_str(query);
            }
            return key.to_lowercase();
        }

        let mut key = origin_and_path(&url, true);
        let kept = self.kept_query(&url);
        if !kept.is_empty() {
            key.push('?');
            key.push_str(&kept);
        }
        key.to_lowercase()
    }

    fn is_auth_redirect(&self, host: &str, path: &str) -> bool {
        self.config
            .auth_redirect_hosts
            .iter()
            .any(|h| h.eq_ignore_ascii_case(host))
            && path.contains(&self.config.login_path_marker)
    }

    fn is_sensitive_host(&self, host: &str) -> bool {
        self.config
            .sensitive_hosts
            .iter()
            .any(|h| h.eq_ignore_ascii_case(host))
    }

    /// Collapse a login redirect onto its destination, or the bare login host when
    /// the destination is missing or unparseable.
    fn redirect_target(&self, url: &Url, host: &str) -> String {
        let target = url.query_pairs().find_map(|(name, value)| {
            self.config
                .redirect_params
                .iter()
                .any(|p| p.as_str() == name.as_ref())
                .then(|| value.into_owned())
        });

        let parsed = target.and_then(|value| {
            let decoded = percent_decode_str(&value)
                .decode_utf8()
                .map(|s| s.into_owned())
                .unwrap_or(value);
            Url::parse(&decoded).ok()
        });

        match parsed {
            Some(target) if target.origin().is_tuple() => {
                origin_and_path(&target, true).to_lowercase()
            }
            _ => host.to_lowercase(),
        }
    }

    fn kept_query(&self, url: &Url) -> String {
        let pairs: Vec<(String, String)> = url.query_pairs().into_owned().collect();
        let mut serializer = form_urlencoded::Serializer::new(String::new());
        for param in &self.config.kept_query_params {
            if let Some((_, value)) = pairs.iter().find(|(name, _)| name == param) {
                serializer.append_pair(param, value);
            }
        }
        serializer.finish()
    }
}

fn origin_and_path(url: &Url, strip_trailing_slash: bool) -> String {
    let origin = url.origin().ascii_serialization();
    let path = url.path();
    let path = if strip_trailing_slash {
        path.strip_suffix('/').unwrap_or(path)
    } else {
        path
    };
    format!("{origin}{path}")
}

/// Only http(s) URLs can be saved as pinned tabs.
pub fn is_valid_tab_url(raw: &str) -> bool {
    match Url::parse(raw) {
        Ok(url) => matches!(url.scheme(), "http" | "https") && url.host_str().is_some(),
        Err(_) => false,
    }
}
