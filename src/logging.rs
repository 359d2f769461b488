//! Logging System
//!
//! Structured logging with the `tracing` crate. Level, format and destination come
//! from [`LoggingConfig`], with environment variable overrides.

use crate::error::ApiError;
use directories::ProjectDirs;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::path::PathBuf;
use tracing_subscriber::fmt::time::ChronoUtc;
use tracing_subscriber::fmt::writer::BoxMakeWriter;
use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter, Registry};

/// Logging configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LoggingConfig {
    /// Install a subscriber at all
    #[serde(default = "default_true")]
    pub enabled: bool,

    /// Log level: trace, debug, info, warn, error, off
    #[serde(default = "default_log_level")]
    pub level: String,

    /// Output format: json, text (default: text)
    #[serde(default = "default_format")]
    pub format: String,

    /// Output destination: stdout, stderr, file
    #[serde(default = "default_output")]
    pub output: String,

    /// Log file path (if output is "file")
    #[serde(default = "default_log_file")]
    pub file: PathBuf,

    /// Enable colored output (text format, terminal destinations only)
    #[serde(default = "default_true")]
    pub color: bool,

    /// Module-specific log levels
    #[serde(default)]
    pub modules: HashMap<String, String>,
}

fn default_log_level() -> String {
    "info".to_string()
}

fn default_format() -> String {
    "text".to_string()
}

fn default_output() -> String {
    // stdout carries protocol traffic in `serve` mode
    "stderr".to_string()
}

fn default_log_file() -> PathBuf {
    ProjectDirs::from("", "", "tabpin")
        .map(|dirs| dirs.data_dir().join("tabpin.log"))
        .unwrap_or_else(|| PathBuf::from(".tabpin/tabpin.log"))
}

fn default_true() -> bool {
    true
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            enabled: default_true(),
            level: default_log_level(),
            format: default_format(),
            output: default_output(),
            file: default_log_file(),
            color: default_true(),
            modules: HashMap::new(),
        }
    }
}

impl LoggingConfig {
    pub fn validate(&self) -> Result<(), String> {
        if !matches!(
            self.level.as_str(),
            "trace" | "debug" | "info" | "warn" | "error" | "off"
        ) {
            return Err(format!("Invalid log level: {}", self.level));
        }
        if self.format != "json" && self.format != "text" {
            return Err(format!(
                "Invalid log format: {} (must be 'json' or 'text')",
                self.format
            ));
        }
        parse_output_destination(&self.output).map_err(|e| e.to_string())?;
        Ok(())
    }
}

/// Initialize the logging system
///
/// Priority order (highest to lowest):
/// 1. Environment variables (TABPIN_LOG, TABPIN_LOG_FORMAT, TABPIN_LOG_OUTPUT, TABPIN_LOG_MODULES)
/// 2. The given configuration (CLI flags are folded into it by the caller)
/// 3. Defaults
pub fn init_logging(config: Option<&LoggingConfig>) -> Result<(), ApiError> {
    if config.is_some_and(|c| !c.enabled) {
        return Ok(());
    }

    let filter = build_env_filter(config)?;
    let format = determine_format(config)?;
    let output = determine_output(config)?;
    let use_color = config.map(|c| c.color).unwrap_or(true) && output != OutputDestination::File;

    let writer = match output {
        OutputDestination::Stdout => BoxMakeWriter::new(std::io::stdout),
        OutputDestination::Stderr => BoxMakeWriter::new(std::io::stderr),
        OutputDestination::File => {
            let log_file = config
                .map(|c| c.file.clone())
                .unwrap_or_else(default_log_file);
            if let Some(parent) = log_file.parent() {
                std::fs::create_dir_all(parent).map_err(|e| {
                    ApiError::ConfigError(format!("Failed to create log directory: {}", e))
                })?;
            }
            let file = std::fs::OpenOptions::new()
                .create(true)
                .append(true)
                .open(&log_file)
                .map_err(|e| {
                    ApiError::ConfigError(format!("Failed to open log file {:?}: {}", log_file, e))
                })?;
            BoxMakeWriter::new(std::sync::Mutex::new(file))
        }
    };

    let base_subscriber = Registry::default().with(filter);
    let installed = if format == "json" {
        base_subscriber
            .with(
                fmt::layer()
                    .json()
                    .with_target(true)
                    .with_timer(ChronoUtc::rfc_3339())
                    .with_writer(writer),
            )
            .try_init()
    } else {
        base_subscriber
            .with(
                fmt::layer()
                    .with_target(true)
                    .with_timer(ChronoUtc::rfc_3339())
                    .with_ansi(use_color)
                    .with_writer(writer),
            )
            .try_init()
    };

    installed.map_err(|e| ApiError::ConfigError(format!("Failed to install logger: {}", e)))
}

/// Build environment filter from config or environment variables
fn build_env_filter(config: Option<&LoggingConfig>) -> Result<EnvFilter, ApiError> {
    if let Ok(filter) = EnvFilter::try_from_env("TABPIN_LOG") {
        return Ok(filter);
    }

    let level = config.map(|c| c.level.as_str()).unwrap_or("info");
    if level == "off" {
        return Ok(EnvFilter::new("off"));
    }

    let mut filter = EnvFilter::new(level);

    if let Some(config) = config {
        for (module, module_level) in &config.modules {
            let directive = format!("{}={}", module, module_level);
            filter = filter.add_directive(
                directive
                    .parse()
                    .map_err(|e| ApiError::ConfigError(format!("Invalid log directive: {}", e)))?,
            );
        }
    }

    if let Ok(modules_str) = std::env::var("TABPIN_LOG_MODULES") {
        for directive in parse_module_directives(&modules_str) {
            filter = filter.add_directive(directive.parse().map_err(|e| {
                ApiError::ConfigError(format!("Invalid log directive from env: {}", e))
            })?);
        }
    }

    Ok(filter)
}

/// `a=debug, b = warn` into `["a=debug", "b=warn"]`; malformed entries are skipped.
fn parse_module_directives(spec: &str) -> Vec<String> {
    spec.split(',')
        .filter_map(|part| {
            let (module, level) = part.split_once('=')?;
            let (module, level) = (module.trim(), level.trim());
            if module.is_empty() || level.is_empty() {
                return None;
            }
            Some(format!("{}={}", module, level))
        })
        .collect()
}

fn determine_format(config: Option<&LoggingConfig>) -> Result<String, ApiError> {
    if let Ok(format) = std::env::var("TABPIN_LOG_FORMAT") {
        if format == "json" || format == "text" {
            return Ok(format);
        }
    }

    let format = config.map(|c| c.format.as_str()).unwrap_or("text");
    if format != "json" && format != "text" {
        return Err(ApiError::ConfigError(format!(
            "Invalid log format: {} (must be 'json' or 'text')",
            format
        )));
    }
    Ok(format.to_string())
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum OutputDestination {
    Stdout,
    Stderr,
    File,
}

fn determine_output(config: Option<&LoggingConfig>) -> Result<OutputDestination, ApiError> {
    if let Ok(output) = std::env::var("TABPIN_LOG_OUTPUT") {
        return parse_output_destination(&output);
    }
    let output = config.map(|c| c.output.as_str()).unwrap_or("stderr");
    parse_output_destination(output)
}

fn parse_output_destination(output: &str) -> Result<OutputDestination, ApiError> {
    match output {
        "stdout" => Ok(OutputDestination::Stdout),
        "stderr" => Ok(OutputDestination::Stderr),
        "file" => Ok(OutputDestination::File),
        _ => Err(ApiError::ConfigError(format!(
            "Invalid log output: {} (must be 'stdout', 'stderr' or 'file')",
            output
        ))),
    }
}
