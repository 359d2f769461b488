//! CLI parse: clap types for tabpin. No behavior; definitions only.

use clap::{Parser, Subcommand};
use std::path::PathBuf;

/// tabpin - keep a declared set of pinned tabs open
#[derive(Parser)]
#[command(name = "tabpin")]
#[command(about = "Open and pin a declared set of tabs, touching nothing else")]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,

    /// Configuration file path (layered over the global config file)
    #[arg(long)]
    pub config: Option<PathBuf>,

    /// Data directory for the tab store (overrides storage.data_dir)
    #[arg(long)]
    pub data_dir: Option<PathBuf>,

    /// Session file describing the browser windows and tabs
    #[arg(long, default_value = "session.json")]
    pub session: PathBuf,

    /// Enable verbose logging
    #[arg(long, short)]
    pub verbose: bool,

    /// Disable logging entirely
    #[arg(long, short, conflicts_with = "verbose")]
    pub quiet: bool,

    /// Log level (trace, debug, info, warn, error, off)
    #[arg(long)]
    pub log_level: Option<String>,

    /// Log format (json, text)
    #[arg(long)]
    pub log_format: Option<String>,

    /// Log output (stdout, stderr, file)
    #[arg(long)]
    pub log_output: Option<String>,

    /// Log file path (if output is "file")
    #[arg(long)]
    pub log_file: Option<PathBuf>,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Open and pin configured tabs
    Open {
        /// Only tabs of this category
        #[arg(long)]
        category: Option<String>,
        /// Target window id (default: all windows)
        #[arg(long)]
        window: Option<u64>,
        /// Output format (text or json)
        #[arg(long, default_value = "text")]
        format: String,
    },
    /// Manage configured tabs
    Tabs {
        #[command(subcommand)]
        command: TabCommands,
    },
    /// Manage categories
    Categories {
        #[command(subcommand)]
        command: CategoryCommands,
    },
    /// Show or change settings
    Settings {
        #[command(subcommand)]
        command: SettingsCommands,
    },
    /// Check storage health and usage
    Health {
        /// Output format (text or json)
        #[arg(long, default_value = "text")]
        format: String,
    },
    /// Answer protocol messages as JSON lines on stdin/stdout
    Serve,
    /// Print the effective configuration as TOML
    Config,
    /// Erase all data and restore defaults
    Reset {
        /// Skip the confirmation prompt
        #[arg(long)]
        yes: bool,
    },
}

#[derive(Subcommand)]
pub enum TabCommands {
    /// List configured tabs in open order
    List {
        /// Only tabs of this category
        #[arg(long)]
        category: Option<String>,
        /// Output format (text or json)
        #[arg(long, default_value = "text")]
        format: String,
    },
    /// Add a tab, or update it when --id names an existing one
    Add {
        /// Tab URL (http or https)
        url: String,
        /// Existing tab id to update
        #[arg(long)]
        id: Option<String>,
        #[arg(long)]
        title: Option<String>,
        #[arg(long)]
        category: Option<String>,
        /// Position in open order
        #[arg(long)]
        order: Option<f64>,
        /// Partition (container) tag
        #[arg(long)]
        partition: Option<String>,
        /// Store the tab but leave it out of runs
        #[arg(long)]
        disabled: bool,
    },
    /// Remove a configured tab
    Remove {
        /// Tab id
        id: String,
    },
}

#[derive(Subcommand)]
pub enum CategoryCommands {
    /// List categories
    List {
        /// Output format (text or json)
        #[arg(long, default_value = "text")]
        format: String,
    },
    /// Add or replace a category
    Add {
        id: String,
        name: String,
        icon: String,
    },
    /// Remove a category (its tabs are kept)
    Remove { id: String },
}

#[derive(Subcommand)]
pub enum SettingsCommands {
    /// Show current settings
    Show {
        /// Output format (text or json)
        #[arg(long, default_value = "text")]
        format: String,
    },
    /// Set one setting; the value is parsed as JSON when possible
    Set { key: String, value: String },
}
