//! Tabpin CLI Binary
//!
//! Command-line interface for declarative pinned-tab reconciliation.

use clap::Parser;
use std::process;
use tabpin::cli::{Cli, Commands, RunContext};
use tabpin::config::ConfigLoader;
use tabpin::logging::{init_logging, LoggingConfig};
use tracing::{error, info};

fn main() {
    let cli = Cli::parse();

    let logging_config = build_logging_config(&cli);

    if let Err(e) = init_logging(Some(&logging_config)) {
        eprintln!("Failed to initialize logging: {}", e);
        process::exit(1);
    }

    info!("Tabpin CLI starting");

    let context = match RunContext::new(
        cli.config.clone(),
        cli.data_dir.clone(),
        cli.session.clone(),
    ) {
        Ok(ctx) => {
            info!("CLI context initialized");
            ctx
        }
        Err(e) => {
            error!("Error initializing tabpin: {}", e);
            eprintln!("{}", tabpin::cli::map_error(&e));
            process::exit(1);
        }
    };

    match context.execute(&cli.command) {
        Ok(output) => {
            info!("Command completed successfully");
            if !output.is_empty() {
                println!("{}", output);
            }
        }
        Err(e) => {
            error!("Command failed: {}", e);
            eprintln!("{}", tabpin::cli::map_error(&e));
            process::exit(1);
        }
    }
}

/// Build logging configuration from CLI args and the config file.
/// Precedence: CLI flags override config file override defaults.
fn build_logging_config(cli: &Cli) -> LoggingConfig {
    let mut config = ConfigLoader::load(cli.config.as_deref())
        .map(|c| c.logging)
        .unwrap_or_default();

    if cli.quiet {
        config.enabled = false;
    }
    if cli.verbose {
        config.level = "debug".to_string();
    }
    if let Some(ref level) = cli.log_level {
        config.level = level.clone();
    }
    if let Some(ref format) = cli.log_format {
        config.format = format.clone();
    }
    if let Some(ref output) = cli.log_output {
        config.output = output.clone();
    }
    if let Some(ref file) = cli.log_file {
        config.file = file.clone();
    }

    // stdout carries responses in serve mode
    if matches!(cli.command, Commands::Serve) && config.output == "stdout" {
        config.output = "stderr".to_string();
    }

    config
}
