//! CLI command-name contract for logging and routing.

use crate::cli::parse::{CategoryCommands, Commands, SettingsCommands, TabCommands};

/// Command name string used in logs (e.g. "open", "tabs.add").
pub fn command_name(command: &Commands) -> String {
    match command {
        Commands::Open { .. } => "open".to_string(),
        Commands::Tabs { command } => format!("tabs.{}", tab_command_name(command)),
        Commands::Categories { command } => {
            format!("categories.{}", category_command_name(command))
        }
        Commands::Settings { command } => format!("settings.{}", settings_command_name(command)),
        Commands::Health { .. } => "health".to_string(),
        Commands::Serve => "serve".to_string(),
        Commands::Config => "config".to_string(),
        Commands::Reset { .. } => "reset".to_string(),
    }
}

pub fn tab_command_name(command: &TabCommands) -> &'static str {
    match command {
        TabCommands::List { .. } => "list",
        TabCommands::Add { .. } => "add",
        TabCommands::Remove { .. } => "remove",
    }
}

pub fn category_command_name(command: &CategoryCommands) -> &'static str {
    match command {
        CategoryCommands::List { .. } => "list",
        CategoryCommands::Add { .. } => "add",
        CategoryCommands::Remove { .. } => "remove",
    }
}

pub fn settings_command_name(command: &SettingsCommands) -> &'static str {
    match command {
        SettingsCommands::Show { .. } => "show",
        SettingsCommands::Set { .. } => "set",
    }
}
