//! CLI domain: parse, route, help, output, and presentation only.
//! No domain orchestration; single route table dispatches to the service API.

mod help;
mod output;
mod parse;
mod presentation;
mod route;

pub use help::command_name;
pub use output::map_error;
pub use parse::{CategoryCommands, Cli, Commands, SettingsCommands, TabCommands};
pub use presentation::{
    format_categories_text, format_health_text, format_json, format_reconcile_text,
    format_settings_text, format_tabs_text, summary_message,
};
pub use route::RunContext;
