//! CLI route: single route table and run context. Dispatches to the service API and presentation.

use crate::api::TabPinApi;
use crate::cli::command_name;
use crate::cli::parse::{CategoryCommands, Commands, SettingsCommands, TabCommands};
use crate::cli::presentation::{
    format_categories_text, format_health_text, format_json, format_reconcile_text,
    format_settings_text, format_tabs_text,
};
use crate::config::{ConfigLoader, TabpinConfig};
use crate::error::ApiError;
use crate::host::SessionFileHost;
use crate::message::serve_lines;
use crate::store::SledBackend;
use crate::types::{sort_for_opening, Category, TabConfig};
use serde_json::{Map, Value};
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Instant;
use tokio::io::BufReader;
use tokio::runtime::Runtime;
use tracing::{debug, info};

/// Runtime context for CLI execution: effective config, the service API and the
/// async runtime the service runs on.
pub struct RunContext {
    api: Arc<TabPinApi>,
    config: TabpinConfig,
    runtime: Runtime,
}

impl RunContext {
    /// Reference to the underlying service API.
    pub fn api(&self) -> &TabPinApi {
        &self.api
    }

    pub fn config(&self) -> &TabpinConfig {
        &self.config
    }

    /// Load configuration, open the store and the session file, and wire the service.
    pub fn new(
        config_path: Option<PathBuf>,
        data_dir: Option<PathBuf>,
        session_path: PathBuf,
    ) -> Result<Self, ApiError> {
        let mut config = ConfigLoader::load(config_path.as_deref())?;
        if let Some(dir) = data_dir {
            config.storage.data_dir = Some(dir);
        }
        config.ensure_valid()?;

        let store_path = config.storage.store_path();
        std::fs::create_dir_all(&store_path)?;
        let backend = Arc::new(SledBackend::new(&store_path)?);
        let host = Arc::new(SessionFileHost::open(&session_path)?);
        debug!(
            store_path = %store_path.display(),
            session = %session_path.display(),
            "Opened store and session"
        );

        let runtime = tokio::runtime::Builder::new_multi_thread()
            .enable_all()
            .build()?;
        let api = TabPinApi::from_config(backend, host, &config);

        Ok(Self {
            api: Arc::new(api),
            config,
            runtime,
        })
    }

    /// Execute a CLI command via the single route table.
    pub fn execute(&self, command: &Commands) -> Result<String, ApiError> {
        let started = Instant::now();
        let name = command_name(command);
        let result = self.runtime.block_on(self.execute_inner(command));
        info!(
            command = %name,
            ok = result.is_ok(),
            duration_ms = started.elapsed().as_millis() as u64,
            "Command finished"
        );
        result
    }

    async fn execute_inner(&self, command: &Commands) -> Result<String, ApiError> {
        match command {
            Commands::Open {
                category,
                window,
                format,
            } => {
                let result = match category {
                    Some(category) => self.api.open_category_tabs(category, *window).await?,
                    None => self.api.open_all_tabs(*window).await?,
                };
                if format == "json" {
                    format_json(&result)
                } else {
                    Ok(format_reconcile_text(&result))
                }
            }
            Commands::Tabs { command } => self.handle_tab_command(command).await,
            Commands::Categories { command } => self.handle_category_command(command).await,
            Commands::Settings { command } => self.handle_settings_command(command).await,
            Commands::Health { format } => {
                let health = self.api.storage_health().await;
                if format == "json" {
                    format_json(&health)
                } else {
                    Ok(format_health_text(&health))
                }
            }
            Commands::Serve => {
                let reader = BufReader::new(tokio::io::stdin());
                let handled = serve_lines(&self.api, reader, tokio::io::stdout()).await?;
                info!(handled, "Serve loop finished");
                Ok(String::new())
            }
            Commands::Config => self.config.to_toml(),
            Commands::Reset { yes } => {
                if !*yes {
                    use dialoguer::Confirm;
                    let confirmed = Confirm::new()
                        .with_prompt("Erase all tabs, categories and settings?")
                        .interact()
                        .map_err(|e| {
                            ApiError::ConfigError(format!("Failed to get user input: {}", e))
                        })?;
                    if !confirmed {
                        return Ok("Reset cancelled".to_string());
                    }
                }
                let data = self.api.reset().await?;
                Ok(format!(
                    "Storage reset: {} categories restored",
                    data.categories.len()
                ))
            }
        }
    }

    async fn handle_tab_command(&self, command: &TabCommands) -> Result<String, ApiError> {
        match command {
            TabCommands::List { category, format } => {
                let data = self.api.get_tabs_data().await?;
                let mut tabs: Vec<TabConfig> = data
                    .tabs
                    .into_iter()
                    .filter(|t| category.as_ref().map_or(true, |c| &t.category == c))
                    .collect();
                sort_for_opening(&mut tabs);
                if format == "json" {
                    format_json(&tabs)
                } else {
                    Ok(format_tabs_text(&tabs, &data.categories))
                }
            }
            TabCommands::Add {
                url,
                id,
                title,
                category,
                order,
                partition,
                disabled,
            } => {
                let mut tab = match id {
                    Some(id) => {
                        let data = self.api.get_tabs_data().await?;
                        data.tabs
                            .into_iter()
                            .find(|t| &t.id == id)
                            .ok_or_else(|| ApiError::NotFound(format!("Tab not found: {}", id)))?
                    }
                    None => TabConfig::new(url.clone()),
                };
                tab.url = url.clone();
                if let Some(title) = title {
                    tab.title = title.clone();
                }
                if let Some(category) = category {
                    tab.category = category.clone();
                }
                if let Some(order) = order {
                    tab.order = Some(*order);
                }
                if let Some(partition) = partition {
                    tab.partition_tag = Some(partition.clone());
                }
                tab.enabled = !*disabled;

                let saved = self.api.save_tab(tab).await?;
                Ok(format!("Saved tab {} ({})", saved.id, saved.url))
            }
            TabCommands::Remove { id } => {
                self.api.delete_tab(id).await?;
                Ok(format!("Removed tab {}", id))
            }
        }
    }

    async fn handle_category_command(&self, command: &CategoryCommands) -> Result<String, ApiError> {
        match command {
            CategoryCommands::List { format } => {
                let data = self.api.get_tabs_data().await?;
                if format == "json" {
                    format_json(&data.categories)
                } else {
                    Ok(format_categories_text(&data.categories))
                }
            }
            CategoryCommands::Add { id, name, icon } => {
                let mut categories = self.api.get_tabs_data().await?.categories;
                let category = Category::new(id.clone(), name.clone(), icon.clone());
                match categories.iter_mut().find(|c| &c.id == id) {
                    Some(existing) => *existing = category,
                    None => categories.push(category),
                }
                self.api.save_categories(categories).await?;
                Ok(format!("Saved category {}", id))
            }
            CategoryCommands::Remove { id } => {
                let mut categories = self.api.get_tabs_data().await?.categories;
                let before = categories.len();
                categories.retain(|c| &c.id != id);
                if categories.len() == before {
                    return Err(ApiError::NotFound(format!("Category not found: {}", id)));
                }
                self.api.save_categories(categories).await?;
                Ok(format!("Removed category {}", id))
            }
        }
    }

    async fn handle_settings_command(&self, command: &SettingsCommands) -> Result<String, ApiError> {
        match command {
            SettingsCommands::Show { format } => {
                let settings = self.api.get_tabs_data().await?.settings;
                if format == "json" {
                    format_json(&settings)
                } else {
                    Ok(format_settings_text(&settings))
                }
            }
            SettingsCommands::Set { key, value } => {
                let mut partial = Map::new();
                partial.insert(key.clone(), parse_setting_value(value));
                let settings = self.api.update_settings(&partial).await?;
                Ok(format_settings_text(&settings))
            }
        }
    }
}

/// JSON when the text parses as JSON (`true`, `3`, `{"a":1}`), a plain string otherwise.
fn parse_setting_value(raw: &str) -> Value {
    serde_json::from_str(raw).unwrap_or_else(|_| Value::String(raw.to_string()))
}
