//! Loading and persisting `config.toml`.
//!
//! Rewrites keep the user's comments and formatting: only values that
//! changed are replaced in the existing TOML document.

use std::path::{Path, PathBuf};

use log::{info, warn};
use toml_edit::{DocumentMut, Item, Table};

use crate::config::{sanitize_config, Config};
use crate::error::ConfigError;

pub const APP_DIR_NAME: &str = "playdeck";
pub const CONFIG_FILE_NAME: &str = "config.toml";

/// `<config_dir>/playdeck`.
pub fn default_config_root() -> Result<PathBuf, ConfigError> {
    dirs::config_dir()
        .map(|dir| dir.join(APP_DIR_NAME))
        .ok_or(ConfigError::NoConfigDir)
}

fn set_table_value_preserving_decor(table: &mut Table, key: &str, item: Item) {
    let existing_value_decor = table
        .get(key)
        .and_then(|current| current.as_value().map(|value| value.decor().clone()));
    table[key] = item;
    if let Some(existing_value_decor) = existing_value_decor {
        if let Some(next_value) = table[key].as_value_mut() {
            *next_value.decor_mut() = existing_value_decor;
        }
    }
}

fn merge_table_with_targeted_updates(destination: &mut Table, source: &Table) {
    for (key, source_item) in source.iter() {
        match source_item {
            Item::Table(source_table) => {
                if !destination.get(key).is_some_and(Item::is_table) {
                    destination.insert(key, Item::Table(Table::new()));
                }
                if let Some(destination_table) = destination.get_mut(key).and_then(Item::as_table_mut)
                {
                    merge_table_with_targeted_updates(destination_table, source_table);
                }
            }
            _ => {
                let unchanged = match (destination.get(key), source_item.as_value()) {
                    (Some(current), Some(next)) => current
                        .as_value()
                        .is_some_and(|current| current.to_string().trim() == next.to_string().trim()),
                    _ => false,
                };
                if !unchanged {
                    set_table_value_preserving_decor(destination, key, source_item.clone());
                }
            }
        }
    }
}

/// Serializes `config` on top of `existing_text`, keeping comments.
pub fn serialize_config_with_preserved_comments(
    existing_text: &str,
    config: &Config,
) -> Result<String, ConfigError> {
    let next_text = toml::to_string(config)?;
    let next_document = next_text
        .parse::<DocumentMut>()
        .map_err(|err| ConfigError::Document(err.to_string()))?;
    let mut existing_document = existing_text
        .parse::<DocumentMut>()
        .map_err(|err| ConfigError::Document(err.to_string()))?;
    merge_table_with_targeted_updates(existing_document.as_table_mut(), next_document.as_table());
    Ok(existing_document.to_string())
}

pub fn persist_config_file(config: &Config, path: &Path) -> Result<(), ConfigError> {
    let config_text = match std::fs::read_to_string(path) {
        Ok(existing_text) => match serialize_config_with_preserved_comments(&existing_text, config) {
            Ok(updated_text) => updated_text,
            Err(err) => {
                warn!(
                    "Failed to preserve config comments for {} ({}). Falling back to plain serialization.",
                    path.display(),
                    err
                );
                toml::to_string(config)?
            }
        },
        Err(_) => toml::to_string(config)?,
    };
    std::fs::write(path, config_text)?;
    Ok(())
}

/// Reads `config.toml` under `config_root`, creating it with defaults when
/// missing. Values that needed clamping are written back.
pub fn load_or_create_config(config_root: &Path) -> Result<(Config, PathBuf), ConfigError> {
    std::fs::create_dir_all(config_root)?;
    let config_file = config_root.join(CONFIG_FILE_NAME);
    if !config_file.exists() {
        info!(
            "Config file not found. Creating default config. path={}",
            config_file.display()
        );
        std::fs::write(&config_file, toml::to_string(&sanitize_config(Config::default()))?)?;
    }

    let content = std::fs::read_to_string(&config_file)?;
    let parsed = toml::from_str::<Config>(&content)?;
    let config = sanitize_config(parsed.clone());
    if config != parsed {
        info!("Config values were clamped, rewriting {}", config_file.display());
        persist_config_file(&config, &config_file)?;
    }
    Ok((config, config_file))
}

/// Resolves the catalog path relative to the config directory.
pub fn resolve_catalog_path(config: &Config, config_root: &Path) -> PathBuf {
    let path = PathBuf::from(&config.catalog.source_path);
    if path.is_absolute() {
        path
    } else {
        config_root.join(path)
    }
}
