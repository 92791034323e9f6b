//! Configuration loader with inheritance support.
//!
//! Loads configuration from multiple sources and merges them:
//! 1. Global config: `~/.codeloom/config.toml`
//! 2. Local config: `.codeloom/config.toml` (in workspace)
//! 3. CLI overrides
//!
//! Later sources override earlier ones.

use crate::error::ConfigError;
use crate::{ConfigOverrides, LoomConfig, DEFAULT_DATA_DIR};
use std::path::{Path, PathBuf};
use tracing::{debug, trace};

/// Configuration file name.
const CONFIG_FILE_NAME: &str = "config.toml";

/// Global configuration directory name.
const GLOBAL_CONFIG_DIR: &str = ".codeloom";

/// Configuration loader with caching and inheritance support.
#[derive(Debug, Clone)]
pub struct ConfigLoader {
    /// Global config directory (e.g., `~/.codeloom`)
    global_config_dir: Option<PathBuf>,

    /// Cached global config, as written on disk
    global_config: Option<toml::Table>,
}

impl Default for ConfigLoader {
    fn default() -> Self {
        Self::new()
    }
}

impl ConfigLoader {
    /// Create a new configuration loader.
    ///
    /// Automatically detects the global config directory (`~/.codeloom`).
    pub fn new() -> Self {
        let global_config_dir = dirs::home_dir().map(|h| h.join(GLOBAL_CONFIG_DIR));

        Self {
            global_config_dir,
            global_config: None,
        }
    }

    /// Create a loader with a custom global config directory.
    pub fn with_global_dir(global_dir: impl Into<PathBuf>) -> Self {
        Self {
            global_config_dir: Some(global_dir.into()),
            global_config: None,
        }
    }

    /// Get the global config file path.
    pub fn global_config_path(&self) -> Option<PathBuf> {
        self.global_config_dir
            .as_ref()
            .map(|d| d.join(CONFIG_FILE_NAME))
    }

    /// Get the local config file path for a workspace.
    pub fn local_config_path(&self, workspace_root: &Path) -> PathBuf {
        workspace_root
            .join(DEFAULT_DATA_DIR)
            .join(CONFIG_FILE_NAME)
    }

    /// Load configuration for a workspace with optional CLI overrides.
    ///
    /// Merges config in order: global → local → overrides, then validates.
    /// A key spelled out in a later file replaces the earlier value, even
    /// when it restates the default.
    pub fn load(
        &mut self,
        workspace_root: &Path,
        overrides: Option<&ConfigOverrides>,
    ) -> Result<LoomConfig, ConfigError> {
        let mut merged = toml::Table::new();

        if let Some(global_table) = self.global_table()? {
            merge_tables(&mut merged, global_table);
        }

        let local_path = self.local_config_path(workspace_root);
        if let Some(local_table) = read_local_table(&local_path)? {
            merge_tables(&mut merged, local_table);
        }

        let mut config = parse_config(&local_path, merged)?;

        if let Some(ovr) = overrides {
            config.apply_overrides(ovr);
        }

        config.validate()?;
        Ok(config)
    }

    /// Load only the global configuration.
    pub fn load_global(&mut self) -> Result<Option<LoomConfig>, ConfigError> {
        let Some(table) = self.global_table()? else {
            return Ok(None);
        };
        let path = self.global_config_path().unwrap_or_default();
        parse_config(&path, table).map(Some)
    }

    /// Load only the local configuration for a workspace.
    pub fn load_local(&self, workspace_root: &Path) -> Result<Option<LoomConfig>, ConfigError> {
        let local_path = self.local_config_path(workspace_root);
        match read_local_table(&local_path)? {
            Some(table) => parse_config(&local_path, table).map(Some),
            None => Ok(None),
        }
    }

    fn global_table(&mut self) -> Result<Option<toml::Table>, ConfigError> {
        if let Some(ref table) = self.global_config {
            return Ok(Some(table.clone()));
        }

        let Some(global_path) = self.global_config_path() else {
            debug!("No home directory found, skipping global config");
            return Ok(None);
        };

        if !global_path.exists() {
            trace!("Global config not found at {:?}", global_path);
            return Ok(None);
        }

        debug!("Loading global config from {:?}", global_path);
        let table = load_config_file(&global_path)?;

        self.global_config = Some(table.clone());

        Ok(Some(table))
    }

    /// Save configuration to the global config file.
    pub fn save_global(&self, config: &LoomConfig) -> Result<(), ConfigError> {
        let Some(ref global_dir) = self.global_config_dir else {
            return Err(ConfigError::NoHomeDir);
        };

        save_config_file(&global_dir.join(CONFIG_FILE_NAME), config)
    }

    /// Save configuration to the local config file for a workspace.
    pub fn save_local(&self, workspace_root: &Path, config: &LoomConfig) -> Result<(), ConfigError> {
        save_config_file(&self.local_config_path(workspace_root), config)
    }

    /// Initialize local configuration for a workspace.
    ///
    /// Creates `.codeloom/config.toml` with default configuration.
    pub fn init_local(&self, workspace_root: &Path) -> Result<PathBuf, ConfigError> {
        let config_path = self.local_config_path(workspace_root);
        if !config_path.exists() {
            save_config_file(&config_path, &LoomConfig::default())?;
        }

        Ok(config_path)
    }

    /// Clear cached global configuration.
    pub fn clear_cache(&mut self) {
        self.global_config = None;
    }
}

fn read_local_table(local_path: &Path) -> Result<Option<toml::Table>, ConfigError> {
    if !local_path.exists() {
        trace!("Local config not found at {:?}", local_path);
        return Ok(None);
    }

    debug!("Loading local config from {:?}", local_path);
    load_config_file(local_path).map(Some)
}

/// Load a configuration file from disk.
///
/// The raw table is returned for merging; it is checked against the
/// config model first so errors point at the offending file.
fn load_config_file(path: &Path) -> Result<toml::Table, ConfigError> {
    let content = std::fs::read_to_string(path).map_err(|e| ConfigError::read_file(path, e))?;

    let table: toml::Table = toml::from_str(&content).map_err(|e| ConfigError::parse_toml(path, e))?;
    parse_config(path, table.clone())?;
    Ok(table)
}

fn parse_config(path: &Path, table: toml::Table) -> Result<LoomConfig, ConfigError> {
    toml::Value::Table(table)
        .try_into()
        .map_err(|e| ConfigError::parse_toml(path, e))
}

/// Save a configuration file to disk.
fn save_config_file(path: &Path, config: &LoomConfig) -> Result<(), ConfigError> {
    if let Some(parent) = path.parent() {
        if !parent.exists() {
            std::fs::create_dir_all(parent).map_err(|e| ConfigError::create_dir(parent, e))?;
        }
    }

    let content = toml::to_string_pretty(config)?;
    std::fs::write(path, content).map_err(|e| ConfigError::write_file(path, e))
}

/// Merge `overlay` into `base`, key by key.
///
/// Nested tables merge recursively; any other overlay value (arrays
/// included) replaces the base value.
fn merge_tables(base: &mut toml::Table, overlay: toml::Table) {
    for (key, value) in overlay {
        match value {
            toml::Value::Table(overlay_section) => {
                if let Some(toml::Value::Table(base_section)) = base.get_mut(&key) {
                    merge_tables(base_section, overlay_section);
                    continue;
                }
                base.insert(key, toml::Value::Table(overlay_section));
            }
            value => {
                base.insert(key, value);
            }
        }
    }
}
