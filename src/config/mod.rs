//! Configuration management for flakebox

pub mod schema;

pub use schema::Config;

use crate::error::{FlakeboxError, FlakeboxResult};
use std::path::{Path, PathBuf};
use tokio::fs;
use tracing::debug;

/// Name of the project-local config file
pub const LOCAL_CONFIG_FILE: &str = ".flakebox.toml";

/// Configuration manager
pub struct ConfigManager {
    config_path: PathBuf,
}

impl ConfigManager {
    /// Create a new config manager with default path
    pub fn new() -> Self {
        Self {
            config_path: Self::default_config_path(),
        }
    }

    /// Create a config manager with a custom path
    pub fn with_path(path: PathBuf) -> Self {
        Self { config_path: path }
    }

    /// Get the default config file path
    pub fn default_config_path() -> PathBuf {
        dirs::config_dir()
            .unwrap_or_else(|| PathBuf::from("."))
            .join("flakebox")
            .join("config.toml")
    }

    /// Get the state directory path
    pub fn state_dir() -> PathBuf {
        dirs::state_dir()
            .or_else(dirs::data_local_dir)
            .unwrap_or_else(|| PathBuf::from("."))
            .join("flakebox")
    }

    /// Directory holding per-volume lock files
    pub fn locks_dir() -> PathBuf {
        Self::state_dir().join("locks")
    }

    /// Directory source trees are staged in before copying
    pub fn staging_dir() -> PathBuf {
        Self::state_dir().join("staging")
    }

    /// Find `.flakebox.toml` in `start` or any of its ancestors
    pub fn find_local_config(start: &Path) -> Option<PathBuf> {
        start
            .ancestors()
            .map(|dir| dir.join(LOCAL_CONFIG_FILE))
            .find(|candidate| candidate.is_file())
    }

    /// Load configuration, using defaults if the file does not exist
    pub async fn load(&self) -> FlakeboxResult<Config> {
        self.load_merged(None).await
    }

    /// Load the global configuration with an optional local file merged over it
    pub async fn load_merged(&self, local: Option<&Path>) -> FlakeboxResult<Config> {
        let mut merged = toml::Value::Table(toml::map::Map::new());

        if self.config_path.exists() {
            merged = Self::read_value(&self.config_path).await?;
        } else {
            debug!("Config file not found, using defaults");
        }

        if let Some(path) = local {
            debug!("Merging local config {}", path.display());
            let overlay = Self::read_value(path).await?;
            merge_values(&mut merged, overlay);
        }

        let origin = local.unwrap_or(self.config_path.as_path()).to_path_buf();
        let config: Config = merged
            .try_into()
            .map_err(|e: toml::de::Error| FlakeboxError::ConfigInvalid {
                path: origin,
                reason: e.to_string(),
            })?;

        config.validate()?;
        Ok(config)
    }

    async fn read_value(path: &Path) -> FlakeboxResult<toml::Value> {
        let content = fs::read_to_string(path)
            .await
            .map_err(|e| FlakeboxError::io(format!("reading config from {}", path.display()), e))?;

        toml::from_str(&content).map_err(|e| FlakeboxError::ConfigInvalid {
            path: path.to_path_buf(),
            reason: e.to_string(),
        })
    }

    /// Ensure all state directories exist
    pub async fn ensure_state_dirs() -> FlakeboxResult<()> {
        for dir in [Self::state_dir(), Self::locks_dir(), Self::staging_dir()] {
            fs::create_dir_all(&dir).await.map_err(|e| {
                FlakeboxError::io(format!("creating directory {}", dir.display()), e)
            })?;
        }
        Ok(())
    }

    /// Get the config file path
    pub fn path(&self) -> &Path {
        &self.config_path
    }
}

impl Default for ConfigManager {
    fn default() -> Self {
        Self::new()
    }
}

/// Merge `overlay` into `base`; tables merge key by key, anything else replaces
fn merge_values(base: &mut toml::Value, overlay: toml::Value) {
    match (base, overlay) {
        (toml::Value::Table(base), toml::Value::Table(overlay)) => {
            for (key, value) in overlay {
                match base.get_mut(&key) {
                    Some(existing) => merge_values(existing, value),
                    None => {
                        base.insert(key, value);
                    }
                }
            }
        }
        (base, overlay) => *base = overlay,
    }
}
