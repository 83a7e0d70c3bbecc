use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::channel::ChannelPolicy;
use crate::db::BackendType;
use crate::sync::WriteOrdering;

/// Where and how the tables are stored
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct StorageConfig {
    /// Path to the data file; `:memory:` selects the in-memory backend
    pub path: Option<PathBuf>,
    /// Backend type; inferred from the path's extension when absent
    pub backend: Option<BackendType>,
}

/// Autosave behaviour of the sync controller
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct AutosaveConfig {
    /// Quiet period after the last edit before autosave fires
    pub delay_ms: u64,
    pub write_ordering: WriteOrdering,
}

impl Default for AutosaveConfig {
    fn default() -> Self {
        Self {
            delay_ms: 3000,
            write_ordering: WriteOrdering::default(),
        }
    }
}

impl AutosaveConfig {
    pub fn delay(&self) -> Duration {
        Duration::from_millis(self.delay_ms)
    }
}

/// Settings file for SpecFlow
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SpecFlowConfig {
    pub storage: StorageConfig,
    pub channel: ChannelPolicy,
    pub autosave: AutosaveConfig,
}

impl SpecFlowConfig {
    /// Loads the config from the provided path
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self> {
        let content = fs::read_to_string(&path)
            .with_context(|| format!("Failed to read config file: {:?}", path.as_ref()))?;

        let config: Self = serde_yaml::from_str(&content)
            .with_context(|| format!("Failed to parse config file: {:?}", path.as_ref()))?;
        config.validate()?;
        Ok(config)
    }

    /// Loads the config if the file exists, defaults otherwise
    pub fn load_or_default<P: AsRef<Path>>(path: P) -> Result<Self> {
        if path.as_ref().exists() {
            Self::load(path)
        } else {
            Ok(Self::default())
        }
    }

    /// Save the config to the specified path
    pub fn save<P: AsRef<Path>>(&self, path: P) -> Result<()> {
        let content = serde_yaml::to_string(&self)?;

        if let Some(parent) = path.as_ref().parent() {
            fs::create_dir_all(parent)?;
        }

        fs::write(&path, content)
            .with_context(|| format!("Failed to write config to {:?}", path.as_ref()))?;

        Ok(())
    }

    pub fn validate(&self) -> Result<()> {
        self.channel.validate().context("Invalid channel settings")
    }

    /// Resolves the data path: `SPECFLOW_DB`, then `storage.path`, then the
    /// platform data directory
    pub fn data_path(&self) -> Result<PathBuf> {
        if let Ok(path) = std::env::var("SPECFLOW_DB") {
            return Ok(PathBuf::from(path));
        }
        if let Some(path) = &self.storage.path {
            return Ok(path.clone());
        }
        get_default_data_path()
    }
}

/// Gets the path to the config file
pub fn get_config_path() -> Result<PathBuf> {
    if let Ok(path) = std::env::var("SPECFLOW_CONFIG") {
        return Ok(PathBuf::from(path));
    }

    let config_dir = dirs::config_dir().context("Failed to determine config directory")?;
    Ok(config_dir.join("specflow").join("config.yaml"))
}

/// Gets the default location of the data file
pub fn get_default_data_path() -> Result<PathBuf> {
    let data_dir = dirs::data_dir().context("Failed to determine data directory")?;
    Ok(data_dir.join("specflow").join("specflow.json"))
}
