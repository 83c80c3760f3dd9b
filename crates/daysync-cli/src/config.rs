//! Config and store file locations.
//!
//! The engine config lives at `~/.config/daysync/config.toml` by default and
//! the local store at `~/.local/share/daysync/store.json`. Both can be
//! overridden with `--config` / `DAYSYNC_CONFIG` and `--store` /
//! `DAYSYNC_STORE`.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use daysync_engine::{EngineConfig, Settings};
use daysync_store::LocalStore;

use crate::error::CliResult;

/// Resolved paths for one invocation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Paths {
    pub config: PathBuf,
    pub store: PathBuf,
}

impl Paths {
    /// Applies overrides on top of the defaults.
    pub fn resolve(config: Option<PathBuf>, store: Option<PathBuf>) -> Self {
        Self {
            config: config.unwrap_or_else(default_config_path),
            store: store.unwrap_or_else(default_store_path),
        }
    }

    /// Loads the raw config file.
    pub fn load_config(&self) -> CliResult<EngineConfig> {
        Ok(EngineConfig::load(&self.config)?)
    }

    /// Loads and validates the config.
    pub fn load_settings(&self) -> CliResult<(EngineConfig, Arc<Settings>)> {
        let config = self.load_config()?;
        let settings = config.validate()?;
        Ok((config, Arc::new(settings)))
    }

    /// Opens the JSON store, creating it on first write.
    pub fn open_store(&self) -> CliResult<Arc<LocalStore>> {
        Ok(Arc::new(LocalStore::open(&self.store)?))
    }
}

/// Returns the default configuration file path.
pub fn default_config_path() -> PathBuf {
    default_config_dir().join("config.toml")
}

/// Returns the default configuration directory.
pub fn default_config_dir() -> PathBuf {
    dirs::config_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join("daysync")
}

/// Returns the default store file path.
pub fn default_store_path() -> PathBuf {
    dirs::data_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join("daysync")
        .join("store.json")
}

/// Returns the records file for a source inside a directory.
pub fn records_file(dir: &Path, source_key: &str) -> PathBuf {
    dir.join(format!("{source_key}.json"))
}
