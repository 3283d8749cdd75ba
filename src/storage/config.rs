//! JSON Configuration Store
//!
//! Flat key/value settings persisted in ~/.control-relay/config.json.
//! Environment variables of the same name take precedence over the file, so
//! the relay can run from a pure environment without ever writing config.

use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::{PoisonError, RwLock};

use control_relay_core::{ConfigStore, CoreResult};
use tracing::debug;

use crate::utils::error::AppResult;
use crate::utils::paths::{config_path, ensure_dir};

/// Config store backed by a JSON object of string values.
#[derive(Debug)]
pub struct JsonConfigStore {
    config_path: PathBuf,
    values: RwLock<BTreeMap<String, String>>,
    env_override: bool,
}

impl JsonConfigStore {
    /// Open the default config file, creating its directory if needed.
    pub fn open_default() -> AppResult<Self> {
        Self::open(config_path()?)
    }

    /// Open a config file; a missing file starts out empty.
    pub fn open(path: impl Into<PathBuf>) -> AppResult<Self> {
        let config_path = path.into();
        if let Some(parent) = config_path.parent() {
            ensure_dir(parent)?;
        }
        let values = if config_path.exists() {
            Self::load_from_file(&config_path)?
        } else {
            BTreeMap::new()
        };
        debug!(path = %config_path.display(), keys = values.len(), "[Config] Loaded");
        Ok(Self {
            config_path,
            values: RwLock::new(values),
            env_override: true,
        })
    }

    /// Disable the environment override (file values only).
    pub fn without_env(mut self) -> Self {
        self.env_override = false;
        self
    }

    pub fn path(&self) -> &Path {
        &self.config_path
    }

    /// Load configuration from a file
    fn load_from_file(path: &Path) -> AppResult<BTreeMap<String, String>> {
        let content = fs::read_to_string(path)?;
        if content.trim().is_empty() {
            return Ok(BTreeMap::new());
        }
        Ok(serde_json::from_str(&content)?)
    }

    /// Save configuration to a file with pretty formatting
    fn save_to_file(path: &Path, values: &BTreeMap<String, String>) -> AppResult<()> {
        let content = serde_json::to_string_pretty(values)?;
        fs::write(path, content)?;
        Ok(())
    }

    fn update(&self, apply: impl FnOnce(&mut BTreeMap<String, String>)) -> AppResult<()> {
        let mut values = self.values.write().unwrap_or_else(PoisonError::into_inner);
        apply(&mut values);
        Self::save_to_file(&self.config_path, &values)
    }
}

impl ConfigStore for JsonConfigStore {
    fn get(&self, key: &str) -> Option<String> {
        if self.env_override {
            if let Ok(value) = std::env::var(key) {
                if !value.trim().is_empty() {
                    return Some(value);
                }
            }
        }
        self.values
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .get(key)
            .filter(|v| !v.trim().is_empty())
            .cloned()
    }

    fn set(&self, key: &str, value: &str) -> CoreResult<()> {
        self.update(|values| {
            values.insert(key.to_string(), value.to_string());
        })?;
        Ok(())
    }

    fn remove(&self, key: &str) -> CoreResult<()> {
        self.update(|values| {
            values.remove(key);
        })?;
        Ok(())
    }
}
