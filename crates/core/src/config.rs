//! Configuration Store
//!
//! Key/value configuration collaborator. The bot token is read from it at
//! startup and the operator chat id is written to it once when
//! trust-on-first-contact binds an operator.

use std::collections::HashMap;
use std::sync::RwLock;

use crate::error::{CoreError, CoreResult};

/// Well-known configuration keys.
pub mod keys {
    pub const TELEGRAM_BOT_TOKEN: &str = "TELEGRAM_BOT_TOKEN";
    pub const TELEGRAM_CHAT_ID: &str = "TELEGRAM_CHAT_ID";
    pub const TELEGRAM_PROXY_URL: &str = "TELEGRAM_PROXY_URL";
    pub const CONTROL_API_URL: &str = "CONTROL_API_URL";
    pub const POLL_TIMEOUT_SECS: &str = "POLL_TIMEOUT_SECS";
    pub const CONFIRMATION_TIMEOUT_SECS: &str = "CONFIRMATION_TIMEOUT_SECS";
}

/// Key/value configuration storage.
pub trait ConfigStore: Send + Sync {
    /// Read a value; empty strings are reported as absent.
    fn get(&self, key: &str) -> Option<String>;

    /// Write a value through to the backing storage.
    fn set(&self, key: &str, value: &str) -> CoreResult<()>;

    /// Remove a value.
    fn remove(&self, key: &str) -> CoreResult<()>;
}

/// Parse a stored chat id.
pub fn parse_chat_id(raw: &str) -> CoreResult<i64> {
    raw.trim()
        .parse::<i64>()
        .map_err(|e| CoreError::parse(format!("invalid chat id '{}': {}", raw, e)))
}

/// In-process store, used by tests and embedders without a config file.
#[derive(Debug, Default)]
pub struct MemoryConfigStore {
    values: RwLock<HashMap<String, String>>,
}

impl MemoryConfigStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Build a store pre-populated with the given pairs.
    pub fn with_values<I, K, V>(pairs: I) -> Self
    where
        I: IntoIterator<Item = (K, V)>,
        K: Into<String>,
        V: Into<String>,
    {
        let values = pairs
            .into_iter()
            .map(|(k, v)| (k.into(), v.into()))
            .collect();
        Self {
            values: RwLock::new(values),
        }
    }
}

impl ConfigStore for MemoryConfigStore {
    fn get(&self, key: &str) -> Option<String> {
        let values = self.values.read().ok()?;
        values.get(key).filter(|v| !v.is_empty()).cloned()
    }

    fn set(&self, key: &str, value: &str) -> CoreResult<()> {
        let mut values = self
            .values
            .write()
            .map_err(|_| CoreError::config("config store lock poisoned"))?;
        values.insert(key.to_string(), value.to_string());
        Ok(())
    }

    fn remove(&self, key: &str) -> CoreResult<()> {
        let mut values = self
            .values
            .write()
            .map_err(|_| CoreError::config("config store lock poisoned"))?;
        values.remove(key);
        Ok(())
    }
}
