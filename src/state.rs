//! Application State
//!
//! Wires the config store, the Telegram adapter and the control-system client
//! into a connection manager.

use std::path::PathBuf;
use std::sync::Arc;

use control_relay_core::config::keys;
use control_relay_core::ConfigStore;
use tracing::{info, warn};

use crate::services::control::{HttpControlSystem, DEFAULT_CONTROL_API_URL};
use crate::services::remote::adapters::telegram::TelegramAdapter;
use crate::services::remote::adapters::RemoteAdapter;
use crate::services::remote::{BotIdentity, ConnectionManager, RelayConfig};
use crate::storage::JsonConfigStore;
use crate::utils::error::AppResult;

/// Result of clearing the operator binding.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OperatorReset {
    /// Operator that was bound before the reset.
    pub previous: Option<i64>,
    /// Chat id still set in the environment. It outranks the config file, so
    /// the next run binds this chat again.
    pub pinned_by_env: Option<String>,
}

/// Process-wide state shared by the CLI subcommands.
pub struct AppState {
    store: Arc<dyn ConfigStore>,
    config: RelayConfig,
}

impl AppState {
    /// Load settings from `config_path`, or the default config file.
    pub fn load(config_path: Option<PathBuf>) -> AppResult<Self> {
        let store = match config_path {
            Some(path) => JsonConfigStore::open(path)?,
            None => JsonConfigStore::open_default()?,
        };
        info!(path = %store.path().display(), "[AppState] Config store opened");
        Self::from_store(Arc::new(store))
    }

    pub fn from_store(store: Arc<dyn ConfigStore>) -> AppResult<Self> {
        let config = RelayConfig::from_store(store.as_ref())?;
        Ok(Self { store, config })
    }

    pub fn config(&self) -> &RelayConfig {
        &self.config
    }

    /// Control API base URL, falling back to the local default.
    pub fn control_api_url(&self) -> String {
        self.store
            .get(keys::CONTROL_API_URL)
            .unwrap_or_else(|| DEFAULT_CONTROL_API_URL.to_string())
    }

    fn adapter(&self) -> AppResult<Arc<dyn RemoteAdapter>> {
        Ok(Arc::new(TelegramAdapter::new(&self.config)?))
    }

    /// Build a connection manager over the Telegram adapter and HTTP control API.
    pub fn connection_manager(&self) -> AppResult<ConnectionManager> {
        let control = Arc::new(HttpControlSystem::new(self.control_api_url())?);
        Ok(ConnectionManager::new(
            self.config.clone(),
            self.adapter()?,
            control,
            self.store.clone(),
        ))
    }

    /// Single identity probe, without retries.
    pub async fn probe(&self) -> AppResult<BotIdentity> {
        Ok(self.adapter()?.identify().await?)
    }

    /// Forget the bound operator in persistent config.
    pub fn reset_operator(&self) -> AppResult<OperatorReset> {
        self.reset_operator_with(|key| std::env::var(key).ok())
    }

    fn reset_operator_with(
        &self,
        env: impl Fn(&str) -> Option<String>,
    ) -> AppResult<OperatorReset> {
        let previous = self.config.operator_chat_id;
        self.store.remove(keys::TELEGRAM_CHAT_ID)?;

        let pinned_by_env = env(keys::TELEGRAM_CHAT_ID).filter(|v| !v.trim().is_empty());
        if let Some(pinned) = &pinned_by_env {
            warn!(
                chat_id = %pinned,
                "[AppState] {} is set in the environment, the reset has no effect until it is unset",
                keys::TELEGRAM_CHAT_ID
            );
        }
        Ok(OperatorReset {
            previous,
            pinned_by_env,
        })
    }
}
