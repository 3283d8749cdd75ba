//! Remote Control Types
//!
//! Core types for the remote control surface including configuration,
//! lifecycle results, status tracking, and error handling.

use std::fmt;
use std::time::Duration;

use control_relay_core::config::{keys, parse_chat_id, ConfigStore};
use control_relay_core::{CoreError, CoreResult};
use serde::{Deserialize, Serialize};
use tracing::warn;

// ---------------------------------------------------------------------------
// Adapter & Configuration Types
// ---------------------------------------------------------------------------

/// Remote adapter type
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
pub enum RemoteAdapterType {
    Telegram,
}

impl fmt::Display for RemoteAdapterType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RemoteAdapterType::Telegram => write!(f, "telegram"),
        }
    }
}

/// Longest long-poll window that still ends before the Telegram client's own
/// 17 s request timeout fires.
pub const MAX_POLL_TIMEOUT_SECS: u32 = 15;

/// Relay configuration, assembled from the config store.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RelayConfig {
    #[serde(skip_serializing, default)]
    pub bot_token: Option<String>,
    /// Operator bound by an earlier trust-on-first-contact.
    pub operator_chat_id: Option<i64>,
    #[serde(skip_serializing, default)]
    pub proxy_url: Option<String>,
    #[serde(default = "default_max_message_length")]
    pub max_message_length: usize,
    /// Long-poll wait window passed to getUpdates.
    #[serde(default = "default_poll_timeout_secs")]
    pub poll_timeout_secs: u32,
    /// Upper bound for answering a callback query.
    #[serde(default = "default_ack_timeout_ms")]
    pub ack_timeout_ms: u64,
    /// How long an emergency-stop prompt stays confirmable.
    #[serde(default = "default_confirmation_timeout_secs")]
    pub confirmation_timeout_secs: u64,
    #[serde(default)]
    pub reconnect: ReconnectConfig,
}

fn default_max_message_length() -> usize {
    4000
}

fn default_poll_timeout_secs() -> u32 {
    10
}

fn default_ack_timeout_ms() -> u64 {
    5000
}

fn default_confirmation_timeout_secs() -> u64 {
    60
}

impl Default for RelayConfig {
    fn default() -> Self {
        Self {
            bot_token: None,
            operator_chat_id: None,
            proxy_url: None,
            max_message_length: default_max_message_length(),
            poll_timeout_secs: default_poll_timeout_secs(),
            ack_timeout_ms: default_ack_timeout_ms(),
            confirmation_timeout_secs: default_confirmation_timeout_secs(),
            reconnect: ReconnectConfig::default(),
        }
    }
}

impl RelayConfig {
    /// Read the relay settings from a config store, falling back to defaults
    /// for absent keys.
    pub fn from_store(store: &dyn ConfigStore) -> CoreResult<Self> {
        let mut config = Self {
            bot_token: store.get(keys::TELEGRAM_BOT_TOKEN),
            proxy_url: store.get(keys::TELEGRAM_PROXY_URL),
            ..Default::default()
        };

        if let Some(raw) = store.get(keys::TELEGRAM_CHAT_ID) {
            config.operator_chat_id = Some(parse_chat_id(&raw)?);
        }
        if let Some(raw) = store.get(keys::POLL_TIMEOUT_SECS) {
            let requested: u32 = raw.trim().parse().map_err(|_| {
                CoreError::config(format!("{} must be an integer", keys::POLL_TIMEOUT_SECS))
            })?;
            if requested > MAX_POLL_TIMEOUT_SECS {
                warn!(
                    requested,
                    max = MAX_POLL_TIMEOUT_SECS,
                    "[Config] Poll timeout exceeds the client request timeout, clamping"
                );
            }
            config.poll_timeout_secs = requested.min(MAX_POLL_TIMEOUT_SECS);
        }
        if let Some(raw) = store.get(keys::CONFIRMATION_TIMEOUT_SECS) {
            config.confirmation_timeout_secs = raw.trim().parse().map_err(|_| {
                CoreError::config(format!(
                    "{} must be an integer",
                    keys::CONFIRMATION_TIMEOUT_SECS
                ))
            })?;
        }
        Ok(config)
    }

    pub fn poll_timeout(&self) -> Duration {
        Duration::from_secs(u64::from(self.poll_timeout_secs))
    }

    pub fn ack_timeout(&self) -> Duration {
        Duration::from_millis(self.ack_timeout_ms)
    }

    pub fn confirmation_timeout(&self) -> Duration {
        Duration::from_secs(self.confirmation_timeout_secs)
    }
}

/// Retry and reconnect behaviour.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ReconnectConfig {
    /// Connection attempts made by `start()` before giving up (default: 3)
    pub max_start_attempts: u32,
    /// Length of one backoff time unit in milliseconds (default: 1000)
    pub unit_ms: u64,
    /// Units waited per failed attempt (default: 2)
    pub units_per_attempt: u64,
    /// Fixed delay before a mid-session reconnect in milliseconds (default: 5000)
    pub reconnect_delay_ms: u64,
}

impl Default for ReconnectConfig {
    fn default() -> Self {
        Self {
            max_start_attempts: 3,
            unit_ms: 1000,
            units_per_attempt: 2,
            reconnect_delay_ms: 5000,
        }
    }
}

impl ReconnectConfig {
    /// Delay after the given failed start attempt (1-based), growing linearly.
    ///
    /// Formula: `attempt * units_per_attempt * unit_ms`
    pub fn delay_for_attempt(&self, attempt: u32) -> Duration {
        let units = u64::from(attempt).saturating_mul(self.units_per_attempt);
        Duration::from_millis(units.saturating_mul(self.unit_ms))
    }

    pub fn reconnect_delay(&self) -> Duration {
        Duration::from_millis(self.reconnect_delay_ms)
    }
}

// ---------------------------------------------------------------------------
// Lifecycle Types
// ---------------------------------------------------------------------------

/// Identity reported by the platform for the bot token.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BotIdentity {
    pub id: u64,
    pub username: String,
}

/// Returned by a successful `start()`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Ready {
    pub bot: BotIdentity,
    /// Attempts it took to pass the identity probe.
    pub attempts: u32,
}

/// Returned by `stop()`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Stopped {
    /// False when the call was a no-op.
    pub was_running: bool,
}

/// Connection runtime status
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ConnectionStatus {
    pub running: bool,
    pub starting: bool,
    pub adapter_type: RemoteAdapterType,
    pub connected_since: Option<String>,
    pub authorized_chat_id: Option<i64>,
    pub total_events_processed: u64,
    pub last_event_at: Option<String>,
    /// Reconnects scheduled since the last successful receive
    #[serde(default)]
    pub reconnect_attempts: u32,
    /// Whether a delayed reconnect is pending
    #[serde(default)]
    pub reconnecting: bool,
    pub last_error: Option<String>,
    #[serde(default)]
    pub last_error_at: Option<String>,
}

impl Default for ConnectionStatus {
    fn default() -> Self {
        Self {
            running: false,
            starting: false,
            adapter_type: RemoteAdapterType::Telegram,
            connected_since: None,
            authorized_chat_id: None,
            total_events_processed: 0,
            last_event_at: None,
            reconnect_attempts: 0,
            reconnecting: false,
            last_error: None,
            last_error_at: None,
        }
    }
}

// ---------------------------------------------------------------------------
// Error Types
// ---------------------------------------------------------------------------

/// Transport-level errors reported by adapters.
#[derive(Debug, Clone, thiserror::Error)]
pub enum RemoteError {
    #[error("Bot token is not configured")]
    MissingCredential,

    #[error("Transient transport error: {0}")]
    Transient(String),

    #[error("Platform rejected the bot credentials: {0}")]
    PermanentCredential(String),

    #[error("Failed to send message: {0}")]
    SendFailed(String),
}

impl RemoteError {
    /// Whether retrying can never succeed without operator intervention.
    pub fn is_permanent(&self) -> bool {
        matches!(
            self,
            RemoteError::MissingCredential | RemoteError::PermanentCredential(_)
        )
    }
}

/// Errors returned by `start()`.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum StartError {
    #[error("Connection is already starting or connected")]
    AlreadyStarting,

    #[error("Bot token is not configured")]
    MissingCredential,

    #[error("Platform rejected the bot credentials: {0}")]
    PermanentCredential(String),

    #[error("Gave up after {attempts} connection attempts: {last_error}")]
    RetriesExhausted { attempts: u32, last_error: String },

    #[error("Start was cancelled by stop()")]
    Cancelled,
}

/// Errors returned by `stop()`.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum StopError {
    #[error("Background task failed during shutdown: {0}")]
    TaskFailed(String),
}

/// Failure inside a command handler; never shown to the operator verbatim.
#[derive(Debug, thiserror::Error)]
pub enum HandlerError {
    #[error("Control system call failed: {0}")]
    Control(#[from] CoreError),

    #[error("Handler aborted: {0}")]
    Aborted(String),
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
