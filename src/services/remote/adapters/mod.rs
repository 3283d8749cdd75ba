//! Remote Adapters
//!
//! Trait definition for messaging platform transports.
//! Each adapter implements platform-specific receiving, sending and
//! acknowledgment; lifecycle and retry policy live in the connection manager.

pub mod telegram;

use std::time::Duration;

use async_trait::async_trait;
use control_relay_core::{InboundEvent, KeyboardLayout};

use super::types::{BotIdentity, RemoteAdapterType, RemoteError};

/// Events returned by one long-poll round.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ReceivedBatch {
    pub events: Vec<InboundEvent>,
    /// Offset for the next receive; advances past every update seen,
    /// including ones that produced no event.
    pub next_offset: Option<i64>,
}

/// Remote adapter trait for platform-specific message handling.
///
/// Adapters are responsible for:
/// - Verifying the bot identity (fail fast on bad credentials)
/// - Long-polling the platform for new events
/// - Sending formatted responses with an optional inline menu
/// - Answering button presses
///
/// Errors must be classified: `PermanentCredential` when the platform
/// rejects the token, `Transient` for anything worth retrying.
#[async_trait]
pub trait RemoteAdapter: Send + Sync {
    /// Adapter type identifier
    fn adapter_type(&self) -> RemoteAdapterType;

    /// Identity probe. For Telegram, this calls the getMe API.
    async fn identify(&self) -> Result<BotIdentity, RemoteError>;

    /// Block for up to `timeout` waiting for new events after `offset`.
    ///
    /// A zero timeout returns at once; the call still acknowledges every
    /// update before `offset` with the platform.
    async fn receive(
        &self,
        offset: Option<i64>,
        timeout: Duration,
    ) -> Result<ReceivedBatch, RemoteError>;

    /// Send an HTML-formatted message, attaching `menu` as an inline keyboard.
    ///
    /// Must handle platform-specific message length limits by splitting
    /// long messages as needed.
    async fn send_message(
        &self,
        chat_id: i64,
        html: &str,
        menu: Option<&KeyboardLayout>,
    ) -> Result<(), RemoteError>;

    /// Acknowledge a button press, optionally with a short toast text.
    async fn answer_callback(&self, query_id: &str, text: Option<&str>)
        -> Result<(), RemoteError>;
}
