//! Telegram Adapter
//!
//! Telegram Bot adapter built on teloxide. Long-polls `getUpdates` for
//! messages and callback queries, sends HTML messages with inline keyboards,
//! and splits bodies at Telegram's message length limit.

use std::time::Duration;

use async_trait::async_trait;
use control_relay_core::{InboundEvent, KeyboardLayout};
use teloxide::prelude::*;
use teloxide::types::{
    AllowedUpdate, CallbackQuery, CallbackQueryId, InlineKeyboardButton, InlineKeyboardMarkup,
    MaybeInaccessibleMessage, ParseMode, UpdateKind,
};
use teloxide::{ApiError, RequestError};

use super::{ReceivedBatch, RemoteAdapter};
use crate::services::remote::types::{BotIdentity, RelayConfig, RemoteAdapterType, RemoteError};

/// Telegram Bot adapter using teloxide with long-polling.
pub struct TelegramAdapter {
    pub(crate) bot: teloxide::Bot,
    pub(crate) max_message_length: usize,
}

impl TelegramAdapter {
    /// Create a new Telegram adapter.
    ///
    /// teloxide builds its own reqwest client and reads HTTPS_PROXY/HTTP_PROXY
    /// when doing so, so a configured proxy is exported before the bot is
    /// created.
    pub fn new(config: &RelayConfig) -> Result<Self, RemoteError> {
        let bot_token = config
            .bot_token
            .as_deref()
            .filter(|t| !t.trim().is_empty())
            .ok_or(RemoteError::MissingCredential)?;

        if let Some(proxy_url) = config.proxy_url.as_deref() {
            std::env::set_var("HTTPS_PROXY", proxy_url);
            std::env::set_var("HTTP_PROXY", proxy_url);
        }

        Ok(Self {
            bot: teloxide::Bot::new(bot_token),
            max_message_length: config.max_message_length,
        })
    }

    fn callback_event(query: CallbackQuery) -> Option<InboundEvent> {
        let action_id = query.data?;
        let (chat_id, message_ref) = match &query.message {
            Some(MaybeInaccessibleMessage::Regular(msg)) => {
                (msg.chat.id.0, Some(i64::from(msg.id.0)))
            }
            // Private chats share the user's id
            _ => (query.from.id.0 as i64, None),
        };
        Some(InboundEvent::CallbackAction {
            chat_id,
            message_ref,
            action_id,
            query_id: query.id.to_string(),
        })
    }
}

/// Map a teloxide request error onto the transport error taxonomy.
pub fn classify_request_error(err: &RequestError) -> RemoteError {
    match err {
        RequestError::Api(ApiError::InvalidToken) => {
            RemoteError::PermanentCredential(err.to_string())
        }
        _ => RemoteError::Transient(err.to_string()),
    }
}

/// Convert a keyboard layout into Telegram's inline keyboard markup.
pub fn to_inline_keyboard(menu: &KeyboardLayout) -> InlineKeyboardMarkup {
    InlineKeyboardMarkup::new(menu.rows.iter().map(|row| {
        row.iter()
            .map(|button| {
                InlineKeyboardButton::callback(button.label.clone(), button.action_id.clone())
            })
            .collect::<Vec<_>>()
    }))
}

/// Split long messages at line boundaries to respect platform limits.
///
/// Lengths are counted in characters; a single line longer than `max_len`
/// is hard-split on character boundaries.
pub fn split_message(text: &str, max_len: usize) -> Vec<String> {
    if text.chars().count() <= max_len {
        return vec![text.to_string()];
    }

    let mut chunks = Vec::new();
    let mut current = String::new();
    let mut current_len = 0;

    for line in text.lines() {
        let line_len = line.chars().count();
        if current_len + line_len + 1 > max_len && !current.is_empty() {
            chunks.push(std::mem::take(&mut current));
            current_len = 0;
        }
        if line_len > max_len {
            let chars: Vec<char> = line.chars().collect();
            for piece in chars.chunks(max_len) {
                chunks.push(piece.iter().collect());
            }
            continue;
        }
        if !current.is_empty() {
            current.push('\n');
            current_len += 1;
        }
        current.push_str(line);
        current_len += line_len;
    }

    if !current.is_empty() {
        chunks.push(current);
    }

    chunks
}

#[async_trait]
impl RemoteAdapter for TelegramAdapter {
    fn adapter_type(&self) -> RemoteAdapterType {
        RemoteAdapterType::Telegram
    }

    async fn identify(&self) -> Result<BotIdentity, RemoteError> {
        let me = self
            .bot
            .get_me()
            .await
            .map_err(|e| classify_request_error(&e))?;
        Ok(BotIdentity {
            id: me.user.id.0,
            username: me.user.username.clone().unwrap_or_default(),
        })
    }

    async fn receive(
        &self,
        offset: Option<i64>,
        timeout: Duration,
    ) -> Result<ReceivedBatch, RemoteError> {
        let timeout_secs = u32::try_from(timeout.as_secs()).unwrap_or(u32::MAX);
        let mut request = self
            .bot
            .get_updates()
            .timeout(timeout_secs)
            .allowed_updates(vec![AllowedUpdate::Message, AllowedUpdate::CallbackQuery]);
        if let Some(offset) = offset {
            request = request.offset(offset as i32);
        }
        if timeout.is_zero() {
            // Confirmation call; anything it returns is delivered again later
            request = request.limit(1);
        }

        let updates = request.await.map_err(|e| classify_request_error(&e))?;

        let mut batch = ReceivedBatch {
            events: Vec::with_capacity(updates.len()),
            next_offset: offset,
        };
        for update in updates {
            batch.next_offset = Some(i64::from(update.id.0) + 1);
            match update.kind {
                UpdateKind::Message(msg) => {
                    if let Some(text) = msg.text() {
                        batch.events.push(InboundEvent::TextMessage {
                            chat_id: msg.chat.id.0,
                            text: text.to_string(),
                        });
                    }
                }
                UpdateKind::CallbackQuery(query) => {
                    if let Some(event) = Self::callback_event(query) {
                        batch.events.push(event);
                    }
                }
                _ => {}
            }
        }
        Ok(batch)
    }

    async fn send_message(
        &self,
        chat_id: i64,
        html: &str,
        menu: Option<&KeyboardLayout>,
    ) -> Result<(), RemoteError> {
        let chunks = split_message(html, self.max_message_length);
        let last = chunks.len().saturating_sub(1);
        for (index, chunk) in chunks.into_iter().enumerate() {
            let mut request = self
                .bot
                .send_message(ChatId(chat_id), chunk)
                .parse_mode(ParseMode::Html);
            // Keyboard goes on the final chunk so it sits under the full body
            if index == last {
                if let Some(menu) = menu {
                    request = request.reply_markup(to_inline_keyboard(menu));
                }
            }
            request
                .await
                .map_err(|e| RemoteError::SendFailed(e.to_string()))?;
        }
        Ok(())
    }

    async fn answer_callback(
        &self,
        query_id: &str,
        text: Option<&str>,
    ) -> Result<(), RemoteError> {
        let mut request = self
            .bot
            .answer_callback_query(CallbackQueryId(query_id.to_string()));
        if let Some(text) = text {
            request = request.text(text);
        }
        request
            .await
            .map_err(|e| RemoteError::SendFailed(e.to_string()))?;
        Ok(())
    }
}
