//! Inbound Events and Outbound Responses
//!
//! Platform-agnostic shapes crossing the boundary between the transport and
//! the command router. Chat and message identifiers use Telegram's integer
//! representation.

use serde::{Deserialize, Serialize};

use crate::text::FormattedText;

/// An event received from the messaging platform.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum InboundEvent {
    /// A plain text message typed by the user.
    TextMessage { chat_id: i64, text: String },
    /// An inline button press.
    CallbackAction {
        chat_id: i64,
        /// Message carrying the pressed button, when still accessible.
        message_ref: Option<i64>,
        action_id: String,
        /// Platform handle that must be answered exactly once.
        query_id: String,
    },
}

impl InboundEvent {
    pub fn chat_id(&self) -> i64 {
        match self {
            InboundEvent::TextMessage { chat_id, .. } => *chat_id,
            InboundEvent::CallbackAction { chat_id, .. } => *chat_id,
        }
    }

    /// Query id to acknowledge, for callback events.
    pub fn query_id(&self) -> Option<&str> {
        match self {
            InboundEvent::TextMessage { .. } => None,
            InboundEvent::CallbackAction { query_id, .. } => Some(query_id),
        }
    }

    /// Short label used in log lines.
    pub fn kind(&self) -> &'static str {
        match self {
            InboundEvent::TextMessage { .. } => "text",
            InboundEvent::CallbackAction { .. } => "callback",
        }
    }
}

/// A single inline button. `action_id` is the stable routing key; `label` is
/// display-only.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MenuButton {
    pub label: String,
    pub action_id: String,
}

impl MenuButton {
    pub fn new(label: impl Into<String>, action_id: impl Into<String>) -> Self {
        Self {
            label: label.into(),
            action_id: action_id.into(),
        }
    }
}

/// Ordered rows of ordered buttons.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct KeyboardLayout {
    pub rows: Vec<Vec<MenuButton>>,
}

impl KeyboardLayout {
    pub fn new() -> Self {
        Self::default()
    }

    /// Append a row of buttons.
    pub fn row(mut self, buttons: Vec<MenuButton>) -> Self {
        self.rows.push(buttons);
        self
    }

    /// All action ids in display order.
    pub fn action_ids(&self) -> Vec<&str> {
        self.rows
            .iter()
            .flat_map(|row| row.iter().map(|b| b.action_id.as_str()))
            .collect()
    }

    pub fn contains_action(&self, action_id: &str) -> bool {
        self.action_ids().contains(&action_id)
    }
}

/// A message to deliver to a chat.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OutboundResponse {
    pub chat_id: i64,
    pub body: FormattedText,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub menu: Option<KeyboardLayout>,
}

impl OutboundResponse {
    pub fn new(chat_id: i64, body: FormattedText) -> Self {
        Self {
            chat_id,
            body,
            menu: None,
        }
    }

    pub fn with_menu(mut self, menu: KeyboardLayout) -> Self {
        self.menu = Some(menu);
        self
    }
}
