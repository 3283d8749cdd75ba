//! Session State
//!
//! The live connection state shared between the connection manager and the
//! command router. Lifecycle flags are only flipped by the connection manager;
//! the router owns operator binding and per-chat confirmation state.

use std::collections::HashMap;
use std::sync::Arc;

use tokio::sync::RwLock;

use super::confirmation::PendingConfirmation;

/// Handle passed to the router and the background loops.
pub type SharedSession = Arc<RwLock<Session>>;

/// Outcome of the authorization gate for one inbound chat.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OperatorCheck {
    /// No operator was bound; this chat has just become the operator.
    Bound,
    /// The chat is the bound operator.
    Authorized,
    /// The chat is not the operator.
    Unauthorized { operator: i64 },
}

/// Live connection state.
///
/// `starting` and `connected` are never both true.
#[derive(Debug, Default)]
pub struct Session {
    connected: bool,
    starting: bool,
    authorized_chat_id: Option<i64>,
    retry_count: u32,
    update_offset: Option<i64>,
    pub(crate) pending_confirmations: HashMap<i64, PendingConfirmation>,
}

impl Session {
    pub fn new(authorized_chat_id: Option<i64>) -> Self {
        Self {
            authorized_chat_id,
            ..Default::default()
        }
    }

    pub fn shared(authorized_chat_id: Option<i64>) -> SharedSession {
        Arc::new(RwLock::new(Self::new(authorized_chat_id)))
    }

    pub fn is_connected(&self) -> bool {
        self.connected
    }

    pub fn is_starting(&self) -> bool {
        self.starting
    }

    pub fn authorized_chat_id(&self) -> Option<i64> {
        self.authorized_chat_id
    }

    pub fn retry_count(&self) -> u32 {
        self.retry_count
    }

    /// Offset of the first update not yet consumed. Survives stop and
    /// restart so a new poll loop never re-reads a handled batch.
    pub fn update_offset(&self) -> Option<i64> {
        self.update_offset
    }

    /// Advance the stored offset. Never moves backwards.
    pub fn record_offset(&mut self, offset: Option<i64>) {
        if offset > self.update_offset {
            self.update_offset = offset;
        }
    }

    /// Enter `starting`. Returns false when already starting or connected.
    pub fn begin_start(&mut self) -> bool {
        if self.starting || self.connected {
            return false;
        }
        self.starting = true;
        self.retry_count = 0;
        true
    }

    pub fn mark_connected(&mut self) {
        self.starting = false;
        self.connected = true;
        self.retry_count = 0;
    }

    /// Leave `starting` after a failed start.
    pub fn abort_start(&mut self) {
        self.starting = false;
    }

    /// Clear both lifecycle flags. Returns whether anything was running.
    pub fn mark_stopped(&mut self) -> bool {
        let was_running = self.connected || self.starting;
        self.connected = false;
        self.starting = false;
        self.pending_confirmations.clear();
        was_running
    }

    /// Count one more failed attempt and return the new total.
    pub fn record_retry(&mut self) -> u32 {
        self.retry_count = self.retry_count.saturating_add(1);
        self.retry_count
    }

    pub fn reset_retries(&mut self) {
        self.retry_count = 0;
    }

    /// Apply trust-on-first-contact: the first chat seen becomes the operator
    /// and the binding never changes afterwards.
    pub fn check_operator(&mut self, chat_id: i64) -> OperatorCheck {
        match self.authorized_chat_id {
            None => {
                self.authorized_chat_id = Some(chat_id);
                OperatorCheck::Bound
            }
            Some(operator) if operator == chat_id => OperatorCheck::Authorized,
            Some(operator) => OperatorCheck::Unauthorized { operator },
        }
    }

    /// External reset of the operator binding.
    pub fn reset_operator(&mut self) {
        self.authorized_chat_id = None;
        self.pending_confirmations.clear();
    }
}
