//! Confirmation Flow
//!
//! Per-chat two-step guard for destructive commands:
//!
//! ```text
//! Idle --emergency_stop--> AwaitingConfirmation --confirm_emergency--> Idle (+ execute)
//!                                   |
//!                                   +--any other action / timeout--> Idle
//! ```
//!
//! State lives in the [`Session`]; nothing here is persisted.

use std::time::{Duration, Instant};

use super::session::Session;

/// Observable state of one chat.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConfirmationState {
    Idle,
    AwaitingConfirmation,
}

/// A destructive action waiting for its second acknowledgment.
#[derive(Debug, Clone, Copy)]
pub struct PendingConfirmation {
    pub requested_at: Instant,
}

/// How an incoming action resolved a chat's confirmation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Resolution {
    /// The confirmation was pending and is now consumed.
    Confirmed,
    /// The pending confirmation was dropped by an unrelated action.
    Cancelled,
    /// Nothing (or only an expired prompt) was pending.
    NothingPending,
}

/// Confirmation state machine with an expiry window.
#[derive(Debug, Clone, Copy)]
pub struct ConfirmationFlow {
    timeout: Duration,
}

impl ConfirmationFlow {
    pub fn new(timeout: Duration) -> Self {
        Self { timeout }
    }

    pub fn state(&self, session: &Session, chat_id: i64) -> ConfirmationState {
        match session.pending_confirmations.get(&chat_id) {
            Some(pending) if !self.is_expired(pending) => ConfirmationState::AwaitingConfirmation,
            _ => ConfirmationState::Idle,
        }
    }

    /// `Idle -> AwaitingConfirmation`. Re-requesting restarts the window.
    pub fn request(&self, session: &mut Session, chat_id: i64) {
        session.pending_confirmations.insert(
            chat_id,
            PendingConfirmation {
                requested_at: Instant::now(),
            },
        );
    }

    /// Consume a pending confirmation for a confirming action.
    pub fn confirm(&self, session: &mut Session, chat_id: i64) -> Resolution {
        match session.pending_confirmations.remove(&chat_id) {
            Some(pending) if !self.is_expired(&pending) => Resolution::Confirmed,
            _ => Resolution::NothingPending,
        }
    }

    /// Drop any pending confirmation because a different action arrived.
    pub fn cancel(&self, session: &mut Session, chat_id: i64) -> Resolution {
        match session.pending_confirmations.remove(&chat_id) {
            Some(pending) if !self.is_expired(&pending) => Resolution::Cancelled,
            _ => Resolution::NothingPending,
        }
    }

    fn is_expired(&self, pending: &PendingConfirmation) -> bool {
        pending.requested_at.elapsed() > self.timeout
    }
}
