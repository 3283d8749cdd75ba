//! Remote Control
//!
//! Lets a single operator drive the control system from a Telegram chat.
//!
//! ## Architecture
//!
//! ```text
//! Telegram → RemoteAdapter.receive() → poll loop → mpsc → dispatch loop
//!                                                           ↓
//!                                              CommandRouter.on_event()
//!                                                           ↓
//!                                      ControlSystem / ConfirmationFlow
//!                                                           ↓
//!                                   ResponseMapper → RemoteAdapter.send_message()
//! ```
//!
//! The [`connection_manager::ConnectionManager`] owns the lifecycle and is
//! the only writer of the connection flags in [`session::Session`].

pub mod adapters;
pub mod command_router;
pub mod confirmation;
pub mod connection_manager;
pub mod response_mapper;
pub mod session;
pub mod types;

#[cfg(test)]
pub(crate) mod testing;

pub use connection_manager::ConnectionManager;
pub use types::*;
