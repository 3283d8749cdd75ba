//! Control Relay - Telegram Remote Control Library
//!
//! This library lets a single operator drive an external control system from a
//! Telegram chat. It includes:
//! - The connection manager (start/stop, retry, long-polling)
//! - The command router with trust-on-first-contact authorization
//! - The confirmation flow guarding the emergency stop
//! - The HTTP control-system client and JSON config store

pub mod services;
pub mod state;
pub mod storage;
pub mod utils;

pub use services::control::HttpControlSystem;
pub use services::remote::{
    ConnectionManager, ConnectionStatus, Ready, RelayConfig, StartError, StopError, Stopped,
};
pub use state::{AppState, OperatorReset};
pub use storage::JsonConfigStore;
pub use utils::error::{AppError, AppResult};
