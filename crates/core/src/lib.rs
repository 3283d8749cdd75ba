//! Control Relay Core
//!
//! Foundational types and collaborator traits for the Control Relay workspace.
//! This crate has zero dependencies on the transport or runtime stack
//! (teloxide, tokio, reqwest).
//!
//! ## Module Organization
//!
//! - `error` - Core error types (`CoreError`, `CoreResult`)
//! - `event` - Inbound events, outbound responses and inline keyboard layouts
//! - `text` - Minimal formatted text (bold, line breaks) and HTML rendering
//! - `control` - The controlled-system trait and its snapshot types
//! - `config` - Key/value configuration store trait and an in-memory store
//!
//! ## Design Principles
//!
//! 1. **Zero external dependencies beyond serde/async-trait/thiserror**
//! 2. **Trait-based collaborators** - the router and connection manager are
//!    testable without a live transport or control system

pub mod config;
pub mod control;
pub mod error;
pub mod event;
pub mod text;

// ── Error Types ────────────────────────────────────────────────────────
pub use error::{CoreError, CoreResult};

// ── Events & Responses ─────────────────────────────────────────────────
pub use event::{InboundEvent, KeyboardLayout, MenuButton, OutboundResponse};
pub use text::{FormattedText, TextSpan};

// ── Collaborators ──────────────────────────────────────────────────────
pub use config::{ConfigStore, MemoryConfigStore};
pub use control::{
    CommandOutcome, ControlSystem, DetailedMetrics, SecurityMetrics, SecuritySummary,
    SystemMetrics, SystemStatus,
};
