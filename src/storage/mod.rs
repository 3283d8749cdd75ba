//! Storage Layer
//!
//! Handles settings persistence: the JSON config file with environment overrides.

pub mod config;

pub use config::*;
