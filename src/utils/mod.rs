//! Utilities
//!
//! Error types and path helpers used throughout the relay.

pub mod error;
pub mod paths;

pub use error::*;
pub use paths::*;
