//! Services
//!
//! The remote control surface and the control-system client it drives.

pub mod control;
pub mod remote;
