//! Control System Collaborator
//!
//! The external system being remote-controlled. Only read-only snapshots and
//! command outcomes cross this boundary; session and confirmation state never
//! do.

use std::collections::BTreeMap;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::error::CoreResult;

/// Command names understood by the control system.
pub mod commands {
    pub const EMERGENCY_STOP: &str = "emergency_stop";
    pub const START_HARVESTER: &str = "start_harvester";
    pub const STOP_HARVESTER: &str = "stop_harvester";
}

/// Result of `execute_command`, reported to the operator verbatim.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CommandOutcome {
    pub success: bool,
    pub message: String,
}

impl CommandOutcome {
    pub fn ok(message: impl Into<String>) -> Self {
        Self {
            success: true,
            message: message.into(),
        }
    }

    pub fn failed(message: impl Into<String>) -> Self {
        Self {
            success: false,
            message: message.into(),
        }
    }
}

/// Security counters included in the status snapshot.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct SecuritySummary {
    #[serde(default)]
    pub events: u64,
}

/// Snapshot returned by `get_system_status`.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct SystemStatus {
    pub runtime: String,
    pub status: String,
    pub version: String,
    /// Module name to module state (usually a bool or a short string).
    #[serde(default)]
    pub modules: BTreeMap<String, Value>,
    #[serde(default)]
    pub security: SecuritySummary,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SystemMetrics {
    /// Uptime in seconds.
    pub uptime: u64,
    pub active_modules: u32,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SecurityMetrics {
    pub security_level: String,
}

/// Snapshot returned by `get_detailed_metrics`.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct DetailedMetrics {
    pub system: SystemMetrics,
    pub security: SecurityMetrics,
    #[serde(default)]
    pub harvester: BTreeMap<String, Value>,
    #[serde(default)]
    pub performance: BTreeMap<String, Value>,
}

/// The controlled system.
///
/// Every method is fallible: the accessors may be unavailable, and callers
/// must degrade to a fixed message instead of failing the whole event.
#[async_trait]
pub trait ControlSystem: Send + Sync {
    /// Run a named command (`emergency_stop`, `start_<module>`, `stop_<module>`).
    async fn execute_command(&self, name: &str) -> CoreResult<CommandOutcome>;

    /// Read the current status snapshot.
    async fn get_system_status(&self) -> CoreResult<SystemStatus>;

    /// Read the detailed metrics snapshot.
    async fn get_detailed_metrics(&self) -> CoreResult<DetailedMetrics>;
}
