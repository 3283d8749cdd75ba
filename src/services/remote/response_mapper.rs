//! Response Mapper
//!
//! Converts control-system snapshots and command outcomes into chat-friendly
//! formatted text, and builds the two-level inline menu.

use std::collections::BTreeMap;

use control_relay_core::{
    CommandOutcome, DetailedMetrics, FormattedText, KeyboardLayout, MenuButton, SystemStatus,
};
use serde_json::Value;

use super::command_router::Action;

/// Fixed reply for chats other than the bound operator.
pub const UNAUTHORIZED_TEXT: &str = "⛔ Unauthorized. This bot is bound to another operator.";

/// Toast shown on unauthorized button presses.
pub const UNAUTHORIZED_ACK: &str = "Unauthorized";

/// Fixed reply when a handler fails.
pub const ERROR_TEXT: &str = "❌ Error processing request. Please try again.";

/// Reply for text that is not a known command.
pub const USAGE_TEXT: &str = "Unknown command. Use /menu to open the control menu or /help for the command list.";

/// Reply for a confirmation that has nothing pending.
pub const NOTHING_TO_CONFIRM_TEXT: &str = "Nothing to confirm. Open the control panel to request an emergency stop.";

/// Response mapper for remote platform display.
pub struct ResponseMapper;

impl ResponseMapper {
    fn button(action: Action, label: &str) -> MenuButton {
        MenuButton::new(label, action.action_id())
    }

    /// Top-level menu with the six primary actions.
    pub fn main_menu() -> KeyboardLayout {
        KeyboardLayout::new()
            .row(vec![
                Self::button(Action::Status, "📊 Status"),
                Self::button(Action::Metrics, "📈 Metrics"),
            ])
            .row(vec![
                Self::button(Action::Control, "🎛 Control Panel"),
                Self::button(Action::Help, "❓ Help"),
            ])
            .row(vec![
                Self::button(Action::StartHarvester, "▶️ Start Harvester"),
                Self::button(Action::StopHarvester, "⏹ Stop Harvester"),
            ])
    }

    /// Second-level menu for commands.
    pub fn control_menu() -> KeyboardLayout {
        KeyboardLayout::new()
            .row(vec![
                Self::button(Action::StartHarvester, "▶️ Start Harvester"),
                Self::button(Action::StopHarvester, "⏹ Stop Harvester"),
            ])
            .row(vec![Self::button(Action::EmergencyStop, "🚨 Emergency Stop")])
            .row(vec![Self::button(Action::Menu, "⬅️ Back")])
    }

    /// Confirm/cancel prompt; cancel routes back to the control panel.
    pub fn confirmation_menu() -> KeyboardLayout {
        KeyboardLayout::new().row(vec![
            Self::button(Action::ConfirmEmergency, "✅ Confirm Stop"),
            Self::button(Action::Control, "❌ Cancel"),
        ])
    }

    /// Single back button under read-only views.
    pub fn back_menu() -> KeyboardLayout {
        KeyboardLayout::new().row(vec![Self::button(Action::Menu, "⬅️ Back to Menu")])
    }

    pub fn welcome() -> FormattedText {
        FormattedText::new()
            .bold("🛰 Control Relay")
            .newline()
            .newline()
            .line("You are connected as the operator.")
            .text("Choose an action below.")
    }

    pub fn menu() -> FormattedText {
        FormattedText::new().bold("Main Menu").newline().text("Choose an action.")
    }

    pub fn help() -> FormattedText {
        FormattedText::new()
            .bold("Available commands")
            .newline()
            .line("/start - Welcome and main menu")
            .line("/menu - Show the main menu")
            .line("/status - System status")
            .line("/help - Show this help")
            .newline()
            .text("Emergency stop always asks for confirmation before it runs.")
    }

    pub fn control_panel() -> FormattedText {
        FormattedText::new()
            .bold("🎛 Control Panel")
            .newline()
            .text("Start or stop modules, or halt everything.")
    }

    pub fn confirmation_prompt() -> FormattedText {
        FormattedText::new()
            .bold("⚠️ Confirm Emergency Stop")
            .newline()
            .newline()
            .line("This halts every running module.")
            .text("Are you sure?")
    }

    pub fn format_status(status: &SystemStatus) -> FormattedText {
        let mut text = FormattedText::new()
            .bold("📊 System Status")
            .newline()
            .newline()
            .field("Status", &status.status)
            .field("Runtime", &status.runtime)
            .field("Version", &status.version)
            .field("Security events", status.security.events);

        if !status.modules.is_empty() {
            text = text.newline().bold("Modules").newline();
            for (name, state) in &status.modules {
                text = text.line(format!("{} {}", Self::module_marker(state), name));
            }
        }
        text
    }

    pub fn format_metrics(metrics: &DetailedMetrics) -> FormattedText {
        let text = FormattedText::new()
            .bold("📈 Detailed Metrics")
            .newline()
            .newline()
            .field("Uptime", Self::format_uptime(metrics.system.uptime))
            .field("Active modules", metrics.system.active_modules)
            .field("Security level", &metrics.security.security_level);
        let text = Self::append_section(text, "Harvester", &metrics.harvester);
        Self::append_section(text, "Performance", &metrics.performance)
    }

    /// Report a command outcome with its message verbatim.
    pub fn format_outcome(outcome: &CommandOutcome) -> FormattedText {
        let marker = if outcome.success { "✅" } else { "❌" };
        FormattedText::plain(format!("{} {}", marker, outcome.message))
    }

    /// Human-readable uptime from seconds.
    pub fn format_uptime(seconds: u64) -> String {
        let days = seconds / 86_400;
        let hours = (seconds % 86_400) / 3600;
        let minutes = (seconds % 3600) / 60;
        if days > 0 {
            format!("{}d {}h {}m", days, hours, minutes)
        } else if hours > 0 {
            format!("{}h {}m", hours, minutes)
        } else {
            format!("{}m", minutes)
        }
    }

    fn append_section(
        mut text: FormattedText,
        title: &str,
        values: &BTreeMap<String, Value>,
    ) -> FormattedText {
        if values.is_empty() {
            return text;
        }
        text = text.newline().bold(title).newline();
        for (key, value) in values {
            text = text.field(key, Self::display_value(value));
        }
        text
    }

    fn module_marker(state: &Value) -> &'static str {
        match state {
            Value::Bool(true) => "🟢",
            Value::String(s) if s.eq_ignore_ascii_case("active") || s == "running" => "🟢",
            _ => "🔴",
        }
    }

    fn display_value(value: &Value) -> String {
        match value {
            Value::String(s) => s.clone(),
            Value::Null => "n/a".to_string(),
            other => other.to_string(),
        }
    }
}
