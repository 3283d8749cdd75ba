//! Command Router
//!
//! Authorizes inbound events against the bound operator, classifies them into
//! the closed [`Action`] set, runs the matching handler and builds the
//! responses the connection manager transmits.

use std::sync::Arc;
use std::time::Duration;

use control_relay_core::config::keys;
use control_relay_core::control::commands;
use control_relay_core::{
    ConfigStore, ControlSystem, FormattedText, InboundEvent, KeyboardLayout, OutboundResponse,
};
use tracing::{debug, error, info, warn};

use super::confirmation::{ConfirmationFlow, ConfirmationState, Resolution};
use super::response_mapper::{
    ResponseMapper, ERROR_TEXT, NOTHING_TO_CONFIRM_TEXT, UNAUTHORIZED_ACK, UNAUTHORIZED_TEXT,
    USAGE_TEXT,
};
use super::session::{OperatorCheck, SharedSession};
use super::types::HandlerError;

/// Closed set of routable actions.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Action {
    Start,
    Status,
    Help,
    Menu,
    Control,
    Metrics,
    StartHarvester,
    StopHarvester,
    EmergencyStop,
    ConfirmEmergency,
}

impl Action {
    pub const ALL: [Action; 10] = [
        Action::Start,
        Action::Status,
        Action::Help,
        Action::Menu,
        Action::Control,
        Action::Metrics,
        Action::StartHarvester,
        Action::StopHarvester,
        Action::EmergencyStop,
        Action::ConfirmEmergency,
    ];

    /// Stable callback key carried by inline buttons.
    pub fn action_id(self) -> &'static str {
        match self {
            Action::Start => "start",
            Action::Status => "status",
            Action::Help => "help",
            Action::Menu => "menu",
            Action::Control => "control",
            Action::Metrics => "metrics",
            Action::StartHarvester => "start_harvester",
            Action::StopHarvester => "stop_harvester",
            Action::EmergencyStop => "emergency_stop",
            Action::ConfirmEmergency => "confirm_emergency",
        }
    }

    /// Resolve a callback key.
    pub fn from_action_id(action_id: &str) -> Option<Self> {
        Self::ALL
            .into_iter()
            .find(|action| action.action_id() == action_id)
    }

    /// Parse a slash command.
    ///
    /// Commands are case-sensitive; a trailing `@botname` (group chat form)
    /// is accepted.
    pub fn from_command(text: &str) -> Option<Self> {
        let command = text.trim().split_whitespace().next()?;
        let command = command.split('@').next().unwrap_or(command);
        match command {
            "/start" => Some(Action::Start),
            "/status" => Some(Action::Status),
            "/help" => Some(Action::Help),
            "/menu" => Some(Action::Menu),
            _ => None,
        }
    }
}

/// Result of routing one event.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Dispatch {
    /// Messages to send, in order.
    pub responses: Vec<OutboundResponse>,
    /// Toast text for the callback acknowledgment.
    pub ack_text: Option<String>,
}

impl Dispatch {
    fn reply(response: OutboundResponse) -> Self {
        Self {
            responses: vec![response],
            ack_text: None,
        }
    }
}

/// Routes authorized events to handlers.
pub struct CommandRouter {
    session: SharedSession,
    control: Arc<dyn ControlSystem>,
    config: Arc<dyn ConfigStore>,
    confirmation: ConfirmationFlow,
}

impl CommandRouter {
    pub fn new(
        session: SharedSession,
        control: Arc<dyn ControlSystem>,
        config: Arc<dyn ConfigStore>,
        confirmation_timeout: Duration,
    ) -> Self {
        Self {
            session,
            control,
            config,
            confirmation: ConfirmationFlow::new(confirmation_timeout),
        }
    }

    /// Confirmation state of a chat.
    pub async fn confirmation_state(&self, chat_id: i64) -> ConfirmationState {
        let session = self.session.read().await;
        self.confirmation.state(&session, chat_id)
    }

    /// Single entry point for every inbound event.
    pub async fn on_event(&self, event: InboundEvent) -> Dispatch {
        let chat_id = event.chat_id();

        if !self.authorize(chat_id).await {
            let mut dispatch = Dispatch::reply(OutboundResponse::new(
                chat_id,
                FormattedText::plain(UNAUTHORIZED_TEXT),
            ));
            if event.query_id().is_some() {
                dispatch.ack_text = Some(UNAUTHORIZED_ACK.to_string());
            }
            return dispatch;
        }

        let action = match &event {
            InboundEvent::TextMessage { text, .. } => match Action::from_command(text) {
                Some(action) => action,
                None => {
                    self.cancel_pending(chat_id).await;
                    return Dispatch::reply(
                        OutboundResponse::new(chat_id, FormattedText::plain(USAGE_TEXT))
                            .with_menu(ResponseMapper::main_menu()),
                    );
                }
            },
            InboundEvent::CallbackAction {
                action_id,
                message_ref,
                ..
            } => match Action::from_action_id(action_id) {
                Some(action) => action,
                None => {
                    debug!(
                        chat_id,
                        action_id = %action_id,
                        message_ref = ?message_ref,
                        "[CommandRouter] Ignoring unknown callback action"
                    );
                    return Dispatch::default();
                }
            },
        };

        debug!(chat_id, action = action.action_id(), "[CommandRouter] Dispatching");
        match self.handle(chat_id, action).await {
            Ok(response) => Dispatch::reply(response),
            Err(e) => {
                error!(
                    chat_id,
                    action = action.action_id(),
                    error = %e,
                    "[CommandRouter] Handler failed"
                );
                Dispatch::reply(Self::error_response(chat_id))
            }
        }
    }

    /// Fixed response for a failed handler.
    pub fn error_response(chat_id: i64) -> OutboundResponse {
        OutboundResponse::new(chat_id, FormattedText::plain(ERROR_TEXT))
            .with_menu(ResponseMapper::back_menu())
    }

    /// Trust-on-first-contact gate.
    async fn authorize(&self, chat_id: i64) -> bool {
        let check = self.session.write().await.check_operator(chat_id);
        match check {
            OperatorCheck::Bound => {
                // The in-memory binding holds even if persisting it fails
                if let Err(e) = self
                    .config
                    .set(keys::TELEGRAM_CHAT_ID, &chat_id.to_string())
                {
                    warn!(chat_id, error = %e, "[CommandRouter] Failed to persist operator chat id");
                }
                info!(chat_id, "[CommandRouter] Operator bound on first contact");
                true
            }
            OperatorCheck::Authorized => true,
            OperatorCheck::Unauthorized { operator } => {
                warn!(chat_id, operator, "[CommandRouter] Unauthorized access attempt");
                false
            }
        }
    }

    async fn cancel_pending(&self, chat_id: i64) {
        let resolution = {
            let mut session = self.session.write().await;
            self.confirmation.cancel(&mut session, chat_id)
        };
        if resolution == Resolution::Cancelled {
            info!(chat_id, "[CommandRouter] Pending emergency stop cancelled");
        }
    }

    async fn handle(&self, chat_id: i64, action: Action) -> Result<OutboundResponse, HandlerError> {
        if !matches!(action, Action::EmergencyStop | Action::ConfirmEmergency) {
            self.cancel_pending(chat_id).await;
        }

        let respond = |body: FormattedText,
                       menu: KeyboardLayout|
         -> Result<OutboundResponse, HandlerError> {
            Ok(OutboundResponse::new(chat_id, body).with_menu(menu))
        };

        match action {
            Action::Start => respond(ResponseMapper::welcome(), ResponseMapper::main_menu()),
            Action::Menu => respond(ResponseMapper::menu(), ResponseMapper::main_menu()),
            Action::Help => respond(ResponseMapper::help(), ResponseMapper::back_menu()),
            Action::Control => respond(
                ResponseMapper::control_panel(),
                ResponseMapper::control_menu(),
            ),
            Action::Status => {
                let status = self.control.get_system_status().await?;
                respond(
                    ResponseMapper::format_status(&status),
                    ResponseMapper::back_menu(),
                )
            }
            Action::Metrics => {
                let metrics = self.control.get_detailed_metrics().await?;
                respond(
                    ResponseMapper::format_metrics(&metrics),
                    ResponseMapper::back_menu(),
                )
            }
            Action::StartHarvester => self.execute(chat_id, commands::START_HARVESTER).await,
            Action::StopHarvester => self.execute(chat_id, commands::STOP_HARVESTER).await,
            Action::EmergencyStop => {
                {
                    let mut session = self.session.write().await;
                    self.confirmation.request(&mut session, chat_id);
                }
                info!(chat_id, "[CommandRouter] Emergency stop awaiting confirmation");
                respond(
                    ResponseMapper::confirmation_prompt(),
                    ResponseMapper::confirmation_menu(),
                )
            }
            Action::ConfirmEmergency => {
                let resolution = {
                    let mut session = self.session.write().await;
                    self.confirmation.confirm(&mut session, chat_id)
                };
                match resolution {
                    Resolution::Confirmed => {
                        warn!(chat_id, "[CommandRouter] Emergency stop confirmed");
                        self.execute(chat_id, commands::EMERGENCY_STOP).await
                    }
                    Resolution::Cancelled | Resolution::NothingPending => respond(
                        FormattedText::plain(NOTHING_TO_CONFIRM_TEXT),
                        ResponseMapper::control_menu(),
                    ),
                }
            }
        }
    }

    async fn execute(&self, chat_id: i64, command: &str) -> Result<OutboundResponse, HandlerError> {
        let outcome = self.control.execute_command(command).await?;
        info!(
            chat_id,
            command,
            success = outcome.success,
            "[CommandRouter] Command executed"
        );
        Ok(
            OutboundResponse::new(chat_id, ResponseMapper::format_outcome(&outcome))
                .with_menu(ResponseMapper::control_menu()),
        )
    }
}
