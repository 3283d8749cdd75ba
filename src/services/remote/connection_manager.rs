//! Connection Manager
//!
//! Owns the adapter lifecycle: the identity probe with linear backoff on
//! `start()`, the long-poll loop with its single delayed reconnect, the
//! dispatch loop that feeds the command router, and an idempotent `stop()`
//! that cancels every in-flight wait.

use std::sync::{Arc, Mutex, PoisonError};
use std::time::Duration;

use control_relay_core::config::keys;
use control_relay_core::{ConfigStore, ControlSystem, CoreResult, InboundEvent, OutboundResponse};
use tokio::sync::{mpsc, RwLock};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

use super::adapters::RemoteAdapter;
use super::command_router::{CommandRouter, Dispatch};
use super::session::{Session, SharedSession};
use super::types::{
    ConnectionStatus, HandlerError, Ready, RelayConfig, RemoteError, StartError, StopError, Stopped,
};

/// How long `stop()` waits for a background loop before aborting it.
const STOP_GRACE: Duration = Duration::from_secs(2);

/// Capacity of the poll-to-dispatch event channel.
const EVENT_CHANNEL_CAPACITY: usize = 100;

/// Background tasks of one running session.
struct SessionTasks {
    poll: JoinHandle<()>,
    dispatch: JoinHandle<()>,
}

impl SessionTasks {
    fn abort(&self) {
        self.poll.abort();
        self.dispatch.abort();
    }

    /// Await both loops, aborting any that outlives the grace period.
    async fn shutdown(self, grace: Duration) -> Result<(), StopError> {
        let mut failure = None;
        for (name, mut handle) in [("poll", self.poll), ("dispatch", self.dispatch)] {
            match tokio::time::timeout(grace, &mut handle).await {
                Ok(Ok(())) => {}
                Ok(Err(e)) if e.is_panic() => {
                    error!(task = name, error = %e, "[ConnectionManager] Loop panicked");
                    failure = Some(format!("{} loop panicked: {}", name, e));
                }
                Ok(Err(_)) => {}
                Err(_) => {
                    warn!(
                        task = name,
                        grace_ms = grace.as_millis() as u64,
                        "[ConnectionManager] Loop did not exit in time, aborting"
                    );
                    handle.abort();
                }
            }
        }
        match failure {
            Some(msg) => Err(StopError::TaskFailed(msg)),
            None => Ok(()),
        }
    }
}

/// State shared by the poll and dispatch loops of one session.
#[derive(Clone)]
struct SessionLoop {
    adapter: Arc<dyn RemoteAdapter>,
    router: Arc<CommandRouter>,
    session: SharedSession,
    status: Arc<RwLock<ConnectionStatus>>,
    cancel: CancellationToken,
    poll_timeout: Duration,
    reconnect_delay: Duration,
    ack_timeout: Duration,
}

impl SessionLoop {
    /// Long-poll for events and forward them to the dispatch loop.
    async fn poll(self, tx: mpsc::Sender<InboundEvent>) {
        let mut offset = self.session.read().await.update_offset();
        loop {
            if !self.session.read().await.is_connected() {
                break;
            }

            let received = tokio::select! {
                _ = self.cancel.cancelled() => break,
                result = self.adapter.receive(offset, self.poll_timeout) => result,
            };

            match received {
                Ok(batch) => {
                    offset = batch.next_offset.or(offset);
                    self.on_receive_ok(offset).await;
                    for event in batch.events {
                        if tx.send(event).await.is_err() {
                            debug!("[ConnectionManager] Dispatch loop gone, stopping poll");
                            return;
                        }
                    }
                }
                Err(e) if e.is_permanent() => {
                    self.on_permanent_failure(&e).await;
                    break;
                }
                Err(e) => {
                    let attempt = self.on_transient_failure(&e).await;
                    warn!(
                        attempt,
                        delay_ms = self.reconnect_delay.as_millis() as u64,
                        error = %e,
                        "[ConnectionManager] Receive failed, scheduling reconnect"
                    );
                    tokio::select! {
                        _ = self.cancel.cancelled() => break,
                        _ = tokio::time::sleep(self.reconnect_delay) => {}
                    }
                    if !self.session.read().await.is_connected() {
                        info!("[ConnectionManager] Session stopped while waiting, abandoning reconnect");
                        break;
                    }
                    debug!(attempt, "[ConnectionManager] Reconnecting");
                }
            }
        }
        debug!("[ConnectionManager] Poll loop exited");
    }

    async fn on_receive_ok(&self, offset: Option<i64>) {
        let had_retries = {
            let mut session = self.session.write().await;
            session.record_offset(offset);
            let had = session.retry_count() > 0;
            session.reset_retries();
            had
        };
        if had_retries {
            info!("[ConnectionManager] Reconnected");
            let mut status = self.status.write().await;
            status.reconnecting = false;
            status.reconnect_attempts = 0;
        }
    }

    async fn on_transient_failure(&self, err: &RemoteError) -> u32 {
        let attempt = self.session.write().await.record_retry();
        let mut status = self.status.write().await;
        status.reconnecting = true;
        status.reconnect_attempts = attempt;
        status.last_error = Some(err.to_string());
        status.last_error_at = Some(chrono::Utc::now().to_rfc3339());
        attempt
    }

    async fn on_permanent_failure(&self, err: &RemoteError) {
        error!(error = %err, "[ConnectionManager] Permanent transport failure, stopping");
        self.session.write().await.mark_stopped();
        {
            let mut status = self.status.write().await;
            status.running = false;
            status.reconnecting = false;
            status.connected_since = None;
            status.last_error = Some(err.to_string());
            status.last_error_at = Some(chrono::Utc::now().to_rfc3339());
        }
        self.cancel.cancel();
    }

    /// Run events one at a time in arrival order.
    ///
    /// Once the session stops, nothing else reaches the router: queued
    /// callbacks are only acknowledged so the operator's client stops waiting.
    async fn dispatch(self, mut rx: mpsc::Receiver<InboundEvent>) {
        loop {
            let event = tokio::select! {
                biased;
                _ = self.cancel.cancelled() => break,
                event = rx.recv() => match event {
                    Some(event) => event,
                    None => break,
                },
            };
            if !self.session.read().await.is_connected() {
                self.discard(event).await;
                break;
            }
            self.process_event(event).await;
        }

        rx.close();
        let mut dropped = 0usize;
        while let Ok(event) = rx.try_recv() {
            self.discard(event).await;
            dropped += 1;
        }
        if dropped > 0 {
            info!(dropped, "[ConnectionManager] Dropped queued events on shutdown");
        }
        debug!("[ConnectionManager] Dispatch loop exited");
    }

    async fn discard(&self, event: InboundEvent) {
        debug!(chat_id = event.chat_id(), kind = event.kind(), "[ConnectionManager] Skipping event");
        if let Some(query_id) = event.query_id() {
            self.acknowledge(query_id, None).await;
        }
    }

    async fn process_event(&self, event: InboundEvent) {
        {
            let mut status = self.status.write().await;
            status.total_events_processed += 1;
            status.last_event_at = Some(chrono::Utc::now().to_rfc3339());
        }

        let chat_id = event.chat_id();
        let query_id = event.query_id().map(str::to_string);
        debug!(chat_id, kind = event.kind(), "[ConnectionManager] Processing event");

        // A panicking handler must not take the loop down or skip the ack
        let router = self.router.clone();
        let mut handler = tokio::spawn(async move { router.on_event(event).await });
        let joined = tokio::select! {
            biased;
            joined = &mut handler => joined,
            _ = self.cancel.cancelled() => {
                handler.abort();
                info!(chat_id, "[ConnectionManager] Handler interrupted by shutdown");
                if let Some(query_id) = query_id.as_deref() {
                    self.acknowledge(query_id, None).await;
                }
                return;
            }
        };
        let dispatch = match joined {
            Ok(dispatch) => dispatch,
            Err(e) => {
                let err = HandlerError::Aborted(e.to_string());
                error!(chat_id, error = %err, "[ConnectionManager] Handler task failed");
                Dispatch {
                    responses: vec![CommandRouter::error_response(chat_id)],
                    ack_text: None,
                }
            }
        };

        if let Some(query_id) = query_id {
            self.acknowledge(&query_id, dispatch.ack_text.as_deref())
                .await;
        }
        for response in &dispatch.responses {
            deliver(self.adapter.as_ref(), response).await;
        }
    }

    async fn acknowledge(&self, query_id: &str, text: Option<&str>) {
        match tokio::time::timeout(self.ack_timeout, self.adapter.answer_callback(query_id, text))
            .await
        {
            Ok(Ok(())) => {}
            Ok(Err(e)) => {
                warn!(query_id, error = %e, "[ConnectionManager] Failed to answer callback");
            }
            Err(_) => {
                warn!(query_id, "[ConnectionManager] Callback answer timed out");
            }
        }
    }
}

/// Transmit one response. Failures are logged and reported as `false`.
async fn deliver(adapter: &dyn RemoteAdapter, response: &OutboundResponse) -> bool {
    let html = response.body.to_html();
    match adapter
        .send_message(response.chat_id, &html, response.menu.as_ref())
        .await
    {
        Ok(()) => true,
        Err(e) => {
            warn!(
                chat_id = response.chat_id,
                error = %e,
                "[ConnectionManager] Failed to send response"
            );
            false
        }
    }
}

/// Connection lifecycle for one bot.
pub struct ConnectionManager {
    config: RelayConfig,
    adapter: Arc<dyn RemoteAdapter>,
    router: Arc<CommandRouter>,
    session: SharedSession,
    config_store: Arc<dyn ConfigStore>,
    status: Arc<RwLock<ConnectionStatus>>,
    cancel_token: Mutex<CancellationToken>,
    tasks: tokio::sync::Mutex<Option<SessionTasks>>,
}

impl ConnectionManager {
    pub fn new(
        config: RelayConfig,
        adapter: Arc<dyn RemoteAdapter>,
        control: Arc<dyn ControlSystem>,
        config_store: Arc<dyn ConfigStore>,
    ) -> Self {
        let session = Session::shared(config.operator_chat_id);
        let router = Arc::new(CommandRouter::new(
            session.clone(),
            control,
            config_store.clone(),
            config.confirmation_timeout(),
        ));
        let status = ConnectionStatus {
            adapter_type: adapter.adapter_type(),
            ..Default::default()
        };
        Self {
            config,
            adapter,
            router,
            session,
            config_store,
            status: Arc::new(RwLock::new(status)),
            cancel_token: Mutex::new(CancellationToken::new()),
            tasks: tokio::sync::Mutex::new(None),
        }
    }

    /// Current runtime status.
    pub async fn status(&self) -> ConnectionStatus {
        let mut status = self.status.read().await.clone();
        let session = self.session.read().await;
        status.running = session.is_connected();
        status.starting = session.is_starting();
        status.authorized_chat_id = session.authorized_chat_id();
        status
    }

    /// Verify the credentials, then begin polling.
    ///
    /// Transient probe failures are retried with a linear backoff; a
    /// credential rejection fails immediately. `stop()` interrupts both the
    /// probe and the backoff sleep.
    pub async fn start(&self) -> Result<Ready, StartError> {
        // The token is swapped under the same lock as `starting` so a
        // concurrent stop() always cancels the token this start observes
        let cancel = {
            let mut session = self.session.write().await;
            if !session.begin_start() {
                warn!("[ConnectionManager] Start requested while already starting or connected");
                return Err(StartError::AlreadyStarting);
            }
            let cancel = CancellationToken::new();
            *self
                .cancel_token
                .lock()
                .unwrap_or_else(PoisonError::into_inner) = cancel.clone();
            cancel
        };
        self.status.write().await.starting = true;
        info!(adapter = %self.adapter.adapter_type(), "[ConnectionManager] Starting");

        let ready = match self.connect(&cancel).await {
            Ok(ready) => ready,
            Err(e) => {
                // A cancelling stop() already cleared the flags, and a newer
                // start may own them by now
                if e != StartError::Cancelled {
                    self.session.write().await.abort_start();
                }
                let mut status = self.status.write().await;
                status.starting = false;
                status.last_error = Some(e.to_string());
                status.last_error_at = Some(chrono::Utc::now().to_rfc3339());
                return Err(e);
            }
        };

        {
            // Checked under the session lock so a concurrent stop() either
            // lands before this point or sees the connected flag
            let mut session = self.session.write().await;
            if cancel.is_cancelled() || !session.is_starting() {
                drop(session);
                self.status.write().await.starting = false;
                info!("[ConnectionManager] Stopped before the connection was established");
                return Err(StartError::Cancelled);
            }
            session.mark_connected();
        }

        let runner = SessionLoop {
            adapter: self.adapter.clone(),
            router: self.router.clone(),
            session: self.session.clone(),
            status: self.status.clone(),
            cancel: cancel.clone(),
            poll_timeout: self.config.poll_timeout(),
            reconnect_delay: self.config.reconnect.reconnect_delay(),
            ack_timeout: self.config.ack_timeout(),
        };
        let (tx, rx) = mpsc::channel::<InboundEvent>(EVENT_CHANNEL_CAPACITY);
        let tasks = SessionTasks {
            dispatch: tokio::spawn(runner.clone().dispatch(rx)),
            poll: tokio::spawn(runner.poll(tx)),
        };
        if let Some(previous) = self.tasks.lock().await.replace(tasks) {
            previous.abort();
        }

        {
            let mut status = self.status.write().await;
            status.running = true;
            status.starting = false;
            status.connected_since = Some(chrono::Utc::now().to_rfc3339());
            status.reconnecting = false;
            status.reconnect_attempts = 0;
            status.last_error = None;
        }

        info!(
            bot = %ready.bot.username,
            attempts = ready.attempts,
            "[ConnectionManager] Connected"
        );
        Ok(ready)
    }

    async fn connect(&self, cancel: &CancellationToken) -> Result<Ready, StartError> {
        let has_token = self
            .config
            .bot_token
            .as_deref()
            .is_some_and(|t| !t.trim().is_empty());
        if !has_token {
            error!("[ConnectionManager] Bot token is not configured");
            return Err(StartError::MissingCredential);
        }

        let max_attempts = self.config.reconnect.max_start_attempts.max(1);
        let mut last_error = String::new();

        for attempt in 1..=max_attempts {
            let probe = tokio::select! {
                _ = cancel.cancelled() => return Err(StartError::Cancelled),
                result = self.adapter.identify() => result,
            };

            match probe {
                Ok(bot) => {
                    return Ok(Ready {
                        bot,
                        attempts: attempt,
                    })
                }
                Err(RemoteError::MissingCredential) => return Err(StartError::MissingCredential),
                Err(RemoteError::PermanentCredential(msg)) => {
                    error!(error = %msg, "[ConnectionManager] Credentials rejected, not retrying");
                    return Err(StartError::PermanentCredential(msg));
                }
                Err(e) if e.is_permanent() => {
                    error!(error = %e, "[ConnectionManager] Permanent failure, not retrying");
                    return Err(StartError::PermanentCredential(e.to_string()));
                }
                Err(e) => {
                    self.session.write().await.record_retry();
                    last_error = e.to_string();
                    if attempt < max_attempts {
                        let delay = self.config.reconnect.delay_for_attempt(attempt);
                        warn!(
                            attempt,
                            max_attempts,
                            delay_ms = delay.as_millis() as u64,
                            error = %e,
                            "[ConnectionManager] Connection attempt failed, retrying"
                        );
                        tokio::select! {
                            _ = cancel.cancelled() => return Err(StartError::Cancelled),
                            _ = tokio::time::sleep(delay) => {}
                        }
                    } else {
                        warn!(
                            attempt,
                            max_attempts,
                            error = %e,
                            "[ConnectionManager] Connection attempt failed"
                        );
                    }
                }
            }
        }

        error!(
            attempts = max_attempts,
            error = %last_error,
            "[ConnectionManager] Giving up"
        );
        Err(StartError::RetriesExhausted {
            attempts: max_attempts,
            last_error,
        })
    }

    /// Stop polling and release the background tasks. Safe to call at any
    /// time and any number of times.
    pub async fn stop(&self) -> Result<Stopped, StopError> {
        let was_running = {
            let mut session = self.session.write().await;
            let was_running = session.mark_stopped();
            self.cancel_token
                .lock()
                .unwrap_or_else(PoisonError::into_inner)
                .cancel();
            was_running
        };

        {
            let mut status = self.status.write().await;
            status.running = false;
            status.starting = false;
            status.reconnecting = false;
            status.connected_since = None;
        }

        let tasks = self.tasks.lock().await.take();
        match tasks {
            Some(tasks) => {
                info!("[ConnectionManager] Stopping");
                let joined = tasks.shutdown(STOP_GRACE).await;
                self.confirm_offset().await;
                joined?;
                info!("[ConnectionManager] Stopped");
            }
            None if was_running => info!("[ConnectionManager] Start cancelled"),
            None => debug!("[ConnectionManager] Stop requested while not running"),
        }
        Ok(Stopped { was_running })
    }

    /// Tell the platform that every update before the stored offset was
    /// consumed. Without this the last batch is delivered again to the next
    /// process that polls with this token.
    async fn confirm_offset(&self) {
        let Some(offset) = self.session.read().await.update_offset() else {
            return;
        };
        let confirm = self.adapter.receive(Some(offset), Duration::ZERO);
        match tokio::time::timeout(self.config.ack_timeout(), confirm).await {
            Ok(Ok(_)) => debug!(offset, "[ConnectionManager] Update offset confirmed"),
            Ok(Err(e)) => {
                warn!(offset, error = %e, "[ConnectionManager] Failed to confirm update offset");
            }
            Err(_) => warn!(offset, "[ConnectionManager] Update offset confirmation timed out"),
        }
    }

    /// Resolves once the current session has ended, either through `stop()`
    /// or a permanent transport failure.
    pub async fn closed(&self) {
        let cancel = self
            .cancel_token
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone();
        cancel.cancelled().await;
    }

    /// Send a response outside the dispatch loop. Returns whether it was
    /// delivered; failures are logged, never raised.
    pub async fn send(&self, response: &OutboundResponse) -> bool {
        deliver(self.adapter.as_ref(), response).await
    }

    /// Forget the bound operator so the next chat to write becomes it.
    pub async fn reset_operator(&self) -> CoreResult<()> {
        let previous = {
            let mut session = self.session.write().await;
            let previous = session.authorized_chat_id();
            session.reset_operator();
            previous
        };
        self.config_store.remove(keys::TELEGRAM_CHAT_ID)?;
        info!(previous = ?previous, "[ConnectionManager] Operator binding reset");
        Ok(())
    }
}
