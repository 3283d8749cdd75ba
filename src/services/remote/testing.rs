//! Test doubles for the remote control surface.

use std::collections::{BTreeMap, VecDeque};
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use control_relay_core::{
    CommandOutcome, ControlSystem, CoreError, CoreResult, DetailedMetrics, InboundEvent,
    KeyboardLayout, SystemStatus,
};
use serde_json::json;
use tokio::sync::{Notify, Semaphore};

use super::adapters::{ReceivedBatch, RemoteAdapter};
use super::types::{BotIdentity, RemoteAdapterType, RemoteError};

/// Control system that records executed commands.
pub struct MockControlSystem {
    executed: Mutex<Vec<String>>,
    outcome: Mutex<CommandOutcome>,
    status_calls: AtomicUsize,
    fail_reads: AtomicBool,
    fail_commands: AtomicBool,
}

impl MockControlSystem {
    pub fn new() -> Self {
        Self {
            executed: Mutex::new(Vec::new()),
            outcome: Mutex::new(CommandOutcome::ok("done")),
            status_calls: AtomicUsize::new(0),
            fail_reads: AtomicBool::new(false),
            fail_commands: AtomicBool::new(false),
        }
    }

    pub fn executed(&self) -> Vec<String> {
        self.executed.lock().unwrap().clone()
    }

    pub fn status_calls(&self) -> usize {
        self.status_calls.load(Ordering::SeqCst)
    }

    pub fn set_outcome(&self, outcome: CommandOutcome) {
        *self.outcome.lock().unwrap() = outcome;
    }

    pub fn fail_reads(&self, fail: bool) {
        self.fail_reads.store(fail, Ordering::SeqCst);
    }

    pub fn fail_commands(&self, fail: bool) {
        self.fail_commands.store(fail, Ordering::SeqCst);
    }
}

#[async_trait]
impl ControlSystem for MockControlSystem {
    async fn execute_command(&self, name: &str) -> CoreResult<CommandOutcome> {
        if self.fail_commands.load(Ordering::SeqCst) {
            return Err(CoreError::control("control system unavailable"));
        }
        self.executed.lock().unwrap().push(name.to_string());
        Ok(self.outcome.lock().unwrap().clone())
    }

    async fn get_system_status(&self) -> CoreResult<SystemStatus> {
        self.status_calls.fetch_add(1, Ordering::SeqCst);
        if self.fail_reads.load(Ordering::SeqCst) {
            return Err(CoreError::control("status endpoint unavailable"));
        }
        let mut modules = BTreeMap::new();
        modules.insert("harvester".to_string(), json!(true));
        Ok(SystemStatus {
            runtime: "1h 2m".to_string(),
            status: "operational".to_string(),
            version: "1.0.0".to_string(),
            modules,
            ..Default::default()
        })
    }

    async fn get_detailed_metrics(&self) -> CoreResult<DetailedMetrics> {
        if self.fail_reads.load(Ordering::SeqCst) {
            return Err(CoreError::control("metrics endpoint unavailable"));
        }
        Ok(DetailedMetrics::default())
    }
}

/// One scripted result of `identify` or `receive`.
pub enum Step<T> {
    Ok(T),
    Err(RemoteError),
}

/// Scripted transport.
///
/// `identify` and `receive` pop their next scripted step; once a receive
/// script is exhausted, `receive` parks until cancelled, like an idle
/// long-poll. A zero-timeout receive only records the confirmed offset.
pub struct MockAdapter {
    identify_script: Mutex<VecDeque<Step<BotIdentity>>>,
    receive_script: Mutex<VecDeque<Step<Vec<InboundEvent>>>>,
    pub identify_calls: AtomicUsize,
    pub receive_calls: AtomicUsize,
    pub offsets: Mutex<Vec<Option<i64>>>,
    pub confirmed: Mutex<Vec<Option<i64>>>,
    pub sent: Mutex<Vec<(i64, String, Option<KeyboardLayout>)>>,
    pub acks: Mutex<Vec<(String, Option<String>)>>,
    pub fail_sends: AtomicBool,
    next_update_id: Mutex<i64>,
    identify_gate: Mutex<Option<Arc<Semaphore>>>,
    activity: Notify,
}

impl MockAdapter {
    pub fn new() -> Self {
        Self {
            identify_script: Mutex::new(VecDeque::new()),
            receive_script: Mutex::new(VecDeque::new()),
            identify_calls: AtomicUsize::new(0),
            receive_calls: AtomicUsize::new(0),
            offsets: Mutex::new(Vec::new()),
            confirmed: Mutex::new(Vec::new()),
            sent: Mutex::new(Vec::new()),
            acks: Mutex::new(Vec::new()),
            fail_sends: AtomicBool::new(false),
            next_update_id: Mutex::new(100),
            identify_gate: Mutex::new(None),
            activity: Notify::new(),
        }
    }

    pub fn script_identify(&self, step: Step<BotIdentity>) -> &Self {
        self.identify_script.lock().unwrap().push_back(step);
        self
    }

    pub fn script_receive(&self, step: Step<Vec<InboundEvent>>) -> &Self {
        self.receive_script.lock().unwrap().push_back(step);
        self
    }

    /// Make every later `identify` wait for a permit on the returned gate.
    pub fn hold_identify(&self) -> Arc<Semaphore> {
        let gate = Arc::new(Semaphore::new(0));
        *self.identify_gate.lock().unwrap() = Some(gate.clone());
        gate
    }

    pub fn confirmed(&self) -> Vec<Option<i64>> {
        self.confirmed.lock().unwrap().clone()
    }

    pub fn identity() -> BotIdentity {
        BotIdentity {
            id: 1,
            username: "relay_bot".to_string(),
        }
    }

    pub fn sent_count(&self) -> usize {
        self.sent.lock().unwrap().len()
    }

    pub fn ack_count(&self) -> usize {
        self.acks.lock().unwrap().len()
    }

    /// Wait until `check` holds, polling on adapter activity.
    pub async fn wait_until(&self, check: impl Fn(&Self) -> bool) {
        tokio::time::timeout(Duration::from_secs(5), async {
            while !check(self) {
                tokio::select! {
                    _ = self.activity.notified() => {}
                    _ = tokio::time::sleep(Duration::from_millis(10)) => {}
                }
            }
        })
        .await
        .expect("condition not reached in time");
    }
}

#[async_trait]
impl RemoteAdapter for MockAdapter {
    fn adapter_type(&self) -> RemoteAdapterType {
        RemoteAdapterType::Telegram
    }

    async fn identify(&self) -> Result<BotIdentity, RemoteError> {
        self.identify_calls.fetch_add(1, Ordering::SeqCst);
        self.activity.notify_waiters();
        let gate = self.identify_gate.lock().unwrap().clone();
        if let Some(gate) = gate {
            let _permit = gate.acquire().await;
        }
        let step = self.identify_script.lock().unwrap().pop_front();
        match step {
            Some(Step::Ok(identity)) => Ok(identity),
            Some(Step::Err(e)) => Err(e),
            None => Ok(Self::identity()),
        }
    }

    async fn receive(
        &self,
        offset: Option<i64>,
        timeout: Duration,
    ) -> Result<ReceivedBatch, RemoteError> {
        if timeout.is_zero() {
            self.confirmed.lock().unwrap().push(offset);
            self.activity.notify_waiters();
            return Ok(ReceivedBatch {
                events: Vec::new(),
                next_offset: offset,
            });
        }
        self.receive_calls.fetch_add(1, Ordering::SeqCst);
        self.offsets.lock().unwrap().push(offset);
        self.activity.notify_waiters();
        let step = self.receive_script.lock().unwrap().pop_front();
        match step {
            Some(Step::Ok(events)) => {
                let mut next = self.next_update_id.lock().unwrap();
                *next += events.len() as i64;
                Ok(ReceivedBatch {
                    events,
                    next_offset: Some(*next),
                })
            }
            Some(Step::Err(e)) => Err(e),
            None => {
                std::future::pending::<()>().await;
                Ok(ReceivedBatch::default())
            }
        }
    }

    async fn send_message(
        &self,
        chat_id: i64,
        html: &str,
        menu: Option<&KeyboardLayout>,
    ) -> Result<(), RemoteError> {
        if self.fail_sends.load(Ordering::SeqCst) {
            self.activity.notify_waiters();
            return Err(RemoteError::SendFailed("429 Too Many Requests".to_string()));
        }
        self.sent
            .lock()
            .unwrap()
            .push((chat_id, html.to_string(), menu.cloned()));
        self.activity.notify_waiters();
        Ok(())
    }

    async fn answer_callback(
        &self,
        query_id: &str,
        text: Option<&str>,
    ) -> Result<(), RemoteError> {
        self.acks
            .lock()
            .unwrap()
            .push((query_id.to_string(), text.map(str::to_string)));
        self.activity.notify_waiters();
        Ok(())
    }
}
