//! Relay Flow Integration Tests
//!
//! Drive the full start → receive → route → send → stop loop against a
//! scripted transport.

use std::sync::Arc;
use std::time::Duration;

use control_relay::services::remote::response_mapper::{UNAUTHORIZED_ACK, UNAUTHORIZED_TEXT};
use control_relay::{ConnectionManager, JsonConfigStore, RelayConfig};
use control_relay_core::config::keys;
use control_relay_core::{ConfigStore, MemoryConfigStore};

use super::support::{fast_config, press, text, RecordingControl, ScriptedTransport};

struct Relay {
    manager: ConnectionManager,
    transport: Arc<ScriptedTransport>,
    control: Arc<RecordingControl>,
    store: Arc<MemoryConfigStore>,
}

async fn start_relay(config: RelayConfig) -> Relay {
    let transport = ScriptedTransport::new();
    let control = RecordingControl::new();
    let store = Arc::new(MemoryConfigStore::new());
    let manager = ConnectionManager::new(config, transport.clone(), control.clone(), store.clone());
    manager.start().await.unwrap();
    Relay {
        manager,
        transport,
        control,
        store,
    }
}

// ============================================================================
// Authorization
// ============================================================================

#[tokio::test]
async fn test_first_chat_becomes_operator() {
    let relay = start_relay(fast_config()).await;
    relay.transport.push(vec![text(42, "/start")]);

    let welcome = relay.transport.nth_sent(1).await;
    assert_eq!(welcome.chat_id, 42);
    let menu = welcome.menu.expect("welcome carries the main menu");
    for action in ["status", "metrics", "control", "help", "start_harvester", "stop_harvester"] {
        assert!(menu.contains_action(action), "main menu lacks {}", action);
    }
    assert_eq!(relay.store.get(keys::TELEGRAM_CHAT_ID).as_deref(), Some("42"));

    relay.manager.stop().await.unwrap();
}

#[tokio::test]
async fn test_other_chats_are_rejected() {
    let relay = start_relay(fast_config()).await;
    relay.transport.push(vec![text(42, "/start")]);
    relay.transport.nth_sent(1).await;

    relay.transport.push(vec![text(99, "/status")]);
    let reply = relay.transport.nth_sent(2).await;
    assert_eq!(reply.chat_id, 99);
    assert_eq!(reply.html, UNAUTHORIZED_TEXT);
    assert!(reply.menu.is_none());
    assert_eq!(relay.control.reads.load(std::sync::atomic::Ordering::SeqCst), 0);

    relay.transport.push(vec![press(99, "emergency_stop", "intruder")]);
    relay.transport.wait_for(|t| t.acks().len() == 1).await;
    assert_eq!(
        relay.transport.acks(),
        vec![("intruder".to_string(), Some(UNAUTHORIZED_ACK.to_string()))]
    );
    assert!(relay.control.commands().is_empty());

    relay.manager.stop().await.unwrap();
}

#[tokio::test]
async fn test_persisted_operator_survives_restart() {
    let temp_dir = tempfile::tempdir().unwrap();
    let path = temp_dir.path().join("config.json");

    {
        let store = Arc::new(JsonConfigStore::open(&path).unwrap().without_env());
        let transport = ScriptedTransport::new();
        let manager = ConnectionManager::new(
            fast_config(),
            transport.clone(),
            RecordingControl::new(),
            store,
        );
        manager.start().await.unwrap();
        transport.push(vec![text(42, "/start")]);
        transport.nth_sent(1).await;
        manager.stop().await.unwrap();
    }

    let store = Arc::new(JsonConfigStore::open(&path).unwrap().without_env());
    let config = RelayConfig {
        bot_token: fast_config().bot_token,
        reconnect: fast_config().reconnect,
        ..RelayConfig::from_store(store.as_ref()).unwrap()
    };
    assert_eq!(config.operator_chat_id, Some(42));

    let transport = ScriptedTransport::new();
    let manager = ConnectionManager::new(config, transport.clone(), RecordingControl::new(), store);
    manager.start().await.unwrap();
    transport.push(vec![text(7, "/start")]);
    let reply = transport.nth_sent(1).await;
    assert_eq!(reply.html, UNAUTHORIZED_TEXT);
    manager.stop().await.unwrap();
}

// ============================================================================
// Emergency stop confirmation
// ============================================================================

#[tokio::test]
async fn test_emergency_stop_requires_confirmation() {
    let relay = start_relay(fast_config()).await;
    relay.transport.push(vec![text(42, "/start")]);
    relay.transport.nth_sent(1).await;

    relay.transport.push(vec![press(42, "emergency_stop", "q1")]);
    let prompt = relay.transport.nth_sent(2).await;
    assert!(prompt.html.contains("Confirm Emergency Stop"));
    let menu = prompt.menu.unwrap();
    assert_eq!(menu.action_ids(), vec!["confirm_emergency", "control"]);
    assert!(relay.control.commands().is_empty());

    relay.transport.push(vec![press(42, "confirm_emergency", "q2")]);
    let outcome = relay.transport.nth_sent(3).await;
    assert!(outcome.html.contains("stopped"));
    assert_eq!(relay.control.commands(), vec!["emergency_stop"]);

    relay.transport.wait_for(|t| t.acks().len() == 2).await;
    relay.manager.stop().await.unwrap();
}

#[tokio::test]
async fn test_cancel_returns_to_control_panel() {
    let relay = start_relay(fast_config()).await;
    relay.transport.push(vec![text(42, "/start")]);
    relay.transport.nth_sent(1).await;

    relay.transport.push(vec![press(42, "emergency_stop", "q1")]);
    relay.transport.nth_sent(2).await;
    relay.transport.push(vec![press(42, "control", "q2")]);
    let panel = relay.transport.nth_sent(3).await;
    assert!(panel.menu.unwrap().contains_action("emergency_stop"));

    // The earlier prompt no longer arms the stop
    relay.transport.push(vec![press(42, "confirm_emergency", "q3")]);
    let reply = relay.transport.nth_sent(4).await;
    assert!(reply.html.contains("Nothing to confirm"));
    assert!(relay.control.commands().is_empty());

    relay.manager.stop().await.unwrap();
}

#[tokio::test]
async fn test_expired_confirmation_does_not_fire() {
    let config = RelayConfig {
        confirmation_timeout_secs: 0,
        ..fast_config()
    };
    let relay = start_relay(config).await;
    relay.transport.push(vec![press(42, "emergency_stop", "q1")]);
    relay.transport.nth_sent(1).await;
    tokio::time::sleep(Duration::from_millis(20)).await;

    relay.transport.push(vec![press(42, "confirm_emergency", "q2")]);
    let reply = relay.transport.nth_sent(2).await;
    assert!(reply.html.contains("Nothing to confirm"));
    assert!(relay.control.commands().is_empty());

    relay.manager.stop().await.unwrap();
}

// ============================================================================
// Commands and dispatch
// ============================================================================

#[tokio::test]
async fn test_command_outcome_reported_verbatim() {
    let relay = start_relay(fast_config()).await;
    relay.transport.push(vec![press(42, "start_harvester", "q1")]);
    let reply = relay.transport.nth_sent(1).await;
    assert!(reply.html.contains("harvester already running"));
    assert_eq!(relay.control.commands(), vec!["start_harvester"]);
    relay.manager.stop().await.unwrap();
}

#[tokio::test]
async fn test_events_dispatched_in_order_without_duplicates() {
    let relay = start_relay(fast_config()).await;
    relay.transport.push(vec![
        press(42, "stop_harvester", "a"),
        press(42, "start_harvester", "b"),
    ]);
    relay.transport.push(vec![press(42, "stop_harvester", "c")]);
    relay.transport.wait_for(|t| t.acks().len() == 3).await;

    assert_eq!(
        relay.control.commands(),
        vec!["stop_harvester", "start_harvester", "stop_harvester"]
    );
    let ids: Vec<String> = relay.transport.acks().into_iter().map(|(id, _)| id).collect();
    assert_eq!(ids, vec!["a", "b", "c"]);

    // Every receive after the first carries a strictly larger offset
    relay.transport.wait_for(|t| t.offsets.lock().unwrap().len() >= 3).await;
    let offsets = relay.transport.offsets.lock().unwrap().clone();
    assert_eq!(offsets[0], None);
    assert_eq!(offsets[1], Some(3));
    assert_eq!(offsets[2], Some(4));

    relay.manager.stop().await.unwrap();
}

#[tokio::test]
async fn test_unknown_text_gets_usage_hint() {
    let relay = start_relay(fast_config()).await;
    relay.transport.push(vec![text(42, "hello there")]);
    let reply = relay.transport.nth_sent(1).await;
    assert!(reply.html.contains("Unknown command"));
    assert!(reply.menu.is_some());
    relay.manager.stop().await.unwrap();
}

#[tokio::test]
async fn test_status_and_metrics_views() {
    let relay = start_relay(fast_config()).await;
    relay.transport.push(vec![text(42, "/status")]);
    let status = relay.transport.nth_sent(1).await;
    assert!(status.html.contains("operational"));
    assert!(status.html.contains("3.1.0"));

    relay.transport.push(vec![press(42, "metrics", "m1")]);
    let metrics = relay.transport.nth_sent(2).await;
    assert!(metrics.html.contains("Detailed Metrics"));
    assert_eq!(metrics.menu.unwrap().action_ids(), vec!["menu"]);

    relay.manager.stop().await.unwrap();
}
