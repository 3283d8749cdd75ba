//! Connection Lifecycle Integration Tests
//!
//! Start retries, credential failures, reconnects and idempotent shutdown.

use std::sync::atomic::Ordering;
use std::sync::Arc;
use std::time::Duration;

use control_relay::services::remote::RemoteError;
use control_relay::{ConnectionManager, RelayConfig, StartError};
use control_relay_core::MemoryConfigStore;

use super::support::{fast_config, press, text, RecordingControl, ScriptedTransport};

fn manager(config: RelayConfig, transport: &Arc<ScriptedTransport>) -> ConnectionManager {
    ConnectionManager::new(
        config,
        transport.clone(),
        RecordingControl::new(),
        Arc::new(MemoryConfigStore::new()),
    )
}

#[tokio::test]
async fn test_unreachable_platform_gives_up_after_three_attempts() {
    let transport = ScriptedTransport::new();
    for _ in 0..3 {
        transport.fail_identify(RemoteError::Transient("connection refused".to_string()));
    }
    let manager = manager(fast_config(), &transport);

    let err = manager.start().await.unwrap_err();
    assert!(matches!(err, StartError::RetriesExhausted { attempts: 3, .. }));
    assert_eq!(transport.identify_calls.load(Ordering::SeqCst), 3);

    let status = manager.status().await;
    assert!(!status.running);
    assert!(!status.starting);
    assert!(status.last_error.unwrap().contains("connection refused"));
}

#[tokio::test]
async fn test_invalid_token_fails_without_retry() {
    let transport = ScriptedTransport::new();
    transport.fail_identify(RemoteError::PermanentCredential("Unauthorized".to_string()));
    let manager = manager(fast_config(), &transport);

    let err = manager.start().await.unwrap_err();
    assert_eq!(err, StartError::PermanentCredential("Unauthorized".to_string()));
    assert_eq!(transport.identify_calls.load(Ordering::SeqCst), 1);
}

#[tokio::test]
async fn test_missing_token() {
    let transport = ScriptedTransport::new();
    let manager = manager(RelayConfig::default(), &transport);
    assert_eq!(
        manager.start().await.unwrap_err(),
        StartError::MissingCredential
    );
    assert_eq!(transport.identify_calls.load(Ordering::SeqCst), 0);
}

#[tokio::test]
async fn test_stop_is_idempotent() {
    let transport = ScriptedTransport::new();
    let manager = manager(fast_config(), &transport);

    assert!(!manager.stop().await.unwrap().was_running);
    manager.start().await.unwrap();
    assert!(manager.stop().await.unwrap().was_running);
    assert!(!manager.stop().await.unwrap().was_running);
}

#[tokio::test]
async fn test_concurrent_start_rejected() {
    let transport = ScriptedTransport::new();
    let manager = manager(fast_config(), &transport);
    manager.start().await.unwrap();
    assert_eq!(
        manager.start().await.unwrap_err(),
        StartError::AlreadyStarting
    );
    manager.stop().await.unwrap();
}

#[tokio::test]
async fn test_relay_recovers_from_transient_receive_error() {
    let transport = ScriptedTransport::new();
    let manager = manager(fast_config(), &transport);
    manager.start().await.unwrap();

    transport.push_error(RemoteError::Transient("502 Bad Gateway".to_string()));
    transport.push(vec![text(42, "/help")]);
    let reply = transport.nth_sent(1).await;
    assert!(reply.html.contains("Available commands"));

    let status = manager.status().await;
    assert!(status.running);
    assert!(!status.reconnecting);
    manager.stop().await.unwrap();
}

#[tokio::test]
async fn test_stop_completes_while_poll_is_blocked() {
    let transport = ScriptedTransport::new();
    let manager = manager(fast_config(), &transport);
    manager.start().await.unwrap();
    transport
        .wait_for(|t| !t.offsets.lock().unwrap().is_empty())
        .await;

    let stopped = tokio::time::timeout(Duration::from_secs(1), manager.stop())
        .await
        .expect("stop waited on the long-poll");
    assert!(stopped.unwrap().was_running);
}

#[tokio::test]
async fn test_restart_processes_new_events() {
    let transport = ScriptedTransport::new();
    let manager = manager(fast_config(), &transport);

    manager.start().await.unwrap();
    manager.stop().await.unwrap();
    manager.start().await.unwrap();

    transport.push(vec![text(42, "/menu")]);
    let reply = transport.nth_sent(1).await;
    assert!(reply.html.contains("Main Menu"));
    assert_eq!(manager.status().await.total_events_processed, 1);
    manager.stop().await.unwrap();
}

#[tokio::test]
async fn test_restart_does_not_replay_last_batch() {
    let transport = ScriptedTransport::new();
    let control = RecordingControl::new();
    let manager = ConnectionManager::new(
        fast_config(),
        transport.clone(),
        control.clone(),
        Arc::new(MemoryConfigStore::new()),
    );

    manager.start().await.unwrap();
    transport.push(vec![press(42, "start_harvester", "q1")]);
    transport.nth_sent(1).await;
    transport.wait_for(|t| t.offsets.lock().unwrap().len() == 2).await;
    manager.stop().await.unwrap();
    assert_eq!(*transport.confirmed.lock().unwrap(), vec![Some(2)]);

    manager.start().await.unwrap();
    transport.wait_for(|t| t.offsets.lock().unwrap().len() == 3).await;
    assert_eq!(
        *transport.offsets.lock().unwrap(),
        vec![None, Some(2), Some(2)]
    );
    assert_eq!(control.commands(), vec!["start_harvester"]);
    manager.stop().await.unwrap();
}
