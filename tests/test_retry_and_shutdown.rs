//! Retry and shutdown integration tests
//!
//! Exercise the fixed-delay retry loop: reconnect after a dropped
//! connection, duplicate failure dedup, retry cancellation on disconnect,
//! the optional attempt cap, quiet subscribe retries, and full teardown.


use mqwatch::config::WatcherConfig;
use mqwatch::testing::FailureScript;
use mqwatch::transport::TransportEvent;
use std::time::Duration;
use test_helpers::{assert_no_event, next_status, spawn_watcher, test_config, wait_until};

fn capped_config(retry_delay_ms: u64, max_attempts: u32) -> WatcherConfig {
    let mut config = test_config(retry_delay_ms);
    config.retry.max_attempts = Some(max_attempts);
    config
}

#[tokio::test]
async fn connection_loss_reports_and_reconnects_after_delay() {
    let mut watcher = spawn_watcher(test_config(100));

    watcher.controller.start();
    watcher
        .transport
        .emit(TransportEvent::ConnectComplete { reconnected: false });
    next_status(&mut watcher.events).await;

    watcher.transport.emit(TransportEvent::ConnectionLost {
        cause: "connection refused".to_string(),
    });

    let status = next_status(&mut watcher.events).await;
    assert!(!status.connected);
    assert_eq!(status.error, Some("connection refused".to_string()));

    // Exactly one more attempt after the delay.
    wait_until(|| watcher.transport.connect_calls() == 2).await;
    tokio::time::sleep(Duration::from_millis(50)).await;
    assert_eq!(watcher.transport.connect_calls(), 2);
}

#[tokio::test]
async fn reconnect_completes_the_loop() {
    let mut watcher = spawn_watcher(test_config(50));

    watcher.controller.start();
    watcher
        .transport
        .emit(TransportEvent::ConnectComplete { reconnected: false });
    next_status(&mut watcher.events).await;

    watcher.transport.emit(TransportEvent::ConnectionLost {
        cause: "broker restarting".to_string(),
    });
    next_status(&mut watcher.events).await;

    wait_until(|| watcher.transport.connect_calls() == 2).await;
    watcher
        .transport
        .emit(TransportEvent::ConnectComplete { reconnected: true });

    let status = next_status(&mut watcher.events).await;
    assert!(status.connected);
    // The subscription is re-established on every successful connect.
    wait_until(|| watcher.transport.subscribe_calls().len() == 2).await;
}

#[tokio::test]
async fn duplicate_loss_while_retry_pending_is_silent() {
    let mut watcher = spawn_watcher(test_config(200));

    watcher.controller.start();
    watcher
        .transport
        .emit(TransportEvent::ConnectComplete { reconnected: false });
    next_status(&mut watcher.events).await;

    watcher.transport.emit(TransportEvent::ConnectionLost {
        cause: "first failure".to_string(),
    });
    let status = next_status(&mut watcher.events).await;
    assert_eq!(status.error, Some("first failure".to_string()));

    // A second loss report before the retry fires is deduplicated.
    watcher.transport.emit(TransportEvent::ConnectionLost {
        cause: "second failure".to_string(),
    });
    assert_no_event(&mut watcher.events, 100).await;

    // Still only the one pending retry.
    wait_until(|| watcher.transport.connect_calls() == 2).await;
    tokio::time::sleep(Duration::from_millis(50)).await;
    assert_eq!(watcher.transport.connect_calls(), 2);
}

#[tokio::test]
async fn failed_connect_attempt_schedules_retry() {
    let mut watcher = spawn_watcher(test_config(50));
    watcher
        .transport
        .fail_connect(FailureScript::Once("no route to host".to_string()));

    watcher.controller.start();

    let status = next_status(&mut watcher.events).await;
    assert!(!status.connected);
    assert_eq!(status.error, Some("no route to host".to_string()));

    wait_until(|| watcher.transport.connect_calls() == 2).await;
}

#[tokio::test]
async fn disconnect_cancels_pending_retry() {
    let mut watcher = spawn_watcher(test_config(500));
    watcher
        .transport
        .fail_connect(FailureScript::Once("refused".to_string()));

    watcher.controller.start();
    next_status(&mut watcher.events).await;
    assert_eq!(watcher.transport.connect_calls(), 1);

    // Disconnect lands inside the retry wait.
    watcher.controller.request_disconnect();
    let status = next_status(&mut watcher.events).await;
    assert!(!status.connected);
    assert_eq!(status.error, None);

    // The cancelled retry never fires.
    tokio::time::sleep(Duration::from_millis(700)).await;
    assert_eq!(watcher.transport.connect_calls(), 1);
    assert_no_event(&mut watcher.events, 50).await;
}

#[tokio::test]
async fn retry_cap_gives_up_with_reason() {
    let mut watcher = spawn_watcher(capped_config(50, 2));
    watcher
        .transport
        .fail_connect(FailureScript::Always("refused".to_string()));

    watcher.controller.start();

    // Initial attempt plus the two allowed retries.
    wait_until(|| watcher.transport.connect_calls() == 3).await;

    let mut last = next_status(&mut watcher.events).await;
    loop {
        assert!(!last.connected);
        if last
            .error
            .as_deref()
            .is_some_and(|e| e.contains("exhausted"))
        {
            break;
        }
        last = next_status(&mut watcher.events).await;
    }

    tokio::time::sleep(Duration::from_millis(150)).await;
    assert_eq!(watcher.transport.connect_calls(), 3);
}

#[tokio::test]
async fn subscribe_failure_retries_quietly() {
    let mut watcher = spawn_watcher(test_config(50));
    watcher
        .transport
        .fail_subscribe(FailureScript::Once("not authorized".to_string()));

    watcher.controller.start();
    watcher
        .transport
        .emit(TransportEvent::ConnectComplete { reconnected: false });
    let status = next_status(&mut watcher.events).await;
    assert!(status.connected);

    // The retry succeeds without a second status event.
    wait_until(|| watcher.transport.subscribe_calls().len() == 2).await;
    assert_no_event(&mut watcher.events, 100).await;
}

#[tokio::test]
async fn connection_loss_cancels_subscribe_retry() {
    let mut watcher = spawn_watcher(test_config(200));
    watcher
        .transport
        .fail_subscribe(FailureScript::Always("not authorized".to_string()));

    watcher.controller.start();
    watcher
        .transport
        .emit(TransportEvent::ConnectComplete { reconnected: false });
    next_status(&mut watcher.events).await;
    wait_until(|| watcher.transport.subscribe_calls().len() == 1).await;

    watcher.transport.emit(TransportEvent::ConnectionLost {
        cause: "gone".to_string(),
    });
    next_status(&mut watcher.events).await;

    // The pending subscribe retry dies with the connection; only the
    // reconnect timer survives.
    tokio::time::sleep(Duration::from_millis(300)).await;
    assert_eq!(watcher.transport.subscribe_calls().len(), 1);
}

#[tokio::test]
async fn shutdown_emits_final_destroyed_status() {
    let mut watcher = spawn_watcher(test_config(5000));

    watcher.controller.start();
    watcher
        .transport
        .emit(TransportEvent::ConnectComplete { reconnected: false });
    next_status(&mut watcher.events).await;

    watcher.controller.shutdown().await;

    let status = next_status(&mut watcher.events).await;
    assert!(!status.connected);
    assert_eq!(status.error, Some("Service destroyed".to_string()));

    assert_eq!(watcher.transport.disconnect_calls(), 1);
    assert_eq!(watcher.transport.close_calls(), 1);
}

#[tokio::test]
async fn shutdown_while_idle_still_closes_transport() {
    let mut watcher = spawn_watcher(test_config(5000));

    watcher.controller.shutdown().await;

    let status = next_status(&mut watcher.events).await;
    assert_eq!(status.error, Some("Service destroyed".to_string()));
    assert_eq!(watcher.transport.close_calls(), 1);
}
