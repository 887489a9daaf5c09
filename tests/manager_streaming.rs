//! Streaming manager recovering from receiver-side drops

use std::time::Duration;

use raop_streamer::connection::SessionEvent;
use raop_streamer::testing::{MockRaopConfig, MockRaopServer, mock_device};
use raop_streamer::{AirPlayConfig, AirPlayManager, ConnectionStatus};

fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_max_level(tracing::Level::DEBUG)
        .with_test_writer()
        .try_init();
}

async fn wait_for<F: Fn() -> bool>(condition: F, timeout: Duration) -> bool {
    let deadline = tokio::time::Instant::now() + timeout;
    while tokio::time::Instant::now() < deadline {
        if condition() {
            return true;
        }
        tokio::time::sleep(Duration::from_millis(5)).await;
    }
    condition()
}

#[tokio::test]
async fn test_manager_reconnects_after_drop() {
    init_tracing();
    let mut server = MockRaopServer::new(MockRaopConfig::default()).unwrap();
    server.start().await.unwrap();

    let config = AirPlayConfig::builder()
        .client_base_port(0)
        .auto_reconnect(true)
        .reconnect(5, Duration::from_millis(20))
        .timing(Duration::from_millis(5), Duration::from_millis(25))
        .build();
    let manager = AirPlayManager::new(config);
    manager.prepare(44_100, 512);
    let mut events = manager.subscribe();

    manager
        .connect_to_device(&mock_device(&server))
        .await
        .unwrap();
    manager.push_audio_data(&vec![0.25f32; 352 * 2 * 4]);
    assert!(server.wait_for_packets(2, Duration::from_secs(2)).await);

    server.close_connections();

    assert!(
        wait_for(|| server.state().connections >= 2, Duration::from_secs(3)).await,
        "manager never reconnected"
    );
    assert!(
        wait_for(
            || manager.connection_status() == ConnectionStatus::Connected("Mock RAOP".to_string()),
            Duration::from_secs(2)
        )
        .await
    );

    let mut saw_reconnect = false;
    while let Ok(event) = events.try_recv() {
        if matches!(event, SessionEvent::ReconnectAttempt { .. }) {
            saw_reconnect = true;
        }
    }
    assert!(saw_reconnect);

    // Audio flows again on the new link
    server.reset();
    assert!(server.wait_for_packets(1, Duration::from_secs(2)).await);

    manager.disconnect_from_device().await;
    assert_eq!(manager.connection_status(), ConnectionStatus::Disconnected);
}

#[tokio::test]
async fn test_manager_reports_error_without_auto_reconnect() {
    init_tracing();
    let mut server = MockRaopServer::new(MockRaopConfig::default()).unwrap();
    server.start().await.unwrap();

    let config = AirPlayConfig::builder()
        .client_base_port(0)
        .auto_reconnect(false)
        .timing(Duration::from_millis(5), Duration::from_millis(25))
        .build();
    let manager = AirPlayManager::new(config);
    manager
        .connect_to_device(&mock_device(&server))
        .await
        .unwrap();

    server.close_connections();

    assert!(
        wait_for(
            || matches!(manager.connection_status(), ConnectionStatus::Error(_)),
            Duration::from_secs(2)
        )
        .await
    );
    assert!(manager.last_error().is_some());
    assert!(!manager.is_connected());
    assert_eq!(server.state().connections, 1);
}
