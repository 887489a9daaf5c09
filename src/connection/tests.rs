use std::time::Duration;

use tokio::net::TcpListener;

use super::{ConnectionState, ConnectionStats, RaopSession, ReconnectOutcome, SessionEvent};
use crate::error::RaopError;
use crate::types::{AirPlayConfig, AirPlayDevice};

fn test_config() -> AirPlayConfig {
    AirPlayConfig::builder()
        .connect_timeout(Duration::from_millis(500))
        .rtsp_timeout(Duration::from_millis(500))
        .client_base_port(0)
        .auto_reconnect(false)
        .build()
}

/// A loopback port with nothing listening on it
async fn closed_port() -> u16 {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    listener.local_addr().unwrap().port()
}

#[test]
fn test_state_display() {
    assert_eq!(ConnectionState::Disconnected.to_string(), "Disconnected");
    assert_eq!(ConnectionState::Connecting.to_string(), "Connecting");
    assert_eq!(ConnectionState::Connected.to_string(), "Connected");
    assert_eq!(ConnectionState::Reconnecting.to_string(), "Reconnecting");
    assert_eq!(ConnectionState::Error.to_string(), "Error");
    assert_eq!(ConnectionState::TimedOut.to_string(), "Timed out");
}

#[test]
fn test_state_predicates() {
    assert!(ConnectionState::Connected.is_connected());
    assert!(ConnectionState::Reconnecting.is_active());
    assert!(!ConnectionState::Disconnected.is_active());
    assert!(ConnectionState::TimedOut.is_failed());
    assert!(ConnectionState::Error.is_failed());
    assert!(!ConnectionState::Connected.is_failed());
}

#[test]
fn test_stats_record() {
    let mut stats = ConnectionStats::default();
    assert!(stats.uptime().is_none());
    stats.record_sent(100);
    stats.record_sent(50);
    stats.record_failure();
    assert_eq!(stats.packets_sent, 2);
    assert_eq!(stats.bytes_sent, 150);
    assert_eq!(stats.send_failures, 1);
}

#[tokio::test]
async fn test_fresh_session_is_disconnected() {
    let session = RaopSession::new(test_config());
    assert_eq!(session.state(), ConnectionState::Disconnected);
    assert!(!session.is_connected());
    assert!(session.last_error().is_none());
    assert!(session.connected_device().is_none());
    assert!(!session.is_auto_reconnect_enabled().await);
    assert_eq!(session.consecutive_failures().await, 0);
}

#[tokio::test]
async fn test_identity_is_stable() {
    let session = RaopSession::new(test_config());
    let identity = session.identity().clone();
    assert_eq!(identity.client_instance.len(), 16);
    assert_eq!(identity.dacp_id.len(), 16);
    assert!(identity.device_id.starts_with("0x"));
    assert_eq!(session.identity(), &identity);
}

#[tokio::test]
async fn test_invalid_device_rejected() {
    let session = RaopSession::new(test_config());
    let err = session
        .connect(&AirPlayDevice::new("", ""))
        .await
        .unwrap_err();
    assert!(matches!(err, RaopError::InvalidDevice { .. }));
    assert_eq!(session.state(), ConnectionState::Disconnected);
    assert!(session.last_error().is_some());
}

#[tokio::test]
async fn test_unreachable_receiver() {
    let session = RaopSession::new(test_config());
    let mut events = session.subscribe();
    let device = AirPlayDevice::new("Nobody", "127.0.0.1").with_port(closed_port().await);

    assert!(session.connect(&device).await.is_err());
    assert!(matches!(
        session.state(),
        ConnectionState::TimedOut | ConnectionState::Error
    ));
    assert!(!session.last_error().unwrap_or_default().is_empty());

    let first = events.recv().await.unwrap();
    assert!(matches!(
        first,
        SessionEvent::StateChanged {
            old: ConnectionState::Disconnected,
            new: ConnectionState::Connecting,
        }
    ));
}

#[tokio::test]
async fn test_send_requires_connection() {
    let session = RaopSession::new(test_config());
    let err = session.send_audio(&[0u8; 1408], 2).await.unwrap_err();
    assert!(matches!(err, RaopError::InvalidState { .. }));
    assert!(!session.check_connection().await);
    assert_eq!(
        session.attempt_reconnect().await,
        ReconnectOutcome::NotReconnecting
    );
}

#[tokio::test]
async fn test_disconnect_when_idle() {
    let session = RaopSession::new(test_config());
    session.disconnect().await;
    assert_eq!(session.state(), ConnectionState::Disconnected);
}

#[tokio::test]
async fn test_disconnect_after_failure_clears_error_state() {
    let session = RaopSession::new(test_config());
    let device = AirPlayDevice::new("Nobody", "127.0.0.1").with_port(closed_port().await);
    let _ = session.connect(&device).await;
    assert!(session.state().is_failed());

    session.disconnect().await;
    assert_eq!(session.state(), ConnectionState::Disconnected);
}

#[tokio::test]
async fn test_toggle_auto_reconnect() {
    let session = RaopSession::new(test_config());
    session.set_auto_reconnect(true).await;
    assert!(session.is_auto_reconnect_enabled().await);
}
