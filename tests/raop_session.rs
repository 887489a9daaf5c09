//! End-to-end RAOP sessions against the in-process mock receiver

use std::time::Duration;

use raop_streamer::connection::{ConnectionState, ReconnectOutcome, SessionEvent};
use raop_streamer::protocol::crypto::AuthError;
use raop_streamer::protocol::rtsp::Method;
use raop_streamer::protocol::rtsp::headers::{names, raop};
use raop_streamer::testing::{MockRaopConfig, MockRaopServer, mock_device};
use raop_streamer::{AirPlayConfig, RaopError, RaopSession};
use tracing_subscriber::EnvFilter;

fn init_tracing() {
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("raop_streamer=debug"));
    let _ = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_test_writer()
        .try_init();
}

fn config() -> AirPlayConfig {
    AirPlayConfig::builder()
        .client_base_port(0)
        .auto_reconnect(false)
        .connect_timeout(Duration::from_secs(2))
        .rtsp_timeout(Duration::from_secs(2))
        .build()
}

async fn start_mock(config: MockRaopConfig) -> MockRaopServer {
    let mut server = MockRaopServer::new(config).expect("mock key");
    server.start().await.expect("failed to start mock server");
    server
}

#[tokio::test]
async fn test_stream_to_fixed_ports() {
    init_tracing();
    let server = start_mock(MockRaopConfig {
        audio_port: 6000,
        control_port: 6001,
        timing_port: 6002,
        transport: Some("RTP/AVP/UDP;server_port=6000-6001;timing_port=6002".to_string()),
        session_id: "ABC".to_string(),
        ..Default::default()
    })
    .await;

    let session = RaopSession::new(config());
    session.connect(&mock_device(&server)).await.unwrap();
    assert_eq!(session.state(), ConnectionState::Connected);
    assert!(session.last_error().is_none());

    // 352 stereo frames of 16-bit PCM
    let payload = vec![0u8; 352 * 4];
    for _ in 0..3 {
        session.send_audio(&payload, 2).await.unwrap();
    }
    assert!(server.wait_for_packets(3, Duration::from_secs(2)).await);

    let packets = server.rtp_packets();
    assert_eq!(packets.len(), 3);
    for (i, packet) in packets.iter().enumerate() {
        assert_eq!(packet.header.sequence, u16::try_from(i).unwrap());
        assert_eq!(packet.header.marker, i == 0);
    }
    let stamps: Vec<u32> = packets.iter().map(|p| p.header.timestamp).collect();
    assert_eq!(stamps[1].wrapping_sub(stamps[0]), 352);
    assert_eq!(stamps[2].wrapping_sub(stamps[1]), 352);

    let state = server.state();
    let record = state.last_request(Method::Record).unwrap();
    assert_eq!(record.headers.get(names::SESSION), Some("ABC"));

    session.disconnect().await;
    assert_eq!(session.state(), ConnectionState::Disconnected);
}

#[tokio::test]
async fn test_handshake_order_and_headers() {
    init_tracing();
    let server = start_mock(MockRaopConfig::default()).await;

    let session = RaopSession::new(config());
    session.connect(&mock_device(&server)).await.unwrap();

    let state = server.state();
    assert_eq!(
        state.methods(),
        vec![
            Method::Options,
            Method::Announce,
            Method::Setup,
            Method::Record,
        ]
    );

    let identity = session.identity();
    for (i, request) in state.requests.iter().enumerate() {
        assert_eq!(request.headers.cseq(), Some(u32::try_from(i + 1).unwrap()));
        assert_eq!(
            request.headers.get(names::USER_AGENT),
            Some(identity.user_agent.as_str())
        );
        assert_eq!(
            request.headers.get(names::CLIENT_INSTANCE),
            Some(identity.client_instance.as_str())
        );
        assert_eq!(
            request.headers.get(names::DACP_ID),
            Some(identity.dacp_id.as_str())
        );
        assert_eq!(
            request.headers.get(raop::APPLE_DEVICE_ID),
            Some(identity.device_id.as_str())
        );
    }

    let options = state.last_request(Method::Options).unwrap();
    assert!(options.headers.contains(raop::APPLE_CHALLENGE));
    assert!(!options.headers.contains(names::SESSION));

    let setup = state.last_request(Method::Setup).unwrap();
    let transport = setup.headers.get(names::TRANSPORT).unwrap();
    assert!(transport.starts_with("RTP/AVP/UDP;unicast;interleaved=0-1;mode=record"));
    assert!(transport.contains("control_port="));
    assert!(transport.contains("timing_port="));

    let record = state.last_request(Method::Record).unwrap();
    assert_eq!(record.headers.get(names::SESSION), Some("DEADBEEF"));

    session.disconnect().await;
}

#[tokio::test]
async fn test_announced_key_reaches_receiver() {
    init_tracing();
    let server = start_mock(MockRaopConfig::default()).await;

    let session = RaopSession::new(config());
    session.connect(&mock_device(&server)).await.unwrap();
    assert!(session.is_encrypted().await);

    let state = server.state();
    assert!(state.aes_key.is_some());
    assert!(state.aes_iv.is_some());

    let pcm: Vec<u8> = (0..352 * 4).map(|i| (i % 251) as u8).collect();
    session.send_audio(&pcm, 2).await.unwrap();
    assert!(server.wait_for_packets(1, Duration::from_secs(2)).await);

    let payloads = server.audio_payloads();
    assert_eq!(payloads.len(), 1);
    assert_eq!(payloads[0], pcm);
    assert_ne!(server.rtp_packets()[0].payload, pcm);

    session.disconnect().await;
}

#[tokio::test]
async fn test_no_receiver_key_streams_clear() {
    init_tracing();
    let server = start_mock(MockRaopConfig::default()).await;

    let mut device = mock_device(&server);
    device.server_public_key = None;

    let session = RaopSession::new(config());
    session.connect(&device).await.unwrap();
    assert!(!session.is_encrypted().await);
    assert!(server.state().aes_key.is_none());

    let pcm = vec![7u8; 352 * 4];
    session.send_audio(&pcm, 2).await.unwrap();
    assert!(server.wait_for_packets(1, Duration::from_secs(2)).await);
    assert_eq!(server.rtp_packets()[0].payload, pcm);

    session.disconnect().await;
}

#[tokio::test]
async fn test_auth_disabled_sends_no_challenge() {
    init_tracing();
    let server = start_mock(MockRaopConfig::default()).await;

    let session = RaopSession::new(
        AirPlayConfig::builder()
            .client_base_port(0)
            .auto_reconnect(false)
            .auth_enabled(false)
            .build(),
    );
    session.connect(&mock_device(&server)).await.unwrap();

    let state = server.state();
    let options = state.last_request(Method::Options).unwrap();
    assert!(!options.headers.contains(raop::APPLE_CHALLENGE));
    assert!(state.aes_key.is_none());

    session.disconnect().await;
}

#[tokio::test]
async fn test_missing_session_header() {
    init_tracing();
    let server = start_mock(MockRaopConfig {
        omit_session: true,
        ..Default::default()
    })
    .await;

    let session = RaopSession::new(config());
    let err = session.connect(&mock_device(&server)).await.unwrap_err();
    assert!(matches!(err, RaopError::MissingSession));
    assert_eq!(session.state(), ConnectionState::Error);
    assert_eq!(session.last_error(), Some(err.to_string()));
    assert!(!server.state().methods().contains(&Method::Record));
}

#[tokio::test]
async fn test_missing_transport_header() {
    init_tracing();
    let server = start_mock(MockRaopConfig {
        omit_transport: true,
        ..Default::default()
    })
    .await;

    let session = RaopSession::new(config());
    let err = session.connect(&mock_device(&server)).await.unwrap_err();
    assert!(matches!(err, RaopError::MissingTransportInfo));
    assert_eq!(session.state(), ConnectionState::Error);
}

#[tokio::test]
async fn test_unauthorized_announce() {
    init_tracing();
    let server = start_mock(MockRaopConfig::default().fail(Method::Announce, 401)).await;

    let session = RaopSession::new(config());
    let err = session.connect(&mock_device(&server)).await.unwrap_err();
    assert!(matches!(err, RaopError::AuthenticationFailed { .. }));
    assert_eq!(session.state(), ConnectionState::Error);
}

#[tokio::test]
async fn test_rejected_setup() {
    init_tracing();
    let server = start_mock(MockRaopConfig::default().fail(Method::Setup, 453)).await;

    let session = RaopSession::new(config());
    let err = session.connect(&mock_device(&server)).await.unwrap_err();
    assert!(matches!(
        err,
        RaopError::RtspError {
            method: "SETUP",
            status_code: 453,
            ..
        }
    ));
}

#[tokio::test]
async fn test_undecodable_apple_response() {
    init_tracing();
    let server = start_mock(MockRaopConfig {
        apple_response: Some("!!not base64!!".to_string()),
        ..Default::default()
    })
    .await;

    let session = RaopSession::new(config());
    let err = session.connect(&mock_device(&server)).await.unwrap_err();
    assert!(matches!(err, RaopError::AuthenticationFailed { .. }));
    assert_eq!(server.state().methods(), vec![Method::Options]);
}

#[tokio::test]
async fn test_missing_apple_response_is_tolerated() {
    init_tracing();
    let server = start_mock(MockRaopConfig {
        sign_challenge: false,
        ..Default::default()
    })
    .await;

    let session = RaopSession::new(config());
    session.connect(&mock_device(&server)).await.unwrap();
    assert!(session.is_connected());
    session.disconnect().await;
}

#[tokio::test]
async fn test_timing_requests_are_answered() {
    init_tracing();
    let server = start_mock(MockRaopConfig::default()).await;

    let session = RaopSession::new(config());
    session.connect(&mock_device(&server)).await.unwrap();

    let reply = server.probe_timing(Duration::from_secs(2)).await.unwrap();
    assert_eq!(
        reply.payload_type,
        raop_streamer::protocol::rtp::PayloadType::TimingResponse
    );
    assert_eq!(reply.sequence, 7);

    session.disconnect().await;
}

#[tokio::test]
async fn test_teardown_on_disconnect() {
    init_tracing();
    let server = start_mock(MockRaopConfig::default()).await;

    let session = RaopSession::new(config());
    session.connect(&mock_device(&server)).await.unwrap();
    assert!(server.state().recording);

    session.disconnect().await;
    tokio::time::sleep(Duration::from_millis(50)).await;

    let state = server.state();
    assert_eq!(state.methods().last(), Some(&Method::Teardown));
    let teardown = state.last_request(Method::Teardown).unwrap();
    assert_eq!(teardown.headers.get(names::SESSION), Some("DEADBEEF"));
    assert!(!state.recording);
    assert!(session.connected_device().is_none());
}

#[tokio::test]
async fn test_reconnect_after_receiver_drops_connection() {
    init_tracing();
    let server = start_mock(MockRaopConfig::default()).await;

    let session = RaopSession::new(
        AirPlayConfig::builder()
            .client_base_port(0)
            .auto_reconnect(true)
            .reconnect(3, Duration::from_millis(20))
            .build(),
    );
    let mut events = session.subscribe();
    session.connect(&mock_device(&server)).await.unwrap();
    assert!(session.check_connection().await);

    server.close_connections();
    tokio::time::sleep(Duration::from_millis(100)).await;

    assert!(!session.check_connection().await);
    assert_eq!(session.state(), ConnectionState::Reconnecting);
    assert!(session.last_error().is_some());

    let mut outcome = session.attempt_reconnect().await;
    let deadline = tokio::time::Instant::now() + Duration::from_secs(2);
    while outcome == ReconnectOutcome::Wait && tokio::time::Instant::now() < deadline {
        tokio::time::sleep(Duration::from_millis(10)).await;
        outcome = session.attempt_reconnect().await;
    }
    assert_eq!(
        outcome,
        ReconnectOutcome::Attempted {
            attempt: 1,
            succeeded: true
        }
    );
    assert_eq!(session.state(), ConnectionState::Connected);
    assert!(session.last_error().is_none());
    assert_eq!(server.state().connections, 2);

    let mut saw_attempt = false;
    while let Ok(event) = events.try_recv() {
        if matches!(event, SessionEvent::ReconnectAttempt { attempt: 1, max: 3 }) {
            saw_attempt = true;
        }
    }
    assert!(saw_attempt);

    // Sequence numbering restarts on the new link
    session.send_audio(&[0u8; 352 * 4], 2).await.unwrap();
    assert!(server.wait_for_packets(1, Duration::from_secs(2)).await);
    let packets = server.rtp_packets();
    assert!(packets.last().unwrap().header.marker);

    session.disconnect().await;
}

#[tokio::test]
async fn test_unhealthy_without_auto_reconnect() {
    init_tracing();
    let server = start_mock(MockRaopConfig::default()).await;

    let session = RaopSession::new(config());
    session.connect(&mock_device(&server)).await.unwrap();

    server.close_connections();
    tokio::time::sleep(Duration::from_millis(100)).await;

    assert!(!session.check_connection().await);
    assert_eq!(session.state(), ConnectionState::Error);
    assert_eq!(
        session.attempt_reconnect().await,
        ReconnectOutcome::NotReconnecting
    );
}

#[tokio::test]
async fn test_stale_link_marked_unhealthy() {
    init_tracing();
    let server = start_mock(MockRaopConfig::default()).await;

    let session = RaopSession::new(
        AirPlayConfig::builder()
            .client_base_port(0)
            .auto_reconnect(false)
            .staleness_window(Duration::from_millis(200))
            .build(),
    );
    session.connect(&mock_device(&server)).await.unwrap();
    assert!(session.check_connection().await);

    tokio::time::sleep(Duration::from_millis(400)).await;

    assert!(!session.check_connection().await);
    assert_eq!(session.state(), ConnectionState::Error);
    assert!(session.connected_device().is_none());
    let error = session.last_error().unwrap();
    assert!(error.contains("no audio delivered"), "{error}");
}

#[tokio::test]
async fn test_stale_link_starts_reconnect() {
    init_tracing();
    let server = start_mock(MockRaopConfig::default()).await;

    let session = RaopSession::new(
        AirPlayConfig::builder()
            .client_base_port(0)
            .auto_reconnect(true)
            .staleness_window(Duration::from_millis(200))
            .build(),
    );
    session.connect(&mock_device(&server)).await.unwrap();

    tokio::time::sleep(Duration::from_millis(400)).await;

    assert!(!session.check_connection().await);
    assert_eq!(session.state(), ConnectionState::Reconnecting);
}

#[tokio::test]
async fn test_send_failure_streak_marks_unhealthy() {
    init_tracing();
    let server = start_mock(MockRaopConfig::default()).await;

    let mut device = mock_device(&server);
    device.server_public_key = None;

    let session = RaopSession::new(
        AirPlayConfig::builder()
            .client_base_port(0)
            .auto_reconnect(false)
            .send_failure_threshold(2)
            .build(),
    );
    session.connect(&device).await.unwrap();

    // larger than any UDP datagram
    let oversized = vec![0u8; 70_000];
    for expected in 1..=2 {
        let err = session.send_audio(&oversized, 2).await.unwrap_err();
        assert!(matches!(err, RaopError::SendFailed { .. }));
        assert_eq!(session.consecutive_failures().await, expected);
        assert_eq!(session.state(), ConnectionState::Connected);
    }

    let err = session.send_audio(&oversized, 2).await.unwrap_err();
    assert!(matches!(err, RaopError::SendFailed { .. }));
    assert_eq!(session.state(), ConnectionState::Error);
    assert_eq!(session.last_error(), Some(err.to_string()));
    assert_eq!(session.stats().await.send_failures, 3);

    let err = session.send_audio(&[0u8; 352 * 4], 2).await.unwrap_err();
    assert!(matches!(err, RaopError::InvalidState { .. }));
}

#[tokio::test]
async fn test_send_failure_starts_reconnect() {
    init_tracing();
    let server = start_mock(MockRaopConfig::default()).await;

    let mut device = mock_device(&server);
    device.server_public_key = None;

    let session = RaopSession::new(
        AirPlayConfig::builder()
            .client_base_port(0)
            .auto_reconnect(true)
            .send_failure_threshold(0)
            .build(),
    );
    let mut events = session.subscribe();
    session.connect(&device).await.unwrap();

    assert!(session.send_audio(&vec![0u8; 70_000], 2).await.is_err());
    assert_eq!(session.state(), ConnectionState::Reconnecting);
    let error = session.last_error().unwrap();
    assert!(error.contains("send failed"), "{error}");

    let mut recoverable = false;
    while let Ok(event) = events.try_recv() {
        if let SessionEvent::Error { recoverable: r, .. } = event {
            recoverable = r;
        }
    }
    assert!(recoverable);
}

#[tokio::test]
async fn test_unusable_receiver_key_fails_announce() {
    init_tracing();
    let server = start_mock(MockRaopConfig::default()).await;

    let device = mock_device(&server).with_server_public_key(vec![0u8; 10]);

    let session = RaopSession::new(config());
    let err = session.connect(&device).await.unwrap_err();
    assert!(matches!(
        err,
        RaopError::Auth(AuthError::UnsupportedKeyFormat)
    ));
    assert_eq!(session.state(), ConnectionState::Error);
    assert_eq!(session.last_error(), Some(err.to_string()));
    assert!(!session.is_encrypted().await);
    assert!(!server.state().methods().contains(&Method::Announce));
}

#[tokio::test]
async fn test_reconnect_exhausted() {
    init_tracing();
    let mut server = start_mock(MockRaopConfig::default()).await;

    let session = RaopSession::new(
        AirPlayConfig::builder()
            .client_base_port(0)
            .auto_reconnect(true)
            .reconnect(2, Duration::from_millis(5))
            .connect_timeout(Duration::from_millis(500))
            .build(),
    );
    session.connect(&mock_device(&server)).await.unwrap();

    server.stop();
    tokio::time::sleep(Duration::from_millis(100)).await;
    assert!(!session.check_connection().await);
    assert_eq!(session.state(), ConnectionState::Reconnecting);

    let deadline = tokio::time::Instant::now() + Duration::from_secs(5);
    let mut outcome = session.attempt_reconnect().await;
    while outcome != ReconnectOutcome::Exhausted && tokio::time::Instant::now() < deadline {
        tokio::time::sleep(Duration::from_millis(10)).await;
        outcome = session.attempt_reconnect().await;
    }
    assert_eq!(outcome, ReconnectOutcome::Exhausted);
    assert_eq!(session.state(), ConnectionState::Error);
    assert_eq!(
        session.last_error(),
        Some(RaopError::ReconnectExhausted { attempts: 2 }.to_string())
    );
}

#[tokio::test]
async fn test_reconnect_to_another_device_supersedes() {
    init_tracing();
    let first = start_mock(MockRaopConfig::default()).await;
    let second = start_mock(MockRaopConfig {
        name: "Second".to_string(),
        mac_address: [0xAA, 0xBB, 0xCC, 0xDD, 0xEE, 0xFF],
        ..Default::default()
    })
    .await;

    let session = RaopSession::new(config());
    session.connect(&mock_device(&first)).await.unwrap();
    session.connect(&mock_device(&second)).await.unwrap();

    tokio::time::sleep(Duration::from_millis(50)).await;
    assert_eq!(first.state().methods().last(), Some(&Method::Teardown));
    assert_eq!(
        session.connected_device().map(|d| d.name),
        Some("Second".to_string())
    );

    session.disconnect().await;
}
