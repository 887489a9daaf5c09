//! RAOP sender session
//!
//! Owns the RTSP control connection, the three UDP sockets and the RTP
//! counters for one receiver. All mutable state sits behind a single async
//! lock; observers read a published [`SessionStatus`] snapshot instead.

use std::net::SocketAddr;

use rand::Rng;
use tokio::net::UdpSocket;
use tokio::sync::{Mutex, broadcast, watch};
use tokio::task::JoinHandle;
use tokio::time::Instant;
use tracing::{debug, info, warn};

use super::channel::RtspChannel;
use super::reconnect::{ReconnectDecision, ReconnectOutcome, ReconnectPolicy};
use super::state::{ConnectionState, ConnectionStats, DisconnectReason, SessionEvent};
use super::timing::spawn_responder;
use crate::error::{RaopError, Result};
use crate::net::{Runtime, bind_port_block, resolve_host};
use crate::protocol::raop::{AirPlayAuth, ClientIdentity, KeyExchange, RaopRtspSession};
use crate::protocol::rtp::RtpState;
use crate::protocol::rtp::constants::BYTES_PER_SAMPLE;
use crate::protocol::rtsp::headers::raop;
use crate::protocol::rtsp::{RtspRequest, RtspResponse};
use crate::protocol::sdp::AnnounceParams;
use crate::types::{AirPlayConfig, AirPlayDevice, KeyFallback};

/// Snapshot published on every state or error change
#[derive(Debug, Clone, Default)]
pub struct SessionStatus {
    /// Current state
    pub state: ConnectionState,
    /// Most recent failure, if any
    pub last_error: Option<String>,
    /// Device of the current or last attempted connection
    pub device: Option<AirPlayDevice>,
}

/// Sockets and counters of an established connection
struct Link {
    channel: RtspChannel,
    rtsp: RaopRtspSession,
    audio: UdpSocket,
    _control: UdpSocket,
    server_audio: SocketAddr,
    rtp: RtpState,
    timing_task: JoinHandle<()>,
}

impl Drop for Link {
    fn drop(&mut self) {
        self.timing_task.abort();
    }
}

struct SessionInner<K> {
    auth: K,
    link: Option<Link>,
    device: Option<AirPlayDevice>,
    state: ConnectionState,
    last_error: Option<String>,
    auto_reconnect: bool,
    consecutive_failures: u32,
    last_success: Option<Instant>,
    policy: ReconnectPolicy,
    stats: ConnectionStats,
}

/// Streaming session with one RAOP receiver
pub struct RaopSession<K: KeyExchange = AirPlayAuth> {
    config: AirPlayConfig,
    identity: ClientIdentity,
    inner: Mutex<SessionInner<K>>,
    status_tx: watch::Sender<SessionStatus>,
    event_tx: broadcast::Sender<SessionEvent>,
}

impl RaopSession<AirPlayAuth> {
    /// Create a session using the built-in RSA/AES key exchange
    #[must_use]
    pub fn new(config: AirPlayConfig) -> Self {
        Self::with_key_exchange(config, AirPlayAuth::new())
    }
}

impl<K: KeyExchange> RaopSession<K> {
    /// Create a session with a custom key exchange
    #[must_use]
    pub fn with_key_exchange(config: AirPlayConfig, auth: K) -> Self {
        let (status_tx, _) = watch::channel(SessionStatus::default());
        let (event_tx, _) = broadcast::channel(64);
        let identity = ClientIdentity::generate(config.user_agent.clone());
        let policy =
            ReconnectPolicy::new(config.max_reconnect_attempts, config.reconnect_base_delay);

        Self {
            inner: Mutex::new(SessionInner {
                auth,
                link: None,
                device: None,
                state: ConnectionState::Disconnected,
                last_error: None,
                auto_reconnect: config.auto_reconnect,
                consecutive_failures: 0,
                last_success: None,
                policy,
                stats: ConnectionStats::default(),
            }),
            config,
            identity,
            status_tx,
            event_tx,
        }
    }

    /// Session configuration
    #[must_use]
    pub fn config(&self) -> &AirPlayConfig {
        &self.config
    }

    /// Identity headers sent with every request
    #[must_use]
    pub fn identity(&self) -> &ClientIdentity {
        &self.identity
    }

    /// Get current connection state
    #[must_use]
    pub fn state(&self) -> ConnectionState {
        self.status_tx.borrow().state
    }

    /// Check if audio can be sent
    #[must_use]
    pub fn is_connected(&self) -> bool {
        self.state().is_connected()
    }

    /// Most recent failure description
    #[must_use]
    pub fn last_error(&self) -> Option<String> {
        self.status_tx.borrow().last_error.clone()
    }

    /// Device currently streamed to
    #[must_use]
    pub fn connected_device(&self) -> Option<AirPlayDevice> {
        let status = self.status_tx.borrow();
        if status.state.is_connected() {
            status.device.clone()
        } else {
            None
        }
    }

    /// Current status snapshot
    #[must_use]
    pub fn status(&self) -> SessionStatus {
        self.status_tx.borrow().clone()
    }

    /// Watch status snapshots
    #[must_use]
    pub fn watch_status(&self) -> watch::Receiver<SessionStatus> {
        self.status_tx.subscribe()
    }

    /// Subscribe to session events
    #[must_use]
    pub fn subscribe(&self) -> broadcast::Receiver<SessionEvent> {
        self.event_tx.subscribe()
    }

    /// Enable or disable reconnecting after the link goes unhealthy
    pub async fn set_auto_reconnect(&self, enabled: bool) {
        self.inner.lock().await.auto_reconnect = enabled;
    }

    /// Check whether automatic reconnect is enabled
    pub async fn is_auto_reconnect_enabled(&self) -> bool {
        self.inner.lock().await.auto_reconnect
    }

    /// Send failures since the last successful send
    pub async fn consecutive_failures(&self) -> u32 {
        self.inner.lock().await.consecutive_failures
    }

    /// Get connection statistics
    pub async fn stats(&self) -> ConnectionStats {
        self.inner.lock().await.stats.clone()
    }

    /// Check whether payloads are being encrypted
    pub async fn is_encrypted(&self) -> bool {
        self.inner.lock().await.auth.is_encryption_enabled()
    }

    /// Connect to a receiver
    ///
    /// Closes any existing link first, then runs the full RTSP handshake.
    ///
    /// # Errors
    ///
    /// Returns the failing step's error; the same text is stored as
    /// [`last_error`](Self::last_error).
    pub async fn connect(&self, device: &AirPlayDevice) -> Result<()> {
        let mut guard = self.inner.lock().await;
        let inner = &mut *guard;

        if !device.is_valid() {
            let err = RaopError::InvalidDevice {
                reason: "device needs a name and host address".to_string(),
            };
            self.record_error(inner, &err);
            return Err(err);
        }

        if inner.link.is_some() {
            self.close_link(inner, DisconnectReason::Superseded).await;
        }
        inner.policy.reset();
        inner.stats = ConnectionStats::default();
        inner.device = Some(device.clone());
        self.set_state(inner, ConnectionState::Connecting);

        info!("connecting to {}", device);
        match self.handshake(&mut inner.auth, device).await {
            Ok(link) => {
                self.install(inner, link, device);
                Ok(())
            }
            Err(err) => {
                inner.auth.reset_session();
                self.record_error(inner, &err);
                let state = match err {
                    RaopError::ConnectionTimeout { .. } | RaopError::ConnectionFailed { .. } => {
                        ConnectionState::TimedOut
                    }
                    _ => ConnectionState::Error,
                };
                self.set_state(inner, state);
                Err(err)
            }
        }
    }

    /// Send one encoded packet of 16-bit audio
    ///
    /// The frame count is derived from the payload size.
    ///
    /// # Errors
    ///
    /// `InvalidState` when not connected, `SendFailed` when the datagram
    /// could not be sent.
    pub async fn send_audio(&self, payload: &[u8], channels: usize) -> Result<()> {
        let bytes_per_frame = channels.max(1) * BYTES_PER_SAMPLE;
        let frames = u32::try_from(payload.len() / bytes_per_frame).unwrap_or(u32::MAX);
        self.send_frames(payload, frames).await
    }

    /// Send one encoded packet carrying `frames` frames
    ///
    /// # Errors
    ///
    /// `InvalidState` when not connected, `SendFailed` when the datagram
    /// could not be sent.
    pub async fn send_frames(&self, payload: &[u8], frames: u32) -> Result<()> {
        let mut guard = self.inner.lock().await;
        let inner = &mut *guard;

        let link = match inner.link.as_mut() {
            Some(link) if inner.state.is_connected() && link.server_audio.port() != 0 => link,
            _ => {
                return Err(RaopError::InvalidState {
                    message: "no audio link".to_string(),
                    current_state: inner.state.to_string(),
                });
            }
        };

        let body = inner.auth.encrypt_payload(payload);
        let packet = link.rtp.next_packet(body).encode();

        match link.audio.send_to(&packet, link.server_audio).await {
            Ok(_) => {
                link.rtp.advance(frames);
                inner.consecutive_failures = 0;
                inner.last_success = Some(Runtime::now());
                inner.stats.record_sent(packet.len());
                Ok(())
            }
            Err(e) => {
                inner.consecutive_failures += 1;
                inner.stats.record_failure();
                let err = RaopError::SendFailed {
                    message: e.to_string(),
                };
                debug!(
                    "audio send failed ({} in a row): {}",
                    inner.consecutive_failures, e
                );
                if inner.consecutive_failures > self.config.send_failure_threshold {
                    self.mark_unhealthy(inner, err.to_string());
                }
                Err(err)
            }
        }
    }

    /// Run a health check
    ///
    /// Returns `false` when not connected. A stale or closed link is marked
    /// unhealthy and also returns `false`.
    pub async fn check_connection(&self) -> bool {
        let mut guard = self.inner.lock().await;
        let inner = &mut *guard;

        let Some(link) = inner.link.as_ref() else {
            return false;
        };
        if !inner.state.is_connected() {
            return false;
        }

        let stale = inner
            .last_success
            .is_some_and(|t| t.elapsed() > self.config.staleness_window);
        let reason = if link.channel.is_closed() {
            Some("receiver closed the control connection".to_string())
        } else if stale {
            Some(format!(
                "no audio delivered for {:?}",
                self.config.staleness_window
            ))
        } else {
            None
        };

        match reason {
            Some(reason) => {
                self.mark_unhealthy(inner, reason);
                false
            }
            None => true,
        }
    }

    /// Drive the reconnect policy once
    ///
    /// Runs a full handshake when the backoff interval has elapsed. Callers
    /// may invoke it on every tick.
    pub async fn attempt_reconnect(&self) -> ReconnectOutcome {
        let mut guard = self.inner.lock().await;
        let inner = &mut *guard;

        if inner.state != ConnectionState::Reconnecting {
            return ReconnectOutcome::NotReconnecting;
        }

        let attempt = match inner.policy.poll(Runtime::now()) {
            ReconnectDecision::Wait => return ReconnectOutcome::Wait,
            ReconnectDecision::Exhausted => {
                self.exhaust(inner);
                return ReconnectOutcome::Exhausted;
            }
            ReconnectDecision::Attempt(n) => n,
        };

        let Some(device) = inner.device.clone() else {
            self.exhaust(inner);
            return ReconnectOutcome::Exhausted;
        };

        let max = inner.policy.max_attempts();
        warn!("reconnect attempt {}/{} to {}", attempt, max, device);
        inner.stats.reconnect_attempts = attempt;
        self.send_event(SessionEvent::ReconnectAttempt { attempt, max });

        match self.handshake(&mut inner.auth, &device).await {
            Ok(link) => {
                self.install(inner, link, &device);
                ReconnectOutcome::Attempted {
                    attempt,
                    succeeded: true,
                }
            }
            Err(err) => {
                inner.auth.reset_session();
                self.record_error(inner, &err);
                ReconnectOutcome::Attempted {
                    attempt,
                    succeeded: false,
                }
            }
        }
    }

    /// Tear down the connection
    ///
    /// Sends a best-effort `TEARDOWN` when connected; its outcome is ignored.
    pub async fn disconnect(&self) {
        let mut guard = self.inner.lock().await;
        let inner = &mut *guard;

        self.close_link(inner, DisconnectReason::UserRequested)
            .await;
        inner.policy.reset();
        inner.device = None;
        self.set_state(inner, ConnectionState::Disconnected);
    }

    async fn handshake(&self, auth: &mut K, device: &AirPlayDevice) -> Result<Link> {
        auth.reset_session();
        auth.set_password(device.password.clone());

        let peer = resolve_host(&device.host_address, device.port).await?;
        let ports = bind_port_block(
            peer.ip(),
            self.config.client_base_port,
            self.config.port_probe_limit,
        )
        .await?;
        let mut channel =
            RtspChannel::connect(peer, self.config.connect_timeout, self.config.rtsp_timeout)
                .await?;
        let local = channel.local_addr();

        let mut auth_enabled = self.config.auth_enabled;
        if auth_enabled {
            if let Err(e) = auth.initialize() {
                warn!("key exchange unavailable, continuing unauthenticated: {e}");
                auth_enabled = false;
            }
        }

        let mut rtsp = RaopRtspSession::new(self.identity.clone(), &device.host_address);

        // OPTIONS
        let challenge = if auth_enabled {
            match auth.generate_challenge() {
                Ok(challenge) => Some(challenge),
                Err(e) => {
                    warn!("no challenge available, continuing unauthenticated: {}", e);
                    auth_enabled = false;
                    None
                }
            }
        } else {
            None
        };
        let response = exchange(&mut channel, rtsp.options_request(challenge.as_deref())).await?;
        if challenge.is_some() {
            if let Some(apple_response) = response.header(raop::APPLE_RESPONSE) {
                if !auth.verify_response(apple_response, local.ip(), peer.ip()) {
                    return Err(RaopError::AuthenticationFailed {
                        message: "receiver sent an invalid Apple-Response".to_string(),
                    });
                }
            }
        }

        // ANNOUNCE
        let mut wrapped_key = None;
        let mut iv = None;
        let mut payload_key = None;
        if auth_enabled {
            let key = auth.derive_session_key()?;
            match (&device.server_public_key, self.config.announce_key_fallback) {
                (Some(server_key), _) => {
                    wrapped_key = Some(auth.wrap_session_key(key.key(), server_key)?);
                    iv = Some(*key.iv());
                    payload_key = Some(key);
                }
                (None, KeyFallback::OwnPublicKey) => {
                    let own = auth.public_key_pem()?;
                    wrapped_key = Some(auth.wrap_session_key(key.key(), own.as_bytes())?);
                    iv = Some(*key.iv());
                }
                (None, KeyFallback::Omit) => {
                    debug!(
                        "{} published no public key, sending unencrypted",
                        device.name
                    );
                }
            }
        }
        let client_ip = local.ip().to_string();
        let server_ip = peer.ip().to_string();
        let sdp = AnnounceParams {
            session_id: rand::thread_rng().r#gen(),
            client_ip: &client_ip,
            server_ip: &server_ip,
            wrapped_key: wrapped_key.as_deref(),
            iv: iv.as_ref().map(|iv| iv.as_slice()),
        }
        .to_sdp();
        exchange(&mut channel, rtsp.announce_request(&sdp)).await?;
        if let Some(key) = payload_key {
            auth.enable_encryption(key);
        }

        // SETUP
        let (audio_port, control_port, timing_port) = ports.ports()?;
        let request = rtsp.setup_request(audio_port, control_port, timing_port);
        debug!(
            method = request.method.as_str(),
            cseq = rtsp.cseq(),
            "RTSP request"
        );
        let response = channel.send(&request).await?;
        let server_ports = rtsp.process_setup(&response)?;
        debug!(
            "receiver ports audio={} control={} timing={}",
            server_ports.audio, server_ports.control, server_ports.timing
        );

        // RECORD
        exchange(&mut channel, rtsp.record_request()).await?;

        let timing_task = spawn_responder(ports.timing);
        Ok(Link {
            channel,
            rtsp,
            audio: ports.audio,
            _control: ports.control,
            server_audio: SocketAddr::new(peer.ip(), server_ports.audio),
            rtp: RtpState::new(),
            timing_task,
        })
    }

    fn install(&self, inner: &mut SessionInner<K>, link: Link, device: &AirPlayDevice) {
        let now = Runtime::now();
        inner.link = Some(link);
        inner.consecutive_failures = 0;
        inner.last_success = Some(now);
        inner.last_error = None;
        inner.policy.reset();
        inner.stats.connected_at = Some(now);
        self.set_state(inner, ConnectionState::Connected);
        self.send_event(SessionEvent::Connected {
            device: device.clone(),
        });
        info!("streaming to {}", device);
    }

    async fn close_link(&self, inner: &mut SessionInner<K>, reason: DisconnectReason) {
        if let Some(mut link) = inner.link.take() {
            if inner.state.is_connected() {
                let request = link.rtsp.teardown_request();
                match link.channel.send(&request).await {
                    Ok(response) => debug!(
                        "TEARDOWN: {} {}",
                        response.status.as_u16(),
                        response.reason
                    ),
                    Err(e) => debug!("TEARDOWN failed: {}", e),
                }
            }
            link.channel.shutdown().await;
            if let Some(device) = inner.device.clone() {
                self.send_event(SessionEvent::Disconnected { device, reason });
            }
        }
        inner.auth.reset_session();
        inner.consecutive_failures = 0;
        inner.last_success = None;
    }

    fn mark_unhealthy(&self, inner: &mut SessionInner<K>, reason: String) {
        warn!("connection unhealthy: {}", reason);
        inner.last_error = Some(reason.clone());
        inner.link = None;
        inner.auth.reset_session();
        self.send_event(SessionEvent::Error {
            message: reason.clone(),
            recoverable: inner.auto_reconnect,
        });

        if inner.auto_reconnect {
            inner.policy.arm(Runtime::now());
            self.set_state(inner, ConnectionState::Reconnecting);
        } else {
            if let Some(device) = inner.device.clone() {
                self.send_event(SessionEvent::Disconnected {
                    device,
                    reason: DisconnectReason::Unhealthy(reason),
                });
            }
            self.set_state(inner, ConnectionState::Error);
        }
    }

    fn exhaust(&self, inner: &mut SessionInner<K>) {
        let err = RaopError::ReconnectExhausted {
            attempts: inner.policy.attempts(),
        };
        self.record_error(inner, &err);
        if let Some(device) = inner.device.clone() {
            self.send_event(SessionEvent::Disconnected {
                device,
                reason: DisconnectReason::ReconnectExhausted,
            });
        }
        self.set_state(inner, ConnectionState::Error);
    }

    fn record_error(&self, inner: &mut SessionInner<K>, err: &RaopError) {
        let message = err.to_string();
        warn!("{}", message);
        inner.last_error = Some(message.clone());
        self.publish(inner);
        self.send_event(SessionEvent::Error {
            message,
            recoverable: err.is_recoverable(),
        });
    }

    fn set_state(&self, inner: &mut SessionInner<K>, new: ConnectionState) {
        let old = inner.state;
        inner.state = new;
        self.publish(inner);
        if old != new {
            info!("state {} -> {}", old, new);
            self.send_event(SessionEvent::StateChanged { old, new });
        }
    }

    fn publish(&self, inner: &SessionInner<K>) {
        self.status_tx.send_replace(SessionStatus {
            state: inner.state,
            last_error: inner.last_error.clone(),
            device: inner.device.clone(),
        });
    }

    fn send_event(&self, event: SessionEvent) {
        let _ = self.event_tx.send(event);
    }
}

/// Send a request and require a 2xx answer
async fn exchange(channel: &mut RtspChannel, request: RtspRequest) -> Result<RtspResponse> {
    debug!(
        method = request.method.as_str(),
        cseq = request.cseq().unwrap_or_default(),
        "RTSP request"
    );
    let response = channel.send(&request).await?;
    RaopRtspSession::check_status(request.method, &response)?;
    Ok(response)
}
