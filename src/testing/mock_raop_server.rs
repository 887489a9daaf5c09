//! Mock RAOP server for testing

#![allow(clippy::missing_panics_doc)]
#![allow(clippy::missing_errors_doc)]

use std::collections::HashMap;
use std::fmt::Write as _;
use std::net::{IpAddr, Ipv4Addr, SocketAddr};
use std::sync::{Arc, Mutex, PoisonError};
use std::time::Duration;

use base64::Engine;
use thiserror::Error;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::{TcpListener, TcpStream, UdpSocket};
use tokio::sync::broadcast;

use crate::protocol::crypto::{Aes128Cbc, AuthError, RaopRsaPrivateKey, SessionKey, b64};
use crate::protocol::raop::build_response_message;
use crate::protocol::rtp::{NtpTimestamp, PayloadType, RtpPacket, TimingPacket};
use crate::protocol::rtsp::headers::{names, raop};
use crate::protocol::rtsp::{
    Headers, Method, RtspRequest, RtspResponse, StatusCode, TransportHeader,
};
use crate::protocol::sdp::SdpParser;

const LOOPBACK: IpAddr = IpAddr::V4(Ipv4Addr::LOCALHOST);

/// Mock server errors
#[derive(Debug, Error)]
pub enum MockServerError {
    /// Socket bind failed
    #[error("bind failed: {0}")]
    BindFailed(String),
    /// Key generation failed
    #[error("key error: {0}")]
    Key(#[from] AuthError),
    /// No client timing port known yet
    #[error("no sender timing port negotiated")]
    NoTimingPort,
    /// Timing probe failed
    #[error("timing probe failed: {0}")]
    Timing(String),
}

/// Mock RAOP server state
#[derive(Debug, Clone, Default)]
pub struct MockRaopState {
    /// Requests in arrival order
    pub requests: Vec<RtspRequest>,
    /// Received audio datagrams
    pub audio_packets: Vec<Vec<u8>>,
    /// Challenge from the last OPTIONS
    pub challenge: Option<Vec<u8>>,
    /// AES key (decrypted from rsaaeskey)
    pub aes_key: Option<[u8; 16]>,
    /// AES IV
    pub aes_iv: Option<[u8; 16]>,
    /// Sender's timing socket from the last SETUP
    pub client_timing: Option<SocketAddr>,
    /// RECORD accepted and no TEARDOWN since
    pub recording: bool,
    /// Control connections accepted
    pub connections: usize,
}

impl MockRaopState {
    /// Methods received, in order
    #[must_use]
    pub fn methods(&self) -> Vec<Method> {
        self.requests.iter().map(|r| r.method).collect()
    }

    /// Last request with the given method
    #[must_use]
    pub fn last_request(&self, method: Method) -> Option<&RtspRequest> {
        self.requests.iter().rev().find(|r| r.method == method)
    }
}

/// Mock RAOP server configuration
#[derive(Debug, Clone)]
pub struct MockRaopConfig {
    /// RTSP port (0 for dynamic)
    pub rtsp_port: u16,
    /// Audio server port (0 for dynamic)
    pub audio_port: u16,
    /// Control port (0 for dynamic)
    pub control_port: u16,
    /// Timing port (0 for dynamic)
    pub timing_port: u16,
    /// Device name
    pub name: String,
    /// MAC address
    pub mac_address: [u8; 6],
    /// Value of the `Session` header returned from SETUP
    pub session_id: String,
    /// Answer `Apple-Challenge` with a signed `Apple-Response`
    pub sign_challenge: bool,
    /// Return this `Apple-Response` instead of signing
    pub apple_response: Option<String>,
    /// Return this `Transport` from SETUP instead of the bound ports
    pub transport: Option<String>,
    /// Leave `Transport` out of the SETUP response
    pub omit_transport: bool,
    /// Leave `Session` out of the SETUP response
    pub omit_session: bool,
    /// Answer these methods with the given status
    pub failures: HashMap<&'static str, u16>,
    /// RSA modulus size
    pub key_bits: usize,
}

impl Default for MockRaopConfig {
    fn default() -> Self {
        Self {
            rtsp_port: 0,
            audio_port: 0,
            control_port: 0,
            timing_port: 0,
            name: "Mock RAOP".to_string(),
            mac_address: [0x00, 0x11, 0x22, 0x33, 0x44, 0x55],
            session_id: "DEADBEEF".to_string(),
            sign_challenge: true,
            apple_response: None,
            transport: None,
            omit_transport: false,
            omit_session: false,
            failures: HashMap::new(),
            key_bits: 1024,
        }
    }
}

impl MockRaopConfig {
    /// Answer `method` with `status`
    #[must_use]
    pub fn fail(mut self, method: Method, status: u16) -> Self {
        self.failures.insert(method.as_str(), status);
        self
    }
}

type SharedState = Arc<Mutex<MockRaopState>>;

fn lock(state: &SharedState) -> std::sync::MutexGuard<'_, MockRaopState> {
    state.lock().unwrap_or_else(PoisonError::into_inner)
}

/// Mock RAOP server
pub struct MockRaopServer {
    /// Configuration, with bound ports filled in after `start`
    pub config: MockRaopConfig,
    state: SharedState,
    rsa_key: RaopRsaPrivateKey,
    shutdown: Option<broadcast::Sender<()>>,
    kick: broadcast::Sender<()>,
}

impl MockRaopServer {
    /// Create new mock server
    pub fn new(config: MockRaopConfig) -> Result<Self, MockServerError> {
        let rsa_key = RaopRsaPrivateKey::generate(config.key_bits)?;
        let (kick, _) = broadcast::channel(4);
        Ok(Self {
            config,
            state: Arc::new(Mutex::new(MockRaopState::default())),
            rsa_key,
            shutdown: None,
            kick,
        })
    }

    /// Get server address for connection
    #[must_use]
    pub fn address(&self) -> String {
        format!("127.0.0.1:{}", self.config.rtsp_port)
    }

    /// `AABBCCDDEEFF` hardware identifier
    #[must_use]
    pub fn device_id(&self) -> String {
        self.config
            .mac_address
            .iter()
            .fold(String::new(), |mut acc, b| {
                let _ = write!(acc, "{b:02X}");
                acc
            })
    }

    /// Get mDNS service name
    #[must_use]
    pub fn service_name(&self) -> String {
        format!("{}@{}", self.device_id(), self.config.name)
    }

    /// Public key as `SubjectPublicKeyInfo` DER
    pub fn public_key_der(&self) -> Result<Vec<u8>, AuthError> {
        self.rsa_key.public_key_der()
    }

    /// Public key as PEM
    pub fn public_key_pem(&self) -> Result<String, AuthError> {
        self.rsa_key.public_key_pem()
    }

    /// Start the server
    pub async fn start(&mut self) -> Result<(), MockServerError> {
        if self.shutdown.is_some() {
            return Ok(());
        }

        let listener = TcpListener::bind(("127.0.0.1", self.config.rtsp_port))
            .await
            .map_err(|e| MockServerError::BindFailed(format!("RTSP: {e}")))?;
        self.config.rtsp_port = local_port(listener.local_addr());

        let audio_socket = bind_udp("Audio", self.config.audio_port).await?;
        self.config.audio_port = local_port(audio_socket.local_addr());
        let control_socket = bind_udp("Control", self.config.control_port).await?;
        self.config.control_port = local_port(control_socket.local_addr());
        let timing_socket = bind_udp("Timing", self.config.timing_port).await?;
        self.config.timing_port = local_port(timing_socket.local_addr());

        let (shutdown_tx, _) = broadcast::channel(1);
        self.shutdown = Some(shutdown_tx.clone());

        // RTSP listener
        let state = self.state.clone();
        let config = self.config.clone();
        let rsa_key = self.rsa_key.clone();
        let kick = self.kick.clone();
        let mut shutdown_rx = shutdown_tx.subscribe();
        tokio::spawn(async move {
            loop {
                tokio::select! {
                    result = listener.accept() => {
                        match result {
                            Ok((stream, _)) => {
                                lock(&state).connections += 1;
                                let handler = Handler {
                                    state: state.clone(),
                                    config: config.clone(),
                                    rsa_key: rsa_key.clone(),
                                };
                                let kick_rx = kick.subscribe();
                                tokio::spawn(handler.run(stream, kick_rx));
                            }
                            Err(e) => tracing::error!("Accept error: {}", e),
                        }
                    }
                    _ = shutdown_rx.recv() => break,
                }
            }
        });

        // Audio listener
        let state = self.state.clone();
        let mut shutdown_rx = shutdown_tx.subscribe();
        tokio::spawn(async move {
            let mut buf = [0u8; 4096];
            loop {
                tokio::select! {
                    res = audio_socket.recv_from(&mut buf) => {
                        if let Ok((n, _)) = res {
                            lock(&state).audio_packets.push(buf[..n].to_vec());
                        }
                    }
                    _ = shutdown_rx.recv() => break,
                }
            }
        });

        // Control and timing sockets only need to exist
        let mut shutdown_rx = shutdown_tx.subscribe();
        tokio::spawn(async move {
            let _sockets = (control_socket, timing_socket);
            let _ = shutdown_rx.recv().await;
        });

        Ok(())
    }

    /// Stop the server
    pub fn stop(&mut self) {
        if let Some(tx) = self.shutdown.take() {
            let _ = tx.send(());
        }
        self.close_connections();
    }

    /// Close every open control connection
    pub fn close_connections(&self) {
        let _ = self.kick.send(());
    }

    /// Get current state
    #[must_use]
    pub fn state(&self) -> MockRaopState {
        lock(&self.state).clone()
    }

    /// Reset state
    pub fn reset(&self) {
        *lock(&self.state) = MockRaopState::default();
    }

    /// Received audio packets parsed as RTP
    #[must_use]
    pub fn rtp_packets(&self) -> Vec<RtpPacket> {
        lock(&self.state)
            .audio_packets
            .iter()
            .filter_map(|p| RtpPacket::decode(p).ok())
            .collect()
    }

    /// Audio payloads, decrypted when a key was announced
    #[must_use]
    pub fn audio_payloads(&self) -> Vec<Vec<u8>> {
        let (key, iv) = {
            let state = lock(&self.state);
            (state.aes_key, state.aes_iv)
        };
        let cipher = key
            .zip(iv)
            .and_then(|(key, iv)| SessionKey::from_slices(&key, &iv).ok())
            .map(Aes128Cbc::new);

        self.rtp_packets()
            .into_iter()
            .filter_map(|packet| match &cipher {
                Some(cipher) => cipher.decrypt(&packet.payload).ok(),
                None => Some(packet.payload),
            })
            .collect()
    }

    /// Wait until at least `count` audio packets arrived
    pub async fn wait_for_packets(&self, count: usize, timeout: Duration) -> bool {
        let deadline = tokio::time::Instant::now() + timeout;
        while tokio::time::Instant::now() < deadline {
            if lock(&self.state).audio_packets.len() >= count {
                return true;
            }
            tokio::time::sleep(Duration::from_millis(5)).await;
        }
        lock(&self.state).audio_packets.len() >= count
    }

    /// Send a timing request to the sender and wait for its answer
    pub async fn probe_timing(&self, timeout: Duration) -> Result<TimingPacket, MockServerError> {
        let target = lock(&self.state)
            .client_timing
            .ok_or(MockServerError::NoTimingPort)?;
        let socket = UdpSocket::bind("127.0.0.1:0")
            .await
            .map_err(|e| MockServerError::BindFailed(format!("Timing probe: {e}")))?;

        let request = TimingPacket {
            payload_type: PayloadType::TimingRequest,
            sequence: 7,
            reference_time: NtpTimestamp::default(),
            receive_time: NtpTimestamp::default(),
            send_time: NtpTimestamp::now(),
        };
        socket
            .send_to(&request.encode(), target)
            .await
            .map_err(|e| MockServerError::Timing(e.to_string()))?;

        let mut buf = [0u8; 64];
        let n = tokio::time::timeout(timeout, socket.recv(&mut buf))
            .await
            .map_err(|_| MockServerError::Timing("no response".to_string()))?
            .map_err(|e| MockServerError::Timing(e.to_string()))?;
        TimingPacket::decode(&buf[..n]).map_err(|e| MockServerError::Timing(e.to_string()))
    }
}

impl Drop for MockRaopServer {
    fn drop(&mut self) {
        self.stop();
    }
}

fn local_port(addr: std::io::Result<SocketAddr>) -> u16 {
    addr.map(|a| a.port()).unwrap_or_default()
}

async fn bind_udp(label: &str, port: u16) -> Result<UdpSocket, MockServerError> {
    UdpSocket::bind(("127.0.0.1", port))
        .await
        .map_err(|e| MockServerError::BindFailed(format!("{label}: {e}")))
}

/// One control connection
struct Handler {
    state: SharedState,
    config: MockRaopConfig,
    rsa_key: RaopRsaPrivateKey,
}

impl Handler {
    async fn run(self, mut stream: TcpStream, mut kick: broadcast::Receiver<()>) {
        let local_ip = stream.local_addr().map_or(LOOPBACK, |a| a.ip());
        let peer_ip = stream.peer_addr().map_or(LOOPBACK, |a| a.ip());
        let mut buffer = Vec::new();
        let mut temp_buf = vec![0u8; 4096];

        loop {
            let n = tokio::select! {
                read = stream.read(&mut temp_buf) => match read {
                    Ok(0) | Err(_) => break,
                    Ok(n) => n,
                },
                _ = kick.recv() => break,
            };
            buffer.extend_from_slice(&temp_buf[..n]);

            while let Some((request, consumed)) = try_parse_request(&buffer) {
                buffer.drain(..consumed);
                let response = self.process(&request, local_ip, peer_ip);
                lock(&self.state).requests.push(request);
                if stream.write_all(&response.encode()).await.is_err() {
                    return;
                }
            }
        }
        lock(&self.state).recording = false;
    }

    fn process(&self, request: &RtspRequest, local_ip: IpAddr, peer_ip: IpAddr) -> RtspResponse {
        let mut headers = Headers::new();
        headers.insert(names::CSEQ, request.headers.cseq().unwrap_or(0).to_string());

        if let Some(&status) = self.config.failures.get(request.method.as_str()) {
            return response(StatusCode(status), "Mock Failure", headers);
        }

        match request.method {
            Method::Options => self.handle_options(request, local_ip, &mut headers),
            Method::Announce => self.handle_announce(request),
            Method::Setup => self.handle_setup(request, peer_ip, &mut headers),
            Method::Record => {
                lock(&self.state).recording = true;
                headers.insert(raop::AUDIO_LATENCY, "11025");
            }
            Method::Teardown => lock(&self.state).recording = false,
        }

        response(StatusCode::OK, "OK", headers)
    }

    fn handle_options(&self, request: &RtspRequest, local_ip: IpAddr, headers: &mut Headers) {
        headers.insert(
            "Public",
            "ANNOUNCE, SETUP, RECORD, PAUSE, FLUSH, TEARDOWN, OPTIONS, GET_PARAMETER, SET_PARAMETER",
        );

        let Some(challenge) = request.headers.get(raop::APPLE_CHALLENGE) else {
            return;
        };
        let Ok(challenge) = b64::RAOP.decode(challenge) else {
            return;
        };
        lock(&self.state).challenge = Some(challenge.clone());

        if let Some(value) = &self.config.apple_response {
            headers.insert(raop::APPLE_RESPONSE, value.clone());
        } else if self.config.sign_challenge {
            let message = build_response_message(&challenge, local_ip, &self.config.mac_address);
            if let Ok(signature) = self.rsa_key.sign_raw(&message) {
                headers.insert(raop::APPLE_RESPONSE, b64::RAOP.encode(signature));
            }
        }
    }

    fn handle_announce(&self, request: &RtspRequest) {
        let sdp_text = String::from_utf8_lossy(&request.body);
        let Ok(sdp) = SdpParser::parse(&sdp_text) else {
            return;
        };
        let (Some(rsaaeskey), Some(aesiv)) = (sdp.rsaaeskey(), sdp.aesiv()) else {
            return;
        };
        let key = b64::RAOP
            .decode(rsaaeskey)
            .ok()
            .and_then(|wrapped| self.rsa_key.decrypt_oaep(&wrapped).ok())
            .and_then(|key| <[u8; 16]>::try_from(key.as_slice()).ok());
        let iv = b64::RAOP
            .decode(aesiv)
            .ok()
            .and_then(|iv| <[u8; 16]>::try_from(iv.as_slice()).ok());

        let mut state = lock(&self.state);
        state.aes_key = key;
        state.aes_iv = iv;
    }

    fn handle_setup(&self, request: &RtspRequest, peer_ip: IpAddr, headers: &mut Headers) {
        if let Some(timing) = request
            .headers
            .get(names::TRANSPORT)
            .and_then(|t| TransportHeader::parse(t).ok())
            .and_then(|t| t.timing_port)
        {
            lock(&self.state).client_timing = Some(SocketAddr::new(peer_ip, timing));
        }

        if !self.config.omit_transport {
            let transport = self.config.transport.clone().unwrap_or_else(|| {
                TransportHeader::server_response(
                    self.config.audio_port,
                    self.config.control_port,
                    self.config.timing_port,
                )
                .to_string()
            });
            headers.insert(names::TRANSPORT, transport);
        }
        if !self.config.omit_session {
            headers.insert(names::SESSION, self.config.session_id.clone());
        }
        headers.insert(raop::AUDIO_JACK_STATUS, "connected; type=analog");
    }
}

fn response(status: StatusCode, reason: &str, headers: Headers) -> RtspResponse {
    RtspResponse {
        version: "RTSP/1.0".to_string(),
        status,
        reason: reason.to_string(),
        headers,
        body: Vec::new(),
    }
}

/// Parse one request from the front of `data`
fn try_parse_request(data: &[u8]) -> Option<(RtspRequest, usize)> {
    let header_end = data.windows(4).position(|w| w == b"\r\n\r\n")?;
    let header_len = header_end + 4;
    let header_str = String::from_utf8_lossy(&data[..header_end]);
    let mut lines = header_str.lines();

    let mut parts = lines.next()?.split_whitespace();
    let method = Method::parse(parts.next()?)?;
    let uri = parts.next()?.to_string();

    let mut headers = Headers::new();
    for line in lines {
        if let Some((name, value)) = line.split_once(':') {
            headers.insert(name.trim(), value.trim());
        }
    }

    let content_length = headers.content_length().unwrap_or(0);
    if data.len() < header_len + content_length {
        return None;
    }
    let body = data[header_len..header_len + content_length].to_vec();
    Some((
        RtspRequest {
            method,
            uri,
            headers,
            body,
        },
        header_len + content_length,
    ))
}
