use std::fmt;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use tokio::sync::broadcast;
use tokio::task::JoinHandle;
use tokio::time::{Instant, MissedTickBehavior};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, trace, warn};

use crate::audio::{AudioEncoder, EncoderFormat, StreamBuffer};
use crate::connection::{ConnectionState, RaopSession, ReconnectOutcome, SessionEvent};
use crate::error::Result;
use crate::protocol::rtp::constants::{FRAMES_PER_PACKET, SAMPLE_RATE};
use crate::types::{AirPlayConfig, AirPlayDevice};

/// Packets sent per tick at most when catching up
const MAX_BURST: usize = 8;

/// Summary shown to the host
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ConnectionStatus {
    /// No link
    Disconnected,
    /// Streaming to the named device
    Connected(String),
    /// Reconnect policy active
    Reconnecting,
    /// Last connect or reconnect failed
    Error(String),
}

impl fmt::Display for ConnectionStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ConnectionStatus::Disconnected => f.write_str("Disconnected"),
            ConnectionStatus::Connected(name) => write!(f, "Connected to {name}"),
            ConnectionStatus::Reconnecting => f.write_str("Reconnecting..."),
            ConnectionStatus::Error(message) => write!(f, "Error: {message}"),
        }
    }
}

struct StreamTask {
    cancel: CancellationToken,
    handle: JoinHandle<()>,
}

/// Connects the host's audio callback to a RAOP session
///
/// The host pushes interleaved samples from its audio thread; a background
/// task drains them at the receiver's rate and sends one packet per 352
/// frames.
pub struct AirPlayManager {
    config: AirPlayConfig,
    session: Arc<RaopSession>,
    buffer: Arc<StreamBuffer>,
    encoder: Arc<Mutex<AudioEncoder>>,
    task: Mutex<Option<StreamTask>>,
}

impl AirPlayManager {
    /// Create a manager
    #[must_use]
    pub fn new(config: AirPlayConfig) -> Self {
        let mut encoder = AudioEncoder::new(config.encoder_format);
        encoder.prepare(SAMPLE_RATE, FRAMES_PER_PACKET);

        Self {
            session: Arc::new(RaopSession::new(config.clone())),
            buffer: Arc::new(StreamBuffer::new(config.buffer_frames, config.channels)),
            encoder: Arc::new(Mutex::new(encoder)),
            task: Mutex::new(None),
            config,
        }
    }

    fn encoder(&self) -> MutexGuard<'_, AudioEncoder> {
        self.encoder.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Configure for the host's stream
    ///
    /// Audio is sent at 44.1 kHz; other rates are not resampled.
    pub fn prepare(&self, sample_rate: u32, block_size: usize) {
        if sample_rate != SAMPLE_RATE {
            warn!(
                "host rate {} Hz differs from {} Hz; audio is not resampled",
                sample_rate, SAMPLE_RATE
            );
        }
        debug!(
            "prepare: {} Hz, {} frames per block",
            sample_rate, block_size
        );
        self.encoder().prepare(sample_rate, FRAMES_PER_PACKET);
        self.buffer.clear();
    }

    /// Queue interleaved samples
    ///
    /// Never waits on the network; the oldest audio is dropped when full.
    pub fn push_audio_data(&self, samples: &[f32]) {
        self.buffer.write(samples);
        if self.buffer.is_overflowing() {
            trace!("stream buffer at {:.0}%", self.buffer.usage_percentage());
        }
    }

    /// Connect and start streaming
    ///
    /// # Errors
    ///
    /// Returns the handshake error; it is also available from
    /// [`last_error`](Self::last_error).
    pub async fn connect_to_device(&self, device: &AirPlayDevice) -> Result<()> {
        info!("connect requested: {}", device);
        self.stop_task().await;

        self.session.connect(device).await?;
        self.buffer.clear();
        self.start_task();
        Ok(())
    }

    /// Stop streaming and disconnect
    pub async fn disconnect_from_device(&self) {
        self.stop_task().await;
        self.session.disconnect().await;
        self.buffer.clear();
        info!("disconnected");
    }

    /// Check if audio is flowing to a receiver
    #[must_use]
    pub fn is_connected(&self) -> bool {
        self.session.is_connected()
    }

    /// Name of the device being streamed to
    #[must_use]
    pub fn connected_device_name(&self) -> Option<String> {
        let status = self.session.status();
        match status.state {
            ConnectionState::Connected | ConnectionState::Reconnecting => {
                status.device.map(|d| d.name)
            }
            _ => None,
        }
    }

    /// Status summary for display
    #[must_use]
    pub fn connection_status(&self) -> ConnectionStatus {
        let status = self.session.status();
        match status.state {
            ConnectionState::Reconnecting => ConnectionStatus::Reconnecting,
            ConnectionState::Error | ConnectionState::TimedOut => ConnectionStatus::Error(
                status
                    .last_error
                    .unwrap_or_else(|| status.state.to_string()),
            ),
            ConnectionState::Connected => ConnectionStatus::Connected(
                status.device.map(|d| d.name).unwrap_or_default(),
            ),
            ConnectionState::Disconnected | ConnectionState::Connecting => {
                ConnectionStatus::Disconnected
            }
        }
    }

    /// Most recent failure
    #[must_use]
    pub fn last_error(&self) -> Option<String> {
        self.session.last_error()
    }

    /// Enable or disable automatic reconnect
    pub async fn set_auto_reconnect(&self, enabled: bool) {
        info!(
            "auto-reconnect {}",
            if enabled { "enabled" } else { "disabled" }
        );
        self.session.set_auto_reconnect(enabled).await;
    }

    /// Check whether automatic reconnect is enabled
    pub async fn is_auto_reconnect_enabled(&self) -> bool {
        self.session.is_auto_reconnect_enabled().await
    }

    /// Change the payload encoding
    pub fn set_encoder_format(&self, format: EncoderFormat) {
        self.encoder().set_format(format);
    }

    /// Payload encoding in use
    #[must_use]
    pub fn encoder_format(&self) -> EncoderFormat {
        self.encoder().format()
    }

    /// Shared sample buffer
    #[must_use]
    pub fn buffer(&self) -> Arc<StreamBuffer> {
        Arc::clone(&self.buffer)
    }

    /// Underlying session
    #[must_use]
    pub fn session(&self) -> Arc<RaopSession> {
        Arc::clone(&self.session)
    }

    /// Subscribe to session events
    #[must_use]
    pub fn subscribe(&self) -> broadcast::Receiver<SessionEvent> {
        self.session.subscribe()
    }

    fn start_task(&self) {
        let cancel = CancellationToken::new();
        let worker = Streamer {
            session: Arc::clone(&self.session),
            buffer: Arc::clone(&self.buffer),
            encoder: Arc::clone(&self.encoder),
            channels: self.config.channels.max(1),
            stream_tick: self.config.stream_tick,
            health_check_interval: self.config.health_check_interval,
        };
        let handle = tokio::spawn(worker.run(cancel.clone()));

        let previous = self
            .task
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .replace(StreamTask { cancel, handle });
        if let Some(previous) = previous {
            previous.cancel.cancel();
        }
    }

    async fn stop_task(&self) {
        let task = self
            .task
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .take();
        if let Some(task) = task {
            task.cancel.cancel();
            let _ = task.handle.await;
        }
    }
}

impl Drop for AirPlayManager {
    fn drop(&mut self) {
        if let Some(task) = self
            .task
            .get_mut()
            .unwrap_or_else(PoisonError::into_inner)
            .take()
        {
            task.cancel.cancel();
        }
    }
}

/// Background sender
struct Streamer {
    session: Arc<RaopSession>,
    buffer: Arc<StreamBuffer>,
    encoder: Arc<Mutex<AudioEncoder>>,
    channels: usize,
    stream_tick: Duration,
    health_check_interval: Duration,
}

impl Streamer {
    async fn run(self, cancel: CancellationToken) {
        let packet_duration =
            Duration::from_secs_f64(f64::from(FRAMES_PER_PACKET) / f64::from(SAMPLE_RATE));
        let mut tick = tokio::time::interval(self.stream_tick);
        tick.set_missed_tick_behavior(MissedTickBehavior::Skip);

        let mut samples = vec![0.0f32; FRAMES_PER_PACKET as usize * self.channels];
        let mut next_packet = Instant::now();
        let mut last_check = Instant::now();

        loop {
            tokio::select! {
                () = cancel.cancelled() => break,
                _ = tick.tick() => {}
            }
            let now = Instant::now();

            match self.session.state() {
                ConnectionState::Connected => {
                    let mut sent = 0;
                    while next_packet <= now && sent < MAX_BURST {
                        self.send_packet(&mut samples).await;
                        next_packet += packet_duration;
                        sent += 1;
                    }
                    if next_packet < now {
                        trace!("streaming fell behind, skipping ahead");
                        next_packet = now;
                    }

                    if now.duration_since(last_check) >= self.health_check_interval {
                        last_check = now;
                        if !self.session.check_connection().await {
                            debug!("health check failed");
                        }
                    }
                }
                ConnectionState::Reconnecting => {
                    if let ReconnectOutcome::Attempted {
                        succeeded: true, ..
                    } = self.session.attempt_reconnect().await
                    {
                        next_packet = Instant::now();
                        last_check = next_packet;
                    }
                }
                _ => next_packet = now,
            }
        }
        debug!("streaming task stopped");
    }

    async fn send_packet(&self, samples: &mut [f32]) {
        let frames = self.buffer.read(samples);
        if frames < FRAMES_PER_PACKET as usize {
            trace!("buffer underflow: {frames} of {FRAMES_PER_PACKET} frames");
        }

        let payload = self
            .encoder
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .encode(samples, self.channels);

        if let Err(e) = self
            .session
            .send_frames(&payload, FRAMES_PER_PACKET)
            .await
        {
            trace!("packet not sent: {}", e);
        }
    }
}
