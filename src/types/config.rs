use std::time::Duration;

use crate::audio::EncoderFormat;

/// What ANNOUNCE carries when the receiver published no public key
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum KeyFallback {
    /// Send no `rsaaeskey`/`aesiv` lines
    #[default]
    Omit,
    /// Wrap against the sender's own key; payloads stay unencrypted
    OwnPublicKey,
}

/// Configuration for sender behavior
#[derive(Debug, Clone)]
pub struct AirPlayConfig {
    /// Timeout for the TCP connect (default: 5 seconds)
    pub connect_timeout: Duration,

    /// Timeout for each RTSP response (default: 5 seconds)
    pub rtsp_timeout: Duration,

    /// Send `Apple-Challenge` and negotiate encryption (default: true)
    pub auth_enabled: bool,

    /// ANNOUNCE key lines without a receiver key (default: omit)
    pub announce_key_fallback: KeyFallback,

    /// Reconnect after the link goes unhealthy (default: true)
    pub auto_reconnect: bool,

    /// Reconnect attempts before giving up (default: 5)
    pub max_reconnect_attempts: u32,

    /// Delay before the first reconnect, doubled per attempt (default: 1 second)
    pub reconnect_base_delay: Duration,

    /// Consecutive send failures tolerated (default: 5)
    pub send_failure_threshold: u32,

    /// Longest gap between successful sends (default: 30 seconds)
    pub staleness_window: Duration,

    /// First port of the local UDP block, 0 for OS-assigned (default: 6000)
    pub client_base_port: u16,

    /// Port blocks probed before giving up (default: 32)
    pub port_probe_limit: u16,

    /// `User-Agent` header value
    pub user_agent: String,

    /// Ring buffer size in frames (default: 8192)
    pub buffer_frames: usize,

    /// Channels per frame (default: 2)
    pub channels: usize,

    /// RTP payload encoding (default: PCM16)
    pub encoder_format: EncoderFormat,

    /// Streaming task wake-up period (default: 10ms)
    pub stream_tick: Duration,

    /// Interval between health checks (default: 5 seconds)
    pub health_check_interval: Duration,
}

impl Default for AirPlayConfig {
    fn default() -> Self {
        Self {
            connect_timeout: Duration::from_secs(5),
            rtsp_timeout: Duration::from_secs(5),
            auth_enabled: true,
            announce_key_fallback: KeyFallback::Omit,
            auto_reconnect: true,
            max_reconnect_attempts: 5,
            reconnect_base_delay: Duration::from_secs(1),
            send_failure_threshold: 5,
            staleness_window: Duration::from_secs(30),
            client_base_port: 6000,
            port_probe_limit: 32,
            user_agent: format!("raop-streamer/{}", crate::VERSION),
            buffer_frames: 8192,
            channels: 2,
            encoder_format: EncoderFormat::Pcm16,
            stream_tick: Duration::from_millis(10),
            health_check_interval: Duration::from_secs(5),
        }
    }
}

impl AirPlayConfig {
    /// Create a new config builder
    #[must_use]
    pub fn builder() -> AirPlayConfigBuilder {
        AirPlayConfigBuilder::default()
    }
}

/// Builder for `AirPlayConfig`
#[derive(Debug, Clone, Default)]
pub struct AirPlayConfigBuilder {
    config: AirPlayConfig,
}

impl AirPlayConfigBuilder {
    /// Set TCP connect timeout
    #[must_use]
    pub fn connect_timeout(mut self, timeout: Duration) -> Self {
        self.config.connect_timeout = timeout;
        self
    }

    /// Set per-request RTSP timeout
    #[must_use]
    pub fn rtsp_timeout(mut self, timeout: Duration) -> Self {
        self.config.rtsp_timeout = timeout;
        self
    }

    /// Enable or disable challenge and encryption
    #[must_use]
    pub fn auth_enabled(mut self, enabled: bool) -> Self {
        self.config.auth_enabled = enabled;
        self
    }

    /// Set the ANNOUNCE key fallback
    #[must_use]
    pub fn announce_key_fallback(mut self, fallback: KeyFallback) -> Self {
        self.config.announce_key_fallback = fallback;
        self
    }

    /// Enable or disable automatic reconnect
    #[must_use]
    pub fn auto_reconnect(mut self, enabled: bool) -> Self {
        self.config.auto_reconnect = enabled;
        self
    }

    /// Set reconnect attempt budget and base delay
    #[must_use]
    pub fn reconnect(mut self, max_attempts: u32, base_delay: Duration) -> Self {
        self.config.max_reconnect_attempts = max_attempts;
        self.config.reconnect_base_delay = base_delay;
        self
    }

    /// Set the send failure threshold
    #[must_use]
    pub fn send_failure_threshold(mut self, threshold: u32) -> Self {
        self.config.send_failure_threshold = threshold;
        self
    }

    /// Set the staleness window
    #[must_use]
    pub fn staleness_window(mut self, window: Duration) -> Self {
        self.config.staleness_window = window;
        self
    }

    /// Set local UDP base port (0 = OS-assigned)
    #[must_use]
    pub fn client_base_port(mut self, port: u16) -> Self {
        self.config.client_base_port = port;
        self
    }

    /// Set how many port blocks to probe
    #[must_use]
    pub fn port_probe_limit(mut self, limit: u16) -> Self {
        self.config.port_probe_limit = limit;
        self
    }

    /// Set `User-Agent`
    #[must_use]
    pub fn user_agent(mut self, agent: impl Into<String>) -> Self {
        self.config.user_agent = agent.into();
        self
    }

    /// Set ring buffer size in frames
    #[must_use]
    pub fn buffer_frames(mut self, frames: usize) -> Self {
        self.config.buffer_frames = frames;
        self
    }

    /// Set channel count
    #[must_use]
    pub fn channels(mut self, channels: usize) -> Self {
        self.config.channels = channels;
        self
    }

    /// Set payload encoding
    #[must_use]
    pub fn encoder_format(mut self, format: EncoderFormat) -> Self {
        self.config.encoder_format = format;
        self
    }

    /// Set streaming tick and health check interval
    #[must_use]
    pub fn timing(mut self, stream_tick: Duration, health_check_interval: Duration) -> Self {
        self.config.stream_tick = stream_tick;
        self.config.health_check_interval = health_check_interval;
        self
    }

    /// Build the configuration
    #[must_use]
    pub fn build(self) -> AirPlayConfig {
        self.config
    }
}
