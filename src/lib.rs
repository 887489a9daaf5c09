//! # raop-streamer
//!
//! Stream live PCM audio to `AirPlay` 1 (RAOP) receivers.
//!
//! ## Features
//!
//! - Receiver discovery via mDNS (`_raop._tcp`)
//! - RSA/AES key exchange and `Apple-Challenge` verification
//! - RTSP handshake, RTP audio, NTP timing replies
//! - Health checks with exponential-backoff reconnect
//!
//! ## Example
//!
//! ```rust,no_run
//! use raop_streamer::{AirPlayConfig, AirPlayDevice, AirPlayManager};
//!
//! # async fn example() -> Result<(), raop_streamer::RaopError> {
//! let manager = AirPlayManager::new(AirPlayConfig::default());
//! manager.prepare(44_100, 512);
//!
//! let device = AirPlayDevice::new("Living Room", "192.168.1.20");
//! manager.connect_to_device(&device).await?;
//!
//! // From the host's render callback:
//! manager.push_audio_data(&[0.0_f32; 704]);
//! # Ok(())
//! # }
//! ```
//!
//! # Architecture
//!
//! - **High-level**: `AirPlayManager` - buffer, encoder and paced streaming task
//! - **Mid-level**: `RaopSession` - one receiver connection and its lifecycle
//! - **Low-level**: Protocol modules - sans-IO RTSP, SDP, RTP and crypto

#![warn(missing_docs)]
#![warn(clippy::all)]
#![warn(clippy::pedantic)]
#![allow(clippy::module_name_repetitions)]

// Public modules
/// Error types
pub mod error;
/// Core types
pub mod types;

/// Testing utilities
pub mod testing;

pub mod audio;
pub mod connection;
pub mod discovery;
pub mod net;
pub mod protocol;
/// Streaming support
pub mod streaming;

// Re-exports
pub use audio::{AudioEncoder, EncoderFormat, StreamBuffer};
pub use connection::{ConnectionState, RaopSession, SessionEvent};
pub use discovery::{DeviceDiscovery, DiscoveryEvent, RaopBrowser};
pub use error::RaopError;
pub use protocol::raop::{AirPlayAuth, KeyExchange};
pub use streaming::{AirPlayManager, ConnectionStatus};
pub use types::{AirPlayConfig, AirPlayDevice, KeyFallback};

/// Library version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

/// Prelude for common imports
///
/// Convenient re-exports
pub mod prelude {
    pub use crate::{
        AirPlayConfig, AirPlayDevice, AirPlayManager, ConnectionState, ConnectionStatus,
        DeviceDiscovery, DiscoveryEvent, EncoderFormat, RaopBrowser, RaopError, RaopSession,
    };
}
