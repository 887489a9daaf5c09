use std::io;
use thiserror::Error;

use crate::protocol::crypto::AuthError;
use crate::protocol::rtsp::{RtspCodecError, TransportParseError};

/// Errors that can occur while talking to a RAOP receiver
#[derive(Debug, Error)]
pub enum RaopError {
    // ===== Device Errors =====
    /// Device record is missing a name or host address
    #[error("invalid device: {reason}")]
    InvalidDevice {
        /// Why the record was rejected
        reason: String,
    },

    // ===== Connection Errors =====
    /// Failed to establish connection to device
    #[error("connection failed to {device_name}: {message}")]
    ConnectionFailed {
        /// The name of the device
        device_name: String,
        /// Description of the failure
        message: String,
        /// The underlying source of the error
        #[source]
        source: Option<Box<dyn std::error::Error + Send + Sync>>,
    },

    /// TCP connect did not complete in time
    #[error("connection timeout after {duration:?}")]
    ConnectionTimeout {
        /// The duration of the timeout
        duration: std::time::Duration,
    },

    /// Control connection was closed by the receiver
    #[error("device disconnected: {device_name}")]
    Disconnected {
        /// The name of the device
        device_name: String,
    },

    /// No block of three free UDP ports could be bound
    #[error("no free UDP port block from {base} after {attempts} attempts")]
    NoPortAvailable {
        /// First port tried
        base: u16,
        /// Number of blocks probed
        attempts: u16,
    },

    // ===== Authentication Errors =====
    /// Receiver rejected or failed the challenge exchange
    #[error("authentication failed: {message}")]
    AuthenticationFailed {
        /// Description of the failure
        message: String,
    },

    /// Key exchange or payload crypto failed
    #[error("key exchange error: {0}")]
    Auth(#[from] AuthError),

    // ===== Protocol Errors =====
    /// Receiver answered with a non-2xx status
    #[error("RTSP {method} failed: {status_code} {reason}")]
    RtspError {
        /// Request method that failed
        method: &'static str,
        /// RTSP status code
        status_code: u16,
        /// Reason phrase
        reason: String,
    },

    /// SETUP response carried no usable `Transport` header
    #[error("SETUP response missing transport info")]
    MissingTransportInfo,

    /// SETUP response carried no `Session` header
    #[error("SETUP response missing session")]
    MissingSession,

    /// Transport header could not be parsed
    #[error("transport error: {0}")]
    Transport(#[from] TransportParseError),

    /// Response framing could not be parsed
    #[error("codec error: {0}")]
    Codec(#[from] RtspCodecError),

    // ===== Streaming Errors =====
    /// Operation not valid in current state
    #[error("invalid state: {message}")]
    InvalidState {
        /// Description of why the state is invalid
        message: String,
        /// The current state
        current_state: String,
    },

    /// Audio datagram could not be delivered
    #[error("send failed: {message}")]
    SendFailed {
        /// Description of the failure
        message: String,
    },

    /// Reconnect budget used up
    #[error("reconnect failed after {attempts} attempts")]
    ReconnectExhausted {
        /// Attempts made
        attempts: u32,
    },

    // ===== Discovery Errors =====
    /// mDNS discovery failed
    #[error("discovery failed: {message}")]
    DiscoveryFailed {
        /// Description of the failure
        message: String,
        /// The underlying source of the error
        #[source]
        source: Option<Box<dyn std::error::Error + Send + Sync>>,
    },

    // ===== I/O Errors =====
    /// Network I/O error
    #[error("network error: {0}")]
    NetworkError(#[from] io::Error),

    /// Operation timed out
    #[error("operation timed out")]
    Timeout,
}

impl RaopError {
    /// Check if the reconnect policy may recover from this error
    #[must_use]
    pub fn is_recoverable(&self) -> bool {
        matches!(
            self,
            Self::ConnectionTimeout { .. }
                | Self::ConnectionFailed { .. }
                | Self::Disconnected { .. }
                | Self::Timeout
                | Self::NetworkError(_)
                | Self::SendFailed { .. }
                | Self::NoPortAvailable { .. }
        )
    }

    /// Check if this error indicates connection loss
    #[must_use]
    pub fn is_connection_lost(&self) -> bool {
        matches!(
            self,
            Self::Disconnected { .. }
                | Self::ConnectionFailed { .. }
                | Self::ConnectionTimeout { .. }
        )
    }
}

/// Result type alias for RAOP operations
pub type Result<T> = std::result::Result<T, RaopError>;
