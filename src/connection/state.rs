//! Connection state management

use std::fmt;

use tokio::time::Instant;

use crate::types::AirPlayDevice;

/// Connection state
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ConnectionState {
    /// Not connected
    #[default]
    Disconnected,
    /// Handshake in progress
    Connecting,
    /// RECORD accepted, audio may flow
    Connected,
    /// Link unhealthy, reconnect policy active
    Reconnecting,
    /// Handshake or reconnect failed
    Error,
    /// TCP connect did not complete
    TimedOut,
}

impl ConnectionState {
    /// Check if fully connected
    #[must_use]
    pub fn is_connected(self) -> bool {
        matches!(self, ConnectionState::Connected)
    }

    /// Check if a link is held or being established
    #[must_use]
    pub fn is_active(self) -> bool {
        matches!(
            self,
            ConnectionState::Connecting | ConnectionState::Connected | ConnectionState::Reconnecting
        )
    }

    /// Check if in a failed state
    #[must_use]
    pub fn is_failed(self) -> bool {
        matches!(self, ConnectionState::Error | ConnectionState::TimedOut)
    }
}

impl fmt::Display for ConnectionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            ConnectionState::Disconnected => "Disconnected",
            ConnectionState::Connecting => "Connecting",
            ConnectionState::Connected => "Connected",
            ConnectionState::Reconnecting => "Reconnecting",
            ConnectionState::Error => "Error",
            ConnectionState::TimedOut => "Timed out",
        };
        f.write_str(s)
    }
}

/// Session events
#[derive(Debug, Clone)]
pub enum SessionEvent {
    /// State changed
    StateChanged {
        /// The previous state
        old: ConnectionState,
        /// The new state
        new: ConnectionState,
    },
    /// Connection established
    Connected {
        /// The connected device
        device: AirPlayDevice,
    },
    /// Connection closed
    Disconnected {
        /// The disconnected device
        device: AirPlayDevice,
        /// The reason for disconnection
        reason: DisconnectReason,
    },
    /// Reconnect attempt started
    ReconnectAttempt {
        /// Attempt number, starting at 1
        attempt: u32,
        /// Configured budget
        max: u32,
    },
    /// Error occurred
    Error {
        /// The error message
        message: String,
        /// Whether the error is recoverable
        recoverable: bool,
    },
}

/// Reason for disconnection
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DisconnectReason {
    /// Caller requested disconnect
    UserRequested,
    /// Replaced by a new `connect`
    Superseded,
    /// Link failed health checks
    Unhealthy(String),
    /// Reconnect budget used up
    ReconnectExhausted,
}

/// Connection statistics
#[derive(Debug, Clone, Default)]
pub struct ConnectionStats {
    /// Time connection was established
    pub connected_at: Option<Instant>,
    /// RTP packets delivered to the socket
    pub packets_sent: u64,
    /// RTP bytes delivered to the socket
    pub bytes_sent: u64,
    /// Datagrams that failed to send
    pub send_failures: u64,
    /// Reconnect attempts since the last explicit connect
    pub reconnect_attempts: u32,
}

impl ConnectionStats {
    /// Get connection uptime
    #[must_use]
    pub fn uptime(&self) -> Option<std::time::Duration> {
        self.connected_at.map(|t| t.elapsed())
    }

    /// Record a delivered packet
    pub fn record_sent(&mut self, bytes: usize) {
        self.packets_sent += 1;
        self.bytes_sent += bytes as u64;
    }

    /// Record a failed send
    pub fn record_failure(&mut self) {
        self.send_failures += 1;
    }
}
