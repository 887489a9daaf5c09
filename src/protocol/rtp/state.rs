use rand::Rng;

use super::packet::{RtpHeader, RtpPacket};

/// Per-connection RTP counters
///
/// Created fresh for every successful handshake. Sequence and timestamp
/// only advance after a datagram was handed to the socket.
#[derive(Debug, Clone)]
pub struct RtpState {
    ssrc: u32,
    sequence: u16,
    timestamp: u32,
    first_packet: bool,
}

impl RtpState {
    /// New state with a random non-zero SSRC
    #[must_use]
    pub fn new() -> Self {
        let mut rng = rand::thread_rng();
        Self::with_ssrc(rng.gen_range(1..=u32::MAX))
    }

    /// New state with a fixed SSRC
    #[must_use]
    pub fn with_ssrc(ssrc: u32) -> Self {
        Self {
            ssrc,
            sequence: 0,
            timestamp: 0,
            first_packet: true,
        }
    }

    /// Synchronization source
    #[must_use]
    pub fn ssrc(&self) -> u32 {
        self.ssrc
    }

    /// Sequence number of the next packet
    #[must_use]
    pub fn sequence(&self) -> u16 {
        self.sequence
    }

    /// Timestamp of the next packet
    #[must_use]
    pub fn timestamp(&self) -> u32 {
        self.timestamp
    }

    /// Build the next audio packet without advancing
    #[must_use]
    pub fn next_packet(&self, payload: Vec<u8>) -> RtpPacket {
        RtpPacket::new(
            RtpHeader::audio(self.sequence, self.timestamp, self.ssrc, self.first_packet),
            payload,
        )
    }

    /// Record a delivered packet of `samples_per_packet` frames
    pub fn advance(&mut self, samples_per_packet: u32) {
        self.sequence = self.sequence.wrapping_add(1);
        self.timestamp = self.timestamp.wrapping_add(samples_per_packet);
        self.first_packet = false;
    }
}

impl Default for RtpState {
    fn default() -> Self {
        Self::new()
    }
}
