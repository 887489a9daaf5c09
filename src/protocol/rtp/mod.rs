//! RTP packets for RAOP audio and timing

mod packet;
mod state;
mod timing;


pub use packet::{PayloadType, RtpDecodeError, RtpHeader, RtpPacket};
pub use state::RtpState;
pub use timing::{NtpTimestamp, TimingPacket};

/// RTP protocol constants for RAOP
pub mod constants {
    /// Sample rate used by every RAOP stream
    pub const SAMPLE_RATE: u32 = 44_100;
    /// Frames carried by one audio packet
    pub const FRAMES_PER_PACKET: u32 = 352;
    /// Bytes per sample for 16-bit PCM
    pub const BYTES_PER_SAMPLE: usize = 2;
}
