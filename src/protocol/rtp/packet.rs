use bytes::{BufMut, BytesMut};
use thiserror::Error;

/// RTP payload types used by RAOP
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum PayloadType {
    /// Timing request
    TimingRequest = 0x52,
    /// Timing response
    TimingResponse = 0x53,
    /// Sync packet on the control channel
    Sync = 0x54,
    /// Audio data (realtime)
    Audio = 0x60,
}

impl PayloadType {
    /// Parse from byte value, ignoring the marker bit
    #[must_use]
    pub fn from_byte(b: u8) -> Option<Self> {
        match b & 0x7F {
            0x52 => Some(Self::TimingRequest),
            0x53 => Some(Self::TimingResponse),
            0x54 => Some(Self::Sync),
            0x60 => Some(Self::Audio),
            _ => None,
        }
    }
}

/// 12-byte RTP header
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RtpHeader {
    /// Marker bit
    pub marker: bool,
    /// Payload type (7 bits)
    pub payload_type: PayloadType,
    /// Sequence number
    pub sequence: u16,
    /// Timestamp in samples
    pub timestamp: u32,
    /// Synchronization source
    pub ssrc: u32,
}

impl RtpHeader {
    /// Standard RTP header size
    pub const SIZE: usize = 12;

    /// Version 2, no padding, no extension, no CSRC
    const FLAGS: u8 = 0x80;

    /// Header for an audio packet
    #[must_use]
    pub fn audio(sequence: u16, timestamp: u32, ssrc: u32, marker: bool) -> Self {
        Self {
            marker,
            payload_type: PayloadType::Audio,
            sequence,
            timestamp,
            ssrc,
        }
    }

    /// Append the encoded header to `buf`
    pub fn put(&self, buf: &mut impl BufMut) {
        buf.put_u8(Self::FLAGS);
        buf.put_u8((u8::from(self.marker) << 7) | (self.payload_type as u8 & 0x7F));
        buf.put_u16(self.sequence);
        buf.put_u32(self.timestamp);
        buf.put_u32(self.ssrc);
    }

    /// Decode header from bytes
    ///
    /// # Errors
    ///
    /// Returns `RtpDecodeError` if the buffer is short, the version is not 2
    /// or the payload type is unknown.
    pub fn decode(buf: &[u8]) -> Result<Self, RtpDecodeError> {
        if buf.len() < Self::SIZE {
            return Err(RtpDecodeError::BufferTooSmall {
                needed: Self::SIZE,
                have: buf.len(),
            });
        }

        let version = buf[0] >> 6;
        if version != 2 {
            return Err(RtpDecodeError::InvalidVersion(version));
        }

        let payload_type = PayloadType::from_byte(buf[1])
            .ok_or(RtpDecodeError::UnknownPayloadType(buf[1] & 0x7F))?;

        Ok(Self {
            marker: buf[1] & 0x80 != 0,
            payload_type,
            sequence: u16::from_be_bytes([buf[2], buf[3]]),
            timestamp: u32::from_be_bytes([buf[4], buf[5], buf[6], buf[7]]),
            ssrc: u32::from_be_bytes([buf[8], buf[9], buf[10], buf[11]]),
        })
    }
}

/// RTP decode errors
#[derive(Debug, Error)]
pub enum RtpDecodeError {
    #[error("buffer too small: need {needed} bytes, have {have}")]
    BufferTooSmall { needed: usize, have: usize },

    #[error("invalid RTP version: {0}")]
    InvalidVersion(u8),

    #[error("unknown payload type: 0x{0:02x}")]
    UnknownPayloadType(u8),
}

/// Complete RTP packet with header and payload
#[derive(Debug, Clone)]
pub struct RtpPacket {
    /// Packet header
    pub header: RtpHeader,
    /// Audio payload, already encrypted if encryption is on
    pub payload: Vec<u8>,
}

impl RtpPacket {
    /// Create a new RTP packet
    #[must_use]
    pub fn new(header: RtpHeader, payload: Vec<u8>) -> Self {
        Self { header, payload }
    }

    /// Encoded size in bytes
    #[must_use]
    pub fn len(&self) -> usize {
        RtpHeader::SIZE + self.payload.len()
    }

    /// True when the packet carries no payload
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.payload.is_empty()
    }

    /// Encode packet to one datagram
    #[must_use]
    pub fn encode(&self) -> BytesMut {
        let mut buf = BytesMut::with_capacity(self.len());
        self.header.put(&mut buf);
        buf.put_slice(&self.payload);
        buf
    }

    /// Decode packet from a datagram
    ///
    /// # Errors
    ///
    /// Returns `RtpDecodeError` if the header is invalid.
    pub fn decode(buf: &[u8]) -> Result<Self, RtpDecodeError> {
        let header = RtpHeader::decode(buf)?;
        Ok(Self {
            header,
            payload: buf[RtpHeader::SIZE..].to_vec(),
        })
    }
}
