use std::time::{SystemTime, UNIX_EPOCH};

use bytes::{BufMut, BytesMut};

use super::packet::{PayloadType, RtpDecodeError};

/// NTP timestamp (64-bit, seconds since 1900-01-01)
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct NtpTimestamp {
    /// Seconds since NTP epoch
    pub seconds: u32,
    /// Fractional seconds (1/2^32 of a second)
    pub fraction: u32,
}

impl NtpTimestamp {
    /// NTP epoch offset from Unix epoch (70 years in seconds)
    const NTP_UNIX_OFFSET: u64 = 2_208_988_800;

    /// Current wall clock time
    #[must_use]
    #[allow(clippy::cast_possible_truncation)]
    pub fn now() -> Self {
        let since_epoch = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .unwrap_or_default();

        let fraction = (u64::from(since_epoch.subsec_nanos()) << 32) / 1_000_000_000;
        Self {
            seconds: (since_epoch.as_secs() + Self::NTP_UNIX_OFFSET) as u32,
            fraction: fraction as u32,
        }
    }

    fn put(self, buf: &mut impl BufMut) {
        buf.put_u32(self.seconds);
        buf.put_u32(self.fraction);
    }

    fn read(buf: &[u8]) -> Self {
        Self {
            seconds: u32::from_be_bytes([buf[0], buf[1], buf[2], buf[3]]),
            fraction: u32::from_be_bytes([buf[4], buf[5], buf[6], buf[7]]),
        }
    }
}

/// RAOP timing packet (request 0x52 or response 0x53)
///
/// Layout: 8-byte header (0x80, marker|type, sequence, 4 zero bytes),
/// then reference, receive and send timestamps.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TimingPacket {
    /// Request or response
    pub payload_type: PayloadType,
    /// Sequence number
    pub sequence: u16,
    /// Originator send time
    pub reference_time: NtpTimestamp,
    /// Time the peer received the request
    pub receive_time: NtpTimestamp,
    /// Time the packet left the sender
    pub send_time: NtpTimestamp,
}

impl TimingPacket {
    /// Encoded size
    pub const SIZE: usize = 32;

    /// Decode from a datagram
    ///
    /// # Errors
    ///
    /// Returns `RtpDecodeError` if the datagram is short or not a timing packet.
    pub fn decode(buf: &[u8]) -> Result<Self, RtpDecodeError> {
        if buf.len() < Self::SIZE {
            return Err(RtpDecodeError::BufferTooSmall {
                needed: Self::SIZE,
                have: buf.len(),
            });
        }
        let payload_type = match PayloadType::from_byte(buf[1]) {
            Some(pt @ (PayloadType::TimingRequest | PayloadType::TimingResponse)) => pt,
            _ => return Err(RtpDecodeError::UnknownPayloadType(buf[1] & 0x7F)),
        };

        Ok(Self {
            payload_type,
            sequence: u16::from_be_bytes([buf[2], buf[3]]),
            reference_time: NtpTimestamp::read(&buf[8..16]),
            receive_time: NtpTimestamp::read(&buf[16..24]),
            send_time: NtpTimestamp::read(&buf[24..32]),
        })
    }

    /// Build the response to a timing request
    ///
    /// The request's send time becomes the reference time.
    #[must_use]
    pub fn response_to(&self, received_at: NtpTimestamp) -> Self {
        Self {
            payload_type: PayloadType::TimingResponse,
            sequence: self.sequence,
            reference_time: self.send_time,
            receive_time: received_at,
            send_time: NtpTimestamp::now(),
        }
    }

    /// Encode to one datagram
    #[must_use]
    pub fn encode(&self) -> BytesMut {
        let mut buf = BytesMut::with_capacity(Self::SIZE);
        buf.put_u8(0x80);
        buf.put_u8(0x80 | self.payload_type as u8);
        buf.put_u16(self.sequence);
        buf.put_u32(0);
        self.reference_time.put(&mut buf);
        self.receive_time.put(&mut buf);
        self.send_time.put(&mut buf);
        buf
    }
}
