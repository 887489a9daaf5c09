//! Payload encoding for RTP audio packets

use alac_encoder::{AlacEncoder, FormatDescription};
use tracing::{debug, warn};

use crate::protocol::rtp::constants::{FRAMES_PER_PACKET, SAMPLE_RATE};

/// Payload encoding carried in RTP packets
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum EncoderFormat {
    /// 16-bit little-endian PCM
    #[default]
    Pcm16,
    /// 24-bit little-endian PCM (3 bytes per sample)
    Pcm24,
    /// Apple Lossless
    Alac,
}

impl EncoderFormat {
    /// Bytes per sample of the PCM fed to or produced by this format
    #[must_use]
    pub fn bytes_per_sample(self) -> usize {
        match self {
            Self::Pcm16 | Self::Alac => 2,
            Self::Pcm24 => 3,
        }
    }
}

/// Converts interleaved float frames into RTP payloads
pub struct AudioEncoder {
    format: EncoderFormat,
    sample_rate: u32,
    frames_per_packet: u32,
    alac: Option<(AlacEncoder, u32)>,
    scratch: Vec<u8>,
}

impl AudioEncoder {
    /// Encoder producing `format`
    #[must_use]
    pub fn new(format: EncoderFormat) -> Self {
        Self {
            format,
            sample_rate: SAMPLE_RATE,
            frames_per_packet: FRAMES_PER_PACKET,
            alac: None,
            scratch: Vec::new(),
        }
    }

    /// Current format
    #[must_use]
    pub fn format(&self) -> EncoderFormat {
        self.format
    }

    /// Switch format; the ALAC state is rebuilt on next use
    pub fn set_format(&mut self, format: EncoderFormat) {
        if format != self.format {
            self.format = format;
            self.alac = None;
        }
    }

    /// Configure stream parameters
    pub fn prepare(&mut self, sample_rate: u32, frames_per_packet: u32) {
        self.sample_rate = sample_rate;
        self.frames_per_packet = frames_per_packet.max(1);
        self.alac = None;
    }

    /// Encode one block of interleaved samples
    ///
    /// ALAC falls back to PCM16 when the codec produces no output.
    pub fn encode(&mut self, samples: &[f32], channels: usize) -> Vec<u8> {
        match self.format {
            EncoderFormat::Pcm16 => pcm16(samples),
            EncoderFormat::Pcm24 => pcm24(samples),
            EncoderFormat::Alac => {
                let pcm = pcm16(samples);
                let encoded = self.encode_alac(&pcm, channels);
                if encoded.is_empty() {
                    warn!("ALAC encoder produced no output, sending PCM");
                    pcm
                } else {
                    encoded
                }
            }
        }
    }

    #[allow(clippy::cast_possible_truncation)]
    fn encode_alac(&mut self, pcm: &[u8], channels: usize) -> Vec<u8> {
        let channels = channels.max(1) as u32;
        let sample_rate = f64::from(self.sample_rate);

        if !matches!(&self.alac, Some((_, ch)) if *ch == channels) {
            let format = FormatDescription::alac(sample_rate, self.frames_per_packet, channels);
            self.alac = Some((AlacEncoder::new(&format), channels));
            debug!(
                channels,
                frames = self.frames_per_packet,
                "ALAC encoder ready"
            );
        }
        let Some((encoder, _)) = self.alac.as_mut() else {
            return Vec::new();
        };

        // worst case is uncompressed plus frame header
        let needed = pcm.len() + 64;
        if self.scratch.len() < needed {
            self.scratch.resize(needed, 0);
        }
        let input = FormatDescription::pcm::<i16>(sample_rate, channels);
        let size = encoder.encode(&input, pcm, &mut self.scratch);
        self.scratch[..size.min(self.scratch.len())].to_vec()
    }
}

#[allow(clippy::cast_possible_truncation)]
fn pcm16(samples: &[f32]) -> Vec<u8> {
    samples
        .iter()
        .flat_map(|&s| ((s.clamp(-1.0, 1.0) * f32::from(i16::MAX)) as i16).to_le_bytes())
        .collect()
}

#[allow(clippy::cast_possible_truncation)]
fn pcm24(samples: &[f32]) -> Vec<u8> {
    samples
        .iter()
        .flat_map(|&s| {
            let value = (s.clamp(-1.0, 1.0) * 8_388_607.0) as i32;
            let [b0, b1, b2, _] = value.to_le_bytes();
            [b0, b1, b2]
        })
        .collect()
}
