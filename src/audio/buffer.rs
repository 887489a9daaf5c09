//! Producer/consumer ring buffer for interleaved float audio

use std::sync::{Mutex, MutexGuard, PoisonError};

use tracing::trace;

/// Fill level above which the buffer reports overflow pressure
const HIGH_WATER: f32 = 0.9;
/// Fill level below which the buffer reports underflow pressure
const LOW_WATER: f32 = 0.1;

#[derive(Debug)]
struct Ring {
    data: Vec<f32>,
    write_pos: usize,
    read_pos: usize,
    stored: usize,
    overflow_count: u64,
    underflow_count: u64,
}

/// Bounded circular store of interleaved frames
///
/// Writers never block on I/O: when full, the oldest frames are
/// overwritten. Readers always receive a full block, padded with silence.
/// Every operation holds one mutex for the duration of a copy.
#[derive(Debug)]
pub struct StreamBuffer {
    ring: Mutex<Ring>,
    capacity: usize,
    channels: usize,
}

impl StreamBuffer {
    /// Create a buffer holding `capacity_frames` frames of `channels` samples
    #[must_use]
    pub fn new(capacity_frames: usize, channels: usize) -> Self {
        let capacity = capacity_frames.max(1);
        let channels = channels.max(1);
        Self {
            ring: Mutex::new(Ring {
                data: vec![0.0; capacity * channels],
                write_pos: 0,
                read_pos: 0,
                stored: 0,
                overflow_count: 0,
                underflow_count: 0,
            }),
            capacity,
            channels,
        }
    }

    fn lock(&self) -> MutexGuard<'_, Ring> {
        // Ring state is consistent between statements, so a poisoned lock is still usable.
        self.ring.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Capacity in frames
    #[must_use]
    pub fn capacity(&self) -> usize {
        self.capacity
    }

    /// Samples per frame
    #[must_use]
    pub fn channels(&self) -> usize {
        self.channels
    }

    /// Append interleaved samples
    ///
    /// A trailing partial frame is ignored. On overflow the oldest frames
    /// are dropped and the overflow counter grows by the dropped count.
    pub fn write(&self, samples: &[f32]) {
        let frames = samples.len() / self.channels;
        if frames == 0 {
            return;
        }

        let mut ring = self.lock();

        // Only the newest `capacity` frames of an oversized write can survive.
        let skip = frames.saturating_sub(self.capacity);
        let src = &samples[skip * self.channels..frames * self.channels];
        let count = frames - skip;

        let first = count.min(self.capacity - ring.write_pos);
        let start = ring.write_pos * self.channels;
        ring.data[start..start + first * self.channels]
            .copy_from_slice(&src[..first * self.channels]);
        if first < count {
            ring.data[..(count - first) * self.channels]
                .copy_from_slice(&src[first * self.channels..]);
        }
        ring.write_pos = (ring.write_pos + count) % self.capacity;

        let total = ring.stored + frames;
        if total > self.capacity {
            let excess = total - self.capacity;
            ring.overflow_count += excess as u64;
            ring.stored = self.capacity;
            ring.read_pos = ring.write_pos;
            trace!(dropped = excess, "stream buffer overflow");
        } else {
            ring.stored = total;
        }
    }

    /// Fill `dest` with interleaved samples
    ///
    /// Returns frames actually read; the rest of `dest` is zeroed and the
    /// underflow counter is bumped when the buffer ran short.
    pub fn read(&self, dest: &mut [f32]) -> usize {
        let requested = dest.len() / self.channels;
        let mut ring = self.lock();
        let count = requested.min(ring.stored);

        let first = count.min(self.capacity - ring.read_pos);
        let start = ring.read_pos * self.channels;
        dest[..first * self.channels]
            .copy_from_slice(&ring.data[start..start + first * self.channels]);
        if first < count {
            dest[first * self.channels..count * self.channels]
                .copy_from_slice(&ring.data[..(count - first) * self.channels]);
        }
        dest[count * self.channels..].fill(0.0);

        ring.read_pos = (ring.read_pos + count) % self.capacity;
        ring.stored -= count;

        if count < requested {
            ring.underflow_count += 1;
            trace!(requested, available = count, "stream buffer underflow");
        }
        count
    }

    /// Frames waiting to be read
    #[must_use]
    pub fn available_frames(&self) -> usize {
        self.lock().stored
    }

    /// Frames that can be written before overwriting
    #[must_use]
    pub fn available_space(&self) -> usize {
        self.capacity - self.lock().stored
    }

    /// Fill level in percent
    #[must_use]
    #[allow(clippy::cast_precision_loss)]
    pub fn usage_percentage(&self) -> f32 {
        self.lock().stored as f32 / self.capacity as f32 * 100.0
    }

    /// Above the high-water mark
    #[must_use]
    #[allow(clippy::cast_precision_loss)]
    pub fn is_overflowing(&self) -> bool {
        self.lock().stored as f32 > self.capacity as f32 * HIGH_WATER
    }

    /// Below the low-water mark
    #[must_use]
    #[allow(clippy::cast_precision_loss)]
    pub fn is_underflowing(&self) -> bool {
        (self.lock().stored as f32) < self.capacity as f32 * LOW_WATER
    }

    /// Frames dropped by overflowing writes
    #[must_use]
    pub fn overflow_count(&self) -> u64 {
        self.lock().overflow_count
    }

    /// Short reads
    #[must_use]
    pub fn underflow_count(&self) -> u64 {
        self.lock().underflow_count
    }

    /// Drop all content and reset counters
    pub fn clear(&self) {
        let mut ring = self.lock();
        ring.write_pos = 0;
        ring.read_pos = 0;
        ring.stored = 0;
        ring.overflow_count = 0;
        ring.underflow_count = 0;
    }
}
