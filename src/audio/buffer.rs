//! # Audio Buffer Management
//!
//! A bounded sample buffer that discards the oldest audio once it reaches its
//! capacity. The speech-to-text stage uses two of them:
//!
//! - a short **pre-roll** buffer that always holds the last few hundred
//!   milliseconds of caller audio, so the onset of an utterance is not lost
//!   while the VAD is still confirming speech;
//! - an **utterance** buffer that collects the caller's speech between the
//!   VAD's start and end boundaries.
//!
//! Both are owned by a single stage task, so no locking is involved.

use crate::audio::pcm;
use std::collections::VecDeque;

pub struct AudioBuffer {
    samples: VecDeque<i16>,
    sample_rate: u32,
    max_samples: usize,
}

impl AudioBuffer {
    /// Create a buffer holding at most `max_duration_ms` of mono audio.
    ///
    /// ## Example:
    /// For a 30 second buffer at 16kHz: 30000ms * 16000Hz / 1000 = 480,000 samples
    pub fn new(max_duration_ms: u32, sample_rate: u32) -> Self {
        let max_samples = (max_duration_ms as usize * sample_rate as usize) / 1000;

        Self {
            samples: VecDeque::with_capacity(max_samples.min(16000)),
            sample_rate,
            max_samples,
        }
    }

    /// Append raw PCM16 little-endian bytes, evicting the oldest samples if
    /// the buffer is full.
    pub fn append_pcm(&mut self, data: &[u8]) {
        for sample in pcm::bytes_to_samples(data) {
            self.samples.push_back(sample);
        }

        while self.samples.len() > self.max_samples {
            self.samples.pop_front();
        }
    }

    /// Move everything from `other` into this buffer, keeping order.
    pub fn absorb(&mut self, other: &mut AudioBuffer) {
        self.samples.extend(other.samples.drain(..));
        while self.samples.len() > self.max_samples {
            self.samples.pop_front();
        }
    }

    /// Take the buffered audio as PCM16 little-endian bytes and empty the buffer.
    pub fn take_pcm(&mut self) -> Vec<u8> {
        let samples: Vec<i16> = self.samples.drain(..).collect();
        pcm::samples_to_bytes(&samples)
    }

    pub fn is_empty(&self) -> bool {
        self.samples.is_empty()
    }

    /// Duration of the buffered audio in milliseconds.
    pub fn duration_ms(&self) -> u64 {
        if self.sample_rate == 0 {
            return 0;
        }
        self.samples.len() as u64 * 1000 / self.sample_rate as u64
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_append_and_take_preserves_bytes() {
        let mut buffer = AudioBuffer::new(1000, 16000);
        buffer.append_pcm(&[1, 0, 2, 0]);
        buffer.append_pcm(&[3, 0]);
        assert_eq!(buffer.samples.len(), 3);
        assert_eq!(buffer.take_pcm(), vec![1, 0, 2, 0, 3, 0]);
        assert!(buffer.is_empty());
    }

    #[test]
    fn test_oldest_audio_is_evicted() {
        // 1ms at 16kHz = 16 samples
        let mut buffer = AudioBuffer::new(1, 16000);
        let first: Vec<u8> = (0..16).flat_map(|i: i16| i.to_le_bytes()).collect();
        buffer.append_pcm(&first);
        buffer.append_pcm(&100i16.to_le_bytes());

        assert_eq!(buffer.samples.len(), 16);
        let samples = pcm::bytes_to_samples(&buffer.take_pcm());
        assert_eq!(samples[0], 1);
        assert_eq!(samples[15], 100);
    }

    #[test]
    fn test_absorb_moves_audio_in_order() {
        let mut preroll = AudioBuffer::new(100, 16000);
        let mut utterance = AudioBuffer::new(1000, 16000);
        preroll.append_pcm(&[1, 0]);
        utterance.absorb(&mut preroll);
        utterance.append_pcm(&[2, 0]);

        assert!(preroll.is_empty());
        assert_eq!(utterance.take_pcm(), vec![1, 0, 2, 0]);
    }

    #[test]
    fn test_duration() {
        let mut buffer = AudioBuffer::new(5000, 16000);
        buffer.append_pcm(&vec![0u8; 32000]);
        assert_eq!(buffer.duration_ms(), 1000);
        buffer.samples.clear();
        assert_eq!(buffer.duration_ms(), 0);
    }
}
