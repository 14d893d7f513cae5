//! Internal audio unit shared by the wire serializer and the pipeline stages.

use crate::audio::CHANNELS;

/// Which way a chunk of audio travels.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Direction {
    /// Caller to bot (decoded from the wire)
    In,
    /// Bot to caller (produced by text-to-speech)
    Out,
}

/// A chunk of PCM16 little-endian audio with its format and direction.
#[derive(Debug, Clone, PartialEq)]
pub struct AudioUnit {
    pub samples: Vec<u8>,
    pub sample_rate: u32,
    pub channels: u16,
    pub direction: Direction,
}

impl AudioUnit {
    /// Caller audio. The inbound path is always mono.
    pub fn inbound(samples: Vec<u8>, sample_rate: u32) -> Self {
        Self {
            samples,
            sample_rate,
            channels: CHANNELS,
            direction: Direction::In,
        }
    }

    pub fn outbound(samples: Vec<u8>, sample_rate: u32, channels: u16) -> Self {
        Self {
            samples,
            sample_rate,
            channels,
            direction: Direction::Out,
        }
    }

    /// Duration of the chunk in milliseconds.
    pub fn duration_ms(&self) -> u32 {
        let frame_bytes = 2 * self.channels.max(1) as usize;
        let frames = self.samples.len() / frame_bytes;
        if self.sample_rate == 0 {
            return 0;
        }
        (frames as u64 * 1000 / self.sample_rate as u64) as u32
    }
}
