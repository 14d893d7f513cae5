//! # Voice Activity Detection
//!
//! The pipeline only relies on the [`VoiceActivityDetector`] contract: feed it
//! caller audio in arrival order and it reports utterance boundaries.
//!
//! [`EnergyVad`] is the bundled detector. It compares each frame's RMS level
//! against a threshold and applies start/stop hysteresis, so a short click
//! does not open an utterance and a short pause does not close one.

use crate::audio::{pcm, AudioUnit};
use crate::config::VadConfig;
use tracing::debug;

/// Utterance boundary reported by a detector.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum VadEvent {
    SpeechStarted,
    /// End of a caller speech segment. Triggers transcription.
    SpeechEnded,
}

/// Segment caller audio into utterances.
pub trait VoiceActivityDetector: Send {
    /// Analyze the next chunk of caller audio and return any boundaries it
    /// crosses, in order.
    fn segment(&mut self, unit: &AudioUnit) -> Vec<VadEvent>;
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum VadState {
    Quiet,
    Starting,
    Speaking,
    Stopping,
}

/// RMS-threshold detector with hysteresis.
pub struct EnergyVad {
    config: VadConfig,
    state: VadState,
    /// Milliseconds spent in the current transitional state
    elapsed_ms: u32,
}

impl EnergyVad {
    pub fn new(config: VadConfig) -> Self {
        Self {
            config,
            state: VadState::Quiet,
            elapsed_ms: 0,
        }
    }
}

impl VoiceActivityDetector for EnergyVad {
    fn segment(&mut self, unit: &AudioUnit) -> Vec<VadEvent> {
        let level = pcm::rms(&pcm::bytes_to_samples(&unit.samples));
        let voiced = level >= self.config.threshold;
        let frame_ms = unit.duration_ms();
        let mut events = Vec::new();

        self.state = match (self.state, voiced) {
            (VadState::Quiet, false) => VadState::Quiet,
            (VadState::Quiet, true) | (VadState::Starting, true) => {
                let so_far = if self.state == VadState::Quiet { 0 } else { self.elapsed_ms };
                self.elapsed_ms = so_far + frame_ms;
                if self.elapsed_ms >= self.config.start_ms {
                    debug!(rms = level, "speech started");
                    events.push(VadEvent::SpeechStarted);
                    VadState::Speaking
                } else {
                    VadState::Starting
                }
            }
            (VadState::Starting, false) => VadState::Quiet,
            (VadState::Speaking, true) | (VadState::Stopping, true) => VadState::Speaking,
            (VadState::Speaking, false) | (VadState::Stopping, false) => {
                let so_far = if self.state == VadState::Speaking { 0 } else { self.elapsed_ms };
                self.elapsed_ms = so_far + frame_ms;
                if self.elapsed_ms >= self.config.stop_ms {
                    debug!(rms = level, "speech ended");
                    events.push(VadEvent::SpeechEnded);
                    VadState::Quiet
                } else {
                    VadState::Stopping
                }
            }
        };

        events
    }
}
