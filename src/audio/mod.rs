//! # Audio Module
//!
//! Everything that touches raw PCM inside a session.
//!
//! ## Key Components:
//! - **AudioUnit**: the pipeline's canonical chunk of PCM plus direction/format
//! - **PCM helpers**: little-endian sample conversion and level measurement
//! - **Audio Buffer**: bounded sample buffer used for utterances and pre-roll
//! - **VAD**: utterance-boundary detection on caller audio
//! - **Capture**: optional full-duplex recording sink
//!
//! ## Audio Format Requirements:
//! - **Sample Rate**: 16kHz (16,000 Hz)
//! - **Bit Depth**: 16-bit PCM
//! - **Channels**: Mono (1 channel)
//! - **Encoding**: Little-endian signed integers (linear16)

pub mod buffer;
pub mod capture;
pub mod frame;
pub mod pcm;
pub mod vad;

pub use frame::{AudioUnit, Direction};

/// Session sample rate. Fixed for every session once its pipeline is assembled.
pub const SAMPLE_RATE: u32 = 16000;

/// Session channel count on the inbound path.
pub const CHANNELS: u16 = 1;

/// Encoding name understood by the speech providers.
pub const ENCODING: &str = "linear16";
