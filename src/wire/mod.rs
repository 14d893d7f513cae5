//! # Wire Protocol
//!
//! The session's duplex connection carries JSON text (occasionally the same
//! JSON in a binary frame). This module owns the frame type and decides what
//! each inbound message means to the session:
//!
//! - Attendee mixed audio → caller audio for the pipeline
//! - `{"type": "audio", "data": "<base64>"}` → caller audio (older clients)
//! - `{"type": "config", "data": {...}}` → logged only, no mid-session effect
//! - anything else → ignored

pub mod serializer;

use crate::audio::{AudioUnit, SAMPLE_RATE};
use base64::{engine::general_purpose::STANDARD as BASE64, Engine as _};
use serde_json::Value;

pub use serializer::{deserialize, serialize};

/// One raw message received from or sent to the wire.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum WireFrame {
    Text(String),
    Binary(Vec<u8>),
}

/// What the read loop should do with an inbound frame.
#[derive(Debug, Clone, PartialEq)]
pub enum Inbound {
    Audio(AudioUnit),
    Config(Value),
    Ignored,
}

/// Classify an inbound frame for the session read loop.
pub fn classify(frame: &WireFrame) -> Inbound {
    if let Some(unit) = deserialize(frame) {
        return Inbound::Audio(unit);
    }

    let value: Value = match frame {
        WireFrame::Text(text) => serde_json::from_str(text).unwrap_or(Value::Null),
        WireFrame::Binary(bytes) => serde_json::from_slice(bytes).unwrap_or(Value::Null),
    };

    match value.get("type").and_then(Value::as_str) {
        Some("audio") => value
            .get("data")
            .and_then(Value::as_str)
            .and_then(|chunk| BASE64.decode(chunk).ok())
            .map(|samples| Inbound::Audio(AudioUnit::inbound(samples, SAMPLE_RATE)))
            .unwrap_or(Inbound::Ignored),
        Some("config") => Inbound::Config(value.get("data").cloned().unwrap_or(Value::Null)),
        _ => Inbound::Ignored,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_attendee_audio_is_classified_as_audio() {
        let frame = WireFrame::Text(
            json!({"trigger": "realtime_audio.mixed", "data": {"chunk": BASE64.encode([1u8, 0])}})
                .to_string(),
        );
        assert!(matches!(classify(&frame), Inbound::Audio(_)));
    }

    #[test]
    fn test_legacy_audio_message() {
        let frame = WireFrame::Text(json!({"type": "audio", "data": BASE64.encode([5u8, 0])}).to_string());
        match classify(&frame) {
            Inbound::Audio(unit) => {
                assert_eq!(unit.samples, vec![5, 0]);
                assert_eq!(unit.sample_rate, 16000);
                assert_eq!(unit.channels, 1);
            }
            other => panic!("expected audio, got {:?}", other),
        }
    }

    #[test]
    fn test_legacy_config_message() {
        let frame = WireFrame::Text(json!({"type": "config", "data": {"voice": "x"}}).to_string());
        assert_eq!(classify(&frame), Inbound::Config(json!({"voice": "x"})));
    }

    #[test]
    fn test_everything_else_is_ignored() {
        for frame in [
            WireFrame::Text(json!({"type": "audio", "data": 42}).to_string()),
            WireFrame::Text(json!({"type": "ping"}).to_string()),
            WireFrame::Text(json!({"trigger": "bot.state_change"}).to_string()),
            WireFrame::Binary(vec![1, 2, 3]),
        ] {
            assert_eq!(classify(&frame), Inbound::Ignored);
        }
    }
}
