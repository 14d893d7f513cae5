//! # Attendee Wire Serializer
//!
//! Stateless translation between the meeting bot's JSON audio messages and
//! the pipeline's [`AudioUnit`].
//!
//! ## Wire Format:
//! ```json
//! // caller -> bot (mixed meeting audio)
//! {"trigger": "realtime_audio.mixed",
//!  "data": {"chunk": "<base64 PCM16>", "sample_rate": 16000}}
//!
//! // bot -> caller
//! {"trigger": "realtime_audio.bot_output",
//!  "data": {"chunk": "<base64 PCM16>", "sample_rate": 16000, "num_channels": 1}}
//! ```
//!
//! Nothing here buffers or retries. A message that cannot be decoded is
//! dropped with a debug log and the session carries on.

use crate::audio::{AudioUnit, Direction, SAMPLE_RATE};
use crate::error::{BridgeError, BridgeResult};
use crate::wire::WireFrame;
use base64::{engine::general_purpose::STANDARD as BASE64, Engine as _};
use serde::Deserialize;
use serde_json::{json, Value};
use tracing::{debug, trace};

pub const TRIGGER_INBOUND: &str = "realtime_audio.mixed";
pub const TRIGGER_OUTBOUND: &str = "realtime_audio.bot_output";

/// The two message kinds the protocol carries.
#[derive(Debug, Clone, PartialEq)]
pub enum WireMessage {
    /// Bot audio sent to the meeting
    AudioOutbound {
        chunk: Vec<u8>,
        sample_rate: u32,
        channels: u16,
    },
    /// Mixed meeting audio, always mono
    AudioInbound { chunk: Vec<u8>, sample_rate: u32 },
}

#[derive(Debug, Deserialize)]
struct AudioPayload {
    chunk: String,
    sample_rate: Option<u32>,
    num_channels: Option<u16>,
}

impl WireMessage {
    /// Parse one wire frame.
    ///
    /// Returns `Ok(None)` for well-formed JSON with a trigger this bridge
    /// does not handle, and `Err(ProtocolDecode)` for anything malformed.
    pub fn parse(frame: &WireFrame) -> BridgeResult<Option<WireMessage>> {
        let value: Value = match frame {
            WireFrame::Text(text) => serde_json::from_str(text),
            WireFrame::Binary(bytes) => {
                let text = std::str::from_utf8(bytes)
                    .map_err(|e| BridgeError::ProtocolDecode(format!("invalid utf-8: {}", e)))?;
                serde_json::from_str(text)
            }
        }
        .map_err(|e| BridgeError::ProtocolDecode(format!("invalid json: {}", e)))?;

        let trigger = match value.get("trigger").and_then(Value::as_str) {
            Some(trigger) => trigger,
            None => return Ok(None),
        };

        match trigger {
            TRIGGER_INBOUND => {
                let payload = audio_payload(&value)?;
                Ok(Some(WireMessage::AudioInbound {
                    chunk: decode_chunk(&payload.chunk)?,
                    sample_rate: payload.sample_rate.unwrap_or(SAMPLE_RATE),
                }))
            }
            TRIGGER_OUTBOUND => {
                let payload = audio_payload(&value)?;
                Ok(Some(WireMessage::AudioOutbound {
                    chunk: decode_chunk(&payload.chunk)?,
                    sample_rate: payload.sample_rate.unwrap_or(SAMPLE_RATE),
                    channels: payload.num_channels.unwrap_or(1),
                }))
            }
            other => {
                trace!(trigger = other, "ignoring unrecognized trigger");
                Ok(None)
            }
        }
    }

    pub fn to_json(&self) -> String {
        match self {
            WireMessage::AudioOutbound {
                chunk,
                sample_rate,
                channels,
            } => json!({
                "trigger": TRIGGER_OUTBOUND,
                "data": {
                    "chunk": BASE64.encode(chunk),
                    "sample_rate": sample_rate,
                    "num_channels": channels
                }
            }),
            WireMessage::AudioInbound { chunk, sample_rate } => json!({
                "trigger": TRIGGER_INBOUND,
                "data": {
                    "chunk": BASE64.encode(chunk),
                    "sample_rate": sample_rate
                }
            }),
        }
        .to_string()
    }
}

fn audio_payload(value: &Value) -> BridgeResult<AudioPayload> {
    let data = value
        .get("data")
        .filter(|data| data.is_object())
        .ok_or_else(|| BridgeError::ProtocolDecode("missing data object".to_string()))?;

    AudioPayload::deserialize(data)
        .map_err(|e| BridgeError::ProtocolDecode(format!("invalid audio payload: {}", e)))
}

fn decode_chunk(chunk: &str) -> BridgeResult<Vec<u8>> {
    BASE64
        .decode(chunk)
        .map_err(|e| BridgeError::ProtocolDecode(format!("invalid base64 chunk: {}", e)))
}

/// Turn a pipeline audio unit into a wire message.
///
/// Only bot audio goes out; caller audio yields `None`.
pub fn serialize(unit: &AudioUnit) -> Option<String> {
    match unit.direction {
        Direction::Out => Some(
            WireMessage::AudioOutbound {
                chunk: unit.samples.clone(),
                sample_rate: unit.sample_rate,
                channels: unit.channels,
            }
            .to_json(),
        ),
        Direction::In => None,
    }
}

/// Turn a wire frame into caller audio, or `None` if it is not caller audio.
///
/// Never fails: malformed input is logged at debug level and dropped.
pub fn deserialize(frame: &WireFrame) -> Option<AudioUnit> {
    match WireMessage::parse(frame) {
        Ok(Some(WireMessage::AudioInbound { chunk, sample_rate })) => {
            Some(AudioUnit::inbound(chunk, sample_rate))
        }
        Ok(Some(WireMessage::AudioOutbound { .. })) => {
            trace!("ignoring bot output echoed back on the wire");
            None
        }
        Ok(None) => None,
        Err(err) => {
            debug!(error = %err, "dropping wire message");
            None
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn text(value: Value) -> WireFrame {
        WireFrame::Text(value.to_string())
    }

    #[test]
    fn test_inbound_audio_is_mono_with_payload_rate() {
        let frame = text(json!({
            "trigger": "realtime_audio.mixed",
            "data": {"chunk": BASE64.encode([1u8, 2, 3, 4]), "sample_rate": 8000}
        }));

        let unit = deserialize(&frame).unwrap();
        assert_eq!(unit.samples, vec![1, 2, 3, 4]);
        assert_eq!(unit.sample_rate, 8000);
        assert_eq!(unit.channels, 1);
        assert_eq!(unit.direction, Direction::In);
    }

    #[test]
    fn test_inbound_channel_fields_are_ignored() {
        let frame = text(json!({
            "trigger": "realtime_audio.mixed",
            "data": {
                "chunk": BASE64.encode([1u8, 0, 2, 0]),
                "sample_rate": 16000,
                "num_channels": 2,
                "channels": 2
            }
        }));

        let unit = deserialize(&frame).unwrap();
        assert_eq!(unit.channels, 1);
        assert_eq!(unit.samples, vec![1, 0, 2, 0]);
    }

    #[test]
    fn test_inbound_sample_rate_defaults_to_16k() {
        let frame = text(json!({
            "trigger": "realtime_audio.mixed",
            "data": {"chunk": BASE64.encode([0u8; 4])}
        }));

        assert_eq!(deserialize(&frame).unwrap().sample_rate, 16000);
    }

    #[test]
    fn test_binary_frames_are_decoded_as_utf8_json() {
        let json = json!({
            "trigger": "realtime_audio.mixed",
            "data": {"chunk": BASE64.encode([7u8, 0])}
        })
        .to_string();

        let unit = deserialize(&WireFrame::Binary(json.into_bytes())).unwrap();
        assert_eq!(unit.samples, vec![7, 0]);
    }

    #[test]
    fn test_unrecognized_and_malformed_input_is_dropped() {
        let cases = vec![
            text(json!({"trigger": "participant_events.join", "data": {}})),
            text(json!({"trigger": "realtime_audio.mixed"})),
            text(json!({"trigger": "realtime_audio.mixed", "data": "not an object"})),
            text(json!({"trigger": "realtime_audio.mixed", "data": {"sample_rate": 16000}})),
            text(json!({"trigger": "realtime_audio.mixed", "data": {"chunk": "%%not base64%%"}})),
            text(json!({"hello": "world"})),
            WireFrame::Text("{not json".to_string()),
            WireFrame::Binary(vec![0xff, 0xfe, 0xfd]),
        ];

        for frame in cases {
            assert!(deserialize(&frame).is_none(), "frame should be dropped: {:?}", frame);
        }
    }

    #[test]
    fn test_unknown_trigger_is_not_an_error() {
        let frame = text(json!({"trigger": "transcript.update", "data": {}}));
        assert!(matches!(WireMessage::parse(&frame), Ok(None)));

        let malformed = WireFrame::Text("[".to_string());
        assert!(matches!(
            WireMessage::parse(&malformed),
            Err(BridgeError::ProtocolDecode(_))
        ));
    }

    #[test]
    fn test_serialize_outbound_preserves_bytes_and_format() {
        let pcm = vec![10u8, 20, 30, 40, 50, 60];
        let unit = AudioUnit::outbound(pcm.clone(), 16000, 1);

        let json: Value = serde_json::from_str(&serialize(&unit).unwrap()).unwrap();
        assert_eq!(json["trigger"], "realtime_audio.bot_output");
        assert_eq!(json["data"]["sample_rate"], 16000);
        assert_eq!(json["data"]["num_channels"], 1);

        let chunk = json["data"]["chunk"].as_str().unwrap();
        assert_eq!(BASE64.decode(chunk).unwrap(), pcm);
    }

    #[test]
    fn test_serialize_inbound_yields_nothing() {
        let unit = AudioUnit::inbound(vec![0u8; 640], 16000);
        assert!(serialize(&unit).is_none());
    }

    #[test]
    fn test_bot_output_is_not_treated_as_caller_audio() {
        let unit = AudioUnit::outbound(vec![1u8, 2], 16000, 2);
        let frame = WireFrame::Text(serialize(&unit).unwrap());

        assert!(deserialize(&frame).is_none());
        assert_eq!(
            WireMessage::parse(&frame).unwrap(),
            Some(WireMessage::AudioOutbound {
                chunk: vec![1, 2],
                sample_rate: 16000,
                channels: 2
            })
        );
    }
}
