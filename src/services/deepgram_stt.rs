//! Deepgram streaming speech-to-text.
//!
//! One websocket per utterance: the buffered PCM is streamed to
//! `/v1/listen`, a `CloseStream` message flushes the recognizer, and every
//! final result received before the server closes is joined into the
//! transcript.

use crate::audio::{AudioUnit, ENCODING};
use crate::error::{BridgeError, BridgeResult};
use crate::services::SpeechToText;
use async_trait::async_trait;
use futures_util::{SinkExt, StreamExt};
use serde_json::Value;
use std::time::Duration;
use tokio_tungstenite::connect_async;
use tokio_tungstenite::tungstenite::client::IntoClientRequest;
use tokio_tungstenite::tungstenite::http::HeaderValue;
use tokio_tungstenite::tungstenite::Message;
use tracing::{debug, warn};

/// Audio is sent in pieces of this size (250 ms at 16 kHz mono).
const SEND_CHUNK_BYTES: usize = 8000;

/// How long to wait for Deepgram to finish after `CloseStream`.
const RESULT_TIMEOUT: Duration = Duration::from_secs(10);

pub struct DeepgramStt {
    ws_url: String,
    api_key: String,
    model: String,
}

impl DeepgramStt {
    pub fn new(ws_url: &str, api_key: &str, model: &str) -> Self {
        Self {
            ws_url: ws_url.trim_end_matches('/').to_string(),
            api_key: api_key.to_string(),
            model: model.to_string(),
        }
    }

    fn listen_url(&self, unit: &AudioUnit) -> String {
        format!(
            "{}/v1/listen?model={}&encoding={}&sample_rate={}&channels={}&punctuate=true",
            self.ws_url, self.model, ENCODING, unit.sample_rate, unit.channels
        )
    }
}

fn stt_error(message: impl Into<String>) -> BridgeError {
    BridgeError::capability("stt", message)
}

/// Extract the transcript of a final `Results` message, if it has one.
fn final_transcript(message: &str) -> Option<String> {
    let value: Value = serde_json::from_str(message).ok()?;

    if value.get("type").and_then(Value::as_str) != Some("Results") {
        return None;
    }
    if !value.get("is_final").and_then(Value::as_bool).unwrap_or(false) {
        return None;
    }

    let transcript = value["channel"]["alternatives"][0]["transcript"].as_str()?.trim();
    if transcript.is_empty() {
        None
    } else {
        Some(transcript.to_string())
    }
}

#[async_trait]
impl SpeechToText for DeepgramStt {
    async fn transcribe(&self, utterance: &AudioUnit) -> BridgeResult<String> {
        if utterance.samples.is_empty() {
            return Ok(String::new());
        }

        let mut request = self
            .listen_url(utterance)
            .into_client_request()
            .map_err(|e| stt_error(format!("invalid listen url: {}", e)))?;
        let auth = HeaderValue::from_str(&format!("Token {}", self.api_key))
            .map_err(|e| stt_error(format!("invalid api key: {}", e)))?;
        request.headers_mut().insert("Authorization", auth);

        let (socket, _) = connect_async(request)
            .await
            .map_err(|e| stt_error(format!("connect failed: {}", e)))?;
        let (mut write, mut read) = socket.split();

        for chunk in utterance.samples.chunks(SEND_CHUNK_BYTES) {
            write
                .send(Message::Binary(chunk.to_vec()))
                .await
                .map_err(|e| stt_error(format!("send failed: {}", e)))?;
        }
        write
            .send(Message::Text(r#"{"type":"CloseStream"}"#.to_string()))
            .await
            .map_err(|e| stt_error(format!("send failed: {}", e)))?;

        let mut parts = Vec::new();
        let collect = async {
            while let Some(message) = read.next().await {
                match message {
                    Ok(Message::Text(text)) => {
                        if let Some(part) = final_transcript(&text) {
                            parts.push(part);
                        }
                    }
                    Ok(Message::Close(_)) => break,
                    Ok(_) => {}
                    Err(e) => return Err(stt_error(format!("receive failed: {}", e))),
                }
            }
            Ok(())
        };

        match tokio::time::timeout(RESULT_TIMEOUT, collect).await {
            Ok(result) => result?,
            Err(_) => warn!("Deepgram did not close the stream in time, using partial transcript"),
        }

        let transcript = parts.join(" ");
        debug!(
            audio_ms = utterance.duration_ms(),
            chars = transcript.len(),
            "utterance transcribed"
        );
        Ok(transcript)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_final_results_are_extracted() {
        let message = r#"{"type":"Results","is_final":true,
            "channel":{"alternatives":[{"transcript":" hello there ","confidence":0.98}]}}"#;
        assert_eq!(final_transcript(message), Some("hello there".to_string()));
    }

    #[test]
    fn test_interim_and_empty_results_are_skipped() {
        let interim = r#"{"type":"Results","is_final":false,
            "channel":{"alternatives":[{"transcript":"hel"}]}}"#;
        let empty = r#"{"type":"Results","is_final":true,
            "channel":{"alternatives":[{"transcript":""}]}}"#;
        let metadata = r#"{"type":"Metadata","request_id":"abc"}"#;

        assert!(final_transcript(interim).is_none());
        assert!(final_transcript(empty).is_none());
        assert!(final_transcript(metadata).is_none());
        assert!(final_transcript("not json").is_none());
    }

    #[test]
    fn test_listen_url_carries_audio_format() {
        let stt = DeepgramStt::new("wss://api.deepgram.com/", "key", "nova-2");
        let url = stt.listen_url(&AudioUnit::inbound(vec![], 16000));
        assert_eq!(
            url,
            "wss://api.deepgram.com/v1/listen?model=nova-2&encoding=linear16&sample_rate=16000&channels=1&punctuate=true"
        );
    }
}
