//! Deepgram text-to-speech (`POST /v1/speak`), raw PCM without a container.

use crate::error::{BridgeError, BridgeResult};
use crate::services::{AudioStream, TextToSpeech};
use async_trait::async_trait;
use futures_util::StreamExt;
use serde_json::json;

pub struct DeepgramTts {
    http: reqwest::Client,
    base_url: String,
    api_key: String,
}

impl DeepgramTts {
    pub fn new(http: reqwest::Client, base_url: &str, api_key: &str) -> Self {
        Self {
            http,
            base_url: base_url.trim_end_matches('/').to_string(),
            api_key: api_key.to_string(),
        }
    }

    fn speak_url(&self, voice: &str, sample_rate: u32, encoding: &str) -> String {
        format!(
            "{}/v1/speak?model={}&encoding={}&sample_rate={}&container=none",
            self.base_url, voice, encoding, sample_rate
        )
    }
}

#[async_trait]
impl TextToSpeech for DeepgramTts {
    async fn synthesize(
        &self,
        text: &str,
        voice: &str,
        sample_rate: u32,
        encoding: &str,
    ) -> BridgeResult<AudioStream> {
        let response = self
            .http
            .post(self.speak_url(voice, sample_rate, encoding))
            .header("Authorization", format!("Token {}", self.api_key))
            .json(&json!({ "text": text }))
            .send()
            .await
            .map_err(|e| BridgeError::capability("tts", format!("request failed: {}", e)))?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(BridgeError::capability("tts", format!("{} - {}", status, body)));
        }

        let audio = response.bytes_stream().map(|chunk| {
            chunk
                .map(|bytes| bytes.to_vec())
                .map_err(|e| BridgeError::capability("tts", format!("stream failed: {}", e)))
        });

        Ok(audio.boxed())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_speak_url() {
        let tts = DeepgramTts::new(reqwest::Client::new(), "https://api.deepgram.com/", "k");
        assert_eq!(
            tts.speak_url("aura-2-thalia-en", 16000, "linear16"),
            "https://api.deepgram.com/v1/speak?model=aura-2-thalia-en&encoding=linear16&sample_rate=16000&container=none"
        );
    }
}
