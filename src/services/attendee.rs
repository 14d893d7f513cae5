//! Attendee meeting-bot API client.
//!
//! Launching a bot asks Attendee to join `meeting_url` and stream the
//! meeting's mixed audio to our websocket at `websocket_url`.

use crate::audio::SAMPLE_RATE;
use crate::error::{BridgeError, BridgeResult};
use serde_json::{json, Value};
use tracing::{error, info};

pub struct AttendeeClient {
    http: reqwest::Client,
    base_url: String,
    api_key: String,
}

impl AttendeeClient {
    /// Fails with a configuration error when no API key is configured.
    pub fn new(http: reqwest::Client, base_url: &str, api_key: &str) -> BridgeResult<Self> {
        if api_key.is_empty() {
            return Err(BridgeError::Configuration(
                "ATTENDEE_API_KEY not set in environment".to_string(),
            ));
        }

        Ok(Self {
            http,
            base_url: base_url.trim_end_matches('/').to_string(),
            api_key: api_key.to_string(),
        })
    }

    /// Request body for `POST /api/v1/bots`.
    pub fn launch_body(meeting_url: &str, websocket_url: &str, bot_name: &str) -> Value {
        json!({
            "meeting_url": meeting_url,
            "bot_name": bot_name,
            "websocket_settings": {
                "audio": {
                    "url": websocket_url,
                    "sample_rate": SAMPLE_RATE
                }
            }
        })
    }

    /// Launch a bot. Returns Attendee's response body.
    pub async fn launch_bot(
        &self,
        meeting_url: &str,
        websocket_url: &str,
        bot_name: &str,
    ) -> BridgeResult<Value> {
        let response = self
            .http
            .post(format!("{}/api/v1/bots", self.base_url))
            .header("Authorization", format!("Token {}", self.api_key))
            .json(&Self::launch_body(meeting_url, websocket_url, bot_name))
            .send()
            .await
            .map_err(|e| BridgeError::capability("attendee", format!("request failed: {}", e)))?;

        let status = response.status();
        let body = response.text().await.unwrap_or_default();

        if !status.is_success() {
            error!("Bot launch failed: {} - {}", status, body);
            return Err(BridgeError::capability(
                "attendee",
                format!("Error launching bot: {} - {}", status.as_u16(), body),
            ));
        }

        info!("Bot launch successful");
        Ok(serde_json::from_str(&body).unwrap_or(Value::Null))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_missing_key_is_rejected() {
        let result = AttendeeClient::new(reqwest::Client::new(), "https://app.attendee.dev", "");
        assert!(matches!(result, Err(BridgeError::Configuration(_))));
    }

    #[test]
    fn test_launch_body_shape() {
        let body = AttendeeClient::launch_body(
            "https://meet.google.com/abc-defg-hij",
            "wss://example.ngrok.app/ws?launch=1",
            "Pipecat Voice Agent",
        );

        assert_eq!(body["meeting_url"], "https://meet.google.com/abc-defg-hij");
        assert_eq!(body["bot_name"], "Pipecat Voice Agent");
        assert_eq!(body["websocket_settings"]["audio"]["url"], "wss://example.ngrok.app/ws?launch=1");
        assert_eq!(body["websocket_settings"]["audio"]["sample_rate"], 16000);
    }
}
