//! # Configuration Management
//!
//! Loads the bridge configuration from multiple sources:
//! - Default values (built into the code)
//! - TOML configuration file (config.toml)
//! - Environment variables (with APP_ prefix)
//! - The plain provider variables (`DEEPGRAM_API_KEY`, `OPENAI_API_KEY`,
//!   `ATTENDEE_API_KEY`) and the deployment variables `HOST` / `PORT`
//!
//! ## Configuration Priority (highest to lowest):
//! 1. Plain provider / deployment environment variables
//! 2. APP_ environment variables (APP_SESSION__READ_TIMEOUT_MS, ...)
//! 3. Configuration file (config.toml)
//! 4. Default values (defined in the Default impl)
//!
//! The `[agent]` section holds the documented defaults for a session's
//! prompt, greeting, generation model and voice. They only apply when a
//! launch request did not supply its own values.

use anyhow::Result;
use serde::{Deserialize, Serialize};
use std::env;

/// Main application configuration that contains all settings.
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
#[serde(default)]
pub struct AppConfig {
    pub server: ServerConfig,
    pub services: ServicesConfig,
    pub agent: AgentDefaults,
    pub audio: AudioConfig,
    pub session: SessionLimits,
    pub vad: VadConfig,
    pub recording: RecordingConfig,
}

/// Server-specific configuration settings.
///
/// ## Common values:
/// - `host = "127.0.0.1"`: Only accept connections from localhost (development)
/// - `host = "0.0.0.0"`: Accept connections from any IP address (production)
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
    pub host: String,
    pub port: u16,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: "127.0.0.1".to_string(),
            port: 8080,
        }
    }
}

/// Credentials and endpoints of the external providers.
///
/// An empty key means "not configured". Session assembly checks the keys it
/// needs and refuses to start a session without them.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ServicesConfig {
    pub deepgram_api_key: String,
    pub openai_api_key: String,
    pub attendee_api_key: String,
    pub deepgram_base_url: String,
    pub deepgram_ws_url: String,
    pub openai_base_url: String,
    pub attendee_base_url: String,
    /// Deepgram speech-to-text model
    pub stt_model: String,
}

impl Default for ServicesConfig {
    fn default() -> Self {
        Self {
            deepgram_api_key: String::new(),
            openai_api_key: String::new(),
            attendee_api_key: String::new(),
            deepgram_base_url: "https://api.deepgram.com".to_string(),
            deepgram_ws_url: "wss://api.deepgram.com".to_string(),
            openai_base_url: "https://api.openai.com".to_string(),
            attendee_base_url: "https://app.attendee.dev".to_string(),
            stt_model: "nova-2".to_string(),
        }
    }
}

/// Fallback values for a session's agent persona.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct AgentDefaults {
    pub prompt: String,
    pub greeting: String,
    pub generation_model: String,
    pub voice: String,
    /// Display name of the bot inside the meeting
    pub bot_name: String,
}

impl Default for AgentDefaults {
    fn default() -> Self {
        Self {
            prompt: "You are a super duper helpful assistant".to_string(),
            greeting: "Hello! I'm your voice assistant. How can I help you today?".to_string(),
            generation_model: "gpt-4o".to_string(),
            voice: "aura-2-thalia-en".to_string(),
            bot_name: "Pipecat Voice Agent".to_string(),
        }
    }
}

/// Fixed audio format of every session (16 kHz, mono, linear16).
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct AudioConfig {
    pub sample_rate: u32,
    pub channels: u16,
    /// Size of one outbound audio chunk in milliseconds
    pub chunk_ms: u32,
}

impl Default for AudioConfig {
    fn default() -> Self {
        Self {
            sample_rate: 16000,
            channels: 1,
            chunk_ms: 20,
        }
    }
}

/// Per-session limits and timings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SessionLimits {
    /// Bounded wait of the wire read loop before it re-checks the pipeline
    pub read_timeout_ms: u64,
    pub max_concurrent_sessions: usize,
    /// Capacity of the channels between pipeline stages
    pub channel_capacity: usize,
    /// Launches that never connected are forgotten after this many seconds
    pub launch_ttl_seconds: u64,
}

impl Default for SessionLimits {
    fn default() -> Self {
        Self {
            read_timeout_ms: 1000,
            max_concurrent_sessions: 10,
            channel_capacity: 256,
            launch_ttl_seconds: 600,
        }
    }
}

/// Energy-based voice activity detection.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct VadConfig {
    /// RMS level (0.0 - 1.0) above which a frame counts as speech
    pub threshold: f32,
    /// Continuous speech needed before "speech started" fires
    pub start_ms: u32,
    /// Continuous silence needed before "speech ended" fires
    pub stop_ms: u32,
}

impl Default for VadConfig {
    fn default() -> Self {
        Self {
            threshold: 0.02,
            start_ms: 200,
            stop_ms: 800,
        }
    }
}

/// Optional full-duplex recording of every session.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct RecordingConfig {
    pub enabled: bool,
    pub directory: String,
}

impl Default for RecordingConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            directory: "recordings".to_string(),
        }
    }
}

impl AppConfig {
    /// Load configuration from multiple sources in priority order.
    ///
    /// ## Environment Variable Examples:
    /// - `APP_SERVER__PORT=3000`: Override server port (`__` separates nesting)
    /// - `APP_RECORDING__ENABLED=true`: Record every session
    /// - `DEEPGRAM_API_KEY=...`: Speech-to-text and text-to-speech credential
    /// - `PORT=3000`: Special case for deployment platforms
    pub fn load() -> Result<Self> {
        let mut settings = config::Config::builder()
            .add_source(config::Config::try_from(&AppConfig::default())?)
            .add_source(config::File::with_name("config").required(false))
            .add_source(config::Environment::with_prefix("APP").prefix_separator("_").separator("__"));

        if let Ok(host) = env::var("HOST") {
            settings = settings.set_override("server.host", host)?;
        }

        if let Ok(port) = env::var("PORT") {
            settings = settings.set_override("server.port", port)?;
        }

        for (var, key) in [
            ("DEEPGRAM_API_KEY", "services.deepgram_api_key"),
            ("OPENAI_API_KEY", "services.openai_api_key"),
            ("ATTENDEE_API_KEY", "services.attendee_api_key"),
        ] {
            if let Ok(value) = env::var(var) {
                settings = settings.set_override(key, value)?;
            }
        }

        let config = settings.build()?.try_deserialize()?;
        Ok(config)
    }

    /// Validate that the configuration values make sense.
    ///
    /// The audio format is part of the wire contract, so anything other than
    /// 16 kHz mono is rejected here rather than transcoded later.
    pub fn validate(&self) -> Result<()> {
        if self.server.port == 0 {
            return Err(anyhow::anyhow!("Server port cannot be 0"));
        }

        if self.session.max_concurrent_sessions == 0 {
            return Err(anyhow::anyhow!("Max concurrent sessions must be greater than 0"));
        }

        if self.session.read_timeout_ms == 0 {
            return Err(anyhow::anyhow!("Read timeout must be greater than 0"));
        }

        if self.session.channel_capacity == 0 {
            return Err(anyhow::anyhow!("Channel capacity must be greater than 0"));
        }

        if self.audio.sample_rate != 16000 || self.audio.channels != 1 {
            return Err(anyhow::anyhow!(
                "Audio format must be 16000 Hz mono, got {} Hz with {} channels",
                self.audio.sample_rate,
                self.audio.channels
            ));
        }

        if self.audio.chunk_ms == 0 {
            return Err(anyhow::anyhow!("Audio chunk duration must be greater than 0"));
        }

        if !(0.0..=1.0).contains(&self.vad.threshold) {
            return Err(anyhow::anyhow!("VAD threshold must be between 0.0 and 1.0"));
        }

        Ok(())
    }

    /// Size in bytes of one outbound PCM16 chunk.
    pub fn chunk_bytes(&self) -> usize {
        (self.audio.sample_rate as usize * self.audio.chunk_ms as usize / 1000)
            * self.audio.channels as usize
            * 2
    }

    /// JSON view of the configuration with every credential redacted.
    pub fn redacted(&self) -> serde_json::Value {
        fn mask(secret: &str) -> &'static str {
            if secret.is_empty() {
                "not set"
            } else {
                "set"
            }
        }

        serde_json::json!({
            "server": self.server,
            "services": {
                "deepgram_api_key": mask(&self.services.deepgram_api_key),
                "openai_api_key": mask(&self.services.openai_api_key),
                "attendee_api_key": mask(&self.services.attendee_api_key),
                "deepgram_base_url": self.services.deepgram_base_url,
                "deepgram_ws_url": self.services.deepgram_ws_url,
                "openai_base_url": self.services.openai_base_url,
                "attendee_base_url": self.services.attendee_base_url,
                "stt_model": self.services.stt_model
            },
            "agent": self.agent,
            "audio": self.audio,
            "session": self.session,
            "vad": self.vad,
            "recording": self.recording
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config() {
        let config = AppConfig::default();
        assert_eq!(config.server.host, "127.0.0.1");
        assert_eq!(config.server.port, 8080);
        assert_eq!(config.agent.generation_model, "gpt-4o");
        assert_eq!(config.agent.voice, "aura-2-thalia-en");
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_config_validation() {
        let mut config = AppConfig::default();
        config.server.port = 0;
        assert!(config.validate().is_err());

        let mut config = AppConfig::default();
        config.audio.sample_rate = 48000;
        assert!(config.validate().is_err());

        let mut config = AppConfig::default();
        config.session.read_timeout_ms = 0;
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_partial_toml_file_keeps_defaults() {
        let text = r#"
            [server]
            port = 9090

            [agent]
            voice = "aura-asteria-en"
        "#;
        let config: AppConfig = toml::from_str(text).unwrap();
        assert_eq!(config.server.port, 9090);
        assert_eq!(config.server.host, "127.0.0.1");
        assert_eq!(config.agent.voice, "aura-asteria-en");
        assert_eq!(config.agent.generation_model, "gpt-4o");
        assert_eq!(config.session.read_timeout_ms, 1000);
    }

    #[test]
    fn test_chunk_bytes_is_twenty_milliseconds() {
        let config = AppConfig::default();
        assert_eq!(config.chunk_bytes(), 640);
    }

    #[test]
    fn test_redacted_hides_credentials() {
        let mut config = AppConfig::default();
        config.services.openai_api_key = "sk-secret".to_string();
        let view = config.redacted();
        assert_eq!(view["services"]["openai_api_key"], "set");
        assert_eq!(view["services"]["deepgram_api_key"], "not set");
        assert!(!view.to_string().contains("sk-secret"));
    }
}
