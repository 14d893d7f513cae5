//! # Capability Adapters
//!
//! Each external speech or generation service sits behind a small trait with
//! a fixed call contract. The pipeline stages only ever see these traits, so
//! tests can swap every provider for an in-memory mock.
//!
//! ## Providers:
//! - **Deepgram** (`deepgram_stt`, `deepgram_tts`): speech-to-text over a
//!   streaming websocket, text-to-speech over HTTP
//! - **OpenAI** (`openai_llm`): chat completions with server-sent events
//! - **Attendee** (`attendee`): meeting-bot launch API (HTTP surface only)
//!
//! Adapters never retry. A failure becomes `BridgeError::Capability` and the
//! stage that called it decides what happens to the session.

pub mod attendee;
pub mod deepgram_stt;
pub mod deepgram_tts;
pub mod openai_llm;

use crate::audio::capture::{RecordingSink, WavRecorder};
use crate::audio::vad::{EnergyVad, VoiceActivityDetector};
use crate::audio::AudioUnit;
use crate::config::AppConfig;
use crate::error::{BridgeError, BridgeResult};
use crate::pipeline::context::ChatMessage;
use crate::pipeline::SessionConfig;
use async_trait::async_trait;
use futures_util::stream::BoxStream;
use std::sync::Arc;

/// Token counts a language model reports for one completion.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct TokenUsage {
    pub prompt_tokens: u64,
    pub completion_tokens: u64,
}

/// One item of a streamed completion.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CompletionChunk {
    Text(String),
    /// Usage summary, sent once near the end of the stream
    Usage(TokenUsage),
}

/// Incremental output of a language model.
pub type TextStream = BoxStream<'static, BridgeResult<CompletionChunk>>;

/// Raw PCM produced by a speech synthesizer, in arbitrary chunk sizes.
pub type AudioStream = BoxStream<'static, BridgeResult<Vec<u8>>>;

#[async_trait]
pub trait SpeechToText: Send + Sync {
    /// Transcribe one complete caller utterance. An empty string means
    /// nothing intelligible was said.
    async fn transcribe(&self, utterance: &AudioUnit) -> BridgeResult<String>;
}

#[async_trait]
pub trait LanguageModel: Send + Sync {
    /// Start a completion for `messages` and stream the text deltas. Usage
    /// is reported as its own chunk when the provider supplies it.
    async fn generate(&self, model: &str, messages: &[ChatMessage]) -> BridgeResult<TextStream>;
}

#[async_trait]
pub trait TextToSpeech: Send + Sync {
    async fn synthesize(
        &self,
        text: &str,
        voice: &str,
        sample_rate: u32,
        encoding: &str,
    ) -> BridgeResult<AudioStream>;
}

/// Everything a session's stages need from the outside world.
pub struct Capabilities {
    pub stt: Arc<dyn SpeechToText>,
    pub llm: Arc<dyn LanguageModel>,
    pub tts: Arc<dyn TextToSpeech>,
    pub vad: Box<dyn VoiceActivityDetector>,
    pub recorder: Option<Box<dyn RecordingSink>>,
}

/// Builds the capabilities for one session.
pub trait CapabilityFactory: Send + Sync {
    fn build(&self, session_id: &str, config: &SessionConfig) -> BridgeResult<Capabilities>;
}

/// Production factory backed by Deepgram and OpenAI.
#[derive(Clone)]
pub struct ServiceFactory {
    config: AppConfig,
    http: reqwest::Client,
}

impl ServiceFactory {
    pub fn new(config: AppConfig, http: reqwest::Client) -> Self {
        Self { config, http }
    }
}

impl CapabilityFactory for ServiceFactory {
    fn build(&self, session_id: &str, _config: &SessionConfig) -> BridgeResult<Capabilities> {
        let services = &self.config.services;

        if services.deepgram_api_key.is_empty() {
            return Err(BridgeError::Configuration(
                "DEEPGRAM_API_KEY is not set".to_string(),
            ));
        }
        if services.openai_api_key.is_empty() {
            return Err(BridgeError::Configuration(
                "OPENAI_API_KEY is not set".to_string(),
            ));
        }

        let stt = deepgram_stt::DeepgramStt::new(
            &services.deepgram_ws_url,
            &services.deepgram_api_key,
            &services.stt_model,
        );
        let llm = openai_llm::OpenAiLlm::new(
            self.http.clone(),
            &services.openai_base_url,
            &services.openai_api_key,
        );
        let tts = deepgram_tts::DeepgramTts::new(
            self.http.clone(),
            &services.deepgram_base_url,
            &services.deepgram_api_key,
        );

        let recorder: Option<Box<dyn RecordingSink>> = if self.config.recording.enabled {
            Some(Box::new(WavRecorder::new(
                &self.config.recording.directory,
                session_id,
                self.config.audio.sample_rate,
            )))
        } else {
            None
        };

        Ok(Capabilities {
            stt: Arc::new(stt),
            llm: Arc::new(llm),
            tts: Arc::new(tts),
            vad: Box::new(EnergyVad::new(self.config.vad.clone())),
            recorder,
        })
    }
}
