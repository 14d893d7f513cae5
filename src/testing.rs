//! In-memory capabilities and wire used by the session tests.

use crate::audio::vad::{VadEvent, VoiceActivityDetector};
use crate::audio::AudioUnit;
use crate::error::{BridgeError, BridgeResult};
use crate::pipeline::context::ChatMessage;
use crate::pipeline::SessionConfig;
use crate::services::{
    AudioStream, Capabilities, CapabilityFactory, CompletionChunk, LanguageModel, SpeechToText,
    TextStream, TextToSpeech, TokenUsage,
};
use crate::session::transport::WireSender;
use async_trait::async_trait;
use futures_util::stream::{self, StreamExt};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use tokio::sync::mpsc;

/// What the mock recognizer answers.
#[derive(Clone)]
pub enum Transcript {
    Fixed(String),
    /// The utterance bytes read back as UTF-8
    Echo,
    Fail,
}

pub struct MockStt {
    transcript: Transcript,
}

#[async_trait]
impl SpeechToText for MockStt {
    async fn transcribe(&self, utterance: &AudioUnit) -> BridgeResult<String> {
        match &self.transcript {
            Transcript::Fixed(text) => Ok(text.clone()),
            Transcript::Echo => Ok(String::from_utf8_lossy(&utterance.samples).into_owned()),
            Transcript::Fail => Err(BridgeError::capability("stt", "recognizer unavailable")),
        }
    }
}

/// Streams a fixed reply in two deltas, then reports ten prompt tokens per
/// message and one completion token per delta. Records every request.
pub struct MockLlm {
    reply: String,
    pub requests: Arc<Mutex<Vec<Vec<ChatMessage>>>>,
}

#[async_trait]
impl LanguageModel for MockLlm {
    async fn generate(&self, _model: &str, messages: &[ChatMessage]) -> BridgeResult<TextStream> {
        self.requests.lock().unwrap().push(messages.to_vec());

        let middle = self.reply.len() / 2;
        let (head, tail) = self.reply.split_at(middle);
        let chunks = vec![
            Ok(CompletionChunk::Text(head.to_string())),
            Ok(CompletionChunk::Text(tail.to_string())),
            Ok(CompletionChunk::Usage(TokenUsage {
                prompt_tokens: messages.len() as u64 * 10,
                completion_tokens: 2,
            })),
        ];
        Ok(stream::iter(chunks).boxed())
    }
}

/// Produces 40 ms of silence per request, in uneven pieces.
pub struct MockTts;

#[async_trait]
impl TextToSpeech for MockTts {
    async fn synthesize(
        &self,
        _text: &str,
        _voice: &str,
        _sample_rate: u32,
        _encoding: &str,
    ) -> BridgeResult<AudioStream> {
        let pieces = vec![Ok(vec![0u8; 700]), Ok(vec![0u8; 580])];
        Ok(stream::iter(pieces).boxed())
    }
}

/// Treats every audio frame as one complete utterance.
pub struct FrameVad;

impl VoiceActivityDetector for FrameVad {
    fn segment(&mut self, _unit: &AudioUnit) -> Vec<VadEvent> {
        vec![VadEvent::SpeechStarted, VadEvent::SpeechEnded]
    }
}

pub struct MockFactory {
    pub transcript: Transcript,
    pub reply: String,
    pub requests: Arc<Mutex<Vec<Vec<ChatMessage>>>>,
}

impl Default for MockFactory {
    fn default() -> Self {
        Self {
            transcript: Transcript::Fixed("what time is it".to_string()),
            reply: "It is noon.".to_string(),
            requests: Arc::new(Mutex::new(Vec::new())),
        }
    }
}

impl CapabilityFactory for MockFactory {
    fn build(&self, _session_id: &str, _config: &SessionConfig) -> BridgeResult<Capabilities> {
        Ok(Capabilities {
            stt: Arc::new(MockStt {
                transcript: self.transcript.clone(),
            }),
            llm: Arc::new(MockLlm {
                reply: self.reply.clone(),
                requests: self.requests.clone(),
            }),
            tts: Arc::new(MockTts),
            vad: Box::new(FrameVad),
            recorder: None,
        })
    }
}

/// Outbound half of an in-memory wire that counts close calls.
pub struct MockWire {
    outbound: mpsc::UnboundedSender<String>,
    closes: Arc<AtomicUsize>,
    broken: bool,
}

impl MockWire {
    pub fn new() -> (Self, mpsc::UnboundedReceiver<String>) {
        let (outbound, rx) = mpsc::unbounded_channel();
        (
            Self {
                outbound,
                closes: Arc::new(AtomicUsize::new(0)),
                broken: false,
            },
            rx,
        )
    }

    /// A wire whose every send fails, as after a lost connection.
    pub fn broken() -> Self {
        let (wire, _rx) = Self::new();
        Self {
            broken: true,
            ..wire
        }
    }

    pub fn closes(&self) -> Arc<AtomicUsize> {
        self.closes.clone()
    }
}

#[async_trait]
impl WireSender for MockWire {
    async fn send(&self, text: String) -> BridgeResult<()> {
        if self.broken {
            return Err(BridgeError::Transport("connection reset".to_string()));
        }
        if self.closes.load(Ordering::SeqCst) > 0 {
            return Err(BridgeError::Transport("closed".to_string()));
        }
        self.outbound
            .send(text)
            .map_err(|_| BridgeError::Transport("peer gone".to_string()))
    }

    async fn close(&self) {
        self.closes.fetch_add(1, Ordering::SeqCst);
    }
}
