//! # Text-to-Speech Stage
//!
//! Buffers generated text and synthesizes it sentence by sentence, so the
//! caller hears the start of a reply while the rest is still generating.
//! Synthesized PCM is re-chunked into fixed wire-sized frames, and each
//! sentence is announced as `SpokenText` only after all of its audio has been
//! pushed.

use crate::audio::{AudioUnit, ENCODING};
use crate::error::BridgeResult;
use crate::pipeline::frame::Frame;
use crate::pipeline::runner::{Downstream, Stage};
use crate::pipeline::SessionCounters;
use crate::services::TextToSpeech;
use async_trait::async_trait;
use futures_util::StreamExt;
use std::sync::Arc;
use std::time::Instant;
use tracing::debug;

pub struct SynthesisStage {
    tts: Arc<dyn TextToSpeech>,
    voice: String,
    sample_rate: u32,
    chunk_bytes: usize,
    pending: String,
    counters: Arc<SessionCounters>,
}

impl SynthesisStage {
    pub fn new(
        tts: Arc<dyn TextToSpeech>,
        voice: impl Into<String>,
        sample_rate: u32,
        chunk_bytes: usize,
        counters: Arc<SessionCounters>,
    ) -> Self {
        Self {
            tts,
            voice: voice.into(),
            sample_rate,
            // Chunks must hold whole samples.
            chunk_bytes: (chunk_bytes.max(2) / 2) * 2,
            pending: String::new(),
            counters,
        }
    }

    async fn speak(&self, text: String, out: &Downstream) -> BridgeResult<()> {
        let requested = Instant::now();
        self.counters.record_tts_characters(text.chars().count());
        let mut audio = self
            .tts
            .synthesize(&text, &self.voice, self.sample_rate, ENCODING)
            .await?;

        let mut carry: Vec<u8> = Vec::with_capacity(self.chunk_bytes * 2);
        let mut chunks = 0usize;
        let mut first_bytes = true;

        while let Some(bytes) = audio.next().await {
            let bytes = bytes?;
            if first_bytes && !bytes.is_empty() {
                first_bytes = false;
                let ttfb = requested.elapsed();
                self.counters.record_tts_ttfb(ttfb);
                debug!(ttfb_ms = ttfb.as_millis() as u64, "tts first audio");
            }
            carry.extend_from_slice(&bytes);
            while carry.len() >= self.chunk_bytes {
                let chunk: Vec<u8> = carry.drain(..self.chunk_bytes).collect();
                out.push(Frame::OutputAudio(AudioUnit::outbound(chunk, self.sample_rate, 1)))
                    .await?;
                chunks += 1;
            }
        }

        // Drop a dangling half sample, keep the rest as a short final chunk.
        carry.truncate(carry.len() / 2 * 2);
        if !carry.is_empty() {
            out.push(Frame::OutputAudio(AudioUnit::outbound(carry, self.sample_rate, 1)))
                .await?;
            chunks += 1;
        }

        debug!(chars = text.len(), chunks, "sentence synthesized");
        out.push(Frame::SpokenText(text)).await
    }
}

/// Remove and return the first complete sentence in `buffer`.
///
/// A sentence ends at `.`, `!` or `?` followed by whitespace.
pub fn take_sentence(buffer: &mut String) -> Option<String> {
    let mut chars = buffer.char_indices().peekable();
    let mut end = None;

    while let Some((_, c)) = chars.next() {
        if matches!(c, '.' | '!' | '?') {
            if let Some(&(next_index, next)) = chars.peek() {
                if next.is_whitespace() {
                    end = Some(next_index);
                    break;
                }
            }
        }
    }

    let end = end?;
    let sentence = buffer[..end].trim().to_string();
    *buffer = buffer[end..].trim_start().to_string();
    Some(sentence)
}

#[async_trait]
impl Stage for SynthesisStage {
    fn name(&self) -> &'static str {
        "tts"
    }

    async fn process(&mut self, frame: Frame, out: &Downstream) -> BridgeResult<()> {
        match frame {
            Frame::LlmResponseStart => {
                self.pending.clear();
                out.push(Frame::LlmResponseStart).await
            }
            Frame::LlmText(text) => {
                self.pending.push_str(&text);
                while let Some(sentence) = take_sentence(&mut self.pending) {
                    self.speak(sentence, out).await?;
                }
                Ok(())
            }
            Frame::LlmResponseEnd => {
                let rest = std::mem::take(&mut self.pending);
                let rest = rest.trim();
                if !rest.is_empty() {
                    self.speak(rest.to_string(), out).await?;
                }
                out.push(Frame::LlmResponseEnd).await
            }
            other => out.push(other).await,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::MockTts;

    #[tokio::test]
    async fn test_spoken_characters_and_first_audio_are_recorded() {
        let counters = Arc::new(SessionCounters::default());
        let mut stage = SynthesisStage::new(Arc::new(MockTts), "aura", 16000, 640, counters.clone());
        let out = Downstream::detached();

        stage.process(Frame::LlmResponseStart, &out).await.unwrap();
        stage.process(Frame::LlmText("Ça va? Oui".to_string()), &out).await.unwrap();
        stage.process(Frame::LlmResponseEnd, &out).await.unwrap();

        let usage = counters.usage();
        assert_eq!(usage.tts_characters, 9);
        assert_eq!(usage.tts_ttfb_samples, 2);
    }

    #[test]
    fn test_take_sentence_splits_on_terminal_punctuation() {
        let mut buffer = "Hello there! How are you? I am".to_string();
        assert_eq!(take_sentence(&mut buffer), Some("Hello there!".to_string()));
        assert_eq!(take_sentence(&mut buffer), Some("How are you?".to_string()));
        assert_eq!(take_sentence(&mut buffer), None);
        assert_eq!(buffer, "I am");
    }

    #[test]
    fn test_take_sentence_waits_for_whitespace() {
        let mut buffer = "It costs 3.50 dollars.".to_string();
        assert_eq!(take_sentence(&mut buffer), None);

        buffer.push(' ');
        assert_eq!(take_sentence(&mut buffer), Some("It costs 3.50 dollars.".to_string()));
        assert!(buffer.is_empty());
    }
}
