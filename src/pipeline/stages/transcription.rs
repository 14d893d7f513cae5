//! Speech-to-text: collects caller audio between VAD boundaries and
//! transcribes each utterance once it ends.

use crate::audio::buffer::AudioBuffer;
use crate::audio::AudioUnit;
use crate::error::BridgeResult;
use crate::pipeline::frame::Frame;
use crate::pipeline::runner::{Downstream, Stage};
use crate::services::SpeechToText;
use async_trait::async_trait;
use std::sync::Arc;
use tracing::debug;

/// Audio kept from before the VAD confirmed speech.
const PRE_ROLL_MS: u32 = 300;

/// Longest utterance sent to the recognizer; older audio is dropped.
const MAX_UTTERANCE_MS: u32 = 30_000;

pub struct TranscriptionStage {
    stt: Arc<dyn SpeechToText>,
    sample_rate: u32,
    pre_roll: AudioBuffer,
    utterance: AudioBuffer,
    speaking: bool,
}

impl TranscriptionStage {
    pub fn new(stt: Arc<dyn SpeechToText>, sample_rate: u32) -> Self {
        Self {
            stt,
            sample_rate,
            pre_roll: AudioBuffer::new(PRE_ROLL_MS, sample_rate),
            utterance: AudioBuffer::new(MAX_UTTERANCE_MS, sample_rate),
            speaking: false,
        }
    }
}

#[async_trait]
impl Stage for TranscriptionStage {
    fn name(&self) -> &'static str {
        "stt"
    }

    async fn process(&mut self, frame: Frame, out: &Downstream) -> BridgeResult<()> {
        match frame {
            Frame::UserStartedSpeaking => {
                self.speaking = true;
                self.utterance.absorb(&mut self.pre_roll);
                out.push(Frame::UserStartedSpeaking).await
            }
            Frame::InputAudio(unit) => {
                if self.speaking {
                    self.utterance.append_pcm(&unit.samples);
                } else {
                    self.pre_roll.append_pcm(&unit.samples);
                }
                out.push(Frame::InputAudio(unit)).await
            }
            Frame::UserStoppedSpeaking => {
                self.speaking = false;

                if !self.utterance.is_empty() {
                    let audio_ms = self.utterance.duration_ms();
                    let utterance = AudioUnit::inbound(self.utterance.take_pcm(), self.sample_rate);
                    let text = self.stt.transcribe(&utterance).await?;
                    let text = text.trim();

                    debug!(audio_ms, chars = text.len(), "transcription received");
                    if !text.is_empty() {
                        out.push(Frame::Transcription(text.to_string())).await?;
                    }
                }

                out.push(Frame::UserStoppedSpeaking).await
            }
            other => out.push(other).await,
        }
    }
}
