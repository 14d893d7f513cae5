//! Ingress: caller audio enters the pipeline and gets segmented by the VAD.

use crate::audio::vad::{VadEvent, VoiceActivityDetector};
use crate::error::BridgeResult;
use crate::pipeline::frame::Frame;
use crate::pipeline::runner::{Downstream, Stage};
use async_trait::async_trait;

pub struct IngressStage {
    vad: Box<dyn VoiceActivityDetector>,
}

impl IngressStage {
    pub fn new(vad: Box<dyn VoiceActivityDetector>) -> Self {
        Self { vad }
    }
}

#[async_trait]
impl Stage for IngressStage {
    fn name(&self) -> &'static str {
        "ingress"
    }

    async fn process(&mut self, frame: Frame, out: &Downstream) -> BridgeResult<()> {
        let unit = match frame {
            Frame::InputAudio(unit) => unit,
            other => return out.push(other).await,
        };

        let events = self.vad.segment(&unit);

        // A start boundary opens the utterance this chunk belongs to, an end
        // boundary closes it after the chunk.
        if events.contains(&VadEvent::SpeechStarted) {
            out.push(Frame::UserStartedSpeaking).await?;
        }
        out.push(Frame::InputAudio(unit)).await?;
        if events.contains(&VadEvent::SpeechEnded) {
            out.push(Frame::UserStoppedSpeaking).await?;
        }

        Ok(())
    }
}
