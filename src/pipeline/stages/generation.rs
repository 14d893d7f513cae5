//! Generation: streams a completion for every context snapshot it receives.

use crate::error::BridgeResult;
use crate::pipeline::frame::Frame;
use crate::pipeline::runner::{Downstream, Stage};
use crate::pipeline::SessionCounters;
use crate::services::{CompletionChunk, LanguageModel};
use async_trait::async_trait;
use futures_util::StreamExt;
use std::sync::Arc;
use std::time::Instant;
use tracing::debug;

pub struct GenerationStage {
    llm: Arc<dyn LanguageModel>,
    model: String,
    counters: Arc<SessionCounters>,
}

impl GenerationStage {
    pub fn new(
        llm: Arc<dyn LanguageModel>,
        model: impl Into<String>,
        counters: Arc<SessionCounters>,
    ) -> Self {
        Self {
            llm,
            model: model.into(),
            counters,
        }
    }
}

#[async_trait]
impl Stage for GenerationStage {
    fn name(&self) -> &'static str {
        "llm"
    }

    async fn process(&mut self, frame: Frame, out: &Downstream) -> BridgeResult<()> {
        let messages = match frame {
            Frame::LlmMessages(messages) => messages,
            other => return out.push(other).await,
        };

        debug!(model = %self.model, turns = messages.len(), "generation requested");
        let requested = Instant::now();
        let mut chunks = self.llm.generate(&self.model, &messages).await?;
        let mut first_token = true;

        out.push(Frame::LlmResponseStart).await?;
        while let Some(chunk) = chunks.next().await {
            match chunk? {
                CompletionChunk::Text(text) => {
                    if first_token {
                        first_token = false;
                        let ttfb = requested.elapsed();
                        self.counters.record_llm_ttfb(ttfb);
                        debug!(ttfb_ms = ttfb.as_millis() as u64, "llm first token");
                    }
                    out.push(Frame::LlmText(text)).await?;
                }
                CompletionChunk::Usage(usage) => {
                    debug!(
                        prompt_tokens = usage.prompt_tokens,
                        completion_tokens = usage.completion_tokens,
                        "llm usage"
                    );
                    self.counters.record_tokens(&usage);
                }
            }
        }
        out.push(Frame::LlmResponseEnd).await
    }
}
