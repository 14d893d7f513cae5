//! OpenAI chat completions with server-sent event streaming.

use crate::error::{BridgeError, BridgeResult};
use crate::pipeline::context::ChatMessage;
use crate::services::{CompletionChunk, LanguageModel, TextStream, TokenUsage};
use async_trait::async_trait;
use futures_util::stream::{self, StreamExt};
use serde_json::{json, Value};
use std::collections::VecDeque;
use tracing::debug;

pub struct OpenAiLlm {
    http: reqwest::Client,
    base_url: String,
    api_key: String,
}

impl OpenAiLlm {
    pub fn new(http: reqwest::Client, base_url: &str, api_key: &str) -> Self {
        Self {
            http,
            base_url: base_url.trim_end_matches('/').to_string(),
            api_key: api_key.to_string(),
        }
    }
}

fn llm_error(message: impl Into<String>) -> BridgeError {
    BridgeError::capability("llm", message)
}

#[derive(Debug, PartialEq, Eq)]
enum SseEvent {
    Data(String),
    Done,
}

/// Splits a byte stream into `data:` lines. Network chunks can end in the
/// middle of a line, or of a UTF-8 sequence, so raw bytes are kept until a
/// full line has arrived.
#[derive(Default)]
struct SseDecoder {
    buffer: Vec<u8>,
}

impl SseDecoder {
    fn push(&mut self, bytes: &[u8]) -> Vec<SseEvent> {
        self.buffer.extend_from_slice(bytes);

        let mut events = Vec::new();
        while let Some(pos) = self.buffer.iter().position(|&b| b == b'\n') {
            let line: Vec<u8> = self.buffer.drain(..=pos).collect();
            let line = match std::str::from_utf8(&line) {
                Ok(line) => line.trim(),
                Err(e) => {
                    debug!(error = %e, "skipping non UTF-8 event line");
                    continue;
                }
            };

            if let Some(data) = line.strip_prefix("data:") {
                let data = data.trim();
                if data == "[DONE]" {
                    events.push(SseEvent::Done);
                } else if !data.is_empty() {
                    events.push(SseEvent::Data(data.to_string()));
                }
            }
        }
        events
    }
}

/// Text delta and usage carried by one streamed completion chunk.
///
/// With `include_usage` the final chunk has an empty `choices` array and a
/// `usage` object.
fn completion_chunks(data: &str) -> Vec<CompletionChunk> {
    let value: Value = match serde_json::from_str(data) {
        Ok(value) => value,
        Err(e) => {
            debug!(error = %e, "skipping malformed completion chunk");
            return Vec::new();
        }
    };

    let mut chunks = Vec::new();
    if let Some(delta) = value["choices"][0]["delta"]["content"]
        .as_str()
        .filter(|delta| !delta.is_empty())
    {
        chunks.push(CompletionChunk::Text(delta.to_string()));
    }

    let usage = &value["usage"];
    if usage.is_object() {
        chunks.push(CompletionChunk::Usage(TokenUsage {
            prompt_tokens: usage["prompt_tokens"].as_u64().unwrap_or(0),
            completion_tokens: usage["completion_tokens"].as_u64().unwrap_or(0),
        }));
    }
    chunks
}

struct StreamState<S> {
    body: S,
    decoder: SseDecoder,
    pending: VecDeque<BridgeResult<CompletionChunk>>,
    done: bool,
}

#[async_trait]
impl LanguageModel for OpenAiLlm {
    async fn generate(&self, model: &str, messages: &[ChatMessage]) -> BridgeResult<TextStream> {
        let response = self
            .http
            .post(format!("{}/v1/chat/completions", self.base_url))
            .bearer_auth(&self.api_key)
            .json(&json!({
                "model": model,
                "messages": messages,
                "stream": true,
                "stream_options": {"include_usage": true}
            }))
            .send()
            .await
            .map_err(|e| llm_error(format!("request failed: {}", e)))?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(llm_error(format!("{} - {}", status, body)));
        }

        let state = StreamState {
            body: response.bytes_stream(),
            decoder: SseDecoder::default(),
            pending: VecDeque::new(),
            done: false,
        };

        let deltas = stream::unfold(state, |mut state| async move {
            loop {
                if let Some(item) = state.pending.pop_front() {
                    return Some((item, state));
                }
                if state.done {
                    return None;
                }

                match state.body.next().await {
                    Some(Ok(bytes)) => {
                        for event in state.decoder.push(&bytes) {
                            match event {
                                SseEvent::Data(data) => {
                                    state.pending.extend(completion_chunks(&data).into_iter().map(Ok));
                                }
                                SseEvent::Done => {
                                    state.done = true;
                                    break;
                                }
                            }
                        }
                    }
                    Some(Err(e)) => {
                        state.done = true;
                        state.pending.push_back(Err(llm_error(format!("stream failed: {}", e))));
                    }
                    None => state.done = true,
                }
            }
        });

        Ok(deltas.boxed())
    }
}
