//! # Session Pipeline
//!
//! One pipeline per wire connection. The orchestrator assembles the stages
//! from a [`SessionConfig`], the runner executes them, and the controller is
//! the handle the session manager uses to drive the lifecycle.
//!
//! ## Components:
//! - **frame**: the closed set of frames flowing between stages
//! - **context**: the dialogue turn history
//! - **runner**: stage tasks, channels and cancellation
//! - **stages**: the concrete stages
//! - **orchestrator**: assembly and lifecycle callbacks

pub mod context;
pub mod frame;
pub mod orchestrator;
pub mod runner;
pub mod stages;

use crate::config::AgentDefaults;
use crate::services::TokenUsage;
use serde::{Deserialize, Serialize};
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

pub use orchestrator::{assemble, PipelineController, PipelineHandle};
pub use runner::Outcome;

/// Persona of one session. Fixed once the session starts.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SessionConfig {
    pub system_prompt: String,
    pub greeting: String,
    pub generation_model: String,
    /// Text-to-speech voice identifier
    pub voice: String,
}

impl SessionConfig {
    pub fn from_defaults(agent: &AgentDefaults) -> Self {
        Self {
            system_prompt: agent.prompt.clone(),
            greeting: agent.greeting.clone(),
            generation_model: agent.generation_model.clone(),
            voice: agent.voice.clone(),
        }
    }
}

/// Counters of one session, shared between the read loop and the stages.
#[derive(Debug, Default)]
pub struct SessionCounters {
    pub frames_in: AtomicU64,
    pub frames_out: AtomicU64,
    prompt_tokens: AtomicU64,
    completion_tokens: AtomicU64,
    tts_characters: AtomicU64,
    llm_ttfb_ms: AtomicU64,
    llm_ttfb_samples: AtomicU64,
    tts_ttfb_ms: AtomicU64,
    tts_ttfb_samples: AtomicU64,
}

impl SessionCounters {
    /// Time from a generation request to its first text delta.
    pub fn record_llm_ttfb(&self, elapsed: Duration) {
        self.llm_ttfb_ms.fetch_add(elapsed.as_millis() as u64, Ordering::Relaxed);
        self.llm_ttfb_samples.fetch_add(1, Ordering::Relaxed);
    }

    /// Time from a synthesis request to its first audio bytes.
    pub fn record_tts_ttfb(&self, elapsed: Duration) {
        self.tts_ttfb_ms.fetch_add(elapsed.as_millis() as u64, Ordering::Relaxed);
        self.tts_ttfb_samples.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_tokens(&self, usage: &TokenUsage) {
        self.prompt_tokens.fetch_add(usage.prompt_tokens, Ordering::Relaxed);
        self.completion_tokens.fetch_add(usage.completion_tokens, Ordering::Relaxed);
    }

    pub fn record_tts_characters(&self, characters: usize) {
        self.tts_characters.fetch_add(characters as u64, Ordering::Relaxed);
    }

    pub fn usage(&self) -> UsageReport {
        UsageReport {
            prompt_tokens: self.prompt_tokens.load(Ordering::Relaxed),
            completion_tokens: self.completion_tokens.load(Ordering::Relaxed),
            tts_characters: self.tts_characters.load(Ordering::Relaxed),
            llm_ttfb_ms_total: self.llm_ttfb_ms.load(Ordering::Relaxed),
            llm_ttfb_samples: self.llm_ttfb_samples.load(Ordering::Relaxed),
            tts_ttfb_ms_total: self.tts_ttfb_ms.load(Ordering::Relaxed),
            tts_ttfb_samples: self.tts_ttfb_samples.load(Ordering::Relaxed),
        }
    }
}

/// Provider usage and latency figures of one or more sessions.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct UsageReport {
    pub prompt_tokens: u64,
    pub completion_tokens: u64,
    pub tts_characters: u64,
    pub llm_ttfb_ms_total: u64,
    pub llm_ttfb_samples: u64,
    pub tts_ttfb_ms_total: u64,
    pub tts_ttfb_samples: u64,
}

impl UsageReport {
    pub fn average_llm_ttfb_ms(&self) -> Option<u64> {
        (self.llm_ttfb_samples > 0).then(|| self.llm_ttfb_ms_total / self.llm_ttfb_samples)
    }

    pub fn average_tts_ttfb_ms(&self) -> Option<u64> {
        (self.tts_ttfb_samples > 0).then(|| self.tts_ttfb_ms_total / self.tts_ttfb_samples)
    }

    pub fn accumulate(&mut self, other: &UsageReport) {
        self.prompt_tokens += other.prompt_tokens;
        self.completion_tokens += other.completion_tokens;
        self.tts_characters += other.tts_characters;
        self.llm_ttfb_ms_total += other.llm_ttfb_ms_total;
        self.llm_ttfb_samples += other.llm_ttfb_samples;
        self.tts_ttfb_ms_total += other.tts_ttfb_ms_total;
        self.tts_ttfb_samples += other.tts_ttfb_samples;
    }
}
