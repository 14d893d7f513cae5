//! # Session Orchestrator
//!
//! Builds the stage sequence of one session and exposes its lifecycle.
//!
//! ## Lifecycle:
//! 1. [`assemble`] checks credentials and wires the stages. It runs before
//!    the websocket handshake, so a missing key never accepts wire traffic.
//! 2. [`PipelineController::on_connected`] queues the run-dialogue trigger
//!    exactly once, which makes the bot speak the greeting.
//! 3. [`PipelineController::on_disconnected`] cancels the session exactly
//!    once. Anything after that is a no-op.

use crate::audio::AudioUnit;
use crate::config::AppConfig;
use crate::error::{BridgeError, BridgeResult};
use crate::pipeline::context::DialogueContext;
use crate::pipeline::frame::Frame;
use crate::pipeline::runner::{Outcome, Pipeline, Stage};
use crate::pipeline::stages::{
    AssistantAggregator, CaptureStage, EgressStage, GenerationStage, IngressStage, SynthesisStage,
    TranscriptionStage, UserAggregator,
};
use crate::pipeline::{SessionConfig, SessionCounters};
use crate::services::CapabilityFactory;
use crate::session::transport::WireSender;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

/// An assembled, not yet running session pipeline.
pub struct PipelineHandle {
    session_id: String,
    pipeline: Pipeline,
    controller: PipelineController,
    context: DialogueContext,
    counters: Arc<SessionCounters>,
}

impl PipelineHandle {
    pub fn session_id(&self) -> &str {
        &self.session_id
    }

    pub fn controller(&self) -> PipelineController {
        self.controller.clone()
    }

    pub fn context(&self) -> DialogueContext {
        self.context.clone()
    }

    pub fn counters(&self) -> Arc<SessionCounters> {
        self.counters.clone()
    }

    /// Drive the stages until completion, cancellation or failure.
    pub async fn run(self) -> Outcome {
        self.pipeline.run().await
    }
}

/// Lifecycle and input handle of a running pipeline. Cheap to clone.
#[derive(Clone)]
pub struct PipelineController {
    head: mpsc::Sender<Frame>,
    cancel: CancellationToken,
    greeting: String,
    connected: Arc<AtomicBool>,
    disconnected: Arc<AtomicBool>,
}

impl PipelineController {
    /// Queue the greeting. Only the first call before a disconnect has any
    /// effect; returns whether this call was it.
    pub async fn on_connected(&self) -> bool {
        if self.disconnected.load(Ordering::SeqCst) {
            warn!("connect signalled after disconnect, ignoring");
            return false;
        }
        if self.connected.swap(true, Ordering::SeqCst) {
            return false;
        }

        info!("Client connected, queueing greeting");
        let trigger = Frame::LlmRun {
            greeting: self.greeting.clone(),
        };
        if self.head.send(trigger).await.is_err() {
            warn!("pipeline stopped before the greeting could be queued");
        }
        true
    }

    /// Cancel the session. Returns whether this call did it.
    pub fn on_disconnected(&self) -> bool {
        if self.disconnected.swap(true, Ordering::SeqCst) {
            return false;
        }

        info!("Client disconnected, cancelling pipeline");
        self.cancel.cancel();
        true
    }

    /// Feed caller audio into the ingress stage, in arrival order.
    pub async fn push_audio(&self, unit: AudioUnit) -> BridgeResult<()> {
        self.head
            .send(Frame::InputAudio(unit))
            .await
            .map_err(|_| BridgeError::Transport("pipeline is no longer running".to_string()))
    }

    /// Ask the pipeline to drain and complete.
    pub async fn end(&self) {
        let _ = self.head.send(Frame::End).await;
    }

    pub fn is_connected(&self) -> bool {
        self.connected.load(Ordering::SeqCst)
    }

    pub fn is_cancelled(&self) -> bool {
        self.cancel.is_cancelled()
    }
}

/// Assemble the stage sequence of one session.
///
/// Fails with `BridgeError::Configuration` when a required credential is
/// missing.
pub fn assemble(
    config: SessionConfig,
    session_id: &str,
    factory: &dyn CapabilityFactory,
    sender: Arc<dyn WireSender>,
    app: &AppConfig,
) -> BridgeResult<PipelineHandle> {
    let capabilities = factory.build(session_id, &config)?;

    let context = DialogueContext::new(config.system_prompt.clone());
    let counters = Arc::new(SessionCounters::default());
    let cancel = CancellationToken::new();
    let sample_rate = app.audio.sample_rate;

    let mut stages: Vec<Box<dyn Stage>> = vec![
        Box::new(IngressStage::new(capabilities.vad)),
        Box::new(TranscriptionStage::new(capabilities.stt, sample_rate)),
        Box::new(UserAggregator::new(context.clone())),
        Box::new(GenerationStage::new(
            capabilities.llm,
            config.generation_model.clone(),
            counters.clone(),
        )),
        Box::new(SynthesisStage::new(
            capabilities.tts,
            config.voice.clone(),
            sample_rate,
            app.chunk_bytes(),
            counters.clone(),
        )),
        Box::new(EgressStage::new(sender, counters.clone())),
    ];
    if let Some(recorder) = capabilities.recorder {
        stages.push(Box::new(CaptureStage::new(recorder)));
    }
    stages.push(Box::new(AssistantAggregator::new(context.clone())));

    let (pipeline, head) = Pipeline::new(stages, app.session.channel_capacity, cancel.clone());

    info!(
        session_id,
        model = %config.generation_model,
        voice = %config.voice,
        "Pipeline assembled"
    );

    Ok(PipelineHandle {
        session_id: session_id.to_string(),
        pipeline,
        controller: PipelineController {
            head,
            cancel,
            greeting: config.greeting,
            connected: Arc::new(AtomicBool::new(false)),
            disconnected: Arc::new(AtomicBool::new(false)),
        },
        context,
        counters,
    })
}
