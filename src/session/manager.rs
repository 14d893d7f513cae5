//! # Duplex Session Manager
//!
//! Runs one session as two supervised units:
//!
//! - **read loop**: waits for the next wire frame with a bounded timeout,
//!   classifies it and feeds caller audio to the pipeline. On every timeout
//!   it checks whether the pipeline has already finished.
//! - **pipeline**: the assembled stage sequence.
//!
//! Whichever unit finishes first ends the session. The other is stopped
//! cooperatively and awaited, its errors are logged and swallowed, and only
//! then is the wire closed, exactly once.

use crate::pipeline::{Outcome, PipelineController, PipelineHandle, SessionCounters, UsageReport};
use crate::session::transport::{WireReceiver, WireSender};
use crate::wire::{self, Inbound};
use std::sync::atomic::Ordering;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::task::JoinError;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, info_span, trace, Instrument};

/// Summary of a finished session.
#[derive(Debug, Clone)]
pub struct SessionReport {
    pub session_id: String,
    pub outcome: Outcome,
    pub frames_in: u64,
    pub frames_out: u64,
    pub duration_ms: u64,
    pub usage: UsageReport,
}

#[derive(Debug, PartialEq, Eq)]
enum ReadExit {
    /// The peer went away
    Disconnected,
    /// The pipeline finished while the loop was waiting
    PipelineFinished,
    /// The session asked the loop to stop
    Stopped,
}

/// Run a session to its end. Never fails: every error is logged and folded
/// into the report's outcome.
pub async fn run_session(
    handle: PipelineHandle,
    receiver: Box<dyn WireReceiver>,
    sender: Arc<dyn WireSender>,
    read_timeout: Duration,
) -> SessionReport {
    let session_id = handle.session_id().to_string();
    let span = info_span!("session", session_id = %session_id);

    async move {
        let started = Instant::now();
        let controller = handle.controller();
        let counters = handle.counters();

        controller.on_connected().await;

        let pipeline_done = CancellationToken::new();
        let done = pipeline_done.clone();
        let mut pipeline_task = tokio::spawn(
            async move {
                let outcome = handle.run().await;
                done.cancel();
                outcome
            }
            .in_current_span(),
        );

        let stop_reading = CancellationToken::new();
        let mut read_task = tokio::spawn(
            read_loop(
                receiver,
                controller.clone(),
                counters.clone(),
                read_timeout,
                pipeline_done,
                stop_reading.clone(),
            )
            .in_current_span(),
        );

        let outcome = tokio::select! {
            joined = &mut pipeline_task => {
                stop_reading.cancel();
                if let Err(e) = (&mut read_task).await {
                    error!("Read loop aborted: {}", e);
                }
                pipeline_outcome(joined)
            }
            joined = &mut read_task => {
                match joined {
                    Ok(ReadExit::Disconnected) => {
                        controller.on_disconnected();
                    }
                    Ok(exit) => debug!(?exit, "read loop finished"),
                    Err(e) => {
                        error!("Read loop aborted: {}", e);
                        controller.on_disconnected();
                    }
                }
                pipeline_outcome((&mut pipeline_task).await)
            }
        };

        sender.close().await;

        let report = SessionReport {
            session_id: session_id.clone(),
            outcome,
            frames_in: counters.frames_in.load(Ordering::Relaxed),
            frames_out: counters.frames_out.load(Ordering::Relaxed),
            duration_ms: started.elapsed().as_millis() as u64,
            usage: counters.usage(),
        };

        match &report.outcome {
            Outcome::Failed(reason) => error!(
                outcome = report.outcome.as_str(),
                %reason,
                frames_in = report.frames_in,
                frames_out = report.frames_out,
                "Session ended"
            ),
            _ => info!(
                outcome = report.outcome.as_str(),
                frames_in = report.frames_in,
                frames_out = report.frames_out,
                duration_ms = report.duration_ms,
                "Session ended"
            ),
        }
        info!(
            prompt_tokens = report.usage.prompt_tokens,
            completion_tokens = report.usage.completion_tokens,
            tts_characters = report.usage.tts_characters,
            llm_ttfb_ms = ?report.usage.average_llm_ttfb_ms(),
            tts_ttfb_ms = ?report.usage.average_tts_ttfb_ms(),
            "Session usage"
        );

        report
    }
    .instrument(span)
    .await
}

fn pipeline_outcome(joined: Result<Outcome, JoinError>) -> Outcome {
    joined.unwrap_or_else(|e| {
        error!("Pipeline task aborted: {}", e);
        Outcome::Failed(format!("pipeline task aborted: {}", e))
    })
}

async fn read_loop(
    mut receiver: Box<dyn WireReceiver>,
    controller: PipelineController,
    counters: Arc<SessionCounters>,
    read_timeout: Duration,
    pipeline_done: CancellationToken,
    stop: CancellationToken,
) -> ReadExit {
    loop {
        let next = tokio::select! {
            biased;
            _ = stop.cancelled() => return ReadExit::Stopped,
            next = tokio::time::timeout(read_timeout, receiver.recv()) => next,
        };

        let frame = match next {
            Err(_) => {
                if pipeline_done.is_cancelled() {
                    return ReadExit::PipelineFinished;
                }
                continue;
            }
            Ok(None) => return ReadExit::Disconnected,
            Ok(Some(frame)) => frame,
        };

        match wire::classify(&frame) {
            Inbound::Audio(unit) => {
                counters.frames_in.fetch_add(1, Ordering::Relaxed);
                if let Err(e) = controller.push_audio(unit).await {
                    debug!(error = %e, "pipeline stopped accepting audio");
                    return ReadExit::PipelineFinished;
                }
            }
            Inbound::Config(data) => {
                info!(config = %data, "Configuration message received, no effect mid-session");
            }
            Inbound::Ignored => trace!("ignoring wire message"),
        }
    }
}
