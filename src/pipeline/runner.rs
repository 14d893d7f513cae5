//! # Stage Runner
//!
//! Executes a fixed sequence of stages, one tokio task per stage, joined by
//! bounded FIFO channels. Every task watches the same cancellation token.
//!
//! ## Termination:
//! - an `End` frame travels through every stage, each one flushes and exits
//!   → `Completed`
//! - the token is cancelled from outside (disconnect) → `Cancelled`
//! - a stage returns an error → the token is cancelled for everyone else
//!   → `Failed(reason)`
//!
//! A wire write failure is treated like a disconnect and reported as
//! `Cancelled`.

use crate::error::{BridgeError, BridgeResult};
use crate::pipeline::frame::Frame;
use async_trait::async_trait;
use tokio::sync::mpsc;
use tokio::task::JoinSet;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, Instrument};

/// Terminal state of a pipeline run.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Outcome {
    Completed,
    Cancelled,
    Failed(String),
}

impl Outcome {
    pub fn as_str(&self) -> &'static str {
        match self {
            Outcome::Completed => "completed",
            Outcome::Cancelled => "cancelled",
            Outcome::Failed(_) => "failed",
        }
    }
}

/// Sending half handed to a stage. The last stage has nowhere to send and
/// its pushes are dropped.
pub struct Downstream {
    tx: Option<mpsc::Sender<Frame>>,
}

impl Downstream {
    /// A downstream that drops everything, as seen by the last stage.
    pub fn detached() -> Self {
        Self { tx: None }
    }

    pub async fn push(&self, frame: Frame) -> BridgeResult<()> {
        match &self.tx {
            Some(tx) => tx
                .send(frame)
                .await
                .map_err(|_| BridgeError::Transport("downstream stage is gone".to_string())),
            None => Ok(()),
        }
    }
}

/// One step of the session pipeline.
///
/// `process` sees every frame except `End`, which the runner handles itself.
/// Frames a stage does not care about must be pushed on unchanged.
#[async_trait]
pub trait Stage: Send {
    fn name(&self) -> &'static str;

    async fn process(&mut self, frame: Frame, out: &Downstream) -> BridgeResult<()>;

    /// Called once when the stage stops, whatever the reason.
    async fn finish(&mut self) {}
}

enum StageExit {
    Completed,
    Cancelled,
    Failed(String),
}

pub struct Pipeline {
    stages: Vec<Box<dyn Stage>>,
    head: mpsc::Receiver<Frame>,
    capacity: usize,
    cancel: CancellationToken,
}

impl Pipeline {
    /// Build a pipeline and return the sender feeding its first stage.
    pub fn new(
        stages: Vec<Box<dyn Stage>>,
        capacity: usize,
        cancel: CancellationToken,
    ) -> (Self, mpsc::Sender<Frame>) {
        let (tx, head) = mpsc::channel(capacity.max(1));
        (
            Self {
                stages,
                head,
                capacity: capacity.max(1),
                cancel,
            },
            tx,
        )
    }

    pub async fn run(self) -> Outcome {
        let Pipeline {
            stages,
            head,
            capacity,
            cancel,
        } = self;

        let mut tasks = JoinSet::new();
        let mut input = head;
        let mut stages = stages.into_iter().peekable();

        while let Some(stage) = stages.next() {
            let (downstream, next_input) = if stages.peek().is_some() {
                let (tx, rx) = mpsc::channel(capacity);
                (Downstream { tx: Some(tx) }, Some(rx))
            } else {
                (Downstream::detached(), None)
            };

            tasks.spawn(run_stage(stage, input, downstream, cancel.clone()).in_current_span());

            match next_input {
                Some(rx) => input = rx,
                None => break,
            }
        }

        let mut failure = None;
        let mut cancelled = false;

        while let Some(joined) = tasks.join_next().await {
            match joined {
                Ok(StageExit::Completed) => {}
                Ok(StageExit::Cancelled) => cancelled = true,
                Ok(StageExit::Failed(reason)) => {
                    failure.get_or_insert(reason);
                }
                Err(e) => {
                    error!("Pipeline stage task aborted: {}", e);
                    cancel.cancel();
                    failure.get_or_insert(format!("stage task aborted: {}", e));
                }
            }
        }

        let outcome = match failure {
            Some(reason) => Outcome::Failed(reason),
            None if cancelled => Outcome::Cancelled,
            None => Outcome::Completed,
        };

        info!(outcome = outcome.as_str(), "pipeline finished");
        outcome
    }
}

async fn run_stage(
    mut stage: Box<dyn Stage>,
    mut input: mpsc::Receiver<Frame>,
    out: Downstream,
    cancel: CancellationToken,
) -> StageExit {
    let name = stage.name();

    let exit = loop {
        let frame = tokio::select! {
            biased;
            _ = cancel.cancelled() => break StageExit::Cancelled,
            frame = input.recv() => frame,
        };

        let frame = match frame {
            Some(Frame::End) => {
                stage.finish().await;
                // Failure here only means the next stage already stopped.
                let _ = out.push(Frame::End).await;
                debug!(stage = name, "stage completed");
                return StageExit::Completed;
            }
            Some(frame) => frame,
            None => break StageExit::Completed,
        };

        let result = tokio::select! {
            biased;
            _ = cancel.cancelled() => break StageExit::Cancelled,
            result = stage.process(frame, &out) => result,
        };

        match result {
            Ok(()) => {}
            Err(BridgeError::Transport(reason)) => {
                if !cancel.is_cancelled() {
                    info!(stage = name, %reason, "wire closed, cancelling session");
                    cancel.cancel();
                }
                break StageExit::Cancelled;
            }
            Err(e) => {
                error!(stage = name, error = %e, "stage failed, cancelling session");
                cancel.cancel();
                break StageExit::Failed(format!("{}: {}", name, e));
            }
        }
    };

    stage.finish().await;
    debug!(stage = name, "stage stopped");
    exit
}
