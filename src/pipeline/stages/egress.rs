//! Egress: the only writer of the wire. Bot audio is serialized and sent;
//! every frame continues downstream so the capture tap sees both directions.

use crate::error::BridgeResult;
use crate::pipeline::frame::Frame;
use crate::pipeline::runner::{Downstream, Stage};
use crate::pipeline::SessionCounters;
use crate::session::transport::WireSender;
use crate::wire;
use async_trait::async_trait;
use std::sync::atomic::Ordering;
use std::sync::Arc;

pub struct EgressStage {
    sender: Arc<dyn WireSender>,
    counters: Arc<SessionCounters>,
}

impl EgressStage {
    pub fn new(sender: Arc<dyn WireSender>, counters: Arc<SessionCounters>) -> Self {
        Self { sender, counters }
    }
}

#[async_trait]
impl Stage for EgressStage {
    fn name(&self) -> &'static str {
        "egress"
    }

    async fn process(&mut self, frame: Frame, out: &Downstream) -> BridgeResult<()> {
        if let Frame::OutputAudio(unit) = &frame {
            if let Some(message) = wire::serialize(unit) {
                self.sender.send(message).await?;
                self.counters.frames_out.fetch_add(1, Ordering::Relaxed);
            }
        }

        out.push(frame).await
    }
}
