//! Audio capture tap. Hands both audio directions to the recording sink and
//! lets everything through untouched. Sink failures are logged and ignored.

use crate::audio::capture::RecordingSink;
use crate::error::BridgeResult;
use crate::pipeline::frame::Frame;
use crate::pipeline::runner::{Downstream, Stage};
use async_trait::async_trait;
use tracing::warn;

pub struct CaptureStage {
    sink: Box<dyn RecordingSink>,
    failed: bool,
}

impl CaptureStage {
    pub fn new(sink: Box<dyn RecordingSink>) -> Self {
        Self {
            sink,
            failed: false,
        }
    }
}

#[async_trait]
impl Stage for CaptureStage {
    fn name(&self) -> &'static str {
        "audio_capture"
    }

    async fn process(&mut self, frame: Frame, out: &Downstream) -> BridgeResult<()> {
        if let Frame::InputAudio(unit) | Frame::OutputAudio(unit) = &frame {
            if let Err(e) = self.sink.record(unit) {
                // Warn once per session, not once per frame.
                if !self.failed {
                    warn!("Recording sink failed, audio capture disabled: {}", e);
                    self.failed = true;
                }
            }
        }

        out.push(frame).await
    }

    async fn finish(&mut self) {
        if let Err(e) = self.sink.finish() {
            warn!("Failed to write session recording: {}", e);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::audio::AudioUnit;
    use std::io;
    use std::path::PathBuf;
    use std::sync::{Arc, Mutex};

    struct BrokenSink {
        finished: Arc<Mutex<bool>>,
    }

    impl RecordingSink for BrokenSink {
        fn record(&mut self, _unit: &AudioUnit) -> io::Result<()> {
            Err(io::Error::new(io::ErrorKind::Other, "disk full"))
        }

        fn finish(&mut self) -> io::Result<Option<PathBuf>> {
            *self.finished.lock().unwrap() = true;
            Err(io::Error::new(io::ErrorKind::Other, "disk full"))
        }
    }

    #[tokio::test]
    async fn test_sink_failure_does_not_stop_the_frame_flow() {
        let finished = Arc::new(Mutex::new(false));
        let mut stage = CaptureStage::new(Box::new(BrokenSink {
            finished: finished.clone(),
        }));
        let out = Downstream::detached();

        let frame = Frame::InputAudio(AudioUnit::inbound(vec![0u8; 640], 16000));
        assert!(stage.process(frame.clone(), &out).await.is_ok());
        assert!(stage.process(frame, &out).await.is_ok());

        stage.finish().await;
        assert!(*finished.lock().unwrap());
    }
}
