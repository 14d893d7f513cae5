//! # Context Aggregators
//!
//! The only two stages allowed to mutate the dialogue context.
//!
//! - **User aggregator** (before generation): turns finished transcripts
//!   into a user turn and asks for a new completion. It also answers the
//!   run-dialogue trigger, adding the greeting instruction to that one
//!   request only.
//! - **Assistant aggregator** (last stage): collects the text the bot has
//!   actually spoken and stores it as the assistant turn when the response
//!   ends.

use crate::error::BridgeResult;
use crate::pipeline::context::{ChatMessage, DialogueContext};
use crate::pipeline::frame::Frame;
use crate::pipeline::runner::{Downstream, Stage};
use async_trait::async_trait;
use tracing::debug;

pub struct UserAggregator {
    context: DialogueContext,
    pending: Vec<String>,
}

impl UserAggregator {
    pub fn new(context: DialogueContext) -> Self {
        Self {
            context,
            pending: Vec::new(),
        }
    }
}

/// Transient instruction asking the model to open the conversation.
pub fn greeting_instruction(greeting: &str) -> ChatMessage {
    ChatMessage::system(format!(
        "Start the conversation by greeting the user with: \"{}\"",
        greeting
    ))
}

#[async_trait]
impl Stage for UserAggregator {
    fn name(&self) -> &'static str {
        "user_aggregator"
    }

    async fn process(&mut self, frame: Frame, out: &Downstream) -> BridgeResult<()> {
        match frame {
            Frame::Transcription(text) => {
                self.pending.push(text);
                Ok(())
            }
            Frame::UserStoppedSpeaking => {
                out.push(Frame::UserStoppedSpeaking).await?;

                if self.pending.is_empty() {
                    return Ok(());
                }

                let text = self.pending.drain(..).collect::<Vec<_>>().join(" ");
                debug!(chars = text.len(), "user turn appended");
                self.context.append(ChatMessage::user(text));
                out.push(Frame::LlmMessages(self.context.snapshot())).await
            }
            Frame::LlmRun { greeting } => {
                let mut messages = self.context.snapshot();
                messages.push(greeting_instruction(&greeting));
                out.push(Frame::LlmMessages(messages)).await
            }
            other => out.push(other).await,
        }
    }
}

pub struct AssistantAggregator {
    context: DialogueContext,
    spoken: Vec<String>,
}

impl AssistantAggregator {
    pub fn new(context: DialogueContext) -> Self {
        Self {
            context,
            spoken: Vec::new(),
        }
    }

    fn flush(&mut self) {
        if self.spoken.is_empty() {
            return;
        }

        let text = self.spoken.drain(..).collect::<Vec<_>>().join(" ");
        debug!(chars = text.len(), "assistant turn appended");
        self.context.append(ChatMessage::assistant(text));
    }
}

#[async_trait]
impl Stage for AssistantAggregator {
    fn name(&self) -> &'static str {
        "assistant_aggregator"
    }

    async fn process(&mut self, frame: Frame, out: &Downstream) -> BridgeResult<()> {
        match frame {
            Frame::LlmResponseStart => {
                self.spoken.clear();
                Ok(())
            }
            Frame::SpokenText(text) => {
                self.spoken.push(text);
                Ok(())
            }
            Frame::LlmResponseEnd => {
                self.flush();
                Ok(())
            }
            other => out.push(other).await,
        }
    }

    /// A response cut short still keeps what the caller already heard.
    async fn finish(&mut self) {
        self.flush();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::pipeline::context::Role;
    use crate::pipeline::runner::Pipeline;
    use tokio_util::sync::CancellationToken;

    fn boxed(stage: impl Stage + 'static) -> Box<dyn Stage> {
        Box::new(stage)
    }

    #[tokio::test]
    async fn test_greeting_instruction_is_not_stored() {
        let context = DialogueContext::new("prompt");
        let (pipeline, head) = Pipeline::new(
            vec![boxed(UserAggregator::new(context.clone()))],
            4,
            CancellationToken::new(),
        );
        let run = tokio::spawn(pipeline.run());

        head.send(Frame::LlmRun {
            greeting: "Hi!".to_string(),
        })
        .await
        .unwrap();
        head.send(Frame::End).await.unwrap();
        run.await.unwrap();

        assert_eq!(context.snapshot(), vec![ChatMessage::system("prompt")]);
    }

    #[tokio::test]
    async fn test_transcripts_become_one_user_turn() {
        let context = DialogueContext::new("prompt");
        let (tx, mut rx) = tokio::sync::mpsc::channel(8);
        let (pipeline, head) = Pipeline::new(
            vec![
                boxed(UserAggregator::new(context.clone())),
                boxed(Forward(tx)),
            ],
            8,
            CancellationToken::new(),
        );
        let run = tokio::spawn(pipeline.run());

        head.send(Frame::Transcription("hello".to_string())).await.unwrap();
        head.send(Frame::Transcription("there".to_string())).await.unwrap();
        head.send(Frame::UserStoppedSpeaking).await.unwrap();
        head.send(Frame::UserStoppedSpeaking).await.unwrap();
        head.send(Frame::End).await.unwrap();
        run.await.unwrap();

        let turns = context.snapshot();
        assert_eq!(turns.len(), 2);
        assert_eq!(turns[1], ChatMessage::user("hello there"));

        let mut requests = 0;
        while let Ok(frame) = rx.try_recv() {
            if let Frame::LlmMessages(messages) = frame {
                requests += 1;
                assert_eq!(messages.last().map(|m| m.role), Some(Role::User));
            }
        }
        assert_eq!(requests, 1);
    }

    #[tokio::test]
    async fn test_partial_response_is_flushed_on_finish() {
        let context = DialogueContext::new("prompt");
        let (pipeline, head) = Pipeline::new(
            vec![boxed(AssistantAggregator::new(context.clone()))],
            4,
            CancellationToken::new(),
        );
        let run = tokio::spawn(pipeline.run());

        head.send(Frame::LlmResponseStart).await.unwrap();
        head.send(Frame::SpokenText("Hello.".to_string())).await.unwrap();
        head.send(Frame::End).await.unwrap();
        run.await.unwrap();

        assert_eq!(context.snapshot()[1], ChatMessage::assistant("Hello."));
    }

    struct Forward(tokio::sync::mpsc::Sender<Frame>);

    #[async_trait]
    impl Stage for Forward {
        fn name(&self) -> &'static str {
            "forward"
        }

        async fn process(&mut self, frame: Frame, _out: &Downstream) -> BridgeResult<()> {
            let _ = self.0.send(frame).await;
            Ok(())
        }
    }
}
