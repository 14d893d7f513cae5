//! Frames exchanged between pipeline stages.

use crate::audio::AudioUnit;
use crate::pipeline::context::ChatMessage;

/// Everything that flows downstream through a session's stage sequence.
#[derive(Debug, Clone, PartialEq)]
pub enum Frame {
    /// Caller audio decoded from the wire
    InputAudio(AudioUnit),
    /// Synthesized bot audio headed for the wire
    OutputAudio(AudioUnit),
    UserStartedSpeaking,
    UserStoppedSpeaking,
    /// Final transcript of one caller utterance
    Transcription(String),
    /// Run the dialogue now, addressing `greeting` to the caller
    LlmRun { greeting: String },
    /// Generation request carrying a context snapshot
    LlmMessages(Vec<ChatMessage>),
    LlmResponseStart,
    LlmText(String),
    LlmResponseEnd,
    /// Text whose audio has already been pushed downstream
    SpokenText(String),
    End,
}
