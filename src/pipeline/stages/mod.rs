//! The stages of a voice session, in pipeline order:
//!
//! ingress → stt → user aggregator → llm → tts → egress → audio capture →
//! assistant aggregator

pub mod aggregators;
pub mod capture;
pub mod egress;
pub mod generation;
pub mod ingress;
pub mod synthesis;
pub mod transcription;

pub use aggregators::{AssistantAggregator, UserAggregator};
pub use capture::CaptureStage;
pub use egress::EgressStage;
pub use generation::GenerationStage;
pub use ingress::IngressStage;
pub use synthesis::SynthesisStage;
pub use transcription::TranscriptionStage;
