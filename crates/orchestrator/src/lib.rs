//! Turn Orchestrator, Pause-Aware Synthesizer Driver, and Keep-Alive
//! Scheduler
//!
//! This crate wires the mechanical pipeline components (`voice-agent-pipeline`)
//! to the external service clients (`voice-agent-transport`) into the
//! single-session control flow described by the data model in
//! `voice-agent-core`. Nothing here touches a real microphone, speaker, or
//! network socket directly — those live one layer down.

pub mod keep_alive;
pub mod session;
pub mod synthesizer;
pub mod turn_orchestrator;
pub mod vad_handle;

pub use keep_alive::{DefaultProactiveMessageSource, KeepAliveScheduler, ProactiveMessageSource};
pub use session::Session;
pub use synthesizer::SynthesizerDriver;
pub use turn_orchestrator::{TurnOrchestrator, UiSignals};
pub use vad_handle::VadHandle;

use voice_agent_core::FailureKind;

/// Errors raised by the orchestration layer itself, as opposed to its
/// collaborators (ASR/Generator/TTS report through [`voice_agent_transport::TransportError`],
/// the pipeline through [`voice_agent_pipeline::PipelineError`]).
#[derive(Debug, thiserror::Error)]
pub enum OrchestratorError {
    #[error("session service error: {0}")]
    Session(String),
}

impl voice_agent_core::Classify for OrchestratorError {
    fn kind(&self) -> FailureKind {
        match self {
            // Failing to mint credentials in the first place is not a
            // bad-credentials report — see the identical distinction in
            // `voice_agent_transport::TransportError`.
            OrchestratorError::Session(_) => FailureKind::SessionUnavailable,
        }
    }
}
