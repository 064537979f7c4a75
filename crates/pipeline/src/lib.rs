//! Real-time audio pipeline components
//!
//! Each component here owns exactly one piece of session state and nothing
//! else (Design Notes, "Ownership"):
//! - [`vad`] — the Voice Activity Detector, sole owner of the microphone
//!   stream.
//! - [`capture_queue`] — the bounded, coalescing queue handing captured
//!   blobs from the VAD to the Orchestrator.
//! - [`turn_registry`] — the monotonic turn counter and current-turn id.
//! - [`playback`] — the Playback Controller, sole owner of the audio output
//!   device while a segment plays.

pub mod capture_queue;
pub mod playback;
pub mod turn_registry;
pub mod vad;

pub use capture_queue::{CaptureQueue, CapturedBlob};
pub use playback::{AudioSink, PlaybackController, PlaybackHandle};
pub use turn_registry::{KeepAliveGuard, TurnRegistry};
pub use vad::{AudioSource, HysteresisVad, VadEvent, VadState, VoiceActivityDetector};

use voice_agent_core::FailureKind;

#[derive(Debug, thiserror::Error)]
pub enum PipelineError {
    #[error("audio device error: {0}")]
    Device(String),

    #[error("audio device is busy")]
    DeviceBusy,

    #[error("operation not supported: {0}")]
    NotSupported(String),

    #[error("playback error: {0}")]
    Playback(String),
}

impl voice_agent_core::Classify for PipelineError {
    fn kind(&self) -> FailureKind {
        match self {
            PipelineError::Device(_) => FailureKind::PermissionDenied,
            PipelineError::DeviceBusy => FailureKind::DeviceBusy,
            PipelineError::NotSupported(_) => FailureKind::NotSupported,
            PipelineError::Playback(_) => FailureKind::PlaybackFailed,
        }
    }
}
