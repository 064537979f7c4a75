//! Shared error taxonomy
//!
//! Every crate-specific error type classifies itself into one of these kinds so
//! that the Orchestrator can decide on recovery without depending on
//! crate-specific error variants, and so that user-facing messages never leak
//! internal details (service names, status codes, stack traces).

use serde::{Deserialize, Serialize};
use std::fmt;

/// The behavioral error taxonomy shared across the whole runtime.
///
/// `Invalidated` is not really an error — it is the expected outcome of a
/// barge-in or stale-turn race — and must never be surfaced to the user.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FailureKind {
    /// VAD could not acquire the microphone.
    PermissionDenied,
    /// VAD's audio device is already in use.
    DeviceBusy,
    /// VAD's audio device/codec is not supported on this platform.
    NotSupported,
    /// ASR request failed or timed out.
    TranscriptionFailed,
    /// Generator request failed or timed out.
    GenerationFailed,
    /// TTS request failed after retry exhaustion.
    SynthesisFailed,
    /// Output device failed during playback.
    PlaybackFailed,
    /// A service reported invalid/expired session credentials.
    SessionExpired,
    /// The Session Service itself could not be reached, or returned an
    /// error unrelated to credentials (e.g. a timeout or a 5xx). Distinct
    /// from `SessionExpired`, which is reserved for a genuine bad-credentials
    /// report — this is a transient collaborator failure, not a reason to
    /// tear the session down.
    SessionUnavailable,
    /// Expected outcome of a barge-in or stale-turn race. Never user-visible.
    Invalidated,
}

impl FailureKind {
    /// Whether this kind should tear down the whole session.
    pub fn is_fatal(&self) -> bool {
        matches!(self, FailureKind::SessionExpired)
    }

    /// Whether this kind is a normal, expected outcome rather than a failure.
    pub fn is_silent(&self) -> bool {
        matches!(self, FailureKind::Invalidated)
    }

    /// The one-line, internals-free message shown in the transcript channel
    /// for this failure kind, or `None` if this kind is never user-visible.
    pub fn user_message(&self) -> Option<&'static str> {
        match self {
            FailureKind::PermissionDenied => {
                Some("I can't hear you — microphone access seems to be blocked.")
            }
            FailureKind::DeviceBusy | FailureKind::NotSupported => {
                Some("Something's wrong with the microphone on this device.")
            }
            FailureKind::TranscriptionFailed => {
                Some("I didn't catch that — could you say it again?")
            }
            FailureKind::GenerationFailed => {
                Some("Sorry, I'm having trouble thinking of a reply. Could you repeat that?")
            }
            FailureKind::SynthesisFailed | FailureKind::PlaybackFailed => None,
            FailureKind::SessionExpired => Some("This conversation has ended. Please reconnect."),
            FailureKind::SessionUnavailable => {
                Some("I'm having trouble reaching the session service. Please try again.")
            }
            FailureKind::Invalidated => None,
        }
    }
}

impl fmt::Display for FailureKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            FailureKind::PermissionDenied => "permission_denied",
            FailureKind::DeviceBusy => "device_busy",
            FailureKind::NotSupported => "not_supported",
            FailureKind::TranscriptionFailed => "transcription_failed",
            FailureKind::GenerationFailed => "generation_failed",
            FailureKind::SynthesisFailed => "synthesis_failed",
            FailureKind::PlaybackFailed => "playback_failed",
            FailureKind::SessionExpired => "session_expired",
            FailureKind::SessionUnavailable => "session_unavailable",
            FailureKind::Invalidated => "invalidated",
        };
        write!(f, "{s}")
    }
}

/// Implemented by every crate-local error enum so the Orchestrator can react
/// uniformly regardless of which collaborator raised the error.
pub trait Classify {
    fn kind(&self) -> FailureKind;
}

pub type Result<T> = std::result::Result<T, Error>;

/// Catch-all error for the `core` crate itself (segmentation, transcript
/// bookkeeping). Most failures belong to a more specific downstream crate.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("invalid pause token in reply: {0}")]
    InvalidPauseToken(String),
}

impl Classify for Error {
    fn kind(&self) -> FailureKind {
        // Malformed generator output is a generation-side problem from the
        // Orchestrator's point of view.
        FailureKind::GenerationFailed
    }
}
