//! External service clients (§6)
//!
//! One `async_trait` per external collaborator the Orchestrator depends on,
//! plus a reqwest-based concrete client and a deterministic in-memory test
//! double for each. Everything outside this boundary — auth, admin
//! dashboards, RAG memory, persona prompt assembly — is someone else's
//! concern; these traits are the entire surface the core touches.

pub mod asr;
pub mod generator;
pub mod mock;
pub mod session;
pub mod tts;

pub use asr::{AsrService, HttpAsrClient};
pub use generator::{GeneratorService, HttpGeneratorClient};
pub use session::{HttpSessionClient, SessionService};
pub use tts::{HttpTtsClient, TtsService};

use voice_agent_core::FailureKind;

#[derive(Debug, thiserror::Error)]
pub enum TransportError {
    #[error("session service error: {0}")]
    Session(String),

    #[error("session expired or unknown")]
    SessionExpired,

    #[error("transcription failed: {0}")]
    Transcription(String),

    #[error("generation failed: {0}")]
    Generation(String),

    #[error("synthesis failed: {0}")]
    Synthesis(String),
}

impl voice_agent_core::Classify for TransportError {
    fn kind(&self) -> FailureKind {
        match self {
            // A non-401 Session Service error (network failure, timeout,
            // 5xx): the collaborator is unreachable, not a report of bad
            // credentials, so it must not be treated as fatal (§7,
            // `SessionExpired` = "Any service reports bad credentials").
            TransportError::Session(_) => FailureKind::SessionUnavailable,
            TransportError::SessionExpired => FailureKind::SessionExpired,
            TransportError::Transcription(_) => FailureKind::TranscriptionFailed,
            TransportError::Generation(_) => FailureKind::GenerationFailed,
            TransportError::Synthesis(_) => FailureKind::SynthesisFailed,
        }
    }
}

/// Shared status-code check every HTTP client applies before parsing its
/// response body: a 401 from any service means the credentials the Session
/// Service minted are no longer good, which is `SessionExpired` regardless
/// of which call surfaced it (§7: "Any service reports bad credentials").
pub(crate) fn check_status(
    response: reqwest::Response,
    on_other: impl FnOnce(String) -> TransportError,
) -> Result<reqwest::Response, TransportError> {
    if response.status().as_u16() == 401 {
        return Err(TransportError::SessionExpired);
    }
    if !response.status().is_success() {
        return Err(on_other(format!("service returned {}", response.status())));
    }
    Ok(response)
}
