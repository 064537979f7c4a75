//! Session credentials
//!
//! A session is created by the external Session Service and carries an
//! opaque identifier and secret used to authenticate every subsequent call
//! to ASR, Generator, and TTS (§3, *Session*). The core never interprets
//! these values — they are forwarded verbatim.

use serde::{Deserialize, Serialize};
use uuid::Uuid;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SessionId(pub String);

impl SessionId {
    pub fn new() -> Self {
        Self(Uuid::new_v4().to_string())
    }
}

impl Default for SessionId {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Display for SessionId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Opaque credentials minted by the Session Service (§6). Deliberately not
/// `Serialize` — these must never be logged or echoed back to the UI Shell.
#[derive(Clone)]
pub struct SessionCredentials {
    pub session_id: SessionId,
    pub session_secret: String,
}

impl std::fmt::Debug for SessionCredentials {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SessionCredentials")
            .field("session_id", &self.session_id)
            .field("session_secret", &"<redacted>")
            .finish()
    }
}

impl SessionCredentials {
    pub fn new(session_id: SessionId, session_secret: impl Into<String>) -> Self {
        Self {
            session_id,
            session_secret: session_secret.into(),
        }
    }
}
