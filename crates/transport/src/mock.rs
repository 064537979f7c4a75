//! Deterministic in-memory test doubles
//!
//! Each double is driven by a queue of scripted outcomes so integration
//! tests can assert exact call counts and exact sequencing (TTS
//! retry-then-skip, keep-alive, etc.) without any network I/O or timing
//! flakiness.

use std::collections::VecDeque;
use std::sync::atomic::{AtomicUsize, Ordering};

use async_trait::async_trait;
use parking_lot::Mutex;
use voice_agent_core::session::{SessionCredentials, SessionId};
use voice_agent_core::AudioFrame;

use crate::{AsrService, GeneratorService, SessionService, TransportError, TtsService};

/// Always succeeds, handing out sequentially-numbered session ids.
pub struct InMemorySessionService {
    next_id: AtomicUsize,
    pub ended: Mutex<Vec<SessionId>>,
}

impl Default for InMemorySessionService {
    fn default() -> Self {
        Self {
            next_id: AtomicUsize::new(1),
            ended: Mutex::new(Vec::new()),
        }
    }
}

#[async_trait]
impl SessionService for InMemorySessionService {
    async fn create_session(&self) -> Result<SessionCredentials, TransportError> {
        let id = self.next_id.fetch_add(1, Ordering::SeqCst);
        Ok(SessionCredentials::new(
            SessionId(format!("test-session-{id}")),
            "test-secret",
        ))
    }

    async fn end_session(&self, credentials: &SessionCredentials) -> Result<(), TransportError> {
        self.ended.lock().push(credentials.session_id.clone());
        Ok(())
    }
}

/// Returns scripted transcripts, one per call, in FIFO order. Calling past
/// the end of the script returns an empty transcript rather than panicking.
#[derive(Default)]
pub struct ScriptedAsrService {
    script: Mutex<VecDeque<Result<String, TransportError>>>,
    pub call_count: AtomicUsize,
}

impl ScriptedAsrService {
    pub fn new(script: impl IntoIterator<Item = &'static str>) -> Self {
        Self {
            script: Mutex::new(script.into_iter().map(|s| Ok(s.to_string())).collect()),
            call_count: AtomicUsize::new(0),
        }
    }

    /// Script raw outcomes, including failures, for tests that need to
    /// simulate a `TransportError` (e.g. `SessionExpired`) rather than a
    /// successful transcript.
    pub fn new_results(script: impl IntoIterator<Item = Result<String, TransportError>>) -> Self {
        Self {
            script: Mutex::new(script.into_iter().collect()),
            call_count: AtomicUsize::new(0),
        }
    }
}

#[async_trait]
impl AsrService for ScriptedAsrService {
    async fn transcribe(
        &self,
        _credentials: &SessionCredentials,
        _audio: &[AudioFrame],
    ) -> Result<String, TransportError> {
        self.call_count.fetch_add(1, Ordering::SeqCst);
        Ok(self
            .script
            .lock()
            .pop_front()
            .transpose()?
            .unwrap_or_default())
    }
}

/// Returns scripted replies, one per call, in FIFO order.
#[derive(Default)]
pub struct ScriptedGeneratorService {
    script: Mutex<VecDeque<Result<String, TransportError>>>,
    pub call_count: AtomicUsize,
    pub proactive_calls: AtomicUsize,
}

impl ScriptedGeneratorService {
    pub fn new(script: impl IntoIterator<Item = &'static str>) -> Self {
        Self {
            script: Mutex::new(script.into_iter().map(|s| Ok(s.to_string())).collect()),
            call_count: AtomicUsize::new(0),
            proactive_calls: AtomicUsize::new(0),
        }
    }

    /// Script raw outcomes, including failures, for tests that need to
    /// simulate a `TransportError` (e.g. a Generator-side failure).
    pub fn new_results(script: impl IntoIterator<Item = Result<String, TransportError>>) -> Self {
        Self {
            script: Mutex::new(script.into_iter().collect()),
            call_count: AtomicUsize::new(0),
            proactive_calls: AtomicUsize::new(0),
        }
    }
}

#[async_trait]
impl GeneratorService for ScriptedGeneratorService {
    async fn generate(
        &self,
        _credentials: &SessionCredentials,
        _context: &[String],
        _input: &str,
        proactive: bool,
    ) -> Result<String, TransportError> {
        self.call_count.fetch_add(1, Ordering::SeqCst);
        if proactive {
            self.proactive_calls.fetch_add(1, Ordering::SeqCst);
        }
        self.script.lock().pop_front().transpose().map(|r| r.unwrap_or_default())
    }
}

/// Returns scripted outcomes, one per call, in FIFO order. Used to simulate
/// TTS failures on specific calls (retry-then-skip scenarios); a segment
/// that retries calls this multiple times, consuming one scripted outcome
/// per attempt.
#[derive(Default)]
pub struct ScriptedTtsService {
    script: Mutex<VecDeque<Result<(), ()>>>,
    pub call_count: AtomicUsize,
}

impl ScriptedTtsService {
    /// `script` entries are `true` for success, `false` for failure.
    pub fn new(script: impl IntoIterator<Item = bool>) -> Self {
        Self {
            script: Mutex::new(
                script
                    .into_iter()
                    .map(|ok| if ok { Ok(()) } else { Err(()) })
                    .collect(),
            ),
            call_count: AtomicUsize::new(0),
        }
    }
}

#[async_trait]
impl TtsService for ScriptedTtsService {
    async fn synthesize(
        &self,
        _credentials: &SessionCredentials,
        text: &str,
    ) -> Result<AudioFrame, TransportError> {
        self.call_count.fetch_add(1, Ordering::SeqCst);
        let outcome = self.script.lock().pop_front().unwrap_or(Ok(()));
        match outcome {
            Ok(()) => Ok(AudioFrame::new(
                vec![0.1; text.len().max(1) * 160],
                voice_agent_core::SampleRate::Hz22050,
                voice_agent_core::Channels::Mono,
                0,
            )),
            Err(()) => Err(TransportError::Synthesis("scripted failure".to_string())),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn in_memory_session_service_issues_distinct_ids() {
        let svc = InMemorySessionService::default();
        let a = svc.create_session().await.unwrap();
        let b = svc.create_session().await.unwrap();
        assert_ne!(a.session_id, b.session_id);
    }

    #[tokio::test]
    async fn scripted_asr_returns_in_order() {
        let svc = ScriptedAsrService::new(["hello", "world"]);
        let creds = SessionCredentials::new(SessionId("s".into()), "secret");
        assert_eq!(svc.transcribe(&creds, &[]).await.unwrap(), "hello");
        assert_eq!(svc.transcribe(&creds, &[]).await.unwrap(), "world");
    }

    #[tokio::test]
    async fn scripted_tts_fails_then_succeeds_per_script() {
        let svc = ScriptedTtsService::new([false, false, true]);
        let creds = SessionCredentials::new(SessionId("s".into()), "secret");
        assert!(svc.synthesize(&creds, "hi").await.is_err());
        assert!(svc.synthesize(&creds, "hi").await.is_err());
        assert!(svc.synthesize(&creds, "hi").await.is_ok());
    }
}
