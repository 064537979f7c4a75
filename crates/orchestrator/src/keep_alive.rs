//! Keep-Alive Scheduler (§4.7)
//!
//! A single-shot timer, re-armed on every activity event (user blob
//! received, user text submitted, agent turn closed — wired in
//! `TurnOrchestrator`), that triggers a proactive agent turn once
//! `silenceWindow` elapses with nothing else going on. Invariant K1 ("no
//! preemption") is enforced by re-checking playback and turn state at the
//! moment the timer actually fires, not just at arm time — a slow
//! in-flight turn can easily outlive one window.

use std::sync::Arc;
use std::time::Duration;

use tokio::sync::{mpsc, Notify};
use tracing::debug;

use voice_agent_config::KeepAliveConfig;
use voice_agent_core::session::SessionId;
use voice_agent_core::Transcript;
use voice_agent_pipeline::{AudioSink, KeepAliveGuard, PlaybackController, TurnRegistry};

/// Composes the text of a proactive follow-up. Application content — what
/// the agent actually says — is out of scope for this core (§1, §9); the
/// Scheduler only guarantees *when* a proactive turn fires. The Generator
/// Service is expected to interpret the `proactive=true` marker and produce
/// the real reply; the text handed through here is merely the triggering
/// "user" input on the text-message entry path.
pub trait ProactiveMessageSource: Send + Sync {
    fn compose(&self, session_id: &SessionId, recent_transcript: &[String]) -> String;
}

/// Minimal deterministic placeholder: references the session id only, no
/// topic summarization or persona content (Open Question 4, `DESIGN.md`).
pub struct DefaultProactiveMessageSource;

impl ProactiveMessageSource for DefaultProactiveMessageSource {
    fn compose(&self, session_id: &SessionId, _recent_transcript: &[String]) -> String {
        format!("[keep-alive check-in for session {session_id}]")
    }
}

pub struct KeepAliveScheduler<S: AudioSink + 'static> {
    config: KeepAliveConfig,
    session_id: SessionId,
    registry: Arc<TurnRegistry>,
    playback: Arc<PlaybackController<S>>,
    transcript: Arc<Transcript>,
    guard: KeepAliveGuard,
    source: Arc<dyn ProactiveMessageSource>,
    text_tx: mpsc::UnboundedSender<(String, bool)>,
}

impl<S: AudioSink + 'static> KeepAliveScheduler<S> {
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        config: KeepAliveConfig,
        session_id: SessionId,
        registry: Arc<TurnRegistry>,
        playback: Arc<PlaybackController<S>>,
        transcript: Arc<Transcript>,
        source: Arc<dyn ProactiveMessageSource>,
        text_tx: mpsc::UnboundedSender<(String, bool)>,
    ) -> Arc<Self> {
        Arc::new(Self {
            config,
            session_id,
            registry,
            playback,
            transcript,
            guard: KeepAliveGuard::default(),
            source,
            text_tx,
        })
    }

    /// Runs until `activity`'s last sender is dropped (session teardown).
    /// Every notification on `activity` re-arms the window; a skipped fire
    /// (turn or playback in flight) simply waits out another full window
    /// rather than busy-polling.
    pub async fn run(self: Arc<Self>, activity: Arc<Notify>) {
        let window = Duration::from_millis(self.config.silence_window_ms);
        loop {
            if tokio::time::timeout(window, activity.notified()).await.is_ok() {
                // Woken by activity before the window elapsed: re-armed.
                continue;
            }
            self.try_fire();
        }
    }

    fn try_fire(&self) {
        // Invariant K1: never fire while any turn is in flight or audio is
        // playing, checked at the instant the timer actually expires.
        if self.playback.is_playing() || self.registry.state().is_active() {
            debug!("keep-alive window elapsed but a turn is in flight; skipping");
            return;
        }

        if !self.guard.try_acquire() {
            return;
        }

        let recent = self.transcript.recent_lines(10);
        let message = self.source.compose(&self.session_id, &recent);
        let _ = self.text_tx.send((message, true));
        self.guard.release();
    }
}
