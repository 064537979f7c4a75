//! Session (§3, §5)
//!
//! Wires every mechanical component and external client into one running
//! session: mints credentials via the Session Service, starts the
//! microphone capture loop, the Turn Orchestrator's main loop, and the
//! Keep-Alive Scheduler, and guarantees deterministic teardown of the
//! microphone, synthesis, and playback resources on every exit path (§1).
//! Two sessions never share state (§5, "Multiple sessions run fully
//! isolated") — everything here is owned exclusively by one `Session`.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use tokio::sync::{mpsc, watch, Notify};
use tokio::task::JoinHandle;
use tracing::{info, warn};

use voice_agent_config::Settings;
use voice_agent_core::{Classify, SessionCredentials, SessionId, Transcript, TranscriptEntry, TurnEvent};
use voice_agent_pipeline::{
    AudioSink, AudioSource, CaptureQueue, PlaybackController, TurnRegistry, VoiceActivityDetector,
};
use voice_agent_transport::{AsrService, GeneratorService, SessionService, TtsService};

use crate::keep_alive::{KeepAliveScheduler, ProactiveMessageSource};
use crate::synthesizer::SynthesizerDriver;
use crate::turn_orchestrator::{TurnOrchestrator, UiSignals};
use crate::vad_handle::VadHandle;
use crate::OrchestratorError;

/// One running user↔agent session and every background task it owns.
pub struct Session<SESS, ASR, GEN, TTS, S, V>
where
    SESS: SessionService,
    ASR: AsrService,
    GEN: GeneratorService,
    TTS: TtsService,
    S: AudioSink + 'static,
    V: VoiceActivityDetector + 'static,
{
    credentials: SessionCredentials,
    session_service: Arc<SESS>,
    transcript: Arc<Transcript>,
    ui: Arc<UiSignals>,
    playback: Arc<PlaybackController<S>>,
    vad: VadHandle<V>,
    text_tx: mpsc::UnboundedSender<(String, bool)>,
    events_rx: parking_lot::Mutex<Option<mpsc::UnboundedReceiver<TurnEvent>>>,
    session_ended: watch::Receiver<bool>,
    shutting_down: AtomicBool,
    capture_task: JoinHandle<()>,
    orchestrator_task: JoinHandle<()>,
    keep_alive_task: JoinHandle<()>,
    fatal_watcher: JoinHandle<()>,
    _marker: std::marker::PhantomData<(ASR, GEN, TTS)>,
}

impl<SESS, ASR, GEN, TTS, S, V> Session<SESS, ASR, GEN, TTS, S, V>
where
    SESS: SessionService + 'static,
    ASR: AsrService + 'static,
    GEN: GeneratorService + 'static,
    TTS: TtsService + 'static,
    S: AudioSink + 'static,
    V: VoiceActivityDetector + 'static,
{
    /// Creates session credentials and starts every background task. The
    /// caller supplies the concrete microphone source, output sink, VAD
    /// algorithm, and service clients — this crate never touches a real
    /// device or network socket directly (Design Notes).
    #[allow(clippy::too_many_arguments)]
    pub async fn start(
        settings: &Settings,
        session_service: Arc<SESS>,
        asr: Arc<ASR>,
        generator: Arc<GEN>,
        tts: Arc<TTS>,
        sink: Arc<S>,
        vad_algorithm: V,
        microphone: impl AudioSource + 'static,
        proactive_source: Arc<dyn ProactiveMessageSource>,
    ) -> Result<Arc<Self>, OrchestratorError> {
        let credentials = session_service
            .create_session()
            .await
            .map_err(|e| OrchestratorError::Session(e.to_string()))?;

        info!(session_id = %credentials.session_id, "session started");

        let registry = Arc::new(TurnRegistry::new());
        let capture_queue = Arc::new(CaptureQueue::new(settings.capture_queue.max_queued_blobs));
        let transcript = Arc::new(Transcript::new());
        let ui = Arc::new(UiSignals::default());
        let playback = PlaybackController::new(sink);
        let vad = VadHandle::new(vad_algorithm);

        let synthesizer = Arc::new(SynthesizerDriver::new(
            tts,
            playback.clone(),
            vad.clone(),
            registry.clone(),
            transcript.clone(),
            settings.synthesizer,
        ));

        let (events_tx, events_rx) = mpsc::unbounded_channel();
        let (text_tx, text_rx) = mpsc::unbounded_channel();
        let activity = Arc::new(Notify::new());
        let capture_notify = Arc::new(Notify::new());
        let (session_ended_tx, session_ended_rx) = watch::channel(false);

        let orchestrator = TurnOrchestrator::new(
            registry.clone(),
            capture_queue.clone(),
            playback.clone(),
            vad.clone(),
            asr,
            generator,
            synthesizer,
            transcript.clone(),
            credentials.clone(),
            settings.barge_in,
            ui.clone(),
            events_tx,
            activity.clone(),
            session_ended_tx,
        );

        let orchestrator_task = {
            let orchestrator = orchestrator.clone();
            let capture_notify = capture_notify.clone();
            tokio::spawn(async move {
                orchestrator.run(text_rx, capture_notify).await;
            })
        };

        let capture_task = vad
            .clone()
            .run_capture_loop(microphone, capture_queue, capture_notify);

        let keep_alive = KeepAliveScheduler::new(
            settings.keep_alive,
            credentials.session_id.clone(),
            registry,
            playback.clone(),
            transcript.clone(),
            proactive_source,
            text_tx.clone(),
        );
        let keep_alive_task = tokio::spawn(async move { keep_alive.run(activity).await });

        // §7: `SessionExpired` is "the only error that tears down the
        // session" — the Orchestrator trips `session_ended` whenever any
        // collaborator reports one, and this task is what actually acts on
        // it, since only `Session::shutdown` knows how to release every
        // resource it owns. `Arc::new_cyclic` gives this task a `Weak`
        // handle on the very `Session` being constructed, so teardown can be
        // triggered from inside `start` without a separate init step.
        Ok(Arc::new_cyclic(|weak: &std::sync::Weak<Self>| {
            let fatal_watcher = {
                let weak = weak.clone();
                let mut session_ended_rx = session_ended_rx.clone();
                tokio::spawn(async move {
                    if session_ended_rx.changed().await.is_err() {
                        return;
                    }
                    if *session_ended_rx.borrow() {
                        if let Some(session) = weak.upgrade() {
                            session.shutdown().await;
                        }
                    }
                })
            };

            Self {
                credentials,
                session_service,
                transcript,
                ui,
                playback,
                vad,
                text_tx,
                events_rx: parking_lot::Mutex::new(Some(events_rx)),
                session_ended: session_ended_rx,
                shutting_down: AtomicBool::new(false),
                capture_task,
                orchestrator_task,
                keep_alive_task,
                fatal_watcher,
                _marker: std::marker::PhantomData,
            }
        }))
    }

    /// A watch channel that flips to `true` exactly when this session has
    /// gone fatally stale (§7, `SessionExpired`) — a UI Shell boundary can
    /// clone this to know to close its connection without polling.
    pub fn ended_signal(&self) -> watch::Receiver<bool> {
        self.session_ended.clone()
    }

    pub fn session_id(&self) -> &SessionId {
        &self.credentials.session_id
    }

    /// The text-message entry path (§4.6): submits user-authored text,
    /// bypassing ASR. Always invalidates a currently speaking turn.
    pub fn submit_text(&self, text: impl Into<String>) {
        let _ = self.text_tx.send((text.into(), false));
    }

    /// Drives the barge-in gate's `UserIsTyping` signal (§4.6, step 4):
    /// while true, a word-based interruption is suppressed in favor of the
    /// user's in-progress typed message.
    pub fn set_user_is_typing(&self, typing: bool) {
        self.ui.set_user_is_typing(typing);
    }

    pub fn transcript_snapshot(&self) -> Vec<TranscriptEntry> {
        self.transcript.snapshot()
    }

    /// Hands the UI Shell its turn-event stream; can only be taken once
    /// (there is exactly one consumer of this channel).
    pub fn take_events(&self) -> Option<mpsc::UnboundedReceiver<TurnEvent>> {
        self.events_rx.lock().take()
    }

    /// Deterministic teardown (§1, §3 Lifecycle): stops the microphone,
    /// halts any in-progress playback, ends the remote session, and aborts
    /// every background task. Idempotent — safe to call more than once (only
    /// the first call does any work; this also guards against the
    /// fatal-error watcher and an explicit caller racing each other), and
    /// safe to skip (see the `Drop` impl for the best-effort fallback).
    pub async fn shutdown(&self) {
        if self.shutting_down.swap(true, Ordering::SeqCst) {
            return;
        }

        self.vad.stop();
        self.playback.stop();
        self.keep_alive_task.abort();
        self.capture_task.abort();

        // `fatal_watcher` is deliberately not aborted here: when this call
        // to `shutdown` originates from that very task (a fatal error was
        // reported), aborting it now would cancel it at its next await
        // point — the `end_session` call a few lines down — before that
        // call completes. It is a one-shot task that exits on its own once
        // this function returns (or once every `session_ended` sender has
        // dropped); `Drop` aborts it for the rarer case where neither
        // happens first.

        // Dropping every text_tx clone would close the Orchestrator's main
        // loop gracefully, but callers may still hold one (e.g. a UI Shell
        // connection handler) — abort explicitly instead of relying on that.
        self.orchestrator_task.abort();

        if let Err(err) = self.session_service.end_session(&self.credentials).await {
            warn!(session_id = %self.credentials.session_id, error = %err, kind = %err.kind(), "failed to end session with the Session Service");
        }

        info!(session_id = %self.credentials.session_id, "session torn down");
    }
}

impl<SESS, ASR, GEN, TTS, S, V> Drop for Session<SESS, ASR, GEN, TTS, S, V>
where
    SESS: SessionService,
    ASR: AsrService,
    GEN: GeneratorService,
    TTS: TtsService,
    S: AudioSink + 'static,
    V: VoiceActivityDetector + 'static,
{
    /// Best-effort synchronous fallback for a `Session` dropped without an
    /// explicit `shutdown().await` — releases the microphone and output
    /// device and stops every background task immediately. This cannot also
    /// call the (async) Session Service; `shutdown()` remains the only path
    /// that reports teardown upstream.
    fn drop(&mut self) {
        self.vad.stop();
        self.playback.stop();
        self.keep_alive_task.abort();
        self.capture_task.abort();
        self.orchestrator_task.abort();
        self.fatal_watcher.abort();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use voice_agent_core::AudioFrame;
    use voice_agent_pipeline::{HysteresisVad, PipelineError};
    use voice_agent_transport::mock::{
        InMemorySessionService, ScriptedAsrService, ScriptedGeneratorService, ScriptedTtsService,
    };

    use crate::keep_alive::DefaultProactiveMessageSource;

    struct SilentSink;

    #[async_trait]
    impl AudioSink for SilentSink {
        async fn play(
            &self,
            _audio: AudioFrame,
            _stop: tokio::sync::watch::Receiver<bool>,
        ) -> Result<(), PipelineError> {
            Ok(())
        }
    }

    /// Never yields a frame: exercises session lifecycle without a real
    /// capture device driving any utterances.
    struct EmptySource;

    impl AudioSource for EmptySource {
        fn next_frame(&mut self) -> Option<AudioFrame> {
            None
        }
    }

    fn vad_algorithm() -> HysteresisVad {
        HysteresisVad::new(voice_agent_config::VadConfig {
            start_threshold_db: -35.0,
            stop_threshold_db: -45.0,
            min_speech_ms: 200,
            max_gap_ms: 300,
            smoothing_frames: 5,
        })
    }

    #[tokio::test]
    async fn start_mints_credentials_and_text_submission_produces_a_transcript() {
        let settings = Settings::default();
        let session_service = Arc::new(InMemorySessionService::default());
        let asr = Arc::new(ScriptedAsrService::default());
        let generator = Arc::new(ScriptedGeneratorService::new(["Got it."]));
        let tts = Arc::new(ScriptedTtsService::new([true]));

        let session = Session::start(
            &settings,
            session_service,
            asr,
            generator,
            tts,
            Arc::new(SilentSink),
            vad_algorithm(),
            EmptySource,
            Arc::new(DefaultProactiveMessageSource),
        )
        .await
        .unwrap();

        session.submit_text("hello");
        tokio::time::sleep(std::time::Duration::from_millis(100)).await;

        let snap = session.transcript_snapshot();
        assert!(snap.iter().any(|e| e.text == "hello"));
        assert!(snap.iter().any(|e| e.text == "Got it."));
    }

    #[tokio::test]
    async fn shutdown_ends_the_remote_session_exactly_once() {
        let settings = Settings::default();
        let session_service = Arc::new(InMemorySessionService::default());
        let asr = Arc::new(ScriptedAsrService::default());
        let generator = Arc::new(ScriptedGeneratorService::default());
        let tts = Arc::new(ScriptedTtsService::default());

        let session = Session::start(
            &settings,
            session_service.clone(),
            asr,
            generator,
            tts,
            Arc::new(SilentSink),
            vad_algorithm(),
            EmptySource,
            Arc::new(DefaultProactiveMessageSource),
        )
        .await
        .unwrap();

        let id = session.session_id().clone();
        session.shutdown().await;

        assert_eq!(session_service.ended.lock().len(), 1);
        assert_eq!(session_service.ended.lock()[0], id);
    }

    #[tokio::test]
    async fn take_events_can_only_be_taken_once() {
        let settings = Settings::default();
        let session_service = Arc::new(InMemorySessionService::default());
        let asr = Arc::new(ScriptedAsrService::default());
        let generator = Arc::new(ScriptedGeneratorService::default());
        let tts = Arc::new(ScriptedTtsService::default());

        let session = Session::start(
            &settings,
            session_service,
            asr,
            generator,
            tts,
            Arc::new(SilentSink),
            vad_algorithm(),
            EmptySource,
            Arc::new(DefaultProactiveMessageSource),
        )
        .await
        .unwrap();

        assert!(session.take_events().is_some());
        assert!(session.take_events().is_none());
    }

    #[tokio::test]
    async fn ended_signal_starts_false_and_shutdown_does_not_trip_it() {
        let settings = Settings::default();
        let session_service = Arc::new(InMemorySessionService::default());
        let asr = Arc::new(ScriptedAsrService::default());
        let generator = Arc::new(ScriptedGeneratorService::default());
        let tts = Arc::new(ScriptedTtsService::default());

        let session = Session::start(
            &settings,
            session_service,
            asr,
            generator,
            tts,
            Arc::new(SilentSink),
            vad_algorithm(),
            EmptySource,
            Arc::new(DefaultProactiveMessageSource),
        )
        .await
        .unwrap();

        let ended = session.ended_signal();
        assert!(!*ended.borrow());

        // An ordinary caller-initiated shutdown (e.g. a UI Shell disconnect)
        // is not a `SessionExpired` failure and must not trip the signal a
        // `fatal_watcher` would otherwise react to.
        session.shutdown().await;
        assert!(!*ended.borrow());
    }
}
