//! Turn Orchestrator (§4.6)
//!
//! Serializes the lifecycle of one user→agent exchange end-to-end:
//! transcription → generation → synthesis → playback, under cancellation.
//! The main loop never blocks on a turn's longest-latency step (Generate) —
//! it dispatches that work to its own task and keeps listening, so a second
//! input can invalidate the in-flight turn while it is still awaiting the
//! Generator (§8, scenario 4).

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use tokio::sync::{mpsc, watch, Notify};
use tracing::warn;

use voice_agent_config::BargeInConfig;
use voice_agent_core::{
    Classify, FailureKind, SessionCredentials, Transcript, TranscriptEntry, TurnEvent, TurnId,
    TurnState,
};
use voice_agent_pipeline::{AudioSink, CaptureQueue, PlaybackController, TurnRegistry, VoiceActivityDetector};
use voice_agent_transport::{AsrService, GeneratorService, TtsService};

use crate::synthesizer::SynthesizerDriver;
use crate::vad_handle::VadHandle;

/// How many recent transcript lines are handed to the Generator as context.
const CONTEXT_LINES: usize = 20;

/// External signals the UI Shell drives (§6): whether the user is currently
/// typing (gates word-based barge-in) and the outgoing turn-event stream the
/// Shell renders (transcript appends are observed separately, via
/// [`Transcript::snapshot`]).
pub struct UiSignals {
    user_is_typing: AtomicBool,
}

impl Default for UiSignals {
    fn default() -> Self {
        Self {
            user_is_typing: AtomicBool::new(false),
        }
    }
}

impl UiSignals {
    pub fn set_user_is_typing(&self, typing: bool) {
        self.user_is_typing.store(typing, Ordering::SeqCst);
    }

    pub fn user_is_typing(&self) -> bool {
        self.user_is_typing.load(Ordering::SeqCst)
    }
}

pub struct TurnOrchestrator<ASR, GEN, TTS, S, V>
where
    ASR: AsrService,
    GEN: GeneratorService,
    TTS: TtsService,
    S: AudioSink + 'static,
    V: VoiceActivityDetector + 'static,
{
    registry: Arc<TurnRegistry>,
    capture_queue: Arc<CaptureQueue>,
    playback: Arc<PlaybackController<S>>,
    vad: VadHandle<V>,
    asr: Arc<ASR>,
    generator: Arc<GEN>,
    synthesizer: Arc<SynthesizerDriver<TTS, S, V>>,
    transcript: Arc<Transcript>,
    credentials: SessionCredentials,
    barge_in: BargeInConfig,
    ui: Arc<UiSignals>,
    events: mpsc::UnboundedSender<TurnEvent>,
    activity: Arc<Notify>,
    session_ended: watch::Sender<bool>,
}

impl<ASR, GEN, TTS, S, V> TurnOrchestrator<ASR, GEN, TTS, S, V>
where
    ASR: AsrService,
    GEN: GeneratorService,
    TTS: TtsService,
    S: AudioSink + 'static,
    V: VoiceActivityDetector + 'static,
{
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        registry: Arc<TurnRegistry>,
        capture_queue: Arc<CaptureQueue>,
        playback: Arc<PlaybackController<S>>,
        vad: VadHandle<V>,
        asr: Arc<ASR>,
        generator: Arc<GEN>,
        synthesizer: Arc<SynthesizerDriver<TTS, S, V>>,
        transcript: Arc<Transcript>,
        credentials: SessionCredentials,
        barge_in: BargeInConfig,
        ui: Arc<UiSignals>,
        events: mpsc::UnboundedSender<TurnEvent>,
        activity: Arc<Notify>,
        session_ended: watch::Sender<bool>,
    ) -> Arc<Self> {
        Arc::new(Self {
            registry,
            capture_queue,
            playback,
            vad,
            asr,
            generator,
            synthesizer,
            transcript,
            credentials,
            barge_in,
            ui,
            events,
            activity,
            session_ended,
        })
    }

    /// The main loop (§4.6): block on capture-queue activity or an incoming
    /// text message, handle it, and go back to listening. Returns once
    /// `text_rx` closes (session teardown — see `voice_agent_orchestrator::session`).
    pub async fn run(
        self: &Arc<Self>,
        mut text_rx: mpsc::UnboundedReceiver<(String, bool)>,
        capture_notify: Arc<Notify>,
    ) {
        loop {
            tokio::select! {
                _ = capture_notify.notified() => {
                    while let Some(blob) = self.capture_queue.pop() {
                        self.handle_blob(blob).await;
                    }
                }
                received = text_rx.recv() => {
                    match received {
                        Some((text, proactive)) => self.handle_text(text, proactive).await,
                        None => break,
                    }
                }
            }
        }
    }

    /// Step 1-6 for a captured microphone utterance. Spawns the
    /// generate+synthesize tail (steps 7-10) so the loop above can keep
    /// listening for an interrupting input.
    async fn handle_blob(self: &Arc<Self>, blob: voice_agent_pipeline::CapturedBlob) {
        // Rearm the Keep-Alive timer (§4.7: "user blob received" is one of
        // the three activity events).
        self.activity.notify_one();

        let already_active = self.registry.state().is_active();

        if !already_active {
            // Nothing to interrupt: open unconditionally and run the full
            // pipeline (§4.6, step 1).
            let turn = self.registry.open();
            self.registry.set_state(turn, TurnState::Transcribing);
            self.emit(TurnEvent::Opened { turn_id: turn });

            let text = match self.transcribe(&blob).await {
                Some(text) => text,
                None => {
                    self.abandon_turn(turn);
                    return;
                }
            };
            if text.trim().is_empty() {
                self.abandon_turn(turn);
                return;
            }
            self.continue_from_transcribed_text(turn, text, false).await;
            return;
        }

        if !self.playback.is_playing() {
            // A turn is in flight but not yet Playing (Transcribing or
            // Generating): there is no audio to interrupt, so a concurrent
            // blob must not open a second turn (§8, "A blob arriving while
            // the Orchestrator is mid-Generate must not open a second
            // turn"; Invariant T3(a)). Transcribe it for the record only.
            let text = match self.transcribe(&blob).await {
                Some(text) => text,
                None => return,
            };
            if text.trim().is_empty() {
                return;
            }
            self.transcript
                .append(TranscriptEntry::user(text, self.registry.current()));
            return;
        }

        // Playing: transcribe first, then evaluate the barge-in gate
        // (§4.6, step 4) against the result.
        let text = match self.transcribe(&blob).await {
            Some(text) => text,
            None => return,
        };
        if text.trim().is_empty() {
            return;
        }

        let is_interrupt = text.chars().count() >= self.barge_in.min_interrupt_chars
            && !self.ui.user_is_typing();

        if !is_interrupt {
            // Typing-protects-speech, or the utterance was too short to
            // count as a real interruption: record it for the transcript
            // but leave the currently playing turn untouched — "no new turn
            // is opened until the current one closes naturally" (§8,
            // scenario 3).
            self.transcript
                .append(TranscriptEntry::user(text, self.registry.current()));
            return;
        }

        let turn = self.registry.open();
        self.vad.resume();
        self.emit(TurnEvent::Opened { turn_id: turn });
        self.continue_from_transcribed_text(turn, text, false).await;
    }

    /// Returns an abandoned turn to a terminal state so `registry.state()`
    /// stops reporting it as in flight once its pipeline has stopped short
    /// of the normal Closed transition (ASR failure, empty transcription, or
    /// a Generator error) — otherwise the next blob would see a phantom
    /// active turn and be routed into the barge-in gate instead of opening
    /// a fresh one.
    fn abandon_turn(&self, turn: TurnId) {
        if !self.registry.is_stale(turn) {
            self.registry.set_state(turn, TurnState::Closed);
            self.emit(TurnEvent::Closed { turn_id: turn });
        }
    }

    /// The text-message entry path (§4.6): always invalidates unconditionally
    /// — "a text submission always invalidates a speaking turn". ASR is
    /// skipped; flow resumes at step 6.
    async fn handle_text(self: &Arc<Self>, text: String, proactive: bool) {
        // Rearm the Keep-Alive timer (§4.7: "user text submitted"). A
        // proactive message is the Scheduler's own output, not user
        // activity, so it does not rearm the timer that triggered it.
        if !proactive {
            self.activity.notify_one();
        }

        if text.trim().is_empty() {
            return;
        }

        let turn = self.registry.open();
        self.vad.resume();
        self.emit(TurnEvent::Opened { turn_id: turn });
        self.continue_from_transcribed_text(turn, text, proactive).await;
    }

    async fn transcribe(self: &Arc<Self>, blob: &voice_agent_pipeline::CapturedBlob) -> Option<String> {
        match self.asr.transcribe(&self.credentials, blob.frames()).await {
            Ok(text) => Some(text),
            Err(err) => {
                self.report_failure(err.kind());
                None
            }
        }
    }

    /// Steps 5-6: staleness re-check, then append; steps 7-10 run as a
    /// spawned tail so an interrupting input can still invalidate this turn
    /// while the Generator call is in flight (§8, scenario 4).
    async fn continue_from_transcribed_text(
        self: &Arc<Self>,
        turn: TurnId,
        text: String,
        proactive: bool,
    ) {
        if self.registry.is_stale(turn) {
            // Two inputs arrived back-to-back and the second already bumped
            // the counter: keep the utterance for the record, skip generation.
            self.transcript.append(TranscriptEntry::user(text, turn));
            return;
        }

        self.registry.set_state(turn, TurnState::Generating);
        self.transcript.append(TranscriptEntry::user(text.clone(), turn));

        let this = Arc::clone(self);
        tokio::spawn(async move {
            this.generate_and_speak(turn, text, proactive).await;
        });
    }

    async fn generate_and_speak(self: Arc<Self>, turn: TurnId, text: String, proactive: bool) {
        // Stopping point (i): before the Generator call.
        if self.registry.is_stale(turn) {
            return;
        }

        let context = self.transcript.recent_lines(CONTEXT_LINES);
        let reply = match self
            .generator
            .generate(&self.credentials, &context, &text, proactive)
            .await
        {
            Ok(reply) => reply,
            Err(err) => {
                self.report_failure(err.kind());
                self.abandon_turn(turn);
                return;
            }
        };

        // Stopping point (ii): after the Generator call. A mid-flight
        // generation that completes after invalidation is discarded without
        // touching transcript or playback.
        if self.registry.is_stale(turn) {
            return;
        }

        self.synthesizer.speak(&reply, turn, &self.credentials).await;

        if !self.registry.is_stale(turn) {
            self.registry.set_state(turn, TurnState::Closed);
            self.emit(TurnEvent::Closed { turn_id: turn });
        }

        self.activity.notify_one();
    }

    /// §7: every failure but `Invalidated` produces a one-line transcript
    /// message; `SessionExpired` additionally tears down the whole session —
    /// it is "the only error that tears down the session" (§7, Propagation
    /// policy), regardless of which collaborator (ASR, Generator, TTS, or the
    /// Session Service itself) reported the expired credentials.
    fn report_failure(&self, kind: FailureKind) {
        if kind.is_silent() {
            return;
        }
        if let Some(message) = kind.user_message() {
            self.transcript.append(TranscriptEntry::system(message));
        }
        warn!(%kind, "turn failed");
        self.activity.notify_one();

        if kind.is_fatal() {
            let _ = self.session_ended.send(true);
        }
    }

    fn emit(&self, event: TurnEvent) {
        let _ = self.events.send(event);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use std::time::Duration;
    use voice_agent_core::session::SessionId;
    use voice_agent_pipeline::{CapturedBlob, HysteresisVad, PipelineError};
    use voice_agent_transport::mock::{ScriptedAsrService, ScriptedGeneratorService, ScriptedTtsService};

    struct SilentSink;

    #[async_trait]
    impl AudioSink for SilentSink {
        async fn play(
            &self,
            _audio: voice_agent_core::AudioFrame,
            _stop: tokio::sync::watch::Receiver<bool>,
        ) -> Result<(), PipelineError> {
            Ok(())
        }
    }

    fn blob() -> CapturedBlob {
        CapturedBlob::from_frames(vec![voice_agent_core::AudioFrame::new(
            vec![0.1; 160],
            voice_agent_core::SampleRate::Hz16000,
            voice_agent_core::Channels::Mono,
            0,
        )])
    }

    fn vad() -> VadHandle<HysteresisVad> {
        VadHandle::new(HysteresisVad::new(voice_agent_config::VadConfig {
            start_threshold_db: -35.0,
            stop_threshold_db: -45.0,
            min_speech_ms: 200,
            max_gap_ms: 300,
            smoothing_frames: 5,
        }))
    }

    #[allow(clippy::type_complexity)]
    fn build(
        asr: ScriptedAsrService,
        gen: ScriptedGeneratorService,
        tts: ScriptedTtsService,
    ) -> (
        Arc<TurnOrchestrator<ScriptedAsrService, ScriptedGeneratorService, ScriptedTtsService, SilentSink, HysteresisVad>>,
        Arc<TurnRegistry>,
        Arc<Transcript>,
        Arc<CaptureQueue>,
        Arc<Notify>,
        mpsc::UnboundedSender<(String, bool)>,
        watch::Receiver<bool>,
    ) {
        let registry = Arc::new(TurnRegistry::new());
        let capture_queue = Arc::new(CaptureQueue::new(2));
        let playback = PlaybackController::new(Arc::new(SilentSink));
        let vad = vad();
        let transcript = Arc::new(Transcript::new());

        let synthesizer = Arc::new(SynthesizerDriver::new(
            Arc::new(tts),
            playback.clone(),
            vad.clone(),
            registry.clone(),
            transcript.clone(),
            voice_agent_config::SynthesizerConfig {
                max_retries_per_segment: 1,
                base_backoff_ms: 1,
                max_backoff_ms: 2,
                short_segment_chars: 40,
                pause_scale_factor: 0.5,
                min_adjusted_pause_ms: 150,
            },
        ));

        let (events_tx, _events_rx) = mpsc::unbounded_channel();
        let (text_tx, text_rx) = mpsc::unbounded_channel();
        let activity = Arc::new(Notify::new());
        let ui = Arc::new(UiSignals::default());
        let (session_ended_tx, session_ended_rx) = watch::channel(false);

        let orchestrator = TurnOrchestrator::new(
            registry.clone(),
            capture_queue.clone(),
            playback,
            vad,
            Arc::new(asr),
            Arc::new(gen),
            synthesizer,
            transcript.clone(),
            SessionCredentials::new(SessionId("s".into()), "secret"),
            BargeInConfig {
                min_interrupt_chars: 3,
            },
            ui,
            events_tx,
            activity,
            session_ended_tx,
        );

        let capture_notify = Arc::new(Notify::new());
        let o = orchestrator.clone();
        let cn = capture_notify.clone();
        tokio::spawn(async move {
            o.run(text_rx, cn).await;
        });

        (
            orchestrator,
            registry,
            transcript,
            capture_queue,
            capture_notify,
            text_tx,
            session_ended_rx,
        )
    }

    #[tokio::test]
    async fn happy_path_produces_two_agent_segments_and_one_user_entry() {
        let (_o, registry, transcript, queue, notify, _text_tx, _ended) = build(
            ScriptedAsrService::new(["hello"]),
            ScriptedGeneratorService::new(["Hi there. [pause:0.01s] How are you?"]),
            ScriptedTtsService::new([true, true]),
        );

        queue.push(blob());
        notify.notify_one();

        tokio::time::sleep(Duration::from_millis(200)).await;

        let snap = transcript.snapshot();
        assert_eq!(snap.len(), 3);
        assert_eq!(snap[0].text, "hello");
        assert_eq!(snap[1].text, "Hi there.");
        assert_eq!(snap[2].text, "How are you?");
        assert_eq!(registry.current(), TurnId(1));
    }

    #[tokio::test]
    async fn a_too_short_utterance_during_playback_does_not_open_a_new_turn() {
        let (_o, registry, transcript, queue, notify, _text_tx, _ended) = build(
            ScriptedAsrService::new(["hello", "hi"]),
            ScriptedGeneratorService::new(["Speaking for a while. [pause:0.3s] Still speaking."]),
            ScriptedTtsService::new([true, true]),
        );

        queue.push(blob());
        notify.notify_one();
        tokio::time::sleep(Duration::from_millis(30)).await;

        let turn_before = registry.current();
        queue.push(blob());
        notify.notify_one();
        tokio::time::sleep(Duration::from_millis(50)).await;

        // "hi" is below the 3-char barge-in floor: no new turn.
        assert_eq!(registry.current(), turn_before);
        assert!(transcript.snapshot().iter().any(|e| e.text == "hi"));
    }

    #[tokio::test]
    async fn a_text_submission_always_invalidates_a_speaking_turn() {
        let (_o, registry, _transcript, _queue, _notify, text_tx, _ended) = build(
            ScriptedAsrService::new(["hello"]),
            ScriptedGeneratorService::new([
                "Speaking for quite a while now. [pause:0.3s] Still going.",
                "Got it.",
            ]),
            ScriptedTtsService::new([true, true, true]),
        );

        text_tx.send(("first".to_string(), false)).unwrap();
        tokio::time::sleep(Duration::from_millis(20)).await;
        let turn_before = registry.current();

        text_tx.send(("second".to_string(), false)).unwrap();
        tokio::time::sleep(Duration::from_millis(20)).await;

        assert!(registry.current().0 > turn_before.0);
    }

    #[tokio::test]
    async fn a_session_expired_failure_trips_the_session_ended_signal() {
        let (_o, _registry, transcript, queue, notify, _text_tx, mut ended) = build(
            ScriptedAsrService::new_results([Err(voice_agent_transport::TransportError::SessionExpired)]),
            ScriptedGeneratorService::default(),
            ScriptedTtsService::default(),
        );

        assert!(!*ended.borrow());

        queue.push(blob());
        notify.notify_one();

        tokio::time::timeout(Duration::from_millis(200), ended.changed())
            .await
            .expect("session_ended should fire")
            .unwrap();
        assert!(*ended.borrow());

        // SessionExpired is user-visible per §7 (unlike Invalidated).
        assert!(transcript
            .snapshot()
            .iter()
            .any(|e| e.text.contains("reconnect")));
    }

    #[tokio::test]
    async fn empty_transcription_resets_state_so_the_next_blob_opens_a_fresh_turn() {
        let (_o, registry, transcript, queue, notify, _text_tx, _ended) = build(
            ScriptedAsrService::new(["", "hi"]),
            ScriptedGeneratorService::new(["Reply"]),
            ScriptedTtsService::new([true]),
        );

        queue.push(blob());
        notify.notify_one();
        tokio::time::sleep(Duration::from_millis(50)).await;

        // An empty ASR result abandons the turn; the registry must not keep
        // reporting it as active, or the next blob ("hi", below the 3-char
        // barge-in floor) would be silently dropped instead of opening its
        // own fresh turn.
        assert!(!registry.state().is_active());

        queue.push(blob());
        notify.notify_one();
        tokio::time::sleep(Duration::from_millis(50)).await;

        assert!(transcript.snapshot().iter().any(|e| e.text == "Reply"));
    }

    #[tokio::test]
    async fn a_generator_failure_abandons_the_turn() {
        let (_o, registry, transcript, queue, notify, _text_tx, _ended) = build(
            ScriptedAsrService::new(["first", "second"]),
            ScriptedGeneratorService::new_results([
                Err(voice_agent_transport::TransportError::Generation("boom".to_string())),
                Ok("Reply".to_string()),
            ]),
            ScriptedTtsService::new([true]),
        );

        queue.push(blob());
        notify.notify_one();
        tokio::time::sleep(Duration::from_millis(50)).await;

        assert!(!registry.state().is_active());

        queue.push(blob());
        notify.notify_one();
        tokio::time::sleep(Duration::from_millis(50)).await;

        assert!(transcript.snapshot().iter().any(|e| e.text == "Reply"));
    }

    /// Delays before delegating to a `ScriptedGeneratorService`, giving a
    /// test a window to push a second blob while the turn is still
    /// `Generating` (i.e. before any audio exists to interrupt).
    struct SlowGeneratorService {
        delay: Duration,
        inner: ScriptedGeneratorService,
    }

    #[async_trait]
    impl voice_agent_transport::GeneratorService for SlowGeneratorService {
        async fn generate(
            &self,
            credentials: &SessionCredentials,
            context: &[String],
            input: &str,
            proactive: bool,
        ) -> Result<String, voice_agent_transport::TransportError> {
            tokio::time::sleep(self.delay).await;
            self.inner.generate(credentials, context, input, proactive).await
        }
    }

    #[tokio::test]
    async fn a_blob_during_generation_does_not_open_a_second_turn() {
        let registry = Arc::new(TurnRegistry::new());
        let capture_queue = Arc::new(CaptureQueue::new(2));
        let playback = PlaybackController::new(Arc::new(SilentSink));
        let vad = vad();
        let transcript = Arc::new(Transcript::new());

        let synthesizer = Arc::new(SynthesizerDriver::new(
            Arc::new(ScriptedTtsService::new([true])),
            playback.clone(),
            vad.clone(),
            registry.clone(),
            transcript.clone(),
            voice_agent_config::SynthesizerConfig {
                max_retries_per_segment: 1,
                base_backoff_ms: 1,
                max_backoff_ms: 2,
                short_segment_chars: 40,
                pause_scale_factor: 0.5,
                min_adjusted_pause_ms: 150,
            },
        ));

        let (events_tx, _events_rx) = mpsc::unbounded_channel();
        let (_text_tx, text_rx) = mpsc::unbounded_channel();
        let activity = Arc::new(Notify::new());
        let ui = Arc::new(UiSignals::default());
        let (session_ended_tx, _session_ended_rx) = watch::channel(false);

        let orchestrator = TurnOrchestrator::new(
            registry.clone(),
            capture_queue.clone(),
            playback,
            vad,
            Arc::new(ScriptedAsrService::new(["first", "second"])),
            Arc::new(SlowGeneratorService {
                delay: Duration::from_millis(100),
                inner: ScriptedGeneratorService::new(["Reply one."]),
            }),
            synthesizer,
            transcript.clone(),
            SessionCredentials::new(SessionId("s".into()), "secret"),
            BargeInConfig {
                min_interrupt_chars: 3,
            },
            ui,
            events_tx,
            activity,
            session_ended_tx,
        );

        let capture_notify = Arc::new(Notify::new());
        let o = orchestrator.clone();
        let cn = capture_notify.clone();
        tokio::spawn(async move {
            o.run(text_rx, cn).await;
        });

        capture_queue.push(blob());
        capture_notify.notify_one();
        tokio::time::sleep(Duration::from_millis(20)).await;
        let turn_before = registry.current();
        assert_eq!(registry.state(), TurnState::Generating);

        // "second" clears the 3-char barge-in floor, but there is no audio
        // playing yet to interrupt — it must not open a second turn.
        capture_queue.push(blob());
        capture_notify.notify_one();
        tokio::time::sleep(Duration::from_millis(50)).await;

        assert_eq!(registry.current(), turn_before);
        assert!(transcript.snapshot().iter().any(|e| e.text == "second"));

        tokio::time::sleep(Duration::from_millis(150)).await;
        assert!(transcript.snapshot().iter().any(|e| e.text == "Reply one."));
    }
}
