//! Pause-Aware Synthesizer Driver (§4.5)
//!
//! Converts one agent reply string into sequentially played audio and
//! matching transcript entries. Owns the only retry policy in the system
//! (Design Notes: "retries live only in the Synthesizer Driver"); ASR and the
//! Generator get a single attempt each and simply drop the turn on failure.

use std::sync::Arc;
use std::time::Duration;

use tracing::{debug, warn};

use voice_agent_config::SynthesizerConfig;
use voice_agent_core::{
    adjust_pause, segment, Classify, PauseAdjustment, Segment, SessionCredentials, Transcript,
    TranscriptEntry, TurnId, TurnState,
};
use voice_agent_pipeline::{AudioSink, PlaybackController, TurnRegistry, VoiceActivityDetector};
use voice_agent_transport::TtsService;

use crate::vad_handle::VadHandle;

/// Rough speaking rate used to estimate how long a reply will take to play,
/// so the VAD can be suppressed for the full duration plus a safety margin
/// rather than re-armed and re-suppressed between every segment.
const MS_PER_CHAR: u64 = 60;
const BUDGET_MARGIN: Duration = Duration::from_millis(500);

fn estimate_budget(segments: &[Segment]) -> Duration {
    let text_ms: u64 = segments
        .iter()
        .map(|s| s.text.chars().count() as u64 * MS_PER_CHAR)
        .sum();
    let pause_ms: u64 = segments.iter().map(|s| s.pause_after.as_millis() as u64).sum();
    Duration::from_millis(text_ms + pause_ms) + BUDGET_MARGIN
}

pub struct SynthesizerDriver<TTS, S, V>
where
    TTS: TtsService,
    S: AudioSink + 'static,
    V: VoiceActivityDetector + 'static,
{
    tts: Arc<TTS>,
    playback: Arc<PlaybackController<S>>,
    vad: VadHandle<V>,
    registry: Arc<TurnRegistry>,
    transcript: Arc<Transcript>,
    config: SynthesizerConfig,
}

impl<TTS, S, V> SynthesizerDriver<TTS, S, V>
where
    TTS: TtsService,
    S: AudioSink + 'static,
    V: VoiceActivityDetector + 'static,
{
    pub fn new(
        tts: Arc<TTS>,
        playback: Arc<PlaybackController<S>>,
        vad: VadHandle<V>,
        registry: Arc<TurnRegistry>,
        transcript: Arc<Transcript>,
        config: SynthesizerConfig,
    ) -> Self {
        Self {
            tts,
            playback,
            vad,
            registry,
            transcript,
            config,
        }
    }

    /// Run the segment loop for `reply`, belonging to `turn`. Returns once
    /// every segment has played (or been skipped) or the turn has gone stale
    /// at one of its graceful stopping points (iii, iv, v in §4.6).
    pub async fn speak(&self, reply: &str, turn: TurnId, credentials: &SessionCredentials) {
        let segments = segment(reply);

        if segments.is_empty() {
            // A reply consisting of only a pause token (or nothing at all)
            // produces no transcript entries and no audio; the turn closes
            // normally (§8, Boundary behaviors).
            return;
        }

        self.registry.set_state(turn, TurnState::Synthesizing);
        self.vad.suppress_for(estimate_budget(&segments));

        for (i, seg) in segments.iter().enumerate() {
            // Stopping point (iii): before each segment's synthesis.
            if self.registry.is_stale(turn) {
                break;
            }

            // The transcript append precedes synthesis so R2 holds at the
            // "started" boundary even if this segment never ends up playing.
            self.transcript
                .append(TranscriptEntry::agent_segment(seg.text.clone(), turn, seg.index));

            if let Some(audio) = self.synthesize_with_retry(credentials, &seg.text).await {
                self.registry.set_state(turn, TurnState::Playing);
                let handle = self.playback.play(audio);
                if let Err(err) = handle.on_done().await {
                    warn!(kind = %err.kind(), "playback failed; treating as segment failure");
                }
            } else {
                debug!(segment = seg.index, "segment skipped after TTS retry exhaustion");
            }

            // Stopping point (iv): after each segment's playback.
            if self.registry.is_stale(turn) {
                break;
            }

            if seg.pause_after > Duration::ZERO {
                let next_text = segments.get(i + 1).map(|n| n.text.as_str()).unwrap_or("");
                let rule = PauseAdjustment {
                    short_segment_chars: self.config.short_segment_chars,
                    scale_factor: self.config.pause_scale_factor,
                    min_adjusted_pause: Duration::from_millis(self.config.min_adjusted_pause_ms),
                };
                let adjusted = adjust_pause(seg.pause_after, &seg.text, next_text, rule);
                tokio::time::sleep(adjusted).await;

                // Stopping point (v): inside pause sleeps, re-checked on wake.
                if self.registry.is_stale(turn) {
                    break;
                }
            }
        }

        // Loop exit, normal or stale: re-enable the VAD and clear the
        // speaking state (§4.5, step 4).
        self.vad.resume();
    }

    async fn synthesize_with_retry(
        &self,
        credentials: &SessionCredentials,
        text: &str,
    ) -> Option<voice_agent_core::AudioFrame> {
        let mut attempt = 0u32;
        loop {
            match self.tts.synthesize(credentials, text).await {
                Ok(frame) => return Some(frame),
                Err(err) => {
                    warn!(attempt, error = %err, "TTS synthesis attempt failed");
                    if attempt >= self.config.max_retries_per_segment {
                        return None;
                    }
                    let backoff_ms = self
                        .config
                        .base_backoff_ms
                        .saturating_mul(1u64 << attempt.min(16))
                        .min(self.config.max_backoff_ms);
                    tokio::time::sleep(Duration::from_millis(backoff_ms)).await;
                    attempt += 1;
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use voice_agent_core::session::{SessionCredentials as Creds, SessionId};
    use voice_agent_pipeline::{HysteresisVad, PipelineError};
    use voice_agent_transport::mock::ScriptedTtsService;

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

    fn driver() -> (
        SynthesizerDriver<ScriptedTtsService, SilentSink, HysteresisVad>,
        Arc<TurnRegistry>,
        Arc<Transcript>,
    ) {
        let tts = Arc::new(ScriptedTtsService::new([true, true, true]));
        let playback = PlaybackController::new(Arc::new(SilentSink));
        let vad = VadHandle::new(HysteresisVad::new(voice_agent_config::VadConfig {
            start_threshold_db: -35.0,
            stop_threshold_db: -45.0,
            min_speech_ms: 200,
            max_gap_ms: 300,
            smoothing_frames: 5,
        }));
        let registry = Arc::new(TurnRegistry::new());
        let transcript = Arc::new(Transcript::new());
        let driver = SynthesizerDriver::new(
            tts,
            playback,
            vad,
            registry.clone(),
            transcript.clone(),
            SynthesizerConfig {
                max_retries_per_segment: 2,
                base_backoff_ms: 1,
                max_backoff_ms: 4,
                short_segment_chars: 40,
                pause_scale_factor: 0.5,
                min_adjusted_pause_ms: 150,
            },
        );
        (driver, registry, transcript)
    }

    fn creds() -> Creds {
        Creds::new(SessionId("s".into()), "secret")
    }

    #[tokio::test]
    async fn a_reply_with_no_pause_tokens_plays_as_a_single_segment() {
        let (driver, registry, transcript) = driver();
        let turn = registry.open();
        driver.speak("Hi there, how can I help?", turn, &creds()).await;

        let snap = transcript.snapshot();
        assert_eq!(snap.len(), 1);
        assert_eq!(snap[0].text, "Hi there, how can I help?");
    }

    #[tokio::test]
    async fn a_pause_only_reply_produces_no_transcript_entries() {
        let (driver, registry, transcript) = driver();
        let turn = registry.open();
        driver.speak("[pause:0.5s]", turn, &creds()).await;
        assert!(transcript.is_empty());
    }

    #[tokio::test]
    async fn segments_appear_in_reply_order() {
        let (driver, registry, transcript) = driver();
        let turn = registry.open();
        driver
            .speak("Hi there. [pause:0.01s] How are you?", turn, &creds())
            .await;

        let snap = transcript.snapshot();
        assert_eq!(snap.len(), 2);
        assert_eq!(snap[0].text, "Hi there.");
        assert_eq!(snap[1].text, "How are you?");
        assert_eq!(snap[0].segment_index, Some(0));
        assert_eq!(snap[1].segment_index, Some(1));
    }

    #[tokio::test]
    async fn a_stale_turn_stops_the_loop_between_segments() {
        let (driver, registry, transcript) = driver();
        let turn = registry.open();
        let _superseding = registry.open(); // turn is now stale before speak() starts

        driver
            .speak("Hi there. [pause:0.01s] How are you?", turn, &creds())
            .await;

        // Stopping point (iii) fires before the very first segment.
        assert!(transcript.is_empty());
    }

    #[tokio::test]
    async fn tts_retry_then_skip_keeps_the_transcript_entry_but_drops_no_audio_for_others() {
        let tts = Arc::new(ScriptedTtsService::new([false, false, true, false, false, false, true]));
        let playback = PlaybackController::new(Arc::new(SilentSink));
        let vad = VadHandle::new(HysteresisVad::new(voice_agent_config::VadConfig {
            start_threshold_db: -35.0,
            stop_threshold_db: -45.0,
            min_speech_ms: 200,
            max_gap_ms: 300,
            smoothing_frames: 5,
        }));
        let registry = Arc::new(TurnRegistry::new());
        let transcript = Arc::new(Transcript::new());
        let driver = SynthesizerDriver::new(
            tts.clone(),
            playback,
            vad,
            registry.clone(),
            transcript.clone(),
            SynthesizerConfig {
                max_retries_per_segment: 2,
                base_backoff_ms: 1,
                max_backoff_ms: 4,
                short_segment_chars: 40,
                pause_scale_factor: 0.5,
                min_adjusted_pause_ms: 150,
            },
        );

        let turn = registry.open();
        driver
            .speak("One. [pause:0.01s] Two. [pause:0.01s] Three.", turn, &creds())
            .await;

        // Three transcript entries regardless of which segments' audio failed.
        assert_eq!(transcript.snapshot().len(), 3);
        assert_eq!(tts.call_count.load(std::sync::atomic::Ordering::SeqCst), 7);
    }
}
