//! Voice Activity Detector (§4.1)
//!
//! A hysteresis energy detector, not a learned model: two thresholds, a
//! min-duration floor, and a max-gap timeout. The detector is the sole owner
//! of the microphone stream (Design Notes, "Ownership") and is suppressible
//! during playback so the agent never transcribes itself.

use std::collections::VecDeque;
use std::time::Duration;

use voice_agent_config::VadConfig;
use voice_agent_core::AudioFrame;

use crate::capture_queue::CapturedBlob;

/// A collaborator that yields raw microphone frames. Narrower than the full
/// VAD contract so tests can drive the detector without a real device.
pub trait AudioSource: Send {
    fn next_frame(&mut self) -> Option<AudioFrame>;
}

/// The detector's own state machine (§4.1). `SpeechStart` and `SpeechEnd` are
/// the hysteresis-accumulation substates; callers outside this module mostly
/// care about `Silence` vs. everything else.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum VadState {
    #[default]
    Silence,
    SpeechStart,
    Speech,
    SpeechEnd,
}

/// Signals the detector emits while unsuppressed.
#[derive(Debug, Clone)]
pub enum VadEvent {
    /// The smoothed level first exceeded `startThreshold`.
    SpeechStarted,
    /// Speech ended and met `minSpeechDuration` — a blob is ready for the
    /// Capture Queue.
    SpeechEnded(CapturedBlob),
}

/// The VAD's external contract (§4.1): `Start`/`Stop`/`SuppressFor`/`Resume`
/// plus per-frame processing. Implemented here by [`HysteresisVad`]; a test
/// double can implement it directly without touching any audio hardware.
pub trait VoiceActivityDetector: Send {
    /// Feed one frame; returns a signal if one fires (never while suppressed).
    fn process_frame(&mut self, frame: &AudioFrame) -> Option<VadEvent>;

    /// Disable speech detection and new-blob emission for `duration`.
    /// Re-entrant: a later call that extends past the current suppression
    /// wins (§8, "Stop/SuppressFor idempotence").
    fn suppress_for(&mut self, duration: Duration);

    /// Cancel any outstanding suppression immediately (used for barge-in
    /// reaction).
    fn resume(&mut self);

    /// Release all resources; idempotent.
    fn stop(&mut self);

    fn state(&self) -> VadState;
}

/// Energy-hysteresis implementation of [`VoiceActivityDetector`].
pub struct HysteresisVad {
    config: VadConfig,
    window: VecDeque<f32>,
    state: VadState,
    buffer: Vec<AudioFrame>,
    elapsed_ms: u64,
    gap_ms: u64,
    suppressed_until: Option<std::time::Instant>,
    stopped: bool,
}

impl HysteresisVad {
    pub fn new(config: VadConfig) -> Self {
        Self {
            config,
            window: VecDeque::with_capacity(config.smoothing_frames),
            state: VadState::Silence,
            buffer: Vec::new(),
            elapsed_ms: 0,
            gap_ms: 0,
            suppressed_until: None,
            stopped: false,
        }
    }

    fn is_suppressed(&self) -> bool {
        matches!(self.suppressed_until, Some(until) if std::time::Instant::now() < until)
    }

    fn smoothed_level(&mut self, energy_db: f32) -> f32 {
        if self.window.len() == self.config.smoothing_frames.max(1) {
            self.window.pop_front();
        }
        self.window.push_back(energy_db);
        self.window.iter().sum::<f32>() / self.window.len() as f32
    }

    fn reset_accumulation(&mut self) {
        self.buffer.clear();
        self.elapsed_ms = 0;
        self.gap_ms = 0;
        self.state = VadState::Silence;
    }
}

impl VoiceActivityDetector for HysteresisVad {
    fn process_frame(&mut self, frame: &AudioFrame) -> Option<VadEvent> {
        if self.stopped {
            return None;
        }

        let smoothed = self.smoothed_level(frame.energy_db);
        let suppressed = self.is_suppressed();
        let frame_ms = frame.duration_ms();

        match self.state {
            VadState::Silence => {
                if !suppressed && smoothed > self.config.start_threshold_db {
                    self.state = VadState::Speech;
                    self.buffer.clear();
                    self.buffer.push(frame.clone());
                    self.elapsed_ms = frame_ms;
                    self.gap_ms = 0;
                    return Some(VadEvent::SpeechStarted);
                }
                None
            }
            VadState::Speech | VadState::SpeechStart | VadState::SpeechEnd => {
                self.buffer.push(frame.clone());
                self.elapsed_ms += frame_ms;

                if smoothed > self.config.stop_threshold_db {
                    self.gap_ms = 0;
                    self.state = VadState::Speech;
                    return None;
                }

                self.gap_ms += frame_ms;
                if self.gap_ms < self.config.max_gap_ms as u64 {
                    self.state = VadState::SpeechEnd;
                    return None;
                }

                let elapsed = self.elapsed_ms;
                let frames = std::mem::take(&mut self.buffer);
                self.reset_accumulation();

                if elapsed < self.config.min_speech_ms as u64 {
                    return None;
                }

                if suppressed {
                    return None;
                }

                Some(VadEvent::SpeechEnded(CapturedBlob::from_frames(frames)))
            }
        }
    }

    fn suppress_for(&mut self, duration: Duration) {
        let candidate = std::time::Instant::now() + duration;
        self.suppressed_until = Some(match self.suppressed_until {
            Some(existing) if existing > candidate => existing,
            _ => candidate,
        });
    }

    fn resume(&mut self) {
        self.suppressed_until = None;
    }

    fn stop(&mut self) {
        self.stopped = true;
        self.reset_accumulation();
    }

    fn state(&self) -> VadState {
        self.state
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use voice_agent_core::{Channels, SampleRate};

    fn frame(energy_db: f32, samples: usize) -> AudioFrame {
        // Construct a frame whose computed energy_db is close to `energy_db`
        // by scaling a constant-amplitude signal; exact value isn't load
        // bearing for these tests, only its position relative to thresholds.
        let amplitude = 10f32.powf(energy_db / 20.0).min(1.0);
        let data: Vec<f32> = vec![amplitude; samples];
        AudioFrame::new(data, SampleRate::Hz16000, Channels::Mono, 0)
    }

    fn cfg() -> VadConfig {
        VadConfig {
            start_threshold_db: -10.0,
            stop_threshold_db: -20.0,
            min_speech_ms: 50,
            max_gap_ms: 30,
            smoothing_frames: 1,
        }
    }

    #[test]
    fn silence_emits_nothing() {
        let mut vad = HysteresisVad::new(cfg());
        let quiet = frame(-60.0, 160);
        assert!(vad.process_frame(&quiet).is_none());
        assert_eq!(vad.state(), VadState::Silence);
    }

    #[test]
    fn loud_frame_starts_speech() {
        let mut vad = HysteresisVad::new(cfg());
        let loud = frame(0.0, 160);
        let event = vad.process_frame(&loud);
        assert!(matches!(event, Some(VadEvent::SpeechStarted)));
    }

    #[test]
    fn short_utterance_is_discarded_as_noise() {
        let mut vad = HysteresisVad::new(cfg());
        let loud = frame(0.0, 160); // 10ms at 16kHz
        assert!(vad.process_frame(&loud).is_some());
        // Drop straight to silence; total speech so far is ~10ms < 50ms floor.
        let quiet = frame(-60.0, 160);
        for _ in 0..4 {
            let ev = vad.process_frame(&quiet);
            if let Some(VadEvent::SpeechEnded(_)) = ev {
                panic!("expected the short utterance to be discarded, not emitted");
            }
        }
        assert_eq!(vad.state(), VadState::Silence);
    }

    #[test]
    fn long_utterance_emits_a_blob() {
        let mut vad = HysteresisVad::new(cfg());
        let loud = frame(0.0, 160);
        assert!(vad.process_frame(&loud).is_some());
        for _ in 0..7 {
            vad.process_frame(&loud);
        }
        let quiet = frame(-60.0, 160);
        let mut saw_blob = false;
        for _ in 0..6 {
            if let Some(VadEvent::SpeechEnded(_)) = vad.process_frame(&quiet) {
                saw_blob = true;
                break;
            }
        }
        assert!(saw_blob);
    }

    #[test]
    fn suppression_silences_events_but_still_consumes_frames() {
        let mut vad = HysteresisVad::new(cfg());
        vad.suppress_for(Duration::from_secs(10));
        let loud = frame(0.0, 160);
        assert!(vad.process_frame(&loud).is_none());
    }

    #[test]
    fn resume_cancels_suppression() {
        let mut vad = HysteresisVad::new(cfg());
        vad.suppress_for(Duration::from_secs(10));
        vad.resume();
        let loud = frame(0.0, 160);
        assert!(vad.process_frame(&loud).is_some());
    }

    #[test]
    fn a_later_longer_suppression_wins_over_an_earlier_shorter_one() {
        let mut vad = HysteresisVad::new(cfg());
        vad.suppress_for(Duration::from_millis(10));
        vad.suppress_for(Duration::from_secs(10));
        std::thread::sleep(Duration::from_millis(20));
        // Still suppressed because the longer call should dominate.
        let loud = frame(0.0, 160);
        assert!(vad.process_frame(&loud).is_none());
    }

    #[test]
    fn stop_is_idempotent() {
        let mut vad = HysteresisVad::new(cfg());
        vad.stop();
        vad.stop();
        let loud = frame(0.0, 160);
        assert!(vad.process_frame(&loud).is_none());
    }
}
