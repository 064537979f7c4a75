//! Playback Controller (§4.4)
//!
//! Sole owner of the audio output device while a segment plays (Design
//! Notes, "Ownership"). `play` returns as soon as playback is accepted;
//! completion is observed through a one-shot channel that resolves exactly
//! once, whether playback finished naturally or was cut short by `stop()`
//! (§8, "Stop is idempotent"; Invariant P2 below).

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use async_trait::async_trait;
use parking_lot::Mutex;
use tokio::sync::{oneshot, watch};
use voice_agent_core::AudioFrame;

use crate::PipelineError;

/// The real (or fake, in tests) audio output device. `stop` resolves to
/// `true` once the caller has asked playback to end early.
#[async_trait]
pub trait AudioSink: Send + Sync {
    async fn play(&self, audio: AudioFrame, stop: watch::Receiver<bool>) -> Result<(), PipelineError>;
}

/// The outcome of one `play()` call, observed exactly once.
pub struct PlaybackHandle {
    done: oneshot::Receiver<Result<(), PipelineError>>,
}

impl PlaybackHandle {
    pub async fn on_done(self) -> Result<(), PipelineError> {
        match self.done.await {
            Ok(result) => result,
            // The controller task was dropped without sending — treat as a
            // clean stop rather than panicking callers.
            Err(_) => Ok(()),
        }
    }
}

pub struct PlaybackController<S: AudioSink + 'static> {
    sink: Arc<S>,
    playing: AtomicBool,
    stop_tx: Mutex<Option<watch::Sender<bool>>>,
}

impl<S: AudioSink + 'static> PlaybackController<S> {
    pub fn new(sink: Arc<S>) -> Arc<Self> {
        Arc::new(Self {
            sink,
            playing: AtomicBool::new(false),
            stop_tx: Mutex::new(None),
        })
    }

    /// Begin playing `audio`; returns immediately. Completion is observed via
    /// the returned handle's `on_done()`.
    pub fn play(self: &Arc<Self>, audio: AudioFrame) -> PlaybackHandle {
        let (stop_tx, stop_rx) = watch::channel(false);
        *self.stop_tx.lock() = Some(stop_tx);
        self.playing.store(true, Ordering::SeqCst);

        let (done_tx, done_rx) = oneshot::channel();
        let sink = self.sink.clone();
        let controller = self.clone();

        tokio::spawn(async move {
            let result = sink.play(audio, stop_rx).await;
            controller.playing.store(false, Ordering::SeqCst);
            let _ = done_tx.send(result);
        });

        PlaybackHandle { done: done_rx }
    }

    /// Halt playback and reset the output; idempotent.
    pub fn stop(&self) {
        if let Some(tx) = self.stop_tx.lock().as_ref() {
            let _ = tx.send(true);
        }
    }

    pub fn is_playing(&self) -> bool {
        self.playing.load(Ordering::SeqCst)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::AtomicUsize;
    use voice_agent_core::{Channels, SampleRate};

    struct FakeSink {
        play_calls: AtomicUsize,
    }

    #[async_trait]
    impl AudioSink for FakeSink {
        async fn play(&self, _audio: AudioFrame, mut stop: watch::Receiver<bool>) -> Result<(), PipelineError> {
            self.play_calls.fetch_add(1, Ordering::SeqCst);
            tokio::select! {
                _ = tokio::time::sleep(std::time::Duration::from_millis(50)) => Ok(()),
                _ = stop.changed() => Ok(()),
            }
        }
    }

    fn silent_frame() -> AudioFrame {
        AudioFrame::new(vec![0.0; 160], SampleRate::Hz16000, Channels::Mono, 0)
    }

    #[tokio::test]
    async fn play_resolves_on_natural_completion() {
        let sink = Arc::new(FakeSink {
            play_calls: AtomicUsize::new(0),
        });
        let controller = PlaybackController::new(sink);
        let handle = controller.play(silent_frame());
        assert!(handle.on_done().await.is_ok());
        assert!(!controller.is_playing());
    }

    #[tokio::test]
    async fn stop_resolves_on_done_early_and_is_idempotent() {
        let sink = Arc::new(FakeSink {
            play_calls: AtomicUsize::new(0),
        });
        let controller = PlaybackController::new(sink);
        let handle = controller.play(silent_frame());
        controller.stop();
        controller.stop(); // idempotent
        assert!(handle.on_done().await.is_ok());
    }

    #[tokio::test]
    async fn on_done_fires_exactly_once() {
        let sink = Arc::new(FakeSink {
            play_calls: AtomicUsize::new(0),
        });
        let controller = PlaybackController::new(sink);
        let handle = controller.play(silent_frame());
        // Consuming the handle is itself the only way to observe `onDone`;
        // a second observation is impossible by construction (the receiver
        // is moved into `on_done`), which is the property P2 requires.
        handle.on_done().await.unwrap();
    }
}
