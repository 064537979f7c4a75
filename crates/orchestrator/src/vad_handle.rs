//! A shared handle onto a [`VoiceActivityDetector`]
//!
//! The detector's own trait is `&mut self` (it is a tight per-frame state
//! machine with no reason to pay for interior mutability by default — see
//! `voice_agent_pipeline::vad`). But `SuppressFor`/`Resume` must be callable
//! from the Synthesizer Driver and the Turn Orchestrator while the capture
//! loop is concurrently feeding it frames on its own task. One
//! `parking_lot::Mutex` resolves that; contention is low for the same reason
//! the Capture Queue's is (Design Notes, "Concurrency model") — the frame
//! loop calls in are short, and suppress/resume calls are rare relative to
//! the 10ms frame cadence.

use std::sync::Arc;
use std::time::Duration;

use parking_lot::Mutex;
use voice_agent_core::AudioFrame;
use voice_agent_pipeline::{AudioSource, CaptureQueue, VadEvent, VoiceActivityDetector};

pub struct VadHandle<V> {
    inner: Arc<Mutex<V>>,
}

impl<V> Clone for VadHandle<V> {
    fn clone(&self) -> Self {
        Self {
            inner: self.inner.clone(),
        }
    }
}

impl<V: VoiceActivityDetector + 'static> VadHandle<V> {
    pub fn new(vad: V) -> Self {
        Self {
            inner: Arc::new(Mutex::new(vad)),
        }
    }

    pub fn suppress_for(&self, duration: Duration) {
        self.inner.lock().suppress_for(duration);
    }

    pub fn resume(&self) {
        self.inner.lock().resume();
    }

    pub fn stop(&self) {
        self.inner.lock().stop();
    }

    /// Drive the detector from `source` until it yields no more frames
    /// (device closed) or the session tears down, pushing every completed
    /// utterance onto `queue` and waking `notify` so the Orchestrator's main
    /// loop drains it. Runs as its own blocking task — `next_frame` is a
    /// synchronous device read (Design Notes, "microphone capture + VAD
    /// frame loop" is one of the concurrent activities in §5).
    pub fn run_capture_loop(
        self,
        mut source: impl AudioSource + 'static,
        queue: Arc<CaptureQueue>,
        notify: Arc<tokio::sync::Notify>,
    ) -> tokio::task::JoinHandle<()>
    where
        V: Send,
    {
        tokio::task::spawn_blocking(move || {
            while let Some(frame) = source.next_frame() {
                let event = self.inner.lock().process_frame(&frame);
                match event {
                    Some(VadEvent::SpeechStarted) => {}
                    Some(VadEvent::SpeechEnded(blob)) => {
                        queue.push(blob);
                        notify.notify_one();
                    }
                    None => {}
                }
            }
        })
    }
}
