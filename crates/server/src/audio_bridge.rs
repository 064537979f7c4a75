//! Audio bridge between one WebSocket connection and the mechanical pipeline
//!
//! The Turn Orchestrator's [`AudioSource`]/[`AudioSink`] traits are written
//! against a local device (Design Notes, "microphone capture + VAD frame
//! loop"); at this boundary the "device" is the browser on the other end of
//! the socket. [`WsAudioSource`] turns inbound binary frames into the blocking
//! `next_frame` pull the capture loop expects; [`WsAudioSink`] turns a
//! synthesized [`AudioFrame`] into an outbound message and waits out the
//! frame's own duration (or an early `stop`) before reporting done, since
//! there is no device-level completion callback to observe over a socket.

use std::sync::mpsc as std_mpsc;
use std::time::Duration;

use async_trait::async_trait;
use tokio::sync::{mpsc, watch};

use voice_agent_core::AudioFrame;
use voice_agent_pipeline::{AudioSink, AudioSource, PipelineError};

/// Fed by the WebSocket reader task; polled (blocking) from the VAD's
/// `spawn_blocking` capture loop.
pub struct WsAudioSource {
    rx: std_mpsc::Receiver<AudioFrame>,
}

impl WsAudioSource {
    pub fn new(rx: std_mpsc::Receiver<AudioFrame>) -> Self {
        Self { rx }
    }
}

impl AudioSource for WsAudioSource {
    fn next_frame(&mut self) -> Option<AudioFrame> {
        self.rx.recv().ok()
    }
}

/// Drained by the WebSocket writer task; each PCM16 payload becomes one
/// outbound `ResponseAudio` message.
pub struct WsAudioSink {
    tx: mpsc::UnboundedSender<Vec<u8>>,
}

impl WsAudioSink {
    pub fn new(tx: mpsc::UnboundedSender<Vec<u8>>) -> Self {
        Self { tx }
    }
}

#[async_trait]
impl AudioSink for WsAudioSink {
    async fn play(&self, audio: AudioFrame, mut stop: watch::Receiver<bool>) -> Result<(), PipelineError> {
        if self.tx.send(audio.to_pcm16()).is_err() {
            // Connection already closed; nothing more we can do for this segment.
            return Ok(());
        }

        let duration = Duration::from_millis(audio.duration_ms());
        tokio::select! {
            _ = tokio::time::sleep(duration) => {}
            _ = stop.changed() => {}
        }
        Ok(())
    }
}
