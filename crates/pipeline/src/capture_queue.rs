//! Capture Queue (§4.2)
//!
//! Decouples the real-time VAD producer from the variable-latency
//! Orchestrator consumer while bounding memory and staleness. A single
//! `parking_lot::Mutex` guards push/pop/coalesce — contention is low because
//! producer and consumer are each a single task (Design Notes,
//! "Concurrency model").

use std::collections::VecDeque;

use parking_lot::Mutex;
use voice_agent_core::AudioFrame;

/// A self-contained, immutable payload representing one user utterance as
/// delimited by the VAD (§3, Glossary).
#[derive(Debug, Clone)]
pub struct CapturedBlob {
    frames: std::sync::Arc<[AudioFrame]>,
}

impl CapturedBlob {
    pub fn from_frames(frames: Vec<AudioFrame>) -> Self {
        Self {
            frames: frames.into(),
        }
    }

    pub fn frames(&self) -> &[AudioFrame] {
        &self.frames
    }

    pub fn duration_ms(&self) -> u64 {
        self.frames.iter().map(|f| f.duration_ms()).sum()
    }
}

/// Bounded FIFO with coalesce-on-overflow (§4.2, Invariant Q1).
///
/// `Push` beyond the bound `N` discards every existing entry and retains
/// only the newest — old utterances are no longer semantically relevant once
/// the Orchestrator falls behind far enough to hit the bound.
pub struct CaptureQueue {
    max_len: usize,
    entries: Mutex<VecDeque<CapturedBlob>>,
}

impl CaptureQueue {
    pub fn new(max_len: usize) -> Self {
        Self {
            max_len: max_len.max(1),
            entries: Mutex::new(VecDeque::with_capacity(max_len.max(1))),
        }
    }

    /// Enqueue a freshly captured blob, coalescing if the bound is exceeded.
    pub fn push(&self, blob: CapturedBlob) {
        let mut entries = self.entries.lock();
        if entries.len() >= self.max_len {
            entries.clear();
        }
        entries.push_back(blob);
    }

    /// Pop the oldest blob, or `None` if the queue is empty. Callers that
    /// need to block until one arrives should pair this with a notification
    /// channel (the Orchestrator's main loop does).
    pub fn pop(&self) -> Option<CapturedBlob> {
        self.entries.lock().pop_front()
    }

    pub fn len(&self) -> usize {
        self.entries.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.lock().is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use voice_agent_core::{Channels, SampleRate};

    fn blob(seq: u64) -> CapturedBlob {
        CapturedBlob::from_frames(vec![AudioFrame::new(
            vec![0.1; 160],
            SampleRate::Hz16000,
            Channels::Mono,
            seq,
        )])
    }

    #[test]
    fn push_pop_is_fifo_within_bound() {
        let q = CaptureQueue::new(2);
        q.push(blob(1));
        q.push(blob(2));
        assert_eq!(q.pop().unwrap().frames()[0].sequence, 1);
        assert_eq!(q.pop().unwrap().frames()[0].sequence, 2);
        assert!(q.pop().is_none());
    }

    #[test]
    fn overflow_coalesces_to_only_the_newest() {
        let q = CaptureQueue::new(2);
        q.push(blob(1));
        q.push(blob(2));
        q.push(blob(3)); // exceeds bound -> drop 1 and 2, keep only 3
        assert_eq!(q.len(), 1);
        assert_eq!(q.pop().unwrap().frames()[0].sequence, 3);
    }

    #[test]
    fn never_returns_a_blob_after_a_strictly_later_push_without_an_intervening_pop() {
        // Invariant Q1
        let q = CaptureQueue::new(3);
        q.push(blob(1));
        q.push(blob(2)); // no pop between pushes
        let popped = q.pop().unwrap();
        assert_eq!(popped.frames()[0].sequence, 1);
    }
}
