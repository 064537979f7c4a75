//! Append-only transcript of a session
//!
//! An ordered sequence of {speaker, text, timestamp, optional turn id,
//! optional segment index} (§3, *Transcript Entry*). Entries are never
//! mutated or removed once appended.

use crate::turn::TurnId;
use chrono::{DateTime, Utc};
use parking_lot::RwLock;
use serde::{Deserialize, Serialize};

/// Who produced a transcript entry.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Speaker {
    User,
    Agent,
    /// A one-line system notice (§7): failures, reconnect prompts, etc.
    /// Never carries internal error detail.
    System,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TranscriptEntry {
    pub speaker: Speaker,
    pub text: String,
    pub timestamp: DateTime<Utc>,
    pub turn_id: Option<TurnId>,
    pub segment_index: Option<usize>,
}

impl TranscriptEntry {
    pub fn user(text: impl Into<String>, turn_id: TurnId) -> Self {
        Self {
            speaker: Speaker::User,
            text: text.into(),
            timestamp: Utc::now(),
            turn_id: Some(turn_id),
            segment_index: None,
        }
    }

    pub fn agent_segment(text: impl Into<String>, turn_id: TurnId, segment_index: usize) -> Self {
        Self {
            speaker: Speaker::Agent,
            text: text.into(),
            timestamp: Utc::now(),
            turn_id: Some(turn_id),
            segment_index: Some(segment_index),
        }
    }

    pub fn system(text: impl Into<String>) -> Self {
        Self {
            speaker: Speaker::System,
            text: text.into(),
            timestamp: Utc::now(),
            turn_id: None,
            segment_index: None,
        }
    }
}

/// Append-only, globally-time-ordered transcript for one session.
///
/// A single `RwLock` is the append lock described in §5 ("Transcript: appends
/// only ... an append lock"); contention is low since the Orchestrator and
/// Synthesizer Driver serialize through the Orchestrator's own loop (they
/// never append concurrently from two different turns, by Invariant T2).
#[derive(Default)]
pub struct Transcript {
    entries: RwLock<Vec<TranscriptEntry>>,
}

impl Transcript {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn append(&self, entry: TranscriptEntry) {
        self.entries.write().push(entry);
    }

    pub fn snapshot(&self) -> Vec<TranscriptEntry> {
        self.entries.read().clone()
    }

    pub fn len(&self) -> usize {
        self.entries.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.read().is_empty()
    }

    /// Recent lines, oldest first, suitable for the opaque `context` bag
    /// handed verbatim to the Generator Service (§6).
    pub fn recent_lines(&self, limit: usize) -> Vec<String> {
        let entries = self.entries.read();
        let start = entries.len().saturating_sub(limit);
        entries[start..]
            .iter()
            .map(|e| {
                let who = match e.speaker {
                    Speaker::User => "user",
                    Speaker::Agent => "agent",
                    Speaker::System => "system",
                };
                format!("{who}: {}", e.text)
            })
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn appends_are_ordered() {
        let t = Transcript::new();
        t.append(TranscriptEntry::user("hello", TurnId(1)));
        t.append(TranscriptEntry::agent_segment("hi there", TurnId(1), 0));

        let snap = t.snapshot();
        assert_eq!(snap.len(), 2);
        assert!(matches!(snap[0].speaker, Speaker::User));
        assert!(matches!(snap[1].speaker, Speaker::Agent));
    }

    #[test]
    fn recent_lines_respects_limit() {
        let t = Transcript::new();
        for i in 0..5 {
            t.append(TranscriptEntry::user(format!("msg{i}"), TurnId(1)));
        }
        assert_eq!(t.recent_lines(2).len(), 2);
        assert_eq!(t.recent_lines(100).len(), 5);
    }
}
