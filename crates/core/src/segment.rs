//! Pause-token segmentation grammar
//!
//! This is the single, normative definition of how an agent reply is split
//! into segments (Invariant R1). Both the Pause-Aware Synthesizer Driver and
//! the transcript renderer call [`segment`] — there must never be a second,
//! slightly-different regex for this living at another call site (Design
//! Notes: "ad-hoc string regexes for pause tokens duplicated in multiple
//! call sites").

use once_cell::sync::Lazy;
use regex::Regex;
use serde::{Deserialize, Serialize};
use std::time::Duration;

/// The literal pause-token grammar from §6: `[pause:<seconds>s]`,
/// case-insensitive, with an optional trailing `s`.
static PAUSE_TOKEN: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?i)\[pause:(\d+(?:\.\d+)?)s?\]").expect("pause token regex"));

/// A maximal contiguous span of non-pause text within an agent reply (§3,
/// Glossary).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Segment {
    /// Position of this segment within the reply (0-based).
    pub index: usize,
    /// The segment's text, with pause tokens already stripped.
    pub text: String,
    /// Silence to hold after this segment, taken from the pause token that
    /// immediately follows it in the reply (0 if there is none).
    pub pause_after: Duration,
}

impl Segment {
    pub fn is_empty(&self) -> bool {
        self.text.trim().is_empty()
    }
}

/// Split an agent reply into its ordered segments.
///
/// This is a pure function of `reply` (Invariant R1): equal inputs always
/// produce equal outputs, and nothing here touches turn state, the clock, or
/// I/O. Runs of text between pause tokens (or between a pause token and a
/// string boundary) become segments; empty runs are dropped, but a
/// pause-after duration is still attached to the segment immediately
/// preceding the token.
pub fn segment(reply: &str) -> Vec<Segment> {
    let mut segments: Vec<Segment> = Vec::new();
    let mut last_end = 0;

    for caps in PAUSE_TOKEN.captures_iter(reply) {
        let whole = caps.get(0).expect("capture group 0 always present");
        let text = reply[last_end..whole.start()].trim();
        let seconds: f64 = caps[1].parse().unwrap_or(0.0);
        let pause = Duration::from_secs_f64(seconds.max(0.0));
        last_end = whole.end();

        if text.is_empty() {
            // Nothing between the previous token (or the start) and this
            // one — e.g. two pause tokens back to back, or a pause-only
            // reply. There is no segment to attach the pause to, so it is
            // dropped: "a reply consisting of only a pause token produces
            // no transcript entries and no audio" (§8, Boundary behaviors).
            continue;
        }

        segments.push(Segment {
            index: segments.len(),
            text: text.to_string(),
            pause_after: pause,
        });
    }

    let trailing = reply[last_end..].trim();
    if !trailing.is_empty() {
        segments.push(Segment {
            index: segments.len(),
            text: trailing.to_string(),
            pause_after: Duration::ZERO,
        });
    }

    segments
}

/// Render a segment list back into a reply string, re-inserting the pause
/// tokens this crate produces. Used by the round-trip law in §8:
/// `segment(join(segments_of(r))) = segments_of(r)`.
pub fn join(segments: &[Segment]) -> String {
    let mut out = String::new();
    for (i, s) in segments.iter().enumerate() {
        if i > 0 {
            out.push(' ');
        }
        out.push_str(&s.text);
        if s.pause_after > Duration::ZERO {
            out.push_str(&format!(" [pause:{}s]", s.pause_after.as_secs_f64()));
        }
    }
    out
}

/// Comedic-transition markers that preserve or extend a pause rather than
/// letting it be scaled down for conversational flow (§4.5.1).
const TRANSITION_MARKERS: &[&str] = &["but", "however", "actually", "plot twist", "wait"];

fn contains_marker(text: &str) -> bool {
    let lower = text.to_lowercase();
    TRANSITION_MARKERS
        .iter()
        .any(|marker| lower.contains(marker))
}

/// Tunable thresholds for [`adjust_pause`], owned by
/// `voice_agent_config::SynthesizerConfig` and threaded through by the
/// Synthesizer Driver — §4.5.1 fixes the rule's shape, not its numbers.
#[derive(Debug, Clone, Copy)]
pub struct PauseAdjustment {
    /// Length below which a segment is considered "short".
    pub short_segment_chars: usize,
    /// Scale factor applied to the declared pause when both neighbors are
    /// short and neither carries a transition marker.
    pub scale_factor: f64,
    /// Floor below which an adjusted pause is never scaled.
    pub min_adjusted_pause: Duration,
}

/// Deterministic pause-duration adjustment (§4.5, "pause adjustment" design
/// rule): a declared pause between two short segments with no transition
/// marker on either side is scaled down to favor natural flow; otherwise the
/// declared duration is kept unscaled.
///
/// A pure function of `(original, previous_segment_text, next_segment_text,
/// rule)` — the same inputs always produce the same adjusted duration.
pub fn adjust_pause(
    original: Duration,
    previous_text: &str,
    next_text: &str,
    rule: PauseAdjustment,
) -> Duration {
    let both_short = previous_text.len() < rule.short_segment_chars
        && next_text.len() < rule.short_segment_chars;
    let has_marker = contains_marker(previous_text) || contains_marker(next_text);

    if both_short && !has_marker {
        let scaled = original.mul_f64(rule.scale_factor);
        scaled.max(rule.min_adjusted_pause.min(original))
    } else {
        original
    }
}
