//! Turn identity and lifecycle state
//!
//! A turn id is a monotonic, session-local, non-negative integer minted by
//! the Turn Registry (`voice-agent-pipeline`). This module only carries the
//! shared vocabulary — the id type, the lifecycle states, and the pure
//! staleness predicate — so every crate downstream of the registry can speak
//! the same language without depending on the registry's storage.

use serde::{Deserialize, Serialize};
use std::fmt;

/// Monotonic, session-local turn identifier. Never reused (Invariant T1).
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct TurnId(pub u64);

impl TurnId {
    /// The id before any turn has been opened.
    pub const NONE: TurnId = TurnId(0);

    pub fn is_none(&self) -> bool {
        *self == Self::NONE
    }
}

impl fmt::Display for TurnId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Lifecycle states a turn passes through (§3).
///
/// Any state may transition to `Stale` via the invalidation rule (Invariant
/// T3); `Stale` is terminal.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TurnState {
    Opened,
    Transcribing,
    Generating,
    Synthesizing,
    Playing,
    Closed,
    Stale,
}

impl TurnState {
    /// The states counted by Invariant T2 ("at most one turn in flight").
    pub fn is_active(&self) -> bool {
        matches!(
            self,
            TurnState::Transcribing
                | TurnState::Generating
                | TurnState::Synthesizing
                | TurnState::Playing
        )
    }

    pub fn is_terminal(&self) -> bool {
        matches!(self, TurnState::Closed | TurnState::Stale)
    }
}

impl fmt::Display for TurnState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            TurnState::Opened => "opened",
            TurnState::Transcribing => "transcribing",
            TurnState::Generating => "generating",
            TurnState::Synthesizing => "synthesizing",
            TurnState::Playing => "playing",
            TurnState::Closed => "closed",
            TurnState::Stale => "stale",
        };
        write!(f, "{s}")
    }
}

/// Turn-scoped event stream, replacing ad-hoc console logging with a
/// structured sequence the UI Shell (and tests) can observe (§3.1, Design
/// Notes: "structured turn-scoped event stream").
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum TurnEvent {
    Opened { turn_id: TurnId },
    StageEntered { turn_id: TurnId, stage: TurnState },
    StageExited { turn_id: TurnId, stage: TurnState },
    Invalidated { turn_id: TurnId, superseded_by: TurnId },
    Closed { turn_id: TurnId },
}

impl TurnEvent {
    pub fn turn_id(&self) -> TurnId {
        match self {
            TurnEvent::Opened { turn_id }
            | TurnEvent::StageEntered { turn_id, .. }
            | TurnEvent::StageExited { turn_id, .. }
            | TurnEvent::Invalidated { turn_id, .. }
            | TurnEvent::Closed { turn_id } => *turn_id,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn none_is_the_zero_id() {
        assert!(TurnId::NONE.is_none());
        assert!(!TurnId(1).is_none());
    }

    #[test]
    fn active_states_match_invariant_t2() {
        assert!(TurnState::Transcribing.is_active());
        assert!(TurnState::Generating.is_active());
        assert!(TurnState::Synthesizing.is_active());
        assert!(TurnState::Playing.is_active());
        assert!(!TurnState::Opened.is_active());
        assert!(!TurnState::Closed.is_active());
        assert!(!TurnState::Stale.is_active());
    }

    #[test]
    fn ids_order_by_value() {
        assert!(TurnId(1) < TurnId(2));
    }
}
