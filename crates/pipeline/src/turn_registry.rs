//! Turn Registry (§4.3)
//!
//! The monotonic turn counter and current-turn check consulted by every
//! downstream stage. Exclusively owned by the Orchestrator (Design Notes,
//! "Ownership") — nothing else ever calls `open()`.

use std::sync::atomic::{AtomicU32, AtomicU64, Ordering};

use parking_lot::Mutex;
use voice_agent_core::{TurnId, TurnState};

/// Monotonic turn counter plus the state of whichever turn is current.
///
/// `IsStale(turn)` is a direct atomic read (Invariant T1/T2): there is no
/// separate cancellation token to keep in sync, just a comparison against
/// the single current-id counter.
pub struct TurnRegistry {
    counter: AtomicU64,
    current_state: AtomicU32,
}

const STATE_OPENED: u32 = 0;
const STATE_TRANSCRIBING: u32 = 1;
const STATE_GENERATING: u32 = 2;
const STATE_SYNTHESIZING: u32 = 3;
const STATE_PLAYING: u32 = 4;
const STATE_CLOSED: u32 = 5;
const STATE_STALE: u32 = 6;

fn encode(state: TurnState) -> u32 {
    match state {
        TurnState::Opened => STATE_OPENED,
        TurnState::Transcribing => STATE_TRANSCRIBING,
        TurnState::Generating => STATE_GENERATING,
        TurnState::Synthesizing => STATE_SYNTHESIZING,
        TurnState::Playing => STATE_PLAYING,
        TurnState::Closed => STATE_CLOSED,
        TurnState::Stale => STATE_STALE,
    }
}

fn decode(state: u32) -> TurnState {
    match state {
        STATE_OPENED => TurnState::Opened,
        STATE_TRANSCRIBING => TurnState::Transcribing,
        STATE_GENERATING => TurnState::Generating,
        STATE_SYNTHESIZING => TurnState::Synthesizing,
        STATE_PLAYING => TurnState::Playing,
        STATE_CLOSED => TurnState::Closed,
        _ => TurnState::Stale,
    }
}

impl TurnRegistry {
    pub fn new() -> Self {
        Self {
            counter: AtomicU64::new(0),
            current_state: AtomicU32::new(STATE_CLOSED),
        }
    }

    /// Open a new turn: bump the counter, which makes any previously open
    /// turn stale by definition (Invariant T1, T3c-adjacent mechanism).
    pub fn open(&self) -> TurnId {
        let id = self.counter.fetch_add(1, Ordering::SeqCst) + 1;
        self.current_state.store(STATE_OPENED, Ordering::SeqCst);
        TurnId(id)
    }

    pub fn current(&self) -> TurnId {
        TurnId(self.counter.load(Ordering::SeqCst))
    }

    /// True iff `turn` is no longer the current turn.
    pub fn is_stale(&self, turn: TurnId) -> bool {
        self.current() != turn
    }

    pub fn set_state(&self, turn: TurnId, state: TurnState) {
        if !self.is_stale(turn) {
            self.current_state.store(encode(state), Ordering::SeqCst);
        }
    }

    pub fn state(&self) -> TurnState {
        decode(self.current_state.load(Ordering::SeqCst))
    }
}

impl Default for TurnRegistry {
    fn default() -> Self {
        Self::new()
    }
}

/// Holds the unstructured proactive-message budget for the Keep-Alive
/// Scheduler separately from turn state, since it must survive across turns.
#[derive(Default)]
pub struct KeepAliveGuard {
    in_flight: Mutex<bool>,
}

impl KeepAliveGuard {
    pub fn try_acquire(&self) -> bool {
        let mut guard = self.in_flight.lock();
        if *guard {
            false
        } else {
            *guard = true;
            true
        }
    }

    pub fn release(&self) {
        *self.in_flight.lock() = false;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn turn_ids_strictly_increase() {
        let reg = TurnRegistry::new();
        let a = reg.open();
        let b = reg.open();
        assert!(b.0 > a.0);
    }

    #[test]
    fn opening_a_new_turn_makes_the_previous_one_stale() {
        let reg = TurnRegistry::new();
        let a = reg.open();
        assert!(!reg.is_stale(a));
        let _b = reg.open();
        assert!(reg.is_stale(a));
    }

    #[test]
    fn state_transitions_are_ignored_for_a_stale_turn() {
        let reg = TurnRegistry::new();
        let a = reg.open();
        let _b = reg.open();
        reg.set_state(a, TurnState::Playing);
        assert_ne!(reg.state(), TurnState::Playing);
    }

    #[test]
    fn keep_alive_guard_prevents_concurrent_acquisition() {
        let guard = KeepAliveGuard::default();
        assert!(guard.try_acquire());
        assert!(!guard.try_acquire());
        guard.release();
        assert!(guard.try_acquire());
    }
}
