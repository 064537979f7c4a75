//! Core types shared across the voice-agent runtime
//!
//! This crate provides the foundational, dependency-free vocabulary every
//! other crate speaks:
//! - Turn identity and lifecycle (`turn`)
//! - The pause-token segmentation grammar (`segment`)
//! - The append-only transcript (`transcript`)
//! - Audio frame types (`audio`)
//! - Session credentials (`session`)
//! - The shared error taxonomy (`error`)

pub mod audio;
pub mod error;
pub mod segment;
pub mod session;
pub mod transcript;
pub mod turn;

pub use audio::{AudioBuffer, AudioEncoding, AudioFrame, Channels, SampleRate};
pub use error::{Classify, Error, FailureKind, Result};
pub use segment::{adjust_pause, join, segment, PauseAdjustment, Segment};
pub use session::{SessionCredentials, SessionId};
pub use transcript::{Speaker, Transcript, TranscriptEntry};
pub use turn::{TurnEvent, TurnId, TurnState};
