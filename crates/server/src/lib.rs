//! Voice Agent Server
//!
//! The UI Shell boundary (§6.1): a thin axum WebSocket server that wires one
//! `voice_agent_orchestrator::Session` per connection to real HTTP clients
//! for the four external collaborators. Auth, rate limiting, multi-tenant
//! admin surfaces, and any particular frontend are someone else's concern;
//! this crate only proves the core's public contract over a socket.

pub mod audio_bridge;
pub mod http;
pub mod state;
pub mod websocket;

pub use http::create_router;
pub use state::AppState;
