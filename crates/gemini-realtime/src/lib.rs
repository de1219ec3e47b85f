//! Gemini Live transport for practice sessions.
//!
//! [`GeminiTransport`] implements [`tandem_core::LiveTransport`] over the
//! Gemini bidirectional WebSocket API: it sends the session setup, streams
//! microphone frames and turns server messages into ordered core events.

pub mod client;
mod events;
pub mod types;

pub use client::{DEFAULT_ENDPOINT, DEFAULT_MODEL, GeminiConfig, GeminiTransport};
pub use events::server_events;
