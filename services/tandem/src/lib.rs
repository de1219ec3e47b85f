//! Terminal client for spoken language practice.
//!
//! Wires the Gemini transport and the host's audio devices into a
//! [`tandem_core::SessionController`] and renders the conversation.

pub mod config;
pub mod devices;
pub mod display;
pub mod language;
pub mod resample;
