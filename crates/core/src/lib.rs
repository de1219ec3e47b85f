//! Core of the practice-session runtime.
//!
//! This crate holds everything that does not depend on a particular speech
//! service or audio backend: the session state machine, the capture and
//! playback paths, transcription aggregation and the traits the outer
//! layers implement ([`LiveTransport`], [`AudioDevices`], [`SessionObserver`]).

pub mod audio;
pub mod config;
pub mod device;
pub mod error;
pub mod observer;
pub mod playback;
pub mod protocol;
pub mod session;
pub mod transcript;
pub mod transport;

#[cfg(test)]
mod testing;

pub use audio::{AudioFrame, FrameEncoder, MediaBlob};
pub use config::SessionConfig;
pub use device::{AudioDevices, AudioInput, AudioOutput, CaptureSink, SourceId};
pub use error::{DecodeError, Result, SessionError};
pub use observer::{SessionEvent, SessionObserver};
pub use playback::PlaybackScheduler;
pub use protocol::{InboundEvent, OutboundMessage};
pub use session::{SessionController, SessionState};
pub use transcript::{Speaker, TranscriptLog, TranscriptionAggregator, TranscriptionItem};
pub use transport::{LiveLink, LiveTransport};
