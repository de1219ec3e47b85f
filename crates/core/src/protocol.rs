//! Messages exchanged with the remote speech-session service, independent of
//! its wire format.

use crate::audio::MediaBlob;

/// Client to service.
#[derive(Debug, Clone, PartialEq)]
pub enum OutboundMessage {
    /// One encoded capture frame.
    Audio(MediaBlob),
    /// Begin the close handshake.
    Close,
}

/// Service to client, in arrival order.
#[derive(Debug, Clone, PartialEq)]
pub enum InboundEvent {
    /// The session handshake was acknowledged.
    Ready,
    /// A fragment of the user's speech transcription.
    InputTranscription(String),
    /// A fragment of the assistant's speech transcription.
    OutputTranscription(String),
    /// Base64 PCM16 speech at the playback sample rate.
    Audio(String),
    /// The assistant's turn was cut short.
    Interrupted,
    /// The current turn is finished.
    TurnComplete,
    /// A transport fault; the stream is unusable.
    Error(String),
    /// The service closed the stream.
    Closed(Option<String>),
}

impl InboundEvent {
    pub fn kind(&self) -> &'static str {
        match self {
            InboundEvent::Ready => "ready",
            InboundEvent::InputTranscription(_) => "input_transcription",
            InboundEvent::OutputTranscription(_) => "output_transcription",
            InboundEvent::Audio(_) => "audio",
            InboundEvent::Interrupted => "interrupted",
            InboundEvent::TurnComplete => "turn_complete",
            InboundEvent::Error(_) => "error",
            InboundEvent::Closed(_) => "closed",
        }
    }
}
