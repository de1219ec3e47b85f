//! Error taxonomy for a live practice session.

use crate::session::SessionState;

/// Failure to turn an inbound encoded chunk into playable samples.
#[derive(Debug, thiserror::Error, PartialEq, Eq)]
pub enum DecodeError {
    #[error("audio payload is not valid base64: {0}")]
    InvalidBase64(String),
    #[error("PCM16 payload has an odd byte length ({0})")]
    OddLength(usize),
}

/// Errors raised by the session controller and its collaborators.
#[derive(Debug, thiserror::Error)]
pub enum SessionError {
    #[error("Microphone access was refused: {0}")]
    PermissionDenied(String),
    #[error("Audio output device unavailable: {0}")]
    DeviceUnavailable(String),
    #[error("Could not open the speech session: {0}")]
    HandshakeFailure(String),
    #[error("Speech session transport failed: {0}")]
    Transport(String),
    #[error("Dropped malformed audio chunk: {0}")]
    Decode(#[from] DecodeError),
    #[error("Outbound frame was not delivered: {0}")]
    Send(String),
    #[error("Invalid session transition from {from:?} to {to:?}")]
    InvalidTransition { from: SessionState, to: SessionState },
    #[error("No live session")]
    NotConnected,
}

impl SessionError {
    /// Whether the error ends the session. Per-frame failures are local and
    /// never change the session state.
    pub fn is_fatal(&self) -> bool {
        matches!(
            self,
            SessionError::PermissionDenied(_)
                | SessionError::DeviceUnavailable(_)
                | SessionError::HandshakeFailure(_)
                | SessionError::Transport(_)
        )
    }
}

pub type Result<T> = std::result::Result<T, SessionError>;
