//! UI-facing callbacks.

use crate::{
    session::SessionState,
    transcript::{Speaker, TranscriptionItem},
};
use tokio::sync::mpsc;

/// Receives lifecycle, transcript and level updates from a session.
///
/// `on_audio_level` for the user is called from the capture thread, the other
/// callbacks from the session's event loop, so implementations must be
/// cheap and thread-safe.
#[cfg_attr(test, mockall::automock)]
pub trait SessionObserver: Send + Sync {
    fn on_state_change(&self, state: SessionState);
    fn on_transcription(&self, item: &TranscriptionItem);
    /// `level` is in `[0, 1]`.
    fn on_audio_level(&self, level: f32, source: Speaker);
}

/// Observer callbacks as values, for consumers that prefer a channel.
#[derive(Debug, Clone, PartialEq)]
pub enum SessionEvent {
    StateChanged(SessionState),
    Transcription(TranscriptionItem),
    AudioLevel { level: f32, source: Speaker },
}

impl SessionObserver for mpsc::UnboundedSender<SessionEvent> {
    fn on_state_change(&self, state: SessionState) {
        let _ = self.send(SessionEvent::StateChanged(state));
    }

    fn on_transcription(&self, item: &TranscriptionItem) {
        let _ = self.send(SessionEvent::Transcription(item.clone()));
    }

    fn on_audio_level(&self, level: f32, source: Speaker) {
        let _ = self.send(SessionEvent::AudioLevel { level, source });
    }
}
