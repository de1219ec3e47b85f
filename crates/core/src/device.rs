//! Audio device collaborators.
//!
//! The session owns one input and one output device for its lifetime. Device
//! implementations live outside this crate; the traits here are the whole
//! contract.

use crate::{
    audio::{AudioFrame, FrameEncoder},
    error::Result,
    observer::SessionObserver,
    protocol::OutboundMessage,
    transcript::Speaker,
};
use async_trait::async_trait;
use std::sync::Arc;
use tokio::sync::mpsc::{self, error::TrySendError};
use tracing::trace;

/// Identifies one scheduled playback buffer on an output device.
pub type SourceId = u64;

/// A microphone that delivers fixed-size float blocks on its own clock.
pub trait AudioInput: Send {
    /// Starts delivering capture blocks to `sink`. The sink is called from
    /// the device's thread.
    fn start(&mut self, sink: CaptureSink) -> Result<()>;

    /// Stops capture and releases the device. Safe to call more than once.
    fn stop(&mut self);
}

/// An output device that plays buffers at scheduled positions on its clock.
pub trait AudioOutput: Send {
    /// Current position of the device clock, in seconds.
    fn current_time(&self) -> f64;

    /// Queues `frame` to begin at `start_at` seconds on the device clock.
    fn schedule(&mut self, frame: AudioFrame, start_at: f64) -> Result<SourceId>;

    /// Silences a scheduled source immediately. Unknown ids are ignored.
    fn stop(&mut self, id: SourceId);

    /// Releases the device.
    fn close(&mut self);
}

/// Opens the devices for one session.
#[async_trait]
pub trait AudioDevices: Send + Sync {
    /// Acquires the microphone. Suspends while the platform resolves access;
    /// refusal surfaces as `SessionError::PermissionDenied`.
    async fn open_input(&self) -> Result<Box<dyn AudioInput>>;

    async fn open_output(&self) -> Result<Box<dyn AudioOutput>>;
}

/// The capture callback's view of the session: encodes each block, reports
/// its level and hands the frame to the outbound stream without waiting.
#[derive(Clone)]
pub struct CaptureSink {
    encoder: FrameEncoder,
    outbound: mpsc::Sender<OutboundMessage>,
    observer: Arc<dyn SessionObserver>,
}

/// What happened to one capture block.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FrameDisposition {
    Queued,
    Dropped,
}

impl CaptureSink {
    pub fn new(
        encoder: FrameEncoder,
        outbound: mpsc::Sender<OutboundMessage>,
        observer: Arc<dyn SessionObserver>,
    ) -> Self {
        Self {
            encoder,
            outbound,
            observer,
        }
    }

    /// Processes one capture block. Never blocks: a full or closed outbound
    /// channel drops the frame.
    pub fn push_block(&self, block: &[f32]) -> FrameDisposition {
        let encoded = self.encoder.encode(block);
        self.observer.on_audio_level(encoded.level, Speaker::User);

        match self.outbound.try_send(OutboundMessage::Audio(encoded.blob)) {
            Ok(()) => FrameDisposition::Queued,
            Err(TrySendError::Full(_)) => {
                trace!("Outbound queue full, dropping capture frame.");
                FrameDisposition::Dropped
            }
            Err(TrySendError::Closed(_)) => {
                trace!("Outbound stream not available, dropping capture frame.");
                FrameDisposition::Dropped
            }
        }
    }
}
