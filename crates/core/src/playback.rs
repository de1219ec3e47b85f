//! Gapless playback of streamed speech.
//!
//! Chunks arrive with no timing information. The scheduler keeps a virtual
//! timeline on the output device's clock and starts each chunk where the
//! previous one ends, or at the device's current time if the timeline has
//! fallen behind. Interruption stops every scheduled buffer and resets the
//! timeline so the next chunk re-anchors to the device clock.

use crate::{
    audio::{AudioFrame, OUTPUT_SAMPLE_RATE},
    device::{AudioOutput, SourceId},
    error::Result,
};
use std::collections::HashMap;
use tracing::{debug, trace};

/// Where a chunk landed on the device timeline.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ScheduledChunk {
    pub id: SourceId,
    pub start: f64,
    pub duration: f64,
}

pub struct PlaybackScheduler {
    output: Box<dyn AudioOutput>,
    sample_rate: u32,
    next_start_time: f64,
    /// Scheduled sources that have not finished, keyed to their end time.
    active: HashMap<SourceId, f64>,
}

impl PlaybackScheduler {
    pub fn new(output: Box<dyn AudioOutput>) -> Self {
        Self {
            output,
            sample_rate: OUTPUT_SAMPLE_RATE,
            next_start_time: 0.0,
            active: HashMap::new(),
        }
    }

    pub fn next_start_time(&self) -> f64 {
        self.next_start_time
    }

    pub fn active_count(&self) -> usize {
        self.active.len()
    }

    pub fn is_idle(&self) -> bool {
        self.active.is_empty()
    }

    /// Decodes a base64 PCM16 chunk and schedules it. Malformed chunks fail
    /// with `SessionError::Decode` and leave the timeline untouched; empty
    /// chunks schedule nothing.
    pub fn schedule_chunk(&mut self, data: &str) -> Result<Option<ScheduledChunk>> {
        let frame = AudioFrame::from_pcm16_base64(data, self.sample_rate)?;
        self.schedule_frame(frame)
    }

    pub fn schedule_frame(&mut self, frame: AudioFrame) -> Result<Option<ScheduledChunk>> {
        if frame.is_empty() {
            trace!("Skipping empty playback chunk.");
            return Ok(None);
        }
        self.reap_finished();

        let duration = frame.duration();
        let start = self.next_start_time.max(self.output.current_time());
        let id = self.output.schedule(frame, start)?;
        self.next_start_time = start + duration;
        self.active.insert(id, start + duration);

        trace!(id, start, duration, "Scheduled playback chunk.");
        Ok(Some(ScheduledChunk {
            id,
            start,
            duration,
        }))
    }

    /// Forgets sources whose end time has passed on the device clock.
    /// Returns how many finished.
    pub fn reap_finished(&mut self) -> usize {
        let now = self.output.current_time();
        let before = self.active.len();
        self.active.retain(|_, end| *end > now);
        before - self.active.len()
    }

    /// Stops every active source now, clears the set and resets the
    /// timeline. Returns how many sources were stopped.
    pub fn interrupt(&mut self) -> usize {
        let stopped = self.active.len();
        for (id, _) in self.active.drain() {
            self.output.stop(id);
        }
        self.next_start_time = 0.0;
        debug!(stopped, "Playback interrupted.");
        stopped
    }

    /// Stops playback and releases the output device.
    pub fn shutdown(mut self) {
        self.interrupt();
        self.output.close();
    }
}
