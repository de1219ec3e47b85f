//! Software playback timeline.
//!
//! Every scheduled buffer is pinned to a start frame on a clock that only
//! advances as the device pulls audio, so buffers placed back to back play
//! without gaps regardless of when they were queued.

use tandem_core::SourceId;

struct Voice {
    id: SourceId,
    start_frame: u64,
    samples: Vec<f32>,
}

impl Voice {
    fn end_frame(&self) -> u64 {
        self.start_frame + self.samples.len() as u64
    }
}

pub struct Mixer {
    sample_rate: u32,
    rendered: u64,
    next_id: SourceId,
    voices: Vec<Voice>,
}

impl Mixer {
    pub fn new(sample_rate: u32) -> Self {
        Self {
            sample_rate,
            rendered: 0,
            next_id: 0,
            voices: Vec::new(),
        }
    }

    /// Seconds of audio handed to the device so far.
    pub fn current_time(&self) -> f64 {
        self.rendered as f64 / self.sample_rate as f64
    }

    #[cfg(test)]
    fn active(&self) -> usize {
        self.voices.len()
    }

    /// Adds mono samples at the mixer rate. A start time already in the
    /// past begins at the next rendered frame.
    pub fn add(&mut self, samples: Vec<f32>, start_at: f64) -> SourceId {
        self.next_id += 1;
        let requested = (start_at.max(0.0) * self.sample_rate as f64).round() as u64;
        self.voices.push(Voice {
            id: self.next_id,
            start_frame: requested.max(self.rendered),
            samples,
        });
        self.next_id
    }

    pub fn remove(&mut self, id: SourceId) -> bool {
        let before = self.voices.len();
        self.voices.retain(|voice| voice.id != id);
        before != self.voices.len()
    }

    pub fn clear(&mut self) {
        self.voices.clear();
    }

    /// Fills `out` with the next mono frames and advances the clock.
    pub fn render(&mut self, out: &mut [f32]) {
        out.fill(0.0);
        let first = self.rendered;
        let last = first + out.len() as u64;

        for voice in &self.voices {
            let from = voice.start_frame.max(first);
            let to = voice.end_frame().min(last);
            for frame in from..to {
                let sample = voice.samples[(frame - voice.start_frame) as usize];
                out[(frame - first) as usize] += sample;
            }
        }
        for sample in out.iter_mut() {
            *sample = sample.clamp(-1.0, 1.0);
        }

        self.rendered = last;
        self.voices.retain(|voice| voice.end_frame() > last);
    }
}
