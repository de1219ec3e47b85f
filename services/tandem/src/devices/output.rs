use super::{Mixer, StreamThread};
use crate::resample::StreamResampler;
use cpal::{
    FromSample, Sample, SampleFormat, SizedSample, StreamConfig,
    traits::{DeviceTrait, HostTrait},
};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use tandem_core::{
    AudioFrame, AudioOutput, Result, SessionError, SourceId, audio::OUTPUT_SAMPLE_RATE,
};
use tracing::{error, info, trace};

/// Mixer frames rendered per resampler pass, 20 ms at 24 kHz.
const RENDER_BLOCK: usize = 480;

/// The default speaker. Voices are mixed at the playback rate and the mix
/// is converted to the device rate by one resampler for the stream's life.
pub struct CpalOutput {
    mixer: Arc<Mutex<Mixer>>,
    stream: StreamThread,
}

impl CpalOutput {
    pub fn open() -> Result<Self> {
        let host = cpal::default_host();
        let device = host
            .default_output_device()
            .ok_or_else(|| SessionError::DeviceUnavailable("no speaker available".into()))?;
        let supported = device
            .default_output_config()
            .map_err(|e| SessionError::DeviceUnavailable(e.to_string()))?;
        let rate = supported.sample_rate().0;
        let channels = supported.channels() as usize;
        let format = supported.sample_format();
        let config = supported.config();

        let mixer = Arc::new(Mutex::new(Mixer::new(OUTPUT_SAMPLE_RATE)));
        let feed = DeviceFeed::new(mixer.clone(), rate)
            .map_err(|e| SessionError::DeviceUnavailable(e.to_string()))?;
        let stream = StreamThread::spawn("tandem-speaker", move || {
            build_output(&device, &config, format, channels, feed)
        })
        .map_err(SessionError::DeviceUnavailable)?;

        info!(sample_rate = rate, channels, "Speaker opened.");
        Ok(Self { mixer, stream })
    }

    fn mixer(&self) -> MutexGuard<'_, Mixer> {
        self.mixer.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

impl AudioOutput for CpalOutput {
    fn current_time(&self) -> f64 {
        self.mixer().current_time()
    }

    fn schedule(&mut self, frame: AudioFrame, start_at: f64) -> Result<SourceId> {
        if frame.sample_rate() != OUTPUT_SAMPLE_RATE {
            return Err(SessionError::DeviceUnavailable(format!(
                "speaker expects {OUTPUT_SAMPLE_RATE} Hz audio, got {} Hz",
                frame.sample_rate()
            )));
        }
        let id = self.mixer().add(frame.into_samples(), start_at);
        trace!(id, start_at, "Queued speaker buffer.");
        Ok(id)
    }

    fn stop(&mut self, id: SourceId) {
        self.mixer().remove(id);
    }

    fn close(&mut self) {
        self.mixer().clear();
        self.stream.shutdown();
        info!("Speaker closed.");
    }
}

/// Pulls the mix in fixed blocks and converts it to the device rate.
/// The resampler keeps its history across blocks, so consecutive voices
/// stay continuous after conversion.
struct DeviceFeed {
    mixer: Arc<Mutex<Mixer>>,
    resampler: StreamResampler,
    block: Vec<f32>,
    ready: Vec<f32>,
}

impl DeviceFeed {
    fn new(mixer: Arc<Mutex<Mixer>>, device_rate: u32) -> anyhow::Result<Self> {
        Ok(Self {
            mixer,
            resampler: StreamResampler::new(OUTPUT_SAMPLE_RATE, device_rate, RENDER_BLOCK)?,
            block: vec![0.0; RENDER_BLOCK],
            ready: Vec::with_capacity(RENDER_BLOCK * 4),
        })
    }

    /// Fills `out` with mono samples at the device rate.
    fn fill(&mut self, out: &mut [f32]) {
        while self.ready.len() < out.len() {
            match self.mixer.lock() {
                Ok(mut mixer) => mixer.render(&mut self.block),
                Err(_) => self.block.fill(0.0),
            }
            self.resampler.process(&self.block, &mut self.ready);
        }
        out.copy_from_slice(&self.ready[..out.len()]);
        self.ready.drain(..out.len());
    }
}

fn build_output(
    device: &cpal::Device,
    config: &StreamConfig,
    format: SampleFormat,
    channels: usize,
    feed: DeviceFeed,
) -> std::result::Result<cpal::Stream, String> {
    match format {
        SampleFormat::F32 => output_stream::<f32>(device, config, channels, feed),
        SampleFormat::I16 => output_stream::<i16>(device, config, channels, feed),
        SampleFormat::U16 => output_stream::<u16>(device, config, channels, feed),
        other => Err(format!("unsupported speaker sample format {other:?}")),
    }
}

fn output_stream<T>(
    device: &cpal::Device,
    config: &StreamConfig,
    channels: usize,
    mut feed: DeviceFeed,
) -> std::result::Result<cpal::Stream, String>
where
    T: SizedSample + FromSample<f32>,
{
    let mut mono = Vec::new();
    device
        .build_output_stream(
            config,
            move |data: &mut [T], _: &cpal::OutputCallbackInfo| {
                mono.resize(data.len() / channels, 0.0);
                feed.fill(&mut mono);
                for (frame, &sample) in data.chunks_mut(channels).zip(mono.iter()) {
                    frame.fill(T::from_sample(sample));
                }
            },
            |err| error!(error = %err, "Speaker stream error."),
            None,
        )
        .map_err(|e| e.to_string())
}
