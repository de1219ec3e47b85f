use super::StreamThread;
use crate::resample::StreamResampler;
use cpal::{
    FromSample, Sample, SampleFormat, SizedSample, StreamConfig,
    traits::{DeviceTrait, HostTrait},
};
use ringbuf::{
    HeapCons, HeapProd, HeapRb,
    traits::{Consumer, Producer, Split},
};
use std::{
    sync::{
        Arc,
        atomic::{AtomicBool, Ordering},
    },
    thread::{self, JoinHandle},
    time::Duration,
};
use tandem_core::{
    AudioInput, CaptureSink, Result, SessionError,
    audio::{CAPTURE_BLOCK_SIZE, INPUT_SAMPLE_RATE},
};
use tracing::{error, info, warn};

const RESAMPLER_CHUNK: usize = 1024;
const POLL_INTERVAL: Duration = Duration::from_millis(10);

struct Capture {
    stream: StreamThread,
    worker: Option<JoinHandle<()>>,
    stop: Arc<AtomicBool>,
}

/// The default microphone. Audio is downmixed to mono on the device thread,
/// handed over through a ring buffer and resampled to 16 kHz blocks on a
/// capture worker.
pub struct CpalInput {
    device: cpal::Device,
    config: cpal::SupportedStreamConfig,
    running: Option<Capture>,
}

impl CpalInput {
    pub fn open() -> Result<Self> {
        let host = cpal::default_host();
        let device = host
            .default_input_device()
            .ok_or_else(|| SessionError::PermissionDenied("no microphone available".into()))?;
        let config = device
            .default_input_config()
            .map_err(|e| SessionError::PermissionDenied(e.to_string()))?;
        info!(
            device = %device.name().unwrap_or_default(),
            sample_rate = config.sample_rate().0,
            channels = config.channels(),
            "Microphone opened."
        );
        Ok(Self {
            device,
            config,
            running: None,
        })
    }
}

impl AudioInput for CpalInput {
    fn start(&mut self, sink: CaptureSink) -> Result<()> {
        if self.running.is_some() {
            warn!("Capture already running.");
            return Ok(());
        }
        let rate = self.config.sample_rate().0;
        let channels = self.config.channels() as usize;
        let format = self.config.sample_format();
        let stream_config = self.config.config();
        let device = self.device.clone();

        // Two seconds of slack between the device and the worker.
        let (producer, consumer) = HeapRb::<f32>::new(rate as usize * 2).split();
        let resampler = StreamResampler::new(rate, INPUT_SAMPLE_RATE, RESAMPLER_CHUNK)
            .map_err(|e| SessionError::DeviceUnavailable(e.to_string()))?;

        let stream = StreamThread::spawn("tandem-microphone", move || {
            build_input(&device, &stream_config, format, channels, producer)
        })
        .map_err(SessionError::PermissionDenied)?;

        let stop = Arc::new(AtomicBool::new(false));
        let worker = thread::Builder::new()
            .name("tandem-capture".to_string())
            .spawn({
                let stop = stop.clone();
                move || capture_worker(consumer, resampler, sink, stop)
            })
            .map_err(|e| SessionError::DeviceUnavailable(e.to_string()))?;

        self.running = Some(Capture {
            stream,
            worker: Some(worker),
            stop,
        });
        info!("Capture started.");
        Ok(())
    }

    fn stop(&mut self) {
        if let Some(mut capture) = self.running.take() {
            capture.stream.shutdown();
            capture.stop.store(true, Ordering::Release);
            if let Some(worker) = capture.worker.take() {
                let _ = worker.join();
            }
            info!("Capture stopped.");
        }
    }
}

impl Drop for CpalInput {
    fn drop(&mut self) {
        self.stop();
    }
}

fn build_input(
    device: &cpal::Device,
    config: &StreamConfig,
    format: SampleFormat,
    channels: usize,
    producer: HeapProd<f32>,
) -> std::result::Result<cpal::Stream, String> {
    match format {
        SampleFormat::F32 => input_stream::<f32>(device, config, channels, producer),
        SampleFormat::I16 => input_stream::<i16>(device, config, channels, producer),
        SampleFormat::U16 => input_stream::<u16>(device, config, channels, producer),
        other => Err(format!("unsupported microphone sample format {other:?}")),
    }
}

fn input_stream<T>(
    device: &cpal::Device,
    config: &StreamConfig,
    channels: usize,
    mut producer: HeapProd<f32>,
) -> std::result::Result<cpal::Stream, String>
where
    T: SizedSample,
    f32: FromSample<T>,
{
    let mut mono = Vec::new();
    device
        .build_input_stream(
            config,
            move |data: &[T], _: &cpal::InputCallbackInfo| {
                mono.clear();
                mono.extend(data.chunks(channels).map(|frame| {
                    frame.iter().map(|&s| f32::from_sample(s)).sum::<f32>() / frame.len() as f32
                }));
                // Overflow means the worker is behind; the excess is dropped.
                producer.push_slice(&mono);
            },
            |err| error!(error = %err, "Microphone stream error."),
            None,
        )
        .map_err(|e| e.to_string())
}

/// Drains the ring buffer, converts to the capture rate and emits fixed-size
/// blocks until `stop` is set.
fn capture_worker(
    mut consumer: HeapCons<f32>,
    mut resampler: StreamResampler,
    sink: CaptureSink,
    stop: Arc<AtomicBool>,
) {
    let mut scratch = vec![0.0f32; CAPTURE_BLOCK_SIZE];
    let mut pending = Vec::with_capacity(CAPTURE_BLOCK_SIZE * 2);

    while !stop.load(Ordering::Acquire) {
        let read = consumer.pop_slice(&mut scratch);
        if read == 0 {
            thread::sleep(POLL_INTERVAL);
            continue;
        }
        resampler.process(&scratch[..read], &mut pending);
        while pending.len() >= CAPTURE_BLOCK_SIZE {
            sink.push_block(&pending[..CAPTURE_BLOCK_SIZE]);
            pending.drain(..CAPTURE_BLOCK_SIZE);
        }
    }
}
