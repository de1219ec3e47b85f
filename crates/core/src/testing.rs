//! In-memory collaborators for unit tests.

use crate::{
    audio::AudioFrame,
    config::SessionConfig,
    device::{AudioDevices, AudioInput, AudioOutput, CaptureSink, SourceId},
    error::{Result, SessionError},
    protocol::{InboundEvent, OutboundMessage},
    transport::{LiveLink, LiveTransport},
};
use async_trait::async_trait;
use std::sync::{Arc, Mutex};
use tokio::sync::mpsc;

#[derive(Debug, Default)]
struct OutputState {
    now: f64,
    next_id: SourceId,
    scheduled: Vec<(SourceId, f64, f64)>,
    stopped: Vec<(SourceId, f64)>,
    closed: bool,
}

/// An output device whose clock only moves when told to.
#[derive(Debug, Clone, Default)]
pub struct ManualOutput {
    state: Arc<Mutex<OutputState>>,
}

impl ManualOutput {
    pub fn set_time(&self, now: f64) {
        self.state.lock().unwrap().now = now;
    }

    /// `(id, start, duration)` for every schedule call.
    pub fn scheduled(&self) -> Vec<(SourceId, f64, f64)> {
        self.state.lock().unwrap().scheduled.clone()
    }

    pub fn stopped(&self) -> Vec<SourceId> {
        self.state.lock().unwrap().stopped.iter().map(|(id, _)| *id).collect()
    }

    pub fn stop_times(&self) -> Vec<f64> {
        self.state.lock().unwrap().stopped.iter().map(|(_, t)| *t).collect()
    }

    pub fn is_closed(&self) -> bool {
        self.state.lock().unwrap().closed
    }
}

impl AudioOutput for ManualOutput {
    fn current_time(&self) -> f64 {
        self.state.lock().unwrap().now
    }

    fn schedule(&mut self, frame: AudioFrame, start_at: f64) -> Result<SourceId> {
        let mut state = self.state.lock().unwrap();
        state.next_id += 1;
        let id = state.next_id;
        state.scheduled.push((id, start_at, frame.duration()));
        Ok(id)
    }

    fn stop(&mut self, id: SourceId) {
        let mut state = self.state.lock().unwrap();
        let now = state.now;
        state.stopped.push((id, now));
    }

    fn close(&mut self) {
        self.state.lock().unwrap().closed = true;
    }
}

#[derive(Default)]
struct InputState {
    sink: Option<CaptureSink>,
    stopped: bool,
}

/// A microphone driven by the test through [`FakeInput::capture`].
#[derive(Clone, Default)]
pub struct FakeInput {
    state: Arc<Mutex<InputState>>,
}

impl FakeInput {
    pub fn is_started(&self) -> bool {
        self.state.lock().unwrap().sink.is_some()
    }

    pub fn is_stopped(&self) -> bool {
        self.state.lock().unwrap().stopped
    }

    /// Delivers a block as the device thread would. Returns false when
    /// capture is not running.
    pub fn capture(&self, block: &[f32]) -> bool {
        let state = self.state.lock().unwrap();
        match &state.sink {
            Some(sink) => {
                sink.push_block(block);
                true
            }
            None => false,
        }
    }
}

impl AudioInput for FakeInput {
    fn start(&mut self, sink: CaptureSink) -> Result<()> {
        self.state.lock().unwrap().sink = Some(sink);
        Ok(())
    }

    fn stop(&mut self) {
        let mut state = self.state.lock().unwrap();
        state.sink = None;
        state.stopped = true;
    }
}

#[derive(Clone, Default)]
pub struct FakeDevices {
    pub input: FakeInput,
    pub output: ManualOutput,
    pub deny_microphone: bool,
}

#[async_trait]
impl AudioDevices for FakeDevices {
    async fn open_input(&self) -> Result<Box<dyn AudioInput>> {
        if self.deny_microphone {
            return Err(SessionError::PermissionDenied("user dismissed the prompt".into()));
        }
        Ok(Box::new(self.input.clone()))
    }

    async fn open_output(&self) -> Result<Box<dyn AudioOutput>> {
        Ok(Box::new(self.output.clone()))
    }
}

/// The remote end of one fake connection.
#[derive(Clone)]
pub struct FakeServer {
    pub config: SessionConfig,
    pub inbound: mpsc::Sender<InboundEvent>,
    received: Arc<Mutex<Vec<OutboundMessage>>>,
}

impl FakeServer {
    pub async fn send(&self, event: InboundEvent) {
        self.inbound.send(event).await.unwrap();
    }

    pub fn received(&self) -> Vec<OutboundMessage> {
        self.received.lock().unwrap().clone()
    }

    pub fn audio_frames(&self) -> usize {
        self.received()
            .iter()
            .filter(|m| matches!(m, OutboundMessage::Audio(_)))
            .count()
    }
}

/// How a [`FakeTransport`] behaves.
#[derive(Debug, Clone, Copy, Default)]
pub struct FakeBehavior {
    pub refuse: bool,
    /// `open` never returns, like an endpoint that swallows packets.
    pub stall: bool,
    pub acknowledge: bool,
    pub ignore_close: bool,
}

#[derive(Default)]
pub struct FakeTransport {
    pub behavior: FakeBehavior,
    servers: Mutex<Vec<FakeServer>>,
}

impl FakeTransport {
    pub fn new(behavior: FakeBehavior) -> Self {
        Self {
            behavior,
            servers: Mutex::new(Vec::new()),
        }
    }

    pub fn acknowledging() -> Self {
        Self::new(FakeBehavior {
            acknowledge: true,
            ..Default::default()
        })
    }

    pub fn server(&self) -> FakeServer {
        self.servers.lock().unwrap().last().cloned().expect("no connection opened")
    }

    pub fn connections(&self) -> usize {
        self.servers.lock().unwrap().len()
    }
}

#[async_trait]
impl LiveTransport for FakeTransport {
    async fn open(&self, config: &SessionConfig) -> Result<LiveLink> {
        if self.behavior.refuse {
            return Err(SessionError::HandshakeFailure("API key not valid".into()));
        }
        if self.behavior.stall {
            std::future::pending::<()>().await;
        }
        let (out_tx, mut out_rx) = mpsc::channel::<OutboundMessage>(64);
        let (in_tx, in_rx) = mpsc::channel(64);
        let received = Arc::new(Mutex::new(Vec::new()));

        let log = received.clone();
        let ignore_close = self.behavior.ignore_close;
        let task = tokio::spawn(async move {
            while let Some(msg) = out_rx.recv().await {
                let is_close = msg == OutboundMessage::Close;
                log.lock().unwrap().push(msg);
                if is_close {
                    if ignore_close {
                        std::future::pending::<()>().await;
                    }
                    break;
                }
            }
        });

        if self.behavior.acknowledge {
            in_tx.send(InboundEvent::Ready).await.unwrap();
        }
        self.servers.lock().unwrap().push(FakeServer {
            config: config.clone(),
            inbound: in_tx,
            received,
        });
        Ok(LiveLink::new(out_tx, in_rx, task))
    }
}
