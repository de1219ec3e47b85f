//! The session controller.
//!
//! A [`SessionController`] drives one conversation at a time through
//! `Idle → Connecting → Streaming → Closed`, with `Error` reachable from the
//! two live states and left only through [`SessionController::reset`]. Each
//! connect builds a fresh [`Session`] that owns the microphone, the playback
//! scheduler and the live stream; leaving a live state releases all three.
//!
//! Inbound events are handled one at a time, in arrival order, by
//! [`SessionController::handle_event`]. The capture callback runs on the
//! input device's clock and only ever touches the outbound queue.

use crate::{
    audio::FrameEncoder,
    config::SessionConfig,
    device::{AudioDevices, AudioInput, CaptureSink},
    error::{Result, SessionError},
    observer::SessionObserver,
    playback::PlaybackScheduler,
    protocol::InboundEvent,
    transcript::{Speaker, TranscriptionAggregator},
    transport::{LiveLink, LiveTransport},
};
use serde::Serialize;
use std::{future::Future, sync::Arc, time::Duration};
use tokio::time::{Instant, MissedTickBehavior};
use tracing::{Instrument, Span, debug, error, info, info_span, warn};
use uuid::Uuid;

/// Level reported for the assistant while its speech is scheduled.
pub const ASSISTANT_PULSE_LEVEL: f32 = 0.5;
/// How often finished playback sources are reaped while streaming.
pub const PLAYBACK_TICK: Duration = Duration::from_millis(50);

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum SessionState {
    Idle,
    Connecting,
    Streaming,
    Error,
    Closed,
}

impl SessionState {
    pub fn can_transition_to(self, next: SessionState) -> bool {
        use SessionState::*;
        matches!(
            (self, next),
            (Idle, Connecting)
                | (Connecting, Streaming)
                | (Connecting, Error)
                | (Streaming, Error)
                | (Streaming, Closed)
                | (Error, Idle)
        )
    }
}

/// One live conversation and everything it owns.
struct Session {
    id: Uuid,
    state: SessionState,
    /// Output clock reading when the playback device was opened.
    clock_origin: Option<f64>,
    capture: Option<Box<dyn AudioInput>>,
    playback: Option<PlaybackScheduler>,
    link: Option<LiveLink>,
    transcripts: TranscriptionAggregator,
    assistant_pulse: bool,
    span: Span,
}

impl Session {
    fn new() -> Self {
        let id = Uuid::new_v4();
        Self {
            id,
            state: SessionState::Idle,
            clock_origin: None,
            capture: None,
            playback: None,
            link: None,
            transcripts: TranscriptionAggregator::new(),
            assistant_pulse: false,
            span: info_span!("practice_session", session_id = %id),
        }
    }

    fn stop_capture(&mut self, observer: &dyn SessionObserver) {
        if let Some(mut capture) = self.capture.take() {
            capture.stop();
            observer.on_audio_level(0.0, Speaker::User);
        }
    }

    fn end_pulse(&mut self, observer: &dyn SessionObserver) {
        if self.assistant_pulse {
            self.assistant_pulse = false;
            observer.on_audio_level(0.0, Speaker::Assistant);
        }
    }

    /// Releases every owned resource and drops pending transcript text.
    fn release(&mut self, observer: &dyn SessionObserver) {
        self.stop_capture(observer);
        if let Some(playback) = self.playback.take() {
            playback.shutdown();
        }
        if let Some(link) = self.link.take() {
            link.abort();
        }
        self.transcripts.discard_all();
        self.end_pulse(observer);
    }
}

impl Drop for Session {
    fn drop(&mut self) {
        if let Some(mut capture) = self.capture.take() {
            capture.stop();
        }
        if let Some(playback) = self.playback.take() {
            playback.shutdown();
        }
        if let Some(link) = self.link.take() {
            link.abort();
        }
    }
}

enum Step {
    Shutdown,
    Event(Option<InboundEvent>),
    Tick,
}

pub struct SessionController {
    transport: Arc<dyn LiveTransport>,
    devices: Arc<dyn AudioDevices>,
    observer: Arc<dyn SessionObserver>,
    config: SessionConfig,
    session: Option<Session>,
}

impl SessionController {
    pub fn new(
        transport: Arc<dyn LiveTransport>,
        devices: Arc<dyn AudioDevices>,
        observer: Arc<dyn SessionObserver>,
        config: SessionConfig,
    ) -> Self {
        Self {
            transport,
            devices,
            observer,
            config,
            session: None,
        }
    }

    pub fn state(&self) -> SessionState {
        self.session
            .as_ref()
            .map_or(SessionState::Idle, |session| session.state)
    }

    pub fn config(&self) -> &SessionConfig {
        &self.config
    }

    pub fn session_id(&self) -> Option<Uuid> {
        self.session.as_ref().map(|session| session.id)
    }

    pub fn clock_origin(&self) -> Option<f64> {
        self.session.as_ref().and_then(|session| session.clock_origin)
    }

    pub fn next_start_time(&self) -> Option<f64> {
        self.playback().map(PlaybackScheduler::next_start_time)
    }

    pub fn active_sources(&self) -> usize {
        self.playback().map_or(0, PlaybackScheduler::active_count)
    }

    pub fn pending_text(&self, speaker: Speaker) -> &str {
        self.session
            .as_ref()
            .map_or("", |session| session.transcripts.pending_text(speaker))
    }

    fn playback(&self) -> Option<&PlaybackScheduler> {
        self.session.as_ref().and_then(|session| session.playback.as_ref())
    }

    fn transition(&mut self, next: SessionState) -> Result<()> {
        let session = self.session.as_mut().ok_or(SessionError::NotConnected)?;
        let from = session.state;
        if !from.can_transition_to(next) {
            return Err(SessionError::InvalidTransition { from, to: next });
        }
        session.state = next;
        info!(session_id = %session.id, ?from, to = ?next, "Session state changed.");
        self.observer.on_state_change(next);
        Ok(())
    }

    /// Releases everything and moves to `Error`, returning `err`.
    fn fail<T>(&mut self, err: SessionError) -> Result<T> {
        error!(error = %err, "Session failed.");
        if let Some(session) = self.session.as_mut() {
            session.release(&*self.observer);
        }
        if let Err(e) = self.transition(SessionState::Error) {
            warn!(error = %e, "Could not record session failure.");
        }
        Err(err)
    }

    /// Starts a new session: acquires the devices, opens the stream, waits
    /// for the service to acknowledge and starts capture.
    ///
    /// Allowed from `Idle` and from `Closed`, which discards the finished
    /// session first. A session in `Error` must be [`reset`](Self::reset).
    pub async fn connect(&mut self) -> Result<()> {
        let from = self.state();
        if !matches!(from, SessionState::Idle | SessionState::Closed) {
            return Err(SessionError::InvalidTransition {
                from,
                to: SessionState::Connecting,
            });
        }

        let session = Session::new();
        let span = session.span.clone();
        self.session = Some(session);

        async {
            self.transition(SessionState::Connecting)?;
            if let Err(e) = self.establish().await {
                return self.fail(e);
            }
            self.transition(SessionState::Streaming)?;
            if let Err(e) = self.start_capture() {
                return self.fail(e);
            }
            info!("Session streaming.");
            Ok(())
        }
        .instrument(span)
        .await
    }

    async fn establish(&mut self) -> Result<()> {
        let input = self.devices.open_input().await?;
        let session = self.session.as_mut().ok_or(SessionError::NotConnected)?;
        session.capture = Some(input);

        let output = self.devices.open_output().await?;
        let clock_origin = output.current_time();
        let session = self.session.as_mut().ok_or(SessionError::NotConnected)?;
        session.clock_origin = Some(clock_origin);
        session.playback = Some(PlaybackScheduler::new(output));
        debug!(clock_origin, "Audio devices acquired.");

        // One deadline covers opening the stream and the acknowledgment.
        let timeout = self.config.handshake_timeout;
        let deadline = Instant::now() + timeout;
        let open = self.transport.open(&self.config);
        let link = match tokio::time::timeout_at(deadline, open).await {
            Ok(link) => link?,
            Err(_) => {
                return Err(SessionError::HandshakeFailure(format!(
                    "stream did not open within {timeout:?}"
                )));
            }
        };
        let session = self.session.as_mut().ok_or(SessionError::NotConnected)?;
        session.link = Some(link);

        self.await_ready(deadline).await
    }

    async fn await_ready(&mut self, deadline: Instant) -> Result<()> {
        let timeout = self.config.handshake_timeout;
        let link = self
            .session
            .as_mut()
            .and_then(|session| session.link.as_mut())
            .ok_or(SessionError::NotConnected)?;

        let wait = async {
            loop {
                match link.recv().await {
                    Some(InboundEvent::Ready) => return Ok(()),
                    Some(InboundEvent::Error(message)) => {
                        return Err(SessionError::HandshakeFailure(message));
                    }
                    Some(InboundEvent::Closed(reason)) => {
                        return Err(SessionError::HandshakeFailure(
                            reason.unwrap_or_else(|| "closed during handshake".to_string()),
                        ));
                    }
                    Some(other) => {
                        debug!(kind = other.kind(), "Ignoring event before acknowledgment.")
                    }
                    None => {
                        return Err(SessionError::HandshakeFailure(
                            "stream ended during handshake".to_string(),
                        ));
                    }
                }
            }
        };

        match tokio::time::timeout_at(deadline, wait).await {
            Ok(result) => result,
            Err(_) => Err(SessionError::HandshakeFailure(format!(
                "no acknowledgment within {timeout:?}"
            ))),
        }
    }

    fn start_capture(&mut self) -> Result<()> {
        let observer = self.observer.clone();
        let session = self.session.as_mut().ok_or(SessionError::NotConnected)?;
        let outbound = session
            .link
            .as_ref()
            .map(LiveLink::sender)
            .ok_or(SessionError::NotConnected)?;
        let capture = session.capture.as_mut().ok_or(SessionError::NotConnected)?;
        capture.start(CaptureSink::new(FrameEncoder::default(), outbound, observer))
    }

    /// Routes one inbound event. Only fatal failures are returned; a
    /// malformed audio chunk is dropped and streaming continues.
    pub fn handle_event(&mut self, event: InboundEvent) -> Result<()> {
        let observer = self.observer.clone();
        let session = match self.session.as_mut() {
            Some(session) if session.state == SessionState::Streaming => session,
            _ => return Err(SessionError::NotConnected),
        };
        let _entered = session.span.clone().entered();
        debug!(kind = event.kind(), "Routing inbound event.");

        match event {
            InboundEvent::Ready => debug!("Ignoring repeated acknowledgment."),
            InboundEvent::InputTranscription(text) => {
                let item = session.transcripts.push_fragment(Speaker::User, &text);
                observer.on_transcription(&item);
            }
            InboundEvent::OutputTranscription(text) => {
                let item = session.transcripts.push_fragment(Speaker::Assistant, &text);
                observer.on_transcription(&item);
            }
            InboundEvent::Audio(data) => {
                let playback = session.playback.as_mut().ok_or(SessionError::NotConnected)?;
                match playback.schedule_chunk(&data) {
                    Ok(Some(_)) => {
                        session.assistant_pulse = true;
                        observer.on_audio_level(ASSISTANT_PULSE_LEVEL, Speaker::Assistant);
                    }
                    Ok(None) => {}
                    Err(e) if !e.is_fatal() => warn!(error = %e, "Dropping audio chunk."),
                    Err(e) => return self.fail(e),
                }
            }
            InboundEvent::Interrupted => {
                if let Some(playback) = session.playback.as_mut() {
                    playback.interrupt();
                }
                session.transcripts.discard_all();
                session.end_pulse(&*observer);
            }
            InboundEvent::TurnComplete => {
                for item in session.transcripts.complete_turn() {
                    observer.on_transcription(&item);
                }
            }
            InboundEvent::Error(message) => return self.fail(SessionError::Transport(message)),
            InboundEvent::Closed(reason) => {
                info!(?reason, "Remote closed the session.");
                session.release(&*observer);
                return self.transition(SessionState::Closed);
            }
        }
        Ok(())
    }

    /// Periodic playback housekeeping: forgets finished sources and ends the
    /// assistant level pulse once nothing is left to play.
    pub fn tick(&mut self) {
        let observer = self.observer.clone();
        let Some(session) = self.session.as_mut() else {
            return;
        };
        if let Some(playback) = session.playback.as_mut() {
            playback.reap_finished();
            if playback.is_idle() {
                session.end_pulse(&*observer);
            }
        }
    }

    /// Processes inbound events until the stream closes, fails, or
    /// `shutdown` resolves, which disconnects.
    pub async fn run<F>(&mut self, shutdown: F) -> Result<()>
    where
        F: Future<Output = ()>,
    {
        let span = match self.session.as_ref() {
            Some(session) if session.state == SessionState::Streaming => session.span.clone(),
            _ => return Err(SessionError::NotConnected),
        };

        async {
            tokio::pin!(shutdown);
            let mut ticker = tokio::time::interval(PLAYBACK_TICK);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);

            while self.state() == SessionState::Streaming {
                let link = self
                    .session
                    .as_mut()
                    .and_then(|session| session.link.as_mut())
                    .ok_or(SessionError::NotConnected)?;

                let step = tokio::select! {
                    biased;
                    _ = &mut shutdown => Step::Shutdown,
                    event = link.recv() => Step::Event(event),
                    _ = ticker.tick() => Step::Tick,
                };

                match step {
                    Step::Shutdown => return self.disconnect().await,
                    Step::Event(Some(event)) => self.handle_event(event)?,
                    Step::Event(None) => self.handle_event(InboundEvent::Closed(None))?,
                    Step::Tick => self.tick(),
                }
            }
            Ok(())
        }
        .instrument(span)
        .await
    }

    /// Ends the session. Capture stops first, then the close handshake is
    /// given at most `close_timeout` before local teardown proceeds anyway.
    pub async fn disconnect(&mut self) -> Result<()> {
        match self.state() {
            SessionState::Streaming => {}
            SessionState::Connecting => {
                return self.fail(SessionError::HandshakeFailure(
                    "connection abandoned before acknowledgment".to_string(),
                ));
            }
            state => {
                debug!(?state, "Disconnect requested without a live session.");
                return Ok(());
            }
        }

        let close_timeout = self.config.close_timeout;
        let Some(session) = self.session.as_mut() else {
            return Err(SessionError::NotConnected);
        };
        let span = session.span.clone();
        session.stop_capture(&*self.observer);
        let link = session.link.take();

        async {
            if let Some(link) = link {
                link.close(close_timeout).await;
            }
            if let Some(session) = self.session.as_mut() {
                session.release(&*self.observer);
            }
            self.transition(SessionState::Closed)
        }
        .instrument(span)
        .await
    }

    /// Clears a failed session so a new one can connect.
    pub fn reset(&mut self) -> Result<()> {
        self.transition(SessionState::Idle)?;
        self.session = None;
        Ok(())
    }
}
