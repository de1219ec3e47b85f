//! Native audio devices built on `cpal`.
//!
//! cpal streams cannot move between threads, so each one lives on its own
//! thread for its whole life and is dropped there when stopped.

mod input;
mod mixer;
mod output;

pub use input::CpalInput;
pub use mixer::Mixer;
pub use output::CpalOutput;

use async_trait::async_trait;
use std::{
    sync::mpsc as std_mpsc,
    thread::{self, JoinHandle},
};
use tandem_core::{AudioDevices, AudioInput, AudioOutput, Result, SessionError};
use tracing::debug;

/// Opens the host's default microphone and speaker.
#[derive(Debug, Default, Clone, Copy)]
pub struct CpalDevices;

#[async_trait]
impl AudioDevices for CpalDevices {
    async fn open_input(&self) -> Result<Box<dyn AudioInput>> {
        let input = tokio::task::spawn_blocking(CpalInput::open)
            .await
            .map_err(|e| SessionError::DeviceUnavailable(e.to_string()))??;
        Ok(Box::new(input))
    }

    async fn open_output(&self) -> Result<Box<dyn AudioOutput>> {
        let output = tokio::task::spawn_blocking(CpalOutput::open)
            .await
            .map_err(|e| SessionError::DeviceUnavailable(e.to_string()))??;
        Ok(Box::new(output))
    }
}

/// A playing cpal stream pinned to a dedicated thread.
pub(crate) struct StreamThread {
    name: String,
    stop: Option<std_mpsc::Sender<()>>,
    handle: Option<JoinHandle<()>>,
}

impl StreamThread {
    /// Builds and starts the stream on a new thread, returning once it is
    /// playing or has failed to start.
    pub(crate) fn spawn<F>(name: &str, build: F) -> std::result::Result<Self, String>
    where
        F: FnOnce() -> std::result::Result<cpal::Stream, String> + Send + 'static,
    {
        use cpal::traits::StreamTrait;

        let (ready_tx, ready_rx) = std_mpsc::channel();
        let (stop_tx, stop_rx) = std_mpsc::channel::<()>();

        let handle = thread::Builder::new()
            .name(name.to_string())
            .spawn(move || {
                let stream = match build()
                    .and_then(|stream| stream.play().map(|()| stream).map_err(|e| e.to_string()))
                {
                    Ok(stream) => stream,
                    Err(e) => {
                        let _ = ready_tx.send(Err(e));
                        return;
                    }
                };
                let _ = ready_tx.send(Ok(()));
                // Parks until stopped or the owner goes away.
                let _ = stop_rx.recv();
                drop(stream);
            })
            .map_err(|e| e.to_string())?;

        match ready_rx.recv() {
            Ok(Ok(())) => {
                debug!(thread = name, "Audio stream started.");
                Ok(Self {
                    name: name.to_string(),
                    stop: Some(stop_tx),
                    handle: Some(handle),
                })
            }
            Ok(Err(e)) => {
                let _ = handle.join();
                Err(e)
            }
            Err(_) => Err(format!("{name} thread exited before starting")),
        }
    }

    pub(crate) fn shutdown(&mut self) {
        if let Some(stop) = self.stop.take() {
            let _ = stop.send(());
        }
        if let Some(handle) = self.handle.take() {
            let _ = handle.join();
            debug!(thread = %self.name, "Audio stream stopped.");
        }
    }
}

impl Drop for StreamThread {
    fn drop(&mut self) {
        self.shutdown();
    }
}
