//! The bidirectional stream to the remote speech-session service.

use crate::{
    config::SessionConfig,
    error::Result,
    protocol::{InboundEvent, OutboundMessage},
};
use async_trait::async_trait;
use std::time::Duration;
use tokio::{sync::mpsc, task::JoinHandle};
use tracing::{debug, warn};

/// Opens live streams to the remote service.
#[async_trait]
pub trait LiveTransport: Send + Sync {
    /// Connects and sends the session configuration. Resolves once the
    /// connection is up; the service's acknowledgment arrives later as
    /// [`InboundEvent::Ready`]. Failures are `SessionError::HandshakeFailure`.
    async fn open(&self, config: &SessionConfig) -> Result<LiveLink>;
}

/// A running connection: an outbound queue, an ordered inbound event stream
/// and the task that drives the socket.
#[derive(Debug)]
pub struct LiveLink {
    outbound: mpsc::Sender<OutboundMessage>,
    inbound: mpsc::Receiver<InboundEvent>,
    task: JoinHandle<()>,
}

impl LiveLink {
    pub fn new(
        outbound: mpsc::Sender<OutboundMessage>,
        inbound: mpsc::Receiver<InboundEvent>,
        task: JoinHandle<()>,
    ) -> Self {
        Self {
            outbound,
            inbound,
            task,
        }
    }

    /// A handle for producers such as the capture callback.
    pub fn sender(&self) -> mpsc::Sender<OutboundMessage> {
        self.outbound.clone()
    }

    pub async fn recv(&mut self) -> Option<InboundEvent> {
        self.inbound.recv().await
    }

    /// Requests a close handshake and waits at most `wait` for the driving
    /// task to finish. The task is aborted if it does not.
    pub async fn close(mut self, wait: Duration) {
        self.inbound.close();
        let abort = self.task.abort_handle();
        let outbound = self.outbound;
        let task = self.task;
        let finished = tokio::time::timeout(wait, async move {
            let _ = outbound.send(OutboundMessage::Close).await;
            let _ = task.await;
        })
        .await;
        match finished {
            Ok(()) => debug!("Live stream closed cleanly."),
            Err(_) => {
                warn!(?wait, "Close handshake did not finish in time, aborting stream.");
                abort.abort();
            }
        }
    }

    /// Tears the connection down without a handshake.
    pub fn abort(self) {
        self.task.abort();
    }
}
