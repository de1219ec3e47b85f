//! WebSocket transport to the Gemini Live API.

use crate::{
    events::server_events,
    types::{ClientMessage, ServerMessage},
};
use anyhow::{Context, Result};
use async_trait::async_trait;
use futures_util::{Sink, SinkExt, Stream, StreamExt};
use secrecy::{ExposeSecret, SecretString};
use tandem_core::{
    InboundEvent, LiveLink, LiveTransport, OutboundMessage, SessionConfig, SessionError,
};
use tokio::sync::mpsc;
use tokio_tungstenite::{
    connect_async,
    tungstenite::{Error as WsError, protocol::Message as WsMessage},
};
use tracing::{Instrument, Span, debug, error, info, trace, warn};

pub const DEFAULT_ENDPOINT: &str = "wss://generativelanguage.googleapis.com/ws/google.ai.generativelanguage.v1beta.GenerativeService.BidiGenerateContent";
pub const DEFAULT_MODEL: &str = "models/gemini-2.5-flash-native-audio-preview-09-2025";

const OUTBOUND_CAPACITY: usize = 32;
const INBOUND_CAPACITY: usize = 256;

#[derive(Debug, Clone)]
pub struct GeminiConfig {
    pub api_key: SecretString,
    pub model: String,
    pub endpoint: String,
}

impl GeminiConfig {
    pub fn new(api_key: SecretString) -> Self {
        Self {
            api_key,
            model: DEFAULT_MODEL.to_string(),
            endpoint: DEFAULT_ENDPOINT.to_string(),
        }
    }

    pub fn with_model(mut self, model: impl Into<String>) -> Self {
        self.model = model.into();
        self
    }

    pub fn with_endpoint(mut self, endpoint: impl Into<String>) -> Self {
        self.endpoint = endpoint.into();
        self
    }

    fn url(&self) -> String {
        format!("{}?key={}", self.endpoint, self.api_key.expose_secret())
    }
}

pub struct GeminiTransport {
    config: GeminiConfig,
}

impl GeminiTransport {
    pub fn new(config: GeminiConfig) -> Self {
        Self { config }
    }
}

#[async_trait]
impl LiveTransport for GeminiTransport {
    async fn open(&self, session: &SessionConfig) -> tandem_core::Result<LiveLink> {
        let timeout = session.handshake_timeout;
        let handshake = async {
            let (ws_stream, _) = connect_async(self.config.url())
                .await
                .context("Failed to connect to Gemini")?;
            info!(model = %self.config.model, "Connected to Gemini Realtime WebSocket.");
            let (mut ws_tx, ws_rx) = ws_stream.split();

            let setup = serde_json::to_string(&ClientMessage::setup(&self.config.model, session))
                .context("Failed to serialize setup message")?;
            ws_tx
                .send(WsMessage::Text(setup.into()))
                .await
                .context("Failed to send setup message")?;
            anyhow::Ok((ws_tx, ws_rx))
        };
        let (ws_tx, ws_rx) = tokio::time::timeout(timeout, handshake)
            .await
            .map_err(|_| {
                SessionError::HandshakeFailure(format!("no answer from Gemini within {timeout:?}"))
            })?
            .map_err(|e| SessionError::HandshakeFailure(format!("{e:#}")))?;

        let (out_tx, out_rx) = mpsc::channel(OUTBOUND_CAPACITY);
        let (in_tx, in_rx) = mpsc::channel(INBOUND_CAPACITY);

        let task = tokio::spawn(
            async move {
                if let Err(e) = run(ws_tx, ws_rx, out_rx, in_tx.clone()).await {
                    error!("Gemini stream failed: {e:#}");
                    let _ = in_tx.send(InboundEvent::Error(format!("{e:#}"))).await;
                }
                debug!("Gemini stream task finished.");
            }
            .instrument(Span::current()),
        );

        Ok(LiveLink::new(out_tx, in_rx, task))
    }
}

/// Pumps frames in both directions until the stream ends. After a close is
/// requested, inbound frames are drained until the server acknowledges.
async fn run<S, R>(
    mut ws_tx: S,
    mut ws_rx: R,
    mut outbound: mpsc::Receiver<OutboundMessage>,
    inbound: mpsc::Sender<InboundEvent>,
) -> Result<()>
where
    S: Sink<WsMessage, Error = WsError> + Unpin,
    R: Stream<Item = Result<WsMessage, WsError>> + Unpin,
{
    let mut closing = false;
    loop {
        tokio::select! {
            msg = outbound.recv(), if !closing => match msg {
                Some(OutboundMessage::Audio(blob)) => {
                    let payload = serde_json::to_string(&ClientMessage::audio(blob))
                        .context("Failed to serialize audio frame")?;
                    if let Err(e) = ws_tx.send(WsMessage::Text(payload.into())).await {
                        warn!(error = %e, "Failed to send audio frame, dropping it.");
                    }
                }
                Some(OutboundMessage::Close) | None => {
                    info!("Closing Gemini stream.");
                    closing = true;
                    if let Err(e) = ws_tx.send(WsMessage::Close(None)).await {
                        warn!(error = %e, "Failed to send close frame.");
                        return Ok(());
                    }
                }
            },
            frame = ws_rx.next() => match frame {
                Some(Ok(WsMessage::Text(text))) => {
                    if !forward(text.as_bytes(), &inbound).await && !closing {
                        debug!("Session stopped listening.");
                        return Ok(());
                    }
                }
                Some(Ok(WsMessage::Binary(bytes))) => {
                    if !forward(&bytes, &inbound).await && !closing {
                        debug!("Session stopped listening.");
                        return Ok(());
                    }
                }
                Some(Ok(WsMessage::Close(frame))) => {
                    let reason = frame
                        .map(|f| f.reason.to_string())
                        .filter(|reason| !reason.is_empty());
                    info!(?reason, "Gemini closed the stream.");
                    let _ = inbound.send(InboundEvent::Closed(reason)).await;
                    let _ = ws_tx.close().await;
                    return Ok(());
                }
                Some(Ok(_)) => {}
                Some(Err(e)) if closing => {
                    debug!(error = %e, "Stream error while closing.");
                    return Ok(());
                }
                Some(Err(e)) => return Err(e).context("Error reading from Gemini WebSocket"),
                None => {
                    let _ = inbound.send(InboundEvent::Closed(None)).await;
                    return Ok(());
                }
            },
        }
    }
}

/// Parses one server frame and forwards its events. Returns false once the
/// session has stopped listening.
async fn forward(payload: &[u8], inbound: &mpsc::Sender<InboundEvent>) -> bool {
    let message = match serde_json::from_slice::<ServerMessage>(payload) {
        Ok(message) => message,
        Err(e) => {
            warn!(error = %e, "Ignoring unparseable Gemini message.");
            return true;
        }
    };
    for event in server_events(message) {
        trace!(kind = event.kind(), "Forwarding Gemini event.");
        if inbound.send(event).await.is_err() {
            return false;
        }
    }
    true
}
