//! WebSocket client for the synthesis server.
//!
//! [`WsTransport`] is the [`SynthesisTransport`] the pipeline sends through.
//! Sends are queued to a background task that owns the socket, connects
//! lazily on the first message and keeps reconnecting after a drop. Incoming
//! frames are parsed and forwarded as [`InboundMessage`]s.
//!
//! Requests that cannot be delivered are answered locally with an
//! [`InboundMessage::Undelivered`] naming the request's generation and first
//! sentence, so the session can undo exactly that request.

use std::time::Duration;

use futures_util::{SinkExt, StreamExt};
use readflow_core::{
    GenerationId, InboundMessage, OutboundMessage, ReaderSettings, SynthesisTransport,
    TransportError, decode_audio_frame, parse_text_frame,
};
use tokio::net::TcpStream;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio::time::Instant;
use tokio_tungstenite::tungstenite::{self, Message};
use tokio_tungstenite::{MaybeTlsStream, WebSocketStream, connect_async};

type WsStream = WebSocketStream<MaybeTlsStream<TcpStream>>;

/// Where to connect and how long to wait between reconnect attempts.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WsTransportConfig {
    pub url: String,
    pub reconnect_delay: Duration,
}

impl From<&ReaderSettings> for WsTransportConfig {
    fn from(settings: &ReaderSettings) -> Self {
        Self {
            url: settings.server_url.clone(),
            reconnect_delay: Duration::from_millis(settings.reconnect_delay_ms),
        }
    }
}

/// Handle to the background connection task. Dropping it closes the socket.
pub struct WsTransport {
    outbound_tx: mpsc::UnboundedSender<OutboundMessage>,
    task: JoinHandle<()>,
}

impl WsTransport {
    /// Spawn the connection task on the current runtime. Nothing is dialled
    /// until the first [`send`](SynthesisTransport::send).
    #[must_use]
    pub fn spawn(
        config: WsTransportConfig,
        inbound_tx: mpsc::UnboundedSender<InboundMessage>,
    ) -> Self {
        let (outbound_tx, outbound_rx) = mpsc::unbounded_channel();
        let task = tokio::spawn(
            ConnectionTask {
                config,
                inbound_tx,
                socket: None,
                retry_at: None,
            }
            .run(outbound_rx),
        );
        Self { outbound_tx, task }
    }
}

impl SynthesisTransport for WsTransport {
    fn send(&self, message: OutboundMessage) -> Result<(), TransportError> {
        self.outbound_tx
            .send(message)
            .map_err(|_| TransportError::Closed)
    }
}

impl Drop for WsTransport {
    fn drop(&mut self) {
        self.task.abort();
    }
}

// ── Connection task ────────────────────────────────────────────────

enum Step {
    Outbound(Option<OutboundMessage>),
    Frame(Option<Result<Message, tungstenite::Error>>),
    Retry,
}

struct ConnectionTask {
    config: WsTransportConfig,
    inbound_tx: mpsc::UnboundedSender<InboundMessage>,
    socket: Option<WsStream>,
    /// Next reconnect attempt while disconnected.
    retry_at: Option<Instant>,
}

impl ConnectionTask {
    async fn run(mut self, mut outbound_rx: mpsc::UnboundedReceiver<OutboundMessage>) {
        loop {
            let step = if let Some(socket) = self.socket.as_mut() {
                tokio::select! {
                    message = outbound_rx.recv() => Step::Outbound(message),
                    frame = socket.next() => Step::Frame(frame),
                }
            } else {
                let deadline = self.retry_at.unwrap_or_else(Instant::now);
                tokio::select! {
                    message = outbound_rx.recv() => Step::Outbound(message),
                    () = tokio::time::sleep_until(deadline), if self.retry_at.is_some() => Step::Retry,
                }
            };

            match step {
                Step::Outbound(Some(message)) => self.deliver(message).await,
                Step::Outbound(None) => {
                    if let Some(mut socket) = self.socket.take() {
                        let _ = socket.close(None).await;
                    }
                    tracing::debug!("Synthesis transport closed");
                    return;
                }
                Step::Frame(Some(Ok(frame))) => self.on_frame(frame),
                Step::Frame(Some(Err(e))) => {
                    tracing::warn!(error = %e, "TTS server connection failed");
                    self.on_disconnect();
                }
                Step::Frame(None) => self.on_disconnect(),
                Step::Retry => {
                    if let Err(e) = self.connect().await {
                        tracing::debug!(error = %e, "Reconnect attempt failed");
                        self.schedule_retry();
                    }
                }
            }
        }
    }

    async fn connect(&mut self) -> Result<(), tungstenite::Error> {
        let (socket, _) = connect_async(self.config.url.as_str()).await?;
        tracing::info!(url = %self.config.url, "Connected to TTS server");
        self.socket = Some(socket);
        self.retry_at = None;
        self.forward(InboundMessage::Connection { connected: true });
        Ok(())
    }

    async fn deliver(&mut self, message: OutboundMessage) {
        if self.socket.is_none()
            && let Err(e) = self.connect().await
        {
            tracing::warn!(url = %self.config.url, error = %e, "Cannot connect to TTS server");
            let was_retrying = self.retry_at.is_some();
            self.schedule_retry();
            if !was_retrying {
                self.forward(InboundMessage::Connection { connected: false });
            }
            self.undelivered(&message, TransportError::Unreachable(e.to_string()));
            return;
        }

        let text = match message.to_json() {
            Ok(text) => text,
            Err(e) => {
                tracing::error!(error = %e, "Failed to encode synthesis message");
                return;
            }
        };

        let Some(socket) = self.socket.as_mut() else {
            return;
        };
        if let Err(e) = socket.send(Message::Text(text.into())).await {
            tracing::warn!(error = %e, "Failed to send to TTS server");
            self.on_disconnect();
            self.undelivered(&message, TransportError::Unreachable(e.to_string()));
        }
    }

    fn on_frame(&self, frame: Message) {
        match frame {
            Message::Binary(bytes) => match decode_audio_frame(&bytes) {
                Ok(chunk) => {
                    tracing::trace!(index = chunk.index, generation = %chunk.generation, bytes = chunk.audio.len(), "Audio chunk");
                    self.forward(chunk.into());
                }
                Err(e) => tracing::warn!(error = %e, "Dropping malformed audio frame"),
            },
            Message::Text(text) => match parse_text_frame(text.as_str()) {
                Ok(control) => self.forward(control.into()),
                Err(e) => tracing::warn!(error = %e, "Dropping malformed control frame"),
            },
            Message::Close(frame) => tracing::debug!(?frame, "TTS server closed the connection"),
            _ => {}
        }
    }

    fn on_disconnect(&mut self) {
        if self.socket.take().is_some() {
            tracing::warn!("Disconnected from TTS server");
            self.forward(InboundMessage::Connection { connected: false });
        }
        self.schedule_retry();
    }

    fn schedule_retry(&mut self) {
        self.retry_at = Some(Instant::now() + self.config.reconnect_delay);
    }

    /// Tell the session a request never reached the server. Cancels are
    /// fire-and-forget and are not reported.
    fn undelivered(&self, message: &OutboundMessage, error: TransportError) {
        if let OutboundMessage::SendSentences(request) = message {
            self.forward(request_error(request.generation, request.start_index, &error));
        }
    }

    fn forward(&self, message: InboundMessage) {
        if self.inbound_tx.send(message).is_err() {
            tracing::debug!("Inbound receiver dropped");
        }
    }
}

fn request_error(
    generation: GenerationId,
    start_index: usize,
    error: &TransportError,
) -> InboundMessage {
    let message = match error {
        TransportError::Unreachable(_) => "Cannot connect to TTS server".to_owned(),
        TransportError::Closed => error.to_string(),
    };
    InboundMessage::Undelivered {
        generation,
        start_index,
        message,
    }
}
