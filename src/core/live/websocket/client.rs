//! WebSocket client for the live agent.
//!
//! # Connection Lifecycle
//!
//! 1. The HTTP upgrade request is sent with the API key header
//! 2. A `setup` message is sent and the client waits for `setupComplete`
//! 3. A connection task forwards queued outbound messages and turns inbound
//!    frames into [`InboundEvent`]s on an ordered channel
//! 4. `close()` sends a close frame; the stream then ends with a clean
//!    `TransportClosed`. Any other ending is reported as unclean.
//!
//! The connection is never re-established automatically.

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

use async_trait::async_trait;
use futures::stream::{SplitSink, SplitStream};
use futures::{SinkExt, StreamExt};
use http::HeaderValue;
use parking_lot::Mutex;
use tokio::net::TcpStream;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio_tungstenite::tungstenite::Message;
use tokio_tungstenite::tungstenite::client::IntoClientRequest;
use tokio_tungstenite::{MaybeTlsStream, WebSocketStream};
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, trace, warn};

use super::config::LiveTransportConfig;
use super::messages::{ClientMessage, ServerMessage};
use crate::core::live::base::{
    AudioFrame, DuplexTransport, InboundEvent, LiveConnection, LiveError, LiveResult,
    LiveSessionConfig, ToolCallResponse, TransportSession,
};
use crate::utils::endpoint_validation::validate_endpoint_url;

/// Capacity of the control message channel.
const CONTROL_CHANNEL_CAPACITY: usize = 32;

/// Capacity of the audio channel. Kept small so a stalled socket drops
/// capture frames instead of queueing them.
const AUDIO_CHANNEL_CAPACITY: usize = 2;

/// Capacity of the inbound event channel.
const EVENT_CHANNEL_CAPACITY: usize = 256;

/// How long `close()` waits for the close frame to go out.
const CLOSE_TIMEOUT: Duration = Duration::from_secs(2);

type WsStream = WebSocketStream<MaybeTlsStream<TcpStream>>;
type WsSink = SplitSink<WsStream, Message>;
type WsSource = SplitStream<WsStream>;

/// [`DuplexTransport`] over a JSON WebSocket protocol.
#[derive(Debug)]
pub struct LiveWebSocketTransport {
    config: LiveTransportConfig,
}

impl LiveWebSocketTransport {
    /// Create a transport after validating the endpoint and key.
    pub fn new(config: LiveTransportConfig) -> LiveResult<Self> {
        if config.api_key.is_empty() {
            return Err(LiveError::AuthenticationFailed(
                "API key is required".to_string(),
            ));
        }
        validate_endpoint_url(&config.endpoint_url)
            .map_err(|e| LiveError::InvalidConfiguration(e.to_string()))?;
        if config.model.is_empty() {
            return Err(LiveError::InvalidConfiguration(
                "model is required".to_string(),
            ));
        }
        Ok(Self { config })
    }

    pub fn config(&self) -> &LiveTransportConfig {
        &self.config
    }

    fn build_request(&self) -> LiveResult<http::Request<()>> {
        let mut request = self
            .config
            .endpoint_url
            .as_str()
            .into_client_request()
            .map_err(|e| LiveError::InvalidConfiguration(e.to_string()))?;

        let header_name = http::HeaderName::from_bytes(self.config.api_key_header.as_bytes())
            .map_err(|e| LiveError::InvalidConfiguration(format!("API key header: {}", e)))?;
        let mut header_value = HeaderValue::from_str(&self.config.api_key_header_value())
            .map_err(|_| LiveError::AuthenticationFailed("API key is not a valid header value".to_string()))?;
        header_value.set_sensitive(true);
        request.headers_mut().insert(header_name, header_value);

        Ok(request)
    }

    async fn handshake(&self, config: &LiveSessionConfig) -> LiveResult<(WsSink, WsSource)> {
        let request = self.build_request()?;

        let (ws_stream, _response) = tokio_tungstenite::connect_async(request)
            .await
            .map_err(map_connect_error)?;
        info!("Connected to live endpoint");

        let (mut sink, mut stream) = ws_stream.split();

        let setup = ClientMessage::setup(&self.config.model, config);
        let json = serde_json::to_string(&setup)
            .map_err(|e| LiveError::SerializationError(e.to_string()))?;
        sink.send(Message::Text(json.into()))
            .await
            .map_err(|e| LiveError::WebSocketError(e.to_string()))?;

        wait_for_setup_complete(&mut stream).await?;
        debug!("Setup acknowledged");

        Ok((sink, stream))
    }
}

fn map_connect_error(e: tokio_tungstenite::tungstenite::Error) -> LiveError {
    use tokio_tungstenite::tungstenite::Error as WsError;
    match &e {
        WsError::Http(response)
            if response.status() == http::StatusCode::UNAUTHORIZED
                || response.status() == http::StatusCode::FORBIDDEN =>
        {
            LiveError::AuthenticationFailed(format!("endpoint returned {}", response.status()))
        }
        _ => LiveError::ConnectionFailed(e.to_string()),
    }
}

async fn wait_for_setup_complete(stream: &mut WsSource) -> LiveResult<()> {
    while let Some(msg) = stream.next().await {
        let text = match msg {
            Ok(Message::Text(text)) => text.as_str().to_string(),
            Ok(Message::Binary(data)) => String::from_utf8_lossy(&data).into_owned(),
            Ok(Message::Close(frame)) => {
                let reason = frame
                    .map(|f| f.reason.as_str().to_string())
                    .unwrap_or_else(|| "no reason given".to_string());
                return Err(LiveError::ConnectionFailed(format!(
                    "closed during setup: {}",
                    reason
                )));
            }
            Ok(_) => continue,
            Err(e) => return Err(LiveError::WebSocketError(e.to_string())),
        };

        match serde_json::from_str::<ServerMessage>(&text) {
            Ok(message) if message.is_setup_complete() => return Ok(()),
            Ok(_) => trace!("Ignoring message received before setup completed"),
            Err(e) => warn!("Failed to parse setup response: {}", e),
        }
    }
    Err(LiveError::ConnectionFailed(
        "stream ended during setup".to_string(),
    ))
}

#[async_trait]
impl DuplexTransport for LiveWebSocketTransport {
    async fn open(&self, config: &LiveSessionConfig) -> LiveResult<LiveConnection> {
        let (sink, stream) = tokio::time::timeout(self.config.connect_timeout, self.handshake(config))
            .await
            .map_err(|_| {
                LiveError::Timeout(format!(
                    "no setup acknowledgement within {:?}",
                    self.config.connect_timeout
                ))
            })??;

        let (control_tx, control_rx) = mpsc::channel(CONTROL_CHANNEL_CAPACITY);
        let (audio_tx, audio_rx) = mpsc::channel(AUDIO_CHANNEL_CAPACITY);
        let (event_tx, event_rx) = mpsc::channel(EVENT_CHANNEL_CAPACITY);

        let shared = Arc::new(SessionShared {
            connected: AtomicBool::new(true),
            close_requested: AtomicBool::new(false),
            close_signal: CancellationToken::new(),
        });

        let handle = tokio::spawn(run_connection(
            sink,
            stream,
            control_rx,
            audio_rx,
            event_tx,
            shared.clone(),
        ));

        let session = WebSocketSession {
            control_tx,
            audio_tx,
            shared,
            connection_handle: Mutex::new(Some(handle)),
        };

        Ok(LiveConnection {
            session: Arc::new(session),
            events: event_rx,
        })
    }
}

/// State shared between a session handle and its connection task.
struct SessionShared {
    connected: AtomicBool,
    close_requested: AtomicBool,
    close_signal: CancellationToken,
}

/// Handle to one open WebSocket connection.
pub struct WebSocketSession {
    control_tx: mpsc::Sender<ClientMessage>,
    audio_tx: mpsc::Sender<AudioFrame>,
    shared: Arc<SessionShared>,
    connection_handle: Mutex<Option<JoinHandle<()>>>,
}

#[async_trait]
impl TransportSession for WebSocketSession {
    fn send_audio(&self, frame: AudioFrame) -> LiveResult<()> {
        if !self.is_ready() {
            return Err(LiveError::NotConnected);
        }
        self.audio_tx.try_send(frame).map_err(|e| match e {
            mpsc::error::TrySendError::Full(_) => LiveError::Backpressure,
            mpsc::error::TrySendError::Closed(_) => LiveError::NotConnected,
        })
    }

    async fn send_tool_response(&self, response: ToolCallResponse) -> LiveResult<()> {
        if !self.is_ready() {
            return Err(LiveError::NotConnected);
        }
        self.control_tx
            .send(ClientMessage::tool_response(response))
            .await
            .map_err(|_| LiveError::NotConnected)
    }

    async fn close(&self) -> LiveResult<()> {
        if self.shared.close_requested.swap(true, Ordering::SeqCst) {
            return Ok(());
        }
        self.shared.close_signal.cancel();

        let handle = self.connection_handle.lock().take();
        if let Some(mut handle) = handle {
            if tokio::time::timeout(CLOSE_TIMEOUT, &mut handle).await.is_err() {
                warn!("Live connection did not close in time, aborting");
                handle.abort();
            }
        }
        Ok(())
    }

    fn is_ready(&self) -> bool {
        self.shared.connected.load(Ordering::SeqCst)
            && !self.shared.close_requested.load(Ordering::SeqCst)
    }
}

impl Drop for WebSocketSession {
    fn drop(&mut self) {
        self.shared.close_requested.store(true, Ordering::SeqCst);
        self.shared.close_signal.cancel();
    }
}

async fn send_json(sink: &mut WsSink, message: &ClientMessage) -> Result<(), String> {
    let json = serde_json::to_string(message).map_err(|e| e.to_string())?;
    sink.send(Message::Text(json.into()))
        .await
        .map_err(|e| e.to_string())
}

/// Forward parsed server messages. Returns false if the receiver is gone.
async fn forward_text(text: &str, event_tx: &mpsc::Sender<InboundEvent>) -> bool {
    let message = match serde_json::from_str::<ServerMessage>(text) {
        Ok(message) => message,
        Err(e) => {
            warn!("Failed to parse server message: {}", e);
            return true;
        }
    };

    if let Some(go_away) = &message.go_away {
        warn!(
            "Server will close the connection soon (time left: {})",
            go_away.time_left.as_deref().unwrap_or("unknown")
        );
    }

    for event in message.into_events() {
        if event_tx.send(event).await.is_err() {
            return false;
        }
    }
    true
}

async fn run_connection(
    mut sink: WsSink,
    mut stream: WsSource,
    mut control_rx: mpsc::Receiver<ClientMessage>,
    mut audio_rx: mpsc::Receiver<AudioFrame>,
    event_tx: mpsc::Sender<InboundEvent>,
    shared: Arc<SessionShared>,
) {
    let mut failure: Option<String> = None;
    let mut close_reason: Option<String> = None;

    loop {
        tokio::select! {
            biased;

            _ = shared.close_signal.cancelled() => {
                if let Err(e) = sink.send(Message::Close(None)).await {
                    debug!("Failed to send close frame: {}", e);
                }
                break;
            }

            Some(message) = control_rx.recv() => {
                if let Err(e) = send_json(&mut sink, &message).await {
                    error!("Failed to send WebSocket message: {}", e);
                    failure = Some(e);
                    break;
                }
            }

            Some(frame) = audio_rx.recv() => {
                if let Err(e) = send_json(&mut sink, &ClientMessage::audio(&frame)).await {
                    error!("Failed to send audio frame: {}", e);
                    failure = Some(e);
                    break;
                }
            }

            msg = stream.next() => {
                match msg {
                    Some(Ok(Message::Text(text))) => {
                        if !forward_text(text.as_str(), &event_tx).await {
                            debug!("Event receiver dropped, stopping connection task");
                            break;
                        }
                    }
                    Some(Ok(Message::Binary(data))) => {
                        let text = String::from_utf8_lossy(&data);
                        if !forward_text(&text, &event_tx).await {
                            break;
                        }
                    }
                    Some(Ok(Message::Ping(data))) => {
                        if let Err(e) = sink.send(Message::Pong(data)).await {
                            warn!("Failed to send pong: {}", e);
                        }
                    }
                    Some(Ok(Message::Close(frame))) => {
                        close_reason = frame.map(|f| format!("{} {}", f.code, f.reason.as_str()));
                        info!(
                            "WebSocket closed by server: {}",
                            close_reason.as_deref().unwrap_or("no reason given")
                        );
                        break;
                    }
                    Some(Ok(_)) => {}
                    Some(Err(e)) => {
                        error!("WebSocket error: {}", e);
                        failure = Some(e.to_string());
                        break;
                    }
                    None => break,
                }
            }
        }
    }

    shared.connected.store(false, Ordering::SeqCst);

    let requested = shared.close_requested.load(Ordering::SeqCst);
    let terminal = match failure {
        Some(message) if !requested => InboundEvent::TransportError(message),
        _ => InboundEvent::TransportClosed {
            clean: requested,
            reason: close_reason,
        },
    };
    // Receiver may already be gone during teardown.
    let _ = event_tx.send(terminal).await;
    debug!("Live connection task finished");
}
