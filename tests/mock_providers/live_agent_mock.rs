//! WebSocket Mock Server for the Live Agent
//!
//! Speaks the live JSON protocol: waits for `setup`, answers
//! `setupComplete`, then plays a script of server messages while counting
//! what the client sends.

use futures_util::{SinkExt, StreamExt};
use parking_lot::Mutex;
use serde_json::{Value, json};
use std::net::SocketAddr;
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::{Duration, Instant};
use tokio::net::{TcpListener, TcpStream};
use tokio::task::JoinHandle;
use tokio_tungstenite::tungstenite::handshake::server::{ErrorResponse, Request, Response};
use tokio_tungstenite::{accept_hdr_async, tungstenite::Message};

/// One step the mock agent performs after setup.
#[derive(Debug, Clone)]
pub enum AgentStep {
    /// Send a raw server message
    Send(Value),
    /// Wait until at least this many audio frames have arrived
    WaitForAudio(usize),
    /// Wait until at least this many tool responses have arrived
    WaitForToolResponses(usize),
    Sleep(Duration),
    /// Send a Close frame and stop
    Close,
    /// Drop the TCP connection without a closing handshake
    Drop,
}

/// Everything the mock observed.
#[derive(Default)]
pub struct LiveAgentMockState {
    pub connections: AtomicUsize,
    pub audio_frames: AtomicUsize,
    pub audio_mime_types: Mutex<Vec<String>>,
    pub setup: Mutex<Option<Value>>,
    pub tool_responses: Mutex<Vec<Value>>,
    pub api_key_header: Mutex<Option<String>>,
    pub client_closed: AtomicUsize,
}

impl LiveAgentMockState {
    pub fn audio_frame_count(&self) -> usize {
        self.audio_frames.load(Ordering::SeqCst)
    }

    pub fn tool_response_count(&self) -> usize {
        self.tool_responses.lock().len()
    }
}

pub struct LiveAgentMock {
    pub addr: SocketAddr,
    pub state: Arc<LiveAgentMockState>,
    handle: JoinHandle<()>,
}

impl LiveAgentMock {
    /// Start a mock that runs `script` on every connection.
    pub async fn start(script: Vec<AgentStep>) -> Self {
        Self::spawn(script, None).await
    }

    /// Start a mock that rejects the WebSocket upgrade with `status`.
    pub async fn rejecting(status: u16) -> Self {
        Self::spawn(Vec::new(), Some(status)).await
    }

    async fn spawn(script: Vec<AgentStep>, reject_status: Option<u16>) -> Self {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        let state = Arc::new(LiveAgentMockState::default());

        let accept_state = state.clone();
        let handle = tokio::spawn(async move {
            loop {
                let Ok((stream, _)) = listener.accept().await else {
                    break;
                };
                let state = accept_state.clone();
                let script = script.clone();
                tokio::spawn(async move {
                    if let Err(e) = handle_connection(stream, state, script, reject_status).await {
                        eprintln!("Mock live agent connection ended: {}", e);
                    }
                });
            }
        });

        Self {
            addr,
            state,
            handle,
        }
    }

    pub fn url(&self) -> String {
        format!("ws://{}/live", self.addr)
    }
}

impl Drop for LiveAgentMock {
    fn drop(&mut self) {
        self.handle.abort();
    }
}

async fn wait_until(mut condition: impl FnMut() -> bool, timeout: Duration) -> bool {
    let deadline = Instant::now() + timeout;
    while Instant::now() < deadline {
        if condition() {
            return true;
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
    condition()
}

async fn handle_connection(
    stream: TcpStream,
    state: Arc<LiveAgentMockState>,
    script: Vec<AgentStep>,
    reject_status: Option<u16>,
) -> Result<(), Box<dyn std::error::Error + Send + Sync>> {
    let header_state = state.clone();
    let callback = move |request: &Request, response: Response| -> Result<Response, ErrorResponse> {
        let key = request
            .headers()
            .get("x-goog-api-key")
            .or_else(|| request.headers().get("authorization"))
            .and_then(|v| v.to_str().ok())
            .map(str::to_string);
        *header_state.api_key_header.lock() = key;

        match reject_status {
            Some(status) => Err(http::Response::builder()
                .status(status)
                .body(Some("rejected".to_string()))
                .unwrap()),
            None => Ok(response),
        }
    };

    let ws_stream = accept_hdr_async(stream, callback).await?;
    state.connections.fetch_add(1, Ordering::SeqCst);
    let (mut write, mut read) = ws_stream.split();

    // The first message must be the setup.
    let setup = loop {
        match read.next().await {
            Some(Ok(Message::Text(text))) => break serde_json::from_str::<Value>(text.as_str())?,
            Some(Ok(_)) => continue,
            _ => return Ok(()),
        }
    };
    *state.setup.lock() = Some(setup);
    write
        .send(Message::Text(json!({"setupComplete": {}}).to_string().into()))
        .await?;

    let reader_state = state.clone();
    let reader = tokio::spawn(async move {
        while let Some(msg) = read.next().await {
            match msg {
                Ok(Message::Text(text)) => {
                    let Ok(value) = serde_json::from_str::<Value>(text.as_str()) else {
                        continue;
                    };
                    if let Some(chunks) = value["realtimeInput"]["mediaChunks"].as_array() {
                        let mut mime_types = reader_state.audio_mime_types.lock();
                        for chunk in chunks {
                            if let Some(mime) = chunk["mimeType"].as_str() {
                                mime_types.push(mime.to_string());
                            }
                        }
                        reader_state.audio_frames.fetch_add(chunks.len(), Ordering::SeqCst);
                    }
                    if let Some(responses) = value["toolResponse"]["functionResponses"].as_array() {
                        reader_state
                            .tool_responses
                            .lock()
                            .extend(responses.iter().cloned());
                    }
                }
                Ok(Message::Close(_)) => {
                    reader_state.client_closed.fetch_add(1, Ordering::SeqCst);
                    break;
                }
                Ok(_) => {}
                Err(_) => break,
            }
        }
    });

    for step in script {
        match step {
            AgentStep::Send(message) => {
                write.send(Message::Text(message.to_string().into())).await?;
            }
            AgentStep::WaitForAudio(count) => {
                let state = state.clone();
                wait_until(move || state.audio_frame_count() >= count, Duration::from_secs(5)).await;
            }
            AgentStep::WaitForToolResponses(count) => {
                let state = state.clone();
                wait_until(move || state.tool_response_count() >= count, Duration::from_secs(5)).await;
            }
            AgentStep::Sleep(duration) => tokio::time::sleep(duration).await,
            AgentStep::Close => {
                write.send(Message::Close(None)).await?;
                let _ = tokio::time::timeout(Duration::from_secs(1), reader).await;
                return Ok(());
            }
            AgentStep::Drop => {
                reader.abort();
                return Ok(());
            }
        }
    }

    // Script finished: keep the connection open until the client leaves.
    let _ = reader.await;
    Ok(())
}

// =============================================================================
// Server message builders
// =============================================================================

pub fn input_transcription(text: &str) -> Value {
    json!({"serverContent": {"inputTranscription": {"text": text}}})
}

pub fn output_transcription(text: &str) -> Value {
    json!({"serverContent": {"outputTranscription": {"text": text}}})
}

pub fn turn_complete() -> Value {
    json!({"serverContent": {"turnComplete": true}})
}

/// Agent speech as one `inlineData` part.
pub fn audio_chunk(base64_pcm: &str) -> Value {
    json!({
        "serverContent": {
            "modelTurn": {
                "parts": [{
                    "inlineData": {"mimeType": "audio/pcm;rate=24000", "data": base64_pcm}
                }]
            }
        }
    })
}

pub fn tool_call(id: &str, name: &str, args: Value) -> Value {
    json!({"toolCall": {"functionCalls": [{"id": id, "name": name, "args": args}]}})
}
