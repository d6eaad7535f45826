//! Base traits and types for the live conversational audio session.
//!
//! This module defines the foundational abstractions shared by every part of
//! the live session: the error type, the externally visible session status,
//! the inbound event model, and the transport traits that the concrete
//! WebSocket client implements.
//!
//! # Audio Format
//!
//! - Capture: mono PCM 16-bit signed little-endian at 16kHz
//! - Playback: mono PCM 16-bit signed little-endian at 24kHz

use async_trait::async_trait;
use bytes::Bytes;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;
use thiserror::Error;
use tokio::sync::mpsc;

/// Sample rate of outbound microphone audio.
pub const CAPTURE_SAMPLE_RATE: u32 = 16000;

/// Sample rate of inbound synthesized speech.
pub const PLAYBACK_SAMPLE_RATE: u32 = 24000;

/// Default number of samples per captured block (~256ms at 16kHz).
pub const DEFAULT_CAPTURE_BLOCK_SIZE: usize = 4096;

// =============================================================================
// Error Types
// =============================================================================

/// Errors that can occur during live session operations.
#[derive(Debug, Error)]
pub enum LiveError {
    /// Connection to the agent endpoint failed
    #[error("Connection failed: {0}")]
    ConnectionFailed(String),

    /// Authentication failed
    #[error("Authentication failed: {0}")]
    AuthenticationFailed(String),

    /// Invalid configuration
    #[error("Invalid configuration: {0}")]
    InvalidConfiguration(String),

    /// Audio input or output device could not be acquired
    #[error("Audio device unavailable: {0}")]
    DeviceUnavailable(String),

    /// WebSocket error
    #[error("WebSocket error: {0}")]
    WebSocketError(String),

    /// Serialization error
    #[error("Serialization error: {0}")]
    SerializationError(String),

    /// Operation timeout
    #[error("Operation timed out: {0}")]
    Timeout(String),

    /// Not connected
    #[error("Not connected")]
    NotConnected,

    /// Outbound queue is full; the frame was not accepted
    #[error("Outbound queue full")]
    Backpressure,

    /// A session is already running on this manager
    #[error("A session is already active (status: {0})")]
    SessionActive(SessionStatus),

    /// Inbound audio chunk could not be decoded
    #[error("Audio decode failed: {0}")]
    DecodeFailed(String),

    /// Playback backend rejected a buffer
    #[error("Playback error: {0}")]
    Playback(String),

    /// Internal error
    #[error("Internal error: {0}")]
    InternalError(String),
}

/// Result type for live session operations.
pub type LiveResult<T> = Result<T, LiveError>;

// =============================================================================
// Session Status
// =============================================================================

/// Externally visible status of the live session.
///
/// `Idle` is both the initial state and the only state from which a new
/// session may be started.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SessionStatus {
    /// No session running
    #[default]
    Idle,
    /// Session running, waiting for the agent to speak
    Listening,
    /// Agent output transcription is streaming
    Speaking,
    /// User stopped the session; downstream summarization pending
    Processing,
}

impl SessionStatus {
    /// Whether a new session may be started from this status.
    #[inline]
    pub fn can_start(&self) -> bool {
        matches!(self, SessionStatus::Idle)
    }

    /// Whether a conversation is running in this status.
    #[inline]
    pub fn is_conversing(&self) -> bool {
        matches!(self, SessionStatus::Listening | SessionStatus::Speaking)
    }
}

impl fmt::Display for SessionStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SessionStatus::Idle => write!(f, "idle"),
            SessionStatus::Listening => write!(f, "listening"),
            SessionStatus::Speaking => write!(f, "speaking"),
            SessionStatus::Processing => write!(f, "processing"),
        }
    }
}

// =============================================================================
// Transcript Types
// =============================================================================

/// Party that produced a piece of transcript.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Speaker {
    /// The student (input transcription)
    User,
    /// The remote agent (output transcription)
    Teacher,
}

impl fmt::Display for Speaker {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Speaker::User => write!(f, "user"),
            Speaker::Teacher => write!(f, "teacher"),
        }
    }
}

/// A finalized turn of transcript.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TranscriptMessage {
    pub speaker: Speaker,
    pub text: String,
}

/// Payload delivered to the host's transcript callback.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TranscriptUpdate {
    pub text: String,
    pub speaker: Speaker,
    /// Always true: running values are exposed through the session snapshot
    pub is_final: bool,
}

// =============================================================================
// Tool Calls
// =============================================================================

/// Function call requested by the remote agent.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ToolCallRequest {
    /// Correlation id, echoed in the response
    pub id: String,
    /// Function name
    pub name: String,
    /// Free-form arguments
    #[serde(default)]
    pub args: serde_json::Map<String, serde_json::Value>,
}

impl ToolCallRequest {
    /// Get a string argument by key.
    pub fn str_arg(&self, key: &str) -> Option<&str> {
        self.args.get(key).and_then(|v| v.as_str())
    }
}

/// Result of a function call, sent back to the agent.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ToolCallResponse {
    pub id: String,
    pub name: String,
    pub result: serde_json::Value,
}

/// Declaration of a function the agent may call.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ToolDeclaration {
    /// Function name
    pub name: String,
    /// Function description
    #[serde(skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    /// JSON schema for parameters
    #[serde(skip_serializing_if = "Option::is_none")]
    pub parameters: Option<serde_json::Value>,
}

// =============================================================================
// Audio Payloads
// =============================================================================

/// One captured block of microphone audio, already in wire format.
#[derive(Debug, Clone)]
pub struct AudioFrame {
    /// PCM 16-bit signed little-endian samples
    pub data: Bytes,
    /// Format tag, e.g. `audio/pcm;rate=16000`
    pub mime_type: String,
}

/// Inbound synthesized audio, still encoded as received from the transport.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EncodedAudio {
    /// Base64 PCM 16-bit signed little-endian samples
    pub data: String,
    /// Format tag, if the agent supplied one
    pub mime_type: Option<String>,
}

/// Build the MIME tag for linear PCM at a given sample rate.
pub fn pcm_mime_type(sample_rate: u32) -> String {
    format!("audio/pcm;rate={}", sample_rate)
}

// =============================================================================
// Inbound Events
// =============================================================================

/// Server event delivered to the dispatcher, in arrival order.
#[derive(Debug, Clone, PartialEq)]
pub enum InboundEvent {
    /// The agent invoked a function
    ToolCallRequest(ToolCallRequest),
    /// Partial text of the user's speech
    InputTranscriptDelta(String),
    /// Partial text of the agent's speech
    OutputTranscriptDelta(String),
    /// The agent signalled the end of a turn
    TurnComplete,
    /// A chunk of synthesized speech
    AudioChunk(EncodedAudio),
    /// The transport reported an error frame
    TransportError(String),
    /// The transport stream ended
    TransportClosed {
        /// True only if the closure was requested by the caller
        clean: bool,
        /// Close reason reported by the peer, if any
        reason: Option<String>,
    },
}

impl InboundEvent {
    /// Short label used in logs.
    pub fn kind(&self) -> &'static str {
        match self {
            InboundEvent::ToolCallRequest(_) => "tool_call",
            InboundEvent::InputTranscriptDelta(_) => "input_transcript_delta",
            InboundEvent::OutputTranscriptDelta(_) => "output_transcript_delta",
            InboundEvent::TurnComplete => "turn_complete",
            InboundEvent::AudioChunk(_) => "audio_chunk",
            InboundEvent::TransportError(_) => "transport_error",
            InboundEvent::TransportClosed { .. } => "transport_closed",
        }
    }
}

// =============================================================================
// Session Configuration
// =============================================================================

/// Response modality requested from the agent.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum Modality {
    /// Synthesized speech
    #[default]
    Audio,
    /// Plain text
    Text,
}

/// Per-conversation parameters supplied by the host when opening a session.
///
/// Voice, instruction and tools are opaque payload to the core.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LiveSessionConfig {
    /// Response modality (audio for spoken conversation)
    #[serde(default)]
    pub response_modality: Modality,
    /// Prebuilt voice name
    #[serde(default)]
    pub voice: Option<String>,
    /// System instruction text
    #[serde(default)]
    pub system_instruction: Option<String>,
    /// Tools the agent may call
    #[serde(default)]
    pub tools: Vec<ToolDeclaration>,
    /// Request transcription of the user's speech
    #[serde(default = "default_true")]
    pub input_transcription: bool,
    /// Request transcription of the agent's speech
    #[serde(default = "default_true")]
    pub output_transcription: bool,
}

fn default_true() -> bool {
    true
}

impl Default for LiveSessionConfig {
    fn default() -> Self {
        Self {
            response_modality: Modality::Audio,
            voice: None,
            system_instruction: None,
            tools: Vec::new(),
            input_transcription: true,
            output_transcription: true,
        }
    }
}

// =============================================================================
// Callback Types
// =============================================================================

/// Callback type for finalized transcript turns.
pub type TranscriptCallback =
    Arc<dyn Fn(TranscriptUpdate) -> Pin<Box<dyn Future<Output = ()> + Send>> + Send + Sync>;

// =============================================================================
// Transport Traits
// =============================================================================

/// An open duplex connection to the remote agent.
///
/// Implementations must be safe to share between the capture task, the
/// dispatcher and the tool-call tasks.
#[async_trait]
pub trait TransportSession: Send + Sync {
    /// Queue an audio frame for sending without waiting on the network.
    ///
    /// Returns `Backpressure` or `NotConnected` when the frame was not
    /// accepted; callers drop such frames.
    fn send_audio(&self, frame: AudioFrame) -> LiveResult<()>;

    /// Send one tool-call response.
    async fn send_tool_response(&self, response: ToolCallResponse) -> LiveResult<()>;

    /// Close the connection. Idempotent.
    async fn close(&self) -> LiveResult<()>;

    /// Check whether the connection is open and accepting frames.
    fn is_ready(&self) -> bool;
}

/// An established connection plus its ordered inbound event stream.
pub struct LiveConnection {
    pub session: Arc<dyn TransportSession>,
    pub events: mpsc::Receiver<InboundEvent>,
}

impl fmt::Debug for LiveConnection {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("LiveConnection")
            .field("ready", &self.session.is_ready())
            .finish()
    }
}

/// Factory for duplex connections.
///
/// Connection-establishment failures surface from `open`; failures after
/// establishment arrive as `TransportError`/`TransportClosed` events.
#[async_trait]
pub trait DuplexTransport: Send + Sync {
    /// Open one persistent bidirectional stream for a conversation.
    async fn open(&self, config: &LiveSessionConfig) -> LiveResult<LiveConnection>;
}
