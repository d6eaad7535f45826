//! Live conversational audio session.
//!
//! One persistent duplex connection to a remote voice agent: microphone audio
//! streams out as 16kHz PCM frames while synthesized 24kHz speech, running
//! transcriptions, turn boundaries and tool calls stream back in.
//!
//! # Architecture
//!
//! - [`LiveSessionManager`] owns the lifecycle and the observable
//!   [`SessionSnapshot`]
//! - [`CapturePipeline`] converts and forwards captured blocks
//! - [`EventDispatcher`] consumes inbound events strictly in order
//! - [`PlaybackScheduler`] keeps synthesized speech gapless
//! - [`ToolCallDispatcher`] answers tool calls off the event path
//! - [`websocket::LiveWebSocketTransport`] is the concrete transport
//!
//! # Example
//!
//! ```rust,ignore
//! use std::sync::Arc;
//! use waav_tutor::core::live::{LiveSessionConfig, LiveSessionManager};
//!
//! let manager = LiveSessionManager::builder()
//!     .transport(transport)
//!     .audio_input(input)
//!     .audio_output(output)
//!     .on_transcript(Arc::new(|update| Box::pin(async move {
//!         println!("[{}] {}", update.speaker, update.text);
//!     })))
//!     .build()?;
//!
//! manager.start(LiveSessionConfig::default()).await?;
//! // ...
//! manager.stop().await;
//! ```

mod base;
pub mod capture;
pub mod dispatcher;
pub mod playback;
mod session;
pub mod tools;
pub mod transcript;
pub mod websocket;

pub use base::{
    AudioFrame, CAPTURE_SAMPLE_RATE, DEFAULT_CAPTURE_BLOCK_SIZE, DuplexTransport, EncodedAudio,
    InboundEvent, LiveConnection, LiveError, LiveResult, LiveSessionConfig, Modality,
    PLAYBACK_SAMPLE_RATE, SessionStatus, Speaker, ToolCallRequest, ToolCallResponse,
    ToolDeclaration, TranscriptCallback, TranscriptMessage, TranscriptUpdate, TransportSession,
    pcm_mime_type,
};
pub use capture::{AudioInput, AudioSource, CapturePipeline, CaptureStats};
pub use dispatcher::{CONNECTION_LOST_MESSAGE, CONNECTION_UNSTABLE_MESSAGE, EventDispatcher};
pub use playback::{
    AudioOutput, PcmBuffer, PlaybackEndedCallback, PlaybackScheduler, ScheduledPlayback,
};
pub use session::{LiveSessionManager, LiveSessionManagerBuilder};
pub use tools::{ToolCallDispatcher, ToolCallHandler, ToolCallOutcome};
pub use transcript::{SessionSnapshot, TranscriptBuffer};
