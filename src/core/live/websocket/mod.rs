//! WebSocket transport for the live agent.
//!
//! JSON messages over a single persistent WebSocket: one `setup` message,
//! then base64 PCM `realtimeInput` chunks and `toolResponse` messages going
//! out, and `serverContent`/`toolCall` messages coming in.
//!
//! # Example
//!
//! ```rust,ignore
//! use waav_tutor::core::live::{DuplexTransport, LiveSessionConfig};
//! use waav_tutor::core::live::websocket::{LiveTransportConfig, LiveWebSocketTransport};
//!
//! let transport = LiveWebSocketTransport::new(LiveTransportConfig::new("api-key"))?;
//! let connection = transport.open(&LiveSessionConfig::default()).await?;
//! ```

mod client;
mod config;
pub mod messages;

pub use client::{LiveWebSocketTransport, WebSocketSession};
pub use config::{
    DEFAULT_API_KEY_HEADER, DEFAULT_CONNECT_TIMEOUT_SECS, DEFAULT_LIVE_ENDPOINT,
    DEFAULT_LIVE_MODEL, LiveTransportConfig,
};
