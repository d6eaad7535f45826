//! Connection settings for the WebSocket transport.

use std::fmt;
use std::time::Duration;

use zeroize::Zeroize;

/// Default bidirectional streaming endpoint.
pub const DEFAULT_LIVE_ENDPOINT: &str = "wss://generativelanguage.googleapis.com/ws/google.ai.generativelanguage.v1beta.GenerativeService.BidiGenerateContent";

/// Default native-audio model.
pub const DEFAULT_LIVE_MODEL: &str = "models/gemini-2.5-flash-native-audio-preview-09-2025";

/// Header carrying the API key.
pub const DEFAULT_API_KEY_HEADER: &str = "x-goog-api-key";

/// Default time allowed for the handshake plus setup acknowledgement.
pub const DEFAULT_CONNECT_TIMEOUT_SECS: u64 = 10;

/// Settings for [`super::LiveWebSocketTransport`].
#[derive(Clone)]
pub struct LiveTransportConfig {
    /// `wss://` endpoint URL
    pub endpoint_url: String,
    /// API key, sent in `api_key_header`
    pub api_key: String,
    /// Header name for the key; `authorization` sends it as a bearer token
    pub api_key_header: String,
    /// Model identifier sent in the setup message
    pub model: String,
    /// Handshake and setup deadline
    pub connect_timeout: Duration,
}

impl LiveTransportConfig {
    pub fn new(api_key: impl Into<String>) -> Self {
        let mut config = Self::default();
        config.api_key = api_key.into();
        config
    }

    /// Value sent in the key header.
    pub(crate) fn api_key_header_value(&self) -> String {
        if self.api_key_header.eq_ignore_ascii_case("authorization") {
            format!("Bearer {}", self.api_key)
        } else {
            self.api_key.clone()
        }
    }
}

impl Default for LiveTransportConfig {
    fn default() -> Self {
        Self {
            endpoint_url: DEFAULT_LIVE_ENDPOINT.to_string(),
            api_key: String::new(),
            api_key_header: DEFAULT_API_KEY_HEADER.to_string(),
            model: DEFAULT_LIVE_MODEL.to_string(),
            connect_timeout: Duration::from_secs(DEFAULT_CONNECT_TIMEOUT_SECS),
        }
    }
}

impl fmt::Debug for LiveTransportConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("LiveTransportConfig")
            .field("endpoint_url", &self.endpoint_url)
            .field("api_key", &"[REDACTED]")
            .field("api_key_header", &self.api_key_header)
            .field("model", &self.model)
            .field("connect_timeout", &self.connect_timeout)
            .finish()
    }
}

impl Drop for LiveTransportConfig {
    fn drop(&mut self) {
        self.api_key.zeroize();
    }
}
