pub mod audio;
pub mod live;

// Re-export commonly used types for convenience
pub use live::{
    DuplexTransport, LiveError, LiveResult, LiveSessionConfig, LiveSessionManager,
    SessionSnapshot, SessionStatus, Speaker, ToolCallHandler, ToolCallRequest, TranscriptMessage,
    TranscriptUpdate,
};

pub use audio::{WavFileInput, WavRecorderOutput};
