//! Transcript accumulation and the observable session snapshot.

use std::sync::Arc;

use serde::Serialize;
use tokio::sync::watch;

use super::base::{SessionStatus, Speaker, TranscriptMessage};

/// Running text of the current turn for both parties.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct TranscriptBuffer {
    input: String,
    output: String,
}

impl TranscriptBuffer {
    pub fn new() -> Self {
        Self::default()
    }

    /// Append a delta of the user's speech and return the running text.
    pub fn push_input(&mut self, delta: &str) -> &str {
        self.input.push_str(delta);
        &self.input
    }

    /// Append a delta of the agent's speech and return the running text.
    pub fn push_output(&mut self, delta: &str) -> &str {
        self.output.push_str(delta);
        &self.output
    }

    pub fn input(&self) -> &str {
        &self.input
    }

    pub fn output(&self) -> &str {
        &self.output
    }

    /// Finalize the turn.
    ///
    /// Returns the trimmed non-empty texts, user first, and empties both
    /// buffers.
    pub fn flush(&mut self) -> Vec<TranscriptMessage> {
        let mut messages = Vec::with_capacity(2);
        for (speaker, text) in [
            (Speaker::User, std::mem::take(&mut self.input)),
            (Speaker::Teacher, std::mem::take(&mut self.output)),
        ] {
            let trimmed = text.trim();
            if !trimmed.is_empty() {
                messages.push(TranscriptMessage {
                    speaker,
                    text: trimmed.to_string(),
                });
            }
        }
        messages
    }
}

/// Everything a host needs to render the conversation surface.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct SessionSnapshot {
    pub status: SessionStatus,
    pub is_conversing: bool,
    pub live_user_transcript: String,
    pub live_teacher_transcript: String,
    pub error: Option<String>,
}

impl SessionSnapshot {
    /// Enter a fresh conversation.
    pub(crate) fn begin(&mut self) {
        self.status = SessionStatus::Listening;
        self.is_conversing = true;
        self.error = None;
        self.clear_live();
    }

    /// Leave the conversation. Returns false if there was none to leave.
    pub(crate) fn end(&mut self, status: SessionStatus, error: Option<String>) -> bool {
        if !self.is_conversing {
            return false;
        }
        self.status = status;
        self.is_conversing = false;
        if error.is_some() {
            self.error = error;
        }
        true
    }

    pub(crate) fn clear_live(&mut self) {
        self.live_user_transcript.clear();
        self.live_teacher_transcript.clear();
    }
}

/// Shared publisher for [`SessionSnapshot`] changes.
pub type SnapshotSender = Arc<watch::Sender<SessionSnapshot>>;

/// Turn-level state driven by inbound events.
///
/// Updates are dropped once the session has stopped conversing so stragglers
/// from a closing stream cannot overwrite a stopped state.
pub struct TurnState {
    buffer: TranscriptBuffer,
    state: SnapshotSender,
}

impl TurnState {
    pub fn new(state: SnapshotSender) -> Self {
        Self {
            buffer: TranscriptBuffer::new(),
            state,
        }
    }

    pub fn on_input_delta(&mut self, delta: &str) {
        let running = self.buffer.push_input(delta).to_string();
        self.state.send_if_modified(|snap| {
            if !snap.is_conversing {
                return false;
            }
            snap.live_user_transcript = running;
            true
        });
    }

    /// Output transcription means the agent is talking.
    pub fn on_output_delta(&mut self, delta: &str) {
        let running = self.buffer.push_output(delta).to_string();
        self.state.send_if_modified(|snap| {
            if !snap.is_conversing {
                return false;
            }
            snap.live_teacher_transcript = running;
            snap.status = SessionStatus::Speaking;
            true
        });
    }

    /// Finalize the turn and return the messages to deliver.
    pub fn on_turn_complete(&mut self) -> Vec<TranscriptMessage> {
        let messages = self.buffer.flush();
        self.state.send_if_modified(|snap| {
            if !snap.is_conversing {
                return false;
            }
            snap.clear_live();
            snap.status = SessionStatus::Listening;
            true
        });
        messages
    }
}
