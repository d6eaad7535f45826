//! Finalized conversation transcript and the session export.

use std::sync::Arc;
use std::time::{SystemTime, UNIX_EPOCH};

use parking_lot::Mutex;
use serde::{Deserialize, Serialize};

use super::blueprint::SessionBlueprint;
use super::glossary::GlossaryWord;
use crate::core::live::{Speaker, TranscriptCallback, TranscriptMessage, TranscriptUpdate};

/// Fewest messages worth handing to the summary step.
pub const MIN_MESSAGES_FOR_SUMMARY: usize = 2;

/// Ordered log of finalized turns.
#[derive(Debug, Default)]
pub struct TranscriptLog {
    messages: Mutex<Vec<TranscriptMessage>>,
}

impl TranscriptLog {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    /// Callback to register with the session manager.
    pub fn callback(self: &Arc<Self>) -> TranscriptCallback {
        let log = Arc::clone(self);
        let callback: TranscriptCallback = Arc::new(move |update: TranscriptUpdate| {
            let log = log.clone();
            Box::pin(async move {
                if update.is_final {
                    log.push(update.speaker, update.text);
                }
            })
        });
        callback
    }

    pub fn push(&self, speaker: Speaker, text: impl Into<String>) {
        self.messages.lock().push(TranscriptMessage {
            speaker,
            text: text.into(),
        });
    }

    pub fn messages(&self) -> Vec<TranscriptMessage> {
        self.messages.lock().clone()
    }

    pub fn len(&self) -> usize {
        self.messages.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.messages.lock().is_empty()
    }

    pub fn clear(&self) {
        self.messages.lock().clear();
    }

    pub fn ready_for_summary(&self) -> bool {
        self.len() >= MIN_MESSAGES_FOR_SUMMARY
    }

    /// Plain-text rendering, one `Student:` or `Teacher:` line per message.
    pub fn render(&self) -> String {
        self.messages
            .lock()
            .iter()
            .map(|m| {
                let label = match m.speaker {
                    Speaker::User => "Student",
                    Speaker::Teacher => "Teacher",
                };
                format!("{}: {}", label, m.text)
            })
            .collect::<Vec<_>>()
            .join("\n")
    }
}

/// Everything a finished session produced, as written by `run --transcript`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SessionTranscript {
    pub id: String,
    /// Seconds since the Unix epoch when the export was taken
    pub recorded_at: u64,
    #[serde(flatten)]
    pub blueprint: SessionBlueprint,
    pub transcript: Vec<TranscriptMessage>,
    pub glossary: Vec<GlossaryWord>,
}

impl SessionTranscript {
    pub fn new(
        blueprint: SessionBlueprint,
        transcript: Vec<TranscriptMessage>,
        glossary: Vec<GlossaryWord>,
    ) -> Self {
        let recorded_at = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .map(|d| d.as_secs())
            .unwrap_or_default();
        Self {
            id: uuid::Uuid::new_v4().to_string(),
            recorded_at,
            blueprint,
            transcript,
            glossary,
        }
    }

    pub fn to_json(&self) -> serde_json::Result<String> {
        serde_json::to_string_pretty(self)
    }
}
