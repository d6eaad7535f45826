//! Ordered handling of inbound events.
//!
//! A single loop consumes the transport's event channel in arrival order and
//! routes each event:
//!
//! | Event                   | Effect                                          |
//! |-------------------------|-------------------------------------------------|
//! | `ToolCallRequest`       | handled on its own task, response sent back     |
//! | `InputTranscriptDelta`  | appended to the live user transcript            |
//! | `OutputTranscriptDelta` | appended to the live teacher transcript, status speaking |
//! | `TurnComplete`          | finalized turns delivered, status listening     |
//! | `AudioChunk`            | decoded and scheduled for playback              |
//! | `TransportError`        | session torn down with an error                 |
//! | `TransportClosed`       | torn down with an error unless requested        |

use std::sync::Arc;

use parking_lot::Mutex;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, trace, warn};

use super::base::{InboundEvent, TranscriptCallback, TranscriptUpdate};
use super::playback::PlaybackScheduler;
use super::tools::ToolCallDispatcher;
use super::transcript::TurnState;

/// Shown when the transport reports an error.
pub const CONNECTION_UNSTABLE_MESSAGE: &str = "Connection unstable. Tap mic to resume.";

/// Shown when the transport closes without being asked to.
pub const CONNECTION_LOST_MESSAGE: &str = "Connection lost. Tap mic to resume.";

/// Result of routing one event.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DispatchOutcome {
    /// Keep reading events
    Continue,
    /// Stream ended after a requested close
    Closed,
    /// Stream failed; the session must end with this message
    Failed(String),
}

/// Routes inbound events for one session.
pub struct EventDispatcher {
    turn: TurnState,
    playback: Arc<Mutex<PlaybackScheduler>>,
    tools: ToolCallDispatcher,
    on_transcript: Option<TranscriptCallback>,
}

impl EventDispatcher {
    pub fn new(
        turn: TurnState,
        playback: Arc<Mutex<PlaybackScheduler>>,
        tools: ToolCallDispatcher,
        on_transcript: Option<TranscriptCallback>,
    ) -> Self {
        Self {
            turn,
            playback,
            tools,
            on_transcript,
        }
    }

    /// Route one event.
    pub async fn dispatch(&mut self, event: InboundEvent) -> DispatchOutcome {
        trace!("Inbound event: {}", event.kind());

        match event {
            InboundEvent::ToolCallRequest(request) => {
                // Fire and forget; the outcome is logged by the task.
                drop(self.tools.dispatch(request));
            }
            InboundEvent::InputTranscriptDelta(delta) => {
                self.turn.on_input_delta(&delta);
            }
            InboundEvent::OutputTranscriptDelta(delta) => {
                self.turn.on_output_delta(&delta);
            }
            InboundEvent::TurnComplete => {
                let messages = self.turn.on_turn_complete();
                if let Some(callback) = &self.on_transcript {
                    for message in messages {
                        callback(TranscriptUpdate {
                            text: message.text,
                            speaker: message.speaker,
                            is_final: true,
                        })
                        .await;
                    }
                }
            }
            InboundEvent::AudioChunk(chunk) => {
                if let Err(e) = self.playback.lock().enqueue(&chunk) {
                    warn!("Skipping audio chunk: {}", e);
                }
            }
            InboundEvent::TransportError(message) => {
                error!("Live connection error: {}", message);
                return DispatchOutcome::Failed(CONNECTION_UNSTABLE_MESSAGE.to_string());
            }
            InboundEvent::TransportClosed { clean, reason } => {
                if clean {
                    debug!("Live connection closed");
                    return DispatchOutcome::Closed;
                }
                warn!(
                    "Live connection lost: {}",
                    reason.as_deref().unwrap_or("no reason given")
                );
                return DispatchOutcome::Failed(CONNECTION_LOST_MESSAGE.to_string());
            }
        }

        DispatchOutcome::Continue
    }

    /// Consume events until the stream ends or `cancel` fires.
    ///
    /// Returns the failure message if the session has to be torn down.
    pub async fn run(
        mut self,
        mut events: mpsc::Receiver<InboundEvent>,
        cancel: CancellationToken,
    ) -> Option<String> {
        loop {
            let event = tokio::select! {
                biased;
                _ = cancel.cancelled() => return None,
                event = events.recv() => event,
            };

            let Some(event) = event else {
                if cancel.is_cancelled() {
                    return None;
                }
                warn!("Live event stream ended without a close event");
                return Some(CONNECTION_LOST_MESSAGE.to_string());
            };

            match self.dispatch(event).await {
                DispatchOutcome::Continue => {}
                DispatchOutcome::Closed => return None,
                DispatchOutcome::Failed(message) => {
                    if cancel.is_cancelled() {
                        return None;
                    }
                    return Some(message);
                }
            }
        }
    }
}
