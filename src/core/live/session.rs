//! Live session lifecycle.
//!
//! [`LiveSessionManager`] owns at most one conversation at a time. Starting
//! acquires the input device, opens the transport, seeds the playback clock
//! and spawns the capture and dispatch tasks. Stopping releases everything in
//! a fixed order and is idempotent; a stop that races an in-flight start wins.

use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};

use parking_lot::Mutex;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};
use uuid::Uuid;

use super::base::{
    CAPTURE_SAMPLE_RATE, DEFAULT_CAPTURE_BLOCK_SIZE, DuplexTransport, LiveError, LiveResult,
    LiveSessionConfig, SessionStatus, TranscriptCallback, TransportSession,
};
use super::capture::{AudioInput, CapturePipeline};
use super::dispatcher::EventDispatcher;
use super::playback::{AudioOutput, PlaybackScheduler};
use super::tools::{ToolCallDispatcher, ToolCallHandler};
use super::transcript::{SessionSnapshot, SnapshotSender, TurnState};

/// Resources of one running conversation.
struct ActiveSession {
    id: Uuid,
    generation: u64,
    session: Arc<dyn TransportSession>,
    capture: CapturePipeline,
    playback: Arc<Mutex<PlaybackScheduler>>,
    cancel: CancellationToken,
    dispatcher: Option<JoinHandle<()>>,
}

impl ActiveSession {
    /// Release capture, playback and transport, in that order.
    async fn release(&mut self) {
        self.cancel.cancel();
        if let Some(stats) = self.capture.stop().await {
            debug!(
                session_id = %self.id,
                "Capture released after {} frames ({} dropped)",
                stats.frames_sent, stats.frames_dropped
            );
        }

        let halted = self.playback.lock().halt_all();
        debug!(session_id = %self.id, "Halted {} playback buffers", halted);

        if let Err(e) = self.session.close().await {
            warn!(session_id = %self.id, "Error closing live connection: {}", e);
        }
    }
}

impl Drop for ActiveSession {
    fn drop(&mut self) {
        self.cancel.cancel();
    }
}

/// Why a session is being torn down.
#[derive(Debug, Clone, PartialEq, Eq)]
enum TeardownCause {
    /// Host asked to stop; status goes to processing
    UserStop,
    /// Transport failed; status goes back to idle with the message
    TransportFailure { generation: u64, message: String },
}

struct ManagerInner {
    transport: Arc<dyn DuplexTransport>,
    input: Arc<dyn AudioInput>,
    output: Arc<dyn AudioOutput>,
    tool_handler: Option<Arc<dyn ToolCallHandler>>,
    on_transcript: Option<TranscriptCallback>,
    capture_block_size: usize,
    state: SnapshotSender,
    active: tokio::sync::Mutex<Option<ActiveSession>>,
    generation: AtomicU64,
}

impl ManagerInner {
    fn is_current(&self, generation: u64) -> bool {
        self.generation.load(Ordering::SeqCst) == generation && self.state.borrow().is_conversing
    }

    async fn establish(
        self: &Arc<Self>,
        config: &LiveSessionConfig,
        id: Uuid,
        generation: u64,
    ) -> LiveResult<()> {
        let source = self
            .input
            .open(CAPTURE_SAMPLE_RATE, self.capture_block_size)?;
        debug!(session_id = %id, "Audio input acquired");

        let connection = self.transport.open(config).await?;
        debug!(session_id = %id, "Live connection established");

        let mut active = self.active.lock().await;
        if !self.is_current(generation) {
            info!(session_id = %id, "Session stopped while connecting, releasing");
            drop(source);
            if let Err(e) = connection.session.close().await {
                debug!("Error closing superseded connection: {}", e);
            }
            return Ok(());
        }

        if let Some(mut previous) = active.take() {
            warn!(session_id = %previous.id, "Releasing session left behind by a failed teardown");
            previous.release().await;
        }

        let cancel = CancellationToken::new();
        let session = connection.session;
        let playback = Arc::new(Mutex::new(PlaybackScheduler::new(self.output.clone())));
        let capture = CapturePipeline::start(
            source,
            session.clone(),
            CAPTURE_SAMPLE_RATE,
            cancel.child_token(),
        );
        let tools = ToolCallDispatcher::new(
            self.tool_handler.clone(),
            session.clone(),
            cancel.child_token(),
        );
        let dispatcher = EventDispatcher::new(
            TurnState::new(self.state.clone()),
            playback.clone(),
            tools,
            self.on_transcript.clone(),
        );

        let events = connection.events;
        let run_cancel = cancel.clone();
        let weak = Arc::downgrade(self);
        let handle = tokio::spawn(async move {
            let Some(message) = dispatcher.run(events, run_cancel).await else {
                return;
            };
            if let Some(inner) = weak.upgrade() {
                inner
                    .teardown(TeardownCause::TransportFailure {
                        generation,
                        message,
                    })
                    .await;
            }
        });

        *active = Some(ActiveSession {
            id,
            generation,
            session,
            capture,
            playback,
            cancel,
            dispatcher: Some(handle),
        });

        info!(session_id = %id, "Live session started");
        Ok(())
    }

    async fn teardown(&self, cause: TeardownCause) {
        // 1. Status
        let ended = match &cause {
            TeardownCause::UserStop => {
                let mut ended = false;
                self.state.send_if_modified(|snap| {
                    ended = snap.end(SessionStatus::Processing, None);
                    ended
                });
                ended
            }
            TeardownCause::TransportFailure {
                generation,
                message,
            } => {
                if self.generation.load(Ordering::SeqCst) != *generation {
                    return;
                }
                let mut ended = false;
                self.state.send_if_modified(|snap| {
                    ended = snap.end(SessionStatus::Idle, Some(message.clone()));
                    ended
                });
                ended
            }
        };
        if ended {
            // Supersedes any start still connecting.
            self.generation.fetch_add(1, Ordering::SeqCst);
        }

        let taken = {
            let mut active = self.active.lock().await;
            match (&cause, active.as_ref()) {
                (TeardownCause::TransportFailure { generation, .. }, Some(current))
                    if current.generation != *generation =>
                {
                    None
                }
                _ => active.take(),
            }
        };
        let Some(mut active) = taken else {
            return;
        };

        info!(session_id = %active.id, cause = ?cause, "Stopping live session");

        // 2-4. Capture, playback, transport
        active.release().await;

        // 5. Live transcripts
        self.state.send_if_modified(|snap| {
            let had_text =
                !snap.live_user_transcript.is_empty() || !snap.live_teacher_transcript.is_empty();
            snap.clear_live();
            had_text
        });

        if cause == TeardownCause::UserStop {
            if let Some(handle) = active.dispatcher.take() {
                if let Err(e) = handle.await {
                    warn!("Dispatcher task ended abnormally: {}", e);
                }
            }
        }

        info!(session_id = %active.id, "Live session stopped");
    }
}

/// Builder for [`LiveSessionManager`].
#[derive(Default)]
pub struct LiveSessionManagerBuilder {
    transport: Option<Arc<dyn DuplexTransport>>,
    input: Option<Arc<dyn AudioInput>>,
    output: Option<Arc<dyn AudioOutput>>,
    tool_handler: Option<Arc<dyn ToolCallHandler>>,
    on_transcript: Option<TranscriptCallback>,
    capture_block_size: Option<usize>,
}

impl LiveSessionManagerBuilder {
    pub fn transport(mut self, transport: Arc<dyn DuplexTransport>) -> Self {
        self.transport = Some(transport);
        self
    }

    pub fn audio_input(mut self, input: Arc<dyn AudioInput>) -> Self {
        self.input = Some(input);
        self
    }

    pub fn audio_output(mut self, output: Arc<dyn AudioOutput>) -> Self {
        self.output = Some(output);
        self
    }

    pub fn tool_handler(mut self, handler: Arc<dyn ToolCallHandler>) -> Self {
        self.tool_handler = Some(handler);
        self
    }

    /// Receives each finalized turn, user first.
    pub fn on_transcript(mut self, callback: TranscriptCallback) -> Self {
        self.on_transcript = Some(callback);
        self
    }

    pub fn capture_block_size(mut self, block_size: usize) -> Self {
        self.capture_block_size = Some(block_size);
        self
    }

    pub fn build(self) -> LiveResult<LiveSessionManager> {
        let transport = self
            .transport
            .ok_or_else(|| LiveError::InvalidConfiguration("transport is required".to_string()))?;
        let input = self
            .input
            .ok_or_else(|| LiveError::InvalidConfiguration("audio input is required".to_string()))?;
        let output = self.output.ok_or_else(|| {
            LiveError::InvalidConfiguration("audio output is required".to_string())
        })?;
        let capture_block_size = self.capture_block_size.unwrap_or(DEFAULT_CAPTURE_BLOCK_SIZE);
        if capture_block_size == 0 {
            return Err(LiveError::InvalidConfiguration(
                "capture block size must be positive".to_string(),
            ));
        }

        let (state, _) = watch::channel(SessionSnapshot::default());

        Ok(LiveSessionManager {
            inner: Arc::new(ManagerInner {
                transport,
                input,
                output,
                tool_handler: self.tool_handler,
                on_transcript: self.on_transcript,
                capture_block_size,
                state: Arc::new(state),
                active: tokio::sync::Mutex::new(None),
                generation: AtomicU64::new(0),
            }),
        })
    }
}

/// Runs live conversations against a remote agent.
#[derive(Clone)]
pub struct LiveSessionManager {
    inner: Arc<ManagerInner>,
}

impl LiveSessionManager {
    pub fn builder() -> LiveSessionManagerBuilder {
        LiveSessionManagerBuilder::default()
    }

    /// Start a conversation.
    ///
    /// Only allowed from `Idle` with no conversation running. On setup failure the manager returns to
    /// `Idle` with `error` set to `Failed to start: <reason>`, and the error
    /// is also returned.
    pub async fn start(&self, config: LiveSessionConfig) -> LiveResult<()> {
        let mut rejected = None;
        self.inner.state.send_if_modified(|snap| {
            if !snap.status.can_start() || snap.is_conversing {
                rejected = Some(snap.status);
                return false;
            }
            snap.begin();
            true
        });
        if let Some(status) = rejected {
            return Err(LiveError::SessionActive(status));
        }

        let generation = self.inner.generation.fetch_add(1, Ordering::SeqCst) + 1;
        let id = Uuid::new_v4();
        info!(session_id = %id, "Starting live session");

        match self.inner.establish(&config, id, generation).await {
            Ok(()) => Ok(()),
            Err(e) => {
                error!(session_id = %id, "Failed to start live session: {}", e);
                if self.inner.generation.load(Ordering::SeqCst) == generation {
                    let message = format!("Failed to start: {}", e);
                    self.inner.state.send_if_modified(|snap| {
                        let ended = snap.end(SessionStatus::Idle, Some(message));
                        if ended {
                            snap.clear_live();
                        }
                        ended
                    });
                }
                Err(e)
            }
        }
    }

    /// Stop the conversation. Never fails and may be called repeatedly.
    ///
    /// A running conversation ends in `Processing`; with nothing running the
    /// status is left alone.
    pub async fn stop(&self) {
        self.inner.teardown(TeardownCause::UserStop).await;
    }

    /// Override the status, e.g. back to `Idle` once summarization is done.
    pub fn set_status(&self, status: SessionStatus) {
        self.inner.state.send_if_modified(|snap| {
            if snap.status == status {
                return false;
            }
            debug!("Status override: {} -> {}", snap.status, status);
            snap.status = status;
            true
        });
    }

    pub fn snapshot(&self) -> SessionSnapshot {
        self.inner.state.borrow().clone()
    }

    /// Watch every snapshot change.
    pub fn subscribe(&self) -> watch::Receiver<SessionSnapshot> {
        self.inner.state.subscribe()
    }

    pub fn status(&self) -> SessionStatus {
        self.inner.state.borrow().status
    }

    pub fn is_conversing(&self) -> bool {
        self.inner.state.borrow().is_conversing
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::live::base::{InboundEvent, PLAYBACK_SAMPLE_RATE};
    use crate::core::live::test_support::{
        FailingInput, ManualOutput, ScriptedInput, ScriptedTransport, encoded_silence,
    };
    use std::time::Duration;

    struct Fixture {
        manager: LiveSessionManager,
        transport: Arc<ScriptedTransport>,
        input: Arc<ScriptedInput>,
        output: Arc<ManualOutput>,
    }

    fn fixture() -> Fixture {
        let transport = Arc::new(ScriptedTransport::default());
        let input = Arc::new(ScriptedInput::default());
        let output = Arc::new(ManualOutput::new(PLAYBACK_SAMPLE_RATE));
        let manager = LiveSessionManager::builder()
            .transport(transport.clone())
            .audio_input(input.clone())
            .audio_output(output.clone())
            .build()
            .unwrap();
        Fixture {
            manager,
            transport,
            input,
            output,
        }
    }

    async fn wait_for<F: Fn(&SessionSnapshot) -> bool>(manager: &LiveSessionManager, f: F) {
        let mut rx = manager.subscribe();
        tokio::time::timeout(Duration::from_secs(2), rx.wait_for(|s| f(s)))
            .await
            .unwrap()
            .unwrap();
    }

    #[test]
    fn test_builder_requires_collaborators() {
        assert!(LiveSessionManager::builder().build().is_err());
    }

    #[tokio::test]
    async fn test_start_and_stop() {
        let f = fixture();
        assert_eq!(f.manager.status(), SessionStatus::Idle);

        f.manager.start(LiveSessionConfig::default()).await.unwrap();
        assert_eq!(f.manager.status(), SessionStatus::Listening);
        assert!(f.manager.is_conversing());
        assert!(f.input.is_open());

        f.manager.stop().await;
        let snap = f.manager.snapshot();
        assert_eq!(snap.status, SessionStatus::Processing);
        assert!(!snap.is_conversing);
        assert!(snap.error.is_none());
        assert!(!f.input.is_open());
        assert_eq!(f.transport.close_count(), 1);

        // Idempotent
        f.manager.stop().await;
        assert_eq!(f.manager.status(), SessionStatus::Processing);
        assert_eq!(f.transport.close_count(), 1);
    }

    #[tokio::test]
    async fn test_start_rejected_unless_idle() {
        let f = fixture();
        f.manager.start(LiveSessionConfig::default()).await.unwrap();

        let err = f.manager.start(LiveSessionConfig::default()).await.unwrap_err();
        assert!(matches!(err, LiveError::SessionActive(SessionStatus::Listening)));

        f.manager.stop().await;
        let err = f.manager.start(LiveSessionConfig::default()).await.unwrap_err();
        assert!(matches!(err, LiveError::SessionActive(SessionStatus::Processing)));

        f.manager.set_status(SessionStatus::Idle);
        f.manager.start(LiveSessionConfig::default()).await.unwrap();
        assert_eq!(f.transport.open_count(), 2);
        f.manager.stop().await;
    }

    #[tokio::test]
    async fn test_stop_when_idle_is_noop() {
        let f = fixture();
        f.manager.stop().await;
        assert_eq!(f.manager.status(), SessionStatus::Idle);
        assert_eq!(f.transport.close_count(), 0);
    }

    #[tokio::test]
    async fn test_device_failure_aborts_before_connecting() {
        let transport = Arc::new(ScriptedTransport::default());
        let manager = LiveSessionManager::builder()
            .transport(transport.clone())
            .audio_input(Arc::new(FailingInput))
            .audio_output(Arc::new(ManualOutput::new(PLAYBACK_SAMPLE_RATE)))
            .build()
            .unwrap();

        let err = manager.start(LiveSessionConfig::default()).await.unwrap_err();
        assert!(matches!(err, LiveError::DeviceUnavailable(_)));

        let snap = manager.snapshot();
        assert_eq!(snap.status, SessionStatus::Idle);
        assert!(!snap.is_conversing);
        assert!(snap.error.unwrap().starts_with("Failed to start: "));
        assert_eq!(transport.open_count(), 0);
    }

    #[tokio::test]
    async fn test_connect_failure_releases_device() {
        let f = fixture();
        f.transport.fail_next_open();

        assert!(f.manager.start(LiveSessionConfig::default()).await.is_err());
        assert!(!f.input.is_open());
        assert_eq!(f.manager.status(), SessionStatus::Idle);
        assert!(f.manager.snapshot().error.is_some());

        // A fresh start clears the error
        f.manager.start(LiveSessionConfig::default()).await.unwrap();
        assert!(f.manager.snapshot().error.is_none());
        f.manager.stop().await;
    }

    #[tokio::test]
    async fn test_transport_loss_returns_to_idle_with_message() {
        let f = fixture();
        f.manager.start(LiveSessionConfig::default()).await.unwrap();

        f.transport
            .emit(InboundEvent::OutputTranscriptDelta("Bonjour".to_string()))
            .await;
        f.transport
            .emit(InboundEvent::TransportClosed {
                clean: false,
                reason: Some("going away".to_string()),
            })
            .await;

        wait_for(&f.manager, |s| s.status == SessionStatus::Idle).await;
        let snap = f.manager.snapshot();
        assert_eq!(
            snap.error.as_deref(),
            Some("Connection lost. Tap mic to resume.")
        );
        assert!(!snap.is_conversing);

        tokio::time::timeout(Duration::from_secs(2), async {
            while f.input.is_open() || f.transport.close_count() == 0 {
                tokio::task::yield_now().await;
            }
        })
        .await
        .unwrap();
        assert!(f.manager.snapshot().live_teacher_transcript.is_empty());

        // A later user stop changes nothing
        f.manager.stop().await;
        assert_eq!(f.manager.status(), SessionStatus::Idle);
    }

    #[tokio::test]
    async fn test_stop_halts_playback() {
        let f = fixture();
        f.manager.start(LiveSessionConfig::default()).await.unwrap();

        for _ in 0..3 {
            f.transport
                .emit(InboundEvent::AudioChunk(encoded_silence(2400)))
                .await;
        }
        tokio::time::timeout(Duration::from_secs(2), async {
            while f.output.scheduled().len() < 3 {
                tokio::task::yield_now().await;
            }
        })
        .await
        .unwrap();

        f.manager.stop().await;
        assert_eq!(f.output.stopped_count(), 3);
    }

    #[tokio::test]
    async fn test_forced_idle_does_not_allow_second_session() {
        let f = fixture();
        f.manager.start(LiveSessionConfig::default()).await.unwrap();
        for _ in 0..2 {
            f.transport
                .emit(InboundEvent::AudioChunk(encoded_silence(2400)))
                .await;
        }
        tokio::time::timeout(Duration::from_secs(2), async {
            while f.output.scheduled().len() < 2 {
                tokio::task::yield_now().await;
            }
        })
        .await
        .unwrap();

        f.manager.set_status(SessionStatus::Idle);
        let err = f.manager.start(LiveSessionConfig::default()).await.unwrap_err();
        assert!(matches!(err, LiveError::SessionActive(SessionStatus::Idle)));
        assert_eq!(f.transport.open_count(), 1);
        assert!(f.manager.is_conversing());

        f.manager.stop().await;
        assert_eq!(f.transport.close_count(), 1);
        assert_eq!(f.output.stopped_count(), 2);
        assert!(!f.input.is_open());

        // Once the conversation has ended a forced Idle starts normally
        f.manager.set_status(SessionStatus::Idle);
        f.manager.start(LiveSessionConfig::default()).await.unwrap();
        assert_eq!(f.transport.open_count(), 2);
        f.manager.stop().await;
    }

    #[tokio::test]
    async fn test_stop_racing_start_wins() {
        let f = fixture();
        f.transport.delay_open(Duration::from_millis(100));

        let manager = f.manager.clone();
        let starting =
            tokio::spawn(async move { manager.start(LiveSessionConfig::default()).await });

        wait_for(&f.manager, |s| s.status == SessionStatus::Listening).await;
        f.manager.stop().await;
        assert_eq!(f.manager.status(), SessionStatus::Processing);

        starting.await.unwrap().unwrap();
        assert_eq!(f.manager.status(), SessionStatus::Processing);
        assert!(!f.input.is_open());
        assert_eq!(f.transport.close_count(), 1);
    }
}
