//! Live session integration tests
//!
//! Drive `LiveSessionManager` over the real WebSocket transport against an
//! in-process mock agent, with WAV files standing in for the microphone and
//! a recorder standing in for the speaker.

mod fixtures;
mod mock_providers;

use std::sync::Arc;
use std::time::{Duration, Instant};

use serde_json::json;
use tempfile::TempDir;

use fixtures::{teacher_speech_base64, write_student_wav};
use mock_providers::live_agent_mock::{
    audio_chunk, input_transcription, output_transcription, tool_call, turn_complete,
};
use mock_providers::{AgentStep, LiveAgentMock};

use waav_tutor::core::audio::{WavFileInput, WavRecorderOutput};
use waav_tutor::core::live::websocket::{LiveTransportConfig, LiveWebSocketTransport};
use waav_tutor::core::live::{
    CONNECTION_LOST_MESSAGE, CONNECTION_UNSTABLE_MESSAGE, LiveError, LiveSessionManager,
    SessionStatus,
};
use waav_tutor::tutor::{
    ConversationLevel, Glossary, GlossaryToolHandler, Language, PracticeMode, SessionBlueprint,
    TeacherName, TranscriptLog,
};

struct Harness {
    manager: LiveSessionManager,
    recorder: WavRecorderOutput,
    glossary: Arc<Glossary>,
    transcript: Arc<TranscriptLog>,
    _dir: TempDir,
}

fn harness(mock: &LiveAgentMock) -> Harness {
    let dir = TempDir::new().unwrap();
    let wav_path = dir.path().join("student.wav");
    write_student_wav(&wav_path, 1000);

    let mut config = LiveTransportConfig::new("test-key");
    config.endpoint_url = mock.url();
    config.connect_timeout = Duration::from_secs(5);
    let transport = LiveWebSocketTransport::new(config).unwrap();

    let recorder = WavRecorderOutput::default();
    let glossary = Arc::new(Glossary::new());
    let transcript = TranscriptLog::new();

    let manager = LiveSessionManager::builder()
        .transport(Arc::new(transport))
        .audio_input(Arc::new(WavFileInput::new(&wav_path).unpaced()))
        .audio_output(Arc::new(recorder.clone()))
        .tool_handler(Arc::new(GlossaryToolHandler::new(glossary.clone())))
        .on_transcript(transcript.callback())
        .capture_block_size(4096)
        .build()
        .unwrap();

    Harness {
        manager,
        recorder,
        glossary,
        transcript,
        _dir: dir,
    }
}

async fn wait_for(mut condition: impl FnMut() -> bool) -> bool {
    let deadline = Instant::now() + Duration::from_secs(5);
    while Instant::now() < deadline {
        if condition() {
            return true;
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
    condition()
}

fn blueprint() -> SessionBlueprint {
    SessionBlueprint::new(TeacherName::Clara, Language::French, ConversationLevel::Basic)
        .with_mode(PracticeMode::RolePlay, "ordering at a bakery")
}

#[tokio::test]
async fn test_full_conversation_turn() {
    let mock = LiveAgentMock::start(vec![
        AgentStep::WaitForAudio(2),
        AgentStep::Send(input_transcription("Bonjour ")),
        AgentStep::Send(input_transcription("madame")),
        AgentStep::Send(output_transcription("Bonjour ! Que désirez-vous ?")),
        AgentStep::Send(audio_chunk(&teacher_speech_base64(200))),
        AgentStep::Send(audio_chunk(&teacher_speech_base64(300))),
        AgentStep::Send(tool_call(
            "call-1",
            "addWordToGlossary",
            json!({"word": "baguette", "definition": "long bread", "example": "Une baguette, s'il vous plaît."}),
        )),
        AgentStep::WaitForToolResponses(1),
        AgentStep::Send(turn_complete()),
    ])
    .await;
    let h = harness(&mock);

    h.manager.start(blueprint().live_config()).await.unwrap();
    assert!(h.manager.is_conversing());

    assert!(wait_for(|| h.transcript.len() == 2).await);
    assert!(wait_for(|| h.manager.status() == SessionStatus::Listening).await);
    assert_eq!(
        h.transcript.render(),
        "Student: Bonjour madame\nTeacher: Bonjour ! Que désirez-vous ?"
    );

    let snapshot = h.manager.snapshot();
    assert_eq!(snapshot.status, SessionStatus::Listening);
    assert_eq!(snapshot.live_user_transcript, "");
    assert_eq!(snapshot.live_teacher_transcript, "");
    assert_eq!(snapshot.error, None);

    // Glossary tool answered exactly once, echoing the id
    let responses = mock.state.tool_responses.lock().clone();
    assert_eq!(responses.len(), 1);
    assert_eq!(responses[0]["id"], "call-1");
    assert_eq!(responses[0]["name"], "addWordToGlossary");
    assert_eq!(responses[0]["response"]["result"], "OK");
    assert_eq!(h.glossary.words()[0].word, "baguette");

    // Agent speech scheduled back to back
    let timeline = h.recorder.timeline();
    assert_eq!(timeline.len(), 2);
    assert!((timeline[0].duration - 0.2).abs() < 1e-9);
    let gap = timeline[1].start_time - (timeline[0].start_time + timeline[0].duration);
    assert!(gap.abs() < 1e-9, "gap between buffers: {gap}");

    // Microphone frames in wire format, key in the header
    assert!(mock.state.audio_frame_count() >= 2);
    assert!(
        mock.state
            .audio_mime_types
            .lock()
            .iter()
            .all(|m| m == "audio/pcm;rate=16000")
    );
    assert_eq!(
        mock.state.api_key_header.lock().as_deref(),
        Some("test-key")
    );

    h.manager.stop().await;
    assert_eq!(h.manager.status(), SessionStatus::Processing);
    assert!(!h.manager.is_conversing());
    assert!(wait_for(|| mock.state.client_closed.load(std::sync::atomic::Ordering::SeqCst) == 1).await);
}

#[tokio::test]
async fn test_setup_carries_blueprint() {
    let mock = LiveAgentMock::start(Vec::new()).await;
    let h = harness(&mock);

    h.manager.start(blueprint().live_config()).await.unwrap();

    let setup = mock.state.setup.lock().clone().unwrap();
    let setup = &setup["setup"];
    assert_eq!(
        setup["model"],
        "models/gemini-2.5-flash-native-audio-preview-09-2025"
    );
    assert_eq!(
        setup["generationConfig"]["responseModalities"],
        json!(["AUDIO"])
    );
    assert_eq!(
        setup["generationConfig"]["speechConfig"]["voiceConfig"]["prebuiltVoiceConfig"]["voiceName"],
        "Zephyr"
    );
    assert_eq!(
        setup["tools"][0]["functionDeclarations"][0]["name"],
        "addWordToGlossary"
    );
    assert_eq!(setup["inputAudioTranscription"], json!({}));
    assert_eq!(setup["outputAudioTranscription"], json!({}));
    let instruction = setup["systemInstruction"]["parts"][0]["text"]
        .as_str()
        .unwrap();
    assert!(instruction.contains("The scenario is: \"ordering at a bakery\"."));

    h.manager.stop().await;
}

#[tokio::test]
async fn test_server_close_returns_to_idle_with_lost_message() {
    let mock = LiveAgentMock::start(vec![
        AgentStep::WaitForAudio(1),
        AgentStep::Send(output_transcription("Un moment")),
        AgentStep::Send(audio_chunk(&teacher_speech_base64(2000))),
        AgentStep::Sleep(Duration::from_millis(50)),
        AgentStep::Close,
    ])
    .await;
    let h = harness(&mock);

    h.manager.start(blueprint().live_config()).await.unwrap();

    assert!(wait_for(|| h.manager.status() == SessionStatus::Idle).await);
    let snapshot = h.manager.snapshot();
    assert_eq!(snapshot.error.as_deref(), Some(CONNECTION_LOST_MESSAGE));
    assert!(!snapshot.is_conversing);
    assert!(wait_for(|| h.manager.snapshot().live_teacher_transcript.is_empty()).await);

    // The long buffer was cut off
    assert!(
        wait_for(|| {
            h.recorder
                .timeline()
                .first()
                .is_some_and(|s| s.halted_at.is_some())
        })
        .await
    );
    assert_eq!(h.recorder.timeline().len(), 1);

    // Unfinished turns are never finalized
    assert!(h.transcript.is_empty());
}

#[tokio::test]
async fn test_dropped_connection_returns_to_idle() {
    let mock = LiveAgentMock::start(vec![AgentStep::WaitForAudio(1), AgentStep::Drop]).await;
    let h = harness(&mock);

    h.manager.start(blueprint().live_config()).await.unwrap();

    assert!(wait_for(|| h.manager.status() == SessionStatus::Idle).await);
    let error = h.manager.snapshot().error.unwrap();
    assert!(
        error == CONNECTION_UNSTABLE_MESSAGE || error == CONNECTION_LOST_MESSAGE,
        "unexpected error: {error}"
    );
}

#[tokio::test]
async fn test_rejected_handshake_fails_start() {
    let mock = LiveAgentMock::rejecting(401).await;
    let h = harness(&mock);

    let result = h.manager.start(blueprint().live_config()).await;
    assert!(matches!(result, Err(LiveError::AuthenticationFailed(_))));

    let snapshot = h.manager.snapshot();
    assert_eq!(snapshot.status, SessionStatus::Idle);
    assert!(!snapshot.is_conversing);
    assert!(snapshot.error.unwrap().starts_with("Failed to start: "));
}

#[tokio::test]
async fn test_user_stop_halts_playback() {
    let mock = LiveAgentMock::start(vec![
        AgentStep::WaitForAudio(1),
        AgentStep::Send(audio_chunk(&teacher_speech_base64(3000))),
    ])
    .await;
    let h = harness(&mock);

    h.manager.start(blueprint().live_config()).await.unwrap();
    assert!(wait_for(|| h.recorder.timeline().len() == 1).await);

    h.manager.stop().await;

    assert_eq!(h.manager.status(), SessionStatus::Processing);
    assert!(h.recorder.timeline()[0].halted_at.is_some());
    assert_eq!(h.manager.snapshot().error, None);
}

#[tokio::test]
async fn test_restart_after_stop() {
    let mock = LiveAgentMock::start(Vec::new()).await;
    let h = harness(&mock);

    h.manager.start(blueprint().live_config()).await.unwrap();
    assert!(matches!(
        h.manager.start(blueprint().live_config()).await,
        Err(LiveError::SessionActive(_))
    ));
    h.manager.stop().await;

    // Processing blocks a new session until the host returns to Idle
    assert!(matches!(
        h.manager.start(blueprint().live_config()).await,
        Err(LiveError::SessionActive(_))
    ));
    h.manager.set_status(SessionStatus::Idle);

    h.manager.start(blueprint().live_config()).await.unwrap();
    assert!(wait_for(|| mock.state.connections.load(std::sync::atomic::Ordering::SeqCst) == 2).await);
    h.manager.stop().await;
}
