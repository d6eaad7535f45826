//! JSON message types for the bidirectional streaming protocol.
//!
//! Client messages (sent to server):
//! - setup - Model, voice, system instruction, tools, transcription flags
//! - realtimeInput - Base64 PCM media chunks
//! - toolResponse - Function call results
//!
//! Server messages (received from server):
//! - setupComplete - Session accepted
//! - serverContent - Transcriptions, model audio, turn boundaries
//! - toolCall - Function calls
//! - goAway - Server is about to close the connection
//!
//! One server message may carry several parts. They are expanded into
//! [`InboundEvent`]s in a fixed order: tool calls, input transcription,
//! output transcription, turn completion, then audio.

use base64::prelude::*;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use uuid::Uuid;

use crate::core::live::base::{
    AudioFrame, EncodedAudio, InboundEvent, LiveSessionConfig, Modality, ToolCallRequest,
    ToolCallResponse, ToolDeclaration,
};

// =============================================================================
// Client Messages
// =============================================================================

/// Messages sent to the server.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub enum ClientMessage {
    Setup(SetupMessage),
    RealtimeInput(RealtimeInput),
    ToolResponse(ToolResponseMessage),
}

impl ClientMessage {
    /// Build the setup message for a session.
    pub fn setup(model: &str, config: &LiveSessionConfig) -> Self {
        let speech_config = config.voice.as_ref().map(|voice| SpeechConfig {
            voice_config: VoiceConfig {
                prebuilt_voice_config: PrebuiltVoiceConfig {
                    voice_name: voice.clone(),
                },
            },
        });

        let tools = if config.tools.is_empty() {
            Vec::new()
        } else {
            vec![ToolSet {
                function_declarations: config.tools.clone(),
            }]
        };

        ClientMessage::Setup(SetupMessage {
            model: model.to_string(),
            generation_config: GenerationConfig {
                response_modalities: vec![config.response_modality],
                speech_config,
            },
            system_instruction: config
                .system_instruction
                .as_ref()
                .map(|text| Content::text(text)),
            tools,
            input_audio_transcription: config.input_transcription.then(TranscriptionConfig::default),
            output_audio_transcription: config
                .output_transcription
                .then(TranscriptionConfig::default),
        })
    }

    /// Wrap one captured audio frame.
    pub fn audio(frame: &AudioFrame) -> Self {
        ClientMessage::RealtimeInput(RealtimeInput {
            media_chunks: vec![Blob {
                mime_type: frame.mime_type.clone(),
                data: BASE64_STANDARD.encode(&frame.data),
            }],
        })
    }

    /// Wrap one tool-call result.
    pub fn tool_response(response: ToolCallResponse) -> Self {
        ClientMessage::ToolResponse(ToolResponseMessage {
            function_responses: vec![FunctionResponse {
                id: response.id,
                name: response.name,
                response: response.result,
            }],
        })
    }
}

/// Session setup.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SetupMessage {
    pub model: String,
    pub generation_config: GenerationConfig,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub system_instruction: Option<Content>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub tools: Vec<ToolSet>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub input_audio_transcription: Option<TranscriptionConfig>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub output_audio_transcription: Option<TranscriptionConfig>,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct GenerationConfig {
    pub response_modalities: Vec<Modality>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub speech_config: Option<SpeechConfig>,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SpeechConfig {
    pub voice_config: VoiceConfig,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct VoiceConfig {
    pub prebuilt_voice_config: PrebuiltVoiceConfig,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PrebuiltVoiceConfig {
    pub voice_name: String,
}

/// Empty object enabling a transcription stream.
#[derive(Debug, Clone, Default, Serialize)]
pub struct TranscriptionConfig {}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ToolSet {
    pub function_declarations: Vec<ToolDeclaration>,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RealtimeInput {
    pub media_chunks: Vec<Blob>,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ToolResponseMessage {
    pub function_responses: Vec<FunctionResponse>,
}

#[derive(Debug, Clone, Serialize)]
pub struct FunctionResponse {
    pub id: String,
    pub name: String,
    pub response: Value,
}

// =============================================================================
// Shared Content Types
// =============================================================================

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Content {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub role: Option<String>,
    #[serde(default)]
    pub parts: Vec<Part>,
}

impl Content {
    pub fn text(text: &str) -> Self {
        Self {
            role: None,
            parts: vec![Part {
                text: Some(text.to_string()),
                inline_data: None,
            }],
        }
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Part {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub text: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub inline_data: Option<Blob>,
}

/// Base64 payload with its MIME type.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Blob {
    #[serde(default)]
    pub mime_type: String,
    pub data: String,
}

// =============================================================================
// Server Messages
// =============================================================================

/// One message from the server. Any combination of fields may be present.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ServerMessage {
    #[serde(default)]
    pub setup_complete: Option<Value>,
    #[serde(default)]
    pub server_content: Option<ServerContent>,
    #[serde(default)]
    pub tool_call: Option<ToolCall>,
    #[serde(default)]
    pub tool_call_cancellation: Option<Value>,
    #[serde(default)]
    pub go_away: Option<GoAway>,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ServerContent {
    #[serde(default)]
    pub model_turn: Option<Content>,
    #[serde(default)]
    pub input_transcription: Option<Transcription>,
    #[serde(default)]
    pub output_transcription: Option<Transcription>,
    #[serde(default)]
    pub turn_complete: bool,
    #[serde(default)]
    pub interrupted: bool,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct Transcription {
    #[serde(default)]
    pub text: Option<String>,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ToolCall {
    #[serde(default)]
    pub function_calls: Vec<FunctionCall>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct FunctionCall {
    #[serde(default)]
    pub id: Option<String>,
    pub name: String,
    #[serde(default)]
    pub args: Option<Map<String, Value>>,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GoAway {
    #[serde(default)]
    pub time_left: Option<String>,
}

impl ServerMessage {
    /// Whether this message acknowledges the setup.
    pub fn is_setup_complete(&self) -> bool {
        self.setup_complete.is_some()
    }

    /// Expand into inbound events in dispatch order.
    pub fn into_events(self) -> Vec<InboundEvent> {
        let mut events = Vec::new();

        if let Some(tool_call) = self.tool_call {
            for call in tool_call.function_calls {
                events.push(InboundEvent::ToolCallRequest(ToolCallRequest {
                    id: call.id.unwrap_or_else(|| Uuid::new_v4().to_string()),
                    name: call.name,
                    args: call.args.unwrap_or_default(),
                }));
            }
        }

        let Some(content) = self.server_content else {
            return events;
        };

        if let Some(text) = content.input_transcription.and_then(|t| t.text) {
            events.push(InboundEvent::InputTranscriptDelta(text));
        }
        if let Some(text) = content.output_transcription.and_then(|t| t.text) {
            events.push(InboundEvent::OutputTranscriptDelta(text));
        }
        if content.turn_complete {
            events.push(InboundEvent::TurnComplete);
        }
        if let Some(turn) = content.model_turn {
            for part in turn.parts {
                if let Some(blob) = part.inline_data {
                    events.push(InboundEvent::AudioChunk(EncodedAudio {
                        data: blob.data,
                        mime_type: (!blob.mime_type.is_empty()).then_some(blob.mime_type),
                    }));
                }
            }
        }

        events
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use bytes::Bytes;
    use serde_json::json;

    #[test]
    fn test_setup_serialization() {
        let config = LiveSessionConfig {
            voice: Some("Zephyr".to_string()),
            system_instruction: Some("Be kind.".to_string()),
            tools: vec![ToolDeclaration {
                name: "addWordToGlossary".to_string(),
                description: Some("Save a word".to_string()),
                parameters: Some(json!({ "type": "OBJECT" })),
            }],
            ..Default::default()
        };

        let value = serde_json::to_value(ClientMessage::setup("models/test", &config)).unwrap();
        let setup = &value["setup"];
        assert_eq!(setup["model"], "models/test");
        assert_eq!(setup["generationConfig"]["responseModalities"], json!(["AUDIO"]));
        assert_eq!(
            setup["generationConfig"]["speechConfig"]["voiceConfig"]["prebuiltVoiceConfig"]
                ["voiceName"],
            "Zephyr"
        );
        assert_eq!(setup["systemInstruction"]["parts"][0]["text"], "Be kind.");
        assert_eq!(
            setup["tools"][0]["functionDeclarations"][0]["name"],
            "addWordToGlossary"
        );
        assert_eq!(setup["inputAudioTranscription"], json!({}));
        assert_eq!(setup["outputAudioTranscription"], json!({}));
    }

    #[test]
    fn test_setup_omits_absent_fields() {
        let config = LiveSessionConfig {
            input_transcription: false,
            ..Default::default()
        };
        let value = serde_json::to_value(ClientMessage::setup("m", &config)).unwrap();
        let setup = value["setup"].as_object().unwrap();
        assert!(!setup.contains_key("systemInstruction"));
        assert!(!setup.contains_key("tools"));
        assert!(!setup.contains_key("inputAudioTranscription"));
        assert!(setup.contains_key("outputAudioTranscription"));
        assert!(!setup["generationConfig"]
            .as_object()
            .unwrap()
            .contains_key("speechConfig"));
    }

    #[test]
    fn test_audio_message() {
        let frame = AudioFrame {
            data: Bytes::from_static(&[0x00, 0x40]),
            mime_type: "audio/pcm;rate=16000".to_string(),
        };
        let value = serde_json::to_value(ClientMessage::audio(&frame)).unwrap();
        let chunk = &value["realtimeInput"]["mediaChunks"][0];
        assert_eq!(chunk["mimeType"], "audio/pcm;rate=16000");
        assert_eq!(chunk["data"], "AEA=");
    }

    #[test]
    fn test_tool_response_message() {
        let message = ClientMessage::tool_response(ToolCallResponse {
            id: "fc-1".to_string(),
            name: "addWordToGlossary".to_string(),
            result: json!({ "result": "OK" }),
        });
        let value = serde_json::to_value(message).unwrap();
        assert_eq!(
            value,
            json!({
                "toolResponse": {
                    "functionResponses": [
                        { "id": "fc-1", "name": "addWordToGlossary", "response": { "result": "OK" } }
                    ]
                }
            })
        );
    }

    #[test]
    fn test_setup_complete() {
        let message: ServerMessage = serde_json::from_str(r#"{"setupComplete":{}}"#).unwrap();
        assert!(message.is_setup_complete());
        assert!(message.into_events().is_empty());
    }

    #[test]
    fn test_combined_message_expands_in_order() {
        let raw = json!({
            "toolCall": {
                "functionCalls": [
                    { "id": "a", "name": "addWordToGlossary", "args": { "word": "chat" } }
                ]
            },
            "serverContent": {
                "modelTurn": {
                    "parts": [
                        { "inlineData": { "mimeType": "audio/pcm;rate=24000", "data": "AAA=" } },
                        { "inlineData": { "mimeType": "audio/pcm;rate=24000", "data": "AQE=" } }
                    ]
                },
                "inputTranscription": { "text": "the cat" },
                "outputTranscription": { "text": "le chat" },
                "turnComplete": true
            }
        });
        let message: ServerMessage = serde_json::from_value(raw).unwrap();
        let kinds: Vec<&str> = message.into_events().iter().map(|e| e.kind()).collect();
        assert_eq!(
            kinds,
            vec![
                "tool_call",
                "input_transcript_delta",
                "output_transcript_delta",
                "turn_complete",
                "audio_chunk",
                "audio_chunk",
            ]
        );
    }

    #[test]
    fn test_tool_call_arguments() {
        let raw = r#"{"toolCall":{"functionCalls":[{"id":"x","name":"addWordToGlossary","args":{"word":"γάτα","definition":"cat","example":"Η γάτα κοιμάται."}}]}}"#;
        let message: ServerMessage = serde_json::from_str(raw).unwrap();
        let events = message.into_events();
        let InboundEvent::ToolCallRequest(request) = &events[0] else {
            panic!("expected tool call");
        };
        assert_eq!(request.id, "x");
        assert_eq!(request.str_arg("word"), Some("γάτα"));
    }

    #[test]
    fn test_unknown_fields_ignored() {
        let raw = r#"{"usageMetadata":{"totalTokenCount":12},"serverContent":{"generationComplete":true}}"#;
        let message: ServerMessage = serde_json::from_str(raw).unwrap();
        assert!(message.into_events().is_empty());
    }
}
