//! Gemini Live API protocol types
//!
//! JSON messages exchanged over the BidiGenerateContent WebSocket.
//!
//! # Protocol Overview
//!
//! 1. Connect to `wss://…/BidiGenerateContent?key=…`
//! 2. Send `setup` (model, AUDIO modality, voice, system instruction)
//! 3. Receive `setupComplete`
//! 4. Stream microphone audio via `realtimeInput.mediaChunks`
//! 5. Receive `serverContent` carrying speech, transcription and
//!    interruption flags
//! 6. `goAway` announces an imminent server-side close

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::gemini::{Content, SpeechConfig};

/// Gemini Live API endpoint (the key is appended as a query parameter)
pub const LIVE_API_URL: &str = "wss://generativelanguage.googleapis.com/ws/google.ai.generativelanguage.v1beta.GenerativeService.BidiGenerateContent";

pub const DEFAULT_LIVE_MODEL: &str = "gemini-2.5-flash-native-audio-preview-12-2025";
pub const DEFAULT_LIVE_VOICE: &str = "Zephyr";

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct LiveGenerationConfig {
    pub response_modalities: Vec<String>,
    pub speech_config: SpeechConfig,
}

/// Empty object enabling transcription of the model's speech
#[derive(Debug, Clone, Default, Serialize)]
pub struct AudioTranscriptionConfig {}

/// Body of the `setup` message
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SetupConfig {
    /// Fully qualified model name (`models/...`)
    pub model: String,
    pub generation_config: LiveGenerationConfig,
    pub system_instruction: Content,
    pub output_audio_transcription: AudioTranscriptionConfig,
}

impl SetupConfig {
    /// Audio-only session speaking with `voice`
    pub fn audio(model: &str, voice: &str, system_instruction: String) -> Self {
        let model = if model.starts_with("models/") {
            model.to_string()
        } else {
            format!("models/{}", model)
        };

        Self {
            model,
            generation_config: LiveGenerationConfig {
                response_modalities: vec!["AUDIO".to_string()],
                speech_config: SpeechConfig::voice(voice),
            },
            system_instruction: Content::text(system_instruction),
            output_audio_transcription: AudioTranscriptionConfig::default(),
        }
    }
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct MediaChunk {
    pub mime_type: String,
    /// Base64 PCM16
    pub data: String,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RealtimeInput {
    pub media_chunks: Vec<MediaChunk>,
}

// ============================================================================
// Client Messages
// ============================================================================

/// Messages sent to the Live API. Each serializes as a single-key object.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub enum ClientMessage {
    Setup(SetupConfig),
    RealtimeInput(RealtimeInput),
}

impl ClientMessage {
    /// One encoded microphone frame
    pub fn audio_chunk(mime_type: &str, data: String) -> Self {
        Self::RealtimeInput(RealtimeInput {
            media_chunks: vec![MediaChunk {
                mime_type: mime_type.to_string(),
                data,
            }],
        })
    }
}

// ============================================================================
// Server Messages
// ============================================================================

#[derive(Debug, Clone, Default, Deserialize)]
pub struct Transcription {
    #[serde(default)]
    pub text: Option<String>,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ServerContent {
    #[serde(default)]
    pub model_turn: Option<Content>,
    #[serde(default)]
    pub interrupted: Option<bool>,
    #[serde(default)]
    pub turn_complete: Option<bool>,
    #[serde(default)]
    pub output_transcription: Option<Transcription>,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GoAway {
    #[serde(default)]
    pub time_left: Option<String>,
}

/// A message from the Live API.
///
/// The server sends objects keyed by message kind rather than a type tag;
/// unknown keys (usage metadata, tool calls) are ignored.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ServerMessage {
    #[serde(default)]
    pub setup_complete: Option<Value>,
    #[serde(default)]
    pub server_content: Option<ServerContent>,
    #[serde(default)]
    pub go_away: Option<GoAway>,
}

impl ServerMessage {
    pub fn is_setup_complete(&self) -> bool {
        self.setup_complete.is_some()
    }

    /// Base64 audio payloads in arrival order
    pub fn audio_chunks(&self) -> Vec<&str> {
        self.server_content
            .as_ref()
            .and_then(|c| c.model_turn.as_ref())
            .map(|turn| {
                turn.parts
                    .iter()
                    .filter_map(|p| p.inline_data.as_ref())
                    .map(|blob| blob.data.as_str())
                    .collect()
            })
            .unwrap_or_default()
    }

    pub fn is_interrupted(&self) -> bool {
        self.server_content
            .as_ref()
            .and_then(|c| c.interrupted)
            .unwrap_or(false)
    }

    pub fn transcript_text(&self) -> Option<&str> {
        self.server_content
            .as_ref()
            .and_then(|c| c.output_transcription.as_ref())
            .and_then(|t| t.text.as_deref())
    }
}
