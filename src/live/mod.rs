//! Live voice advisor over the Gemini Live API
//!
//! # Architecture
//!
//! ```text
//! Microphone ──▶ CaptureFramer (16kHz, 4096-sample frames) ──▶ LiveConnection
//!                                                                   │
//!                       LiveSession::dispatch ◀── events_for ◀──────┘
//!                               │
//!                               ▼
//!              PlaybackQueue (24kHz) ──▶ SpeakerOutput
//! ```
//!
//! A session is single-use: once closed it is never reconnected.

mod client;
mod controller;
pub mod protocol;
pub mod session;

pub use client::{parse_frame, Inbound, LiveConnection};
pub use controller::{system_instruction, LiveConfig, LiveController, LiveUpdate};
pub use protocol::{
    ClientMessage, ServerMessage, SetupConfig, DEFAULT_LIVE_MODEL, DEFAULT_LIVE_VOICE, LIVE_API_URL,
};
pub use session::{
    events_for, Effect, LiveSession, SessionEvent, SessionState, TranscriptWindow,
    TRANSCRIPT_WINDOW_CHARS,
};

use crate::audio::AudioError;

/// Errors that end a live session
#[derive(Debug, Clone, thiserror::Error)]
pub enum LiveError {
    #[error("Gemini API key not configured. Set GEMINI_API_KEY environment variable.")]
    MissingApiKey,
    #[error("microphone unavailable: {0}")]
    PermissionDenied(String),
    #[error("failed to open live connection: {0}")]
    TransportOpenFailure(String),
    #[error("live session setup timed out")]
    SetupTimeout,
    #[error("live connection error: {0}")]
    TransportRuntimeError(String),
}

impl From<AudioError> for LiveError {
    fn from(err: AudioError) -> Self {
        LiveError::PermissionDenied(err.to_string())
    }
}

impl LiveError {
    pub fn user_message(&self) -> &'static str {
        match self {
            LiveError::MissingApiKey => "The live advisor is not configured. Set GEMINI_API_KEY.",
            LiveError::PermissionDenied(_) => "Microphone access is needed for the live advisor.",
            LiveError::TransportOpenFailure(_) | LiveError::SetupTimeout => {
                "Could not connect to the live advisor. Please try again."
            }
            LiveError::TransportRuntimeError(_) => "The live advisor connection was lost.",
        }
    }
}
