//! Gemini REST client shared by the report, deep-dive, narration and
//! dialogue components.
//!
//! The live voice session speaks a different (WebSocket) protocol and lives
//! in [`crate::live`].

mod client;
pub mod sse;
pub mod types;

pub use client::{resolve_api_key, GeminiClient, DEFAULT_API_BASE_URL};
pub use types::*;

/// Errors talking to the Gemini REST API
#[derive(Debug, Clone, thiserror::Error)]
pub enum GeminiError {
    /// Neither GEMINI_API_KEY nor API_KEY is set
    #[error("Gemini API key not configured. Set GEMINI_API_KEY environment variable.")]
    MissingApiKey,
    /// Transport failure before or during the response
    #[error("Network error: {0}")]
    Network(String),
    /// Non-2xx response from the API
    #[error("Gemini API error ({status}): {message}")]
    Api { status: u16, message: String },
    /// Response body was not what we expected
    #[error("Failed to parse API response: {0}")]
    Parse(String),
}

impl GeminiError {
    /// True when the caller's credentials were rejected
    pub fn is_auth(&self) -> bool {
        matches!(
            self,
            GeminiError::MissingApiKey | GeminiError::Api { status: 401 | 403, .. }
        )
    }
}
