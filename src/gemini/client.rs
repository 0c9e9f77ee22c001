//! HTTP transport for `generateContent` and `streamGenerateContent`

use std::time::Duration;

use futures_util::{Stream, StreamExt};
use reqwest::Client;

use super::sse::sse_events;
use super::types::{ApiErrorResponse, GenerateContentRequest, GenerateContentResponse};
use super::GeminiError;

/// Production REST endpoint
pub const DEFAULT_API_BASE_URL: &str = "https://generativelanguage.googleapis.com/v1beta";

/// Look up the API key: GEMINI_API_KEY first, then API_KEY
pub fn resolve_api_key() -> Option<String> {
    ["GEMINI_API_KEY", "API_KEY"]
        .iter()
        .filter_map(|name| std::env::var(name).ok())
        .find(|key| !key.trim().is_empty())
}

/// Cheap-to-clone handle to the Gemini REST API
#[derive(Debug, Clone)]
pub struct GeminiClient {
    http: Client,
    base_url: String,
    api_key: String,
}

impl GeminiClient {
    /// Build a client against `base_url` (no trailing slash required)
    pub fn new(base_url: impl Into<String>, api_key: impl Into<String>) -> Result<Self, GeminiError> {
        let api_key = api_key.into();
        if api_key.trim().is_empty() {
            return Err(GeminiError::MissingApiKey);
        }

        // No overall timeout: deep-dive streams can run for minutes
        let http = Client::builder()
            .connect_timeout(Duration::from_secs(10))
            .build()
            .map_err(|e| GeminiError::Network(e.to_string()))?;

        Ok(Self {
            http,
            base_url: base_url.into().trim_end_matches('/').to_string(),
            api_key,
        })
    }

    /// Client for the production endpoint using the key from the environment
    pub fn from_env() -> Result<Self, GeminiError> {
        let key = resolve_api_key().ok_or(GeminiError::MissingApiKey)?;
        Self::new(DEFAULT_API_BASE_URL, key)
    }

    pub fn api_key(&self) -> &str {
        &self.api_key
    }

    fn model_url(&self, model: &str, method: &str) -> String {
        format!("{}/models/{}:{}", self.base_url, model, method)
    }

    async fn post(
        &self,
        url: String,
        request: &GenerateContentRequest,
    ) -> Result<reqwest::Response, GeminiError> {
        let response = self
            .http
            .post(url)
            .header("x-goog-api-key", &self.api_key)
            .json(request)
            .send()
            .await
            .map_err(|e| GeminiError::Network(e.to_string()))?;

        let status = response.status();
        if status.is_success() {
            return Ok(response);
        }

        let error_text = response.text().await.unwrap_or_default();
        let message = match serde_json::from_str::<ApiErrorResponse>(&error_text) {
            Ok(parsed) => match parsed.error.status {
                Some(code) => format!("{} ({})", parsed.error.message, code),
                None => parsed.error.message,
            },
            Err(_) => error_text,
        };

        log::error!("Gemini API error ({}): {}", status.as_u16(), message);
        Err(GeminiError::Api {
            status: status.as_u16(),
            message,
        })
    }

    /// One-shot generation
    pub async fn generate_content(
        &self,
        model: &str,
        request: &GenerateContentRequest,
    ) -> Result<GenerateContentResponse, GeminiError> {
        log::debug!("generateContent model={}", model);
        let response = self.post(self.model_url(model, "generateContent"), request).await?;

        let body = response
            .text()
            .await
            .map_err(|e| GeminiError::Network(e.to_string()))?;
        serde_json::from_str(&body).map_err(|e| GeminiError::Parse(e.to_string()))
    }

    /// Streaming generation; yields each partial response as it arrives
    pub async fn stream_generate_content(
        &self,
        model: &str,
        request: &GenerateContentRequest,
    ) -> Result<impl Stream<Item = Result<GenerateContentResponse, GeminiError>> + Send, GeminiError>
    {
        log::debug!("streamGenerateContent model={}", model);
        let url = format!("{}?alt=sse", self.model_url(model, "streamGenerateContent"));
        let response = self.post(url, request).await?;

        let events = sse_events(Box::pin(response.bytes_stream()));
        Ok(events.map(|event| {
            event.and_then(|data| {
                serde_json::from_str::<GenerateContentResponse>(&data)
                    .map_err(|e| GeminiError::Parse(e.to_string()))
            })
        }))
    }
}
