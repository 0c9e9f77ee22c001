//! Streamed long-form analysis of a finished report

use futures_util::stream::{self, BoxStream};
use futures_util::{Stream, StreamExt};

use crate::gemini::{
    Content, GeminiClient, GeminiError, GenerateContentRequest, GenerateContentResponse,
    GenerationConfig, ThinkingConfig,
};

use super::model::PropertyReport;

pub const DEFAULT_DEEP_DIVE_MODEL: &str = "gemini-3-pro-preview";
pub const DEFAULT_THINKING_BUDGET: u32 = 12_000;

/// Emitted once, as the last chunk, when the stream fails
pub const DEEP_DIVE_FALLBACK: &str =
    "The model was unable to complete the deep analysis at this time.";

pub fn deep_dive_prompt(report: &PropertyReport) -> String {
    let json = serde_json::to_string(report).unwrap_or_default();
    format!(
        "Analyze this UK property report for long-term investment and quality of life:\n\
         {}\n\
         Structure: Gentrification potential, School landscape, Connectivity impact, and Lifestyle score.\n\
         Use professional Markdown. Be concise.",
        json
    )
}

/// Map streamed responses to their visible text.
///
/// Empty chunks are skipped. The first error yields [`DEEP_DIVE_FALLBACK`]
/// and ends the stream.
pub fn text_chunks<S>(responses: S) -> impl Stream<Item = String>
where
    S: Stream<Item = Result<GenerateContentResponse, GeminiError>> + Unpin,
{
    stream::unfold((responses, false), |(mut responses, failed)| async move {
        if failed {
            return None;
        }
        loop {
            match responses.next().await {
                Some(Ok(response)) => {
                    if let Some(text) = response.text() {
                        return Some((text, (responses, false)));
                    }
                }
                Some(Err(e)) => {
                    log::error!("Deep dive stream failed: {}", e);
                    return Some((DEEP_DIVE_FALLBACK.to_string(), (responses, true)));
                }
                None => return None,
            }
        }
    })
}

#[derive(Debug, Clone)]
pub struct DeepDiveStreamer {
    client: GeminiClient,
    model: String,
    thinking_budget: u32,
}

impl DeepDiveStreamer {
    pub fn new(client: GeminiClient, model: impl Into<String>, thinking_budget: u32) -> Self {
        Self {
            client,
            model: model.into(),
            thinking_budget,
        }
    }

    fn build_request(&self, report: &PropertyReport) -> GenerateContentRequest {
        // Never feed a previous analysis back in
        let mut report = report.clone();
        report.deep_analysis = None;

        GenerateContentRequest {
            contents: vec![Content::user_text(deep_dive_prompt(&report))],
            generation_config: Some(GenerationConfig {
                thinking_config: Some(ThinkingConfig {
                    thinking_budget: self.thinking_budget,
                }),
                ..Default::default()
            }),
            ..Default::default()
        }
    }

    /// Open a fresh analysis stream for `report`.
    ///
    /// Each call issues a new request; the stream cannot be resumed.
    pub fn stream(&self, report: &PropertyReport) -> BoxStream<'static, String> {
        let client = self.client.clone();
        let model = self.model.clone();
        let request = self.build_request(report);
        log::info!("Starting deep dive for {}", report.address);

        let opened = async move {
            match client.stream_generate_content(&model, &request).await {
                Ok(responses) => text_chunks(Box::pin(responses)).boxed(),
                Err(e) => {
                    log::error!("Deep dive request failed: {}", e);
                    stream::iter(vec![DEEP_DIVE_FALLBACK.to_string()]).boxed()
                }
            }
        };

        stream::once(opened).flatten().boxed()
    }
}
